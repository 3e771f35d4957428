pub mod conversion;
pub mod dns;
pub mod ec2;

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_config::SdkConfig;
use headers::Authorization;
use hyper::client::HttpConnector;
use hyper::Uri;
use hyper_proxy::{Intercept, Proxy, ProxyConnector};
use log::debug;
use log::error;
use log::info;
use stack_types::{ImageFamily, ImageRef, NetworkRef, ZoneRef};
use url::Url;

use crate::context::{self, ContextProvider};
use crate::gatherer::Gatherer;
use crate::types::{Lookup, LookupError};

use self::conversion::{HostedZoneProxy, ImageProxy};
use self::dns::HostedZoneGatherer;
use self::ec2::{DefaultVpcGatherer, ImageGatherer, RouteTableGatherer, SubnetGatherer};

/// Returns `ProxyConnector<HttpConnector>` if env. variable 'https_proxy' is set
pub fn determine_proxy() -> Option<ProxyConnector<HttpConnector>> {
    let raw_proxy = std::env::var("HTTPS_PROXY")
        .or_else(|_v| std::env::var("https_proxy"))
        .ok()?;
    let mut proxy_uri: Uri = raw_proxy.parse().ok()?;
    if proxy_uri.scheme().is_none() {
        error!("Configured proxy did not specify a scheme - falling back to HTTP.");
        proxy_uri = format!("http://{}", raw_proxy).parse().ok()?;
    }
    let mut proxy = Proxy::new(Intercept::All, proxy_uri.clone());

    if let Ok(proxy_url) = proxy_uri.to_string().parse::<Url>() {
        if let Some(password) = proxy_url.password() {
            proxy.set_authorization(Authorization::basic(proxy_url.username(), password));
        }
    }

    let connector = HttpConnector::new();
    match ProxyConnector::from_proxy(connector, proxy) {
        Ok(c) => Some(c),
        Err(e) => {
            error!("Could not setup proxy connector: {}", e);
            None
        }
    }
}

/// Will setup the SdkConfig for the given region, with a proxy if needed.
pub async fn aws_setup(region: &str) -> SdkConfig {
    let region_provider = RegionProviderChain::first_try(Region::new(region.to_string()))
        .or_default_provider()
        .or_else("us-east-1");
    debug!("Using region: {:?}", region_provider.region().await);
    let config = if let Some(proxy) = determine_proxy() {
        debug!("Using proxy");
        let client =
            aws_smithy_runtime::client::http::hyper_014::HyperClientBuilder::new().build(proxy);
        aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await
            .into_builder()
            .http_client(client)
            .build()
    } else {
        debug!("Not using a proxy");
        aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await
    };
    config
}

/// Answers context lookups from the live AWS account.
pub struct AwsContext {
    ec2: aws_sdk_ec2::Client,
    route53: aws_sdk_route53::Client,
}

impl AwsContext {
    pub fn new(config: &SdkConfig) -> Self {
        AwsContext {
            ec2: aws_sdk_ec2::Client::new(config),
            route53: aws_sdk_route53::Client::new(config),
        }
    }
}

#[async_trait]
impl ContextProvider for AwsContext {
    async fn default_network(&self) -> Result<NetworkRef, LookupError> {
        info!("Looking up default VPC");
        let provider_error = |e: Box<dyn std::error::Error + Send + Sync>| {
            LookupError::new(Lookup::DefaultNetwork, "isDefault=true", e.to_string())
        };
        let vpcs = DefaultVpcGatherer { client: &self.ec2 }
            .gather()
            .await
            .map_err(provider_error)?;
        let vpc_id = context::single_default_vpc(&vpcs)?;
        let subnets = SubnetGatherer {
            client: &self.ec2,
            vpc_id: &vpc_id,
        }
        .gather()
        .await
        .map_err(provider_error)?;
        let route_tables = RouteTableGatherer {
            client: &self.ec2,
            vpc_id: &vpc_id,
        }
        .gather()
        .await
        .map_err(provider_error)?;
        context::resolve_default_network(&vpcs, &subnets, &route_tables)
    }

    async fn latest_image(&self, family: ImageFamily) -> Result<ImageRef, LookupError> {
        info!("Looking up latest {} image", family);
        let images = ImageGatherer {
            client: &self.ec2,
            family,
        }
        .gather()
        .await
        .map_err(|e| {
            LookupError::new(Lookup::MachineImage, family.name_pattern(), e.to_string())
        })?;
        let candidates = images
            .iter()
            .filter_map(|i| match ImageProxy::try_from(i) {
                Ok(proxy) => Some(proxy.into_inner()),
                Err(e) => {
                    debug!("Skipping image: {}", e);
                    None
                }
            })
            .collect();
        context::select_latest_image(family, candidates)
    }

    async fn hosted_zone(
        &self,
        domain_name: &str,
        private_zone: bool,
    ) -> Result<ZoneRef, LookupError> {
        info!("Looking up hosted zone for {}", domain_name);
        let zones = HostedZoneGatherer {
            client: &self.route53,
            domain_name,
        }
        .gather()
        .await
        .map_err(|e| LookupError::new(Lookup::HostedZone, domain_name, e.to_string()))?;
        let candidates = zones
            .iter()
            .map(|z| HostedZoneProxy::from(z).into_inner())
            .collect();
        context::select_hosted_zone(domain_name, private_zone, candidates)
    }
}

//! Read-only lookups of things the stack references but does not create.
//!
//! [`ContextProvider`] is the seam between the graph builder and the cloud
//! account. The selection functions below turn whatever a provider gathered
//! into exactly one result, failing with a [`LookupError`] when there is
//! nothing to pick or the pick would be ambiguous.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_ec2::types::{RouteTable, Subnet, Vpc};
use itertools::Itertools;
use log::{debug, info};
use stack_types::{ImageFamily, ImageRef, NetworkRef, SubnetRef, ZoneRef, ANY_IPV4};

use crate::gatherer::aws::conversion::{normalize_zone_name, SubnetProxy};
use crate::types::{Lookup, LookupError};

pub const INTERNET_GATEWAY_PREFIX: &str = "igw-";

#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn default_network(&self) -> Result<NetworkRef, LookupError>;
    async fn latest_image(&self, family: ImageFamily) -> Result<ImageRef, LookupError>;
    async fn hosted_zone(
        &self,
        domain_name: &str,
        private_zone: bool,
    ) -> Result<ZoneRef, LookupError>;
}

/// Returns the id of the one VPC flagged as default.
pub fn single_default_vpc(vpcs: &[Vpc]) -> Result<String, LookupError> {
    let defaults: Vec<&str> = vpcs
        .iter()
        .filter(|v| v.is_default().unwrap_or(false))
        .filter_map(|v| v.vpc_id())
        .unique()
        .collect();
    match defaults.as_slice() {
        [] => Err(LookupError::new(
            Lookup::DefaultNetwork,
            "isDefault=true",
            "no default VPC exists in the target account/region",
        )),
        [vpc_id] => Ok(vpc_id.to_string()),
        _ => Err(LookupError::new(
            Lookup::DefaultNetwork,
            "isDefault=true",
            format!("found {} default VPCs: {}", defaults.len(), defaults.join(",")),
        )),
    }
}

/// Maps each subnet of the VPC to the routetable that governs it: its
/// explicitly associated one, or the VPC's main routetable.
fn subnet_routetable_mapping<'r>(
    subnets: &[&Subnet],
    route_tables: &'r [RouteTable],
) -> HashMap<String, &'r RouteTable> {
    let main_rtb = route_tables.iter().find(|rtb| {
        rtb.associations()
            .iter()
            .any(|a| a.main().unwrap_or(false))
    });
    let mut mapping = HashMap::new();
    for subnet in subnets {
        let Some(subnet_id) = subnet.subnet_id() else {
            continue;
        };
        let explicit = route_tables.iter().find(|rtb| {
            rtb.associations()
                .iter()
                .any(|a| a.subnet_id() == Some(subnet_id))
        });
        if let Some(rtb) = explicit.or(main_rtb) {
            mapping.insert(subnet_id.to_string(), rtb);
        }
    }
    mapping
}

/// Only the default route counts. A more specific route to an `igw-` gateway
/// does not make the subnet public.
fn routes_to_internet_gateway(rtb: &RouteTable) -> bool {
    rtb.routes().iter().any(|r| {
        r.destination_cidr_block() == Some(ANY_IPV4)
            && r
                .gateway_id()
                .is_some_and(|g| g.starts_with(INTERNET_GATEWAY_PREFIX))
    })
}

/// Builds the `NetworkRef` of the default VPC. Subnets are split into public
/// (default route through an internet gateway) and private, each ordered by
/// availability zone and id.
pub fn resolve_default_network(
    vpcs: &[Vpc],
    subnets: &[Subnet],
    route_tables: &[RouteTable],
) -> Result<NetworkRef, LookupError> {
    let vpc_id = single_default_vpc(vpcs)?;
    let cidr_block = vpcs
        .iter()
        .find(|v| v.vpc_id() == Some(vpc_id.as_str()))
        .and_then(|v| v.cidr_block())
        .map(|c| c.to_string());
    let vpc_subnets: Vec<&Subnet> = subnets
        .iter()
        .filter(|s| s.vpc_id() == Some(vpc_id.as_str()))
        .collect();
    let mapping = subnet_routetable_mapping(&vpc_subnets, route_tables);

    let mut public_subnets = vec![];
    let mut private_subnets = vec![];
    for subnet in vpc_subnets {
        let subnet_ref = SubnetProxy::try_from(subnet)?.into_inner();
        let is_public = mapping
            .get(&subnet_ref.subnet_id)
            .is_some_and(|rtb| routes_to_internet_gateway(rtb));
        debug!(
            "Subnet {} in {} is {}",
            subnet_ref.subnet_id,
            subnet_ref.availability_zone,
            if is_public { "public" } else { "private" }
        );
        if is_public {
            public_subnets.push(subnet_ref);
        } else {
            private_subnets.push(subnet_ref);
        }
    }
    let by_az = |a: &SubnetRef, b: &SubnetRef| {
        (&a.availability_zone, &a.subnet_id).cmp(&(&b.availability_zone, &b.subnet_id))
    };
    public_subnets.sort_by(by_az);
    private_subnets.sort_by(by_az);
    info!(
        "Default VPC {} has {} public and {} private subnets",
        vpc_id,
        public_subnets.len(),
        private_subnets.len()
    );
    Ok(NetworkRef {
        vpc_id,
        cidr_block,
        public_subnets,
        private_subnets,
    })
}

/// Picks the newest image by creation date. Creation dates are ISO-8601 and
/// therefore compare correctly as strings.
pub fn select_latest_image(
    family: ImageFamily,
    candidates: Vec<ImageRef>,
) -> Result<ImageRef, LookupError> {
    let latest = candidates.into_iter().max_by(|a, b| {
        (&a.creation_date, &a.image_id).cmp(&(&b.creation_date, &b.image_id))
    });
    match latest {
        Some(image) => {
            debug!("Latest {} image: {} ({})", family, image.image_id, image.name);
            Ok(image)
        }
        None => Err(LookupError::new(
            Lookup::MachineImage,
            family.name_pattern(),
            format!("no available {} image found", family),
        )),
    }
}

/// Finds the single zone named exactly `domain_name` with the requested
/// privacy.
pub fn select_hosted_zone(
    domain_name: &str,
    private_zone: bool,
    candidates: Vec<ZoneRef>,
) -> Result<ZoneRef, LookupError> {
    let domain = normalize_zone_name(domain_name);
    let mut matching: Vec<ZoneRef> = candidates
        .into_iter()
        .filter(|z| normalize_zone_name(&z.name) == domain && z.private_zone == private_zone)
        .collect();
    match matching.len() {
        0 => Err(LookupError::new(
            Lookup::HostedZone,
            domain_name,
            format!(
                "no {} hosted zone found",
                if private_zone { "private" } else { "public" }
            ),
        )),
        1 => Ok(matching.remove(0)),
        n => Err(LookupError::new(
            Lookup::HostedZone,
            domain_name,
            format!(
                "{} hosted zones match: {}",
                n,
                matching.iter().map(|z| &z.hosted_zone_id).join(",")
            ),
        )),
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;

    /// Answers lookups from fixed data.
    #[derive(Debug, Clone, Default)]
    pub struct StaticContext {
        pub network: Option<NetworkRef>,
        pub images: Vec<ImageRef>,
        pub zones: Vec<ZoneRef>,
    }

    pub fn subnet(subnet_id: &str, az: &str, vpc_id: &str) -> SubnetRef {
        SubnetRef {
            subnet_id: subnet_id.to_string(),
            availability_zone: az.to_string(),
            vpc_id: vpc_id.to_string(),
        }
    }

    impl StaticContext {
        pub fn with_defaults() -> Self {
            StaticContext {
                network: Some(NetworkRef {
                    vpc_id: "vpc-1".to_string(),
                    cidr_block: Some("172.31.0.0/16".to_string()),
                    public_subnets: vec![
                        subnet("subnet-a", "us-east-1a", "vpc-1"),
                        subnet("subnet-b", "us-east-1b", "vpc-1"),
                    ],
                    private_subnets: vec![],
                }),
                images: vec![ImageRef {
                    image_id: "ami-1".to_string(),
                    name: "amzn2-ami-hvm-2.0.20240101.0-x86_64-gp2".to_string(),
                    creation_date: "2024-01-01T00:00:00.000Z".to_string(),
                }],
                zones: vec![ZoneRef {
                    hosted_zone_id: "Z123".to_string(),
                    name: "example.com".to_string(),
                    private_zone: false,
                }],
            }
        }
    }

    #[async_trait]
    impl ContextProvider for StaticContext {
        async fn default_network(&self) -> Result<NetworkRef, LookupError> {
            self.network.clone().ok_or_else(|| {
                LookupError::new(Lookup::DefaultNetwork, "isDefault=true", "no default VPC")
            })
        }

        async fn latest_image(&self, family: ImageFamily) -> Result<ImageRef, LookupError> {
            select_latest_image(family, self.images.clone())
        }

        async fn hosted_zone(
            &self,
            domain_name: &str,
            private_zone: bool,
        ) -> Result<ZoneRef, LookupError> {
            select_hosted_zone(domain_name, private_zone, self.zones.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_ec2::types::{Route, RouteTableAssociation};

    fn make_vpc(vpc_id: &str, is_default: bool) -> Vpc {
        Vpc::builder()
            .vpc_id(vpc_id)
            .cidr_block("172.31.0.0/16")
            .is_default(is_default)
            .build()
    }

    fn make_subnet(subnet_id: &str, az: &str) -> Subnet {
        Subnet::builder()
            .subnet_id(subnet_id)
            .availability_zone(az)
            .vpc_id("vpc-1")
            .build()
    }

    fn make_rtb(subnet_id: Option<&str>, main: bool, gateway_id: Option<&str>) -> RouteTable {
        let mut rtb = RouteTable::builder().vpc_id("vpc-1").associations(
            RouteTableAssociation::builder()
                .set_subnet_id(subnet_id.map(|s| s.to_string()))
                .main(main)
                .build(),
        );
        if let Some(gw) = gateway_id {
            rtb = rtb.routes(
                Route::builder()
                    .destination_cidr_block("0.0.0.0/0")
                    .gateway_id(gw)
                    .build(),
            );
        }
        rtb.build()
    }

    fn image(id: &str, date: &str) -> ImageRef {
        ImageRef {
            image_id: id.to_string(),
            name: format!("amzn2-ami-hvm-{}-x86_64-gp2", id),
            creation_date: date.to_string(),
        }
    }

    fn zone(id: &str, name: &str, private_zone: bool) -> ZoneRef {
        ZoneRef {
            hosted_zone_id: id.to_string(),
            name: name.to_string(),
            private_zone,
        }
    }

    #[test]
    fn test_no_default_vpc() {
        let err = resolve_default_network(&[make_vpc("vpc-2", false)], &[], &[]).unwrap_err();
        assert_eq!(err.lookup, Lookup::DefaultNetwork);
    }

    #[test]
    fn test_public_subnets_use_internet_gateway() {
        let subnets = vec![
            make_subnet("subnet-b", "us-east-1b"),
            make_subnet("subnet-a", "us-east-1a"),
            make_subnet("subnet-nat", "us-east-1a"),
        ];
        let rtbs = vec![
            make_rtb(None, true, Some("igw-1")),
            make_rtb(Some("subnet-nat"), false, Some("nat-1")),
        ];
        let network =
            resolve_default_network(&[make_vpc("vpc-1", true)], &subnets, &rtbs).unwrap();
        assert_eq!(network.vpc_id, "vpc-1");
        assert_eq!(network.cidr_block.as_deref(), Some("172.31.0.0/16"));
        let public: Vec<&str> = network
            .public_subnets
            .iter()
            .map(|s| s.subnet_id.as_str())
            .collect();
        assert_eq!(public, vec!["subnet-a", "subnet-b"]);
        assert_eq!(network.private_subnets.len(), 1);
        assert_eq!(network.private_subnets[0].subnet_id, "subnet-nat");
    }

    #[test]
    fn test_subnets_without_routetable_are_private() {
        let subnets = vec![make_subnet("subnet-a", "us-east-1a")];
        let network =
            resolve_default_network(&[make_vpc("vpc-1", true)], &subnets, &[]).unwrap();
        assert!(network.public_subnets.is_empty());
        assert_eq!(network.private_subnets.len(), 1);
    }

    #[test]
    fn test_specific_internet_gateway_route_is_private() {
        let subnets = vec![make_subnet("subnet-a", "us-east-1a")];
        let rtb = RouteTable::builder()
            .vpc_id("vpc-1")
            .associations(RouteTableAssociation::builder().main(true).build())
            .routes(
                Route::builder()
                    .destination_cidr_block("10.0.0.0/8")
                    .gateway_id("igw-1")
                    .build(),
            )
            .build();
        let network =
            resolve_default_network(&[make_vpc("vpc-1", true)], &subnets, &[rtb]).unwrap();
        assert!(network.public_subnets.is_empty());
        assert_eq!(network.private_subnets.len(), 1);
    }

    #[test]
    fn test_select_latest_image() {
        let images = vec![
            image("ami-old", "2023-01-01T00:00:00.000Z"),
            image("ami-new", "2024-06-01T00:00:00.000Z"),
            image("ami-mid", "2024-01-01T00:00:00.000Z"),
        ];
        let latest = select_latest_image(ImageFamily::AmazonLinux2, images).unwrap();
        assert_eq!(latest.image_id, "ami-new");
    }

    #[test]
    fn test_select_latest_image_none() {
        let err = select_latest_image(ImageFamily::AmazonLinux2, vec![]).unwrap_err();
        assert_eq!(err.lookup, Lookup::MachineImage);
    }

    #[test]
    fn test_select_hosted_zone() {
        let zones = vec![
            zone("Z1", "example.com", false),
            zone("Z2", "example.com", true),
            zone("Z3", "sub.example.com", false),
        ];
        assert_eq!(
            select_hosted_zone("example.com.", false, zones.clone())
                .unwrap()
                .hosted_zone_id,
            "Z1"
        );
        assert_eq!(
            select_hosted_zone("Example.com", true, zones)
                .unwrap()
                .hosted_zone_id,
            "Z2"
        );
    }

    #[test]
    fn test_select_hosted_zone_missing_or_ambiguous() {
        let err = select_hosted_zone("example.org", false, vec![zone("Z1", "example.com", false)])
            .unwrap_err();
        assert_eq!(err.lookup, Lookup::HostedZone);
        let err = select_hosted_zone(
            "example.com",
            false,
            vec![zone("Z1", "example.com", false), zone("Z2", "example.com", false)],
        )
        .unwrap_err();
        assert_eq!(err.reason, "2 hosted zones match: Z1,Z2");
    }
}

use std::error::Error;

use async_trait::async_trait;
use aws_sdk_route53::{types::HostedZone, Client};
use log::{debug, error};

use crate::gatherer::Gatherer;

use super::conversion::normalize_zone_name;

/// Collects every hosted zone whose name matches the domain. Public and
/// private zones are both returned.
pub struct HostedZoneGatherer<'a> {
    pub client: &'a Client,
    pub domain_name: &'a str,
}

impl<'a> HostedZoneGatherer<'a> {
    async fn get_hosted_zones(&self) -> Result<Vec<HostedZone>, Box<dyn Error + Send + Sync>> {
        let domain = normalize_zone_name(self.domain_name);
        let mut matching_zones = vec![];
        let mut paginator = self.client.list_hosted_zones().into_paginator().send();
        debug!("Fetching hosted zone for domain: {}", domain);
        while let Some(res) = paginator.next().await {
            match res {
                Ok(zones) => {
                    for zone in zones.hosted_zones {
                        if normalize_zone_name(&zone.name) == domain {
                            matching_zones.push(zone)
                        }
                    }
                }
                Err(e) => {
                    error!("Failed to fetch hosted zones: {}", e);
                    return Err(Box::new(e));
                }
            }
        }
        Ok(matching_zones)
    }
}

#[async_trait]
impl<'a> Gatherer for HostedZoneGatherer<'a> {
    type Resource = HostedZone;

    async fn gather(&self) -> Result<Vec<Self::Resource>, Box<dyn Error + Send + Sync>> {
        debug!("Fetching hosted zones");
        self.get_hosted_zones().await
    }
}

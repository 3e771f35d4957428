use async_trait::async_trait;
use aws_sdk_ec2::{
    types::{Filter, Image, RouteTable, Subnet, Vpc},
    Client,
};
use log::{debug, error, info};
use stack_types::ImageFamily;
use std::error::Error;

use crate::gatherer::Gatherer;

/// Retrieves the VPCs flagged as the account default. There should be at
/// most one per region.
pub struct DefaultVpcGatherer<'a> {
    pub client: &'a Client,
}

#[async_trait]
impl<'a> Gatherer for DefaultVpcGatherer<'a> {
    type Resource = Vpc;

    async fn gather(&self) -> Result<Vec<Self::Resource>, Box<dyn Error + Send + Sync>> {
        info!("Fetching default VPC");
        match self
            .client
            .describe_vpcs()
            .filters(Filter::builder().name("isDefault").values("true").build())
            .send()
            .await
        {
            Ok(success) => Ok(success.vpcs.unwrap_or_default()),
            Err(err) => {
                error!("Failed to fetch default VPC: {}", err);
                Err(Box::new(err))
            }
        }
    }
}

pub struct SubnetGatherer<'a> {
    pub client: &'a Client,
    pub vpc_id: &'a str,
}

#[async_trait]
impl<'a> Gatherer for SubnetGatherer<'a> {
    type Resource = Subnet;

    async fn gather(&self) -> Result<Vec<Self::Resource>, Box<dyn Error + Send + Sync>> {
        debug!("Retrieving subnets for VPC: {}", self.vpc_id);
        let subnets_filter = Filter::builder().name("vpc-id").values(self.vpc_id).build();
        match self
            .client
            .describe_subnets()
            .set_filters(Some(vec![subnets_filter]))
            .send()
            .await
        {
            Ok(success) => Ok(success.subnets.unwrap_or_default()),
            Err(err) => {
                error!("Failed to fetch subnets by VPCID: {}", err);
                Err(Box::new(err))
            }
        }
    }
}

/// Gather all routetables of a VPC, including the main routetable which
/// applies to subnets without an explicit association.
pub struct RouteTableGatherer<'a> {
    pub client: &'a Client,
    pub vpc_id: &'a str,
}

#[async_trait]
impl<'a> Gatherer for RouteTableGatherer<'a> {
    type Resource = RouteTable;

    async fn gather(&self) -> Result<Vec<Self::Resource>, Box<dyn Error + Send + Sync>> {
        debug!("Retrieving route tables for VPC: {}", self.vpc_id);
        let rtb_filter = Filter::builder().name("vpc-id").values(self.vpc_id).build();
        match self
            .client
            .describe_route_tables()
            .set_filters(Some(vec![rtb_filter]))
            .send()
            .await
        {
            Ok(success) => Ok(success.route_tables.unwrap_or_default()),
            Err(err) => {
                error!("Failed to fetch route tables: {}", err);
                Err(Box::new(err))
            }
        }
    }
}

/// Retrieves the available images of an image family. Selecting the newest
/// one is left to the caller.
pub struct ImageGatherer<'a> {
    pub client: &'a Client,
    pub family: ImageFamily,
}

#[async_trait]
impl<'a> Gatherer for ImageGatherer<'a> {
    type Resource = Image;

    async fn gather(&self) -> Result<Vec<Self::Resource>, Box<dyn Error + Send + Sync>> {
        debug!(
            "Retrieving images matching {} owned by {}",
            self.family.name_pattern(),
            self.family.owner()
        );
        match self
            .client
            .describe_images()
            .owners(self.family.owner())
            .filters(
                Filter::builder()
                    .name("name")
                    .values(self.family.name_pattern())
                    .build(),
            )
            .filters(Filter::builder().name("state").values("available").build())
            .send()
            .await
        {
            Ok(success) => Ok(success.images.unwrap_or_default()),
            Err(err) => {
                error!("Failed to fetch images: {}", err);
                Err(Box::new(err))
            }
        }
    }
}

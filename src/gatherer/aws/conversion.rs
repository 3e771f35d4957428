use std::ops::Deref;

use stack_types::{ImageRef, SubnetRef, ZoneRef};

use crate::types::{Lookup, LookupError};

/// Zone names come back from Route53 with a trailing dot and may differ in
/// case from the configured domain.
pub fn normalize_zone_name(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

pub struct SubnetProxy(SubnetRef);

impl Deref for SubnetProxy {
    type Target = SubnetRef;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl SubnetProxy {
    pub fn into_inner(self) -> SubnetRef {
        self.0
    }
}

impl TryFrom<&aws_sdk_ec2::types::Subnet> for SubnetProxy {
    type Error = LookupError;

    fn try_from(value: &aws_sdk_ec2::types::Subnet) -> Result<Self, Self::Error> {
        let subnet_id = value.subnet_id().ok_or_else(|| {
            LookupError::new(Lookup::DefaultNetwork, "subnet", "subnet without an id")
        })?;
        let missing = |field: &str| {
            LookupError::new(
                Lookup::DefaultNetwork,
                subnet_id,
                format!("subnet without {}", field),
            )
        };
        Ok(Self(SubnetRef {
            subnet_id: subnet_id.to_string(),
            availability_zone: value
                .availability_zone()
                .ok_or_else(|| missing("an availability zone"))?
                .to_string(),
            vpc_id: value.vpc_id().ok_or_else(|| missing("a vpc id"))?.to_string(),
        }))
    }
}

pub struct ImageProxy(ImageRef);

impl Deref for ImageProxy {
    type Target = ImageRef;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl ImageProxy {
    pub fn into_inner(self) -> ImageRef {
        self.0
    }
}

impl TryFrom<&aws_sdk_ec2::types::Image> for ImageProxy {
    type Error = LookupError;

    fn try_from(value: &aws_sdk_ec2::types::Image) -> Result<Self, Self::Error> {
        let image_id = value
            .image_id()
            .ok_or_else(|| LookupError::new(Lookup::MachineImage, "image", "image without an id"))?;
        let creation_date = value.creation_date().ok_or_else(|| {
            LookupError::new(Lookup::MachineImage, image_id, "image without a creation date")
        })?;
        Ok(Self(ImageRef {
            image_id: image_id.to_string(),
            name: value.name().unwrap_or_default().to_string(),
            creation_date: creation_date.to_string(),
        }))
    }
}

pub struct HostedZoneProxy(ZoneRef);

impl Deref for HostedZoneProxy {
    type Target = ZoneRef;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl HostedZoneProxy {
    pub fn into_inner(self) -> ZoneRef {
        self.0
    }
}

impl From<&aws_sdk_route53::types::HostedZone> for HostedZoneProxy {
    fn from(value: &aws_sdk_route53::types::HostedZone) -> Self {
        Self(ZoneRef {
            hosted_zone_id: value.id.trim_start_matches("/hostedzone/").to_string(),
            name: normalize_zone_name(&value.name),
            private_zone: value.config.as_ref().is_some_and(|c| c.private_zone),
        })
    }
}

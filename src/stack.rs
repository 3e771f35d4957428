//! Builds the stack graph: default network, security group with its ingress
//! rules, the instance and the DNS record pointing at the instance.
//!
//! Declaration order is dependency order. Lookups go through the
//! [`ContextProvider`]; every other step only constructs values in memory.

use std::collections::BTreeSet;
use std::time::Duration;

use log::{debug, info};
use stack_types::{
    ConstructionError, DnsRecordSpec, ImageFamily, ImageRef, InstanceSpec, NetworkInterfaceSpec,
    NetworkRef, PortSelector, RecordType, SecurityGroupSpec, SourceCidr, StackGraph, Tag, Token,
    ZoneRef, ANY_IPV4,
};

use crate::config::StackConfig;
use crate::context::ContextProvider;
use crate::template::sanitize_logical_id;
use crate::types::{Lookup, LookupError, StackError};

pub const SECURITY_GROUP_ID: &str = "SecurityGroup";
pub const DNS_RECORD_ID: &str = "InstanceRecord";
const MAX_GROUP_FIELD_LEN: usize = 255;

/// Rules opened on the instance security group.
pub fn default_ingress_ports() -> Vec<PortSelector> {
    vec![PortSelector::IcmpPing, PortSelector::Tcp(22)]
}

/// Ingress rules form a set, adding an existing rule again is a no-op.
pub fn add_ingress_rule(
    group: &mut SecurityGroupSpec,
    source_cidr: &str,
    port: PortSelector,
) -> Result<(), StackError> {
    let source: SourceCidr = source_cidr.parse()?;
    port.validate()?;
    if !group.add_ingress_rule(source, port) {
        debug!("Ingress rule {} from {} already present", port, source_cidr);
    }
    Ok(())
}

pub struct StackBuilder<'a, C: ContextProvider> {
    config: &'a StackConfig,
    context: &'a C,
}

impl<'a, C: ContextProvider> StackBuilder<'a, C> {
    pub fn new(config: &'a StackConfig, context: &'a C) -> Self {
        StackBuilder { config, context }
    }

    /// Only the account's default network can be looked up.
    pub async fn lookup_network(&self, is_default: bool) -> Result<NetworkRef, StackError> {
        if !is_default {
            return Err(LookupError::new(
                Lookup::DefaultNetwork,
                "isDefault=false",
                "only the default VPC can be looked up",
            )
            .into());
        }
        Ok(self.context.default_network().await?)
    }

    pub fn declare_security_group(
        &self,
        network: &NetworkRef,
        name: &str,
        description: &str,
        allow_all_outbound: bool,
    ) -> Result<SecurityGroupSpec, StackError> {
        if name.is_empty() || name.len() > MAX_GROUP_FIELD_LEN {
            return Err(ConstructionError::new(
                "security group name",
                name,
                "must be between 1 and 255 characters",
            )
            .into());
        }
        if name.starts_with("sg-") {
            return Err(ConstructionError::new(
                "security group name",
                name,
                "must not start with 'sg-'",
            )
            .into());
        }
        if description.len() > MAX_GROUP_FIELD_LEN {
            return Err(ConstructionError::new(
                "security group description",
                description,
                "must be at most 255 characters",
            )
            .into());
        }
        debug!("Declaring security group {} in {}", name, network.vpc_id);
        Ok(SecurityGroupSpec {
            logical_id: SECURITY_GROUP_ID.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            allow_all_outbound,
            vpc_id: network.vpc_id.clone(),
            ingress: BTreeSet::new(),
        })
    }

    pub async fn select_latest_image(&self, family: ImageFamily) -> Result<ImageRef, StackError> {
        Ok(self.context.latest_image(family).await?)
    }

    /// Places the instance in the first public subnet of the network with a
    /// public IP and the given security group attached.
    pub fn declare_instance(
        &self,
        image: ImageRef,
        instance_type: &str,
        monitoring: bool,
        tags: Vec<Tag>,
        network: &NetworkRef,
        group: &SecurityGroupSpec,
    ) -> Result<InstanceSpec, StackError> {
        if instance_type.is_empty() {
            return Err(
                ConstructionError::new("instance type", instance_type, "must not be empty").into(),
            );
        }
        let logical_id = &self.config.instance_name;
        let template_id = sanitize_logical_id(logical_id);
        if template_id.is_empty() {
            return Err(ConstructionError::new(
                "instance name",
                logical_id,
                "must contain at least one alphanumeric character",
            )
            .into());
        }
        if [SECURITY_GROUP_ID, DNS_RECORD_ID]
            .iter()
            .any(|id| sanitize_logical_id(id) == template_id)
        {
            return Err(ConstructionError::new(
                "instance name",
                logical_id,
                format!("collides with the logical id {}", template_id),
            )
            .into());
        }
        let Some(subnet) = network.first_public_subnet() else {
            return Err(LookupError::new(
                Lookup::PublicSubnet,
                &network.vpc_id,
                "network has no public subnets",
            )
            .into());
        };
        if subnet.vpc_id != group.vpc_id {
            return Err(ConstructionError::new(
                "security group",
                &group.vpc_id,
                format!(
                    "belongs to a different VPC than subnet {} ({})",
                    subnet.subnet_id, subnet.vpc_id
                ),
            )
            .into());
        }
        debug!("Declaring instance {} in {}", logical_id, subnet.subnet_id);
        Ok(InstanceSpec {
            logical_id: logical_id.clone(),
            image,
            instance_type: instance_type.to_string(),
            monitoring,
            tags,
            network_interfaces: vec![NetworkInterfaceSpec {
                device_index: "0".to_string(),
                associate_public_ip: true,
                subnet: subnet.clone(),
                group_set: vec![group.group_id()],
            }],
        })
    }

    pub async fn lookup_hosted_zone(
        &self,
        domain_name: &str,
        private_zone: bool,
    ) -> Result<ZoneRef, StackError> {
        Ok(self.context.hosted_zone(domain_name, private_zone).await?)
    }

    /// `name` is relative to the zone unless it already ends with the zone
    /// name, compared case-insensitively.
    pub fn declare_dns_record(
        &self,
        zone: &ZoneRef,
        name: &str,
        record_type: RecordType,
        target: Token,
        ttl: Duration,
    ) -> Result<DnsRecordSpec, StackError> {
        let name = name.trim_end_matches('.');
        if name.is_empty() {
            return Err(ConstructionError::new("record name", name, "must not be empty").into());
        }
        if ttl.as_secs() == 0 || ttl.subsec_nanos() != 0 {
            return Err(ConstructionError::new(
                "record ttl",
                format!("{:?}", ttl),
                "must be a positive number of whole seconds",
            )
            .into());
        }
        let lowered = name.to_lowercase();
        let zone_name = zone.name.to_lowercase();
        let fqdn = if lowered == zone_name || lowered.ends_with(&format!(".{}", zone_name)) {
            name.to_string()
        } else {
            format!("{}.{}", name, zone.name)
        };
        debug!("Declaring {} record {} -> {}", record_type, fqdn, target);
        Ok(DnsRecordSpec {
            logical_id: DNS_RECORD_ID.to_string(),
            zone: zone.clone(),
            name: fqdn,
            record_type,
            targets: vec![target],
            ttl_seconds: ttl.as_secs(),
        })
    }

    pub async fn build(&self) -> Result<StackGraph, StackError> {
        info!(
            "Building stack {} for {}/{}",
            self.config.stack_name, self.config.account, self.config.region
        );
        let network = self.lookup_network(true).await?;

        let mut group = self.declare_security_group(
            &network,
            &self.config.security_group_name,
            &self.config.security_group_description,
            true,
        )?;
        for port in default_ingress_ports() {
            add_ingress_rule(&mut group, ANY_IPV4, port)?;
        }

        let image = self.select_latest_image(self.config.image_family).await?;
        let instance = self.declare_instance(
            image,
            &self.config.instance_type,
            false,
            vec![Tag::new("Name", &self.config.instance_name)],
            &network,
            &group,
        )?;

        let zone = self
            .lookup_hosted_zone(&self.config.domain_name, self.config.private_zone)
            .await?;
        let dns_record = self.declare_dns_record(
            &zone,
            &self.config.record_name,
            RecordType::A,
            instance.public_ip(),
            Duration::from_secs(self.config.ttl_seconds),
        )?;

        Ok(StackGraph {
            stack_name: self.config.stack_name.clone(),
            environment: self.config.environment(),
            network,
            security_group: group,
            instance,
            dns_record,
        })
    }
}

pub async fn build_stack<C: ContextProvider>(
    config: &StackConfig,
    context: &C,
) -> Result<StackGraph, StackError> {
    StackBuilder::new(config, context).build().await
}

//! Checks a built stack graph before it is handed over:
//!
//! - The security group opens exactly ICMP echo and SSH from anywhere.
//! - The instance subnets belong to the security group's VPC.
//! - Every instance interface carries the declared security group.
//! - The DNS record targets the instance's (deferred) public IP.
//! - Resources only reference resources declared before them.

use std::collections::BTreeSet;

use derive_builder::Builder;
use log::{debug, info};
use stack_types::{IngressRule, SourceCidr, StackGraph};

use crate::{
    stack::default_ingress_ports,
    types::{Severity, VerificationResult, Verifier},
};

#[derive(Debug, Builder)]
pub struct GraphChecks<'a> {
    graph: &'a StackGraph,
}

impl<'a> GraphChecks<'a> {
    fn expected_ingress(&self) -> BTreeSet<IngressRule> {
        default_ingress_ports()
            .into_iter()
            .map(|port| IngressRule {
                port,
                source: SourceCidr::any_ipv4(),
            })
            .collect()
    }

    pub fn verify_ingress_rules(&self) -> Vec<VerificationResult> {
        info!("Checking ingress rules");
        let expected = self.expected_ingress();
        let actual = &self.graph.security_group.ingress;
        let mut results = vec![];
        for missing in expected.difference(actual) {
            results.push(VerificationResult::critical(format!(
                "Security group {} is missing ingress rule {}",
                self.graph.security_group.name,
                missing.description()
            )));
        }
        for extra in actual.difference(&expected) {
            results.push(VerificationResult {
                message: format!(
                    "Security group {} has an additional ingress rule {}",
                    self.graph.security_group.name,
                    extra.description()
                ),
                severity: Severity::Warning,
            });
        }
        if results.is_empty() {
            results.push(VerificationResult::ok(format!(
                "Security group {} allows ICMP echo and SSH from anywhere",
                self.graph.security_group.name
            )));
        }
        results
    }

    pub fn verify_subnet_placement(&self) -> Vec<VerificationResult> {
        info!("Checking instance placement");
        let sg_vpc = &self.graph.security_group.vpc_id;
        let mut results = vec![];
        for ni in self.graph.instance.network_interfaces.iter() {
            let subnet = &ni.subnet;
            debug!("Checking subnet {} against {}", subnet.subnet_id, sg_vpc);
            if &subnet.vpc_id != sg_vpc || !self.graph.network.contains_subnet(&subnet.subnet_id)
            {
                results.push(VerificationResult::critical(format!(
                    "Subnet {} ({}) is not part of the security group's VPC {}",
                    subnet.subnet_id, subnet.vpc_id, sg_vpc
                )));
            } else {
                results.push(VerificationResult::ok(format!(
                    "Subnet {} belongs to VPC {}",
                    subnet.subnet_id, sg_vpc
                )));
            }
        }
        if results.is_empty() {
            results.push(VerificationResult::critical(format!(
                "Instance {} has no network interfaces",
                self.graph.instance.logical_id
            )));
        }
        results
    }

    pub fn verify_security_group_attached(&self) -> Vec<VerificationResult> {
        let group_id = self.graph.security_group.group_id();
        self.graph
            .instance
            .network_interfaces
            .iter()
            .map(|ni| {
                if ni.group_set.contains(&group_id) {
                    VerificationResult::ok(format!(
                        "Interface {} uses security group {}",
                        ni.device_index, self.graph.security_group.logical_id
                    ))
                } else {
                    VerificationResult::critical(format!(
                        "Interface {} does not use security group {}",
                        ni.device_index, self.graph.security_group.logical_id
                    ))
                }
            })
            .collect()
    }

    pub fn verify_dns_target(&self) -> VerificationResult {
        let record = &self.graph.dns_record;
        let public_ip = self.graph.instance.public_ip();
        if !record.targets.is_empty() && record.targets.iter().all(|t| *t == public_ip) {
            VerificationResult::ok(format!(
                "{} record {} targets {}",
                record.record_type, record.name, public_ip
            ))
        } else {
            VerificationResult::critical(format!(
                "{} record {} does not target {}: {}",
                record.record_type,
                record.name,
                public_ip,
                record
                    .targets
                    .iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
                    .join(",")
            ))
        }
    }

    pub fn verify_declaration_order(&self) -> VerificationResult {
        let mut declared: Vec<&str> = vec![];
        for resource in self.graph.resources() {
            for dependency in resource.depends_on() {
                if !declared.contains(&dependency) {
                    return VerificationResult::critical(format!(
                        "{} references {} which is not declared before it",
                        resource.logical_id(),
                        dependency
                    ));
                }
            }
            declared.push(resource.logical_id());
        }
        VerificationResult::ok("Resources are declared in dependency order")
    }
}

impl<'a> Verifier for GraphChecks<'a> {
    fn verify(&self) -> Vec<VerificationResult> {
        let mut results = self.verify_ingress_rules();
        results.extend(self.verify_subnet_placement());
        results.extend(self.verify_security_group_attached());
        results.push(self.verify_dns_target());
        results.push(self.verify_declaration_order());
        results
    }
}

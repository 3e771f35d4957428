//! Resource descriptions making up an `ec2-basics` stack.
//!
//! Everything in here describes desired state. None of these types talk to
//! AWS: values only known after provisioning (the instance public IP, the
//! security group id) are carried as [`Token`]s and resolved by the
//! provisioning engine.

use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::Display;
use std::str::FromStr;

use ipnetwork::Ipv4Network;
use serde::Deserialize;
use serde::Serialize;

pub const ANY_IPV4: &str = "0.0.0.0/0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructionError {
    pub field: String,
    pub value: String,
    pub reason: String,
}

impl ConstructionError {
    pub fn new(field: &str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        ConstructionError {
            field: field.to_string(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

impl Display for ConstructionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid {} '{}': {}",
            self.field, self.value, self.reason
        )
    }
}

impl Error for ConstructionError {}

/// Attributes of a declared resource that only exist after it was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Attribute {
    PublicIp,
    GroupId,
}

impl Attribute {
    pub fn name(&self) -> &'static str {
        match self {
            Attribute::PublicIp => "PublicIp",
            Attribute::GroupId => "GroupId",
        }
    }
}

/// A value inside the graph. Anything but `Literal` is late-bound.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Token {
    Literal(String),
    Ref(String),
    GetAtt {
        logical_id: String,
        attribute: Attribute,
    },
}

impl Token {
    pub fn get_att(logical_id: &str, attribute: Attribute) -> Self {
        Token::GetAtt {
            logical_id: logical_id.to_string(),
            attribute,
        }
    }

    pub fn is_deferred(&self) -> bool {
        !matches!(self, Token::Literal(_))
    }

    /// Logical id of the declared resource this token points at, if any.
    pub fn referenced_id(&self) -> Option<&str> {
        match self {
            Token::Literal(_) => None,
            Token::Ref(id) => Some(id),
            Token::GetAtt { logical_id, .. } => Some(logical_id),
        }
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Literal(v) => f.write_str(v),
            Token::Ref(id) => write!(f, "${{{}}}", id),
            Token::GetAtt {
                logical_id,
                attribute,
            } => write!(f, "${{{}.{}}}", logical_id, attribute.name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubnetRef {
    pub subnet_id: String,
    pub availability_zone: String,
    pub vpc_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRef {
    pub vpc_id: String,
    pub cidr_block: Option<String>,
    pub public_subnets: Vec<SubnetRef>,
    pub private_subnets: Vec<SubnetRef>,
}

impl NetworkRef {
    pub fn first_public_subnet(&self) -> Option<&SubnetRef> {
        self.public_subnets.first()
    }

    pub fn contains_subnet(&self, subnet_id: &str) -> bool {
        self.public_subnets
            .iter()
            .chain(self.private_subnets.iter())
            .any(|s| s.subnet_id == subnet_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFamily {
    AmazonLinux2,
}

impl ImageFamily {
    pub fn owner(&self) -> &'static str {
        "amazon"
    }

    /// Pattern used to filter image names.
    pub fn name_pattern(&self) -> &'static str {
        match self {
            ImageFamily::AmazonLinux2 => "amzn2-ami-hvm-*-x86_64-gp2",
        }
    }
}

impl Display for ImageFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageFamily::AmazonLinux2 => f.write_str("Amazon Linux 2"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub image_id: String,
    pub name: String,
    pub creation_date: String,
}

/// Protocol and port(s) an ingress rule opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PortSelector {
    /// ICMP echo request (type 8, any code).
    IcmpPing,
    Tcp(u16),
    TcpRange { from: u16, to: u16 },
    Udp(u16),
    AllTraffic,
}

impl PortSelector {
    pub fn validate(&self) -> Result<(), ConstructionError> {
        match *self {
            PortSelector::Tcp(0) | PortSelector::Udp(0) => Err(ConstructionError::new(
                "port",
                "0",
                "port must be between 1 and 65535",
            )),
            PortSelector::TcpRange { from, to } if from == 0 || from > to => {
                Err(ConstructionError::new(
                    "port range",
                    format!("{}-{}", from, to),
                    "range must be ascending and start at 1 or above",
                ))
            }
            _ => Ok(()),
        }
    }

    pub fn protocol(&self) -> &'static str {
        match self {
            PortSelector::IcmpPing => "icmp",
            PortSelector::Tcp(_) | PortSelector::TcpRange { .. } => "tcp",
            PortSelector::Udp(_) => "udp",
            PortSelector::AllTraffic => "-1",
        }
    }

    /// (FromPort, ToPort) as the EC2 API expects them. For ICMP these are
    /// type and code.
    pub fn port_range(&self) -> Option<(i32, i32)> {
        match *self {
            PortSelector::IcmpPing => Some((8, -1)),
            PortSelector::Tcp(p) | PortSelector::Udp(p) => Some((p as i32, p as i32)),
            PortSelector::TcpRange { from, to } => Some((from as i32, to as i32)),
            PortSelector::AllTraffic => None,
        }
    }
}

impl Display for PortSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortSelector::IcmpPing => f.write_str("ICMP Type 8"),
            PortSelector::Tcp(p) => write!(f, "{}", p),
            PortSelector::TcpRange { from, to } => write!(f, "{}-{}", from, to),
            PortSelector::Udp(p) => write!(f, "UDP {}", p),
            PortSelector::AllTraffic => f.write_str("ALL TRAFFIC"),
        }
    }
}

/// An IPv4 CIDR block, validated on construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceCidr(String);

impl SourceCidr {
    pub fn any_ipv4() -> Self {
        SourceCidr(ANY_IPV4.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for SourceCidr {
    type Err = ConstructionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.contains('/') {
            return Err(ConstructionError::new(
                "source cidr",
                s,
                "missing prefix length",
            ));
        }
        match s.parse::<Ipv4Network>() {
            Ok(_) => Ok(SourceCidr(s.to_string())),
            Err(e) => Err(ConstructionError::new("source cidr", s, e.to_string())),
        }
    }
}

impl Display for SourceCidr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IngressRule {
    pub port: PortSelector,
    pub source: SourceCidr,
}

impl IngressRule {
    pub fn description(&self) -> String {
        format!("from {}:{}", self.source, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupSpec {
    pub logical_id: String,
    pub name: String,
    pub description: String,
    pub allow_all_outbound: bool,
    pub vpc_id: String,
    pub ingress: BTreeSet<IngressRule>,
}

impl SecurityGroupSpec {
    pub fn group_id(&self) -> Token {
        Token::get_att(&self.logical_id, Attribute::GroupId)
    }

    /// Returns false if an equal rule was already present.
    pub fn add_ingress_rule(&mut self, source: SourceCidr, port: PortSelector) -> bool {
        self.ingress.insert(IngressRule { port, source })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: &str, value: &str) -> Self {
        Tag {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterfaceSpec {
    pub device_index: String,
    pub associate_public_ip: bool,
    pub subnet: SubnetRef,
    pub group_set: Vec<Token>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub logical_id: String,
    pub image: ImageRef,
    pub instance_type: String,
    pub monitoring: bool,
    pub tags: Vec<Tag>,
    pub network_interfaces: Vec<NetworkInterfaceSpec>,
}

impl InstanceSpec {
    pub fn public_ip(&self) -> Token {
        Token::get_att(&self.logical_id, Attribute::PublicIp)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRef {
    pub hosted_zone_id: String,
    /// Zone name without the trailing dot.
    pub name: String,
    pub private_zone: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
    Txt,
}

impl Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
            RecordType::Txt => "TXT",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecordSpec {
    pub logical_id: String,
    pub zone: ZoneRef,
    /// Fully-qualified, without the trailing dot.
    pub name: String,
    pub record_type: RecordType,
    pub targets: Vec<Token>,
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub region: String,
    pub account: String,
}

/// Borrowed view of one declared resource.
#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    SecurityGroup(&'a SecurityGroupSpec),
    Instance(&'a InstanceSpec),
    DnsRecord(&'a DnsRecordSpec),
}

impl<'a> Resource<'a> {
    pub fn logical_id(&self) -> &'a str {
        match *self {
            Resource::SecurityGroup(sg) => &sg.logical_id,
            Resource::Instance(i) => &i.logical_id,
            Resource::DnsRecord(r) => &r.logical_id,
        }
    }

    /// Tokens through which this resource points at other declared resources.
    pub fn tokens(&self) -> Vec<&'a Token> {
        match *self {
            Resource::SecurityGroup(_) => vec![],
            Resource::Instance(i) => i
                .network_interfaces
                .iter()
                .flat_map(|ni| ni.group_set.iter())
                .collect(),
            Resource::DnsRecord(r) => r.targets.iter().collect(),
        }
    }

    /// Logical ids this resource depends on, deduplicated, in first-seen order.
    pub fn depends_on(&self) -> Vec<&'a str> {
        let mut ids: Vec<&str> = vec![];
        for id in self.tokens().into_iter().filter_map(|t| t.referenced_id()) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }
}

/// The complete declared stack. Lookups are stored next to the declared
/// resources so the graph is self-contained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackGraph {
    pub stack_name: String,
    pub environment: Environment,
    pub network: NetworkRef,
    pub security_group: SecurityGroupSpec,
    pub instance: InstanceSpec,
    pub dns_record: DnsRecordSpec,
}

impl StackGraph {
    /// Declared resources in declaration order.
    pub fn resources(&self) -> Vec<Resource<'_>> {
        vec![
            Resource::SecurityGroup(&self.security_group),
            Resource::Instance(&self.instance),
            Resource::DnsRecord(&self.dns_record),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_cidr_parsing() {
        assert!("0.0.0.0/0".parse::<SourceCidr>().is_ok());
        assert!("10.0.0.0/16".parse::<SourceCidr>().is_ok());
        assert!("10.0.0.0".parse::<SourceCidr>().is_err());
        assert!("10.0.0.0/33".parse::<SourceCidr>().is_err());
        assert!("not-a-cidr/8".parse::<SourceCidr>().is_err());
    }

    #[test]
    fn test_port_selector_validation() {
        assert!(PortSelector::IcmpPing.validate().is_ok());
        assert!(PortSelector::Tcp(22).validate().is_ok());
        assert!(PortSelector::Tcp(0).validate().is_err());
        assert!(PortSelector::TcpRange { from: 10, to: 5 }.validate().is_err());
        assert_eq!(PortSelector::IcmpPing.port_range(), Some((8, -1)));
        assert_eq!(PortSelector::AllTraffic.port_range(), None);
    }

    #[test]
    fn test_ingress_rules_are_a_set() {
        let mut sg = SecurityGroupSpec {
            logical_id: "SecurityGroup".to_string(),
            name: "sg".to_string(),
            description: "sg".to_string(),
            allow_all_outbound: true,
            vpc_id: "vpc-1".to_string(),
            ingress: BTreeSet::new(),
        };
        assert!(sg.add_ingress_rule(SourceCidr::any_ipv4(), PortSelector::Tcp(22)));
        assert!(sg.add_ingress_rule(SourceCidr::any_ipv4(), PortSelector::IcmpPing));
        assert!(!sg.add_ingress_rule(SourceCidr::any_ipv4(), PortSelector::Tcp(22)));
        assert_eq!(sg.ingress.len(), 2);
    }

    #[test]
    fn test_depends_on_is_deduplicated() {
        let record = DnsRecordSpec {
            logical_id: "Basic".to_string(),
            zone: ZoneRef {
                hosted_zone_id: "Z1".to_string(),
                name: "example.com".to_string(),
                private_zone: false,
            },
            name: "test.example.com".to_string(),
            record_type: RecordType::A,
            targets: vec![
                Token::get_att("test-instance", Attribute::PublicIp),
                Token::Ref("test-instance".to_string()),
                Token::Literal("1.2.3.4".to_string()),
            ],
            ttl_seconds: 60,
        };
        assert_eq!(
            Resource::DnsRecord(&record).depends_on(),
            vec!["test-instance"]
        );
    }

    #[test]
    fn test_token_display() {
        assert_eq!(
            Token::get_att("test-instance", Attribute::PublicIp).to_string(),
            "${test-instance.PublicIp}"
        );
        assert!(!Token::Literal("x".to_string()).is_deferred());
    }
}

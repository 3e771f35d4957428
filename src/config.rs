//! Inputs of a stack build. The builder never reads the process environment;
//! everything it needs is passed in through [`StackConfig`].

use derive_builder::Builder;
use stack_types::{Environment, ImageFamily};

pub const DEFAULT_STACK_NAME: &str = "EC2BasicsStack";
pub const DEFAULT_DOMAIN: &str = "example.com";
pub const DEFAULT_RECORD_NAME: &str = "test";
pub const DEFAULT_SECURITY_GROUP_NAME: &str = "my-test-sg";
pub const DEFAULT_SECURITY_GROUP_DESCRIPTION: &str =
    "Allow ssh access to ec2 instances from anywhere";
pub const DEFAULT_INSTANCE_NAME: &str = "test-instance";
pub const DEFAULT_INSTANCE_TYPE: &str = "t2.micro";
pub const DEFAULT_TTL_SECONDS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct StackConfig {
    #[builder(setter(into))]
    pub region: String,
    #[builder(setter(into))]
    pub account: String,
    #[builder(setter(into), default = "DEFAULT_STACK_NAME.to_string()")]
    pub stack_name: String,
    #[builder(setter(into), default = "DEFAULT_DOMAIN.to_string()")]
    pub domain_name: String,
    #[builder(setter(into), default = "DEFAULT_RECORD_NAME.to_string()")]
    pub record_name: String,
    #[builder(default = "false")]
    pub private_zone: bool,
    #[builder(setter(into), default = "DEFAULT_SECURITY_GROUP_NAME.to_string()")]
    pub security_group_name: String,
    #[builder(setter(into), default = "DEFAULT_SECURITY_GROUP_DESCRIPTION.to_string()")]
    pub security_group_description: String,
    #[builder(setter(into), default = "DEFAULT_INSTANCE_NAME.to_string()")]
    pub instance_name: String,
    #[builder(setter(into), default = "DEFAULT_INSTANCE_TYPE.to_string()")]
    pub instance_type: String,
    #[builder(default = "ImageFamily::AmazonLinux2")]
    pub image_family: ImageFamily,
    #[builder(default = "DEFAULT_TTL_SECONDS")]
    pub ttl_seconds: u64,
}

impl StackConfig {
    pub fn environment(&self) -> Environment {
        Environment {
            region: self.region.clone(),
            account: self.account.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let mut scb = StackConfigBuilder::default();
        let config = scb.region("eu-west-1").account("123456789012").build().unwrap();
        assert_eq!(config.domain_name, "example.com");
        assert_eq!(config.record_name, "test");
        assert_eq!(config.instance_type, "t2.micro");
        assert_eq!(config.ttl_seconds, 60);
        assert!(!config.private_zone);
        assert_eq!(
            config.environment(),
            Environment {
                region: "eu-west-1".to_string(),
                account: "123456789012".to_string()
            }
        );
    }

    #[test]
    fn test_builder_requires_region() {
        let mut scb = StackConfigBuilder::default();
        assert!(scb.account("123456789012").build().is_err());
    }
}

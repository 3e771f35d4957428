//! Renders a [`StackGraph`] as a CloudFormation template, the format handed
//! over to the provisioning engine.

use serde_json::{json, Map, Value};
use stack_types::{
    DnsRecordSpec, InstanceSpec, Resource, SecurityGroupSpec, StackGraph, Token, ANY_IPV4,
};

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// CloudFormation logical ids must be alphanumeric.
pub fn sanitize_logical_id(id: &str) -> String {
    id.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

pub fn render_token(token: &Token) -> Value {
    match token {
        Token::Literal(v) => json!(v),
        Token::Ref(id) => json!({ "Ref": sanitize_logical_id(id) }),
        Token::GetAtt {
            logical_id,
            attribute,
        } => json!({ "Fn::GetAtt": [sanitize_logical_id(logical_id), attribute.name()] }),
    }
}

fn security_group_properties(sg: &SecurityGroupSpec) -> Value {
    let ingress: Vec<Value> = sg
        .ingress
        .iter()
        .map(|rule| {
            let mut entry = Map::new();
            entry.insert("CidrIp".to_string(), json!(rule.source.as_str()));
            entry.insert("Description".to_string(), json!(rule.description()));
            entry.insert("IpProtocol".to_string(), json!(rule.port.protocol()));
            if let Some((from, to)) = rule.port.port_range() {
                entry.insert("FromPort".to_string(), json!(from));
                entry.insert("ToPort".to_string(), json!(to));
            }
            Value::Object(entry)
        })
        .collect();
    let mut properties = json!({
        "GroupName": sg.name,
        "GroupDescription": sg.description,
        "VpcId": sg.vpc_id,
        "SecurityGroupIngress": ingress,
    });
    if sg.allow_all_outbound {
        properties["SecurityGroupEgress"] = json!([{
            "CidrIp": ANY_IPV4,
            "Description": "Allow all outbound traffic by default",
            "IpProtocol": "-1",
        }]);
    }
    properties
}

fn instance_properties(instance: &InstanceSpec) -> Value {
    let tags: Vec<Value> = instance
        .tags
        .iter()
        .map(|t| json!({ "Key": t.key, "Value": t.value }))
        .collect();
    let interfaces: Vec<Value> = instance
        .network_interfaces
        .iter()
        .map(|ni| {
            json!({
                "DeviceIndex": ni.device_index,
                "AssociatePublicIpAddress": ni.associate_public_ip,
                "SubnetId": ni.subnet.subnet_id,
                "GroupSet": ni.group_set.iter().map(render_token).collect::<Vec<_>>(),
            })
        })
        .collect();
    json!({
        "ImageId": instance.image.image_id,
        "InstanceType": instance.instance_type,
        "Monitoring": instance.monitoring,
        "Tags": tags,
        "NetworkInterfaces": interfaces,
    })
}

fn record_properties(record: &DnsRecordSpec) -> Value {
    json!({
        "HostedZoneId": record.zone.hosted_zone_id,
        "Name": format!("{}.", record.name),
        "Type": record.record_type.to_string(),
        "ResourceRecords": record.targets.iter().map(render_token).collect::<Vec<_>>(),
        "TTL": record.ttl_seconds.to_string(),
    })
}

fn render_resource(resource: &Resource<'_>) -> Value {
    let (resource_type, properties) = match resource {
        Resource::SecurityGroup(sg) => ("AWS::EC2::SecurityGroup", security_group_properties(sg)),
        Resource::Instance(i) => ("AWS::EC2::Instance", instance_properties(i)),
        Resource::DnsRecord(r) => ("AWS::Route53::RecordSet", record_properties(r)),
    };
    let mut rendered = json!({
        "Type": resource_type,
        "Properties": properties,
    });
    let depends_on: Vec<String> = resource
        .depends_on()
        .into_iter()
        .map(sanitize_logical_id)
        .collect();
    if !depends_on.is_empty() {
        rendered["DependsOn"] = json!(depends_on);
    }
    rendered
}

pub fn synthesize(graph: &StackGraph) -> Value {
    let mut resources = Map::new();
    for resource in graph.resources() {
        resources.insert(
            sanitize_logical_id(resource.logical_id()),
            render_resource(&resource),
        );
    }
    json!({
        "AWSTemplateFormatVersion": TEMPLATE_FORMAT_VERSION,
        "Description": format!(
            "{} ({} in {})",
            graph.stack_name, graph.environment.account, graph.environment.region
        ),
        "Resources": resources,
        "Outputs": {
            "InstancePublicIp": { "Value": render_token(&graph.instance.public_ip()) },
            "RecordName": { "Value": graph.dns_record.name },
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StackConfigBuilder;
    use crate::context::testing::StaticContext;
    use crate::stack::build_stack;

    async fn make_template() -> Value {
        let mut scb = StackConfigBuilder::default();
        let config = scb.region("us-east-1").account("123456789012").build().unwrap();
        let graph = build_stack(&config, &StaticContext::with_defaults())
            .await
            .unwrap();
        synthesize(&graph)
    }

    #[test]
    fn test_sanitize_logical_id() {
        assert_eq!(sanitize_logical_id("test-instance"), "testinstance");
        assert_eq!(sanitize_logical_id("SecurityGroup"), "SecurityGroup");
    }

    #[tokio::test]
    async fn test_template_resources() {
        let template = make_template().await;
        let resources = template["Resources"].as_object().unwrap();
        assert_eq!(resources.len(), 3);
        assert_eq!(
            template["Resources"]["SecurityGroup"]["Type"],
            "AWS::EC2::SecurityGroup"
        );
        assert_eq!(
            template["Resources"]["testinstance"]["Type"],
            "AWS::EC2::Instance"
        );
        assert_eq!(
            template["Resources"]["InstanceRecord"]["Type"],
            "AWS::Route53::RecordSet"
        );
    }

    #[tokio::test]
    async fn test_template_security_group() {
        let template = make_template().await;
        let props = &template["Resources"]["SecurityGroup"]["Properties"];
        assert_eq!(props["GroupName"], "my-test-sg");
        assert_eq!(props["VpcId"], "vpc-1");
        assert_eq!(
            props["SecurityGroupIngress"],
            json!([
                {
                    "CidrIp": "0.0.0.0/0",
                    "Description": "from 0.0.0.0/0:ICMP Type 8",
                    "IpProtocol": "icmp",
                    "FromPort": 8,
                    "ToPort": -1
                },
                {
                    "CidrIp": "0.0.0.0/0",
                    "Description": "from 0.0.0.0/0:22",
                    "IpProtocol": "tcp",
                    "FromPort": 22,
                    "ToPort": 22
                }
            ])
        );
        assert_eq!(props["SecurityGroupEgress"][0]["IpProtocol"], "-1");
    }

    #[tokio::test]
    async fn test_template_deferred_values() {
        let template = make_template().await;
        let instance = &template["Resources"]["testinstance"];
        assert_eq!(
            instance["Properties"]["NetworkInterfaces"][0]["GroupSet"],
            json!([{ "Fn::GetAtt": ["SecurityGroup", "GroupId"] }])
        );
        assert_eq!(instance["DependsOn"], json!(["SecurityGroup"]));
        let record = &template["Resources"]["InstanceRecord"];
        assert_eq!(
            record["Properties"]["ResourceRecords"],
            json!([{ "Fn::GetAtt": ["testinstance", "PublicIp"] }])
        );
        assert_eq!(record["Properties"]["Name"], "test.example.com.");
        assert_eq!(record["Properties"]["TTL"], "60");
        assert_eq!(record["DependsOn"], json!(["testinstance"]));
        assert!(template["Resources"]["SecurityGroup"]
            .get("DependsOn")
            .is_none());
    }
}

//! AWS resource catalog.
//!
//! Raw attributes follow the shape of the EC2/S3/IAM describe APIs
//! (PascalCase keys, `Tags` as a list of `{Key, Value}` pairs).

use super::{ReferenceStrength, ResourceTypeDescriptor};
use crate::types::RawAttributes;
use serde_json::{Map, Value};

pub(super) fn descriptors() -> Vec<ResourceTypeDescriptor> {
    use ReferenceStrength::{Hard, Soft};

    vec![
        ResourceTypeDescriptor::new("aws_vpc", "aws", "network")
            .identity("id")
            .field("id", "VpcId")
            .field("cidr_block", "CidrBlock")
            .field("instance_tenancy", "InstanceTenancy")
            .field("enable_dns_support", "EnableDnsSupport")
            .field("enable_dns_hostnames", "EnableDnsHostnames")
            .computed("tags", tags)
            .tags_from(tags),
        ResourceTypeDescriptor::new("aws_subnet", "aws", "network")
            .identity("id")
            .field("id", "SubnetId")
            .field("vpc_id", "VpcId")
            .field("cidr_block", "CidrBlock")
            .field("availability_zone", "AvailabilityZone")
            .field("map_public_ip_on_launch", "MapPublicIpOnLaunch")
            .computed("tags", tags)
            .tags_from(tags)
            .reference("vpc_id", "aws_vpc", Hard),
        ResourceTypeDescriptor::new("aws_internet_gateway", "aws", "network")
            .identity("id")
            .field("id", "InternetGatewayId")
            .field("vpc_id", "Attachments.0.VpcId")
            .computed("tags", tags)
            .tags_from(tags)
            .reference("vpc_id", "aws_vpc", Hard),
        ResourceTypeDescriptor::new("aws_route_table", "aws", "network")
            .identity("id")
            .field("id", "RouteTableId")
            .field("vpc_id", "VpcId")
            .computed("route", routes)
            .computed("tags", tags)
            .tags_from(tags)
            .reference("vpc_id", "aws_vpc", Hard)
            .reference("route.*.gateway_id", "aws_internet_gateway", Soft),
        ResourceTypeDescriptor::new("aws_security_group", "aws", "network")
            .identity("id")
            .field("id", "GroupId")
            .field("name", "GroupName")
            .field("description", "Description")
            .field("vpc_id", "VpcId")
            .computed("ingress", ingress)
            .computed("egress", egress)
            .computed("tags", tags)
            .tags_from(tags)
            .reference("vpc_id", "aws_vpc", Hard)
            .reference("ingress.*.security_groups", "aws_security_group", Soft)
            .reference("egress.*.security_groups", "aws_security_group", Soft),
        ResourceTypeDescriptor::new("aws_instance", "aws", "compute")
            .identity("id")
            .field("id", "InstanceId")
            .field("ami", "ImageId")
            .field("instance_type", "InstanceType")
            .field("subnet_id", "SubnetId")
            .field("key_name", "KeyName")
            .field("private_ip", "PrivateIpAddress")
            .field("vpc_security_group_ids", "SecurityGroups.*.GroupId")
            .computed("tags", tags)
            .tags_from(tags)
            .reference("subnet_id", "aws_subnet", Hard)
            .reference("vpc_security_group_ids", "aws_security_group", Hard),
        ResourceTypeDescriptor::new("aws_eip", "aws", "network")
            .identity("id")
            .field("id", "AllocationId")
            .field("domain", "Domain")
            .field("public_ip", "PublicIp")
            .field("instance", "InstanceId")
            .computed("tags", tags)
            .tags_from(tags)
            .reference("instance", "aws_instance", Hard),
        ResourceTypeDescriptor::new("aws_s3_bucket", "aws", "storage")
            .identity("bucket")
            .field("bucket", "Name")
            .computed("tags", tags)
            .tags_from(tags),
        ResourceTypeDescriptor::new("aws_iam_role", "aws", "iam")
            .identity("name")
            .field("name", "RoleName")
            .field("arn", "Arn")
            .field("path", "Path")
            .field("description", "Description")
            .field("assume_role_policy", "AssumeRolePolicyDocument")
            .field("max_session_duration", "MaxSessionDuration")
            .computed("tags", tags)
            .tags_from(tags),
    ]
}

/// `Tags: [{Key, Value}]` → `{key: value}`. Plain maps pass through.
fn tags(raw: &RawAttributes) -> Result<Option<Value>, String> {
    match raw.get("Tags") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(Value::Object(map.clone()))),
        Some(Value::Array(items)) => {
            let mut out = Map::new();
            for item in items {
                let key = item.get("Key").and_then(Value::as_str);
                let value = item.get("Value").and_then(Value::as_str);
                match (key, value) {
                    (Some(key), Some(value)) => {
                        out.insert(key.to_string(), Value::String(value.to_string()));
                    }
                    _ => return Err(format!("malformed tag entry: {item}")),
                }
            }
            Ok((!out.is_empty()).then_some(Value::Object(out)))
        }
        Some(other) => Err(format!("Tags must be a list or a map, got {other}")),
    }
}

/// Routes other than the implicit `local` route.
fn routes(raw: &RawAttributes) -> Result<Option<Value>, String> {
    let Some(items) = raw.get("Routes") else {
        return Ok(None);
    };
    let items = items
        .as_array()
        .ok_or_else(|| "Routes must be a list".to_string())?;

    let mut out = Vec::new();
    for item in items {
        let gateway = item.get("GatewayId").and_then(Value::as_str).unwrap_or_default();
        if gateway == "local" {
            continue;
        }
        let mut route = Map::new();
        if let Some(cidr) = item.get("DestinationCidrBlock") {
            route.insert("cidr_block".to_string(), cidr.clone());
        }
        if !gateway.is_empty() {
            route.insert("gateway_id".to_string(), Value::String(gateway.to_string()));
        }
        if let Some(nat) = item.get("NatGatewayId") {
            route.insert("nat_gateway_id".to_string(), nat.clone());
        }
        out.push(Value::Object(route));
    }
    Ok((!out.is_empty()).then_some(Value::Array(out)))
}

fn ingress(raw: &RawAttributes) -> Result<Option<Value>, String> {
    permissions(raw, "IpPermissions")
}

fn egress(raw: &RawAttributes) -> Result<Option<Value>, String> {
    permissions(raw, "IpPermissionsEgress")
}

/// `IpPermissions` → Terraform `ingress`/`egress` rule objects.
fn permissions(raw: &RawAttributes, key: &str) -> Result<Option<Value>, String> {
    let Some(items) = raw.get(key) else {
        return Ok(None);
    };
    let items = items
        .as_array()
        .ok_or_else(|| format!("{key} must be a list"))?;

    let mut rules = Vec::new();
    for item in items {
        let mut rule = Map::new();
        rule.insert(
            "protocol".to_string(),
            item.get("IpProtocol").cloned().unwrap_or(Value::String("-1".to_string())),
        );
        rule.insert(
            "from_port".to_string(),
            item.get("FromPort").cloned().unwrap_or(Value::from(0)),
        );
        rule.insert(
            "to_port".to_string(),
            item.get("ToPort").cloned().unwrap_or(Value::from(0)),
        );

        let cidrs: Vec<Value> = item
            .get("IpRanges")
            .and_then(Value::as_array)
            .map(|ranges| ranges.iter().filter_map(|r| r.get("CidrIp").cloned()).collect())
            .unwrap_or_default();
        rule.insert("cidr_blocks".to_string(), Value::Array(cidrs));

        let mut groups: Vec<String> = Vec::new();
        if let Some(pairs) = item.get("UserIdGroupPairs") {
            let pairs = pairs
                .as_array()
                .ok_or_else(|| "UserIdGroupPairs must be a list".to_string())?;
            for pair in pairs {
                let group = pair
                    .get("GroupId")
                    .and_then(Value::as_str)
                    .ok_or_else(|| format!("group pair without GroupId: {pair}"))?;
                groups.push(group.to_string());
            }
        }
        groups.sort();
        rule.insert(
            "security_groups".to_string(),
            Value::Array(groups.into_iter().map(Value::String).collect()),
        );

        rules.push(Value::Object(rule));
    }
    Ok(Some(Value::Array(rules)))
}

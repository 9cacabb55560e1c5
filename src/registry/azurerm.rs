//! AzureRM resource catalog.
//!
//! Raw attributes are ARM resource documents: `id`, `name`, `location`,
//! `tags` and a provider-specific `properties` object.

use super::{ReferenceStrength, ResourceTypeDescriptor};
use crate::types::RawAttributes;
use serde_json::{Map, Value};

pub(super) fn descriptors() -> Vec<ResourceTypeDescriptor> {
    use ReferenceStrength::Hard;

    vec![
        ResourceTypeDescriptor::new("azurerm_resource_group", "azurerm", "management")
            .identity("id")
            .field("id", "id")
            .field("name", "name")
            .field("location", "location")
            .computed("tags", tags)
            .tags_from(tags),
        ResourceTypeDescriptor::new("azurerm_virtual_network", "azurerm", "network")
            .identity("id")
            .field("id", "id")
            .field("name", "name")
            .field("location", "location")
            .computed("resource_group_name", resource_group_name)
            .field("address_space", "properties.addressSpace.addressPrefixes")
            .field("dns_servers", "properties.dhcpOptions.dnsServers")
            .computed("tags", tags)
            .tags_from(tags),
        ResourceTypeDescriptor::new("azurerm_subnet", "azurerm", "network")
            .identity("id")
            .field("id", "id")
            .field("name", "name")
            .computed("resource_group_name", resource_group_name)
            .computed("virtual_network_name", virtual_network_name)
            .computed("address_prefixes", address_prefixes),
        ResourceTypeDescriptor::new("azurerm_network_security_group", "azurerm", "network")
            .identity("id")
            .field("id", "id")
            .field("name", "name")
            .field("location", "location")
            .computed("resource_group_name", resource_group_name)
            .computed("security_rule", security_rules)
            .computed("tags", tags)
            .tags_from(tags),
        ResourceTypeDescriptor::new("azurerm_network_interface", "azurerm", "network")
            .identity("id")
            .field("id", "id")
            .field("name", "name")
            .field("location", "location")
            .computed("resource_group_name", resource_group_name)
            .computed("ip_configuration", ip_configurations)
            .computed("tags", tags)
            .tags_from(tags)
            .reference("ip_configuration.*.subnet_id", "azurerm_subnet", Hard),
        ResourceTypeDescriptor::new("azurerm_linux_virtual_machine", "azurerm", "compute")
            .identity("id")
            .field("id", "id")
            .field("name", "name")
            .field("location", "location")
            .computed("resource_group_name", resource_group_name)
            .field("size", "properties.hardwareProfile.vmSize")
            .field("admin_username", "properties.osProfile.adminUsername")
            .field(
                "network_interface_ids",
                "properties.networkProfile.networkInterfaces.*.id",
            )
            .computed("tags", tags)
            .tags_from(tags)
            .reference("network_interface_ids", "azurerm_network_interface", Hard),
    ]
}

fn tags(raw: &RawAttributes) -> Result<Option<Value>, String> {
    match raw.get("tags") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) if map.is_empty() => Ok(None),
        Some(Value::Object(map)) => Ok(Some(Value::Object(map.clone()))),
        Some(other) => Err(format!("tags must be a map, got {other}")),
    }
}

/// The segment following `key` in an ARM id (`/.../resourceGroups/<name>/...`).
fn arm_segment(id: &str, key: &str) -> Option<String> {
    let mut parts = id.split('/');
    while let Some(part) = parts.next() {
        if part.eq_ignore_ascii_case(key) {
            return parts.next().filter(|s| !s.is_empty()).map(str::to_string);
        }
    }
    None
}

fn arm_id(raw: &RawAttributes) -> Result<Option<&str>, String> {
    match raw.get("id") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(id)) => Ok(Some(id)),
        Some(other) => Err(format!("id must be a string, got {other}")),
    }
}

fn resource_group_name(raw: &RawAttributes) -> Result<Option<Value>, String> {
    Ok(arm_id(raw)?
        .and_then(|id| arm_segment(id, "resourceGroups"))
        .map(Value::String))
}

fn virtual_network_name(raw: &RawAttributes) -> Result<Option<Value>, String> {
    Ok(arm_id(raw)?
        .and_then(|id| arm_segment(id, "virtualNetworks"))
        .map(Value::String))
}

/// `addressPrefixes`, falling back to the legacy single `addressPrefix`.
fn address_prefixes(raw: &RawAttributes) -> Result<Option<Value>, String> {
    let Some(properties) = raw.get("properties") else {
        return Ok(None);
    };
    if let Some(prefixes) = properties.get("addressPrefixes") {
        return match prefixes {
            Value::Array(_) => Ok(Some(prefixes.clone())),
            other => Err(format!("addressPrefixes must be a list, got {other}")),
        };
    }
    Ok(properties
        .get("addressPrefix")
        .and_then(Value::as_str)
        .map(|prefix| Value::Array(vec![Value::String(prefix.to_string())])))
}

fn ip_configurations(raw: &RawAttributes) -> Result<Option<Value>, String> {
    let Some(items) = raw.get("properties").and_then(|p| p.get("ipConfigurations")) else {
        return Ok(None);
    };
    let items = items
        .as_array()
        .ok_or_else(|| "ipConfigurations must be a list".to_string())?;

    let configurations = items
        .iter()
        .map(|item| {
            let properties = item.get("properties").cloned().unwrap_or(Value::Null);
            let mut configuration = Map::new();
            if let Some(name) = item.get("name") {
                configuration.insert("name".to_string(), name.clone());
            }
            if let Some(subnet) = properties.get("subnet").and_then(|s| s.get("id")) {
                configuration.insert("subnet_id".to_string(), subnet.clone());
            }
            configuration.insert(
                "private_ip_address_allocation".to_string(),
                properties
                    .get("privateIPAllocationMethod")
                    .cloned()
                    .unwrap_or_else(|| Value::String("Dynamic".to_string())),
            );
            if let Some(address) = properties.get("privateIPAddress") {
                configuration.insert("private_ip_address".to_string(), address.clone());
            }
            Value::Object(configuration)
        })
        .collect();
    Ok(Some(Value::Array(configurations)))
}

const RULE_FIELDS: [(&str, &str); 8] = [
    ("priority", "priority"),
    ("direction", "direction"),
    ("access", "access"),
    ("protocol", "protocol"),
    ("source_port_range", "sourcePortRange"),
    ("destination_port_range", "destinationPortRange"),
    ("source_address_prefix", "sourceAddressPrefix"),
    ("destination_address_prefix", "destinationAddressPrefix"),
];

fn security_rules(raw: &RawAttributes) -> Result<Option<Value>, String> {
    let Some(items) = raw.get("properties").and_then(|p| p.get("securityRules")) else {
        return Ok(None);
    };
    let items = items
        .as_array()
        .ok_or_else(|| "securityRules must be a list".to_string())?;

    let mut rules: Vec<Value> = items
        .iter()
        .map(|item| {
            let properties = item.get("properties").cloned().unwrap_or(Value::Null);
            let mut rule = Map::new();
            if let Some(name) = item.get("name") {
                rule.insert("name".to_string(), name.clone());
            }
            for (target, source) in RULE_FIELDS {
                if let Some(value) = properties.get(source) {
                    rule.insert(target.to_string(), value.clone());
                }
            }
            Value::Object(rule)
        })
        .collect();
    rules.sort_by_key(|rule| rule.get("priority").and_then(Value::as_i64).unwrap_or(i64::MAX));
    Ok(Some(Value::Array(rules)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawAttributes {
        value.as_object().cloned().unwrap()
    }

    const SUBNET_ID: &str = "/subscriptions/0000/resourceGroups/rg-app/providers/Microsoft.Network/virtualNetworks/vnet-app/subnets/web";

    #[test]
    fn test_arm_segments() {
        assert_eq!(arm_segment(SUBNET_ID, "resourceGroups"), Some("rg-app".to_string()));
        assert_eq!(arm_segment(SUBNET_ID, "virtualnetworks"), Some("vnet-app".to_string()));
        assert_eq!(arm_segment(SUBNET_ID, "networkInterfaces"), None);
    }

    #[test]
    fn test_address_prefix_fallback() {
        let value = address_prefixes(&raw(json!({"properties": {"addressPrefix": "10.1.0.0/24"}})))
            .unwrap();
        assert_eq!(value, Some(json!(["10.1.0.0/24"])));
    }

    #[test]
    fn test_ip_configuration_subnet() {
        let value = ip_configurations(&raw(json!({
            "properties": {"ipConfigurations": [{
                "name": "primary",
                "properties": {"subnet": {"id": SUBNET_ID}, "privateIPAllocationMethod": "Static"}
            }]}
        })))
        .unwrap()
        .unwrap();
        assert_eq!(value[0]["subnet_id"], json!(SUBNET_ID));
        assert_eq!(value[0]["private_ip_address_allocation"], json!("Static"));
    }

    #[test]
    fn test_security_rules_by_priority() {
        let value = security_rules(&raw(json!({
            "properties": {"securityRules": [
                {"name": "b", "properties": {"priority": 200}},
                {"name": "a", "properties": {"priority": 100}}
            ]}
        })))
        .unwrap()
        .unwrap();
        assert_eq!(value[0]["name"], json!("a"));
    }
}

//! `zia_firewall_filtering_ip_source_groups`

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::ObjectType;
use crate::client::services::ApiObject;
use crate::core::error::Result;
use crate::provider::{Attribute, Diagnostic, Diagnostics, ResourceData};
use crate::resources::common::{expand_set, flatten_set, is_zero};
use crate::validators;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpSourceGroup {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub ip_addresses: Vec<String>,
}

impl ApiObject for IpSourceGroup {
    const PATH: &'static str = "/ipSourceGroups";
    const KIND: &'static str = "IP source group";

    fn id(&self) -> i64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl ObjectType for IpSourceGroup {
    const TYPE_NAME: &'static str = "zia_firewall_filtering_ip_source_groups";
    const DESCRIPTION: &'static str = "Group of source IP addresses for firewall rules";

    fn attributes() -> Vec<(&'static str, Attribute)> {
        vec![(
            "ip_addresses",
            Attribute::set().describe("Source IPs, ranges or CIDRs"),
        )]
    }

    fn validate(data: &ResourceData) -> Diagnostics {
        let mut diags = Diagnostics::new();
        for ip in data.get_strings("ip_addresses") {
            if let Err(message) = validators::validate_ip_address(&ip) {
                diags.push(Diagnostic::error("Invalid IP address", message).at("ip_addresses"));
            }
        }
        diags
    }

    fn expand(data: &ResourceData) -> Result<Self> {
        Ok(Self {
            id: data.numeric_id().unwrap_or_default(),
            name: data.get_string("name"),
            description: data.get_string("description"),
            ip_addresses: expand_set(data, "ip_addresses"),
        })
    }

    fn flatten(&self, data: &mut ResourceData) {
        data.set("name", json!(self.name));
        data.set("description", json!(self.description));
        data.set("ip_addresses", flatten_set(&self.ip_addresses));
    }
}

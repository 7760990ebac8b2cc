//! `zia_firewall_filtering_destination_groups`

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::ObjectType;
use crate::client::services::ApiObject;
use crate::core::error::Result;
use crate::provider::{Attribute, Diagnostic, Diagnostics, ResourceData};
use crate::resources::common::{expand_set, flatten_set, is_zero, non_empty};
use crate::validators::{self, DestinationGroupType};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpDestinationGroup {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub group_type: Option<String>,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde(default)]
    pub ip_categories: Vec<String>,
}

impl ApiObject for IpDestinationGroup {
    const PATH: &'static str = "/ipDestinationGroups";
    const KIND: &'static str = "IP destination group";

    fn id(&self) -> i64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl ObjectType for IpDestinationGroup {
    const TYPE_NAME: &'static str = "zia_firewall_filtering_destination_groups";
    const DESCRIPTION: &'static str = "Group of destination addresses for firewall rules";

    fn attributes() -> Vec<(&'static str, Attribute)> {
        vec![
            (
                "type",
                Attribute::string()
                    .optional_computed()
                    .force_new()
                    .validate_str(validators::validate_destination_group_type)
                    .describe("DSTN_IP, DSTN_FQDN, DSTN_DOMAIN or DSTN_OTHER"),
            ),
            (
                "addresses",
                Attribute::set().describe("Destination IPs, CIDRs, FQDNs or domains"),
            ),
            (
                "countries",
                Attribute::set().describe("Destination countries (COUNTRY_XX)"),
            ),
            (
                "ip_categories",
                Attribute::set().describe("Destination URL categories"),
            ),
        ]
    }

    fn validate(data: &ResourceData) -> Diagnostics {
        let mut diags = Diagnostics::new();
        for country in data.get_strings("countries") {
            if let Err(message) = validators::validate_country_code(&country) {
                diags.push(Diagnostic::error("Invalid country", message).at("countries"));
            }
        }

        let group_type = data
            .get_str("type")
            .and_then(|t| DestinationGroupType::from_str(t).ok());
        if group_type == Some(DestinationGroupType::DstnIp) {
            for address in data.get_strings("addresses") {
                if let Err(message) = validators::validate_ip_address(&address) {
                    diags.push(Diagnostic::error("Invalid IP address", message).at("addresses"));
                }
            }
        }
        if matches!(
            group_type,
            Some(DestinationGroupType::DstnFqdn | DestinationGroupType::DstnDomain)
        ) {
            for address in data.get_strings("addresses") {
                if let Err(message) = validators::validate_fqdn(&address) {
                    diags.push(Diagnostic::error("Invalid domain", message).at("addresses"));
                }
            }
        }
        diags
    }

    fn expand(data: &ResourceData) -> Result<Self> {
        Ok(Self {
            id: data.numeric_id().unwrap_or_default(),
            name: data.get_string("name"),
            description: data.get_string("description"),
            group_type: non_empty(data.get_string("type")),
            addresses: expand_set(data, "addresses"),
            countries: expand_set(data, "countries"),
            ip_categories: expand_set(data, "ip_categories"),
        })
    }

    fn flatten(&self, data: &mut ResourceData) {
        data.set("name", json!(self.name));
        data.set("description", json!(self.description));
        data.set("type", json!(self.group_type));
        data.set("addresses", flatten_set(&self.addresses));
        data.set("countries", flatten_set(&self.countries));
        data.set("ip_categories", flatten_set(&self.ip_categories));
    }
}

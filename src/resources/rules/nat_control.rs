//! `zia_nat_control_rules`

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{PolicyRule, RuleBase, rule_api_object};
use crate::core::error::Result;
use crate::provider::{Attribute, Diagnostic, Diagnostics, ResourceData};
use crate::resources::common::{
    IdNameExtension, expand_id_set, expand_set, flatten_id_set, flatten_set, id_set_attribute,
    non_empty,
};
use crate::validators;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NatControlRule {
    #[serde(flatten)]
    pub base: RuleBase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_fqdn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_port: Option<i32>,
    #[serde(default)]
    pub enable_full_logging: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub src_ips: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dest_addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<IdNameExtension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nw_services: Vec<IdNameExtension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dest_ip_groups: Vec<IdNameExtension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<IdNameExtension>,
}

rule_api_object!(NatControlRule, "/dnatRules", "NAT control rule");

impl PolicyRule for NatControlRule {
    const TYPE_NAME: &'static str = "zia_nat_control_rules";
    const DESCRIPTION: &'static str = "Destination NAT control rule";
    const ORDER_KEY: &'static str = "nat_control_rules";

    fn attributes() -> Vec<(&'static str, Attribute)> {
        vec![
            (
                "redirect_ip",
                Attribute::string()
                    .validate_str(validators::validate_ip_address)
                    .describe("Translated destination IP"),
            ),
            (
                "redirect_fqdn",
                Attribute::string()
                    .validate_str(validators::validate_fqdn)
                    .describe("Translated destination FQDN"),
            ),
            (
                "redirect_port",
                Attribute::int()
                    .validate_int(validators::validate_port)
                    .describe("Translated destination port"),
            ),
            (
                "enable_full_logging",
                Attribute::bool().describe("Log every matched session"),
            ),
            ("src_ips", Attribute::set().describe("Source IPs, ranges or CIDRs")),
            (
                "dest_addresses",
                Attribute::set().describe("Destination IPs, ranges, CIDRs or FQDNs"),
            ),
            ("locations", id_set_attribute("Location ids")),
            ("nw_services", id_set_attribute("Network service ids")),
            ("dest_ip_groups", id_set_attribute("Destination IP group ids")),
            ("labels", id_set_attribute("Rule label ids")),
        ]
    }

    fn validate(data: &ResourceData) -> Diagnostics {
        let has_ip = data.get_str("redirect_ip").is_some_and(|s| !s.is_empty());
        let has_fqdn = data.get_str("redirect_fqdn").is_some_and(|s| !s.is_empty());
        let mut diags = Diagnostics::new();
        if has_ip == has_fqdn {
            diags.push(
                Diagnostic::error(
                    "Invalid redirect target",
                    "exactly one of redirect_ip or redirect_fqdn must be set",
                )
                .at("redirect_ip"),
            );
        }
        diags
    }

    fn expand(data: &ResourceData) -> Result<Self> {
        Ok(Self {
            base: RuleBase::from_data(data),
            redirect_ip: non_empty(data.get_string("redirect_ip")),
            redirect_fqdn: non_empty(data.get_string("redirect_fqdn")),
            redirect_port: data.get_i32("redirect_port"),
            enable_full_logging: data.get_bool("enable_full_logging"),
            src_ips: expand_set(data, "src_ips"),
            dest_addresses: expand_set(data, "dest_addresses"),
            locations: expand_id_set(data, "locations"),
            nw_services: expand_id_set(data, "nw_services"),
            dest_ip_groups: expand_id_set(data, "dest_ip_groups"),
            labels: expand_id_set(data, "labels"),
        })
    }

    fn flatten(&self, data: &mut ResourceData) {
        data.set("redirect_ip", json!(self.redirect_ip));
        data.set("redirect_fqdn", json!(self.redirect_fqdn));
        data.set("redirect_port", json!(self.redirect_port));
        data.set("enable_full_logging", json!(self.enable_full_logging));
        data.set("src_ips", flatten_set(&self.src_ips));
        data.set("dest_addresses", flatten_set(&self.dest_addresses));
        data.set("locations", flatten_id_set(&self.locations));
        data.set("nw_services", flatten_id_set(&self.nw_services));
        data.set("dest_ip_groups", flatten_id_set(&self.dest_ip_groups));
        data.set("labels", flatten_id_set(&self.labels));
    }
}

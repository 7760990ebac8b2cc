//! `zia_firewall_dns_rule`

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{PolicyRule, RuleBase, rule_api_object};
use crate::core::error::Result;
use crate::provider::{Attribute, Diagnostic, Diagnostics, ResourceData};
use crate::resources::common::{
    IdNameExtension, expand_id_set, expand_set, expand_single_ref, flatten_id_set, flatten_set,
    flatten_single_ref, id_set_attribute, non_empty,
};
use crate::validators::{self, DnsAction};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallDnsRule {
    #[serde(flatten)]
    pub base: RuleBase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_response_code: Option<String>,
    #[serde(default)]
    pub capture_pcap: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protocols: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub src_ips: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dest_addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applications: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dest_ip_categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub res_categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<IdNameExtension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<IdNameExtension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<IdNameExtension>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_gateway: Option<IdNameExtension>,
}

rule_api_object!(FirewallDnsRule, "/firewallDnsRules", "firewall DNS rule");

impl PolicyRule for FirewallDnsRule {
    const TYPE_NAME: &'static str = "zia_firewall_dns_rule";
    const DESCRIPTION: &'static str = "Cloud firewall DNS rule";
    const ORDER_KEY: &'static str = "firewall_dns_rules";

    fn attributes() -> Vec<(&'static str, Attribute)> {
        vec![
            (
                "action",
                Attribute::string()
                    .optional_computed()
                    .validate_str(validators::validate_dns_action)
                    .describe("Action taken on matching DNS traffic"),
            ),
            (
                "redirect_ip",
                Attribute::string()
                    .validate_str(validators::validate_ip_address)
                    .describe("Redirect target; required by REDIR_* actions"),
            ),
            (
                "block_response_code",
                Attribute::string()
                    .validate_str(validators::validate_dns_block_response_code)
                    .describe("Response code sent for blocked queries"),
            ),
            (
                "capture_pcap",
                Attribute::bool().describe("Capture packets of matching traffic"),
            ),
            ("protocols", Attribute::set().describe("DNS protocols")),
            ("src_ips", Attribute::set().describe("Source IPs, ranges or CIDRs")),
            (
                "dest_addresses",
                Attribute::set().describe("Destination IPs, ranges, CIDRs or FQDNs"),
            ),
            ("applications", Attribute::set().describe("DNS tunnel applications")),
            (
                "dest_ip_categories",
                Attribute::set().describe("Destination URL categories"),
            ),
            (
                "res_categories",
                Attribute::set().describe("Categories of resolved addresses"),
            ),
            ("locations", id_set_attribute("Location ids")),
            ("groups", id_set_attribute("Group ids")),
            ("labels", id_set_attribute("Rule label ids")),
            (
                "dns_gateway",
                id_set_attribute("DNS gateway used by REDIR_ZPA and gateway redirects").max_items(1),
            ),
        ]
    }

    fn validate(data: &ResourceData) -> Diagnostics {
        let mut diags = Diagnostics::new();
        if let Some(action) = data.get_str("action").and_then(|a| DnsAction::from_str(a).ok())
            && action.needs_redirect_ip()
            && data.get_str("redirect_ip").is_none_or(str::is_empty)
        {
            diags.push(
                Diagnostic::error(
                    "Missing redirect_ip",
                    format!("redirect_ip is required when action is {}", action.as_ref()),
                )
                .at("redirect_ip"),
            );
        }
        for protocol in data.get_strings("protocols") {
            if let Err(message) = validators::validate_dns_protocol(&protocol) {
                diags.push(Diagnostic::error("Invalid protocol", message).at("protocols"));
            }
        }
        for ip in data.get_strings("src_ips") {
            if let Err(message) = validators::validate_ip_address(&ip) {
                diags.push(Diagnostic::error("Invalid source IP", message).at("src_ips"));
            }
        }
        diags
    }

    fn expand(data: &ResourceData) -> Result<Self> {
        Ok(Self {
            base: RuleBase::from_data(data),
            action: non_empty(data.get_string("action")),
            redirect_ip: non_empty(data.get_string("redirect_ip")),
            block_response_code: non_empty(data.get_string("block_response_code")),
            capture_pcap: data.get_bool("capture_pcap"),
            protocols: expand_set(data, "protocols"),
            src_ips: expand_set(data, "src_ips"),
            dest_addresses: expand_set(data, "dest_addresses"),
            applications: expand_set(data, "applications"),
            dest_ip_categories: expand_set(data, "dest_ip_categories"),
            res_categories: expand_set(data, "res_categories"),
            locations: expand_id_set(data, "locations"),
            groups: expand_id_set(data, "groups"),
            labels: expand_id_set(data, "labels"),
            dns_gateway: expand_single_ref(data, "dns_gateway"),
        })
    }

    fn flatten(&self, data: &mut ResourceData) {
        data.set("action", json!(self.action));
        data.set("redirect_ip", json!(self.redirect_ip));
        data.set("block_response_code", json!(self.block_response_code));
        data.set("capture_pcap", json!(self.capture_pcap));
        data.set("protocols", flatten_set(&self.protocols));
        data.set("src_ips", flatten_set(&self.src_ips));
        data.set("dest_addresses", flatten_set(&self.dest_addresses));
        data.set("applications", flatten_set(&self.applications));
        data.set("dest_ip_categories", flatten_set(&self.dest_ip_categories));
        data.set("res_categories", flatten_set(&self.res_categories));
        data.set("locations", flatten_id_set(&self.locations));
        data.set("groups", flatten_id_set(&self.groups));
        data.set("labels", flatten_id_set(&self.labels));
        data.set("dns_gateway", flatten_single_ref(self.dns_gateway.as_ref()));
    }
}

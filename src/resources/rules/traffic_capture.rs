//! `zia_traffic_capture_rules`

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
pub struct TrafficCaptureRule {
    #[serde(flatten)]
    pub base: RuleBase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txn_size_limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txn_sampling: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub src_ips: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dest_addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<IdNameExtension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<IdNameExtension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<IdNameExtension>,
}

rule_api_object!(
    TrafficCaptureRule,
    "/trafficCaptureRules",
    "traffic capture rule"
);

impl PolicyRule for TrafficCaptureRule {
    const TYPE_NAME: &'static str = "zia_traffic_capture_rules";
    const DESCRIPTION: &'static str = "Traffic capture rule";
    const ORDER_KEY: &'static str = "traffic_capture_rules";

    fn attributes() -> Vec<(&'static str, Attribute)> {
        vec![
            (
                "action",
                Attribute::string()
                    .optional_computed()
                    .validate_str(validators::validate_traffic_capture_action)
                    .describe("CAPTURE or SKIP"),
            ),
            (
                "txn_size_limit",
                Attribute::string()
                    .validate_str(validators::validate_txn_size_limit)
                    .describe("Captured bytes per transaction"),
            ),
            (
                "txn_sampling",
                Attribute::string()
                    .validate_str(validators::validate_txn_sampling)
                    .describe("Share of transactions captured"),
            ),
            ("src_ips", Attribute::set().describe("Source IPs, ranges or CIDRs")),
            (
                "dest_addresses",
                Attribute::set().describe("Destination IPs, ranges, CIDRs or FQDNs"),
            ),
            ("locations", id_set_attribute("Location ids")),
            ("groups", id_set_attribute("Group ids")),
            ("labels", id_set_attribute("Rule label ids")),
        ]
    }

    fn validate(data: &ResourceData) -> Diagnostics {
        let mut diags = Diagnostics::new();
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
            txn_size_limit: non_empty(data.get_string("txn_size_limit")),
            txn_sampling: non_empty(data.get_string("txn_sampling")),
            src_ips: expand_set(data, "src_ips"),
            dest_addresses: expand_set(data, "dest_addresses"),
            locations: expand_id_set(data, "locations"),
            groups: expand_id_set(data, "groups"),
            labels: expand_id_set(data, "labels"),
        })
    }

    fn flatten(&self, data: &mut ResourceData) {
        data.set("action", json!(self.action));
        data.set("txn_size_limit", json!(self.txn_size_limit));
        data.set("txn_sampling", json!(self.txn_sampling));
        data.set("src_ips", flatten_set(&self.src_ips));
        data.set("dest_addresses", flatten_set(&self.dest_addresses));
        data.set("locations", flatten_id_set(&self.locations));
        data.set("groups", flatten_id_set(&self.groups));
        data.set("labels", flatten_id_set(&self.labels));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{Map, Value, json};

    use crate::core::test_helpers::{MemoryBackend, fast_provider};
    use crate::provider::Provider;

    const TYPE: &str = "zia_traffic_capture_rules";
    const PATH: &str = "/trafficCaptureRules";

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_enum_attributes() {
        let provider = Provider::new();
        let good = map(json!({
            "name": "cap", "order": 1, "action": "CAPTURE",
            "txn_size_limit": "THIRTY_TWO_KB", "txn_sampling": "TEN_PERCENT"
        }));
        assert!(!provider.validate_resource_config(TYPE, &good).has_errors());

        let bad = map(json!({ "name": "cap", "order": 1, "action": "RECORD" }));
        assert!(provider.validate_resource_config(TYPE, &bad).has_errors());
    }

    #[tokio::test]
    async fn test_concurrent_creates_into_empty_policy() {
        let backend = Arc::new(MemoryBackend::new());
        let provider = Arc::new(fast_provider(Arc::clone(&backend)));

        let mut handles = Vec::new();
        for order in [2, 1, 3] {
            let provider = Arc::clone(&provider);
            handles.push(tokio::spawn(async move {
                let config = map(json!({ "name": format!("cap-{order}"), "order": order }));
                let data = provider.create(TYPE, config).await.unwrap();
                (data.numeric_id().unwrap(), order)
            }));
        }
        let mut expected = Vec::new();
        for handle in handles {
            expected.push(handle.await.unwrap());
        }
        expected.sort_by_key(|(_, order)| *order);

        assert_eq!(backend.orders(PATH), expected);
    }
}

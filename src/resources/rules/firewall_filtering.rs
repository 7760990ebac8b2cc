//! `zia_firewall_filtering_rule`

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
pub struct FirewallFilteringRule {
    #[serde(flatten)]
    pub base: RuleBase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default)]
    pub enable_full_logging: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub src_ips: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dest_addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dest_countries: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dest_ip_categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nw_applications: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub device_trust_levels: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<IdNameExtension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub src_ip_groups: Vec<IdNameExtension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dest_ip_groups: Vec<IdNameExtension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<IdNameExtension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub departments: Vec<IdNameExtension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<IdNameExtension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<IdNameExtension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nw_services: Vec<IdNameExtension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub location_groups: Vec<IdNameExtension>,
}

rule_api_object!(
    FirewallFilteringRule,
    "/firewallFilteringRules",
    "firewall filtering rule"
);

const REFERENCES: [&str; 9] = [
    "labels",
    "src_ip_groups",
    "dest_ip_groups",
    "locations",
    "departments",
    "groups",
    "users",
    "nw_services",
    "location_groups",
];

impl PolicyRule for FirewallFilteringRule {
    const TYPE_NAME: &'static str = "zia_firewall_filtering_rule";
    const DESCRIPTION: &'static str = "Cloud firewall filtering rule";
    const ORDER_KEY: &'static str = "firewall_filtering_rules";

    fn attributes() -> Vec<(&'static str, Attribute)> {
        let mut attributes = vec![
            (
                "action",
                Attribute::string()
                    .optional_computed()
                    .validate_str(validators::validate_firewall_action)
                    .describe("Action taken when traffic matches the rule"),
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
            (
                "dest_countries",
                Attribute::set().describe("Destination countries (COUNTRY_XX)"),
            ),
            (
                "dest_ip_categories",
                Attribute::set().describe("Destination URL categories"),
            ),
            (
                "nw_applications",
                Attribute::set().describe("Network applications"),
            ),
            (
                "device_trust_levels",
                Attribute::set().describe("Device trust levels"),
            ),
        ];
        attributes.extend(
            REFERENCES
                .iter()
                .map(|name| (*name, id_set_attribute("Referenced object ids"))),
        );
        attributes
    }

    fn validate(data: &ResourceData) -> Diagnostics {
        let mut diags = Diagnostics::new();
        for ip in data.get_strings("src_ips") {
            if let Err(message) = validators::validate_ip_address(&ip) {
                diags.push(Diagnostic::error("Invalid source IP", message).at("src_ips"));
            }
        }
        for address in data.get_strings("dest_addresses") {
            if let Err(message) = validators::validate_destination_address(&address) {
                diags.push(
                    Diagnostic::error("Invalid destination address", message)
                        .at("dest_addresses"),
                );
            }
        }
        for level in data.get_strings("device_trust_levels") {
            if let Err(message) = validators::validate_device_trust_level(&level) {
                diags.push(
                    Diagnostic::error("Invalid device trust level", message)
                        .at("device_trust_levels"),
                );
            }
        }
        diags
    }

    fn expand(data: &ResourceData) -> Result<Self> {
        Ok(Self {
            base: RuleBase::from_data(data),
            action: non_empty(data.get_string("action")),
            enable_full_logging: data.get_bool("enable_full_logging"),
            src_ips: expand_set(data, "src_ips"),
            dest_addresses: expand_set(data, "dest_addresses"),
            dest_countries: expand_set(data, "dest_countries"),
            dest_ip_categories: expand_set(data, "dest_ip_categories"),
            nw_applications: expand_set(data, "nw_applications"),
            device_trust_levels: expand_set(data, "device_trust_levels"),
            labels: expand_id_set(data, "labels"),
            src_ip_groups: expand_id_set(data, "src_ip_groups"),
            dest_ip_groups: expand_id_set(data, "dest_ip_groups"),
            locations: expand_id_set(data, "locations"),
            departments: expand_id_set(data, "departments"),
            groups: expand_id_set(data, "groups"),
            users: expand_id_set(data, "users"),
            nw_services: expand_id_set(data, "nw_services"),
            location_groups: expand_id_set(data, "location_groups"),
        })
    }

    fn flatten(&self, data: &mut ResourceData) {
        data.set("action", json!(self.action));
        data.set("enable_full_logging", json!(self.enable_full_logging));
        data.set("src_ips", flatten_set(&self.src_ips));
        data.set("dest_addresses", flatten_set(&self.dest_addresses));
        data.set("dest_countries", flatten_set(&self.dest_countries));
        data.set("dest_ip_categories", flatten_set(&self.dest_ip_categories));
        data.set("nw_applications", flatten_set(&self.nw_applications));
        data.set("device_trust_levels", flatten_set(&self.device_trust_levels));
        data.set("labels", flatten_id_set(&self.labels));
        data.set("src_ip_groups", flatten_id_set(&self.src_ip_groups));
        data.set("dest_ip_groups", flatten_id_set(&self.dest_ip_groups));
        data.set("locations", flatten_id_set(&self.locations));
        data.set("departments", flatten_id_set(&self.departments));
        data.set("groups", flatten_id_set(&self.groups));
        data.set("users", flatten_id_set(&self.users));
        data.set("nw_services", flatten_id_set(&self.nw_services));
        data.set("location_groups", flatten_id_set(&self.location_groups));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{Map, Value, json};

    use crate::client::HttpMethod;
    use crate::core::test_helpers::{MemoryBackend, fast_provider, invalid_input};
    use crate::provider::Provider;

    const TYPE: &str = "zia_firewall_filtering_rule";
    const PATH: &str = "/firewallFilteringRules";

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn rule(name: &str, order: i64) -> Map<String, Value> {
        map(json!({ "name": name, "order": order, "action": "ALLOW" }))
    }

    fn seeded(count: i64) -> Arc<MemoryBackend> {
        let backend = Arc::new(MemoryBackend::new());
        for order in 1..=count {
            backend.seed(
                PATH,
                json!({ "id": order, "name": format!("existing-{order}"), "order": order, "rank": 7 }),
            );
        }
        backend
    }

    async fn create(provider: &Provider, name: &str, order: i64) -> i64 {
        let data = provider.create(TYPE, rule(name, order)).await.unwrap();
        data.numeric_id().unwrap()
    }

    #[tokio::test]
    async fn test_create_lands_at_requested_order() {
        let backend = seeded(3);
        let provider = fast_provider(Arc::clone(&backend));

        let data = provider.create(TYPE, rule("allow-dns", 2)).await.unwrap();
        let id = data.numeric_id().unwrap();

        assert_eq!(data.get_i64("order"), Some(2));
        assert_eq!(data.get_i64("rank"), Some(7));
        assert_eq!(data.get_i64("rule_id"), Some(id));
        assert_eq!(backend.orders(PATH)[1], (id, 2));
    }

    #[tokio::test]
    async fn test_create_retries_invalid_input() {
        let backend = seeded(1);
        backend.fail_next(HttpMethod::Post, PATH, invalid_input("INVALID_INPUT_ARGUMENT"));
        let provider = fast_provider(Arc::clone(&backend));

        create(&provider, "retry", 1).await;
        assert_eq!(backend.count_requests(HttpMethod::Post, PATH), 2);
    }

    #[tokio::test]
    async fn test_rank_conflict_fails_fast_with_layout() {
        let backend = seeded(2);
        backend.fail_next(
            HttpMethod::Post,
            PATH,
            invalid_input("Rule with rank 7 is not allowed at order 1"),
        );
        let provider = fast_provider(Arc::clone(&backend));

        let diags = provider.create(TYPE, rule("conflict", 1)).await.unwrap_err();
        assert_eq!(backend.count_requests(HttpMethod::Post, PATH), 1);
        let text = diags.to_string();
        assert!(text.contains("order 1 (rank 7)"), "{text}");
    }

    #[tokio::test]
    async fn test_concurrent_creates_end_in_requested_order() {
        let backend = seeded(2);
        let provider = Arc::new(fast_provider(Arc::clone(&backend)));

        let mut handles = Vec::new();
        for (name, order) in [("c", 3), ("a", 1), ("b", 2)] {
            let provider = Arc::clone(&provider);
            handles.push(tokio::spawn(async move {
                (order, create(&provider, name, order).await)
            }));
        }
        let mut created = Vec::new();
        for handle in handles {
            created.push(handle.await.unwrap());
        }

        let orders = backend.orders(PATH);
        for (order, id) in created {
            assert!(orders.contains(&(id, order)), "{id} not at {order}: {orders:?}");
        }
        let meta = provider.meta().unwrap();
        assert_eq!(meta.orderer.pending_count("firewall_filtering_rules").await, 0);
    }

    #[tokio::test]
    async fn test_update_moves_rule() {
        let backend = seeded(3);
        let provider = fast_provider(Arc::clone(&backend));
        let id = create(&provider, "mover", 4).await;

        let prior = map(json!({ "name": "mover", "order": 4 }));
        let updated = provider
            .update(TYPE, &id.to_string(), prior, rule("mover", 1))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.get_i64("order"), Some(1));
        assert_eq!(backend.orders(PATH)[0], (id, 1));
    }

    #[tokio::test]
    async fn test_update_without_move_keeps_position() {
        let backend = seeded(2);
        let provider = fast_provider(Arc::clone(&backend));
        let id = create(&provider, "stay", 2).await;

        let mut config = rule("stay", 2);
        config.insert("description".into(), json!("edited"));
        let updated = provider
            .update(TYPE, &id.to_string(), rule("stay", 2), config)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.get_str("description"), Some("edited"));
        assert_eq!(backend.orders(PATH)[1], (id, 2));
    }

    #[tokio::test]
    async fn test_missing_rule_is_dropped_from_state() {
        let backend = seeded(1);
        let provider = fast_provider(Arc::clone(&backend));

        assert!(provider.read(TYPE, "999", rule("gone", 1)).await.unwrap().is_none());
        assert!(provider
            .update(TYPE, "999", rule("gone", 1), rule("gone", 1))
            .await
            .unwrap()
            .is_none());
        provider.delete(TYPE, "999", rule("gone", 1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_predefined_rules_are_refused() {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed(
            PATH,
            json!({ "id": 5, "name": "Default Firewall Filtering Rule", "order": 1, "rank": 7, "defaultRule": true }),
        );
        let provider = fast_provider(Arc::clone(&backend));

        let err = provider.delete(TYPE, "5", Map::new()).await.unwrap_err();
        assert!(err.to_string().contains("predefined"));
        assert!(backend.object(PATH, 5).is_some());
    }

    #[tokio::test]
    async fn test_import_by_name_and_id() {
        let backend = seeded(2);
        let provider = fast_provider(Arc::clone(&backend));

        let by_name = provider.import(TYPE, "EXISTING-2").await.unwrap();
        assert_eq!(by_name.id(), Some("2"));
        assert_eq!(by_name.get_str("name"), Some("existing-2"));

        let by_id = provider.import(TYPE, "1").await.unwrap();
        assert_eq!(by_id.get_i64("order"), Some(1));

        assert!(provider.import(TYPE, "missing").await.is_err());
    }

    #[tokio::test]
    async fn test_payload_uses_reference_blocks() {
        let backend = Arc::new(MemoryBackend::new());
        let provider = fast_provider(Arc::clone(&backend));
        let mut config = rule("refs", 1);
        config.insert("labels".into(), json!([{ "id": [12, 3] }]));
        config.insert("src_ips".into(), json!(["10.0.0.0/8"]));

        let id = provider.create(TYPE, config).await.unwrap().numeric_id().unwrap();

        let stored = backend.object(PATH, id).unwrap();
        assert_eq!(stored["labels"], json!([{ "id": 3 }, { "id": 12 }]));
        assert_eq!(stored["srcIps"], json!(["10.0.0.0/8"]));
    }

    #[tokio::test]
    async fn test_data_source_by_id_and_name() {
        let backend = seeded(3);
        let provider = fast_provider(Arc::clone(&backend));

        let by_id = provider.read_data_source(TYPE, map(json!({ "id": 2 }))).await.unwrap();
        assert_eq!(by_id["name"], json!("existing-2"));
        assert_eq!(by_id["order"], json!(2));
        assert_eq!(by_id["rule_id"], json!(2));

        let by_name = provider
            .read_data_source(TYPE, map(json!({ "name": "existing-3" })))
            .await
            .unwrap();
        assert_eq!(by_name["id"], json!(3));
        assert_eq!(by_name["order"], json!(3));

        assert!(provider
            .read_data_source(TYPE, map(json!({ "name": "missing" })))
            .await
            .is_err());
    }

    #[test]
    fn test_validate_rejects_bad_addresses() {
        let provider = Provider::new();
        let mut config = rule("bad", 1);
        config.insert("src_ips".into(), json!(["not-an-ip"]));
        assert!(provider.validate_resource_config(TYPE, &config).has_errors());
    }
}

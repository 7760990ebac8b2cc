//! `zia_casb_dlp_rules`
//!
//! SaaS security DLP rules keep a separate order sequence per rule `type`,
//! so ordering, listing and reads are all scoped by `ruleType`.

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
pub struct CasbDlpRule {
    #[serde(flatten)]
    pub base: RuleBase,
    #[serde(rename = "type", default)]
    pub rule_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default)]
    pub without_content_inspection: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_auditor_email: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cloud_apps: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collaboration_scope: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<IdNameExtension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<IdNameExtension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub departments: Vec<IdNameExtension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<IdNameExtension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dlp_engines: Vec<IdNameExtension>,
}

rule_api_object!(
    CasbDlpRule,
    "/casbDlpRules",
    "SaaS security DLP rule",
    Some("/casbDlpRules/all")
);

fn rule_type_scope(rule_type: &str) -> Vec<(String, String)> {
    if rule_type.is_empty() {
        Vec::new()
    } else {
        vec![("ruleType".to_string(), rule_type.to_string())]
    }
}

impl PolicyRule for CasbDlpRule {
    const TYPE_NAME: &'static str = "zia_casb_dlp_rules";
    const DESCRIPTION: &'static str = "SaaS security (CASB) DLP rule";
    const ORDER_KEY: &'static str = "casb_dlp_rules";

    fn attributes() -> Vec<(&'static str, Attribute)> {
        vec![
            (
                "type",
                Attribute::string()
                    .required()
                    .force_new()
                    .validate_str(validators::validate_casb_rule_type)
                    .describe("Rule type; each type is ordered independently"),
            ),
            (
                "action",
                Attribute::string()
                    .optional_computed()
                    .validate_str(validators::validate_casb_action)
                    .describe("Action taken on matching content"),
            ),
            (
                "severity",
                Attribute::string()
                    .validate_str(validators::validate_rule_severity)
                    .describe("Severity of raised incidents"),
            ),
            (
                "without_content_inspection",
                Attribute::bool().describe("Match without inspecting content"),
            ),
            (
                "external_auditor_email",
                Attribute::string()
                    .validate_str(validators::validate_email)
                    .describe("Auditor notified of incidents"),
            ),
            ("cloud_apps", Attribute::set().describe("SaaS applications")),
            (
                "collaboration_scope",
                Attribute::set().describe("Sharing scopes matched by the rule"),
            ),
            ("labels", id_set_attribute("Rule label ids")),
            ("groups", id_set_attribute("Group ids")),
            ("departments", id_set_attribute("Department ids")),
            ("users", id_set_attribute("User ids")),
            ("dlp_engines", id_set_attribute("DLP engine ids")),
        ]
    }

    fn validate(data: &ResourceData) -> Diagnostics {
        let mut diags = Diagnostics::new();
        for scope in data.get_strings("collaboration_scope") {
            if let Err(message) = validators::validate_collaboration_scope(&scope) {
                diags.push(
                    Diagnostic::error("Invalid collaboration scope", message)
                        .at("collaboration_scope"),
                );
            }
        }
        diags
    }

    fn expand(data: &ResourceData) -> Result<Self> {
        Ok(Self {
            base: RuleBase::from_data(data),
            rule_type: data.get_string("type"),
            action: non_empty(data.get_string("action")),
            severity: non_empty(data.get_string("severity")),
            without_content_inspection: data.get_bool("without_content_inspection"),
            external_auditor_email: non_empty(data.get_string("external_auditor_email")),
            cloud_apps: expand_set(data, "cloud_apps"),
            collaboration_scope: expand_set(data, "collaboration_scope"),
            labels: expand_id_set(data, "labels"),
            groups: expand_id_set(data, "groups"),
            departments: expand_id_set(data, "departments"),
            users: expand_id_set(data, "users"),
            dlp_engines: expand_id_set(data, "dlp_engines"),
        })
    }

    fn flatten(&self, data: &mut ResourceData) {
        data.set("type", json!(self.rule_type));
        data.set("action", json!(self.action));
        data.set("severity", json!(self.severity));
        data.set(
            "without_content_inspection",
            json!(self.without_content_inspection),
        );
        data.set("external_auditor_email", json!(self.external_auditor_email));
        data.set("cloud_apps", flatten_set(&self.cloud_apps));
        data.set("collaboration_scope", flatten_set(&self.collaboration_scope));
        data.set("labels", flatten_id_set(&self.labels));
        data.set("groups", flatten_id_set(&self.groups));
        data.set("departments", flatten_id_set(&self.departments));
        data.set("users", flatten_id_set(&self.users));
        data.set("dlp_engines", flatten_id_set(&self.dlp_engines));
    }

    fn order_kind(&self) -> String {
        format!("{}:{}", Self::ORDER_KEY, self.rule_type)
    }

    fn list_scope(&self) -> Vec<(String, String)> {
        rule_type_scope(&self.rule_type)
    }

    fn scope_of(data: &ResourceData) -> Vec<(String, String)> {
        rule_type_scope(data.get_str("type").unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{Map, Value, json};

    use super::*;
    use crate::client::HttpMethod;
    use crate::core::test_helpers::{MemoryBackend, fast_provider};

    const TYPE: &str = "zia_casb_dlp_rules";
    const PATH: &str = "/casbDlpRules";

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn seed(backend: &MemoryBackend, id: i64, rule_type: &str, order: i64) {
        backend.seed(
            PATH,
            json!({ "id": id, "name": format!("dlp-{id}"), "type": rule_type, "order": order, "rank": 7 }),
        );
    }

    #[test]
    fn test_order_kind_is_per_type() {
        let file = CasbDlpRule {
            rule_type: "OFLCASB_DLP_FILE".into(),
            ..CasbDlpRule::default()
        };
        assert_eq!(file.order_kind(), "casb_dlp_rules:OFLCASB_DLP_FILE");
        assert_eq!(
            file.list_scope(),
            vec![("ruleType".to_string(), "OFLCASB_DLP_FILE".to_string())]
        );
        assert!(CasbDlpRule::default().list_scope().is_empty());
    }

    #[test]
    fn test_type_serializes_as_type() {
        let rule = CasbDlpRule {
            rule_type: "OFLCASB_DLP_EMAIL".into(),
            ..CasbDlpRule::default()
        };
        let value = serde_json::to_value(&rule).unwrap();
        assert_eq!(value["type"], json!("OFLCASB_DLP_EMAIL"));
        assert!(value.get("ruleType").is_none());
    }

    #[tokio::test]
    async fn test_orders_are_independent_per_type() {
        let backend = Arc::new(MemoryBackend::new());
        seed(&backend, 1, "OFLCASB_DLP_FILE", 1);
        seed(&backend, 2, "OFLCASB_DLP_FILE", 2);
        seed(&backend, 3, "OFLCASB_DLP_EMAIL", 1);
        let provider = fast_provider(Arc::clone(&backend));

        let data = provider
            .create(
                TYPE,
                map(json!({ "name": "email-2", "type": "OFLCASB_DLP_EMAIL", "order": 2 })),
            )
            .await
            .unwrap();

        assert_eq!(data.get_i64("order"), Some(2));
        let file_orders: Vec<i64> = backend
            .objects(PATH)
            .iter()
            .filter(|v| v["type"] == "OFLCASB_DLP_FILE")
            .map(|v| v["order"].as_i64().unwrap())
            .collect();
        assert_eq!(file_orders, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_data_source_by_id_and_name() {
        let backend = Arc::new(MemoryBackend::new());
        seed(&backend, 1, "OFLCASB_DLP_FILE", 1);
        seed(&backend, 2, "OFLCASB_DLP_EMAIL", 1);
        let provider = fast_provider(Arc::clone(&backend));

        let by_name = provider
            .read_data_source(TYPE, map(json!({ "name": "dlp-2" })))
            .await
            .unwrap();
        assert_eq!(by_name["id"], json!(2));
        assert_eq!(by_name["type"], json!("OFLCASB_DLP_EMAIL"));
        assert_eq!(backend.count_requests(HttpMethod::Get, "/casbDlpRules/all"), 1);

        let by_id = provider.read_data_source(TYPE, map(json!({ "id": 1 }))).await.unwrap();
        assert_eq!(by_id["name"], json!("dlp-1"));
        assert_eq!(by_id["type"], json!("OFLCASB_DLP_FILE"));
    }

    #[tokio::test]
    async fn test_import_by_name_uses_all_rules_listing() {
        let backend = Arc::new(MemoryBackend::new());
        seed(&backend, 9, "OFLCASB_DLP_CRM", 1);
        let provider = fast_provider(Arc::clone(&backend));

        let imported = provider.import(TYPE, "dlp-9").await.unwrap();
        assert_eq!(imported.get_str("type"), Some("OFLCASB_DLP_CRM"));
        assert_eq!(backend.count_requests(HttpMethod::Get, "/casbDlpRules/all"), 1);
    }
}

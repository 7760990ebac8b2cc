//! `zia_rule_labels`

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::ObjectType;
use crate::client::services::ApiObject;
use crate::core::error::Result;
use crate::provider::{Attribute, ResourceData};
use crate::resources::common::is_zero;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleLabel {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing)]
    pub referenced_rule_count: i64,
}

impl ApiObject for RuleLabel {
    const PATH: &'static str = "/ruleLabels";
    const KIND: &'static str = "rule label";
    const PAGINATED: bool = true;

    fn id(&self) -> i64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl ObjectType for RuleLabel {
    const TYPE_NAME: &'static str = "zia_rule_labels";
    const DESCRIPTION: &'static str = "Label attached to policy rules";

    fn attributes() -> Vec<(&'static str, Attribute)> {
        vec![(
            "referenced_rule_count",
            Attribute::int()
                .computed()
                .describe("Number of rules carrying the label"),
        )]
    }

    fn expand(data: &ResourceData) -> Result<Self> {
        Ok(Self {
            id: data.numeric_id().unwrap_or_default(),
            name: data.get_string("name"),
            description: data.get_string("description"),
            referenced_rule_count: 0,
        })
    }

    fn flatten(&self, data: &mut ResourceData) {
        data.set("name", json!(self.name));
        data.set("description", json!(self.description));
        data.set("referenced_rule_count", json!(self.referenced_rule_count));
    }
}

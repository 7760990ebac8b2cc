//! `zia_bandwidth_control_rule`
//!
//! Shares are percentages of the bandwidth class; `min_bandwidth` may not
//! exceed `max_bandwidth`.

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{PolicyRule, RuleBase, rule_api_object};
use crate::core::error::Result;
use crate::provider::{Attribute, Diagnostic, Diagnostics, ResourceData};
use crate::resources::common::{
    IdNameExtension, expand_id_set, expand_set, flatten_id_set, flatten_set, id_set_attribute,
};
use crate::validators;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandwidthControlRule {
    #[serde(flatten)]
    pub base: RuleBase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bandwidth: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_bandwidth: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protocols: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bandwidth_classes: Vec<IdNameExtension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<IdNameExtension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub location_groups: Vec<IdNameExtension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<IdNameExtension>,
}

rule_api_object!(
    BandwidthControlRule,
    "/bandwidthControlRules",
    "bandwidth control rule"
);

impl PolicyRule for BandwidthControlRule {
    const TYPE_NAME: &'static str = "zia_bandwidth_control_rule";
    const DESCRIPTION: &'static str = "Bandwidth control rule";
    const ORDER_KEY: &'static str = "bandwidth_control_rules";

    fn attributes() -> Vec<(&'static str, Attribute)> {
        vec![
            (
                "max_bandwidth",
                Attribute::int()
                    .validate_int(validators::validate_percentage)
                    .describe("Maximum bandwidth share in percent"),
            ),
            (
                "min_bandwidth",
                Attribute::int()
                    .validate_int(validators::validate_percentage)
                    .describe("Guaranteed bandwidth share in percent"),
            ),
            ("protocols", Attribute::set().describe("Protocols matched by the rule")),
            ("bandwidth_classes", id_set_attribute("Bandwidth class ids")),
            ("locations", id_set_attribute("Location ids")),
            ("location_groups", id_set_attribute("Location group ids")),
            ("labels", id_set_attribute("Rule label ids")),
        ]
    }

    fn validate(data: &ResourceData) -> Diagnostics {
        let mut diags = Diagnostics::new();
        if let (Some(min), Some(max)) = (data.get_i64("min_bandwidth"), data.get_i64("max_bandwidth"))
            && min > max
        {
            diags.push(
                Diagnostic::error(
                    "Invalid bandwidth range",
                    format!("min_bandwidth ({min}) must not exceed max_bandwidth ({max})"),
                )
                .at("min_bandwidth"),
            );
        }
        for protocol in data.get_strings("protocols") {
            if let Err(message) = validators::validate_bandwidth_protocol(&protocol) {
                diags.push(Diagnostic::error("Invalid protocol", message).at("protocols"));
            }
        }
        diags
    }

    fn expand(data: &ResourceData) -> Result<Self> {
        Ok(Self {
            base: RuleBase::from_data(data),
            max_bandwidth: data.get_i32("max_bandwidth"),
            min_bandwidth: data.get_i32("min_bandwidth"),
            protocols: expand_set(data, "protocols"),
            bandwidth_classes: expand_id_set(data, "bandwidth_classes"),
            locations: expand_id_set(data, "locations"),
            location_groups: expand_id_set(data, "location_groups"),
            labels: expand_id_set(data, "labels"),
        })
    }

    fn flatten(&self, data: &mut ResourceData) {
        data.set("max_bandwidth", json!(self.max_bandwidth));
        data.set("min_bandwidth", json!(self.min_bandwidth));
        data.set("protocols", flatten_set(&self.protocols));
        data.set("bandwidth_classes", flatten_id_set(&self.bandwidth_classes));
        data.set("locations", flatten_id_set(&self.locations));
        data.set("location_groups", flatten_id_set(&self.location_groups));
        data.set("labels", flatten_id_set(&self.labels));
    }
}

//! Resource and data source schemas
//!
//! A [`Schema`] describes the attributes of one resource type and checks a
//! user configuration against them before any API call is made.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use super::diagnostics::{Diagnostic, Diagnostics};

/// Attribute value types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttrType {
    String,
    Int,
    Bool,
    /// Ordered list of strings
    List,
    /// Unordered set of strings
    Set,
    /// ZIA reference block: `[{ "id": [1, 2] }]`
    IdSet,
}

/// Value check attached to an attribute; applied to each element of lists.
#[derive(Debug, Clone, Copy)]
pub enum Validator {
    Str(fn(&str) -> Result<(), String>),
    Int(fn(i64) -> Result<(), String>),
}

impl Validator {
    fn check(self, value: &Value) -> Result<(), String> {
        match (self, value) {
            (Self::Str(f), Value::String(s)) => f(s),
            (Self::Int(f), Value::Number(n)) => n.as_i64().map_or(Ok(()), f),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Attribute {
    #[serde(rename = "type")]
    pub ty: AttrType,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub sensitive: bool,
    pub force_new: bool,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip)]
    pub validator: Option<Validator>,
}

impl Attribute {
    fn of(ty: AttrType) -> Self {
        Self {
            ty,
            required: false,
            optional: true,
            computed: false,
            sensitive: false,
            force_new: false,
            description: String::new(),
            max_items: None,
            default: None,
            validator: None,
        }
    }

    pub fn string() -> Self {
        Self::of(AttrType::String)
    }

    pub fn int() -> Self {
        Self::of(AttrType::Int)
    }

    pub fn bool() -> Self {
        Self::of(AttrType::Bool)
    }

    pub fn list() -> Self {
        Self::of(AttrType::List)
    }

    pub fn set() -> Self {
        Self::of(AttrType::Set)
    }

    pub fn id_set() -> Self {
        Self::of(AttrType::IdSet).max_items(1)
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self.optional = false;
        self
    }

    /// Set by the server; the user may not configure it.
    #[must_use]
    pub fn computed(mut self) -> Self {
        self.computed = true;
        self.optional = false;
        self
    }

    /// Optional, filled by the server when omitted.
    #[must_use]
    pub fn optional_computed(mut self) -> Self {
        self.computed = true;
        self.optional = true;
        self
    }

    #[must_use]
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    #[must_use]
    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn max_items(mut self, max: usize) -> Self {
        self.max_items = Some(max);
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    #[must_use]
    pub fn validate_str(mut self, f: fn(&str) -> Result<(), String>) -> Self {
        self.validator = Some(Validator::Str(f));
        self
    }

    #[must_use]
    pub fn validate_int(mut self, f: fn(i64) -> Result<(), String>) -> Self {
        self.validator = Some(Validator::Int(f));
        self
    }

    /// Only computed, never configurable.
    fn is_read_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }

    fn type_matches(&self, value: &Value) -> bool {
        match self.ty {
            AttrType::String => value.is_string(),
            AttrType::Int => value.as_i64().is_some(),
            AttrType::Bool => value.is_boolean(),
            AttrType::List | AttrType::Set => value
                .as_array()
                .is_some_and(|items| items.iter().all(|v| v.is_string() || v.is_number())),
            AttrType::IdSet => value.as_array().is_some_and(|blocks| {
                blocks.iter().all(|block| {
                    block
                        .get("id")
                        .and_then(Value::as_array)
                        .is_some_and(|ids| ids.iter().all(|id| id.as_i64().is_some()))
                })
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Schema {
    pub version: i64,
    pub description: String,
    pub attributes: BTreeMap<String, Attribute>,
}

impl Schema {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            version: 0,
            description: description.into(),
            attributes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, name: &str, attribute: Attribute) -> Self {
        self.attributes.insert(name.to_string(), attribute);
        self
    }

    #[must_use]
    pub fn with_all(mut self, attributes: Vec<(&'static str, Attribute)>) -> Self {
        for (name, attribute) in attributes {
            self.attributes.insert(name.to_string(), attribute);
        }
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Fills in declared defaults for attributes missing from `config`.
    pub fn apply_defaults(&self, config: &mut Map<String, Value>) {
        for (name, attribute) in &self.attributes {
            if let Some(default) = &attribute.default
                && !config.contains_key(name)
            {
                config.insert(name.clone(), default.clone());
            }
        }
    }

    /// Checks a user configuration against the schema.
    pub fn validate_config(&self, config: &Map<String, Value>) -> Diagnostics {
        let mut diags = Diagnostics::new();

        for (name, attribute) in &self.attributes {
            let value = config.get(name).filter(|v| !v.is_null());
            if attribute.required && value.is_none() {
                diags.push(
                    Diagnostic::error(
                        "Missing required attribute",
                        format!("The attribute \"{name}\" is required."),
                    )
                    .at(name),
                );
            }
        }

        for (name, value) in config {
            if value.is_null() {
                continue;
            }
            let Some(attribute) = self.attributes.get(name) else {
                diags.push(
                    Diagnostic::error(
                        "Unsupported attribute",
                        format!("An attribute named \"{name}\" is not expected here."),
                    )
                    .at(name),
                );
                continue;
            };

            if attribute.is_read_only() {
                diags.push(
                    Diagnostic::error(
                        "Computed attribute cannot be set",
                        format!("\"{name}\" is set by ZIA and cannot be configured."),
                    )
                    .at(name),
                );
                continue;
            }

            if !attribute.type_matches(value) {
                diags.push(
                    Diagnostic::error(
                        "Incorrect attribute value type",
                        format!("\"{name}\" must be of type {}.", attribute.ty),
                    )
                    .at(name),
                );
                continue;
            }

            if let (Some(max), Some(items)) = (attribute.max_items, value.as_array())
                && items.len() > max
            {
                diags.push(
                    Diagnostic::error(
                        "Too many list items",
                        format!("\"{name}\" allows at most {max} item(s), got {}.", items.len()),
                    )
                    .at(name),
                );
            }

            if let Some(validator) = attribute.validator {
                let elements: Vec<&Value> = match value {
                    Value::Array(items) => items.iter().collect(),
                    single => vec![single],
                };
                for element in elements {
                    if let Err(message) = validator.check(element) {
                        diags.push(Diagnostic::error("Invalid attribute value", message).at(name));
                    }
                }
            }
        }

        diags
    }

    /// Derives a lookup schema: everything computed, `id` and `name`
    /// optional.
    pub fn as_data_source(&self) -> Schema {
        let mut attributes: BTreeMap<String, Attribute> = self
            .attributes
            .iter()
            .map(|(name, attribute)| {
                let mut attribute = attribute.clone();
                attribute.required = false;
                attribute.optional = false;
                attribute.computed = true;
                attribute.force_new = false;
                attribute.default = None;
                attribute.validator = None;
                attribute.max_items = None;
                (name.clone(), attribute)
            })
            .collect();

        attributes.insert(
            "id".into(),
            Attribute::int().optional_computed().describe("Object id to look up"),
        );
        if let Some(name) = attributes.get_mut("name") {
            name.optional = true;
            name.description = "Object name to look up".into();
        }

        Schema {
            version: self.version,
            description: self.description.clone(),
            attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule_schema() -> Schema {
        Schema::new("test rule")
            .with("rule_id", Attribute::int().computed())
            .with("name", Attribute::string().required())
            .with(
                "rank",
                Attribute::int()
                    .default_value(json!(7))
                    .validate_int(crate::validators::validate_rank),
            )
            .with(
                "protocols",
                Attribute::set().validate_str(crate::validators::validate_dns_protocol),
            )
            .with("labels", Attribute::id_set())
    }

    fn config(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_valid_config() {
        let diags = rule_schema().validate_config(&config(json!({
            "name": "r1",
            "rank": 3,
            "protocols": ["TCP_RULE"],
            "labels": [{"id": [1, 2]}],
        })));
        assert!(diags.is_empty(), "{diags}");
    }

    #[test]
    fn test_missing_and_unknown() {
        let diags = rule_schema().validate_config(&config(json!({ "colour": "red" })));
        let summaries: Vec<_> = diags.iter().map(|d| d.summary.as_str()).collect();
        assert!(summaries.contains(&"Missing required attribute"));
        assert!(summaries.contains(&"Unsupported attribute"));
    }

    #[test]
    fn test_computed_only_rejected() {
        let diags = rule_schema().validate_config(&config(json!({ "name": "a", "rule_id": 5 })));
        assert!(diags.has_errors());
        assert_eq!(diags.iter().next().unwrap().attribute.as_deref(), Some("rule_id"));
    }

    #[test]
    fn test_type_mismatch_and_max_items() {
        let diags = rule_schema().validate_config(&config(json!({
            "name": 1,
            "labels": [{"id": [1]}, {"id": [2]}],
        })));
        assert_eq!(diags.len(), 2);
    }

    #[test]
    fn test_validator_runs_per_element() {
        let diags = rule_schema().validate_config(&config(json!({
            "name": "a",
            "rank": 9,
            "protocols": ["TCP_RULE", "SCTP"],
        })));
        assert_eq!(diags.len(), 2);
    }

    #[test]
    fn test_defaults() {
        let mut cfg = config(json!({ "name": "a" }));
        rule_schema().apply_defaults(&mut cfg);
        assert_eq!(cfg["rank"], 7);
    }

    #[test]
    fn test_data_source_schema() {
        let ds = rule_schema().as_data_source();
        assert!(ds.attribute("name").unwrap().optional);
        assert!(ds.attribute("rank").unwrap().computed);
        assert!(ds.attribute("id").unwrap().optional);
        assert!(ds.validate_config(&config(json!({ "name": "a" }))).is_empty());
        assert!(ds.validate_config(&config(json!({ "rank": 1 }))).has_errors());
    }
}

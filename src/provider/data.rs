//! Per-resource working data
//!
//! [`ResourceData`] carries the id of a resource, its current values (the
//! configuration on create/update, the refreshed state after a read) and the
//! prior state used to detect changes.

use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceData {
    id: Option<String>,
    values: Map<String, Value>,
    prior: Map<String, Value>,
}

impl ResourceData {
    /// Data for a resource that does not exist yet.
    pub fn new(config: Map<String, Value>) -> Self {
        Self {
            id: None,
            values: config,
            prior: Map::new(),
        }
    }

    /// Data for an existing resource; `values` start out equal to `prior`.
    pub fn from_state(id: impl Into<String>, state: Map<String, Value>) -> Self {
        Self {
            id: Some(id.into()),
            values: state.clone(),
            prior: state,
        }
    }

    /// Data for an update: `prior` is the stored state, `values` the new
    /// configuration.
    pub fn for_update(id: impl Into<String>, prior: Map<String, Value>, config: Map<String, Value>) -> Self {
        Self {
            id: Some(id.into()),
            values: config,
            prior,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// The id parsed as a ZIA numeric id.
    pub fn numeric_id(&self) -> Option<i64> {
        self.id.as_deref().and_then(|id| id.parse().ok())
    }

    pub fn set_id(&mut self, id: impl ToString) {
        self.id = Some(id.to_string());
    }

    /// Marks the resource as gone so it is dropped from state.
    pub fn clear_id(&mut self) {
        self.id = None;
    }

    pub fn is_gone(&self) -> bool {
        self.id.is_none()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|v| !v.is_null())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_string(&self, key: &str) -> String {
        self.get_str(key).unwrap_or_default().to_string()
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn get_i32(&self, key: &str) -> Option<i32> {
        self.get_i64(key).and_then(|v| i32::try_from(v).ok())
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// String elements of a list or set attribute.
    pub fn get_strings(&self, key: &str) -> Vec<String> {
        self.get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| match v {
                        Value::String(s) => Some(s.clone()),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    /// `true` when `key` differs from the prior state.
    pub fn has_change(&self, key: &str) -> bool {
        let normalize = |v: Option<&Value>| v.filter(|v| !v.is_null()).cloned();
        normalize(self.values.get(key)) != normalize(self.prior.get(key))
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_values(self) -> Map<String, Value> {
        self.values
    }
}

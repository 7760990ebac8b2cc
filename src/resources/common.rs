//! Conversions between ZIA payloads and resource attributes

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::provider::{Attribute, ResourceData};

/// Reference to another ZIA object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdNameExtension {
    pub id: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl IdNameExtension {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }
}

/// Reads a reference block `[{ "id": [..] }]` into references.
pub fn expand_id_set(data: &ResourceData, key: &str) -> Vec<IdNameExtension> {
    let mut ids: Vec<i64> = data
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|block| block.get("id").and_then(Value::as_array))
        .flatten()
        .filter_map(Value::as_i64)
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids.into_iter().map(IdNameExtension::new).collect()
}

/// Reads a single reference (a reference block holding one id).
pub fn expand_single_ref(data: &ResourceData, key: &str) -> Option<IdNameExtension> {
    expand_id_set(data, key).into_iter().next()
}

/// Writes references as a reference block; empty lists become `[]`.
pub fn flatten_id_set(refs: &[IdNameExtension]) -> Value {
    if refs.is_empty() {
        return json!([]);
    }
    let mut ids: Vec<i64> = refs.iter().map(|r| r.id).collect();
    ids.sort_unstable();
    json!([{ "id": ids }])
}

pub fn flatten_single_ref(reference: Option<&IdNameExtension>) -> Value {
    flatten_id_set(reference.map(std::slice::from_ref).unwrap_or_default())
}

/// Set attributes are compared order-insensitively, so they are kept sorted.
pub fn expand_set(data: &ResourceData, key: &str) -> Vec<String> {
    let mut items = data.get_strings(key);
    items.sort();
    items.dedup();
    items
}

pub fn flatten_set(items: &[String]) -> Value {
    let mut items = items.to_vec();
    items.sort();
    json!(items)
}

/// Reference block attribute with a description.
pub fn id_set_attribute(description: &str) -> Attribute {
    Attribute::id_set().describe(description)
}

/// Ids are assigned by ZIA and omitted from create payloads.
pub fn is_zero(id: &i64) -> bool {
    *id == 0
}

/// Skips empty optional strings in payloads.
pub fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(value: Value) -> ResourceData {
        ResourceData::new(value.as_object().cloned().unwrap())
    }

    #[test]
    fn test_expand_id_set_sorts_and_dedups() {
        let d = data(json!({ "labels": [{ "id": [3, 1, 3] }] }));
        let ids: Vec<i64> = expand_id_set(&d, "labels").iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(expand_id_set(&d, "groups").is_empty());
    }

    #[test]
    fn test_flatten_id_set_shapes() {
        assert_eq!(flatten_id_set(&[]), json!([]));
        assert_eq!(
            flatten_id_set(&[IdNameExtension::new(9), IdNameExtension::new(2)]),
            json!([{ "id": [2, 9] }])
        );
        assert_eq!(
            flatten_single_ref(Some(&IdNameExtension::new(5))),
            json!([{ "id": [5] }])
        );
        assert_eq!(flatten_single_ref(None), json!([]));
    }

    #[test]
    fn test_reference_payload_shape() {
        let reference = IdNameExtension::new(7);
        assert_eq!(serde_json::to_value(&reference).unwrap(), json!({ "id": 7 }));
        let parsed: IdNameExtension =
            serde_json::from_value(json!({ "id": 7, "name": "HQ", "extensions": {} })).unwrap();
        assert_eq!(parsed.name, "HQ");
    }

    #[test]
    fn test_sets_are_sorted() {
        let d = data(json!({ "protocols": ["UDP_RULE", "TCP_RULE", "UDP_RULE"] }));
        assert_eq!(expand_set(&d, "protocols"), vec!["TCP_RULE", "UDP_RULE"]);
        assert_eq!(
            flatten_set(&["b".into(), "a".into()]),
            json!(["a", "b"])
        );
    }
}

//! Shared test utilities
//!
//! [`MemoryBackend`] stands in for the ZIA API in unit tests. It keeps one
//! collection per path, assigns ids, and keeps rule orders contiguous the way
//! the real API does: creating or moving a rule to order N shifts every rule
//! at N or later down by one, and orders beyond `count + 1` are rejected with
//! `INVALID_INPUT_ARGUMENT`. Failures can be scripted per method and path.
//! This module is only compiled in test mode.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::client::{HttpMethod, RestBackend};
use crate::core::error::{Error, Result};
use crate::core::ordering::OrderingSettings;
use crate::core::retry::RetryPolicy;
use crate::provider::{Provider, ProviderMeta};

/// Retry timing scaled down for tests.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        interval: Duration::from_millis(1),
        timeout: Duration::from_secs(2),
    }
}

/// Reorder timing scaled down for tests.
pub fn fast_ordering() -> OrderingSettings {
    OrderingSettings {
        settle_interval: Duration::from_millis(5),
        stable_ticks: 3,
        timeout: Duration::from_secs(5),
    }
}

pub fn fast_meta(backend: Arc<MemoryBackend>) -> ProviderMeta {
    ProviderMeta::new(backend, fast_retry(), fast_ordering())
}

/// Provider wired to `backend` with fast timings.
pub fn fast_provider(backend: Arc<MemoryBackend>) -> Provider {
    let mut provider = Provider::new();
    provider.configure_with(fast_meta(backend));
    provider
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, BTreeMap<i64, Value>>,
    next_id: i64,
    failures: VecDeque<(HttpMethod, String, Error)>,
    requests: Vec<(HttpMethod, String)>,
    status: String,
}

/// In-memory ZIA API
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

pub fn invalid_input(message: &str) -> Error {
    Error::Api {
        status: 400,
        code: "INVALID_INPUT_ARGUMENT".into(),
        message: message.into(),
    }
}

fn not_found() -> Error {
    Error::Api {
        status: 404,
        code: "RESOURCE_NOT_FOUND".into(),
        message: "Object not found".into(),
    }
}

fn order_of(v: &Value) -> i64 {
    v.get("order").and_then(Value::as_i64).unwrap_or(0)
}

fn group_of(v: &Value) -> String {
    v.get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1000,
                status: "ACTIVE".into(),
                ..Inner::default()
            }),
        }
    }

    /// Inserts `object` as-is; it must carry an `id`.
    pub fn seed(&self, path: &str, object: Value) {
        let id = object.get("id").and_then(Value::as_i64).unwrap_or_default();
        let mut inner = self.inner.lock().unwrap();
        inner
            .collections
            .entry(path.to_string())
            .or_default()
            .insert(id, object);
    }

    /// Makes the next matching request fail with `error`.
    pub fn fail_next(&self, method: HttpMethod, path: &str, error: Error) {
        self.inner
            .lock()
            .unwrap()
            .failures
            .push_back((method, path.to_string(), error));
    }

    pub fn object(&self, path: &str, id: i64) -> Option<Value> {
        let inner = self.inner.lock().unwrap();
        inner.collections.get(path)?.get(&id).cloned()
    }

    pub fn objects(&self, path: &str) -> Vec<Value> {
        let inner = self.inner.lock().unwrap();
        inner
            .collections
            .get(path)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default()
    }

    /// `(id, order)` of every ordered object in `path`, by ascending order.
    pub fn orders(&self, path: &str) -> Vec<(i64, i64)> {
        let mut orders: Vec<(i64, i64)> = self
            .objects(path)
            .iter()
            .filter(|v| order_of(v) > 0)
            .map(|v| (v.get("id").and_then(Value::as_i64).unwrap_or_default(), order_of(v)))
            .collect();
        orders.sort_by_key(|(_, order)| *order);
        orders
    }

    pub fn requests(&self) -> Vec<(HttpMethod, String)> {
        self.inner.lock().unwrap().requests.clone()
    }

    pub fn count_requests(&self, method: HttpMethod, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|(m, p)| *m == method && p == path)
            .count()
    }

    pub fn set_status(&self, status: &str) {
        self.inner.lock().unwrap().status = status.to_string();
    }
}

/// Moves `id` to `target` within its order group and renumbers the group
/// contiguously from 1.
fn place(collection: &mut BTreeMap<i64, Value>, id: i64, target: i64) {
    let Some(group) = collection.get(&id).map(group_of) else {
        return;
    };
    let mut ids: Vec<(i64, i64)> = collection
        .iter()
        .filter(|(other, v)| **other != id && order_of(v) > 0 && group_of(v) == group)
        .map(|(other, v)| (*other, order_of(v)))
        .collect();
    ids.sort_by_key(|(_, order)| *order);
    let mut ordered: Vec<i64> = ids.into_iter().map(|(other, _)| other).collect();

    let index = usize::try_from(target - 1).unwrap_or(0).min(ordered.len());
    ordered.insert(index, id);

    for (index, other) in ordered.iter().enumerate() {
        if let Some(v) = collection.get_mut(other) {
            v["order"] = json!(index as i64 + 1);
        }
    }
}

fn renumber(collection: &mut BTreeMap<i64, Value>, group: &str) {
    let mut ids: Vec<(i64, i64)> = collection
        .iter()
        .filter(|(_, v)| order_of(v) > 0 && group_of(v) == group)
        .map(|(id, v)| (*id, order_of(v)))
        .collect();
    ids.sort_by_key(|(_, order)| *order);
    for (index, (id, _)) in ids.iter().enumerate() {
        if let Some(v) = collection.get_mut(id) {
            v["order"] = json!(index as i64 + 1);
        }
    }
}

fn group_size(collection: &BTreeMap<i64, Value>, group: &str) -> usize {
    collection
        .values()
        .filter(|v| order_of(v) > 0 && group_of(v) == group)
        .count()
}

#[async_trait]
impl RestBackend for MemoryBackend {
    async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Option<Value>> {
        let mut inner = self.inner.lock().unwrap();
        inner.requests.push((method, path.to_string()));

        if let Some(pos) = inner
            .failures
            .iter()
            .position(|(m, p, _)| *m == method && p == path)
            && let Some((_, _, error)) = inner.failures.remove(pos)
        {
            return Err(error);
        }

        match (method, path) {
            (HttpMethod::Post, "/status/activate") => {
                inner.status = "ACTIVE".into();
                return Ok(Some(json!({ "status": "ACTIVE" })));
            }
            (HttpMethod::Get, "/status") => {
                return Ok(Some(json!({ "status": inner.status })));
            }
            _ => {}
        }

        let (collection_path, item) = match path.rsplit_once('/') {
            Some((head, tail)) if !head.is_empty() => (head.to_string(), Some(tail.to_string())),
            _ => (path.to_string(), None),
        };

        match (method, item.as_deref()) {
            (HttpMethod::Get, None | Some("all")) => {
                let collection = inner.collections.get(&collection_path);
                let scope = query
                    .iter()
                    .find(|(k, _)| k == "ruleType")
                    .map(|(_, v)| v.clone());
                let mut items: Vec<Value> = collection
                    .map(|c| c.values().cloned().collect())
                    .unwrap_or_default();
                if let Some(scope) = scope {
                    items.retain(|v| group_of(v) == scope);
                }
                items.sort_by_key(|v| (order_of(v), v.get("id").and_then(Value::as_i64)));

                let page = query.iter().find(|(k, _)| k == "page");
                let size = query.iter().find(|(k, _)| k == "pageSize");
                if let (Some((_, page)), Some((_, size))) = (page, size) {
                    let page: usize = page.parse().unwrap_or(1);
                    let size: usize = size.parse().unwrap_or(100);
                    items = items.into_iter().skip(page.saturating_sub(1) * size).take(size).collect();
                }
                Ok(Some(Value::Array(items)))
            }
            (HttpMethod::Get, Some(id)) => {
                let id: i64 = id.parse().map_err(|_| not_found())?;
                inner
                    .collections
                    .get(&collection_path)
                    .and_then(|c| c.get(&id))
                    .cloned()
                    .map(Some)
                    .ok_or_else(not_found)
            }
            (HttpMethod::Post, None) => {
                let mut object = body.cloned().unwrap_or_else(|| json!({}));
                let requested = object.get("order").and_then(Value::as_i64);
                let group = group_of(&object);
                let collection = inner.collections.entry(collection_path.clone()).or_default();
                if let Some(order) = requested
                    && order > 0
                    && order > group_size(collection, &group) as i64 + 1
                {
                    return Err(invalid_input("Invalid order"));
                }

                inner.next_id += 1;
                let id = inner.next_id;
                object["id"] = json!(id);
                let collection = inner.collections.entry(collection_path).or_default();
                collection.insert(id, object);
                if let Some(order) = requested.filter(|o| *o > 0) {
                    place(collection, id, order);
                }
                Ok(collection.get(&id).cloned())
            }
            (HttpMethod::Put, Some(id)) => {
                let id: i64 = id.parse().map_err(|_| not_found())?;
                let collection = inner
                    .collections
                    .get_mut(&collection_path)
                    .ok_or_else(not_found)?;
                if !collection.contains_key(&id) {
                    return Err(not_found());
                }
                let mut object = body.cloned().unwrap_or_else(|| json!({}));
                object["id"] = json!(id);
                let requested = object.get("order").and_then(Value::as_i64);
                if let Some(order) = requested
                    && order > 0
                    && order > group_size(collection, &group_of(&object)) as i64
                {
                    return Err(invalid_input("Invalid order"));
                }
                collection.insert(id, object);
                if let Some(order) = requested.filter(|o| *o > 0) {
                    place(collection, id, order);
                }
                Ok(collection.get(&id).cloned())
            }
            (HttpMethod::Delete, Some(id)) => {
                let id: i64 = id.parse().map_err(|_| not_found())?;
                let collection = inner
                    .collections
                    .get_mut(&collection_path)
                    .ok_or_else(not_found)?;
                let removed = collection.remove(&id).ok_or_else(not_found)?;
                if order_of(&removed) > 0 {
                    renumber(collection, &group_of(&removed));
                }
                Ok(None)
            }
            _ => Err(Error::Internal(format!("unsupported {method} {path}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_shifts_orders() {
        let backend = MemoryBackend::new();
        let a = backend
            .post("/rules", &json!({"name": "a", "order": 1}))
            .await
            .unwrap()
            .unwrap();
        let b = backend
            .post("/rules", &json!({"name": "b", "order": 1}))
            .await
            .unwrap()
            .unwrap();

        let a_id = a["id"].as_i64().unwrap();
        let b_id = b["id"].as_i64().unwrap();
        assert_eq!(backend.orders("/rules"), vec![(b_id, 1), (a_id, 2)]);
    }

    #[tokio::test]
    async fn test_order_beyond_count_is_invalid_input() {
        let backend = MemoryBackend::new();
        let err = backend
            .post("/rules", &json!({"name": "a", "order": 3}))
            .await
            .unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[tokio::test]
    async fn test_delete_renumbers() {
        let backend = MemoryBackend::new();
        let mut ids = Vec::new();
        for order in 1..=3 {
            let created = backend
                .post("/rules", &json!({"order": order}))
                .await
                .unwrap()
                .unwrap();
            ids.push(created["id"].as_i64().unwrap());
        }
        backend.delete(&format!("/rules/{}", ids[0])).await.unwrap();
        assert_eq!(backend.orders("/rules"), vec![(ids[1], 1), (ids[2], 2)]);
    }

    #[tokio::test]
    async fn test_scripted_failure_is_consumed() {
        let backend = MemoryBackend::new();
        backend.fail_next(HttpMethod::Get, "/rules", invalid_input("busy"));
        assert!(backend.get("/rules", &[]).await.is_err());
        assert!(backend.get("/rules", &[]).await.is_ok());
    }
}

//! Typed CRUD over [`RestBackend`]

use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::RestBackend;
use crate::core::error::{Error, Result};

/// Page size used for paginated list endpoints.
pub const PAGE_SIZE: usize = 1000;

/// A ZIA object stored under one collection endpoint
pub trait ApiObject: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection path, e.g. `/firewallDnsRules`
    const PATH: &'static str;
    /// Human-readable kind used in not-found messages
    const KIND: &'static str;
    /// Whether `list` must walk `page`/`pageSize`
    const PAGINATED: bool = false;
    /// Path that lists every object when the collection itself is scoped
    const LIST_ALL_PATH: Option<&'static str> = None;

    fn id(&self) -> i64;
    fn name(&self) -> &str;
}

/// CRUD for one [`ApiObject`] type
pub struct ObjectService<T> {
    backend: Arc<dyn RestBackend>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ObjectService<T> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            _marker: PhantomData,
        }
    }
}

impl<T: ApiObject> ObjectService<T> {
    pub fn new(backend: Arc<dyn RestBackend>) -> Self {
        Self {
            backend,
            _marker: PhantomData,
        }
    }

    fn item_path(id: i64) -> String {
        format!("{}/{id}", T::PATH)
    }

    fn decode_list(body: Option<Value>) -> Result<Vec<T>> {
        match body {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(v) => Ok(serde_json::from_value(v)?),
        }
    }

    /// # Errors
    ///
    /// Returns `Error::NotFound` if the object does not exist.
    pub async fn get(&self, id: i64) -> Result<T> {
        self.get_scoped(id, &[]).await
    }

    /// Reads object `id` with extra query parameters (e.g. `ruleType`).
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the object does not exist.
    pub async fn get_scoped(&self, id: i64, query: &[(String, String)]) -> Result<T> {
        match self.backend.get(&Self::item_path(id), query).await {
            Ok(Some(body)) => Ok(serde_json::from_value(body)?),
            Ok(None) => Err(Error::NotFound(format!("{} {id}", T::KIND))),
            Err(e) if e.is_not_found() => Err(Error::NotFound(format!("{} {id}", T::KIND))),
            Err(e) => Err(e),
        }
    }

    /// Lists every object, walking pages for paginated endpoints.
    ///
    /// # Errors
    ///
    /// Returns `Err` if any page request fails.
    pub async fn list(&self) -> Result<Vec<T>> {
        let path = T::LIST_ALL_PATH.unwrap_or(T::PATH);
        if !T::PAGINATED {
            return Self::decode_list(self.backend.get(path, &[]).await?);
        }

        let mut all = Vec::new();
        for page in 1.. {
            let query = vec![
                ("page".to_string(), page.to_string()),
                ("pageSize".to_string(), PAGE_SIZE.to_string()),
            ];
            let batch = Self::decode_list(self.backend.get(path, &query).await?)?;
            let len = batch.len();
            all.extend(batch);
            debug!(kind = T::KIND, page, len, "Fetched page");
            if len < PAGE_SIZE {
                break;
            }
        }
        Ok(all)
    }

    /// Lists the collection with extra query parameters.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the request fails.
    pub async fn list_scoped(&self, query: &[(String, String)]) -> Result<Vec<T>> {
        Self::decode_list(self.backend.get(T::PATH, query).await?)
    }

    /// Finds an object by name, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if no object has that name.
    pub async fn get_by_name(&self, name: &str) -> Result<T> {
        self.list()
            .await?
            .into_iter()
            .find(|o| o.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::NotFound(format!("{} named '{name}'", T::KIND)))
    }

    /// # Errors
    ///
    /// Returns `Err` if the API rejects the object.
    pub async fn create(&self, object: &T) -> Result<T> {
        let body = serde_json::to_value(object)?;
        match self.backend.post(T::PATH, &body).await? {
            Some(created) => Ok(serde_json::from_value(created)?),
            None => Err(Error::Internal(format!(
                "create {} returned no body",
                T::KIND
            ))),
        }
    }

    /// Replaces object `id`; reads it back when the API returns no body.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the API rejects the update.
    pub async fn update(&self, id: i64, object: &T) -> Result<T> {
        let body = serde_json::to_value(object)?;
        match self.backend.put(&Self::item_path(id), &body).await? {
            Some(updated) => Ok(serde_json::from_value(updated)?),
            None => self.get(id).await,
        }
    }

    /// # Errors
    ///
    /// Returns `Err` if the API rejects the deletion.
    pub async fn delete(&self, id: i64) -> Result<()> {
        self.backend.delete(&Self::item_path(id)).await
    }
}

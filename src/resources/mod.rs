//! ZIA resources and data sources
//!
//! - [`rules`]: policy rules; every rule kind shares [`rules::RuleResource`]
//!   and its create, reorder and read-back lifecycle
//! - [`objects`]: policy objects referenced by rules (labels, IP groups)
//! - [`activation`]: activation of pending configuration changes
//! - [`common`]: conversions between ZIA reference lists and attributes

pub mod activation;
pub mod common;
pub mod objects;
pub mod rules;

use std::sync::Arc;

use async_trait::async_trait;

use crate::client::services::{ApiObject, ObjectService};
use crate::core::error::{Error, Result};
use crate::provider::{Diagnostics, ProviderMeta, ResourceData, Schema};

/// A managed resource type
#[async_trait]
pub trait Resource: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    /// Cross-attribute checks the schema cannot express.
    fn validate(&self, _data: &ResourceData) -> Diagnostics {
        Diagnostics::new()
    }

    /// Creates the object and leaves its id and refreshed state in `data`.
    async fn create(&self, meta: &ProviderMeta, data: &mut ResourceData) -> Result<()>;

    /// Refreshes `data`; clears the id when the object no longer exists.
    async fn read(&self, meta: &ProviderMeta, data: &mut ResourceData) -> Result<()>;

    async fn update(&self, meta: &ProviderMeta, data: &mut ResourceData) -> Result<()>;

    async fn delete(&self, meta: &ProviderMeta, data: &ResourceData) -> Result<()>;

    /// Resolves a numeric id or a name to the object's id.
    async fn import(&self, meta: &ProviderMeta, id_or_name: &str) -> Result<String>;
}

/// A read-only lookup
#[async_trait]
pub trait DataSource: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    async fn read(&self, meta: &ProviderMeta, data: &mut ResourceData) -> Result<()>;
}

/// Parses a resource id as a ZIA numeric id.
pub(crate) fn require_id(data: &ResourceData) -> Result<i64> {
    data.numeric_id().ok_or_else(|| {
        Error::validation(
            "id",
            format!("'{}' is not a numeric ZIA id", data.id().unwrap_or_default()),
        )
    })
}

/// Resolves an import argument: digits are an id, anything else a name.
pub(crate) async fn resolve_import<T: ApiObject>(
    service: &ObjectService<T>,
    id_or_name: &str,
) -> Result<String> {
    let object = match id_or_name.trim().parse::<i64>() {
        Ok(id) => service.get(id).await?,
        Err(_) => service.get_by_name(id_or_name.trim()).await?,
    };
    Ok(object.id().to_string())
}

/// Looks an object up by the `id` or `name` of a data source configuration.
pub(crate) async fn lookup<T: ApiObject>(service: &ObjectService<T>, data: &ResourceData) -> Result<T> {
    if let Some(id) = data.get_i64("id") {
        return service.get(id).await;
    }
    match data.get_str("name") {
        Some(name) => service.get_by_name(name).await,
        None => Err(Error::validation("name", "one of 'id' or 'name' must be set")),
    }
}

pub fn all_resources() -> Vec<Arc<dyn Resource>> {
    let mut all = rules::resources();
    all.extend(objects::resources());
    all.push(Arc::new(activation::ActivationResource));
    all
}

pub fn all_data_sources() -> Vec<Arc<dyn DataSource>> {
    let mut all = rules::data_sources();
    all.extend(objects::data_sources());
    all.push(Arc::new(activation::ActivationDataSource));
    all
}

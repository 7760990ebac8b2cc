//! Policy objects referenced by rules
//!
//! Objects have no order, so [`ObjectResource`] is plain CRUD: create, read
//! back, replace, delete. A missing object is dropped from state on read and
//! treated as already deleted on delete.

pub mod ip_destination_groups;
pub mod ip_source_groups;
pub mod rule_labels;

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use super::{DataSource, Resource, lookup, require_id, resolve_import};
use crate::client::services::ApiObject;
use crate::core::error::Result;
use crate::provider::{Attribute, Diagnostics, ProviderMeta, ResourceData, Schema};
use crate::validators;

/// One kind of ZIA policy object
pub trait ObjectType: ApiObject {
    const TYPE_NAME: &'static str;
    const DESCRIPTION: &'static str;

    /// Attributes beyond `name` and `description`.
    fn attributes() -> Vec<(&'static str, Attribute)>;

    fn validate(_data: &ResourceData) -> Diagnostics {
        Diagnostics::new()
    }

    fn expand(data: &ResourceData) -> Result<Self>;

    /// Writes every attribute, including `name` and `description`.
    fn flatten(&self, data: &mut ResourceData);
}

pub struct ObjectResource<O>(PhantomData<fn() -> O>);

impl<O: ObjectType> Default for ObjectResource<O> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<O: ObjectType> ObjectResource<O> {
    pub fn object_schema() -> Schema {
        Schema::new(O::DESCRIPTION)
            .with(
                "name",
                Attribute::string()
                    .required()
                    .validate_str(validators::validate_object_name)
                    .describe("Object name"),
            )
            .with(
                "description",
                Attribute::string()
                    .validate_str(validators::validate_description)
                    .describe("Additional information about the object"),
            )
            .with_all(O::attributes())
    }
}

#[async_trait]
impl<O: ObjectType> Resource for ObjectResource<O> {
    fn type_name(&self) -> &'static str {
        O::TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Self::object_schema()
    }

    fn validate(&self, data: &ResourceData) -> Diagnostics {
        O::validate(data)
    }

    async fn create(&self, meta: &ProviderMeta, data: &mut ResourceData) -> Result<()> {
        let object = O::expand(data)?;
        let created = meta.service::<O>().create(&object).await?;
        data.set_id(created.id());
        created.flatten(data);
        Ok(())
    }

    async fn read(&self, meta: &ProviderMeta, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        match meta.service::<O>().get(id).await {
            Ok(object) => {
                object.flatten(data);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                warn!(type_name = O::TYPE_NAME, id, "Object not found");
                data.clear_id();
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn update(&self, meta: &ProviderMeta, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        let object = O::expand(data)?;
        match meta.service::<O>().update(id, &object).await {
            Ok(updated) => {
                updated.flatten(data);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                warn!(type_name = O::TYPE_NAME, id, "Object not found");
                data.clear_id();
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, meta: &ProviderMeta, data: &ResourceData) -> Result<()> {
        let id = require_id(data)?;
        match meta.service::<O>().delete(id).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }

    async fn import(&self, meta: &ProviderMeta, id_or_name: &str) -> Result<String> {
        resolve_import(&meta.service::<O>(), id_or_name).await
    }
}

/// Lookup of an object by id or name
pub struct ObjectDataSource<O>(PhantomData<fn() -> O>);

impl<O: ObjectType> Default for ObjectDataSource<O> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

#[async_trait]
impl<O: ObjectType> DataSource for ObjectDataSource<O> {
    fn type_name(&self) -> &'static str {
        O::TYPE_NAME
    }

    fn schema(&self) -> Schema {
        ObjectResource::<O>::object_schema().as_data_source()
    }

    async fn read(&self, meta: &ProviderMeta, data: &mut ResourceData) -> Result<()> {
        let object = lookup(&meta.service::<O>(), data).await?;
        object.flatten(data);
        data.set("id", json!(object.id()));
        data.set_id(object.id());
        Ok(())
    }
}

fn object_resource<O: ObjectType>() -> Arc<dyn Resource> {
    Arc::new(ObjectResource::<O>::default())
}

fn object_data_source<O: ObjectType>() -> Arc<dyn DataSource> {
    Arc::new(ObjectDataSource::<O>::default())
}

pub fn resources() -> Vec<Arc<dyn Resource>> {
    vec![
        object_resource::<rule_labels::RuleLabel>(),
        object_resource::<ip_source_groups::IpSourceGroup>(),
        object_resource::<ip_destination_groups::IpDestinationGroup>(),
    ]
}

pub fn data_sources() -> Vec<Arc<dyn DataSource>> {
    vec![
        object_data_source::<rule_labels::RuleLabel>(),
        object_data_source::<ip_source_groups::IpSourceGroup>(),
        object_data_source::<ip_destination_groups::IpDestinationGroup>(),
    ]
}

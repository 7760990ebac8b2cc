//! Provider runtime
//!
//! [`Provider`] owns the registry of resources and data sources and drives
//! their lifecycle: it validates configuration against each schema, calls the
//! resource, records audit events, and turns errors into [`Diagnostics`].
//!
//! - [`schema`]: attribute model and configuration validation
//! - [`data`]: per-resource working values
//! - [`diagnostics`]: user-facing errors and warnings

pub mod data;
pub mod diagnostics;
pub mod schema;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use crate::audit::{AuditLog, EventType};
use crate::client::services::{ApiObject, ObjectService};
use crate::client::{RestBackend, ZiaClient};
use crate::config::ProviderConfig;
use crate::core::error::Error;
use crate::core::ordering::{OrderingSettings, RuleOrderer};
use crate::core::retry::RetryPolicy;
use crate::resources::{self, DataSource, Resource};
use crate::validators;
pub use data::ResourceData;
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use schema::{AttrType, Attribute, Schema};

/// A create that returned an error
#[derive(Debug)]
pub struct CreateFailed {
    pub diagnostics: Diagnostics,
    /// Values of the remote object, if it was created before the error
    pub partial: Option<ResourceData>,
}

impl From<Diagnostics> for CreateFailed {
    fn from(diagnostics: Diagnostics) -> Self {
        Self {
            diagnostics,
            partial: None,
        }
    }
}

/// Everything a resource needs to talk to ZIA
pub struct ProviderMeta {
    pub backend: Arc<dyn RestBackend>,
    pub orderer: Arc<RuleOrderer>,
    pub retry: RetryPolicy,
    pub audit: Option<AuditLog>,
}

impl ProviderMeta {
    pub fn new(backend: Arc<dyn RestBackend>, retry: RetryPolicy, ordering: OrderingSettings) -> Self {
        Self {
            backend,
            orderer: Arc::new(RuleOrderer::new(ordering)),
            retry,
            audit: None,
        }
    }

    #[must_use]
    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn service<T: ApiObject>(&self) -> ObjectService<T> {
        ObjectService::new(Arc::clone(&self.backend))
    }

    pub async fn record(
        &self,
        event_type: EventType,
        resource_type: &str,
        resource_id: Option<&str>,
        details: Value,
        error: Option<String>,
    ) {
        if let Some(audit) = &self.audit {
            audit
                .record(event_type, resource_type, resource_id, details, error)
                .await;
        }
    }
}

/// Full provider schema, as printed by the `schema` command
#[derive(Debug, Clone, Serialize)]
pub struct ProviderSchema {
    pub provider: Schema,
    pub resource_schemas: BTreeMap<String, Schema>,
    pub data_source_schemas: BTreeMap<String, Schema>,
}

/// Schema of the `provider "zia"` block.
pub fn provider_block_schema() -> Schema {
    Schema::new("Zscaler Internet Access")
        .with(
            "username",
            Attribute::string().describe("Admin username (ZIA_USERNAME)"),
        )
        .with(
            "password",
            Attribute::string()
                .sensitive()
                .describe("Admin password (ZIA_PASSWORD)"),
        )
        .with(
            "api_key",
            Attribute::string()
                .sensitive()
                .describe("Organization API key (ZIA_API_KEY)"),
        )
        .with(
            "zia_cloud",
            Attribute::string()
                .validate_str(validators::validate_cloud)
                .describe("Cloud the tenant lives on (ZIA_CLOUD)"),
        )
        .with(
            "base_url",
            Attribute::string().describe("Explicit API root, overrides zia_cloud (ZIA_BASE_URL)"),
        )
}

type Outcome<T> = std::result::Result<T, Diagnostics>;

pub struct Provider {
    resources: BTreeMap<&'static str, Arc<dyn Resource>>,
    data_sources: BTreeMap<&'static str, Arc<dyn DataSource>>,
    meta: Option<Arc<ProviderMeta>>,
    client: Option<Arc<ZiaClient>>,
}

impl Default for Provider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider {
    /// Provider with every ZIA resource and data source registered.
    pub fn new() -> Self {
        let resources = resources::all_resources()
            .into_iter()
            .map(|r| (r.type_name(), r))
            .collect();
        let data_sources = resources::all_data_sources()
            .into_iter()
            .map(|d| (d.type_name(), d))
            .collect();
        Self {
            resources,
            data_sources,
            meta: None,
            client: None,
        }
    }

    pub fn schema(&self) -> ProviderSchema {
        ProviderSchema {
            provider: provider_block_schema(),
            resource_schemas: self
                .resources
                .iter()
                .map(|(name, r)| ((*name).to_string(), r.schema()))
                .collect(),
            data_source_schemas: self
                .data_sources
                .iter()
                .map(|(name, d)| ((*name).to_string(), d.schema()))
                .collect(),
        }
    }

    pub fn resource_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.resources.keys().copied()
    }

    pub fn data_source_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.data_sources.keys().copied()
    }

    /// Builds the API client from `config` overlaid with the provider block.
    pub fn configure(&mut self, mut config: ProviderConfig, block: &Map<String, Value>) -> Diagnostics {
        let diags = provider_block_schema().validate_config(block);
        if diags.has_errors() {
            return diags;
        }
        config.apply_block(block);

        let client = match ZiaClient::new(&config) {
            Ok(client) => Arc::new(client),
            Err(e) => return Diagnostic::from_error("Invalid provider configuration", &e).into(),
        };

        let mut meta = ProviderMeta::new(
            Arc::clone(&client) as Arc<dyn RestBackend>,
            config.retry_policy(),
            config.ordering_settings(),
        );
        if config.audit_log {
            match AuditLog::new() {
                Ok(audit) => meta = meta.with_audit(audit),
                Err(e) => warn!(error = %e, "Audit log unavailable"),
            }
        }

        info!(base_url = client.base_url(), "Provider configured");
        self.meta = Some(Arc::new(meta));
        self.client = Some(client);
        diags
    }

    /// Uses an already built backend (tests, alternative transports).
    pub fn configure_with(&mut self, meta: ProviderMeta) {
        self.meta = Some(Arc::new(meta));
        self.client = None;
    }

    pub fn meta(&self) -> Outcome<&Arc<ProviderMeta>> {
        self.meta.as_ref().ok_or_else(|| {
            Diagnostic::error(
                "Provider not configured",
                "configure() must succeed before resources are used",
            )
            .into()
        })
    }

    fn resource(&self, type_name: &str) -> Outcome<&Arc<dyn Resource>> {
        self.resources.get(type_name).ok_or_else(|| {
            Diagnostic::error(
                "Unknown resource type",
                format!("The provider has no resource \"{type_name}\"."),
            )
            .into()
        })
    }

    fn data_source(&self, type_name: &str) -> Outcome<&Arc<dyn DataSource>> {
        self.data_sources.get(type_name).ok_or_else(|| {
            Diagnostic::error(
                "Unknown data source",
                format!("The provider has no data source \"{type_name}\"."),
            )
            .into()
        })
    }

    /// Schema and cross-attribute checks for a resource configuration.
    pub fn validate_resource_config(&self, type_name: &str, config: &Map<String, Value>) -> Diagnostics {
        let resource = match self.resource(type_name) {
            Ok(resource) => resource,
            Err(diags) => return diags,
        };
        let schema = resource.schema();
        let mut diags = schema.validate_config(config);
        if !diags.has_errors() {
            let mut config = config.clone();
            schema.apply_defaults(&mut config);
            diags.extend(resource.validate(&ResourceData::new(config)));
        }
        diags
    }

    /// Attributes whose change forces the resource to be recreated.
    pub fn requires_replace(
        &self,
        type_name: &str,
        prior: &Map<String, Value>,
        config: &Map<String, Value>,
    ) -> Vec<String> {
        let Ok(resource) = self.resource(type_name) else {
            return Vec::new();
        };
        resource
            .schema()
            .attributes
            .iter()
            .filter(|(name, attribute)| {
                attribute.force_new
                    && config.get(*name).is_some_and(|v| !v.is_null())
                    && config.get(*name) != prior.get(*name)
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn prepare(&self, type_name: &str, mut config: Map<String, Value>) -> Outcome<Map<String, Value>> {
        let resource = self.resource(type_name)?;
        resource.schema().apply_defaults(&mut config);
        let diags = self.validate_resource_config(type_name, &config);
        if diags.has_errors() {
            return Err(diags);
        }
        Ok(config)
    }

    pub async fn create(&self, type_name: &str, config: Map<String, Value>) -> Outcome<ResourceData> {
        self.create_tracked(type_name, config).await.map_err(|failed| failed.diagnostics)
    }

    /// Creates a resource, keeping whatever was created remotely on failure.
    ///
    /// # Errors
    ///
    /// Returns [`CreateFailed`] with the diagnostics. Its `partial` data is
    /// set when ZIA assigned an id before the failure, so the caller can keep
    /// tracking the object instead of creating it again.
    pub async fn create_tracked(
        &self,
        type_name: &str,
        config: Map<String, Value>,
    ) -> Result<ResourceData, CreateFailed> {
        let config = self.prepare(type_name, config)?;
        let meta = self.meta()?;
        let resource = self.resource(type_name)?;

        let mut data = ResourceData::new(config);
        let result = resource.create(meta, &mut data).await;
        meta.record(
            EventType::CreateResource,
            type_name,
            data.id(),
            json!({ "name": data.get_str("name") }),
            result.as_ref().err().map(ToString::to_string),
        )
        .await;

        match result {
            Ok(()) => {
                info!(type_name, id = data.id(), "Created resource");
                Ok(data)
            }
            Err(e) => {
                let diagnostics = Diagnostic::from_error(format!("Error creating {type_name}"), &e).into();
                let partial = data.id().is_some().then_some(data);
                if let Some(data) = &partial {
                    warn!(type_name, id = data.id(), error = %e, "Resource created but not settled");
                }
                Err(CreateFailed { diagnostics, partial })
            }
        }
    }

    /// Refreshes a resource. Returns `None` when it no longer exists.
    pub async fn read(
        &self,
        type_name: &str,
        id: &str,
        state: Map<String, Value>,
    ) -> Outcome<Option<ResourceData>> {
        let meta = self.meta()?;
        let resource = self.resource(type_name)?;

        let mut data = ResourceData::from_state(id, state);
        match resource.read(meta, &mut data).await {
            Ok(()) if data.is_gone() => {
                warn!(type_name, id, "Resource not found, removing from state");
                Ok(None)
            }
            Ok(()) => Ok(Some(data)),
            Err(e) => Err(Diagnostic::from_error(format!("Error reading {type_name} {id}"), &e).into()),
        }
    }

    /// Applies a new configuration. Returns `None` when the resource turned
    /// out to be gone.
    pub async fn update(
        &self,
        type_name: &str,
        id: &str,
        prior: Map<String, Value>,
        config: Map<String, Value>,
    ) -> Outcome<Option<ResourceData>> {
        let config = self.prepare(type_name, config)?;
        let meta = self.meta()?;
        let resource = self.resource(type_name)?;

        let mut data = ResourceData::for_update(id, prior, config);
        let result = resource.update(meta, &mut data).await;
        meta.record(
            EventType::UpdateResource,
            type_name,
            Some(id),
            json!({ "name": data.get_str("name") }),
            result.as_ref().err().map(ToString::to_string),
        )
        .await;

        match result {
            Ok(()) if data.is_gone() => {
                warn!(type_name, id, "Resource not found, removing from state");
                Ok(None)
            }
            Ok(()) => {
                info!(type_name, id, "Updated resource");
                Ok(Some(data))
            }
            Err(e) => Err(Diagnostic::from_error(format!("Error updating {type_name} {id}"), &e).into()),
        }
    }

    pub async fn delete(&self, type_name: &str, id: &str, state: Map<String, Value>) -> Outcome<()> {
        let meta = self.meta()?;
        let resource = self.resource(type_name)?;

        let data = ResourceData::from_state(id, state);
        let result = resource.delete(meta, &data).await;
        meta.record(
            EventType::DeleteResource,
            type_name,
            Some(id),
            json!({}),
            result.as_ref().err().map(ToString::to_string),
        )
        .await;

        match result {
            Ok(()) => {
                info!(type_name, id, "Deleted resource");
                Ok(())
            }
            Err(e) => Err(Diagnostic::from_error(format!("Error deleting {type_name} {id}"), &e).into()),
        }
    }

    /// Imports an existing object by numeric id or by name.
    pub async fn import(&self, type_name: &str, id_or_name: &str) -> Outcome<ResourceData> {
        let meta = self.meta()?;
        let resource = self.resource(type_name)?;

        let imported = async {
            let id = resource.import(meta, id_or_name).await?;
            let mut data = ResourceData::from_state(id, Map::new());
            resource.read(meta, &mut data).await?;
            if data.is_gone() {
                return Err(Error::NotFound(format!("{type_name} '{id_or_name}'")));
            }
            Ok(data)
        }
        .await;

        meta.record(
            EventType::ImportResource,
            type_name,
            imported.as_ref().ok().and_then(ResourceData::id),
            json!({ "lookup": id_or_name }),
            imported.as_ref().err().map(ToString::to_string),
        )
        .await;

        imported.map_err(|e| {
            Diagnostic::from_error(format!("Error importing {type_name} '{id_or_name}'"), &e).into()
        })
    }

    pub async fn read_data_source(
        &self,
        type_name: &str,
        config: Map<String, Value>,
    ) -> Outcome<Map<String, Value>> {
        let data_source = self.data_source(type_name)?;
        let diags = data_source.schema().validate_config(&config);
        if diags.has_errors() {
            return Err(diags);
        }
        let meta = self.meta()?;

        let mut data = ResourceData::new(config);
        data_source
            .read(meta, &mut data)
            .await
            .map_err(|e| Diagnostic::from_error(format!("Error reading data source {type_name}"), &e))?;
        Ok(data.into_values())
    }

    /// Activates pending configuration changes.
    pub async fn activate(&self) -> Outcome<String> {
        let meta = self.meta()?;
        let result = meta.backend.activate().await;
        meta.record(
            EventType::Activate,
            "zia_activation_status",
            None,
            json!({ "status": result.as_ref().ok() }),
            result.as_ref().err().map(ToString::to_string),
        )
        .await;
        result.map_err(|e| Diagnostic::from_error("Error activating configuration", &e).into())
    }

    /// Ends the API session, if one was opened.
    pub async fn shutdown(&self) {
        if let Some(client) = &self.client
            && let Err(e) = client.logout().await
        {
            warn!(error = %e, "Logout failed");
        }
    }
}

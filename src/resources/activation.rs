//! `zia_activation_status`
//!
//! ZIA stages configuration changes until they are activated. Creating or
//! updating this resource activates them; reading reports the tenant's
//! current activation status. Deleting it only forgets it.

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::{DataSource, Resource};
use crate::core::error::{Error, Result};
use crate::provider::{Attribute, ProviderMeta, ResourceData, Schema};

pub const ACTIVATION_TYPE: &str = "zia_activation_status";

/// Fixed id; there is one activation state per tenant.
const ACTIVATION_ID: &str = "activation";

fn validate_requested_status(value: &str) -> std::result::Result<(), String> {
    if value == "ACTIVE" {
        Ok(())
    } else {
        Err(format!("status must be ACTIVE, got '{value}'"))
    }
}

pub struct ActivationResource;

impl ActivationResource {
    async fn activate(meta: &ProviderMeta, data: &mut ResourceData) -> Result<()> {
        let status = meta.backend.activate().await?;
        info!(status, "Activated configuration");
        data.set_id(ACTIVATION_ID);
        data.set("status", json!(status));
        Ok(())
    }
}

#[async_trait]
impl Resource for ActivationResource {
    fn type_name(&self) -> &'static str {
        ACTIVATION_TYPE
    }

    fn schema(&self) -> Schema {
        Schema::new("Activation of pending ZIA configuration changes").with(
            "status",
            Attribute::string()
                .optional_computed()
                .default_value(json!("ACTIVE"))
                .validate_str(validate_requested_status)
                .describe("Requested activation status"),
        )
    }

    async fn create(&self, meta: &ProviderMeta, data: &mut ResourceData) -> Result<()> {
        Self::activate(meta, data).await
    }

    async fn read(&self, meta: &ProviderMeta, data: &mut ResourceData) -> Result<()> {
        let status = meta.backend.activation_status().await?;
        data.set("status", json!(status));
        Ok(())
    }

    async fn update(&self, meta: &ProviderMeta, data: &mut ResourceData) -> Result<()> {
        Self::activate(meta, data).await
    }

    async fn delete(&self, _meta: &ProviderMeta, _data: &ResourceData) -> Result<()> {
        Ok(())
    }

    async fn import(&self, _meta: &ProviderMeta, id_or_name: &str) -> Result<String> {
        if id_or_name == ACTIVATION_ID {
            Ok(ACTIVATION_ID.to_string())
        } else {
            Err(Error::validation(
                "id",
                format!("activation status is imported as '{ACTIVATION_ID}'"),
            ))
        }
    }
}

pub struct ActivationDataSource;

#[async_trait]
impl DataSource for ActivationDataSource {
    fn type_name(&self) -> &'static str {
        ACTIVATION_TYPE
    }

    fn schema(&self) -> Schema {
        Schema::new("Current ZIA activation status").with(
            "status",
            Attribute::string().computed().describe("ACTIVE or PENDING"),
        )
    }

    async fn read(&self, meta: &ProviderMeta, data: &mut ResourceData) -> Result<()> {
        let status = meta.backend.activation_status().await?;
        data.set_id(ACTIVATION_ID);
        data.set("status", json!(status));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{Map, json};

    use super::*;
    use crate::client::HttpMethod;
    use crate::core::test_helpers::{MemoryBackend, fast_provider};

    #[tokio::test]
    async fn test_create_activates_pending_changes() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_status("PENDING");
        let provider = fast_provider(Arc::clone(&backend));

        let data = provider.create(ACTIVATION_TYPE, Map::new()).await.unwrap();
        assert_eq!(data.id(), Some(ACTIVATION_ID));
        assert_eq!(data.get_str("status"), Some("ACTIVE"));
        assert_eq!(backend.count_requests(HttpMethod::Post, "/status/activate"), 1);
    }

    #[tokio::test]
    async fn test_read_reports_server_status() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_status("PENDING");
        let provider = fast_provider(Arc::clone(&backend));

        let data = provider
            .read(ACTIVATION_TYPE, ACTIVATION_ID, Map::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(data.get_str("status"), Some("PENDING"));

        let values = provider
            .read_data_source(ACTIVATION_TYPE, Map::new())
            .await
            .unwrap();
        assert_eq!(values["status"], json!("PENDING"));
    }

    #[tokio::test]
    async fn test_delete_is_a_no_op() {
        let backend = Arc::new(MemoryBackend::new());
        let provider = fast_provider(Arc::clone(&backend));
        provider
            .delete(ACTIVATION_TYPE, ACTIVATION_ID, Map::new())
            .await
            .unwrap();
        assert!(backend.requests().is_empty());
    }

    #[test]
    fn test_only_active_can_be_requested() {
        assert!(validate_requested_status("ACTIVE").is_ok());
        assert!(validate_requested_status("PENDING").is_err());
    }
}

//! Audit trail of changes made through the provider
//!
//! Creates, updates, deletes, imports, rule reorders and activations are
//! appended to `<state dir>/audit.log`, one JSON object per line. Logging is
//! opt-in (`audit_log` in the provider configuration). Write failures never
//! fail the operation being audited.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::utils::{get_state_dir, truncate_string};

/// Longest error message kept in an audit entry
const MAX_ERROR_LEN: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    CreateResource,
    UpdateResource,
    DeleteResource,
    ImportResource,
    ReorderRules,
    Activate,
}

/// One line of the audit log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    /// Terraform type name, e.g. `zia_firewall_dns_rule`
    pub resource_type: Option<String>,
    /// ZIA object id, once one exists
    pub resource_id: Option<String>,
    pub success: bool,
    pub details: Value,
    pub error: Option<String>,
}

impl AuditEvent {
    /// Successful event with no resource attached.
    pub fn new(event_type: EventType) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            resource_type: None,
            resource_id: None,
            success: true,
            details: Value::Object(serde_json::Map::new()),
            error: None,
        }
    }

    pub fn resource(mut self, resource_type: &str, resource_id: Option<&str>) -> Self {
        self.resource_type = Some(resource_type.to_string());
        self.resource_id = resource_id.map(str::to_string);
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Marks the event failed; long API error bodies are cut short.
    pub fn failed(mut self, error: &str) -> Self {
        self.success = false;
        self.error = Some(truncate_string(error, MAX_ERROR_LEN));
        self
    }
}

/// Append-only JSON-lines writer
///
/// Clones share one write lock so concurrent resource operations never
/// interleave partial lines.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl AuditLog {
    /// Audit log in the state directory.
    ///
    /// # Errors
    ///
    /// Returns `Err` if no state directory is available on this platform.
    pub fn new() -> std::io::Result<Self> {
        let dir = get_state_dir().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "State directory not found")
        })?;
        Ok(Self::at(dir.join("audit.log")))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// # Errors
    ///
    /// Returns `Err` if the log cannot be opened or written.
    pub async fn append(&self, event: &AuditEvent) -> std::io::Result<()> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(dir).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.sync_data().await
    }

    /// Records the outcome of a resource operation.
    pub async fn record(
        &self,
        event_type: EventType,
        resource_type: &str,
        resource_id: Option<&str>,
        details: Value,
        error: Option<String>,
    ) {
        let mut event = AuditEvent::new(event_type)
            .resource(resource_type, resource_id)
            .details(details);
        if let Some(error) = error {
            event = event.failed(&error);
        }
        if let Err(e) = self.append(&event).await {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to write audit log");
        }
    }

    /// Last `count` readable events, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the log cannot be read.
    pub async fn read_recent(&self, count: usize) -> std::io::Result<Vec<AuditEvent>> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        Ok(content
            .lines()
            .rev()
            .filter_map(|line| serde_json::from_str(line).ok())
            .take(count)
            .collect())
    }
}

//! Local state store for the CLI driver
//!
//! The state file is a single JSON document mapping resource addresses
//! (`<type>.<name>`) to the last known remote values. It is stored in the
//! application's data directory unless a path is given explicitly, written
//! atomically, and carries a SHA-256 checksum of its contents.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use super::error::{Error, Result, StateError};
use crate::utils::get_data_dir;

pub const STATE_FORMAT_VERSION: u32 = 1;

/// One tracked resource
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceState {
    pub type_name: String,
    pub name: String,
    pub id: String,
    pub values: Map<String, Value>,
    pub updated_at: DateTime<Utc>,
    /// Created remotely but not brought to its configured values; the next
    /// apply replaces it
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub tainted: bool,
}

impl ResourceState {
    pub fn address(&self) -> String {
        format!("{}.{}", self.type_name, self.name)
    }
}

/// All tracked resources, keyed by address
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StateFile {
    pub resources: BTreeMap<String, ResourceState>,
}

impl StateFile {
    pub fn get(&self, address: &str) -> Option<&ResourceState> {
        self.resources.get(address)
    }

    /// Inserts or replaces the entry for the resource's address.
    pub fn upsert(&mut self, resource: ResourceState) {
        self.resources.insert(resource.address(), resource);
    }

    pub fn remove(&mut self, address: &str) -> Option<ResourceState> {
        self.resources.remove(address)
    }

    /// Starts tracking an imported resource.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the address is already tracked.
    pub fn track_new(&mut self, resource: ResourceState) -> Result<()> {
        let address = resource.address();
        if self.resources.contains_key(&address) {
            return Err(StateError::DuplicateAddress(address).into());
        }
        self.resources.insert(address, resource);
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    checksum: String,
    state: StateFile,
}

/// Validates a resource name for use in an address.
///
/// Constraints: non-empty, at most 64 characters, ASCII alphanumerics,
/// underscores and hyphens only.
///
/// # Errors
///
/// Returns `Err` describing the first violated constraint.
pub fn validate_resource_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::validation("name", "Name cannot be empty"));
    }
    if name.len() > 64 {
        return Err(Error::validation("name", "Name too long (max 64 chars)"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(Error::validation(
            "name",
            "Name contains invalid characters (use only a-z, 0-9, _, -)",
        ));
    }
    Ok(())
}

/// Computes the SHA-256 checksum of the serialized resources.
pub fn compute_checksum(state: &StateFile) -> Result<String> {
    let json = serde_json::to_string(&state.resources)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Reads and writes the state file
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location: `<data dir>/state.json`.
    pub fn default_path() -> Option<PathBuf> {
        get_data_dir().map(|mut p| {
            p.push("state.json");
            p
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the state, returning an empty state if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the file cannot be read, is not valid JSON, has a
    /// different format version, or fails checksum verification.
    pub async fn load(&self) -> Result<StateFile> {
        let json = match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No state file yet, starting empty");
                return Ok(StateFile::default());
            }
            Err(e) => return Err(e.into()),
        };

        let envelope: Envelope =
            serde_json::from_str(&json).map_err(|_| Error::State(StateError::Corrupted))?;

        if envelope.version != STATE_FORMAT_VERSION {
            return Err(StateError::VersionMismatch {
                found: envelope.version,
                expected: STATE_FORMAT_VERSION,
            }
            .into());
        }

        let actual = compute_checksum(&envelope.state)?;
        if actual != envelope.checksum {
            warn!(path = %self.path.display(), "State checksum mismatch");
            return Err(StateError::ChecksumMismatch {
                expected: envelope.checksum,
                actual,
            }
            .into());
        }

        Ok(envelope.state)
    }

    /// Saves the state using an atomic write pattern.
    /// 1. Writes to a temporary file in the same directory.
    /// 2. Sets restrictive permissions (0o600) on Unix.
    /// 3. Atomically renames to the target path.
    ///
    /// # Errors
    ///
    /// Returns `Err` if serialization or any filesystem step fails.
    pub async fn save(&self, state: &StateFile) -> Result<()> {
        let envelope = Envelope {
            version: STATE_FORMAT_VERSION,
            checksum: compute_checksum(state)?,
            state: state.clone(),
        };
        let json = serde_json::to_vec_pretty(&envelope)?;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &json))
            .await
            .map_err(|e| Error::Internal(format!("state writer panicked: {e}")))??;

        info!(path = %self.path.display(), resources = state.resources.len(), "State saved");
        Ok(())
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    use std::io::Write;

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| {
        if e.error.kind() == std::io::ErrorKind::StorageFull {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::StorageFull,
                "Disk full: cannot save state. Free up space and try again.",
            ))
        } else {
            Error::Io(e.error)
        }
    })?;
    Ok(())
}

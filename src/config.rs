//! Provider configuration
//!
//! Settings come from an optional JSON file (`<config dir>/provider.json` by
//! default), then from `ZIA_*` environment variables, then from the provider
//! block of the Terraform configuration. Later sources win.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::core::error::{Error, Result};
use crate::core::ordering::OrderingSettings;
use crate::core::retry::RetryPolicy;
use crate::utils::get_config_dir;

/// ZIA clouds a tenant can live on
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::EnumString,
    strum::VariantNames,
    strum::AsRefStr,
    strum::Display,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ZiaCloud {
    #[default]
    Zscaler,
    Zscalerone,
    Zscalertwo,
    Zscalerthree,
    Zscloud,
    Zscalerbeta,
    Zscalergov,
    Zscalerten,
    Zspreview,
}

impl ZiaCloud {
    pub fn base_url(self) -> String {
        format!("https://zsapi.{self}.net/api/v1")
    }
}

/// Minimum length of a ZIA API key; obfuscation reads up to index 11.
pub const MIN_API_KEY_LEN: usize = 12;

/// Complete provider configuration
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    pub username: String,
    pub password: String,
    pub api_key: String,
    pub zia_cloud: String,
    /// Overrides the URL derived from `zia_cloud`
    pub base_url: Option<String>,
    pub http_timeout_secs: u64,
    /// Retries for 429 and edit-lock responses
    pub max_http_retries: u32,
    /// Sleep between `INVALID_INPUT_ARGUMENT` retries
    pub retry_interval_secs: u64,
    pub create_timeout_secs: u64,
    pub reorder_settle_secs: u64,
    pub reorder_timeout_secs: u64,
    /// Write mutating calls to the audit log (opt-in)
    pub audit_log: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            api_key: String::new(),
            zia_cloud: ZiaCloud::default().to_string(),
            base_url: None,
            http_timeout_secs: 60,
            max_http_retries: 5,
            retry_interval_secs: 10,
            create_timeout_secs: 20 * 60,
            reorder_settle_secs: 25,
            reorder_timeout_secs: 3600,
            audit_log: false,
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("api_key", &redact(&self.api_key))
            .field("zia_cloud", &self.zia_cloud)
            .field("base_url", &self.base_url)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("max_http_retries", &self.max_http_retries)
            .field("retry_interval_secs", &self.retry_interval_secs)
            .field("create_timeout_secs", &self.create_timeout_secs)
            .field("reorder_settle_secs", &self.reorder_settle_secs)
            .field("reorder_timeout_secs", &self.reorder_timeout_secs)
            .field("audit_log", &self.audit_log)
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() { "" } else { "***" }
}

impl ProviderConfig {
    /// Default location: `<config dir>/provider.json`.
    pub fn default_path() -> Option<PathBuf> {
        get_config_dir().map(|mut p| {
            p.push("provider.json");
            p
        })
    }

    /// Loads the config file (if any) and applies environment overrides.
    ///
    /// An explicit `path` must exist; the default path is optional.
    ///
    /// # Errors
    ///
    /// Returns `Err` if an explicit file is missing, or any file cannot be
    /// read or parsed.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path).await?,
            None => match Self::default_path() {
                Some(path) if tokio::fs::try_exists(&path).await.unwrap_or(false) => {
                    Self::from_file(&path).await?
                }
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    async fn from_file(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config = serde_json::from_str(&json)
            .map_err(|e| Error::Config(format!("invalid {}: {e}", path.display())))?;
        info!(path = %path.display(), "Loaded provider configuration");
        Ok(config)
    }

    /// Applies `ZIA_*` overrides using `lookup` to read variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(v) = non_empty("ZIA_USERNAME") {
            self.username = v;
        }
        if let Some(v) = non_empty("ZIA_PASSWORD") {
            self.password = v;
        }
        if let Some(v) = non_empty("ZIA_API_KEY") {
            self.api_key = v;
        }
        if let Some(v) = non_empty("ZIA_CLOUD") {
            self.zia_cloud = v;
        }
        if let Some(v) = non_empty("ZIA_BASE_URL") {
            self.base_url = Some(v);
        }
    }

    /// Applies the attributes of a Terraform provider block.
    pub fn apply_block(&mut self, block: &Map<String, Value>) {
        let text = |key: &str| {
            block
                .get(key)
                .and_then(Value::as_str)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        if let Some(v) = text("username") {
            self.username = v;
        }
        if let Some(v) = text("password") {
            self.password = v;
        }
        if let Some(v) = text("api_key") {
            self.api_key = v;
        }
        if let Some(v) = text("zia_cloud") {
            self.zia_cloud = v;
        }
        if let Some(v) = text("base_url") {
            self.base_url = Some(v);
        }
    }

    /// # Errors
    ///
    /// Returns `Error::Config` naming the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.username.is_empty() {
            return Err(Error::Config("username is required (ZIA_USERNAME)".into()));
        }
        if self.password.is_empty() {
            return Err(Error::Config("password is required (ZIA_PASSWORD)".into()));
        }
        if self.api_key.chars().count() < MIN_API_KEY_LEN {
            return Err(Error::Config(format!(
                "api_key must be at least {MIN_API_KEY_LEN} characters (ZIA_API_KEY)"
            )));
        }
        if self.base_url.is_none() {
            crate::validators::validate_cloud(&self.zia_cloud).map_err(Error::Config)?;
        }
        if self.retry_interval_secs == 0
            || self.reorder_settle_secs == 0
            || self.http_timeout_secs == 0
        {
            return Err(Error::Config("intervals and timeouts must be non-zero".into()));
        }
        Ok(())
    }

    /// API root, without a trailing slash.
    ///
    /// # Errors
    ///
    /// Returns `Err` if `zia_cloud` is unknown and no `base_url` is set.
    pub fn api_url(&self) -> Result<String> {
        if let Some(url) = &self.base_url {
            return Ok(url.trim_end_matches('/').to_string());
        }
        self.zia_cloud
            .parse::<ZiaCloud>()
            .map(ZiaCloud::base_url)
            .map_err(|_| Error::Config(format!("unknown zia_cloud '{}'", self.zia_cloud)))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            interval: Duration::from_secs(self.retry_interval_secs),
            timeout: Duration::from_secs(self.create_timeout_secs),
        }
    }

    pub fn ordering_settings(&self) -> OrderingSettings {
        OrderingSettings {
            settle_interval: Duration::from_secs(self.reorder_settle_secs),
            timeout: Duration::from_secs(self.reorder_timeout_secs),
            ..OrderingSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn complete() -> ProviderConfig {
        ProviderConfig {
            username: "admin@example.com".into(),
            password: "secret".into(),
            api_key: "abcdefghijkl".into(),
            ..ProviderConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = ProviderConfig::default();
        assert_eq!(config.zia_cloud, "zscaler");
        assert_eq!(config.retry_policy().interval, Duration::from_secs(10));
        assert_eq!(config.ordering_settings().stable_ticks, 3);
        assert!(!config.audit_log);
    }

    #[test]
    fn test_cloud_urls() {
        assert_eq!(
            ZiaCloud::Zscalertwo.base_url(),
            "https://zsapi.zscalertwo.net/api/v1"
        );
        let mut config = complete();
        config.zia_cloud = "zscloud".into();
        assert_eq!(config.api_url().unwrap(), "https://zsapi.zscloud.net/api/v1");
        config.base_url = Some("http://127.0.0.1:8080/api/v1/".into());
        assert_eq!(config.api_url().unwrap(), "http://127.0.0.1:8080/api/v1");
    }

    #[test]
    fn test_validate() {
        assert!(complete().validate().is_ok());
        assert!(ProviderConfig::default().validate().is_err());

        let mut short_key = complete();
        short_key.api_key = "abc".into();
        assert!(short_key.validate().is_err());

        let mut bad_cloud = complete();
        bad_cloud.zia_cloud = "zscalerfive".into();
        assert!(bad_cloud.validate().is_err());

        let mut zero = complete();
        zero.retry_interval_secs = 0;
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("ZIA_USERNAME", "env-user"),
            ("ZIA_CLOUD", "zscalerbeta"),
            ("ZIA_PASSWORD", ""),
        ]
        .into_iter()
        .collect();

        let mut config = complete();
        config.apply_env(|k| env.get(k).map(ToString::to_string));
        assert_eq!(config.username, "env-user");
        assert_eq!(config.zia_cloud, "zscalerbeta");
        // Empty variables do not clear file values
        assert_eq!(config.password, "secret");
    }

    #[test]
    fn test_provider_block_wins() {
        let mut config = complete();
        let block = serde_json::json!({ "zia_cloud": "zscalergov", "username": "" });
        config.apply_block(block.as_object().unwrap());
        assert_eq!(config.zia_cloud, "zscalergov");
        assert_eq!(config.username, "admin@example.com");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", complete());
        assert!(!rendered.contains("secret"));
        assert!(!rendered.contains("abcdefghijkl"));
        assert!(rendered.contains("admin@example.com"));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("provider.json");
        std::fs::write(&path, r#"{"username": "file-user", "reorder_settle_secs": 5}"#).unwrap();

        let config = ProviderConfig::from_file(&path).await.unwrap();
        assert_eq!(config.username, "file-user");
        assert_eq!(config.reorder_settle_secs, 5);
        assert_eq!(config.retry_interval_secs, 10);
    }

    #[tokio::test]
    async fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ProviderConfig::load(Some(&dir.path().join("nope.json")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}

//! ZIA REST client
//!
//! [`RestBackend`] is the seam between resources and the API: resources only
//! speak JSON over paths, so tests can swap the HTTP client for an in-memory
//! backend. [`ZiaClient`] is the real implementation over `reqwest`.
//!
//! The client keeps a cookie-based session. It logs in lazily, logs in again
//! once when a request comes back `401`, waits out `429` responses using
//! `Retry-After`, and backs off linearly while another admin session holds
//! the edit lock.

pub mod auth;
pub mod services;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ProviderConfig;
use crate::core::error::{Error, Result};
use auth::LoginRequest;

/// HTTP verbs used by the ZIA API
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Self::GET,
            HttpMethod::Post => Self::POST,
            HttpMethod::Put => Self::PUT,
            HttpMethod::Delete => Self::DELETE,
        }
    }
}

/// JSON transport to the ZIA API
#[async_trait]
pub trait RestBackend: Send + Sync {
    /// Sends one request. Returns `None` for empty response bodies.
    async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Option<Value>>;

    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Option<Value>> {
        self.request(HttpMethod::Get, path, query, None).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Option<Value>> {
        self.request(HttpMethod::Post, path, &[], Some(body)).await
    }

    async fn put(&self, path: &str, body: &Value) -> Result<Option<Value>> {
        self.request(HttpMethod::Put, path, &[], Some(body)).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.request(HttpMethod::Delete, path, &[], None).await?;
        Ok(())
    }

    /// Activates pending configuration changes and returns the new status.
    async fn activate(&self) -> Result<String> {
        let body = self
            .request(HttpMethod::Post, "/status/activate", &[], None)
            .await?;
        Ok(status_field(body.as_ref()))
    }

    /// Current activation status (`ACTIVE`, `PENDING`, ...).
    async fn activation_status(&self) -> Result<String> {
        let body = self.get("/status", &[]).await?;
        Ok(status_field(body.as_ref()))
    }
}

fn status_field(body: Option<&Value>) -> String {
    body.and_then(|b| b.get("status"))
        .and_then(Value::as_str)
        .unwrap_or("UNKNOWN")
        .to_string()
}

/// Builds `Error::Api` from a status code and response body.
///
/// ZIA error bodies look like `{"code": "...", "message": "..."}`; anything
/// else is kept verbatim as the message.
pub fn api_error(status: StatusCode, body: &str) -> Error {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let field = |name: &str| {
        parsed
            .as_ref()
            .and_then(|v| v.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    Error::Api {
        status: status.as_u16(),
        code: field("code").unwrap_or_default(),
        message: field("message").unwrap_or_else(|| body.trim().to_string()),
    }
}

/// Parses a `Retry-After` header given in seconds.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(2);
const EDIT_LOCK_BACKOFF: Duration = Duration::from_secs(1);

struct Credentials {
    username: String,
    password: String,
    api_key: String,
}

/// Session-authenticated client for one ZIA tenant
pub struct ZiaClient {
    http: Client,
    base_url: String,
    credentials: Credentials,
    /// `true` while the session cookie is believed valid
    session: Mutex<bool>,
    max_retries: u32,
    default_retry_after: Duration,
    edit_lock_backoff: Duration,
}

impl std::fmt::Debug for ZiaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZiaClient")
            .field("base_url", &self.base_url)
            .field("username", &self.credentials.username)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl ZiaClient {
    /// # Errors
    ///
    /// Returns `Err` if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        config.validate()?;
        let http = Client::builder()
            .cookie_store(true)
            .timeout(config.http_timeout())
            .user_agent(concat!("terraform-provider-zia/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_url()?,
            credentials: Credentials {
                username: config.username.clone(),
                password: config.password.clone(),
                api_key: config.api_key.clone(),
            },
            session: Mutex::new(false),
            max_retries: config.max_http_retries,
            default_retry_after: DEFAULT_RETRY_AFTER,
            edit_lock_backoff: EDIT_LOCK_BACKOFF,
        })
    }

    /// Overrides the waits used for `429` without `Retry-After` and for
    /// edit-lock backoff.
    #[must_use]
    pub fn with_backoff(mut self, retry_after: Duration, edit_lock: Duration) -> Self {
        self.default_retry_after = retry_after;
        self.edit_lock_backoff = edit_lock;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Opens a session unless one is already open.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the login request fails.
    pub async fn ensure_session(&self) -> Result<()> {
        let mut open = self.session.lock().await;
        if *open {
            return Ok(());
        }

        let login = LoginRequest::new(
            &self.credentials.username,
            &self.credentials.password,
            &self.credentials.api_key,
            chrono::Utc::now().timestamp_millis(),
        )?;
        let resp = self
            .http
            .post(self.url("/authenticatedSession"))
            .json(&login)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, "ZIA login failed");
            return Err(api_error(status, &body));
        }

        info!(username = %self.credentials.username, "Opened ZIA session");
        *open = true;
        Ok(())
    }

    async fn invalidate_session(&self) {
        *self.session.lock().await = false;
    }

    /// Ends the session.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the API rejects the logout.
    pub async fn logout(&self) -> Result<()> {
        let mut open = self.session.lock().await;
        if !*open {
            return Ok(());
        }
        let resp = self
            .http
            .delete(self.url("/authenticatedSession"))
            .send()
            .await?;
        *open = false;
        let status = resp.status();
        if status.is_success() || status == StatusCode::UNAUTHORIZED {
            info!("Closed ZIA session");
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(api_error(status, &body))
        }
    }

    async fn send_with_retry(
        &self,
        method: HttpMethod,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Option<Value>> {
        let url = self.url(path);
        let mut attempt = 0u32;
        let mut reauthenticated = false;

        loop {
            attempt += 1;
            self.ensure_session().await?;

            let mut request = self.http.request(method.into(), &url).query(query);
            if let Some(body) = body {
                request = request.json(body);
            }

            debug!(method = %method, url = %url, attempt, "Sending ZIA request");
            let resp = request.send().await?;
            let status = resp.status();
            debug!(method = %method, url = %url, status = %status, "Received ZIA response");

            if status.is_success() {
                let text = resp.text().await?;
                if text.trim().is_empty() {
                    return Ok(None);
                }
                return Ok(Some(serde_json::from_str(&text)?));
            }

            if status == StatusCode::UNAUTHORIZED && !reauthenticated {
                warn!(url = %url, "Session rejected, logging in again");
                self.invalidate_session().await;
                reauthenticated = true;
                continue;
            }

            if status == StatusCode::TOO_MANY_REQUESTS && attempt <= self.max_retries {
                let wait = resp
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after)
                    .unwrap_or(self.default_retry_after);
                warn!(
                    url = %url,
                    attempt,
                    wait_ms = wait.as_millis(),
                    "Rate limited (429), waiting before retry"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            let text = resp.text().await.unwrap_or_default();
            let error = api_error(status, &text);
            if error.is_edit_lock() && attempt <= self.max_retries {
                let wait = self.edit_lock_backoff * attempt;
                warn!(
                    url = %url,
                    attempt,
                    wait_ms = wait.as_millis(),
                    "Edit lock held by another session, backing off"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            return Err(error);
        }
    }
}

#[async_trait]
impl RestBackend for ZiaClient {
    async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Option<Value>> {
        self.send_with_retry(method, path, query, body).await
    }
}

//! Session authentication
//!
//! ZIA sessions are opened with `POST /authenticatedSession`. The API key is
//! never sent as-is: it is scrambled with the request timestamp so that a
//! captured login body cannot be replayed later.

use serde::Serialize;

use crate::config::MIN_API_KEY_LEN;
use crate::core::error::{Error, Result};

/// Body of `POST /authenticatedSession`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub api_key: String,
    pub username: String,
    pub password: String,
    pub timestamp: i64,
}

impl LoginRequest {
    /// # Errors
    ///
    /// Returns `Err` if the API key is too short to obfuscate.
    pub fn new(username: &str, password: &str, api_key: &str, timestamp_ms: i64) -> Result<Self> {
        Ok(Self {
            api_key: obfuscate_api_key(api_key, timestamp_ms)?,
            username: username.to_string(),
            password: password.to_string(),
            timestamp: timestamp_ms,
        })
    }
}

/// Scrambles `api_key` with the last six digits of `timestamp_ms`.
///
/// With `n` the last six digits and `r = n >> 1` zero-padded to six digits,
/// the result is `api_key[d]` for each digit `d` of `n` followed by
/// `api_key[d + 2]` for each digit `d` of `r`.
///
/// # Errors
///
/// Returns `Error::Config` if the key has fewer than 12 characters or the
/// timestamp is negative.
///
/// # Examples
///
/// ```
/// use zia_provider::client::auth::obfuscate_api_key;
///
/// let key = obfuscate_api_key("abcdefghijkl", 1_700_000_123_456).unwrap();
/// assert_eq!(key, "bcdefgcidjek");
/// ```
pub fn obfuscate_api_key(api_key: &str, timestamp_ms: i64) -> Result<String> {
    let key: Vec<char> = api_key.chars().collect();
    if key.len() < MIN_API_KEY_LEN {
        return Err(Error::Config(format!(
            "api_key must be at least {MIN_API_KEY_LEN} characters"
        )));
    }
    if timestamp_ms < 0 {
        return Err(Error::Config("timestamp must not be negative".into()));
    }

    let n_value = timestamp_ms % 1_000_000;
    let n = format!("{n_value:06}");
    let r = format!("{:06}", n_value >> 1);

    let mut out = String::with_capacity(12);
    for digit in n.chars().filter_map(|c| c.to_digit(10)) {
        out.push(key[digit as usize]);
    }
    for digit in r.chars().filter_map(|c| c.to_digit(10)) {
        out.push(key[digit as usize + 2]);
    }
    Ok(out)
}

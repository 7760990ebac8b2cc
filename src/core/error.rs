use thiserror::Error;

use super::rule_constraints::parse_rank_order_conflict;

/// Core error types for the ZIA provider
#[derive(Debug, Error)]
pub enum Error {
    /// The ZIA API answered with a non-success status
    #[error("ZIA API error ({status}): {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// A lookup by id or name found nothing
    #[error("object not found: {0}")]
    NotFound(String),

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Input validation failed
    #[error("Validation error in {field}: {message}")]
    Validation { field: String, message: String },

    /// Provider configuration is incomplete or inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// The API refused a rank at the requested order
    #[error("{message}; current rules: {layout}")]
    RankOrderConflict { message: String, layout: String },

    /// A bounded wait ran out
    #[error("Timed out after {secs}s while {operation}")]
    Timeout { operation: String, secs: u64 },

    /// Predefined and default rules are owned by ZIA
    #[error("Rule {0} is predefined and cannot be modified or deleted")]
    PredefinedRule(i64),

    /// Local state store failure
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Internal logic error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// State-store-specific errors
#[derive(Debug, Error)]
pub enum StateError {
    #[error("State file corrupted: invalid structure")]
    Corrupted,

    #[error("State checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("State format version mismatch: found v{found}, expected v{expected}")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("Resource address already tracked: {0}")]
    DuplicateAddress(String),
}

impl Error {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns `true` when the error means the remote object no longer exists.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Api {
                status,
                code,
                message,
            } => {
                *status == 404
                    || code == "RESOURCE_NOT_FOUND"
                    || message.to_lowercase().contains("object not found")
            }
            _ => false,
        }
    }

    /// Returns `true` for the transient `INVALID_INPUT_ARGUMENT` rejection that
    /// ZIA raises while another rule change is still settling.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::Api { code, message, .. }
            if code == "INVALID_INPUT_ARGUMENT" || message.contains("INVALID_INPUT_ARGUMENT"))
    }

    /// Returns `true` when another admin session holds the configuration lock.
    pub fn is_edit_lock(&self) -> bool {
        matches!(self, Self::Api { status: 409, code, .. } if code == "EDIT_LOCK_NOT_AVAILABLE")
    }

    /// Returns the `(rank, order)` pair of a "Rule with rank N is not allowed
    /// at order M" rejection.
    pub fn rank_order_conflict(&self) -> Option<(i32, i32)> {
        match self {
            Self::Api { message, .. } => parse_rank_order_conflict(message),
            _ => None,
        }
    }

    /// Returns `true` when the session cookie is no longer accepted.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Api { status: 401, .. })
    }

    /// Raw text used for pattern matching in [`ApiErrorPattern`].
    fn raw_message(&self) -> String {
        match self {
            Self::Api { code, message, .. } => format!("{code}: {message}"),
            other => other.to_string(),
        }
    }

    /// Translates this error into user-facing text with suggestions.
    pub fn translate(&self) -> ErrorTranslation {
        ApiErrorPattern::match_error(&self.raw_message())
    }
}

/// Represents a translated error with helpful context
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    pub user_message: String,
    pub suggestions: Vec<String>,
    pub help_url: Option<String>,
}

impl ErrorTranslation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
            help_url: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_help(mut self, url: impl Into<String>) -> Self {
        self.help_url = Some(url.into());
        self
    }

    /// Renders the translation as a single diagnostic detail string.
    pub fn detail(&self) -> String {
        let mut out = self.user_message.clone();
        for suggestion in &self.suggestions {
            out.push_str("\n  - ");
            out.push_str(suggestion);
        }
        if let Some(url) = &self.help_url {
            out.push_str("\nSee: ");
            out.push_str(url);
        }
        out
    }
}

const ZIA_API_DOCS: &str = "https://help.zscaler.com/zia/api";

/// Database of ZIA API error patterns and their translations
pub struct ApiErrorPattern;

impl ApiErrorPattern {
    /// Matches an error message against known patterns and returns a user-friendly translation.
    pub fn match_error(msg: &str) -> ErrorTranslation {
        let lower = msg.to_lowercase();

        // Rank/order layout conflicts are not retried
        if lower.contains("is not allowed at order") {
            return ErrorTranslation::new("Rule rank is not allowed at the requested order")
                .with_suggestion("Rules with a lower (more privileged) rank must come first")
                .with_suggestion("Move the rule after all rules with a lower rank, or raise its rank")
                .with_help(ZIA_API_DOCS);
        }

        if lower.contains("invalid_input_argument") {
            return ErrorTranslation::new("ZIA rejected the request arguments")
                .with_suggestion("Check that the order does not exceed the number of rules")
                .with_suggestion("Check that every referenced id exists")
                .with_suggestion("Concurrent rule changes may still be settling; the call is retried")
                .with_help(ZIA_API_DOCS);
        }

        if lower.contains("edit_lock_not_available") {
            return ErrorTranslation::new("Another admin session holds the configuration lock")
                .with_suggestion("Wait for other sessions or pending activations to finish")
                .with_suggestion("Reduce Terraform parallelism");
        }

        if lower.contains("authentication") || lower.contains("unauthorized") || lower.contains("401")
        {
            return ErrorTranslation::new("Authentication with ZIA failed")
                .with_suggestion("Verify ZIA_USERNAME, ZIA_PASSWORD and ZIA_API_KEY")
                .with_suggestion("Verify ZIA_CLOUD matches the tenant's cloud")
                .with_help(ZIA_API_DOCS);
        }

        if lower.contains("rate limit") || lower.contains("429") || lower.contains("too many requests")
        {
            return ErrorTranslation::new("ZIA API rate limit exceeded")
                .with_suggestion("Reduce Terraform parallelism")
                .with_suggestion("Retry after the window indicated by Retry-After");
        }

        if lower.contains("duplicate_item") || lower.contains("already exists") {
            return ErrorTranslation::new("An object with the same name already exists")
                .with_suggestion("Import the existing object instead of creating it")
                .with_suggestion("Or choose a different name");
        }

        if lower.contains("not found") || lower.contains("resource_not_found") {
            return ErrorTranslation::new("The referenced ZIA object does not exist")
                .with_suggestion("It may have been deleted outside Terraform")
                .with_suggestion("Refresh state to drop it");
        }

        if lower.contains("predefined") {
            return ErrorTranslation::new("Predefined rules are managed by Zscaler")
                .with_suggestion("Only order and state of predefined rules can be changed in the UI");
        }

        if lower.contains("timed out") || lower.contains("timeout") {
            return ErrorTranslation::new("Operation timed out")
                .with_suggestion("The ZIA API did not settle within the configured timeout")
                .with_suggestion("Increase create_timeout_secs or retry later");
        }

        // Generic fallback
        ErrorTranslation::new(format!("ZIA error: {msg}"))
            .with_suggestion("Check the detailed error message for more information")
            .with_help(ZIA_API_DOCS)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

//! Error types for parsing, fetching, configuration and provisioning.

use std::time::Duration;
use thiserror::Error;

/// A token that is not a valid CIDR expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CidrError {
    #[error("invalid IP address in '{token}'")]
    InvalidAddress { token: String },

    #[error("invalid prefix length in '{token}'")]
    InvalidPrefixLength { token: String },
}

/// Failure of a single fetch. The refresher treats every variant except
/// `Cancelled` as "refresh skipped this cycle".
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(reqwest::StatusCode),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("fetch cancelled")]
    Cancelled,

    #[error("invalid prefix: {0}")]
    Parse(#[from] CidrError),

    #[error("response body is not valid UTF-8")]
    InvalidUtf8,

    #[error("token of {len} bytes exceeds the maximum token length")]
    TokenTooLong { len: usize },
}

impl FetchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

/// Invalid configuration. Always fatal to startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("line {line}: unexpected argument '{arg}' after '{directive}'")]
    UnexpectedArgument {
        directive: String,
        arg: String,
        line: usize,
    },

    #[error("line {line}: option '{option}' requires an argument")]
    MissingArgument { option: String, line: usize },

    #[error("line {line}: option '{option}' takes one argument, got extra '{arg}'")]
    ExtraArgument {
        option: String,
        arg: String,
        line: usize,
    },

    #[error("line {line}: unrecognized option '{option}'")]
    UnknownOption { option: String, line: usize },

    #[error("unexpected token '{token}' at line {line}")]
    UnexpectedToken { token: String, line: usize },

    #[error("invalid duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of the provisioning lifecycle hook.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("provisioning requires a running Tokio runtime")]
    NoRuntime,

    #[error("module is already provisioned")]
    AlreadyProvisioned,

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

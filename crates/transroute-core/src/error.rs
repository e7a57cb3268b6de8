//! Error types for transroute-core
//!
//! Centralized error handling using `thiserror` for ergonomic error definitions.

use std::net::SocketAddr;
use thiserror::Error;

/// Main error type for transroute-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// A rule document could not be decoded
    #[error("Rule document #{index} is malformed: {source}")]
    RuleDocument {
        /// Zero-based index of the non-blank document in the stream
        index: usize,
        /// Decoder error
        #[source]
        source: serde_yaml::Error,
    },

    /// A domain or CIDR pattern could not be compiled
    #[error("Unable to compile pattern '{pattern}': {message}")]
    Pattern {
        /// Raw pattern as written in the rule file
        pattern: String,
        /// Compiler error message
        message: String,
    },

    /// No conntrack row carries the original destination
    #[error("Original destination not found: {0}")]
    NotFound(String),

    /// Relaying a query to the upstream failed
    #[error("Relay to {upstream} failed: {message}")]
    Relay {
        /// Upstream the query was sent to
        upstream: SocketAddr,
        /// Failure description
        message: String,
    },

    /// DNS message could not be decoded or encoded
    #[error("DNS codec error: {0}")]
    Codec(#[from] hickory_proto::error::ProtoError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound {
        /// Path to the missing config file
        path: String,
    },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    ConfigValue {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a pattern compilation error
    pub fn pattern(pattern: impl Into<String>, message: impl ToString) -> Self {
        Self::Pattern {
            pattern: pattern.into(),
            message: message.to_string(),
        }
    }

    /// Create a relay error
    pub fn relay(upstream: SocketAddr, message: impl ToString) -> Self {
        Self::Relay {
            upstream,
            message: message.to_string(),
        }
    }

    /// Create a config value error
    pub fn config_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValue {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Whether this error means the original destination is unknown
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

//! Error types for cirrid.

use thiserror::Error;

/// Errors that can occur while building the name table or serving DNS.
#[derive(Debug, Error)]
pub enum DnsError {
    /// IO error (network, file, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded or deserialized.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// DNS protocol error
    #[error("DNS protocol error: {0}")]
    Proto(#[from] hickory_proto::ProtoError),

    /// A literal address specifier is not a well-formed IPv4 address.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// An interface or auto-detected address could not be determined.
    #[error("Address unavailable for {spec}: {reason}")]
    ResolutionUnavailable {
        /// The specifier that was being resolved.
        spec: String,
        /// Why resolution failed.
        reason: String,
    },

    /// A host name or zone could not be turned into a domain key.
    #[error("Invalid domain name: {0:?}")]
    InvalidName(String),

    /// No configuration or identity source produced anything usable.
    #[error("No configuration could be read: {0}")]
    ConfigurationUnreadable(String),

    /// Population finished with zero entries.
    #[error("Name table is empty")]
    EmptyTable,

    /// An external command failed or timed out.
    #[error("Command `{command}` failed: {reason}")]
    Command {
        /// The program and arguments that were run.
        command: String,
        /// Exit status, stderr or timeout description.
        reason: String,
    },
}

impl DnsError {
    /// Shorthand for [`DnsError::ResolutionUnavailable`].
    pub fn unavailable(spec: impl Into<String>, reason: impl ToString) -> Self {
        Self::ResolutionUnavailable {
            spec: spec.into(),
            reason: reason.to_string(),
        }
    }
}

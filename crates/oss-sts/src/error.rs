//! Credential error types.

use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CredentialError>;

/// Broad category of a [`CredentialError`], independent of where it was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The metadata service could not be reached in time.
    Network,
    /// The metadata service answered with a non-success status or code.
    Auth,
    /// The response did not match the expected schema.
    Parse,
    /// The provider was configured incorrectly.
    Config,
}

/// Errors that can occur while obtaining or refreshing credentials.
///
/// Messages never carry secret material: only codes, field names and
/// timestamps end up in them.
#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    /// Connection or transport failure.
    #[error("Network error: {0}")]
    Network(String),

    /// The metadata request did not complete in time.
    #[error("Metadata request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The metadata service rejected the request.
    #[error("Metadata service returned non-success code: {code}")]
    Auth { code: String },

    /// The response body did not match the expected schema.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The provider could not be constructed.
    #[error("Failed to initialize credential provider: {0}")]
    Construction(#[source] Box<CredentialError>),

    /// A refresh failed; the previous credential is still in use.
    #[error("Credential refresh failed: {0}")]
    Refresh(#[source] Box<CredentialError>),
}

impl CredentialError {
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn auth(code: impl Into<String>) -> Self {
        Self::Auth { code: code.into() }
    }

    /// Wrap an error raised while building a provider.
    pub fn construction(inner: CredentialError) -> Self {
        Self::Construction(Box::new(inner))
    }

    /// Wrap an error raised by a refresh.
    pub fn refresh(inner: CredentialError) -> Self {
        Self::Refresh(Box::new(inner))
    }

    /// The innermost error, seen through `Construction` and `Refresh`.
    pub fn root(&self) -> &CredentialError {
        match self {
            Self::Construction(inner) | Self::Refresh(inner) => inner.root(),
            other => other,
        }
    }

    /// Category of the underlying failure.
    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            Self::Network(_) | Self::Timeout(_) => ErrorKind::Network,
            Self::Auth { .. } => ErrorKind::Auth,
            Self::ParseError(_) => ErrorKind::Parse,
            Self::Config(_) => ErrorKind::Config,
            // root() never returns a wrapper
            Self::Construction(_) | Self::Refresh(_) => ErrorKind::Config,
        }
    }

    /// Check if this error is transient and may be retried.
    #[inline]
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Network
    }
}

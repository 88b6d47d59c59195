//! Temporary OSS credentials.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::{CredentialError, Result};

/// Timestamp pattern used by the metadata service, always UTC.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// A set of temporary credentials issued for an assumed role.
///
/// Immutable once built. The secret and the session token are redacted from
/// `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    access_key_id: String,
    access_key_secret: String,
    security_token: String,
    expiration: DateTime<Utc>,
    last_updated: DateTime<Utc>,
}

impl Credential {
    /// Build a credential.
    ///
    /// Fails when `expiration` is not strictly after `last_updated`.
    pub fn new(
        access_key_id: impl Into<String>,
        access_key_secret: impl Into<String>,
        security_token: impl Into<String>,
        expiration: DateTime<Utc>,
        last_updated: DateTime<Utc>,
    ) -> Result<Self> {
        if expiration <= last_updated {
            return Err(CredentialError::parse(format!(
                "Expiration {} is not after LastUpdated {}",
                expiration.format(TIMESTAMP_FORMAT),
                last_updated.format(TIMESTAMP_FORMAT)
            )));
        }

        Ok(Self {
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
            security_token: security_token.into(),
            expiration,
            last_updated,
        })
    }

    #[inline]
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    #[inline]
    pub fn access_key_secret(&self) -> &str {
        &self.access_key_secret
    }

    #[inline]
    pub fn security_token(&self) -> &str {
        &self.security_token
    }

    #[inline]
    pub fn expiration(&self) -> DateTime<Utc> {
        self.expiration
    }

    #[inline]
    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"[REDACTED]")
            .field("security_token", &"[REDACTED]")
            .field("expiration", &self.expiration)
            .field("last_updated", &self.last_updated)
            .finish()
    }
}

/// Parse a metadata-service timestamp such as `2018-04-23T09:45:05Z`.
///
/// The value is interpreted as UTC whatever the local zone is.
pub fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>> {
    chrono::NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| {
            CredentialError::parse(format!("{field} '{value}' does not match {TIMESTAMP_FORMAT}: {e}"))
        })
}

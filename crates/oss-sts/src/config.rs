//! Provider configuration.
//!
//! Values arrive already resolved; this module only supplies defaults,
//! an environment lookup and validation.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CredentialError, Result};

/// Default ECS metadata endpoint for RAM role credentials.
pub const DEFAULT_METADATA_ENDPOINT: &str =
    "http://100.100.100.200/latest/meta-data/ram/security-credentials/";

/// Default metadata request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

pub const ENV_METADATA_ENDPOINT: &str = "OSS_STS_METADATA_ENDPOINT";
pub const ENV_ROLE_NAME: &str = "OSS_STS_ROLE_NAME";
pub const ENV_TIMEOUT_MS: &str = "OSS_STS_TIMEOUT_MS";
pub const ENV_REFRESH_AHEAD_SECS: &str = "OSS_STS_REFRESH_AHEAD_SECS";

/// Configuration of an STS-backed client provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StsConfig {
    /// Base URL of the metadata service; the role name is appended verbatim.
    pub metadata_endpoint: String,
    /// RAM role to assume.
    pub role_name: String,
    /// Metadata request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Refresh when the token expires within this many seconds.
    pub refresh_ahead_secs: u64,
    /// Settings for the optional background refresher.
    pub background: BackgroundRefreshConfig,
}

impl Default for StsConfig {
    fn default() -> Self {
        Self {
            metadata_endpoint: DEFAULT_METADATA_ENDPOINT.to_string(),
            role_name: String::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            refresh_ahead_secs: 0,
            background: BackgroundRefreshConfig::default(),
        }
    }
}

/// Background refresher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundRefreshConfig {
    /// How often the refresher looks at the cached credential.
    pub check_interval_secs: u64,
    /// Refresh when the token expires within this many seconds.
    pub refresh_ahead_secs: u64,
    /// Delay before the first retry after a failed refresh.
    pub initial_backoff_ms: u64,
    /// Upper bound for the retry delay.
    pub max_backoff_secs: u64,
}

impl Default for BackgroundRefreshConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 60,
            refresh_ahead_secs: 300,
            initial_backoff_ms: 1000,
            max_backoff_secs: 300,
        }
    }
}

impl BackgroundRefreshConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn refresh_ahead(&self) -> Duration {
        Duration::from_secs(self.refresh_ahead_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

impl StsConfig {
    /// Create a configuration for `role_name` with default settings.
    pub fn new(role_name: impl Into<String>) -> Self {
        Self {
            role_name: role_name.into(),
            ..Self::default()
        }
    }

    pub fn with_metadata_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.metadata_endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_refresh_ahead(mut self, ahead: Duration) -> Self {
        self.refresh_ahead_secs = ahead.as_secs();
        self
    }

    /// Load from process environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(endpoint) = lookup(ENV_METADATA_ENDPOINT) {
            config.metadata_endpoint = endpoint;
        }
        if let Some(role) = lookup(ENV_ROLE_NAME) {
            config.role_name = role;
        }
        if let Some(value) = lookup(ENV_TIMEOUT_MS) {
            config.timeout_ms = parse_number(ENV_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_REFRESH_AHEAD_SECS) {
            config.refresh_ahead_secs = parse_number(ENV_REFRESH_AHEAD_SECS, &value)?;
        }

        Ok(config)
    }

    /// Check that the configuration can be used to fetch credentials.
    pub fn validate(&self) -> Result<()> {
        let endpoint = Url::parse(&self.metadata_endpoint).map_err(|e| {
            CredentialError::config(format!(
                "invalid metadata endpoint '{}': {e}",
                self.metadata_endpoint
            ))
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(CredentialError::config(format!(
                "metadata endpoint must be http or https, got '{}'",
                endpoint.scheme()
            )));
        }

        let role = self.role_name.trim();
        if role.is_empty() {
            return Err(CredentialError::config("role name is required"));
        }
        if role.contains('/') {
            return Err(CredentialError::config(format!(
                "role name '{role}' must not contain '/'"
            )));
        }

        if self.timeout_ms == 0 {
            return Err(CredentialError::config("timeout must be greater than zero"));
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn refresh_ahead(&self) -> Duration {
        Duration::from_secs(self.refresh_ahead_secs)
    }

    /// Full URL of the role's credential document.
    pub fn role_url(&self) -> String {
        format!("{}{}", self.metadata_endpoint, self.role_name.trim())
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|e| CredentialError::config(format!("{key}='{value}' is not a number: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let config = StsConfig::new("snapshot-role-test");
        assert_eq!(config.metadata_endpoint, DEFAULT_METADATA_ENDPOINT);
        assert_eq!(config.timeout(), Duration::from_millis(10_000));
        assert_eq!(config.refresh_ahead(), Duration::ZERO);
        assert_eq!(
            config.role_url(),
            "http://100.100.100.200/latest/meta-data/ram/security-credentials/snapshot-role-test"
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn from_lookup_overrides_defaults() {
        let vars: HashMap<&str, &str> = [
            (ENV_METADATA_ENDPOINT, "http://127.0.0.1:8080/creds/"),
            (ENV_ROLE_NAME, "reader"),
            (ENV_TIMEOUT_MS, "2500"),
            (ENV_REFRESH_AHEAD_SECS, " 300 "),
        ]
        .into_iter()
        .collect();

        let config = StsConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.role_url(), "http://127.0.0.1:8080/creds/reader");
        assert_eq!(config.timeout(), Duration::from_millis(2500));
        assert_eq!(config.refresh_ahead(), Duration::from_secs(300));
    }

    #[test]
    fn from_lookup_rejects_bad_numbers() {
        let err = StsConfig::from_lookup(|key| {
            (key == ENV_TIMEOUT_MS).then(|| "ten seconds".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, CredentialError::Config(_)));
        assert!(err.to_string().contains(ENV_TIMEOUT_MS));
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(StsConfig::default().validate().is_err());
        assert!(StsConfig::new("a/b").validate().is_err());
        assert!(
            StsConfig::new("role")
                .with_metadata_endpoint("ftp://100.100.100.200/")
                .validate()
                .is_err()
        );
        assert!(
            StsConfig::new("role")
                .with_metadata_endpoint("not a url")
                .validate()
                .is_err()
        );
        assert!(
            StsConfig::new("role")
                .with_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn deserializes_partial_json() {
        let config: StsConfig = serde_json::from_str(
            r#"{"role_name":"reader","timeout_ms":500,"background":{"check_interval_secs":5}}"#,
        )
        .unwrap();
        assert_eq!(config.role_name, "reader");
        assert_eq!(config.timeout_ms, 500);
        assert_eq!(config.metadata_endpoint, DEFAULT_METADATA_ENDPOINT);
        assert_eq!(config.background.check_interval(), Duration::from_secs(5));
        assert_eq!(config.background.initial_backoff(), Duration::from_millis(1000));
    }
}

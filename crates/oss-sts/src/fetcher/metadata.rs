//! Instance metadata service client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use super::CredentialFetcher;
use super::response::parse_metadata_response;
use crate::config::StsConfig;
use crate::credential::{Credential, TIMESTAMP_FORMAT};
use crate::error::{CredentialError, Result};

/// Fetches role credentials with `GET <endpoint><role>`.
#[derive(Debug, Clone)]
pub struct MetadataFetcher {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl MetadataFetcher {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CredentialError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, endpoint, timeout))
    }

    /// Reuse an existing HTTP client. `timeout` is applied per request.
    pub fn with_client(client: Client, endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            timeout,
        }
    }

    pub fn from_config(config: &StsConfig) -> Result<Self> {
        Self::new(config.metadata_endpoint.clone(), config.timeout())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn map_transport_error(&self, err: reqwest::Error) -> CredentialError {
        if err.is_timeout() {
            CredentialError::Timeout(self.timeout)
        } else {
            CredentialError::network(err.to_string())
        }
    }
}

#[async_trait]
impl CredentialFetcher for MetadataFetcher {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn fetch(&self, role_name: &str) -> Result<Credential> {
        let url = format!("{}{}", self.endpoint, role_name);

        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            debug!(%status, "Metadata service returned an error status");
            return Err(CredentialError::auth(format!("HTTP {}", status.as_u16())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let credential = parse_metadata_response(&body)?;
        debug!(
            access_key_id = %credential.access_key_id(),
            expiration = %credential.expiration().format(TIMESTAMP_FORMAT),
            "Fetched role credentials"
        );
        Ok(credential)
    }
}

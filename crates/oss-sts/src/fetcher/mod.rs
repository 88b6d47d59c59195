//! Credential fetching.
//!
//! - [`CredentialFetcher`]: one round trip that yields a fresh [`Credential`]
//! - [`MetadataFetcher`]: the instance metadata service implementation
//! - [`parse_metadata_response`]: the response schema, usable on its own

mod metadata;
mod response;

use async_trait::async_trait;

use crate::credential::Credential;
use crate::error::Result;

pub use metadata::MetadataFetcher;
pub use response::{SUCCESS_CODE, normalize_json, parse_metadata_response};

/// Obtains credentials for a role.
///
/// Implementations perform exactly one attempt per call; retry policy belongs
/// to the caller.
#[async_trait]
pub trait CredentialFetcher: Send + Sync {
    async fn fetch(&self, role_name: &str) -> Result<Credential>;
}

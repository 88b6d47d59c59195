//! Short-lived OSS credentials from the instance metadata service.
//!
//! A [`ClientProvider`] assumes a RAM role through the local metadata service,
//! caches the resulting [`Credential`] together with the storage client built
//! from it, and refreshes both as one unit.
//!
//! # Architecture
//!
//! - [`Clock`]: injectable time source
//! - [`CredentialFetcher`]: one metadata round trip ([`MetadataFetcher`])
//! - [`will_expire_within`]: pure expiry predicate
//! - [`ClientProvider`]: snapshot cache and serialized refresh
//! - [`ClientProvider::ensure_fresh`] / [`BackgroundRefresher`]: when refreshes happen
//!
//! ```no_run
//! use oss_sts::{ClientProvider, Credential, StsConfig};
//!
//! struct OssClient {
//!     access_key_id: String,
//! }
//!
//! # async fn example() -> oss_sts::Result<()> {
//! let config = StsConfig::new("snapshot-role");
//! let provider: ClientProvider<OssClient> = ClientProvider::from_config(&config, |c: &Credential| OssClient {
//!     access_key_id: c.access_key_id().to_string(),
//! })
//! .await?;
//!
//! let lease = provider.ensure_fresh().await;
//! println!("using {}", lease.access_key_id);
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod credential;
pub mod error;
pub mod expiration;
pub mod fetcher;
pub mod provider;
pub mod refresh;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BackgroundRefreshConfig, StsConfig};
pub use credential::Credential;
pub use error::{CredentialError, ErrorKind, Result};
pub use expiration::will_expire_within;
pub use fetcher::{CredentialFetcher, MetadataFetcher, parse_metadata_response};
pub use provider::{ClientFactory, ClientProvider, ClientProviderBuilder, ClientSnapshot};
pub use refresh::{BackgroundRefresher, ClientLease, RefreshSchedule};

const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    let _ = assert_send_sync::<ClientProvider<()>>;
    let _ = assert_send_sync::<CredentialError>;
    let _ = assert_send_sync::<Credential>;
};

//! STS client provider.
//!
//! Owns the current [`Credential`] and the storage client built from it. The
//! two are kept together in one immutable [`ClientSnapshot`] which is swapped
//! as a whole, so a reader can never see a client built from a credential
//! other than the one next to it.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::StsConfig;
use crate::credential::{Credential, TIMESTAMP_FORMAT};
use crate::error::{CredentialError, Result};
use crate::expiration::{remaining, will_expire_within};
use crate::fetcher::{CredentialFetcher, MetadataFetcher};

/// Builds a storage client from a credential.
///
/// Implemented for any `Fn(&Credential) -> C`.
pub trait ClientFactory<C>: Send + Sync {
    fn build(&self, credential: &Credential) -> C;
}

impl<C, F> ClientFactory<C> for F
where
    F: Fn(&Credential) -> C + Send + Sync,
{
    fn build(&self, credential: &Credential) -> C {
        self(credential)
    }
}

/// A credential together with the client built from it.
pub struct ClientSnapshot<C> {
    credential: Credential,
    client: Arc<C>,
    generation: u64,
}

impl<C> ClientSnapshot<C> {
    #[inline]
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    #[inline]
    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Number of successful refreshes before this snapshot was installed.
    /// The snapshot created at construction is generation 0.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl<C> fmt::Debug for ClientSnapshot<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSnapshot")
            .field("credential", &self.credential)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Outcome of the most recent fetch attempt made under the refresh gate.
#[derive(Default)]
struct RefreshLedger {
    completed: u64,
    last_failure: Option<CredentialError>,
}

/// Provides a storage client backed by short-lived role credentials.
///
/// Readers ([`get_client`](Self::get_client), [`snapshot`](Self::snapshot))
/// only clone an `Arc` under a read lock. [`refresh`](Self::refresh) is
/// serialized: a caller that arrives while another refresh is in flight waits
/// for it and adopts its outcome instead of fetching again.
pub struct ClientProvider<C> {
    role_name: String,
    refresh_ahead: Duration,
    fetcher: Arc<dyn CredentialFetcher>,
    factory: Arc<dyn ClientFactory<C>>,
    clock: Arc<dyn Clock>,
    current: RwLock<Arc<ClientSnapshot<C>>>,
    /// Held across the fetch. Private to this provider.
    refresh_gate: Mutex<RefreshLedger>,
    /// Mirror of `RefreshLedger::completed`, readable without the gate.
    completed_refreshes: AtomicU64,
}

impl<C> ClientProvider<C> {
    pub fn builder() -> ClientProviderBuilder<C> {
        ClientProviderBuilder::new()
    }

    /// Build a provider that talks to the metadata service described by
    /// `config`, using the system clock.
    pub async fn from_config<F>(config: &StsConfig, factory: F) -> Result<Self>
    where
        F: ClientFactory<C> + 'static,
    {
        Self::builder().config(config).build(factory).await
    }

    /// The currently cached client. Does not check expiry.
    pub fn get_client(&self) -> Arc<C> {
        Arc::clone(&self.current.read().client)
    }

    /// The currently cached credential and client, as one consistent value.
    pub fn snapshot(&self) -> Arc<ClientSnapshot<C>> {
        Arc::clone(&self.current.read())
    }

    /// Whether the cached credential expires within `within` of now.
    pub fn token_will_expire_after(&self, within: Duration) -> bool {
        let snapshot = self.snapshot();
        will_expire_within(&snapshot.credential, within, self.clock.now())
    }

    /// Time left before the cached credential expires.
    pub fn time_to_expiry(&self) -> Duration {
        let snapshot = self.snapshot();
        remaining(&snapshot.credential, self.clock.now())
    }

    /// Fetch a new credential and install it together with a new client.
    ///
    /// On failure the previous credential and client stay in place and the
    /// error is returned wrapped in [`CredentialError::Refresh`].
    #[instrument(skip(self), fields(role = %self.role_name))]
    pub async fn refresh(&self) -> Result<()> {
        let observed = self.completed_refreshes.load(Ordering::Acquire);
        let mut ledger = self.refresh_gate.lock().await;

        // Another caller finished a fetch while we were waiting for the gate.
        if ledger.completed != observed {
            debug!("Adopting outcome of concurrent refresh");
            return match &ledger.last_failure {
                None => Ok(()),
                Some(err) => Err(CredentialError::refresh(err.clone())),
            };
        }

        let outcome = self.fetcher.fetch(&self.role_name).await;
        ledger.completed += 1;
        self.completed_refreshes
            .store(ledger.completed, Ordering::Release);

        match outcome {
            Ok(credential) => {
                ledger.last_failure = None;
                let expiration = credential.expiration();
                let generation = self.install(credential);
                info!(
                    generation,
                    expiration = %expiration.format(TIMESTAMP_FORMAT),
                    "Credential refreshed"
                );
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Credential refresh failed, keeping previous credential");
                ledger.last_failure = Some(err.clone());
                Err(CredentialError::refresh(err))
            }
        }
    }

    /// [`refresh`](Self::refresh) bounded by `deadline`, including the time
    /// spent waiting for an in-flight refresh.
    pub async fn refresh_with_deadline(&self, deadline: Duration) -> Result<()> {
        match tokio::time::timeout(deadline, self.refresh()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(role = %self.role_name, ?deadline, "Credential refresh exceeded deadline");
                Err(CredentialError::refresh(CredentialError::Timeout(deadline)))
            }
        }
    }

    /// Whether a refresh is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        self.refresh_gate.try_lock().is_err()
    }

    pub fn role_name(&self) -> &str {
        &self.role_name
    }

    /// Threshold used by [`ensure_fresh`](Self::ensure_fresh).
    pub fn refresh_ahead(&self) -> Duration {
        self.refresh_ahead
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn install(&self, credential: Credential) -> u64 {
        // Build outside the write lock; readers only wait for the swap.
        let client = Arc::new(self.factory.build(&credential));
        let mut current = self.current.write();
        let generation = current.generation + 1;
        *current = Arc::new(ClientSnapshot {
            credential,
            client,
            generation,
        });
        generation
    }
}

impl<C> fmt::Debug for ClientProvider<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientProvider")
            .field("role_name", &self.role_name)
            .field("refresh_ahead", &self.refresh_ahead)
            .field("snapshot", &*self.snapshot())
            .finish_non_exhaustive()
    }
}

impl<C> Drop for ClientProvider<C> {
    fn drop(&mut self) {
        debug!(role = %self.role_name, "Releasing credential provider");
    }
}

/// Assembles a [`ClientProvider`].
///
/// Either a configuration or an explicit fetcher must be supplied; the clock
/// defaults to [`SystemClock`].
pub struct ClientProviderBuilder<C> {
    config: Option<StsConfig>,
    role_name: Option<String>,
    refresh_ahead: Option<Duration>,
    fetcher: Option<Arc<dyn CredentialFetcher>>,
    clock: Option<Arc<dyn Clock>>,
    _client: PhantomData<fn() -> C>,
}

impl<C> Default for ClientProviderBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> ClientProviderBuilder<C> {
    pub fn new() -> Self {
        Self {
            config: None,
            role_name: None,
            refresh_ahead: None,
            fetcher: None,
            clock: None,
            _client: PhantomData,
        }
    }

    /// Take role name, refresh threshold and metadata settings from `config`.
    pub fn config(mut self, config: &StsConfig) -> Self {
        self.config = Some(config.clone());
        self
    }

    /// Overrides the role name from the configuration.
    pub fn role_name(mut self, role_name: impl Into<String>) -> Self {
        self.role_name = Some(role_name.into());
        self
    }

    /// Overrides the refresh threshold from the configuration.
    pub fn refresh_ahead(mut self, ahead: Duration) -> Self {
        self.refresh_ahead = Some(ahead);
        self
    }

    /// Use `fetcher` instead of a [`MetadataFetcher`] built from the configuration.
    pub fn fetcher(mut self, fetcher: Arc<dyn CredentialFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Perform the initial fetch and build the first client.
    ///
    /// Any failure is returned as [`CredentialError::Construction`]; no
    /// provider exists without a credential.
    pub async fn build<F>(self, factory: F) -> Result<ClientProvider<C>>
    where
        F: ClientFactory<C> + 'static,
    {
        self.build_inner(Arc::new(factory)).await.map_err(|err| {
            error!(error = %err, "Failed to initialize credential provider");
            CredentialError::construction(err)
        })
    }

    async fn build_inner(self, factory: Arc<dyn ClientFactory<C>>) -> Result<ClientProvider<C>> {
        let mut config = self.config;
        if let (Some(config), Some(role)) = (config.as_mut(), self.role_name.as_ref()) {
            config.role_name = role.clone();
        }
        if let Some(config) = &config {
            config.validate()?;
        }

        let role_name = self
            .role_name
            .or_else(|| config.as_ref().map(|c| c.role_name.clone()))
            .map(|role| role.trim().to_string())
            .filter(|role| !role.is_empty())
            .ok_or_else(|| CredentialError::config("role name is required"))?;

        let refresh_ahead = self
            .refresh_ahead
            .or_else(|| config.as_ref().map(StsConfig::refresh_ahead))
            .unwrap_or(Duration::ZERO);

        let fetcher: Arc<dyn CredentialFetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => {
                let config = config.as_ref().ok_or_else(|| {
                    CredentialError::config("either a configuration or a fetcher is required")
                })?;
                Arc::new(MetadataFetcher::from_config(config)?)
            }
        };

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let credential = fetcher.fetch(&role_name).await?;
        info!(
            role = %role_name,
            expiration = %credential.expiration().format(TIMESTAMP_FORMAT),
            "Credential provider initialized"
        );

        let client = Arc::new(factory.build(&credential));
        Ok(ClientProvider {
            role_name,
            refresh_ahead,
            fetcher,
            factory,
            clock,
            current: RwLock::new(Arc::new(ClientSnapshot {
                credential,
                client,
                generation: 0,
            })),
            refresh_gate: Mutex::new(RefreshLedger::default()),
            completed_refreshes: AtomicU64::new(0),
        })
    }
}

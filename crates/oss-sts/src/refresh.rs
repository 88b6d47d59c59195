//! When refreshes happen.
//!
//! - [`ClientProvider::ensure_fresh`]: lazy check-then-refresh before use
//! - [`BackgroundRefresher`]: optional proactive refresh on a timer

use std::ops::Deref;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::BackgroundRefreshConfig;
use crate::error::CredentialError;
use crate::provider::ClientProvider;

/// Lower bound for the background check interval.
const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Lower bound for the retry delay after a failed background refresh.
const MIN_BACKOFF: Duration = Duration::from_millis(100);

/// A client handed out for one storage operation.
///
/// If the credential was due and the refresh failed, the lease still carries
/// the cached client (the storage backend will reject it if the token really
/// is no longer valid) along with the refresh error.
#[derive(Debug)]
pub struct ClientLease<C> {
    client: Arc<C>,
    refresh_error: Option<CredentialError>,
}

impl<C> ClientLease<C> {
    #[inline]
    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub fn into_client(self) -> Arc<C> {
        self.client
    }

    /// The error of a refresh attempted for this lease, if it failed.
    pub fn refresh_error(&self) -> Option<&CredentialError> {
        self.refresh_error.as_ref()
    }

    /// True when the client may be using an expired token.
    #[inline]
    pub fn is_degraded(&self) -> bool {
        self.refresh_error.is_some()
    }
}

impl<C> Deref for ClientLease<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.client
    }
}

impl<C> ClientProvider<C> {
    /// Refresh if the token expires within [`refresh_ahead`](Self::refresh_ahead),
    /// then return the current client.
    ///
    /// A failed refresh is logged and reported in the lease; the cached client
    /// is returned regardless.
    pub async fn ensure_fresh(&self) -> ClientLease<C> {
        if !self.token_will_expire_after(self.refresh_ahead()) {
            return ClientLease {
                client: self.get_client(),
                refresh_error: None,
            };
        }

        let refresh_error = match self.refresh().await {
            Ok(()) => None,
            Err(err) => {
                warn!(
                    role = %self.role_name(),
                    error = %err,
                    "Proceeding with cached client after failed refresh"
                );
                Some(err)
            }
        };

        ClientLease {
            client: self.get_client(),
            refresh_error,
        }
    }
}

/// Timing of the background refresh loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSchedule {
    pub check_interval: Duration,
    pub refresh_ahead: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RefreshSchedule {
    /// Delay before the next check after `failures` consecutive failures.
    pub fn delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return self.check_interval.max(MIN_CHECK_INTERVAL);
        }

        let exponent = (failures - 1).min(16);
        let max_backoff = self.max_backoff.max(MIN_BACKOFF);
        self.initial_backoff
            .max(MIN_BACKOFF)
            .saturating_mul(1 << exponent)
            .min(max_backoff)
    }
}

impl From<&BackgroundRefreshConfig> for RefreshSchedule {
    fn from(config: &BackgroundRefreshConfig) -> Self {
        Self {
            check_interval: config.check_interval(),
            refresh_ahead: config.refresh_ahead(),
            initial_backoff: config.initial_backoff(),
            max_backoff: config.max_backoff(),
        }
    }
}

/// Proactively refreshes a provider's credential from a background task.
///
/// Holds only a weak reference to the provider and stops when the provider is
/// dropped, on [`shutdown`](Self::shutdown), or when this handle is dropped.
#[derive(Debug)]
pub struct BackgroundRefresher {
    cancellation_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundRefresher {
    /// Start refreshing `provider` on `schedule`. Must be called inside a
    /// tokio runtime.
    pub fn spawn<C>(provider: &Arc<ClientProvider<C>>, schedule: RefreshSchedule) -> Self
    where
        C: Send + Sync + 'static,
    {
        let cancellation_token = CancellationToken::new();
        let handle = tokio::spawn(run_refresh_loop(
            Arc::downgrade(provider),
            schedule,
            cancellation_token.clone(),
        ));

        Self {
            cancellation_token,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the task and wait for it to finish.
    pub async fn shutdown(mut self) {
        self.cancellation_token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background refresher task failed");
            }
        }
    }
}

impl Drop for BackgroundRefresher {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}

async fn run_refresh_loop<C>(
    provider: Weak<ClientProvider<C>>,
    schedule: RefreshSchedule,
    cancellation_token: CancellationToken,
) where
    C: Send + Sync + 'static,
{
    let mut failures: u32 = 0;

    loop {
        let delay = schedule.delay(failures);
        tokio::select! {
            _ = cancellation_token.cancelled() => {
                debug!("Background refresher shutting down");
                break;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        let Some(provider) = provider.upgrade() else {
            debug!("Credential provider dropped, stopping background refresher");
            break;
        };

        if !provider.token_will_expire_after(schedule.refresh_ahead) {
            failures = 0;
            continue;
        }

        match provider.refresh().await {
            Ok(()) => failures = 0,
            Err(err) => {
                failures = failures.saturating_add(1);
                warn!(
                    role = %provider.role_name(),
                    error = %err,
                    failures,
                    retry_in = ?schedule.delay(failures),
                    "Background credential refresh failed"
                );
            }
        }
    }
}

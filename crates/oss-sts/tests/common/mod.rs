//! Shared helpers for provider tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oss_sts::credential::TIMESTAMP_FORMAT;
use oss_sts::{
    ClientProvider, Credential, CredentialError, CredentialFetcher, ManualClock, Result,
    parse_metadata_response,
};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

pub const ROLE: &str = "snapshot-role-test";

pub const MOCK_ECS_META_RESPONSE: &str = "{
  'AccessKeyId' : 'STS.mockAK',
  'AccessKeySecret' : 'mockSK',
  'Expiration' : '2018-04-23T09:45:05Z',
  'SecurityToken' : 'mockSecurityToken',
  'LastUpdated' : '2018-04-23T03:45:05Z',
  'Code' : 'Success'
}";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Current time truncated to whole seconds, as the metadata service reports it.
pub fn now_secs() -> DateTime<Utc> {
    DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap_or_default()
}

/// A metadata document in the single-quoted style of the service.
pub fn metadata_body(
    access_key_id: &str,
    expiration: DateTime<Utc>,
    last_updated: DateTime<Utc>,
) -> String {
    format!(
        "{{\n  'AccessKeyId' : '{access_key_id}',\n  'AccessKeySecret' : 'mockSK',\n  \
         'Expiration' : '{}',\n  'SecurityToken' : 'mockSecurityToken',\n  \
         'LastUpdated' : '{}',\n  'Code' : 'Success'\n}}",
        expiration.format(TIMESTAMP_FORMAT),
        last_updated.format(TIMESTAMP_FORMAT),
    )
}

pub fn credential_valid_for(access_key_id: &str, now: DateTime<Utc>, valid_for: Duration) -> Credential {
    let valid_for = chrono::Duration::from_std(valid_for).unwrap();
    Credential::new(access_key_id, "mockSK", "mockSecurityToken", now + valid_for, now).unwrap()
}

/// Stand-in for the OSS SDK client.
#[derive(Debug)]
pub struct FakeOssClient {
    pub access_key_id: String,
    pub security_token: String,
}

pub fn build_client(credential: &Credential) -> FakeOssClient {
    FakeOssClient {
        access_key_id: credential.access_key_id().to_string(),
        security_token: credential.security_token().to_string(),
    }
}

/// Fetcher that replays queued outcomes and counts calls.
///
/// While held, every fetch waits for a permit released by the test.
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<Result<Credential>>>,
    calls: AtomicUsize,
    held: AtomicBool,
    gate: Semaphore,
}

impl ScriptedFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            held: AtomicBool::new(false),
            gate: Semaphore::new(0),
        })
    }

    pub fn push(&self, outcome: Result<Credential>) {
        self.script.lock().push_back(outcome);
    }

    pub fn push_ok(&self, credential: Credential) {
        self.push(Ok(credential));
    }

    pub fn push_err(&self, err: CredentialError) {
        self.push(Err(err));
    }

    /// Queue whatever parsing `body` yields.
    pub fn push_body(&self, body: &str) {
        self.push(parse_metadata_response(body));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn release(&self, permits: usize) {
        self.gate.add_permits(permits);
    }

    pub async fn wait_for_calls(&self, calls: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.calls() < calls {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("fetcher was not called in time");
    }
}

#[async_trait]
impl CredentialFetcher for ScriptedFetcher {
    async fn fetch(&self, role_name: &str) -> Result<Credential> {
        assert_eq!(role_name, ROLE);
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.held.load(Ordering::SeqCst) {
            self.gate
                .acquire()
                .await
                .map_err(|e| CredentialError::network(e.to_string()))?
                .forget();
        }

        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(CredentialError::network("script exhausted")))
    }
}

pub async fn provider_with(
    fetcher: Arc<ScriptedFetcher>,
    clock: Arc<ManualClock>,
) -> Result<ClientProvider<FakeOssClient>> {
    ClientProvider::builder()
        .role_name(ROLE)
        .fetcher(fetcher)
        .clock(clock)
        .build(build_client)
        .await
}

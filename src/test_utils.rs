//! Test doubles for the credential and store seams.
//!
//! Lets the broker and `ItemStore` run without STS or DynamoDB: a role
//! assumer that replays scripted outcomes, and a client factory that hands
//! out one shared `LocalStore`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::credentials::AssumedCredentials;
use crate::interfaces::{
    AssumeRoleFailure, AssumeRoleRequest, ClientFactory, RoleAssumer, StoreClient,
};
use crate::store::LocalStore;

/// Credentials expiring at `expiration`, tagged with a sequence number so
/// successive assumptions are distinguishable.
pub fn credentials_expiring_at(expiration: DateTime<Utc>, seq: usize) -> AssumedCredentials {
    AssumedCredentials {
        access_key_id: format!("ASIATEST{:04}", seq),
        secret_access_key: format!("secret-{}", seq),
        session_token: format!("token-{}", seq),
        expiration,
    }
}

/// Role assumer replaying a script of outcomes.
///
/// Once the script is exhausted every call succeeds with credentials valid
/// for one hour.
#[derive(Default)]
pub struct ScriptedRoleAssumer {
    script: Mutex<VecDeque<Result<AssumedCredentials, AssumeRoleFailure>>>,
    requests: Mutex<Vec<AssumeRoleRequest>>,
    calls: AtomicUsize,
}

impl ScriptedRoleAssumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful outcome.
    pub fn then_credentials(self, credentials: AssumedCredentials) -> Self {
        self.lock_script().push_back(Ok(credentials));
        self
    }

    /// Queue a failure.
    pub fn then_failure(self, failure: AssumeRoleFailure) -> Self {
        self.lock_script().push_back(Err(failure));
        self
    }

    /// Number of `assume_role` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<AssumeRoleRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn lock_script(
        &self,
    ) -> std::sync::MutexGuard<'_, VecDeque<Result<AssumedCredentials, AssumeRoleFailure>>> {
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RoleAssumer for ScriptedRoleAssumer {
    async fn assume_role(
        &self,
        request: AssumeRoleRequest,
    ) -> Result<AssumedCredentials, AssumeRoleFailure> {
        let seq = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request);

        // Let concurrent callers interleave as they would around a network call.
        tokio::task::yield_now().await;

        self.lock_script()
            .pop_front()
            .unwrap_or_else(|| Ok(credentials_expiring_at(Utc::now() + Duration::hours(1), seq)))
    }
}

/// Client factory backed by a single shared `LocalStore`.
pub struct LocalClientFactory {
    store: Arc<LocalStore>,
    assumed_builds: Mutex<Vec<AssumedCredentials>>,
    direct_builds: AtomicUsize,
}

impl LocalClientFactory {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self {
            store,
            assumed_builds: Mutex::new(Vec::new()),
            direct_builds: AtomicUsize::new(0),
        }
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Credentials of every client built from an assumed role, in order.
    pub fn assumed_builds(&self) -> Vec<AssumedCredentials> {
        self.assumed_builds
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of clients built from direct credentials.
    pub fn direct_builds(&self) -> usize {
        self.direct_builds.load(Ordering::SeqCst)
    }
}

impl ClientFactory for LocalClientFactory {
    fn build(&self, credentials: Option<&AssumedCredentials>, _region: Option<&str>) -> StoreClient {
        match credentials {
            Some(credentials) => self
                .assumed_builds
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(credentials.clone()),
            None => {
                self.direct_builds.fetch_add(1, Ordering::SeqCst);
            }
        }
        self.store.clone()
    }
}

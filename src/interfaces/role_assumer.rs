//! Role assumption interface.

use async_trait::async_trait;

use crate::credentials::AssumedCredentials;

/// Parameters of a single role assumption call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssumeRoleRequest {
    /// Fully qualified role identifier in the target account.
    pub role_arn: String,
    /// Session name recorded by the provider for traceability.
    pub session_name: String,
    /// Requested credential lifetime.
    pub duration_seconds: i32,
}

/// Why a role assumption failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssumeRoleFailure {
    /// The calling identity can never assume any role (e.g. a root identity).
    /// Retrying is pointless.
    #[error("identity cannot assume roles: {0}")]
    Incapable(String),

    /// Anything else: throttling, network errors, a missing trust policy.
    #[error("{0}")]
    Transient(String),
}

/// Interface to a role-assumption protocol.
///
/// Implementations:
/// - `StsRoleAssumer`: AWS STS `AssumeRole`
/// - test doubles that script responses
#[async_trait]
pub trait RoleAssumer: Send + Sync {
    /// Exchange the base identity for time-boxed credentials.
    async fn assume_role(
        &self,
        request: AssumeRoleRequest,
    ) -> std::result::Result<AssumedCredentials, AssumeRoleFailure>;
}

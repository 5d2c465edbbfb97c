//! Error types for the access layer.

use crate::config::ConfigError;

/// Result type for access layer operations.
pub type Result<T> = std::result::Result<T, AccessError>;

/// Errors surfaced by the access layer.
///
/// Nothing in this crate retries. Every variant is passed straight up to the
/// domain service, which decides whether the whole request is worth retrying.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// Role assumption failed for a transient reason (throttling, network,
    /// missing trust policy). The outer request may be retried.
    #[error("Role assumption failed: account={cloud_account_id}, tenant={tenant}: {message}")]
    Assumption {
        cloud_account_id: String,
        tenant: String,
        message: String,
    },

    /// The base identity can never assume a role. `CredentialBroker::get_client`
    /// converts this into a fallback registration; only direct callers of
    /// `CredentialBroker::assume` observe it.
    #[error("Identity cannot assume roles: account={cloud_account_id}, tenant={tenant}: {message}")]
    AssumptionIncapable {
        cloud_account_id: String,
        tenant: String,
        message: String,
    },

    #[error("{operation} failed for tenant {tenant}")]
    StoreOperation {
        operation: &'static str,
        tenant: String,
        #[source]
        source: BackendError,
    },

    #[error("Malformed key or expression: {0}")]
    Normalization(String),

    #[error("Invalid tenant configuration: {0}")]
    InvalidTenant(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl AccessError {
    pub(crate) fn store(operation: &'static str, tenant: &str, source: BackendError) -> Self {
        Self::StoreOperation {
            operation,
            tenant: tenant.to_string(),
            source,
        }
    }

    pub(crate) fn normalization(msg: impl Into<String>) -> Self {
        Self::Normalization(msg.into())
    }

    /// True for errors the caller may reasonably retry at the request level.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Assumption { .. })
    }
}

/// Errors from an underlying store backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Conditional check failed")]
    ConditionFailed,

    #[error("Store service error: {0}")]
    Service(String),

    #[error("Operation not supported by this backend: {0}")]
    Unsupported(String),

    #[error("Invalid item: {0}")]
    InvalidItem(String),
}

impl BackendError {
    pub fn service(msg: impl Into<String>) -> Self {
        Self::Service(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    pub fn invalid_item(msg: impl Into<String>) -> Self {
        Self::InvalidItem(msg.into())
    }
}

//! tenant-access - cross-account data access layer
//!
//! Routes every domain-service read and write to the right physical table
//! with the right credentials for a tenant. Role-assumed credentials are
//! cached per tenant, tenants whose identity can never assume a role are
//! pinned to a shared fallback table, partition/sort key casing is
//! normalized per table, and every write carries audit columns taken from
//! the request-scoped actor context.

pub mod audit;
pub mod bootstrap;
pub mod config;
pub mod credentials;
pub mod error;
pub mod interfaces;
pub mod item;
pub mod store;
pub mod tables;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use audit::{current_context, with_context, AuditContext};
pub use config::AccessConfig;
pub use credentials::{AssumedCredentials, CredentialBroker, FallbackRegistry};
pub use error::{AccessError, BackendError, Result};
pub use item::{CloudTier, Item, TenantAwsConfig};
pub use store::{ItemStore, LocalStore, WriteOptions};
pub use tables::{KeyCasing, ResolvedTable, TableResolver};

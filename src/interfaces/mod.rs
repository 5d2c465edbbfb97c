//! Abstract interfaces for the access layer.
//!
//! These traits define the contracts for:
//! - Role assumption (exchanging a base identity for scoped credentials)
//! - Item backends (table-addressed single-table primitives)
//! - Client factories (building a backend handle from credentials)

pub mod item_backend;
pub mod role_assumer;

pub use item_backend::{
    ClientFactory, ItemBackend, PutRequest, QueryRequest, ScanRequest, StoreClient, UpdateRequest,
};
pub use role_assumer::{AssumeRoleFailure, AssumeRoleRequest, RoleAssumer};

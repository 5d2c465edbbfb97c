//! Table and key-casing resolution.
//!
//! Maps a tenant and its cloud tier to the physical table that holds its
//! data and the key casing that table was created with:
//!
//! | Tenant state          | Table                       | Casing    |
//! |-----------------------|-----------------------------|-----------|
//! | in fallback registry  | shared fallback table       | `PK`/`SK` |
//! | private tier          | `tenant-{tenant}-private`   | `pk`/`sk` |
//! | public tier           | shared public table         | `PK`/`SK` |

mod normalize;

use std::sync::Arc;

use crate::config::{TableConfig, TENANT_PLACEHOLDER};
use crate::credentials::FallbackRegistry;
use crate::item::CloudTier;

pub use normalize::{
    denormalize_item, normalize_expression, normalize_item, normalize_key, normalize_names,
};
pub(crate) use normalize::TOKEN_RE;

/// Key field casing convention of a physical table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum KeyCasing {
    /// `PK`/`SK`, the convention callers write in.
    #[default]
    Upper,
    /// `pk`/`sk`, used by dedicated private tables.
    Lower,
}

impl KeyCasing {
    pub fn partition_key(self) -> &'static str {
        match self {
            KeyCasing::Upper => crate::item::PARTITION_KEY,
            KeyCasing::Lower => crate::item::PARTITION_KEY_LOWER,
        }
    }

    pub fn sort_key(self) -> &'static str {
        match self {
            KeyCasing::Upper => crate::item::SORT_KEY,
            KeyCasing::Lower => crate::item::SORT_KEY_LOWER,
        }
    }

    pub fn inverse(self) -> Self {
        match self {
            KeyCasing::Upper => KeyCasing::Lower,
            KeyCasing::Lower => KeyCasing::Upper,
        }
    }
}

/// Physical table and key casing for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTable {
    pub table_name: String,
    pub casing: KeyCasing,
}

/// Resolves tenants to tables.
#[derive(Debug, Clone)]
pub struct TableResolver {
    tables: TableConfig,
    fallback: Arc<FallbackRegistry>,
}

impl TableResolver {
    pub fn new(tables: TableConfig, fallback: Arc<FallbackRegistry>) -> Self {
        Self { tables, fallback }
    }

    /// Table and casing for a tenant, given the registry as it is right now.
    pub fn resolve(&self, tenant_account_id: &str, cloud_tier: CloudTier) -> ResolvedTable {
        if self.fallback.contains(tenant_account_id) {
            return ResolvedTable {
                table_name: self.tables.fallback_table.clone(),
                casing: KeyCasing::Upper,
            };
        }

        match cloud_tier {
            CloudTier::Private => ResolvedTable {
                table_name: self.private_table(tenant_account_id),
                casing: KeyCasing::Lower,
            },
            CloudTier::Public => ResolvedTable {
                table_name: self.tables.public_table.clone(),
                casing: KeyCasing::Upper,
            },
        }
    }

    /// Dedicated table name for a private-tier tenant.
    pub fn private_table(&self, tenant_account_id: &str) -> String {
        self.tables
            .private_table_template
            .replace(TENANT_PLACEHOLDER, tenant_account_id)
    }

    /// Shared table for public-tier tenants.
    pub fn public_table(&self) -> &str {
        &self.tables.public_table
    }

    pub fn fallback_registry(&self) -> &Arc<FallbackRegistry> {
        &self.fallback
    }
}

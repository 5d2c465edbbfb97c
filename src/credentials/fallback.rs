//! Sticky registry of tenants that can never assume a role.

use std::collections::HashSet;
use std::sync::RwLock;

/// Tenants observed to fail role assumption permanently.
///
/// Membership is monotonic: once a tenant is added it stays for the life of
/// the registry. Concurrent duplicate inserts are harmless.
#[derive(Debug, Default)]
pub struct FallbackRegistry {
    tenants: RwLock<HashSet<String>>,
}

impl FallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a tenant as local-fallback. Returns true if it was not already.
    pub fn mark(&self, tenant_account_id: &str) -> bool {
        self.tenants
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(tenant_account_id.to_string())
    }

    pub fn contains(&self, tenant_account_id: &str) -> bool {
        self.tenants
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(tenant_account_id)
    }

    pub fn len(&self) -> usize {
        self.tenants
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted copy of the current members.
    pub fn snapshot(&self) -> Vec<String> {
        let mut tenants: Vec<String> = self
            .tenants
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect();
        tenants.sort();
        tenants
    }
}

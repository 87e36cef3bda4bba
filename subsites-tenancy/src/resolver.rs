//! Host Resolution
//!
//! Maps an inbound `Host` to the subsite bound to it.

use crate::domain::{DomainPattern, canonicalize};
use crate::error::TenantResult;
use crate::store::TenantStore;
use crate::tenant::{DomainBinding, TenantId};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Host-based subsite resolver.
///
/// Matches are memoized per canonical host for the life of the resolver.
/// Misses (the main site) are looked up again on every call. Call
/// [`HostResolver::invalidate`] after subsite or domain writes.
pub struct HostResolver {
    store: Arc<dyn TenantStore>,
    memo: RwLock<HashMap<(String, bool), TenantId>>,
}

impl HostResolver {
    /// Create new host resolver
    ///
    /// # Examples
    ///
    /// ```
    /// use subsites_tenancy::{HostResolver, InMemoryTenantStore};
    /// use std::sync::Arc;
    ///
    /// let resolver = HostResolver::new(Arc::new(InMemoryTenantStore::new()));
    /// ```
    pub fn new(store: Arc<dyn TenantStore>) -> Self {
        Self {
            store,
            memo: RwLock::new(HashMap::new()),
        }
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<dyn TenantStore> {
        &self.store
    }

    /// Resolve `host` to a subsite ID.
    ///
    /// Only public subsites are considered. When several subsites match, a
    /// warning is logged and the first one in primary-first order wins. With
    /// no match and `fallback_to_default` set, the public default site is
    /// returned; otherwise the main site (0).
    pub async fn resolve(&self, host: &str, fallback_to_default: bool) -> TenantResult<TenantId> {
        let key = (canonicalize(host), fallback_to_default);
        if let Some(id) = self.memo.read().get(&key) {
            return Ok(*id);
        }

        let id = self.lookup(&key.0, fallback_to_default).await?;
        if !id.is_main() {
            self.memo.write().insert(key, id);
        }
        Ok(id)
    }

    /// Forget memoized results.
    pub fn invalidate(&self) {
        self.memo.write().clear();
    }

    async fn lookup(&self, host: &str, fallback_to_default: bool) -> TenantResult<TenantId> {
        let canonical = canonicalize(host);

        if !canonical.is_empty() {
            let public: BTreeSet<TenantId> = self
                .store
                .list_tenants()
                .await?
                .into_iter()
                .filter(|t| t.is_public)
                .map(|t| t.id)
                .collect();

            let mut matching: Vec<DomainBinding> = self
                .store
                .list_domains()
                .await?
                .into_iter()
                .filter(|b| public.contains(&b.tenant_id))
                .filter(|b| match DomainPattern::new(b.domain.as_str()) {
                    Ok(pattern) => pattern.matches(&canonical),
                    Err(e) => {
                        warn!(domain = %b.domain, error = %e, "Skipping unusable domain binding");
                        false
                    }
                })
                .collect();
            matching.sort_by(DomainBinding::primary_first);

            let mut tenants: Vec<TenantId> = Vec::new();
            for binding in &matching {
                if !tenants.contains(&binding.tenant_id) {
                    tenants.push(binding.tenant_id);
                }
            }

            if tenants.len() > 1 {
                warn!(
                    host = %canonical,
                    subsites = ?tenants,
                    "Multiple subsites match host, using the first"
                );
            }

            if let Some(first) = tenants.first() {
                debug!(host = %host, subsite = %first, "Resolved subsite from host");
                return Ok(*first);
            }
        }

        if fallback_to_default {
            if let Some(default) = self.store.find_default().await? {
                debug!(host = %host, subsite = %default.id, "Using default subsite for host");
                return Ok(default.id);
            }
        }

        Ok(TenantId::MAIN)
    }
}

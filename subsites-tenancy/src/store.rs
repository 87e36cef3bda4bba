//! Subsite storage
//!
//! The data-access layer is provided by the host application. Implement
//! [`TenantStore`] and [`AccessStore`] on top of your database; the
//! in-memory stores are used in tests and small deployments.

use crate::error::{TenantError, TenantResult};
use crate::permission::{Group, PrincipalId};
use crate::tenant::{DomainBinding, Tenant, TenantId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Subsite and domain binding records.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Find a subsite by ID
    async fn find_by_id(&self, id: TenantId) -> TenantResult<Option<Tenant>>;

    /// All subsites
    async fn list_tenants(&self) -> TenantResult<Vec<Tenant>>;

    /// All domain bindings
    async fn list_domains(&self) -> TenantResult<Vec<DomainBinding>>;

    /// Insert or update a subsite. An ID of 0 allocates a new ID.
    async fn save_tenant(&self, tenant: Tenant) -> TenantResult<Tenant>;

    /// Insert or update a binding. An ID of 0 allocates a new ID.
    async fn save_domain(&self, binding: DomainBinding) -> TenantResult<DomainBinding>;

    /// Delete a binding
    async fn delete_domain(&self, id: u64) -> TenantResult<()>;

    /// Bindings owned by one subsite.
    async fn domains_for(&self, id: TenantId) -> TenantResult<Vec<DomainBinding>> {
        Ok(self
            .list_domains()
            .await?
            .into_iter()
            .filter(|b| b.tenant_id == id)
            .collect())
    }

    /// The public subsite flagged as default site, lowest ID first.
    async fn find_default(&self) -> TenantResult<Option<Tenant>> {
        Ok(self
            .list_tenants()
            .await?
            .into_iter()
            .filter(|t| t.default_site && t.is_public)
            .min_by_key(|t| t.id))
    }
}

/// Group membership and grants.
#[async_trait]
pub trait AccessStore: Send + Sync {
    /// Groups `principal` is a member of
    async fn groups_for(&self, principal: PrincipalId) -> TenantResult<Vec<Group>>;
}

/// In-memory subsite store
#[derive(Debug, Default)]
pub struct InMemoryTenantStore {
    tenants: RwLock<BTreeMap<TenantId, Tenant>>,
    domains: RwLock<BTreeMap<u64, DomainBinding>>,
    next_tenant_id: AtomicU64,
    next_domain_id: AtomicU64,
}

impl InMemoryTenantStore {
    /// Create new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a subsite and its bindings, keeping the given IDs.
    pub fn with_tenant(self, tenant: Tenant, domains: Vec<DomainBinding>) -> Self {
        self.bump_tenant_id(tenant.id.get());
        {
            let mut stored = self.domains.write();
            for binding in domains {
                let id = if binding.id == 0 {
                    self.next_domain_id.fetch_add(1, Ordering::SeqCst) + 1
                } else {
                    self.bump_domain_id(binding.id);
                    binding.id
                };
                stored.insert(
                    id,
                    DomainBinding {
                        id,
                        tenant_id: tenant.id,
                        ..binding
                    },
                );
            }
        }
        self.tenants.write().insert(tenant.id, tenant);
        self
    }

    fn bump_tenant_id(&self, id: u64) {
        self.next_tenant_id.fetch_max(id, Ordering::SeqCst);
    }

    fn bump_domain_id(&self, id: u64) {
        self.next_domain_id.fetch_max(id, Ordering::SeqCst);
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn find_by_id(&self, id: TenantId) -> TenantResult<Option<Tenant>> {
        Ok(self.tenants.read().get(&id).cloned())
    }

    async fn list_tenants(&self) -> TenantResult<Vec<Tenant>> {
        Ok(self.tenants.read().values().cloned().collect())
    }

    async fn list_domains(&self) -> TenantResult<Vec<DomainBinding>> {
        Ok(self.domains.read().values().cloned().collect())
    }

    async fn save_tenant(&self, mut tenant: Tenant) -> TenantResult<Tenant> {
        if tenant.id.is_main() {
            let id = self.next_tenant_id.fetch_add(1, Ordering::SeqCst) + 1;
            tenant.id = TenantId::new(id);
        } else {
            self.bump_tenant_id(tenant.id.get());
        }
        self.tenants.write().insert(tenant.id, tenant.clone());
        Ok(tenant)
    }

    async fn save_domain(&self, mut binding: DomainBinding) -> TenantResult<DomainBinding> {
        if !self.tenants.read().contains_key(&binding.tenant_id) {
            return Err(TenantError::NotFound(binding.tenant_id.to_string()));
        }
        if binding.id == 0 {
            binding.id = self.next_domain_id.fetch_add(1, Ordering::SeqCst) + 1;
        } else {
            self.bump_domain_id(binding.id);
        }
        self.domains.write().insert(binding.id, binding.clone());
        Ok(binding)
    }

    async fn delete_domain(&self, id: u64) -> TenantResult<()> {
        self.domains.write().remove(&id);
        Ok(())
    }
}

/// In-memory group store
#[derive(Debug, Default)]
pub struct InMemoryAccessStore {
    groups: RwLock<Vec<Group>>,
}

impl InMemoryAccessStore {
    /// Create new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group
    pub fn with_group(self, group: Group) -> Self {
        self.groups.write().push(group);
        self
    }
}

#[async_trait]
impl AccessStore for InMemoryAccessStore {
    async fn groups_for(&self, principal: PrincipalId) -> TenantResult<Vec<Group>> {
        Ok(self
            .groups
            .read()
            .iter()
            .filter(|g| g.members.contains(&principal))
            .cloned()
            .collect())
    }
}

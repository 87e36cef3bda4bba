//! Subsite Directory
//!
//! Owns subsite and domain writes, and answers which subsites a member may
//! access.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use subsites_tenancy::directory::TenantDirectory;
//!
//! let directory = TenantDirectory::new(store, access, resolver)
//!     .with_config(&config);
//!
//! let tenant = directory.create_tenant(Tenant::new(TenantId::MAIN, "Acme")).await?;
//! directory
//!     .add_domain(DomainBinding::new(tenant.id, "acme.com").primary())
//!     .await?;
//!
//! let sites = directory
//!     .accessible_tenants(Some(member), &[Capability::CmsAccess("CMSMain".into())], true, "Main site")
//!     .await?;
//! ```

use crate::domain::validate_binding;
use crate::error::{TenantError, TenantResult};
use crate::hostmap::HostMapWriter;
use crate::permission::{Capability, Group, PrincipalId, codes_with_admin};
use crate::resolver::HostResolver;
use crate::store::{AccessStore, TenantStore};
use crate::tenant::{DomainBinding, Tenant, TenantId};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use subsites_config::SubsitesConfig;
use tracing::{debug, info};

/// Subsite directory and access control.
pub struct TenantDirectory {
    store: Arc<dyn TenantStore>,
    access: Arc<dyn AccessStore>,
    resolver: Arc<HostResolver>,
    hostmap: HostMapWriter,
    allowed_themes: Vec<String>,
    themes_dir: PathBuf,
}

impl TenantDirectory {
    /// Create a directory. The host map is written to its default path.
    pub fn new(
        store: Arc<dyn TenantStore>,
        access: Arc<dyn AccessStore>,
        resolver: Arc<HostResolver>,
    ) -> Self {
        let config = SubsitesConfig::default();
        Self {
            store,
            access,
            resolver,
            hostmap: HostMapWriter::from_config(&config),
            allowed_themes: config.allowed_themes,
            themes_dir: PathBuf::from(config.themes_dir),
        }
    }

    /// Apply host map and theme settings from `config`
    pub fn with_config(mut self, config: &SubsitesConfig) -> Self {
        self.hostmap = HostMapWriter::from_config(config);
        self.allowed_themes = config.allowed_themes.clone();
        self.themes_dir = PathBuf::from(&config.themes_dir);
        self
    }

    /// Use a specific host map writer
    pub fn with_host_map(mut self, writer: HostMapWriter) -> Self {
        self.hostmap = writer;
        self
    }

    /// The subsite store
    pub fn store(&self) -> &Arc<dyn TenantStore> {
        &self.store
    }

    /// The host resolver kept in sync with writes
    pub fn resolver(&self) -> &Arc<HostResolver> {
        &self.resolver
    }

    /// Subsites `principal` may access with any of `capabilities`.
    ///
    /// Subsites granted directly come first, then those granted through
    /// roles; each part is ordered by title and no subsite appears twice.
    /// Subsites without a title are never listed. With `include_main`, a
    /// main-site entry titled `main_title` is prepended when the principal
    /// holds the permission across all subsites.
    pub async fn accessible_tenants(
        &self,
        principal: Option<PrincipalId>,
        capabilities: &[Capability],
        include_main: bool,
        main_title: &str,
    ) -> TenantResult<Vec<Tenant>> {
        let Some(principal) = principal else {
            return Ok(Vec::new());
        };

        let groups = self.access.groups_for(principal).await?;
        let codes = codes_with_admin(capabilities);

        let tenants: Vec<Tenant> = self
            .store
            .list_tenants()
            .await?
            .into_iter()
            .filter(|t| !t.title.is_empty())
            .collect();

        let covered_by = |tenant: &Tenant, grants: &dyn Fn(&Group) -> bool| {
            groups.iter().any(|g| g.covers(tenant.id) && grants(g))
        };

        let mut direct: Vec<Tenant> = tenants
            .iter()
            .filter(|t| covered_by(*t, &|g: &Group| g.grants_directly(&codes)))
            .cloned()
            .collect();
        direct.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));

        let seen: BTreeSet<TenantId> = direct.iter().map(|t| t.id).collect();
        let mut via_roles: Vec<Tenant> = tenants
            .iter()
            .filter(|t| !seen.contains(&t.id))
            .filter(|t| covered_by(*t, &|g: &Group| g.grants_via_role(&codes)))
            .cloned()
            .collect();
        via_roles.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));

        let mut result = direct;
        result.extend(via_roles);

        if include_main && Self::grants_main_site(&groups, &codes) {
            result.insert(0, Tenant::main_site(main_title));
        }

        debug!(principal = %principal, count = result.len(), "Listed accessible subsites");
        Ok(result)
    }

    /// Whether `principal` holds any of `capabilities` (or `ADMIN`) in a
    /// group that applies to all subsites.
    pub async fn has_main_site_permission(
        &self,
        principal: Option<PrincipalId>,
        capabilities: &[Capability],
    ) -> TenantResult<bool> {
        let Some(principal) = principal else {
            return Ok(false);
        };
        let groups = self.access.groups_for(principal).await?;
        Ok(Self::grants_main_site(&groups, &codes_with_admin(capabilities)))
    }

    fn grants_main_site(groups: &[Group], codes: &[String]) -> bool {
        groups
            .iter()
            .any(|g| g.access_all_tenants && g.grants_directly(codes))
    }

    /// Create a subsite. An ID of 0 allocates one.
    pub async fn create_tenant(&self, tenant: Tenant) -> TenantResult<Tenant> {
        let tenant = self.store.save_tenant(tenant).await?;
        self.clear_other_defaults(&tenant).await?;
        info!(subsite = %tenant.id, title = %tenant.title, "Created subsite");
        self.after_write().await;
        Ok(tenant)
    }

    /// Update an existing subsite.
    pub async fn update_tenant(&self, tenant: Tenant) -> TenantResult<Tenant> {
        if self.store.find_by_id(tenant.id).await?.is_none() {
            return Err(TenantError::NotFound(tenant.id.to_string()));
        }
        let tenant = self.store.save_tenant(tenant).await?;
        self.clear_other_defaults(&tenant).await?;
        debug!(subsite = %tenant.id, "Updated subsite");
        self.after_write().await;
        Ok(tenant)
    }

    /// Bind a domain to a subsite.
    ///
    /// The binding is validated first; a rejected binding is not written. A
    /// primary binding demotes the subsite's previous primary.
    pub async fn add_domain(&self, binding: DomainBinding) -> TenantResult<DomainBinding> {
        if self.store.find_by_id(binding.tenant_id).await?.is_none() {
            return Err(TenantError::NotFound(binding.tenant_id.to_string()));
        }

        let existing = self.store.list_domains().await?;
        let titles: HashMap<TenantId, String> = self
            .store
            .list_tenants()
            .await?
            .into_iter()
            .map(|t| (t.id, t.title))
            .collect();
        let mut binding = binding;
        binding.domain = binding.domain.trim().to_string();
        validate_binding(&binding, &existing, |id| titles.get(&id).cloned())?;

        if binding.is_primary {
            for other in existing
                .into_iter()
                .filter(|b| b.tenant_id == binding.tenant_id && b.is_primary && b.id != binding.id)
            {
                self.store
                    .save_domain(DomainBinding {
                        is_primary: false,
                        ..other
                    })
                    .await?;
            }
        }

        let binding = self.store.save_domain(binding).await?;
        info!(subsite = %binding.tenant_id, domain = %binding.domain, "Bound domain");
        self.after_write().await;
        Ok(binding)
    }

    /// Remove a domain binding.
    pub async fn remove_domain(&self, id: u64) -> TenantResult<()> {
        self.store.delete_domain(id).await?;
        debug!(binding = id, "Removed domain binding");
        self.after_write().await;
        Ok(())
    }

    /// Themes a subsite may select.
    ///
    /// The configured allow-list when set; otherwise the entries of the
    /// themes directory, skipping hidden entries and collapsing theme
    /// variants (`name_variant`) onto their base name.
    pub async fn available_themes(&self) -> TenantResult<Vec<String>> {
        if !self.allowed_themes.is_empty() {
            return Ok(self.allowed_themes.clone());
        }

        let mut entries = match tokio::fs::read_dir(&self.themes_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut themes = BTreeSet::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            if let Some(base) = name.split('_').next().filter(|b| !b.is_empty()) {
                themes.insert(base.to_string());
            }
        }
        Ok(themes.into_iter().collect())
    }

    async fn clear_other_defaults(&self, tenant: &Tenant) -> TenantResult<()> {
        if !(tenant.default_site && tenant.is_public) {
            return Ok(());
        }
        for other in self.store.list_tenants().await? {
            if other.id != tenant.id && other.default_site && other.is_public {
                debug!(subsite = %other.id, "Clearing previous default site");
                self.store.save_tenant(other.with_default_site(false)).await?;
            }
        }
        Ok(())
    }

    async fn after_write(&self) {
        self.resolver.invalidate();
        self.hostmap.rebuild(self.store.as_ref()).await;
    }
}

//! Back-office subsite switching
//!
//! The admin side of subsites: which subsites each admin section offers in
//! its switcher, the change-subsite action, and the access fallback that
//! moves a member onto a subsite they can actually edit.

use crate::context::TenantContext;
use crate::directory::TenantDirectory;
use crate::error::TenantResult;
use crate::permission::{Capability, PermissionOracle, PrincipalId};
use crate::tenant::{Tenant, TenantId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subsites_config::SubsitesConfig;
use tracing::{debug, info};

/// Switcher value selecting every group in the security section.
pub const ALL_GROUPS_ID: i64 = -1;

/// Admin sections with their own switcher rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdminSection {
    /// Page tree (`CMSMain`)
    Pages,
    /// Files and images (`AssetAdmin`)
    Assets,
    /// Members and groups (`SecurityAdmin`)
    Security,
    /// Admin home (`AdminHome`)
    Dashboard,
    /// Any other section, by code
    Other(String),
}

impl AdminSection {
    /// Section code as used in `CMS_ACCESS_*` permissions.
    pub fn code(&self) -> &str {
        match self {
            AdminSection::Pages => "CMSMain",
            AdminSection::Assets => "AssetAdmin",
            AdminSection::Security => "SecurityAdmin",
            AdminSection::Dashboard => "AdminHome",
            AdminSection::Other(code) => code,
        }
    }

    /// Section for a controller code; unknown codes become `Other`.
    pub fn from_code(code: &str) -> Self {
        match code {
            "CMSMain" => AdminSection::Pages,
            "AssetAdmin" => AdminSection::Assets,
            "SecurityAdmin" => AdminSection::Security,
            "AdminHome" => AdminSection::Dashboard,
            other => AdminSection::Other(other.to_string()),
        }
    }

    /// Capabilities that open the section.
    pub fn capabilities(&self) -> Vec<Capability> {
        match self {
            AdminSection::Dashboard => ["CMSMain", "AccountAdmin", "ReportAdmin"]
                .into_iter()
                .map(|s| Capability::CmsAccess(s.to_string()))
                .collect(),
            section => vec![Capability::CmsAccess(section.code().to_string())],
        }
    }
}

/// An entry of the subsite switcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitcherEntry {
    /// Subsite ID, or [`ALL_GROUPS_ID`]
    pub id: i64,
    pub title: String,
}

/// Switcher IDs are signed; IDs above `i64::MAX` saturate.
fn switcher_id(id: TenantId) -> i64 {
    i64::try_from(id.get()).unwrap_or(i64::MAX)
}

impl From<Tenant> for SwitcherEntry {
    fn from(tenant: Tenant) -> Self {
        Self {
            id: switcher_id(tenant.id),
            title: tenant.title,
        }
    }
}

/// An option of the switcher select box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwitcherOption {
    pub id: i64,
    pub title: String,
    pub selected: bool,
}

/// How the switcher is shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SwitcherView {
    /// Two or more choices
    Select { options: Vec<SwitcherOption> },
    /// Exactly one subsite, shown as its title
    Single { title: String },
    /// Nothing to switch to
    Hidden,
}

impl SwitcherView {
    /// Choose the view for `entries`, marking `current` as selected.
    pub fn from_list(entries: Vec<SwitcherEntry>, current: TenantId) -> Self {
        match entries.len() {
            0 => SwitcherView::Hidden,
            1 => SwitcherView::Single {
                title: entries.into_iter().next().map(|e| e.title).unwrap_or_default(),
            },
            _ => SwitcherView::Select {
                options: entries
                    .into_iter()
                    .map(|e| SwitcherOption {
                        selected: e.id == switcher_id(current),
                        id: e.id,
                        title: e.title,
                    })
                    .collect(),
            },
        }
    }
}

/// Result of the change-subsite action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeOutcome {
    /// Subsite now active
    pub tenant: TenantId,
    /// New value of the "show all" preference
    pub show_all: bool,
}

impl ChangeOutcome {
    /// Cookie value for the "show all" preference
    pub fn cookie_value(&self) -> &'static str {
        if self.show_all { "true" } else { "false" }
    }
}

/// Result of [`SubsiteAdmin::ensure_accessible_tenant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessCheck {
    /// The current subsite is accessible
    Allowed,
    /// Switched to an accessible subsite
    Switched(TenantId),
    /// No accessible subsite for this section
    Denied,
}

/// Admin-side subsite operations.
pub struct SubsiteAdmin {
    directory: Arc<TenantDirectory>,
    oracle: Arc<dyn PermissionOracle>,
    main_site_title: String,
    show_all_cookie: String,
}

impl SubsiteAdmin {
    /// Create admin operations with default settings.
    pub fn new(directory: Arc<TenantDirectory>, oracle: Arc<dyn PermissionOracle>) -> Self {
        Self::with_config(directory, oracle, &SubsitesConfig::default())
    }

    /// Create admin operations using `main_site_title` and `show_all_cookie` from `config`.
    pub fn with_config(
        directory: Arc<TenantDirectory>,
        oracle: Arc<dyn PermissionOracle>,
        config: &SubsitesConfig,
    ) -> Self {
        Self {
            directory,
            oracle,
            main_site_title: config.main_site_title.clone(),
            show_all_cookie: config.show_all_cookie.clone(),
        }
    }

    /// Name of the "show all" preference cookie
    pub fn show_all_cookie(&self) -> &str {
        &self.show_all_cookie
    }

    /// Handle the change-subsite action.
    ///
    /// `-1` selects the main site and turns the "show all" preference on;
    /// any other ID switches to it and turns the preference off. A missing
    /// or malformed parameter changes nothing.
    pub fn change_tenant(&self, ctx: &TenantContext, raw: Option<&str>) -> Option<ChangeOutcome> {
        let raw = raw?.trim();
        let outcome = if raw == ALL_GROUPS_ID.to_string() {
            ChangeOutcome {
                tenant: TenantId::MAIN,
                show_all: true,
            }
        } else {
            ChangeOutcome {
                tenant: TenantId::parse(raw)?,
                show_all: false,
            }
        };

        ctx.switch_tenant(outcome.tenant);
        info!(subsite = %outcome.tenant, show_all = outcome.show_all, "Changed admin subsite");
        Some(outcome)
    }

    /// Subsites offered by the switcher of `section`.
    pub async fn switcher_tenants(
        &self,
        section: &AdminSection,
        principal: Option<PrincipalId>,
    ) -> TenantResult<Vec<SwitcherEntry>> {
        let capabilities = section.capabilities();
        let (include_main, main_title) = match section {
            AdminSection::Assets => (true, "Shared files & images"),
            AdminSection::Security => (true, "Groups accessing all sites"),
            AdminSection::Pages => {
                let has_default = self.directory.store().find_default().await?.is_some();
                (!has_default, self.main_site_title.as_str())
            }
            AdminSection::Dashboard | AdminSection::Other(_) => (false, self.main_site_title.as_str()),
        };

        let tenants = self
            .directory
            .accessible_tenants(principal, &capabilities, include_main, main_title)
            .await?;

        let has_main = tenants.iter().any(|t| t.id.is_main());
        let mut entries: Vec<SwitcherEntry> = tenants.into_iter().map(SwitcherEntry::from).collect();
        if *section == AdminSection::Security && has_main {
            entries.push(SwitcherEntry {
                id: ALL_GROUPS_ID,
                title: "All groups".to_string(),
            });
        }
        Ok(entries)
    }

    /// The switcher as shown for the active subsite.
    pub async fn switcher_view(
        &self,
        ctx: &TenantContext,
        section: &AdminSection,
        principal: Option<PrincipalId>,
    ) -> TenantResult<SwitcherView> {
        let entries = self.switcher_tenants(section, principal).await?;
        Ok(SwitcherView::from_list(entries, ctx.current_tenant_id()))
    }

    /// Move `principal` onto a subsite they can access in `section`.
    ///
    /// Administrators may use any subsite.
    pub async fn ensure_accessible_tenant(
        &self,
        ctx: &TenantContext,
        section: &AdminSection,
        principal: Option<PrincipalId>,
    ) -> TenantResult<AccessCheck> {
        if let Some(p) = principal {
            if self.oracle.check(p, &Capability::Admin) {
                return Ok(AccessCheck::Allowed);
            }
        }

        let accessible = self
            .directory
            .accessible_tenants(principal, &section.capabilities(), false, &self.main_site_title)
            .await?;
        let current = ctx.current_tenant_id();

        if accessible.iter().any(|t| t.id == current) {
            return Ok(AccessCheck::Allowed);
        }
        match accessible.first() {
            Some(first) => {
                debug!(from = %current, to = %first.id, "Switching to an accessible subsite");
                ctx.switch_tenant(first);
                Ok(AccessCheck::Switched(first.id))
            }
            None => Ok(AccessCheck::Denied),
        }
    }

    /// Whether `principal` may create subsites.
    pub fn can_add_tenants(&self, principal: Option<PrincipalId>) -> bool {
        principal.is_some_and(|p| self.oracle.check(p, &Capability::Admin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hostmap::HostMapWriter;
    use crate::permission::Group;
    use crate::resolver::HostResolver;
    use crate::store::{InMemoryAccessStore, InMemoryTenantStore};

    const ADMIN: PrincipalId = PrincipalId(1);
    const EDITOR: PrincipalId = PrincipalId(2);
    const NOBODY: PrincipalId = PrincipalId(3);

    struct GroupOracle;

    impl PermissionOracle for GroupOracle {
        fn check(&self, principal: PrincipalId, capability: &Capability) -> bool {
            principal == ADMIN || (principal == EDITOR && *capability != Capability::Admin)
        }
    }

    fn admin(store: InMemoryTenantStore) -> SubsiteAdmin {
        let store = Arc::new(store);
        let access = InMemoryAccessStore::new()
            .with_group(
                Group::new(1, "Administrators")
                    .with_access_all()
                    .with_permission(Capability::Admin)
                    .with_member(ADMIN),
            )
            .with_group(
                Group::new(2, "Editors")
                    .with_tenant(TenantId::new(2))
                    .with_permission(Capability::CmsAccess("CMSMain".into()))
                    .with_member(EDITOR),
            );
        let resolver = Arc::new(HostResolver::new(store.clone()));
        let directory = TenantDirectory::new(store, Arc::new(access), resolver)
            .with_host_map(HostMapWriter::new("unused").with_enabled(false));
        SubsiteAdmin::new(Arc::new(directory), Arc::new(GroupOracle))
    }

    fn two_sites() -> InMemoryTenantStore {
        InMemoryTenantStore::new()
            .with_tenant(Tenant::new(TenantId::new(1), "One"), vec![])
            .with_tenant(Tenant::new(TenantId::new(2), "Two"), vec![])
    }

    #[test]
    fn test_section_codes() {
        assert_eq!(AdminSection::from_code("CMSMain"), AdminSection::Pages);
        assert_eq!(AdminSection::from_code("ReportAdmin").code(), "ReportAdmin");
        assert_eq!(AdminSection::Dashboard.capabilities().len(), 3);
        assert_eq!(
            AdminSection::Assets.capabilities(),
            vec![Capability::CmsAccess("AssetAdmin".into())]
        );
    }

    #[test]
    fn test_change_tenant() {
        let admin = admin(two_sites());
        let ctx = TenantContext::new(TenantId::new(1));

        let outcome = admin.change_tenant(&ctx, Some("-1")).unwrap();
        assert_eq!(outcome.tenant, TenantId::MAIN);
        assert!(outcome.show_all);
        assert_eq!(outcome.cookie_value(), "true");
        assert_eq!(ctx.current_tenant_id(), TenantId::MAIN);

        let outcome = admin.change_tenant(&ctx, Some("2")).unwrap();
        assert_eq!(outcome.tenant, TenantId::new(2));
        assert_eq!(outcome.cookie_value(), "false");
        assert_eq!(ctx.current_tenant_id(), TenantId::new(2));

        assert!(admin.change_tenant(&ctx, Some("abc")).is_none());
        assert!(admin.change_tenant(&ctx, None).is_none());
        assert_eq!(ctx.current_tenant_id(), TenantId::new(2));
        assert_eq!(admin.show_all_cookie(), "noSubsiteFilter");
    }

    #[tokio::test]
    async fn test_security_switcher_adds_all_groups() {
        let admin = admin(two_sites());
        let entries = admin
            .switcher_tenants(&AdminSection::Security, Some(ADMIN))
            .await
            .unwrap();
        let titles: Vec<_> = entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Groups accessing all sites", "One", "Two", "All groups"]
        );
        assert_eq!(entries.last().map(|e| e.id), Some(ALL_GROUPS_ID));

        let entries = admin
            .switcher_tenants(&AdminSection::Security, Some(EDITOR))
            .await
            .unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_pages_switcher_hides_main_with_default_site() {
        let admin_plain = admin(two_sites());
        let entries = admin_plain
            .switcher_tenants(&AdminSection::Pages, Some(ADMIN))
            .await
            .unwrap();
        assert_eq!(entries[0].title, "Main site");

        let with_default = two_sites()
            .with_tenant(Tenant::new(TenantId::new(3), "Default").with_default_site(true), vec![]);
        let admin_default = admin(with_default);
        let entries = admin_default
            .switcher_tenants(&AdminSection::Pages, Some(ADMIN))
            .await
            .unwrap();
        assert!(entries.iter().all(|e| e.id != 0));
    }

    #[tokio::test]
    async fn test_switcher_view() {
        let admin = admin(two_sites());
        let ctx = TenantContext::new(TenantId::new(2));

        let view = admin
            .switcher_view(&ctx, &AdminSection::Pages, Some(EDITOR))
            .await
            .unwrap();
        assert_eq!(view, SwitcherView::Single { title: "Two".to_string() });

        let view = admin
            .switcher_view(&ctx, &AdminSection::Pages, Some(ADMIN))
            .await
            .unwrap();
        match view {
            SwitcherView::Select { options } => {
                assert_eq!(options.len(), 3);
                let selected: Vec<_> = options.iter().filter(|o| o.selected).map(|o| o.id).collect();
                assert_eq!(selected, vec![2]);
            }
            other => panic!("unexpected view: {:?}", other),
        }

        let view = admin
            .switcher_view(&ctx, &AdminSection::Pages, Some(NOBODY))
            .await
            .unwrap();
        assert_eq!(view, SwitcherView::Hidden);
    }

    #[test]
    fn test_switcher_ids_do_not_wrap() {
        let huge = TenantId::new(u64::MAX);
        let entry = SwitcherEntry::from(Tenant::new(huge, "Huge"));
        assert_eq!(entry.id, i64::MAX);
        assert_ne!(entry.id, ALL_GROUPS_ID);

        let entries = vec![
            entry,
            SwitcherEntry::from(Tenant::new(TenantId::new(1), "One")),
        ];
        match SwitcherView::from_list(entries, huge) {
            SwitcherView::Select { options } => {
                assert!(options[0].selected);
                assert!(!options[1].selected);
            }
            other => panic!("unexpected view: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ensure_accessible_tenant() {
        let admin = admin(two_sites());

        let ctx = TenantContext::new(TenantId::new(1));
        let check = admin
            .ensure_accessible_tenant(&ctx, &AdminSection::Pages, Some(ADMIN))
            .await
            .unwrap();
        assert_eq!(check, AccessCheck::Allowed);
        assert_eq!(ctx.current_tenant_id(), TenantId::new(1));

        let check = admin
            .ensure_accessible_tenant(&ctx, &AdminSection::Pages, Some(EDITOR))
            .await
            .unwrap();
        assert_eq!(check, AccessCheck::Switched(TenantId::new(2)));
        assert_eq!(ctx.current_tenant_id(), TenantId::new(2));

        let check = admin
            .ensure_accessible_tenant(&ctx, &AdminSection::Pages, Some(EDITOR))
            .await
            .unwrap();
        assert_eq!(check, AccessCheck::Allowed);

        let check = admin
            .ensure_accessible_tenant(&ctx, &AdminSection::Pages, Some(NOBODY))
            .await
            .unwrap();
        assert_eq!(check, AccessCheck::Denied);
    }

    #[test]
    fn test_can_add_tenants() {
        let admin = admin(two_sites());
        assert!(admin.can_add_tenants(Some(ADMIN)));
        assert!(!admin.can_add_tenants(Some(EDITOR)));
        assert!(!admin.can_add_tenants(None));
    }
}

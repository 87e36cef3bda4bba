//! Capabilities and permission collaborators
//!
//! Authorization itself lives outside this crate. Subsites only needs a
//! boolean capability check, a way to flush cached permission decisions
//! when the active subsite changes, and the group grants used to enumerate
//! accessible subsites.

use crate::tenant::TenantId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Principal (member) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(pub u64);

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Capability codes understood by subsites.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Full administrator, implied by every check
    Admin,
    /// Access to an admin section, e.g. `CMS_ACCESS_CMSMain`
    CmsAccess(String),
    /// Choose the subsite an asset folder belongs to
    ManageSubsiteAssets,
    /// Any other code
    Custom(String),
}

impl Capability {
    /// Wire code of this capability.
    ///
    /// # Examples
    ///
    /// ```
    /// use subsites_tenancy::Capability;
    ///
    /// assert_eq!(Capability::Admin.code(), "ADMIN");
    /// assert_eq!(Capability::CmsAccess("AssetAdmin".into()).code(), "CMS_ACCESS_AssetAdmin");
    /// ```
    pub fn code(&self) -> String {
        match self {
            Capability::Admin => "ADMIN".to_string(),
            Capability::CmsAccess(section) => format!("CMS_ACCESS_{}", section),
            Capability::ManageSubsiteAssets => "SUBSITE_ASSETS_CREATE_SUBSITE".to_string(),
            Capability::Custom(code) => code.clone(),
        }
    }

    /// Parse a wire code.
    pub fn from_code(code: &str) -> Self {
        match code {
            "ADMIN" => Capability::Admin,
            "SUBSITE_ASSETS_CREATE_SUBSITE" => Capability::ManageSubsiteAssets,
            other => match other.strip_prefix("CMS_ACCESS_") {
                Some(section) if !section.is_empty() => Capability::CmsAccess(section.to_string()),
                _ => Capability::Custom(other.to_string()),
            },
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

/// Codes to test for `capabilities`, always including `ADMIN`.
pub(crate) fn codes_with_admin(capabilities: &[Capability]) -> Vec<String> {
    let mut codes: Vec<String> = capabilities.iter().map(Capability::code).collect();
    let admin = Capability::Admin.code();
    if !codes.contains(&admin) {
        codes.push(admin);
    }
    codes
}

/// Definition of a permission contributed by subsites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionDefinition {
    pub capability: Capability,
    pub name: &'static str,
    pub category: &'static str,
    pub help: &'static str,
    pub sort: u32,
}

/// Permissions this crate contributes to the host application.
pub fn provided_permissions() -> Vec<PermissionDefinition> {
    vec![PermissionDefinition {
        capability: Capability::ManageSubsiteAssets,
        name: "Manage assets for subsites",
        category: "Roles and access permissions",
        help: "Ability to select the subsite to which an asset folder belongs. Requires \"Access to Files & Images.\"",
        sort: 300,
    }]
}

/// External authorization oracle.
pub trait PermissionOracle: Send + Sync {
    /// Whether `principal` holds `capability` in the active subsite.
    fn check(&self, principal: PrincipalId, capability: &Capability) -> bool;
}

/// Cache of permission decisions that depends on the active subsite.
pub trait PermissionCache: Send + Sync {
    /// Drop every cached decision.
    fn flush(&self);
}

/// Permission cache that caches nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPermissionCache;

impl PermissionCache for NoopPermissionCache {
    fn flush(&self) {}
}

/// A security group and what it grants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Group {
    pub id: u64,
    pub title: String,
    /// Subsites the group is bound to
    pub tenant_ids: Vec<TenantId>,
    /// Group applies to every subsite (and the main site)
    pub access_all_tenants: bool,
    /// Codes granted directly
    pub permission_codes: Vec<String>,
    /// Codes granted through roles
    pub role_codes: Vec<String>,
    /// Members of the group
    pub members: Vec<PrincipalId>,
}

impl Group {
    /// Create an empty group.
    pub fn new(id: u64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            ..Default::default()
        }
    }

    /// Bind the group to a subsite
    pub fn with_tenant(mut self, tenant: TenantId) -> Self {
        self.tenant_ids.push(tenant);
        self
    }

    /// Apply the group to all subsites
    pub fn with_access_all(mut self) -> Self {
        self.access_all_tenants = true;
        self
    }

    /// Grant a capability directly
    pub fn with_permission(mut self, capability: Capability) -> Self {
        self.permission_codes.push(capability.code());
        self
    }

    /// Grant a capability through a role
    pub fn with_role_permission(mut self, capability: Capability) -> Self {
        self.role_codes.push(capability.code());
        self
    }

    /// Add a member
    pub fn with_member(mut self, principal: PrincipalId) -> Self {
        self.members.push(principal);
        self
    }

    /// Whether the group applies to `tenant`.
    pub fn covers(&self, tenant: TenantId) -> bool {
        self.access_all_tenants || self.tenant_ids.contains(&tenant)
    }

    /// Whether the group grants one of `codes` directly.
    pub fn grants_directly(&self, codes: &[String]) -> bool {
        self.permission_codes.iter().any(|c| codes.contains(c))
    }

    /// Whether the group grants one of `codes` through a role.
    pub fn grants_via_role(&self, codes: &[String]) -> bool {
        self.role_codes.iter().any(|c| codes.contains(c))
    }
}

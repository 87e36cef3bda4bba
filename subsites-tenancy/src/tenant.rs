//! Subsite records
//!
//! Subsite identity, the subsite record itself and its domain bindings.

use crate::error::TenantError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Subsite identifier.
///
/// `0` is reserved for the main site (no subsite).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TenantId(u64);

impl TenantId {
    /// The main site.
    pub const MAIN: TenantId = TenantId(0);

    /// Create a new subsite ID.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Whether this is the main site.
    pub const fn is_main(self) -> bool {
        self.0 == 0
    }

    /// Parse a request or session value.
    ///
    /// Only plain non-negative integers are accepted; anything else is `None`.
    ///
    /// # Examples
    ///
    /// ```
    /// use subsites_tenancy::TenantId;
    ///
    /// assert_eq!(TenantId::parse("12"), Some(TenantId::new(12)));
    /// assert_eq!(TenantId::parse(" 3 "), Some(TenantId::new(3)));
    /// assert_eq!(TenantId::parse("3abc"), None);
    /// assert_eq!(TenantId::parse("-1"), None);
    /// ```
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        raw.parse::<u64>().ok().map(Self)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TenantId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl FromStr for TenantId {
    type Err = TenantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| TenantError::Invalid(s.to_string()))
    }
}

/// A subsite: a logical site partition with its own content, theme and domains.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tenant {
    /// Subsite identifier
    pub id: TenantId,

    /// Display title
    pub title: String,

    /// Optional redirect URL
    pub redirect_url: Option<String>,

    /// Whether this is the default site for unmatched hosts
    pub default_site: bool,

    /// Whether the subsite is publicly reachable
    pub is_public: bool,

    /// Theme identifier
    pub theme: Option<String>,

    /// Language/locale code
    pub language: Option<String>,
}

impl Tenant {
    /// Create a new public subsite.
    ///
    /// # Examples
    ///
    /// ```
    /// use subsites_tenancy::{Tenant, TenantId};
    ///
    /// let tenant = Tenant::new(TenantId::new(3), "Acme");
    /// assert!(tenant.is_public);
    /// assert!(!tenant.default_site);
    /// ```
    pub fn new(id: impl Into<TenantId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            redirect_url: None,
            default_site: false,
            is_public: true,
            theme: None,
            language: None,
        }
    }

    /// Synthetic record standing for the main site.
    pub fn main_site(title: impl Into<String>) -> Self {
        Self::new(TenantId::MAIN, title)
    }

    /// Set the default-site flag
    pub fn with_default_site(mut self, default_site: bool) -> Self {
        self.default_site = default_site;
        self
    }

    /// Set public visibility
    pub fn with_public(mut self, is_public: bool) -> Self {
        self.is_public = is_public;
        self
    }

    /// Set theme
    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = Some(theme.into());
        self
    }

    /// Set language
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Set redirect URL
    pub fn with_redirect_url(mut self, url: impl Into<String>) -> Self {
        self.redirect_url = Some(url.into());
        self
    }

    /// The subsite language, or `fallback` when none is configured.
    pub fn language_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        match self.language.as_deref() {
            Some(lang) if !lang.is_empty() => lang,
            _ => fallback,
        }
    }

    /// Resolve the representative domain of this subsite.
    ///
    /// Uses the first binding in primary-first order. Wildcards in that
    /// binding are replaced by a best guess: a trailing `.*` becomes the
    /// current host, a leading `*.` becomes `subsite.`. The main site always
    /// resolves to the current host.
    ///
    /// # Examples
    ///
    /// ```
    /// use subsites_tenancy::{DomainBinding, Tenant, TenantId};
    ///
    /// let tenant = Tenant::new(TenantId::new(1), "Acme");
    /// let bindings = vec![
    ///     DomainBinding::new(TenantId::new(1), "*.acme.com"),
    ///     DomainBinding::new(TenantId::new(1), "acme.com").primary(),
    /// ];
    /// assert_eq!(tenant.primary_domain(&bindings, "localhost").as_deref(), Some("acme.com"));
    /// ```
    pub fn primary_domain(&self, bindings: &[DomainBinding], current_host: &str) -> Option<String> {
        if self.id.is_main() {
            return Some(current_host.to_string());
        }

        let binding = bindings
            .iter()
            .filter(|b| b.tenant_id == self.id)
            .min_by(|a, b| DomainBinding::primary_first(a, b))?;

        let mut domain = binding.domain.clone();
        if let Some(stem) = domain.strip_suffix(".*") {
            domain = format!("{}.{}", stem, current_host);
        }
        if let Some(rest) = domain.strip_prefix("*.") {
            domain = format!("subsite.{}", rest);
        }
        Some(domain.replace(".www.", "."))
    }

    /// Absolute base URL of this subsite.
    pub fn absolute_base_url(
        &self,
        bindings: &[DomainBinding],
        current_host: &str,
        base_path: &str,
    ) -> Option<String> {
        self.primary_domain(bindings, current_host)
            .map(|domain| format!("http://{}{}", domain, base_path))
    }
}

/// A domain pattern bound to a subsite.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DomainBinding {
    /// Binding identifier (0 for unsaved bindings)
    pub id: u64,

    /// Owning subsite
    pub tenant_id: TenantId,

    /// Raw domain pattern, may contain `*`
    pub domain: String,

    /// Whether this is the representative domain of the subsite
    pub is_primary: bool,
}

impl DomainBinding {
    /// Create a non-primary binding.
    pub fn new(tenant_id: impl Into<TenantId>, domain: impl Into<String>) -> Self {
        Self {
            id: 0,
            tenant_id: tenant_id.into(),
            domain: domain.into(),
            is_primary: false,
        }
    }

    /// Mark as primary
    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    /// Set the binding ID
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    /// Primary bindings first, then by ID, then by domain.
    pub fn primary_first(a: &DomainBinding, b: &DomainBinding) -> Ordering {
        b.is_primary
            .cmp(&a.is_primary)
            .then(a.id.cmp(&b.id))
            .then_with(|| a.domain.cmp(&b.domain))
    }
}

/// What to switch to: a bare ID or a loaded subsite record.
#[derive(Debug, Clone, PartialEq)]
pub enum TenantTarget {
    /// Raw subsite ID
    Id(TenantId),
    /// Loaded subsite, which may carry a language
    Tenant(Tenant),
}

impl TenantTarget {
    /// The targeted ID.
    pub fn id(&self) -> TenantId {
        match self {
            TenantTarget::Id(id) => *id,
            TenantTarget::Tenant(tenant) => tenant.id,
        }
    }

    /// Language declared by the target, if any.
    pub fn language(&self) -> Option<&str> {
        match self {
            TenantTarget::Id(_) => None,
            TenantTarget::Tenant(tenant) => tenant.language.as_deref().filter(|l| !l.is_empty()),
        }
    }
}

impl From<TenantId> for TenantTarget {
    fn from(id: TenantId) -> Self {
        TenantTarget::Id(id)
    }
}

impl From<u64> for TenantTarget {
    fn from(id: u64) -> Self {
        TenantTarget::Id(TenantId::new(id))
    }
}

impl From<Tenant> for TenantTarget {
    fn from(tenant: Tenant) -> Self {
        TenantTarget::Tenant(tenant)
    }
}

impl From<&Tenant> for TenantTarget {
    fn from(tenant: &Tenant) -> Self {
        TenantTarget::Tenant(tenant.clone())
    }
}

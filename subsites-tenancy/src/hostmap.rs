//! Host map
//!
//! A generated lookup table from bound domains to the primary domain of
//! their subsite, written for publishing tooling that runs outside the
//! application. The resolver never reads it.
//!
//! The file is pretty-printed JSON:
//!
//! ```json
//! {
//!   "generated_at": "2024-03-01T10:00:00Z",
//!   "hosts": {
//!     "*.b.com": "b.com",
//!     "a.com": "a.com",
//!     "default": "a.com"
//!   }
//! }
//! ```

use crate::error::TenantResult;
use crate::store::TenantStore;
use crate::tenant::{DomainBinding, Tenant};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use subsites_config::SubsitesConfig;
use tracing::{debug, warn};

/// Key holding the default site.
pub const DEFAULT_KEY: &str = "default";

/// Domain to primary-domain mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostMap(BTreeMap<String, String>);

impl HostMap {
    /// Compute the map from every subsite and binding.
    ///
    /// Each binding is keyed by its domain with `www.` removed. Subsites
    /// without a primary domain are skipped. The `default` key points at the
    /// public default site. The result does not depend on input order.
    ///
    /// # Examples
    ///
    /// ```
    /// use subsites_tenancy::{DomainBinding, HostMap, Tenant, TenantId};
    ///
    /// let tenants = vec![Tenant::new(TenantId::new(1), "A").with_default_site(true)];
    /// let bindings = vec![
    ///     DomainBinding::new(TenantId::new(1), "a.com").primary(),
    ///     DomainBinding::new(TenantId::new(1), "www.a.net"),
    /// ];
    ///
    /// let map = HostMap::build(&tenants, &bindings, "localhost");
    /// assert_eq!(map.get("a.net"), Some("a.com"));
    /// assert_eq!(map.get("default"), Some("a.com"));
    /// ```
    pub fn build(tenants: &[Tenant], bindings: &[DomainBinding], current_host: &str) -> Self {
        let mut tenants: Vec<&Tenant> = tenants.iter().collect();
        tenants.sort_by_key(|t| t.id);

        let mut map = BTreeMap::new();
        for tenant in &tenants {
            let Some(primary) = tenant.primary_domain(bindings, current_host) else {
                continue;
            };

            let mut owned: Vec<&DomainBinding> =
                bindings.iter().filter(|b| b.tenant_id == tenant.id).collect();
            owned.sort_by(|a, b| DomainBinding::primary_first(a, b));

            for binding in owned {
                map.insert(binding.domain.replace("www.", ""), primary.clone());
            }
        }

        let default = tenants
            .iter()
            .find(|t| t.default_site && t.is_public)
            .and_then(|t| t.primary_domain(bindings, current_host));
        if let Some(primary) = default {
            map.insert(DEFAULT_KEY.to_string(), primary);
        }

        Self(map)
    }

    /// Primary domain for `domain`
    pub fn get(&self, domain: &str) -> Option<&str> {
        self.0.get(domain).map(String::as_str)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map has no entries
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// The host map file as written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostMapFile {
    pub generated_at: DateTime<Utc>,
    pub hosts: HostMap,
}

/// Writes the host map after subsite and domain changes.
#[derive(Debug, Clone)]
pub struct HostMapWriter {
    path: PathBuf,
    enabled: bool,
    current_host: String,
}

impl HostMapWriter {
    /// Writer targeting `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            enabled: true,
            current_host: "localhost".to_string(),
        }
    }

    /// Writer configured from `config`
    pub fn from_config(config: &SubsitesConfig) -> Self {
        Self::new(&config.hostmap_path)
            .with_enabled(config.write_hostmap)
            .with_current_host(&config.default_host)
    }

    /// Enable or disable writing
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Host used to expand wildcard primary domains
    pub fn with_current_host(mut self, host: impl Into<String>) -> Self {
        self.current_host = host.into();
        self
    }

    /// Target path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether [`HostMapWriter::rebuild`] writes the file
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Rebuild the map from `store` and write it.
    ///
    /// Never fails: problems are logged and the rebuild is skipped. Returns
    /// whether the file was written.
    pub async fn rebuild(&self, store: &dyn TenantStore) -> bool {
        if !self.enabled {
            return false;
        }

        match self.try_rebuild(store).await {
            Ok(written) => written,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to write host map");
                false
            }
        }
    }

    async fn try_rebuild(&self, store: &dyn TenantStore) -> TenantResult<bool> {
        let tenants = store.list_tenants().await?;
        let bindings = store.list_domains().await?;
        let hosts = HostMap::build(&tenants, &bindings, &self.current_host);

        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let writable = tokio::fs::metadata(&dir)
            .await
            .map(|m| m.is_dir() && !m.permissions().readonly())
            .unwrap_or(false);
        if !writable {
            debug!(path = %self.path.display(), "Host map directory is not writable, skipping");
            return Ok(false);
        }

        let file = HostMapFile {
            generated_at: Utc::now(),
            hosts,
        };
        let data = serde_json::to_vec_pretty(&file)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        if let Err(e) = tokio::fs::write(&tmp, &data).await {
            debug!(path = %tmp.display(), error = %e, "Cannot write host map, skipping");
            return Ok(false);
        }
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(path = %self.path.display(), entries = file.hosts.len(), "Wrote host map");
        Ok(true)
    }
}

/// Read a host map file.
pub async fn read_host_map(path: impl AsRef<Path>) -> TenantResult<HostMapFile> {
    let data = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryTenantStore;
    use crate::tenant::TenantId;

    fn tenants() -> Vec<Tenant> {
        vec![
            Tenant::new(TenantId::new(1), "A").with_default_site(true),
            Tenant::new(TenantId::new(2), "B"),
            Tenant::new(TenantId::new(3), "Unbound"),
        ]
    }

    fn bindings() -> Vec<DomainBinding> {
        vec![
            DomainBinding::new(TenantId::new(1), "a.com").with_id(1).primary(),
            DomainBinding::new(TenantId::new(2), "*.b.com").with_id(2),
            DomainBinding::new(TenantId::new(2), "b.com").with_id(3).primary(),
            DomainBinding::new(TenantId::new(2), "shop.www.b.com").with_id(4),
        ]
    }

    #[test]
    fn test_build() {
        let map = HostMap::build(&tenants(), &bindings(), "localhost");

        assert_eq!(map.get("a.com"), Some("a.com"));
        assert_eq!(map.get("*.b.com"), Some("b.com"));
        assert_eq!(map.get("shop.b.com"), Some("b.com"));
        assert_eq!(map.get("default"), Some("a.com"));
        assert_eq!(map.len(), 5);
    }

    #[test]
    fn test_build_is_order_independent() {
        let expected = HostMap::build(&tenants(), &bindings(), "localhost");

        let mut tenants = tenants();
        tenants.reverse();
        let mut bindings = bindings();
        bindings.reverse();
        assert_eq!(HostMap::build(&tenants, &bindings, "localhost"), expected);

        bindings.rotate_left(1);
        tenants.rotate_left(1);
        assert_eq!(HostMap::build(&tenants, &bindings, "localhost"), expected);
    }

    #[test]
    fn test_private_default_is_not_mapped() {
        let tenants = vec![Tenant::new(TenantId::new(1), "A")
            .with_default_site(true)
            .with_public(false)];
        let bindings = vec![DomainBinding::new(TenantId::new(1), "a.com").primary()];
        let map = HostMap::build(&tenants, &bindings, "localhost");
        assert_eq!(map.get("default"), None);
        assert_eq!(map.get("a.com"), Some("a.com"));
    }

    #[tokio::test]
    async fn test_rebuild_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host-map.json");
        let store = InMemoryTenantStore::new()
            .with_tenant(tenants()[0].clone(), vec![bindings()[0].clone()]);

        let writer = HostMapWriter::new(&path);
        assert!(writer.rebuild(&store).await);

        let file = read_host_map(&path).await.unwrap();
        assert_eq!(file.hosts.get("a.com"), Some("a.com"));
        assert!(!dir.path().join("host-map.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_rebuild_disabled_or_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryTenantStore::new();

        let path = dir.path().join("host-map.json");
        let writer = HostMapWriter::new(&path).with_enabled(false);
        assert!(!writer.rebuild(&store).await);
        assert!(!path.exists());

        let missing = dir.path().join("missing").join("host-map.json");
        let writer = HostMapWriter::new(&missing);
        assert!(!writer.rebuild(&store).await);
        assert!(!missing.exists());
    }
}

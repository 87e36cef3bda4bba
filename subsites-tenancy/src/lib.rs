//! Subsites for content-managed sites
//!
//! Partitions one CMS installation into many logical sites ("subsites"),
//! each reached through its own domains and seeing only its own content.
//!
//! # Features
//!
//! - 🌐 **Host Resolution** - Wildcard domain bindings mapped to subsites
//! - 🧭 **Request Context** - Override parameter, session and host precedence
//! - 🔁 **Temporary Switching** - Nested save/restore with drop guards
//! - 🔍 **Query Scoping** - Row-level filtering for subsite-owned tables
//! - 🗺️ **Host Map** - Generated domain map for publishing tooling
//! - 🔐 **Access Control** - Subsites a member may administer
//!
//! # Quick Start
//!
//! ## 1. Implement the stores (with your database)
//!
//! ```rust,ignore
//! use subsites_tenancy::*;
//!
//! struct MySubsiteStore {
//!     db: MyDatabasePool,
//! }
//!
//! #[async_trait]
//! impl TenantStore for MySubsiteStore {
//!     async fn find_by_id(&self, id: TenantId) -> TenantResult<Option<Tenant>> {
//!         self.db.query("SELECT * FROM Subsite WHERE ID = $1", &[id.get()]).await
//!     }
//!
//!     // ... implement other methods
//! }
//! ```
//!
//! ## 2. Resolve subsites per request
//!
//! ```
//! use subsites_tenancy::*;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let store = InMemoryTenantStore::new().with_tenant(
//!     Tenant::new(TenantId::new(1), "Acme"),
//!     vec![DomainBinding::new(TenantId::new(1), "*.acme.com").primary()],
//! );
//! let resolver = Arc::new(HostResolver::new(Arc::new(store)));
//! let middleware = TenantMiddleware::new(resolver);
//!
//! let request = HttpRequest::new("GET", "/").with_header("Host", "shop.acme.com");
//! let id = middleware
//!     .handle(request, MemorySession::default(), |_req, ctx| async move {
//!         ctx.current_tenant_id()
//!     })
//!     .await
//!     .unwrap();
//! assert_eq!(id, TenantId::new(1));
//! # });
//! ```
//!
//! ## 3. Scope queries
//!
//! ```
//! use subsites_tenancy::*;
//!
//! let scoper = QueryScoper::new().register_table("SiteTree", "SubsiteID");
//! let ctx = TenantContext::new(TenantId::new(1));
//!
//! let mut query = SelectQuery::new("SiteTree");
//! scoper.scope_select(&ctx, &mut query);
//!
//! // Read across every subsite
//! let all = ctx.run_unfiltered(|| {
//!     let mut query = SelectQuery::new("SiteTree");
//!     scoper.scope_select(&ctx, &mut query);
//!     query.to_sql()
//! });
//! assert_eq!(all, r#"SELECT * FROM "SiteTree""#);
//! ```

pub mod admin;
pub mod context;
pub mod directory;
pub mod domain;
pub mod error;
pub mod hostmap;
pub mod locale;
pub mod middleware;
pub mod permission;
pub mod request;
pub mod resolver;
pub mod scoping;
pub mod session;
pub mod store;
pub mod tenant;

pub use admin::{
    ALL_GROUPS_ID, AccessCheck, AdminSection, ChangeOutcome, SubsiteAdmin, SwitcherEntry,
    SwitcherOption, SwitcherView,
};
pub use context::{FilterGuard, TenantContext, TenantContextBuilder, TenantGuard};
pub use directory::TenantDirectory;
pub use domain::{DomainPattern, canonicalize, validate_binding};
pub use error::{TenantError, TenantResult};
pub use hostmap::{HostMap, HostMapFile, HostMapWriter, read_host_map};
pub use locale::likely_locale;
pub use middleware::{TenantMiddleware, current_tenant_id};
pub use permission::{
    Capability, Group, NoopPermissionCache, PermissionCache, PermissionDefinition,
    PermissionOracle, PrincipalId, provided_permissions,
};
pub use request::HttpRequest;
pub use resolver::HostResolver;
pub use scoping::{ForcedTenants, QueryScoper, SelectQuery, TenantPredicate, TenantScoped};
pub use session::{MemorySession, SessionData, SessionSlot};
pub use store::{AccessStore, InMemoryAccessStore, InMemoryTenantStore, TenantStore};
pub use tenant::{DomainBinding, Tenant, TenantId, TenantTarget};

pub use async_trait::async_trait;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::admin::{AdminSection, SubsiteAdmin};
    pub use crate::context::TenantContext;
    pub use crate::directory::TenantDirectory;
    pub use crate::error::{TenantError, TenantResult};
    pub use crate::middleware::TenantMiddleware;
    pub use crate::permission::{Capability, PermissionCache, PermissionOracle, PrincipalId};
    pub use crate::resolver::HostResolver;
    pub use crate::scoping::{QueryScoper, TenantScoped};
    pub use crate::session::SessionSlot;
    pub use crate::store::{AccessStore, TenantStore};
    pub use crate::tenant::{DomainBinding, Tenant, TenantId};
}

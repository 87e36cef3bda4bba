//! Subsite Middleware
//!
//! Builds the subsite context for each request and installs it for the
//! handler.

use crate::context::TenantContext;
use crate::error::TenantResult;
use crate::permission::{NoopPermissionCache, PermissionCache};
use crate::request::HttpRequest;
use crate::resolver::HostResolver;
use crate::scoping::ForcedTenants;
use crate::session::SessionSlot;
use crate::tenant::TenantId;
use std::future::Future;
use std::sync::Arc;
use subsites_config::SubsitesConfig;
use tracing::{debug, trace};

/// Subsite middleware
///
/// Resolves the host subsite, reads the override parameter and wraps the
/// handler in a [`TenantContext::scope`].
pub struct TenantMiddleware {
    resolver: Arc<HostResolver>,
    config: SubsitesConfig,
    permissions: Arc<dyn PermissionCache>,
}

impl TenantMiddleware {
    /// Create new subsite middleware
    ///
    /// # Examples
    ///
    /// ```
    /// use subsites_tenancy::{HostResolver, InMemoryTenantStore, TenantMiddleware};
    /// use std::sync::Arc;
    ///
    /// let resolver = Arc::new(HostResolver::new(Arc::new(InMemoryTenantStore::new())));
    /// let middleware = TenantMiddleware::new(resolver);
    /// ```
    pub fn new(resolver: Arc<HostResolver>) -> Self {
        Self {
            resolver,
            config: SubsitesConfig::default(),
            permissions: Arc::new(NoopPermissionCache),
        }
    }

    /// Use settings from `config`
    pub fn with_config(mut self, config: SubsitesConfig) -> Self {
        self.config = config;
        self
    }

    /// Cache flushed when a request switches subsite
    pub fn with_permission_cache(mut self, cache: Arc<dyn PermissionCache>) -> Self {
        self.permissions = cache;
        self
    }

    /// Build the context for `request`.
    ///
    /// The host is resolved here, once per request. The session slot is read
    /// under the configured `session_key`.
    pub async fn build_context(
        &self,
        request: &HttpRequest,
        mut session: impl SessionSlot + 'static,
    ) -> TenantResult<TenantContext> {
        session.use_key(&self.config.session_key);
        let host_tenant = self.resolver.resolve(request.host(), true).await?;
        let override_param = request
            .query(&self.config.override_param)
            .and_then(TenantId::parse);

        let ctx = TenantContext::builder(host_tenant)
            .override_param(override_param)
            .session(session)
            .permission_cache(self.permissions.clone())
            .selection_disabled(self.config.disable_selection)
            .build();

        if self.config.disable_filter {
            ctx.set_filtering_disabled(true);
        }
        if let Some(raw) = self.config.force_subsites.as_deref() {
            ctx.force_tenants(Some(ForcedTenants::parse(raw)?));
        }

        trace!(
            host = %request.host(),
            host_subsite = %host_tenant,
            subsite = %ctx.current_tenant_id(),
            "Built subsite context"
        );
        Ok(ctx)
    }

    /// Run `next` with the request's context installed.
    pub async fn handle<S, F, Fut>(
        &self,
        request: HttpRequest,
        session: S,
        next: F,
    ) -> TenantResult<Fut::Output>
    where
        S: SessionSlot + 'static,
        F: FnOnce(HttpRequest, TenantContext) -> Fut,
        Fut: Future,
    {
        let ctx = self.build_context(&request, session).await?;
        Ok(TenantContext::scope(ctx.clone(), next(request, ctx)).await)
    }

    /// Absolute base URL of the active subsite: its primary domain followed
    /// by the configured `base_path`.
    pub async fn absolute_base_url(
        &self,
        ctx: &TenantContext,
        request: &HttpRequest,
    ) -> TenantResult<Option<String>> {
        let store = self.resolver.store();
        let Some(tenant) = ctx.current_tenant(store.as_ref()).await? else {
            return Ok(None);
        };
        let bindings = store.domains_for(tenant.id).await?;
        Ok(tenant.absolute_base_url(&bindings, request.host(), &self.config.base_path))
    }

    /// Where to redirect a live request that did not arrive on the active
    /// subsite's primary domain.
    ///
    /// Returns `None` when redirects are disabled, off live, for command-line
    /// requests, and when the host already is the primary domain.
    pub async fn primary_domain_redirect(
        &self,
        ctx: &TenantContext,
        request: &HttpRequest,
        live: bool,
    ) -> TenantResult<Option<String>> {
        if !self.config.redirect_to_primary || !live || request.cli {
            return Ok(None);
        }

        let store = self.resolver.store();
        let Some(tenant) = ctx.current_tenant(store.as_ref()).await? else {
            return Ok(None);
        };
        let bindings = store.domains_for(tenant.id).await?;
        let host = request.host();

        match tenant.primary_domain(&bindings, host) {
            Some(primary) if primary != host => {
                let location = format!("{}://{}{}", request.scheme(), primary, request.uri());
                debug!(from = %host, to = %location, "Redirecting to primary domain");
                Ok(Some(location))
            }
            _ => Ok(None),
        }
    }
}

/// Extract the active subsite ID inside a handler.
pub fn current_tenant_id() -> Option<TenantId> {
    TenantContext::current().map(|ctx| ctx.current_tenant_id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MemorySession, SessionData};
    use crate::store::InMemoryTenantStore;
    use crate::tenant::{DomainBinding, Tenant};
    use parking_lot::Mutex;

    fn resolver() -> Arc<HostResolver> {
        let store = InMemoryTenantStore::new()
            .with_tenant(
                Tenant::new(TenantId::new(1), "A"),
                vec![DomainBinding::new(TenantId::new(1), "a.com").primary()],
            )
            .with_tenant(
                Tenant::new(TenantId::new(2), "B"),
                vec![
                    DomainBinding::new(TenantId::new(2), "b.com").primary(),
                    DomainBinding::new(TenantId::new(2), "*.b.com"),
                ],
            );
        Arc::new(HostResolver::new(Arc::new(store)))
    }

    fn request(host: &str) -> HttpRequest {
        HttpRequest::new("GET", "/about").with_header("Host", host)
    }

    #[tokio::test]
    async fn test_handle_installs_context() {
        let middleware = TenantMiddleware::new(resolver());

        let seen = middleware
            .handle(request("www.b.com"), MemorySession::default(), |_req, ctx| async move {
                (ctx.current_tenant_id(), current_tenant_id())
            })
            .await
            .unwrap();
        assert_eq!(seen, (TenantId::new(2), Some(TenantId::new(2))));
        assert_eq!(current_tenant_id(), None);
    }

    #[tokio::test]
    async fn test_override_param() {
        let middleware = TenantMiddleware::new(resolver());

        let req = request("a.com").with_query("SubsiteID", "2");
        let ctx = middleware.build_context(&req, MemorySession::default()).await.unwrap();
        assert_eq!(ctx.current_tenant_id(), TenantId::new(2));

        let req = request("a.com").with_query("SubsiteID", "two");
        let ctx = middleware.build_context(&req, MemorySession::default()).await.unwrap();
        assert_eq!(ctx.current_tenant_id(), TenantId::new(1));
    }

    #[tokio::test]
    async fn test_switch_persists_to_shared_session() {
        let middleware = TenantMiddleware::new(resolver());
        let session = Arc::new(Mutex::new(SessionData::new()));

        middleware
            .handle(request("a.com"), session.clone(), |_req, ctx| async move {
                ctx.switch_tenant(TenantId::new(2));
            })
            .await
            .unwrap();
        assert_eq!(
            session.lock().data.get("SubsiteID"),
            Some(&serde_json::json!(2))
        );
    }

    #[tokio::test]
    async fn test_session_key_from_config() {
        let config = SubsitesConfig {
            session_key: "Site".to_string(),
            ..SubsitesConfig::default()
        };
        let middleware = TenantMiddleware::new(resolver()).with_config(config);

        let mut data = std::collections::HashMap::new();
        data.insert("Site".to_string(), serde_json::json!(7));
        let session = Arc::new(Mutex::new(SessionData::from_map(data)));

        let ctx = middleware
            .build_context(&request("a.com"), session.clone())
            .await
            .unwrap();
        assert_eq!(ctx.current_tenant_id(), TenantId::new(7));

        ctx.switch_tenant(TenantId::new(2));
        let session = session.lock();
        assert_eq!(session.data.get("Site"), Some(&serde_json::json!(2)));
        assert_eq!(session.data.get("SubsiteID"), None);
    }

    #[tokio::test]
    async fn test_absolute_base_url_uses_base_path() {
        let config = SubsitesConfig {
            base_path: "/site/".to_string(),
            ..SubsitesConfig::default()
        };
        let middleware = TenantMiddleware::new(resolver()).with_config(config);

        let req = request("shop.b.com");
        let ctx = middleware.build_context(&req, MemorySession::default()).await.unwrap();
        assert_eq!(
            middleware.absolute_base_url(&ctx, &req).await.unwrap().as_deref(),
            Some("http://b.com/site/")
        );

        let req = request("unknown.org");
        let ctx = middleware.build_context(&req, MemorySession::default()).await.unwrap();
        assert_eq!(middleware.absolute_base_url(&ctx, &req).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_config_flags() {
        let config = SubsitesConfig {
            disable_selection: true,
            disable_filter: true,
            force_subsites: Some("1,2".to_string()),
            ..SubsitesConfig::default()
        };
        let middleware = TenantMiddleware::new(resolver()).with_config(config);

        let req = request("b.com").with_query("SubsiteID", "1");
        let ctx = middleware
            .build_context(&req, MemorySession(Some(TenantId::new(1))))
            .await
            .unwrap();
        assert_eq!(ctx.current_tenant_id(), TenantId::new(2));
        assert!(!ctx.is_filtering_enabled());
        assert_eq!(
            ctx.forced_tenants().map(|f| f.ids().to_vec()),
            Some(vec![TenantId::new(1), TenantId::new(2)])
        );
    }

    #[tokio::test]
    async fn test_primary_domain_redirect() {
        let config = SubsitesConfig {
            redirect_to_primary: true,
            ..SubsitesConfig::default()
        };
        let middleware = TenantMiddleware::new(resolver()).with_config(config);

        let req = request("shop.b.com").with_query("page", "2");
        let ctx = middleware.build_context(&req, MemorySession::default()).await.unwrap();
        let location = middleware.primary_domain_redirect(&ctx, &req, true).await.unwrap();
        assert_eq!(location.as_deref(), Some("http://b.com/about?page=2"));

        assert_eq!(middleware.primary_domain_redirect(&ctx, &req, false).await.unwrap(), None);
        let cli = req.clone().with_cli(true);
        assert_eq!(middleware.primary_domain_redirect(&ctx, &cli, true).await.unwrap(), None);

        let req = request("b.com");
        let ctx = middleware.build_context(&req, MemorySession::default()).await.unwrap();
        assert_eq!(middleware.primary_domain_redirect(&ctx, &req, true).await.unwrap(), None);

        let req = request("unknown.org");
        let ctx = middleware.build_context(&req, MemorySession::default()).await.unwrap();
        assert_eq!(middleware.primary_domain_redirect(&ctx, &req, true).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_redirect_disabled_by_default() {
        let middleware = TenantMiddleware::new(resolver());
        let req = request("shop.b.com");
        let ctx = middleware.build_context(&req, MemorySession::default()).await.unwrap();
        assert_eq!(middleware.primary_domain_redirect(&ctx, &req, true).await.unwrap(), None);
    }
}

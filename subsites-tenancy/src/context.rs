//! Request-scoped subsite context
//!
//! A [`TenantContext`] holds everything needed to answer "which subsite is
//! active?" for one request: the subsite resolved from the host, the
//! override parameter, the session slot and the filtering flags. It also
//! keeps two save/restore stacks so code can temporarily act as another
//! subsite, or read across all subsites, and reliably put things back.
//!
//! The context is a cheap cloneable handle. Install it for a request with
//! [`TenantContext::scope`] and read it anywhere below with
//! [`TenantContext::current`].
//!
//! # Examples
//!
//! ```
//! use subsites_tenancy::{TenantContext, TenantId};
//!
//! let ctx = TenantContext::new(TenantId::new(1));
//!
//! let inner = ctx.run_with_tenant(TenantId::new(2), || ctx.current_tenant_id());
//! assert_eq!(inner, TenantId::new(2));
//! assert_eq!(ctx.current_tenant_id(), TenantId::new(1));
//! assert!(ctx.is_filtering_enabled());
//! ```

use crate::error::TenantResult;
use crate::locale::likely_locale;
use crate::permission::{NoopPermissionCache, PermissionCache};
use crate::scoping::ForcedTenants;
use crate::session::{MemorySession, SessionSlot};
use crate::store::TenantStore;
use crate::tenant::{Tenant, TenantId, TenantTarget};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

tokio::task_local! {
    static CURRENT_CONTEXT: TenantContext;
}

struct ContextState {
    host_tenant: TenantId,
    override_param: Option<TenantId>,
    session: Box<dyn SessionSlot>,
    filtering_disabled: bool,
    selection_disabled: bool,
    forced: Option<ForcedTenants>,
    locale: Option<String>,
    filter_stack: Vec<bool>,
    tenant_stack: Vec<TenantId>,
}

impl ContextState {
    fn current(&self) -> TenantId {
        if self.selection_disabled {
            return self.host_tenant;
        }
        if let Some(id) = self.override_param {
            return id;
        }
        if let Some(id) = self.session.tenant_id() {
            return id;
        }
        self.host_tenant
    }
}

/// Request-scoped subsite state.
#[derive(Clone)]
pub struct TenantContext {
    state: Arc<Mutex<ContextState>>,
    permissions: Arc<dyn PermissionCache>,
}

impl TenantContext {
    /// Context for a request whose host resolved to `host_tenant`, with an
    /// empty session.
    pub fn new(host_tenant: TenantId) -> Self {
        Self::builder(host_tenant).build()
    }

    /// Start building a context.
    pub fn builder(host_tenant: TenantId) -> TenantContextBuilder {
        TenantContextBuilder::new(host_tenant)
    }

    /// Run `fut` with `ctx` installed as the current context.
    pub async fn scope<F>(ctx: TenantContext, fut: F) -> F::Output
    where
        F: Future,
    {
        CURRENT_CONTEXT.scope(ctx, fut).await
    }

    /// The context installed by [`TenantContext::scope`], if any.
    pub fn current() -> Option<TenantContext> {
        CURRENT_CONTEXT.try_with(|ctx| ctx.clone()).ok()
    }

    /// The active subsite ID.
    ///
    /// With selection disabled only the host is consulted. Otherwise the
    /// override parameter wins, then the session, then the host.
    pub fn current_tenant_id(&self) -> TenantId {
        self.state.lock().current()
    }

    /// Subsite resolved from the request host
    pub fn host_tenant_id(&self) -> TenantId {
        self.state.lock().host_tenant
    }

    /// Subsite stored in the session
    pub fn session_tenant_id(&self) -> Option<TenantId> {
        self.state.lock().session.tenant_id()
    }

    /// Whether a real subsite (not the main site) is active.
    pub fn is_tenant(&self) -> bool {
        !self.current_tenant_id().is_main()
    }

    /// Load the active subsite record. The main site yields `None`.
    pub async fn current_tenant(&self, store: &dyn TenantStore) -> TenantResult<Option<Tenant>> {
        let id = self.current_tenant_id();
        if id.is_main() {
            return Ok(None);
        }
        store.find_by_id(id).await
    }

    /// Make `target` the active subsite.
    ///
    /// Stores the ID in the session and drops the override parameter. A
    /// subsite with a known language also sets the active locale. Cached
    /// permissions are flushed only when the active subsite changed.
    pub fn switch_tenant(&self, target: impl Into<TenantTarget>) {
        let target = target.into();
        let (previous, current) = {
            let mut state = self.state.lock();
            let previous = state.current();
            state.session.set_tenant_id(target.id());
            state.override_param = None;
            if let Some(locale) = target.language().and_then(likely_locale) {
                state.locale = Some(locale);
            }
            (previous, state.current())
        };

        if previous != current {
            debug!(from = %previous, to = %current, "Switched subsite");
            self.permissions.flush();
        }
    }

    /// Locale activated by the last switch, if any
    pub fn locale(&self) -> Option<String> {
        self.state.lock().locale.clone()
    }

    /// Whether subsite filtering applies to queries.
    pub fn is_filtering_enabled(&self) -> bool {
        !self.state.lock().filtering_disabled
    }

    /// Set the filtering flag without saving the previous value.
    pub fn set_filtering_disabled(&self, disabled: bool) {
        self.state.lock().filtering_disabled = disabled;
    }

    /// Save the filtering flag and replace it with `disabled`.
    pub fn disable_filtering(&self, disabled: bool) {
        let mut state = self.state.lock();
        let saved = state.filtering_disabled;
        state.filter_stack.push(saved);
        state.filtering_disabled = disabled;
    }

    /// Restore the last saved filtering flag. Does nothing when none is saved.
    pub fn restore_filtering(&self) {
        let mut state = self.state.lock();
        if let Some(saved) = state.filter_stack.pop() {
            state.filtering_disabled = saved;
        }
    }

    /// Ignore the override parameter and the session.
    pub fn set_selection_disabled(&self, disabled: bool) {
        self.state.lock().selection_disabled = disabled;
    }

    /// Whether selection is disabled
    pub fn is_selection_disabled(&self) -> bool {
        self.state.lock().selection_disabled
    }

    /// Force scoped queries to read from a fixed set of subsites.
    pub fn force_tenants(&self, forced: Option<ForcedTenants>) {
        self.state.lock().forced = forced;
    }

    /// Forced subsites, if any
    pub fn forced_tenants(&self) -> Option<ForcedTenants> {
        self.state.lock().forced.clone()
    }

    /// Save the active subsite and switch to `target`.
    ///
    /// Returns `false` without saving anything when `target` is already
    /// active.
    pub fn push_tenant(&self, target: impl Into<TenantTarget>) -> bool {
        let target = target.into();
        {
            let mut state = self.state.lock();
            let current = state.current();
            if current == target.id() {
                return false;
            }
            state.tenant_stack.push(current);
        }
        self.switch_tenant(target);
        true
    }

    /// Switch back to the last saved subsite.
    ///
    /// Returns `false` when nothing was saved.
    pub fn pop_tenant(&self) -> bool {
        let saved = self.state.lock().tenant_stack.pop();
        match saved {
            Some(id) => {
                self.switch_tenant(id);
                true
            }
            None => false,
        }
    }

    /// Number of saved subsites
    pub fn stack_depth(&self) -> usize {
        self.state.lock().tenant_stack.len()
    }

    /// Number of saved filtering flags
    pub fn filter_depth(&self) -> usize {
        self.state.lock().filter_stack.len()
    }

    /// Act as `target` until the guard is dropped.
    pub fn scoped_tenant(&self, target: impl Into<TenantTarget>) -> TenantGuard {
        let pushed = self.push_tenant(target);
        TenantGuard {
            ctx: self.clone(),
            pushed,
        }
    }

    /// Disable filtering until the guard is dropped.
    pub fn scoped_unfiltered(&self) -> FilterGuard {
        self.disable_filtering(true);
        FilterGuard { ctx: self.clone() }
    }

    /// Run `f` as `target` with filtering disabled.
    ///
    /// The previous subsite and filtering flag are restored however `f`
    /// exits, including by panic.
    ///
    /// # Examples
    ///
    /// ```
    /// use subsites_tenancy::{TenantContext, TenantId};
    ///
    /// let ctx = TenantContext::new(TenantId::new(1));
    /// let result: Result<(), &str> = ctx.run_with_tenant(TenantId::new(2), || Err("failed"));
    /// assert!(result.is_err());
    /// assert_eq!(ctx.current_tenant_id(), TenantId::new(1));
    /// ```
    pub fn run_with_tenant<T>(&self, target: impl Into<TenantTarget>, f: impl FnOnce() -> T) -> T {
        let _filter = self.scoped_unfiltered();
        let _tenant = self.scoped_tenant(target);
        f()
    }

    /// Async form of [`TenantContext::run_with_tenant`].
    pub async fn run_with_tenant_async<F>(&self, target: impl Into<TenantTarget>, fut: F) -> F::Output
    where
        F: Future,
    {
        let _filter = self.scoped_unfiltered();
        let _tenant = self.scoped_tenant(target);
        fut.await
    }

    /// Run `f` as the main site.
    pub fn run_without_tenant<T>(&self, f: impl FnOnce() -> T) -> T {
        self.run_with_tenant(TenantId::MAIN, f)
    }

    /// Run `f` reading across all subsites, keeping the active subsite.
    pub fn run_unfiltered<T>(&self, f: impl FnOnce() -> T) -> T {
        let _filter = self.scoped_unfiltered();
        f()
    }
}

impl fmt::Debug for TenantContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TenantContext")
            .field("host_tenant", &state.host_tenant)
            .field("current", &state.current())
            .field("filtering_disabled", &state.filtering_disabled)
            .field("selection_disabled", &state.selection_disabled)
            .field("tenant_stack", &state.tenant_stack)
            .finish()
    }
}

/// Builder for [`TenantContext`].
pub struct TenantContextBuilder {
    host_tenant: TenantId,
    override_param: Option<TenantId>,
    session: Box<dyn SessionSlot>,
    permissions: Arc<dyn PermissionCache>,
    selection_disabled: bool,
}

impl TenantContextBuilder {
    fn new(host_tenant: TenantId) -> Self {
        Self {
            host_tenant,
            override_param: None,
            session: Box::new(MemorySession::default()),
            permissions: Arc::new(NoopPermissionCache),
            selection_disabled: false,
        }
    }

    /// Subsite requested through the override parameter
    pub fn override_param(mut self, id: Option<TenantId>) -> Self {
        self.override_param = id;
        self
    }

    /// Session slot backing the selection
    pub fn session(mut self, session: impl SessionSlot + 'static) -> Self {
        self.session = Box::new(session);
        self
    }

    /// Cache flushed when the active subsite changes
    pub fn permission_cache(mut self, cache: Arc<dyn PermissionCache>) -> Self {
        self.permissions = cache;
        self
    }

    /// Ignore the override parameter and the session
    pub fn selection_disabled(mut self, disabled: bool) -> Self {
        self.selection_disabled = disabled;
        self
    }

    /// Build the context
    pub fn build(self) -> TenantContext {
        TenantContext {
            state: Arc::new(Mutex::new(ContextState {
                host_tenant: self.host_tenant,
                override_param: self.override_param,
                session: self.session,
                filtering_disabled: false,
                selection_disabled: self.selection_disabled,
                forced: None,
                locale: None,
                filter_stack: Vec::new(),
                tenant_stack: Vec::new(),
            })),
            permissions: self.permissions,
        }
    }
}

/// Restores the previous subsite on drop.
#[must_use = "the previous subsite is restored when the guard is dropped"]
pub struct TenantGuard {
    ctx: TenantContext,
    pushed: bool,
}

impl TenantGuard {
    /// Whether a switch happened
    pub fn pushed(&self) -> bool {
        self.pushed
    }
}

impl Drop for TenantGuard {
    fn drop(&mut self) {
        if self.pushed {
            self.ctx.pop_tenant();
        }
    }
}

/// Restores the previous filtering flag on drop.
#[must_use = "filtering is restored when the guard is dropped"]
pub struct FilterGuard {
    ctx: TenantContext,
}

impl Drop for FilterGuard {
    fn drop(&mut self) {
        self.ctx.restore_filtering();
    }
}

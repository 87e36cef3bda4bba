//! Session slot holding the selected subsite.
//!
//! Sessions are owned by the host application. Subsites reads and writes a
//! single integer slot through [`SessionSlot`].

use crate::tenant::TenantId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Default session key for the selected subsite.
pub const DEFAULT_SESSION_KEY: &str = "SubsiteID";

/// The session slot storing the selected subsite.
pub trait SessionSlot: Send {
    /// Subsite stored in the session, if any
    fn tenant_id(&self) -> Option<TenantId>;

    /// Store the selected subsite
    fn set_tenant_id(&mut self, id: TenantId);

    /// Name the key holding the subsite. Slots without keys ignore it.
    fn use_key(&mut self, _key: &str) {}
}

/// Session data as key-value pairs, in the shape used by session stores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionData {
    /// Session data
    pub data: HashMap<String, serde_json::Value>,
    #[serde(skip)]
    key: Option<String>,
}

impl SessionData {
    /// Create empty session data using the default key.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap existing session data.
    pub fn from_map(data: HashMap<String, serde_json::Value>) -> Self {
        Self { data, key: None }
    }

    /// Use another key for the subsite slot
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    fn key(&self) -> &str {
        self.key.as_deref().unwrap_or(DEFAULT_SESSION_KEY)
    }
}

impl SessionSlot for SessionData {
    fn tenant_id(&self) -> Option<TenantId> {
        match self.data.get(self.key())? {
            serde_json::Value::Number(n) => n.as_u64().map(TenantId::new),
            serde_json::Value::String(s) => TenantId::parse(s),
            _ => None,
        }
    }

    fn set_tenant_id(&mut self, id: TenantId) {
        let key = self.key().to_string();
        self.data.insert(key, serde_json::Value::from(id.get()));
    }

    fn use_key(&mut self, key: &str) {
        self.key = Some(key.to_string());
    }
}

/// A session that only holds the subsite slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemorySession(pub Option<TenantId>);

impl SessionSlot for MemorySession {
    fn tenant_id(&self) -> Option<TenantId> {
        self.0
    }

    fn set_tenant_id(&mut self, id: TenantId) {
        self.0 = Some(id);
    }
}

/// Shared session, so the caller can persist it after the request.
impl<S: SessionSlot> SessionSlot for Arc<Mutex<S>> {
    fn tenant_id(&self) -> Option<TenantId> {
        self.lock().tenant_id()
    }

    fn set_tenant_id(&mut self, id: TenantId) {
        self.lock().set_tenant_id(id);
    }

    fn use_key(&mut self, key: &str) {
        self.lock().use_key(key);
    }
}

// Subsites - many logical sites from one CMS installation
//
// This library resolves the subsite for each request from its host, keeps the
// active subsite in a request-scoped context and scopes queries to it.

// Re-export core functionality
pub use subsites_tenancy::*;

// Configuration is always available; the context needs it
pub use subsites_config;
pub use subsites_config::SubsitesConfig;

#[cfg(feature = "log")]
pub use subsites_log;

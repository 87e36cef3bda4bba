//! Inbound request as seen by subsites.

use std::collections::{BTreeMap, HashMap};

/// The parts of an HTTP request subsites needs.
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub query_params: HashMap<String, String>,
    /// Request issued from the command line rather than over HTTP
    pub cli: bool,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    /// Add a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Add a query parameter
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(name.into(), value.into());
        self
    }

    /// Mark as a command-line request
    pub fn with_cli(mut self, cli: bool) -> Self {
        self.cli = cli;
        self
    }

    /// Header value, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Query parameter value
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(String::as_str)
    }

    /// The `Host` header, or an empty string.
    pub fn host(&self) -> &str {
        self.header("host").unwrap_or("")
    }

    /// `https` behind a TLS-terminating proxy, otherwise `http`.
    pub fn scheme(&self) -> &str {
        match self.header("x-forwarded-proto") {
            Some(proto) if proto.eq_ignore_ascii_case("https") => "https",
            _ => "http",
        }
    }

    /// Path plus query string, with parameters in name order.
    pub fn uri(&self) -> String {
        if self.query_params.is_empty() {
            return self.path.clone();
        }
        let sorted: BTreeMap<&String, &String> = self.query_params.iter().collect();
        let query: Vec<String> = sorted.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        format!("{}?{}", self.path, query.join("&"))
    }
}

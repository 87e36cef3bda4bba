//! Domain Matching
//!
//! Host canonicalization, wildcard binding patterns and binding validation.

use crate::error::TenantError;
use crate::tenant::{DomainBinding, TenantId};
use once_cell::sync::Lazy;
use regex::Regex;

static PORT_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r":\d+$").expect("valid port regex"));

/// Known top-level domains, longest first where they overlap.
pub const KNOWN_TLDS: &[&str] = &[".com.au", ".net.au", ".org.au", ".com", ".net", ".org"];

/// Canonicalize a raw `Host` value.
///
/// Strips a leading `www.`, then a leading `staging.`, then a trailing
/// `:port`. The steps are repeated until the host stops changing so that
/// canonicalizing twice is the same as canonicalizing once.
///
/// # Examples
///
/// ```
/// use subsites_tenancy::domain::canonicalize;
///
/// assert_eq!(canonicalize("www.example.com"), "example.com");
/// assert_eq!(canonicalize("staging.example.com"), "example.com");
/// assert_eq!(canonicalize("example.com:8080"), "example.com");
/// assert_eq!(canonicalize("www.staging.example.com:80"), "example.com");
/// ```
pub fn canonicalize(raw_host: &str) -> String {
    let mut host = raw_host.to_string();
    loop {
        let mut next = host.as_str();
        next = next.strip_prefix("www.").unwrap_or(next);
        next = next.strip_prefix("staging.").unwrap_or(next);
        let next = PORT_SUFFIX.replace(next, "").into_owned();
        if next == host {
            return host;
        }
        host = next;
    }
}

/// A compiled domain binding pattern.
///
/// `*` matches any run of characters (SQL `LIKE '%'` semantics); everything
/// else matches literally and case-sensitively.
#[derive(Debug, Clone)]
pub struct DomainPattern {
    raw: String,
    regex: Regex,
}

impl DomainPattern {
    /// Compile a pattern.
    ///
    /// # Examples
    ///
    /// ```
    /// use subsites_tenancy::domain::DomainPattern;
    ///
    /// let pattern = DomainPattern::new("*.example.com").unwrap();
    /// assert!(pattern.matches("foo.example.com"));
    /// assert!(pattern.matches("bar.baz.example.com"));
    /// assert!(!pattern.matches("example.com"));
    /// ```
    pub fn new(raw: impl Into<String>) -> Result<Self, TenantError> {
        let raw = raw.into();
        let body = raw
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{}$", body))
            .map_err(|e| TenantError::Invalid(format!("domain pattern '{}': {}", raw, e)))?;
        Ok(Self { raw, regex })
    }

    /// The pattern as stored.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the pattern contains a wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.raw.contains('*')
    }

    /// Match a canonical host. An empty host never matches.
    pub fn matches(&self, canonical_host: &str) -> bool {
        !canonical_host.is_empty() && self.regex.is_match(canonical_host)
    }
}

/// Return the known TLD a domain ends with.
pub fn tld(domain: &str) -> Option<&'static str> {
    KNOWN_TLDS.iter().copied().find(|tld| domain.ends_with(tld))
}

/// Domain without its known TLD.
pub fn strip_tld(domain: &str) -> &str {
    match tld(domain) {
        Some(tld) => &domain[..domain.len() - tld.len()],
        None => domain,
    }
}

/// Whether the domain has more than one label before its TLD.
pub fn is_subdomain(domain: &str) -> bool {
    strip_tld(domain).find('.').is_some_and(|pos| pos > 0)
}

/// Labels of the domain without its TLD.
pub fn labels(domain: &str) -> Vec<&str> {
    strip_tld(domain).split('.').collect()
}

/// Validate a binding before it is written.
///
/// `owner_title` looks up the title of the subsite already holding a domain,
/// for the user-facing message.
pub fn validate_binding<F>(
    candidate: &DomainBinding,
    existing: &[DomainBinding],
    owner_title: F,
) -> Result<(), TenantError>
where
    F: Fn(TenantId) -> Option<String>,
{
    let domain = candidate.domain.trim();
    if domain.is_empty() {
        return Err(TenantError::Validation(
            "A domain name is required".to_string(),
        ));
    }

    if domain.get(..4).is_some_and(|prefix| prefix.eq_ignore_ascii_case("www.")) {
        return Err(TenantError::Validation(format!(
            "You cannot add a www. subdomain, www is handled automatically. Add the root domain ({}) instead.",
            &domain[4..]
        )));
    }

    let conflict = existing.iter().find(|b| {
        b.domain.trim() == domain
            && b.tenant_id != candidate.tenant_id
            && (candidate.id == 0 || b.id != candidate.id)
    });

    if let Some(other) = conflict {
        let title = owner_title(other.tenant_id).unwrap_or_else(|| other.tenant_id.to_string());
        return Err(TenantError::Validation(format!(
            "The domain '{}' is already in the system (Subsite: {})",
            domain, title
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_examples() {
        assert_eq!(canonicalize("www.example.com"), "example.com");
        assert_eq!(canonicalize("staging.example.com"), "example.com");
        assert_eq!(canonicalize("example.com:8080"), "example.com");
        assert_eq!(canonicalize("example.com"), "example.com");
        assert_eq!(canonicalize(""), "");
    }

    #[test]
    fn test_canonicalize_only_strips_leading_labels() {
        assert_eq!(
            canonicalize("shop.www.example.com"),
            "shop.www.example.com"
        );
        assert_eq!(canonicalize("mystaging.example.com"), "mystaging.example.com");
    }

    #[test]
    fn test_canonicalize_idempotent() {
        let hosts = [
            "www.www.example.com",
            "staging.www.example.com:81",
            "example.com:80:90",
            "www.",
            "staging.www.staging.a.b",
            "a.com",
            ":8080",
        ];
        for host in hosts {
            let once = canonicalize(host);
            assert_eq!(canonicalize(&once), once, "host {host}");
        }
    }

    #[test]
    fn test_literal_pattern() {
        let pattern = DomainPattern::new("a.com").unwrap();
        assert!(pattern.matches("a.com"));
        assert!(!pattern.matches("xa.com"));
        assert!(!pattern.matches("a.com.au"));
        assert!(!pattern.matches("A.com"));
        assert!(!pattern.is_wildcard());
    }

    #[test]
    fn test_wildcard_pattern() {
        let pattern = DomainPattern::new("*.example.com").unwrap();
        assert!(pattern.is_wildcard());
        assert!(pattern.matches("foo.example.com"));
        assert!(pattern.matches("bar.baz.example.com"));
        assert!(!pattern.matches("example.com"));
        assert!(!pattern.matches("fooexample.com"));
        assert!(!pattern.matches(""));
    }

    #[test]
    fn test_pattern_escapes_regex_metacharacters() {
        let pattern = DomainPattern::new("a+b.com").unwrap();
        assert!(pattern.matches("a+b.com"));
        assert!(!pattern.matches("aab.com"));

        let dotted = DomainPattern::new("a.com").unwrap();
        assert!(!dotted.matches("abcom"));
    }

    #[test]
    fn test_tld_helpers() {
        assert_eq!(tld("shop.example.com.au"), Some(".com.au"));
        assert_eq!(tld("example.io"), None);
        assert_eq!(strip_tld("shop.example.com"), "shop.example");
        assert!(is_subdomain("shop.example.com"));
        assert!(!is_subdomain("example.com"));
        assert_eq!(labels("shop.example.net"), vec!["shop", "example"]);
    }

    #[test]
    fn test_validate_rejects_www() {
        let binding = DomainBinding::new(TenantId::new(1), "WWW.example.com");
        let err = validate_binding(&binding, &[], |_| None).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("(example.com)"));
    }

    #[test]
    fn test_validate_rejects_domain_of_other_tenant() {
        let existing = vec![DomainBinding::new(TenantId::new(2), "b.com").with_id(7)];
        let binding = DomainBinding::new(TenantId::new(1), "b.com");
        let err = validate_binding(&binding, &existing, |id| {
            (id == TenantId::new(2)).then(|| "Bravo".to_string())
        })
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "The domain 'b.com' is already in the system (Subsite: Bravo)"
        );
    }

    #[test]
    fn test_validate_ignores_surrounding_whitespace() {
        let existing = vec![DomainBinding::new(TenantId::new(2), "b.com").with_id(7)];
        let binding = DomainBinding::new(TenantId::new(1), "  b.com\t");
        let err = validate_binding(&binding, &existing, |_| None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "The domain 'b.com' is already in the system (Subsite: 2)"
        );
    }

    #[test]
    fn test_validate_accepts_rebinding_same_tenant() {
        let existing = vec![DomainBinding::new(TenantId::new(1), "a.com").with_id(3)];
        let binding = DomainBinding::new(TenantId::new(1), "a.com").with_id(3).primary();
        assert!(validate_binding(&binding, &existing, |_| None).is_ok());
    }
}

// Configuration validation

use crate::{ConfigError, Result};

/// Trait for validating configuration
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Configuration validator with rules
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate that a value is not empty
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{} cannot be empty",
                field
            )));
        }
        Ok(())
    }

    /// Validate that a value is in a list of allowed values
    pub fn one_of<T: PartialEq>(value: &T, allowed: &[T], field: &str) -> Result<()> {
        if !allowed.contains(value) {
            return Err(ConfigError::ValidationError(format!(
                "{} must be one of the allowed values",
                field
            )));
        }
        Ok(())
    }

    /// Validate an absolute URL path such as `/` or `/site/`
    pub fn is_url_path(value: &str, field: &str) -> Result<()> {
        if !value.starts_with('/') {
            return Err(ConfigError::ValidationError(format!(
                "{} must start with '/'",
                field
            )));
        }
        Ok(())
    }

    /// Validate a comma-separated list of positive integer IDs
    pub fn is_id_list(value: &str, field: &str) -> Result<()> {
        let valid = value.split(',').all(|part| {
            let part = part.trim();
            !part.is_empty() && part.chars().all(|c| c.is_ascii_digit())
        });
        if !valid {
            return Err(ConfigError::ValidationError(format!(
                "{} must be a comma-separated list of IDs",
                field
            )));
        }
        Ok(())
    }

    /// Validate that a header-safe token (cookie or parameter name) has no
    /// separators or whitespace
    pub fn is_token(value: &str, field: &str) -> Result<()> {
        Self::not_empty(value, field)?;
        if value
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || "=;,\"".contains(c))
        {
            return Err(ConfigError::ValidationError(format!(
                "{} contains invalid characters",
                field
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_empty_validation() {
        assert!(ConfigValidator::not_empty("value", "field").is_ok());
        assert!(ConfigValidator::not_empty("", "field").is_err());
        assert!(ConfigValidator::not_empty("  ", "field").is_err());
    }

    #[test]
    fn test_one_of_validation() {
        let allowed = ["a", "b", "c"];
        assert!(ConfigValidator::one_of(&"a", &allowed, "field").is_ok());
        assert!(ConfigValidator::one_of(&"d", &allowed, "field").is_err());
    }

    #[test]
    fn test_url_path_validation() {
        assert!(ConfigValidator::is_url_path("/", "field").is_ok());
        assert!(ConfigValidator::is_url_path("/site/", "field").is_ok());
        assert!(ConfigValidator::is_url_path("site", "field").is_err());
    }

    #[test]
    fn test_id_list_validation() {
        assert!(ConfigValidator::is_id_list("1", "field").is_ok());
        assert!(ConfigValidator::is_id_list("1, 2,3", "field").is_ok());
        assert!(ConfigValidator::is_id_list("1,,2", "field").is_err());
        assert!(ConfigValidator::is_id_list("a", "field").is_err());
        assert!(ConfigValidator::is_id_list("-1", "field").is_err());
    }

    #[test]
    fn test_token_validation() {
        assert!(ConfigValidator::is_token("noSubsiteFilter", "field").is_ok());
        assert!(ConfigValidator::is_token("bad name", "field").is_err());
        assert!(ConfigValidator::is_token("a=b", "field").is_err());
    }
}

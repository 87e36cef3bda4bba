// Environment variable loading

use crate::{ConfigError, Result};
use std::collections::HashMap;
use std::env;

/// Prefix for subsites environment variables
pub const ENV_PREFIX: &str = "SUBSITES";

/// Environment variable loader
pub struct EnvLoader {
    prefix: Option<String>,
}

impl EnvLoader {
    /// Create a new environment loader
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    /// Load all environment variables under the prefix.
    ///
    /// Keys come back lowercased with the prefix removed, so
    /// `SUBSITES_WRITE_HOSTMAP` becomes `write_hostmap`.
    pub fn load(&self) -> Result<HashMap<String, String>> {
        let mut vars = HashMap::new();

        for (key, value) in env::vars() {
            match self.prefix {
                Some(ref prefix) => {
                    if let Some(rest) = key.strip_prefix(prefix.as_str())
                        && let Some(name) = rest.strip_prefix('_')
                        && !name.is_empty()
                    {
                        vars.insert(name.to_lowercase(), value);
                    }
                }
                None => {
                    vars.insert(key.to_lowercase(), value);
                }
            }
        }

        Ok(vars)
    }

    /// Load a specific environment variable
    pub fn load_var(&self, key: &str) -> Result<String> {
        env::var(self.full_key(key)).map_err(ConfigError::EnvError)
    }

    /// Load with default value
    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.load_var(key).unwrap_or_else(|_| default.to_string())
    }

    /// Load a boolean flag; `None` when unset.
    pub fn load_bool(&self, key: &str) -> Result<Option<bool>> {
        match env::var(self.full_key(key)) {
            Ok(value) => parse_bool(&value)
                .map(Some)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: self.full_key(key),
                    value,
                }),
            Err(env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(ConfigError::EnvError(e)),
        }
    }

    fn full_key(&self, key: &str) -> String {
        match self.prefix {
            Some(ref prefix) => format!("{}_{}", prefix, key.to_uppercase()),
            None => key.to_uppercase(),
        }
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(Some(ENV_PREFIX.to_string()))
    }
}

/// Parse the usual spellings of a boolean flag.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // std::env::set_var is unsafe, so these stick to variables nobody sets.

    #[test]
    fn test_env_loader_with_default() {
        let loader = EnvLoader::default();
        let value = loader.load_var_or("NONEXISTENT_VAR_12345", "default");

        assert_eq!(value, "default");
    }

    #[test]
    fn test_env_loader_missing_var() {
        let loader = EnvLoader::new(Some("SUBSITES_TEST".to_string()));
        assert!(loader.load_var("MISSING_VAR_67890").is_err());
        assert_eq!(loader.load_bool("MISSING_VAR_67890").unwrap(), None);
    }

    #[test]
    fn test_full_key() {
        let loader = EnvLoader::default();
        assert_eq!(loader.full_key("write_hostmap"), "SUBSITES_WRITE_HOSTMAP");
        assert_eq!(EnvLoader::new(None).full_key("path"), "PATH");
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool(" On "), Some(true));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool(""), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}

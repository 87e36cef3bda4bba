// Configuration management for subsites
//
// Settings come from three layers, later ones winning: built-in defaults,
// an optional JSON/TOML/.env file, then `SUBSITES_*` environment variables.

pub mod env;
pub mod error;
pub mod loader;
pub mod validation;

pub use env::{ENV_PREFIX, EnvLoader, parse_bool};
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use validation::{ConfigValidator, Validate};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Subsites settings
///
/// # Examples
///
/// ```
/// use subsites_config::SubsitesConfig;
///
/// let config = SubsitesConfig::from_toml_str(r#"
///     write_hostmap = false
///     allowed_themes = ["simple"]
/// "#).unwrap();
///
/// assert!(!config.write_hostmap);
/// assert_eq!(config.override_param, "SubsiteID");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubsitesConfig {
    /// Query parameter that selects a subsite for one request
    pub override_param: String,
    /// Session key holding the selected subsite
    pub session_key: String,
    /// Regenerate the host map after subsite or domain writes
    pub write_hostmap: bool,
    /// Where the host map is written
    pub hostmap_path: String,
    /// URL path the site is mounted under
    pub base_path: String,
    /// Ignore session and override selection; always use the host subsite
    pub disable_selection: bool,
    /// Disable query scoping for every request
    pub disable_filter: bool,
    /// Comma-separated subsite IDs every query is forced to
    pub force_subsites: Option<String>,
    /// Title shown for the main site in selectors
    pub main_site_title: String,
    /// Cookie that shows every subsite's records in admin lists
    pub show_all_cookie: String,
    /// Directory scanned for themes
    pub themes_dir: String,
    /// Themes offered to subsites; empty means everything in `themes_dir`
    pub allowed_themes: Vec<String>,
    /// Redirect live requests to the subsite's primary domain
    pub redirect_to_primary: bool,
    /// Host substituted into wildcard domains outside a request
    pub default_host: String,
}

impl Default for SubsitesConfig {
    fn default() -> Self {
        Self {
            override_param: "SubsiteID".to_string(),
            session_key: "SubsiteID".to_string(),
            write_hostmap: true,
            hostmap_path: "subsites/host-map.json".to_string(),
            base_path: "/".to_string(),
            disable_selection: false,
            disable_filter: false,
            force_subsites: None,
            main_site_title: "Main site".to_string(),
            show_all_cookie: "noSubsiteFilter".to_string(),
            themes_dir: "themes".to_string(),
            allowed_themes: Vec::new(),
            redirect_to_primary: false,
            default_host: "localhost".to_string(),
        }
    }
}

impl SubsitesConfig {
    /// Build from a parsed document; missing keys keep their defaults.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| ConfigError::DeserializationError(e.to_string()))
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Self::from_value(ConfigLoader::new(FileFormat::Toml).parse(content)?)
    }

    /// Load a JSON, TOML or `.env` file, picked by extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let loader = ConfigLoader::auto(&path)?;
        let value = loader.load_file(&path)?;

        if loader.format() != FileFormat::Env {
            return Self::from_value(value);
        }

        let mut config = Self::default();
        if let Value::Object(map) = value {
            for (key, value) in map {
                let key = key.to_lowercase();
                let key = key
                    .strip_prefix(&format!("{}_", ENV_PREFIX.to_lowercase()))
                    .unwrap_or(&key)
                    .to_string();
                if let Value::String(value) = value {
                    config.set(&key, &value)?;
                }
            }
        }
        Ok(config)
    }

    /// Set one field from its string form.
    ///
    /// Returns `false` for keys that are not subsites settings.
    pub fn set(&mut self, key: &str, value: &str) -> Result<bool> {
        let flag = |value: &str| {
            parse_bool(value).ok_or_else(|| ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            })
        };

        match key {
            "override_param" => self.override_param = value.to_string(),
            "session_key" => self.session_key = value.to_string(),
            "write_hostmap" => self.write_hostmap = flag(value)?,
            "hostmap_path" => self.hostmap_path = value.to_string(),
            "base_path" => self.base_path = value.to_string(),
            "disable_selection" => self.disable_selection = flag(value)?,
            "disable_filter" => self.disable_filter = flag(value)?,
            "force_subsites" => {
                let value = value.trim();
                self.force_subsites = (!value.is_empty()).then(|| value.to_string());
            }
            "main_site_title" => self.main_site_title = value.to_string(),
            "show_all_cookie" => self.show_all_cookie = value.to_string(),
            "themes_dir" => self.themes_dir = value.to_string(),
            "allowed_themes" => {
                self.allowed_themes = value
                    .split(',')
                    .map(str::trim)
                    .filter(|theme| !theme.is_empty())
                    .map(String::from)
                    .collect();
            }
            "redirect_to_primary" => self.redirect_to_primary = flag(value)?,
            "default_host" => self.default_host = value.to_string(),
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Overlay environment variables read through `loader`.
    pub fn apply_env(&mut self, loader: &EnvLoader) -> Result<()> {
        let mut vars: Vec<(String, String)> = loader.load()?.into_iter().collect();
        vars.sort();
        for (key, value) in vars {
            self.set(&key, &value)?;
        }
        Ok(())
    }

    /// Defaults overlaid with `SUBSITES_*` variables, after reading `.env`
    /// if one exists.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        config.apply_env(&EnvLoader::default())?;
        config.validate()?;
        Ok(config)
    }

    /// Full load: `.env`, then `path` if given, then the environment.
    pub fn load(path: Option<&str>) -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(&EnvLoader::default())?;
        config.validate()?;
        Ok(config)
    }
}

impl Validate for SubsitesConfig {
    fn validate(&self) -> Result<()> {
        ConfigValidator::is_token(&self.override_param, "override_param")?;
        ConfigValidator::not_empty(&self.session_key, "session_key")?;
        ConfigValidator::is_token(&self.show_all_cookie, "show_all_cookie")?;
        ConfigValidator::is_url_path(&self.base_path, "base_path")?;
        ConfigValidator::not_empty(&self.default_host, "default_host")?;
        if self.write_hostmap {
            ConfigValidator::not_empty(&self.hostmap_path, "hostmap_path")?;
        }
        if let Some(ref forced) = self.force_subsites {
            ConfigValidator::is_id_list(forced, "force_subsites")?;
        }
        Ok(())
    }
}

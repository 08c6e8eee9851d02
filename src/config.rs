//! Configuration management for the plugin service.
//!
//! Loads settings from `~/.config/imagegen-plugin/config.toml` with environment
//! overrides. The hosting environment variables (`NEXT_PUBLIC_BASE_URL`,
//! `INTERNAL_API_URL`, `PLUGIN_PUBLIC_URL`, `NODE_ENV`, `VERCEL`, `DEBUG`) always
//! win over the file.

use crate::resolver::EndpointVariant;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub public: PublicConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Externally visible and internal addresses of this deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PublicConfig {
    /// Base URL advertised in the manifest and OpenAPI document.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Address used instead of `plugin_public_url` for calls that stay inside the platform.
    #[serde(default)]
    pub internal_api_url: Option<String>,
    #[serde(default)]
    pub plugin_public_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub vercel: bool,
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GenerationConfig {
    /// Which upstream calling convention `/api/generate` follows.
    #[serde(default)]
    pub variant: EndpointVariant,
    /// Overrides the variant's own upstream timeout.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_host() -> String { DEFAULT_HOST.to_string() }
fn default_port() -> u16 { DEFAULT_PORT }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl PublicConfig {
    /// Configured base URL, if it is non-blank.
    pub fn configured_base_url(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Swap the public plugin address for the internal one when both are known.
    pub fn rewrite_internal_url(&self, api_url: &str) -> String {
        match (&self.internal_api_url, &self.plugin_public_url) {
            (Some(internal), Some(public)) if !public.is_empty() && api_url.starts_with(public.as_str()) => {
                format!("{}{}", internal, &api_url[public.len()..])
            }
            _ => api_url.to_string(),
        }
    }
}

impl GenerationConfig {
    /// Effective upstream timeout; `None` leaves the call unbounded.
    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout_secs {
            Some(secs) => Some(Duration::from_secs(secs)),
            None => self.variant.default_timeout(),
        }
    }
}

impl Config {
    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("imagegen-plugin")
            .join("config.toml")
    }

    /// Load config from file, falling back to defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::default_path())
    }

    /// Load config from a specific path.
    pub fn load_from(path: PathBuf) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Apply process environment overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_blank("NEXT_PUBLIC_BASE_URL") {
            self.public.base_url = Some(url.trim().to_string());
        }
        if let Some(url) = non_blank("INTERNAL_API_URL") {
            self.public.internal_api_url = Some(url);
        }
        if let Some(url) = non_blank("PLUGIN_PUBLIC_URL") {
            self.public.plugin_public_url = Some(url);
        }
        if let Some(env) = lookup("NODE_ENV") {
            self.runtime.environment = if env == "development" {
                Environment::Development
            } else {
                Environment::Production
            };
        }
        if let Some(val) = lookup("VERCEL") {
            self.runtime.vercel = val == "1";
        }
        if let Some(val) = lookup("DEBUG") {
            self.runtime.debug = val == "true";
        }
        self
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(&path, content).map_err(ConfigError::Io)
    }

    pub fn is_development(&self) -> bool {
        self.runtime.environment == Environment::Development
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Serialize(e) => write!(f, "Serialize error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn loads_config_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        fs::write(&config_path, r#"
[server]
port = 9090

[public]
base_url = "https://plugin.example.com"

[generation]
variant = "direct"
timeout_secs = 10
"#).unwrap();

        let config = Config::load_from(config_path).unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.public.base_url.as_deref(), Some("https://plugin.example.com"));
        assert_eq!(config.generation.variant, EndpointVariant::Direct);
        assert_eq!(config.generation.timeout(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn returns_defaults_when_file_missing() {
        let config = Config::load_from(PathBuf::from("/nonexistent/path/config.toml")).unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.runtime.environment, Environment::Production);
        assert!(!config.runtime.vercel);
        assert_eq!(config.generation.variant, EndpointVariant::Versioned);
    }

    #[test]
    fn rejects_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "[server\nport = ").unwrap();

        let result = Config::load_from(config_path);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn environment_overrides_apply() {
        let config = Config::default().with_overrides_from(lookup_from(&[
            ("NEXT_PUBLIC_BASE_URL", "  https://public.example.com  "),
            ("INTERNAL_API_URL", "http://internal:8080"),
            ("PLUGIN_PUBLIC_URL", "https://public.example.com"),
            ("NODE_ENV", "development"),
            ("VERCEL", "1"),
            ("DEBUG", "true"),
        ]));

        assert_eq!(config.public.base_url.as_deref(), Some("https://public.example.com"));
        assert_eq!(config.public.internal_api_url.as_deref(), Some("http://internal:8080"));
        assert!(config.is_development());
        assert!(config.runtime.vercel);
        assert!(config.runtime.debug);
    }

    #[test]
    fn blank_base_url_does_not_override_file() {
        let mut config = Config::default();
        config.public.base_url = Some("https://from-file.example.com".to_string());

        let config = config.with_overrides_from(lookup_from(&[("NEXT_PUBLIC_BASE_URL", "   ")]));

        assert_eq!(config.public.configured_base_url(), Some("https://from-file.example.com"));
    }

    #[test]
    fn env_overrides_take_precedence_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, r#"
[runtime]
environment = "development"
debug = true
"#).unwrap();

        let from_file = Config::load_from(config_path.clone()).unwrap();
        assert!(from_file.is_development());

        let config = Config::load_from(config_path)
            .unwrap()
            .with_overrides_from(lookup_from(&[("NODE_ENV", "production"), ("DEBUG", "false")]));

        assert!(!config.is_development());
        assert!(!config.runtime.debug);
    }

    #[test]
    fn rewrites_public_url_to_internal() {
        let public = PublicConfig {
            base_url: None,
            internal_api_url: Some("http://10.0.0.5:3000".to_string()),
            plugin_public_url: Some("https://images.example.com".to_string()),
        };

        assert_eq!(
            public.rewrite_internal_url("https://images.example.com/api/draw"),
            "http://10.0.0.5:3000/api/draw"
        );
        assert_eq!(
            public.rewrite_internal_url("https://elsewhere.example.com"),
            "https://elsewhere.example.com"
        );
    }

    #[test]
    fn rewrite_is_noop_without_internal_url() {
        let public = PublicConfig {
            plugin_public_url: Some("https://images.example.com".to_string()),
            ..PublicConfig::default()
        };

        assert_eq!(
            public.rewrite_internal_url("https://images.example.com/x"),
            "https://images.example.com/x"
        );
    }

    #[test]
    fn timeout_falls_back_to_variant_default() {
        let versioned = GenerationConfig::default();
        assert_eq!(versioned.timeout(), None);

        let direct = GenerationConfig {
            variant: EndpointVariant::Direct,
            timeout_secs: None,
        };
        assert_eq!(direct.timeout(), Some(Duration::from_secs(55)));
    }

    #[test]
    fn saves_and_reloads_config() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("nested").join("config.toml");

        let config = Config {
            server: ServerConfig { host: "0.0.0.0".to_string(), port: 8080 },
            ..Config::default()
        };
        config.save_to(config_path.clone()).unwrap();

        let loaded = Config::load_from(config_path).unwrap();
        assert_eq!(loaded, config);
    }
}

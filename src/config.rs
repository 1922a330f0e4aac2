use crate::error::{Error, Result};
use log::{debug, info};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file looked up in the project root when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "openapi-from-laravel.toml";

/// Analyzer configuration.
///
/// Every field has a default, so an empty file (or no file at all) is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub cache_enabled: bool,
    /// Cache location, relative to the project root unless absolute
    pub cache_directory: PathBuf,
    /// URI patterns selecting the documented routes
    pub route_patterns: Vec<String>,
    pub title: String,
    pub version: String,
    pub description: Option<String>,
    pub servers: Vec<ServerConfig>,
    /// Scheme documented for a bare `auth` middleware (`bearer`, `basic`, `apiKey`, `oauth2`)
    pub default_auth: String,
    pub callbacks: Vec<CallbackConfig>,
    /// Additional route-table JSON files merged after the main table
    pub extra_route_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A webhook-style callback attached to one operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackConfig {
    /// Route name or URI the callback belongs to
    pub route: String,
    pub name: String,
    /// Runtime expression for the callback URL (`{$request.body#/callback_url}`)
    pub expression: String,
    #[serde(default = "default_callback_method")]
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_callback_method() -> String {
    "post".to_string()
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_directory: PathBuf::from("storage/app/openapi-cache"),
            route_patterns: vec!["api/*".to_string()],
            title: "API Documentation".to_string(),
            version: "1.0.0".to_string(),
            description: None,
            servers: Vec::new(),
            default_auth: "bearer".to_string(),
            callbacks: Vec::new(),
            extra_route_files: Vec::new(),
        }
    }
}

impl AnalyzerConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load the explicitly given file, else `openapi-from-laravel.toml` in the project root,
    /// else the defaults
    pub fn resolve(project_root: &Path, cli_config: Option<&Path>) -> Result<Self> {
        if let Some(path) = cli_config {
            return Self::load_from_file(path);
        }
        let candidate = project_root.join(DEFAULT_CONFIG_FILE);
        if candidate.is_file() {
            info!("Using configuration {}", candidate.display());
            return Self::load_from_file(candidate);
        }
        Ok(Self::default())
    }

    /// Absolute cache directory for a project
    pub fn cache_dir(&self, project_root: &Path) -> PathBuf {
        if self.cache_directory.is_absolute() {
            self.cache_directory.clone()
        } else {
            project_root.join(&self.cache_directory)
        }
    }

    /// Compile the route patterns
    pub fn route_matcher(&self) -> Result<RouteMatcher> {
        RouteMatcher::new(&self.route_patterns)
    }
}

/// Compiled route URI patterns.
///
/// `*` matches any run of characters (slashes included); everything else is literal.
/// Leading slashes are ignored on both sides.
#[derive(Debug, Clone)]
pub struct RouteMatcher {
    patterns: Vec<(String, Regex)>,
}

impl RouteMatcher {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                let pattern = pattern.trim_start_matches('/').to_string();
                let body = pattern
                    .split('*')
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join(".*");
                let regex = Regex::new(&format!("^{}$", body)).map_err(|e| {
                    Error::ConfigError(format!("Invalid route pattern '{}': {}", pattern, e))
                })?;
                Ok((pattern, regex))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether a URI is selected. An empty pattern list selects everything.
    pub fn matches(&self, uri: &str) -> bool {
        let uri = uri.trim_start_matches('/');
        self.patterns.is_empty() || self.patterns.iter().any(|(_, re)| re.is_match(uri))
    }

    /// The URI with the literal prefix of the first matching pattern removed
    /// (`api/v1/users/{id}` under `api/v1/*` → `users/{id}`)
    pub fn strip_prefix<'u>(&self, uri: &'u str) -> &'u str {
        let uri = uri.trim_start_matches('/');
        for (pattern, re) in &self.patterns {
            if !re.is_match(uri) {
                continue;
            }
            let prefix = pattern.split('*').next().unwrap_or_default();
            if let Some(rest) = uri.strip_prefix(prefix) {
                return rest.trim_start_matches('/');
            }
        }
        uri
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_from_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "").unwrap();

        let config = AnalyzerConfig::load_from_file(&path).unwrap();
        assert_eq!(config, AnalyzerConfig::default());
        assert!(config.cache_enabled);
        assert_eq!(config.route_patterns, vec!["api/*"]);
    }

    #[test]
    fn test_load_full_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
cache_enabled = false
cache_directory = "/tmp/docs-cache"
route_patterns = ["api/v1/*", "webhooks/*"]
title = "Shop API"
default_auth = "apiKey"

[[servers]]
url = "https://api.example.com"

[[callbacks]]
route = "orders.store"
name = "orderShipped"
expression = "{$request.body#/callback_url}"
"#,
        )
        .unwrap();

        let config = AnalyzerConfig::load_from_file(&path).unwrap();
        assert!(!config.cache_enabled);
        assert_eq!(config.title, "Shop API");
        assert_eq!(config.version, "1.0.0");
        assert_eq!(config.servers[0].url, "https://api.example.com");
        assert_eq!(config.callbacks[0].method, "post");
        assert_eq!(
            config.cache_dir(Path::new("/srv/app")),
            PathBuf::from("/tmp/docs-cache")
        );
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "cache_enabled = [").unwrap();
        assert_eq!(
            AnalyzerConfig::load_from_file(&path).unwrap_err().kind(),
            "config"
        );
    }

    #[test]
    fn test_resolve_prefers_project_file() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(DEFAULT_CONFIG_FILE), "title = \"Local\"").unwrap();
        let config = AnalyzerConfig::resolve(temp_dir.path(), None).unwrap();
        assert_eq!(config.title, "Local");
        assert_eq!(
            config.cache_dir(temp_dir.path()),
            temp_dir.path().join("storage/app/openapi-cache")
        );
    }

    #[test]
    fn test_route_matcher() {
        let matcher =
            RouteMatcher::new(&["api/v1/*".to_string(), "/health".to_string()]).unwrap();
        assert!(matcher.matches("/api/v1/users/{user}"));
        assert!(matcher.matches("health"));
        assert!(!matcher.matches("api/v2/users"));
        assert!(!matcher.matches("web/home"));
        assert_eq!(matcher.strip_prefix("api/v1/users/{user}"), "users/{user}");
        assert_eq!(matcher.strip_prefix("other/path"), "other/path");

        let everything = RouteMatcher::new(&[]).unwrap();
        assert!(everything.matches("anything/at/all"));
    }
}

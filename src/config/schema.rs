//! Configuration schema types for `app-dev-server.toml`
//!
//! Every field is optional; a missing file or section means the built-in
//! defaults (`localhost:3040`, API key `test`, sources `site.ts`/`web.ts`).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::manifest::Surface;
use crate::page::{TrackingOptions, DEFAULT_API_HOST, DEFAULT_API_KEY};

/// Default bind host
pub const DEFAULT_HOST: &str = "localhost";

/// Default bind port
pub const DEFAULT_PORT: u16 = 3040;

/// HTTP listener section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Tracking client section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingConfig {
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_api_host")]
    pub api_host: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self { api_key: default_api_key(), api_host: default_api_host() }
    }
}

impl From<&TrackingConfig> for TrackingOptions {
    fn from(config: &TrackingConfig) -> Self {
        TrackingOptions { api_key: config.api_key.clone(), api_host: config.api_host.clone() }
    }
}

fn default_api_key() -> String {
    DEFAULT_API_KEY.to_string()
}

fn default_api_host() -> String {
    DEFAULT_API_HOST.to_string()
}

/// Per-surface source section (`[site]` / `[web]`)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SurfaceConfig {
    /// App source file, relative to the project directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
}

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DevServerConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub site: SurfaceConfig,
    #[serde(default)]
    pub web: SurfaceConfig,
}

impl DevServerConfig {
    /// Source file configured for `surface`, or the surface default.
    pub fn source_for(&self, surface: Surface) -> PathBuf {
        let section = match surface {
            Surface::Site => &self.site,
            Surface::Web => &self.web,
        };
        section.source.clone().unwrap_or_else(|| PathBuf::from(surface.default_source()))
    }

    /// Check the configuration, returning every problem found.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.server.host.trim().is_empty() {
            errors.push("server.host must not be empty".to_string());
        }
        if self.tracking.api_key.is_empty() {
            errors.push("tracking.api_key must not be empty".to_string());
        }
        for (name, section) in [("site", &self.site), ("web", &self.web)] {
            if section.source.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
                errors.push(format!("{}.source must not be empty", name));
            }
        }

        errors
    }

    /// Suspicious values that are still passed through as given.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let host = &self.tracking.api_host;
        if !(host.starts_with("http://") || host.starts_with("https://")) {
            warnings.push(format!(
                "tracking.api_host '{}' has no http:// or https:// scheme; the browser will resolve it relative to the page",
                host
            ));
        }

        warnings
    }
}

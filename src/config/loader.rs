//! Configuration loading for `app-dev-server.toml`
//!
//! The file is optional and only looked up in the project directory.
//! Command-line arguments always win over file values.

use super::schema::DevServerConfig;
use crate::manifest::Surface;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config filename looked up in the project directory.
pub const CONFIG_FILENAME: &str = "app-dev-server.toml";

/// Configuration loading error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("Failed to parse app-dev-server.toml: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error
    #[error("Config validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),
}

/// CLI arguments that can override config values
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub api_key: Option<String>,
    pub api_host: Option<String>,
    /// Source file for the surface being served
    pub source: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Find the config file in `dir`.
pub fn find_config(dir: &Path) -> Option<PathBuf> {
    let path = dir.join(CONFIG_FILENAME);
    if path.is_file() {
        Some(path)
    } else {
        None
    }
}

/// Load configuration from `path`, or defaults when `path` is `None`.
///
/// # Arguments
/// - `path` - Optional path to an `app-dev-server.toml` file
///
/// # Returns
/// - `Ok(DevServerConfig)` on success
/// - `Err(ConfigError)` if the file cannot be read, parsed or validated.
///   An explicit path that does not exist is an error.
///
/// # Example
/// ```ignore
/// let project_dir = std::env::current_dir()?;
/// let config = load_config(find_config(&project_dir).as_deref())?;
/// println!("Serving on port {}", config.server.port);
/// ```
pub fn load_config(path: Option<&Path>) -> Result<DevServerConfig, ConfigError> {
    match path {
        Some(p) => load_config_file(p),
        None => Ok(default_config()),
    }
}

fn load_config_file(path: &Path) -> Result<DevServerConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let config: DevServerConfig = toml::from_str(&contents)?;

    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors));
    }

    Ok(config)
}

/// Built-in configuration used when no config file exists.
pub fn default_config() -> DevServerConfig {
    DevServerConfig::default()
}

/// Merge CLI overrides into a configuration.
///
/// # Arguments
/// - `config` - The configuration to modify
/// - `overrides` - CLI overrides to apply
/// - `surface` - Picks the `[site]` or `[web]` section that `source` lands in
pub fn merge_cli_overrides(
    config: &mut DevServerConfig,
    overrides: &CliOverrides,
    surface: Surface,
) {
    if let Some(ref api_key) = overrides.api_key {
        config.tracking.api_key = api_key.clone();
    }
    if let Some(ref api_host) = overrides.api_host {
        config.tracking.api_host = api_host.clone();
    }
    if let Some(ref source) = overrides.source {
        let section = match surface {
            Surface::Site => &mut config.site,
            Surface::Web => &mut config.web,
        };
        section.source = Some(source.clone());
    }
    if let Some(ref host) = overrides.host {
        config.server.host = host.clone();
    }
    if let Some(port) = overrides.port {
        config.server.port = port;
    }
}

/// Resolve a path relative to the project directory.
pub fn resolve_path(project_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_dir.join(path)
    }
}

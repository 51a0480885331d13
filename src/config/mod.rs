//! Configuration module for the dev server
//!
//! Provides types and loading for the optional `app-dev-server.toml`.

pub mod loader;
pub mod schema;

pub use loader::{
    default_config, find_config, load_config, merge_cli_overrides, resolve_path, CliOverrides,
    ConfigError, CONFIG_FILENAME,
};
pub use schema::*;

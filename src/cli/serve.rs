//! Serve command implementation

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use super::{ServeArgs, EXIT_ERROR, EXIT_INVALID_ARGS, EXIT_SUCCESS};
use crate::config::{
    find_config, load_config, merge_cli_overrides, CliOverrides, ConfigError, DevServerConfig,
};
use crate::manifest::Surface;
use crate::page::TrackingOptions;
use crate::server::{self, AppState, ServeError};
use crate::transpile::OxcTranspiler;

/// Run the preview server for `surface` from the current directory.
pub fn run_serve(surface: Surface, args: &ServeArgs) -> ExitCode {
    crate::logging::init(args.verbose);
    println!("Usage: app-dev-server {} [apiKey] [host] [pathTo/{}]", surface, surface.default_source());

    let project_dir = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Error: cannot read current directory: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let config = match resolve_config(&project_dir, &args.overrides(), surface) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::from(EXIT_INVALID_ARGS);
        }
    };

    let state = AppState::new(
        surface,
        project_dir,
        &config.source_for(surface),
        TrackingOptions::from(&config.tracking),
        Arc::new(OxcTranspiler::new()),
    );
    tracing::debug!("Serving {}", state.source_path().display());

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    match runtime.block_on(server::run(&config.server.host, config.server.port, state)) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e @ ServeError::PortInUse { .. }) => {
            tracing::error!("🛑 {}. Stop the other process or pass --port.", e);
            ExitCode::from(EXIT_ERROR)
        }
        Err(e) => {
            tracing::error!("🛑 {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Load the project config, apply command-line overrides and validate.
fn resolve_config(
    project_dir: &Path,
    overrides: &CliOverrides,
    surface: Surface,
) -> Result<DevServerConfig, ConfigError> {
    let path = find_config(project_dir);
    match &path {
        Some(p) => tracing::debug!("Using config: {}", p.display()),
        None => tracing::debug!("No app-dev-server.toml found, using defaults"),
    }

    let mut config = load_config(path.as_deref())?;
    merge_cli_overrides(&mut config, overrides, surface);

    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors));
    }
    for warning in config.warnings() {
        tracing::warn!("{}", warning);
    }
    Ok(config)
}

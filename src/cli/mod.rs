//! Command-line interface implementation
//!
//! Parses the arguments and dispatches to the serve command for the
//! requested surface.

mod serve;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::config::CliOverrides;
use crate::manifest::Surface;

/// Process exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// app-dev-server - Preview an app's web or site script locally
#[derive(Parser)]
#[command(name = "app-dev-server")]
#[command(about = "Local preview server for analytics platform apps")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve a full-page site app (site.ts) with live reload
    Site(ServeArgs),

    /// Serve a page-embedded web app (web.ts)
    Web(ServeArgs),
}

impl Commands {
    pub fn surface(&self) -> Surface {
        match self {
            Commands::Site(_) => Surface::Site,
            Commands::Web(_) => Surface::Web,
        }
    }

    pub fn args(&self) -> &ServeArgs {
        match self {
            Commands::Site(args) | Commands::Web(args) => args,
        }
    }
}

/// Arguments shared by both surfaces
#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Project API key for the tracking client (default: test)
    #[arg(value_name = "API_KEY")]
    pub api_key: Option<String>,

    /// Analytics API host (default: http://localhost:8000)
    #[arg(value_name = "API_HOST")]
    pub api_host: Option<String>,

    /// App source file (default: site.ts or web.ts)
    #[arg(value_name = "SOURCE")]
    pub source: Option<PathBuf>,

    /// Host to bind (default: localhost)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind (default: 3040)
    #[arg(long)]
    pub port: Option<u16>,

    /// Log debug output
    #[arg(short, long)]
    pub verbose: bool,
}

impl ServeArgs {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            api_key: self.api_key.clone(),
            api_host: self.api_host.clone(),
            source: self.source.clone(),
            host: self.host.clone(),
            port: self.port,
        }
    }
}

/// Run the CLI application
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let surface = cli.command.surface();
    serve::run_serve(surface, cli.command.args())
}

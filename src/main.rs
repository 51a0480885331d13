//! app-dev-server - Preview an app's web or site script in the browser

use std::process::ExitCode;

use app_dev_server::cli;

fn main() -> ExitCode {
    cli::run()
}

//! app-dev-server - Local preview server for analytics platform apps
//!
//! Serves a preview page that loads the tracking client, reads the app's
//! `plugin.json` config schema and runs the app's transpiled `web.ts` or
//! `site.ts`. The site surface also reloads the page on file changes.

pub mod cli;
pub mod config;
pub mod logging;
pub mod manifest;
pub mod page;
pub mod reload;
pub mod script;
pub mod server;
pub mod transpile;
pub mod watch;

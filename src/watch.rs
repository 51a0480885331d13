//! Watch mode for live reload
//!
//! Watches the project directory and broadcasts a reload to every open
//! live-reload connection on each change. Events are not debounced: a
//! burst of changes produces one broadcast per event.

use notify::event::EventKind;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::reload::{ReloadRegistry, ReloadSignal};

/// Error during watch mode
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WatchError {
    /// Failed to initialize file watcher
    #[error("Failed to initialize file watcher: {0}")]
    WatcherInit(#[source] notify::Error),
    /// Failed to add watch path
    #[error("Failed to watch {}: {source}", .path.display())]
    WatchPath {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
    /// Project directory not found
    #[error("Project directory not found: {}", .0.display())]
    DirNotFound(PathBuf),
}

/// Start watching `dir` and broadcast reloads through `registry`.
///
/// Only the entries directly inside `dir` are watched. Watching stops when
/// the returned watcher is dropped.
pub fn watch_project(dir: &Path, registry: ReloadRegistry) -> Result<RecommendedWatcher, WatchError> {
    if !dir.is_dir() {
        return Err(WatchError::DirNotFound(dir.to_path_buf()));
    }

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            on_change(&registry, &event);
        }
        Err(error) => {
            // Non-fatal, keep watching
            tracing::warn!("Watch error: {}", error);
        }
    })
    .map_err(WatchError::WatcherInit)?;

    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .map_err(|source| WatchError::WatchPath { path: dir.to_path_buf(), source })?;

    tracing::debug!("Watching {} for changes", dir.display());
    Ok(watcher)
}

/// Check if an event reports a change.
///
/// Creates, modifications, removals and unclassified events all count;
/// pure access notifications (open, read, close) do not.
pub fn is_change_event(event: &Event) -> bool {
    !matches!(event.kind, EventKind::Access(_))
}

/// Handle one watcher event. Returns the number of clients signalled.
pub fn on_change(registry: &ReloadRegistry, event: &Event) -> usize {
    if !is_change_event(event) {
        return 0;
    }
    let changed = event
        .paths
        .iter()
        .map(|p| p.file_name().map(|n| n.to_string_lossy()).unwrap_or_else(|| p.to_string_lossy()))
        .collect::<Vec<_>>()
        .join(", ");
    tracing::info!("🔄 Reloading. Changes in {}", changed);
    registry.broadcast_all(ReloadSignal::Reload)
}

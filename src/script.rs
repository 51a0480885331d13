//! Request-time script builds
//!
//! Reads the app source for a surface and runs it through a [`Transpiler`].
//! The two surfaces treat failure differently: a broken `web.ts` is an
//! error for the caller, while a broken `site.ts` just means the preview
//! has no script until the next successful save.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::manifest::Surface;
use crate::transpile::{TranspileError, Transpiler};

/// Error while building an app script
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BuildError {
    /// The source file could not be read
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The source file did not transpile
    #[error("Failed to transpile {}: {source}", .path.display())]
    Transpile {
        path: PathBuf,
        #[source]
        source: TranspileError,
    },
}

/// Outcome of a script build.
#[derive(Debug, Clone, Default)]
pub struct BuildResult {
    /// Ready-to-embed script, `None` when no script is available
    pub script: Option<String>,
    /// Build duration
    pub duration: Duration,
}

impl BuildResult {
    /// Check if a script was produced
    pub fn has_script(&self) -> bool {
        self.script.is_some()
    }
}

/// Builds app scripts with a shared transpiler.
#[derive(Clone)]
pub struct ScriptBuilder {
    transpiler: Arc<dyn Transpiler>,
}

impl ScriptBuilder {
    pub fn new(transpiler: Arc<dyn Transpiler>) -> Self {
        Self { transpiler }
    }

    /// Build the script at `source_path` for `surface`.
    ///
    /// For [`Surface::Site`] this never fails: errors are logged and the
    /// result carries no script.
    pub fn build(&self, source_path: &Path, surface: Surface) -> Result<BuildResult, BuildError> {
        let start = Instant::now();
        match self.compile(source_path, surface) {
            Ok(script) => {
                let duration = start.elapsed();
                tracing::debug!(
                    path = %source_path.display(),
                    ?duration,
                    "built {} script",
                    surface
                );
                Ok(BuildResult { script: Some(script), duration })
            }
            Err(e) if surface == Surface::Site => {
                tracing::warn!("{}", e);
                Ok(BuildResult { script: None, duration: start.elapsed() })
            }
            Err(e) => Err(e),
        }
    }

    fn compile(&self, source_path: &Path, surface: Surface) -> Result<String, BuildError> {
        let source = fs::read_to_string(source_path)
            .map_err(|source| BuildError::Read { path: source_path.to_path_buf(), source })?;
        self.transpiler
            .transpile(&source, surface.default_source())
            .map_err(|source| BuildError::Transpile { path: source_path.to_path_buf(), source })
    }
}

impl std::fmt::Debug for ScriptBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptBuilder").finish_non_exhaustive()
    }
}

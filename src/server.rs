//! HTTP server for the preview page and the live-reload stream
//!
//! `GET /` rebuilds everything on every request: manifest, config mapping,
//! script and page. Nothing is cached between requests. The site surface
//! also serves `GET /_reload` and watches the project directory.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tower_http::cors::CorsLayer;

use crate::config::resolve_path;
use crate::manifest::{Manifest, ManifestError, Surface, MANIFEST_FILENAME};
use crate::page::{render_page, PageOptions, TrackingOptions, RELOAD_PATH};
use crate::reload::ReloadRegistry;
use crate::script::{BuildError, ScriptBuilder};
use crate::transpile::Transpiler;
use crate::watch::{watch_project, WatchError};

/// Error while running the server
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServeError {
    /// The address is taken by another process
    #[error("http://{host}:{port} is already in use")]
    PortInUse { host: String, port: u16 },
    /// Any other bind failure
    #[error("Failed to bind http://{host}:{port}: {source}")]
    Bind {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },
    /// The server loop failed
    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
    /// The file watcher could not start
    #[error(transparent)]
    Watch(#[from] WatchError),
    /// A request hit an error that ends the process
    #[error("{0}")]
    Fatal(String),
}

/// Failure while producing the preview page
#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("Could not read plugin.json: {0}")]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Build(#[from] BuildError),
}

/// Shared state of the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    surface: Surface,
    project_dir: Arc<PathBuf>,
    source_path: Arc<PathBuf>,
    tracking: TrackingOptions,
    builder: ScriptBuilder,
    registry: ReloadRegistry,
    fatal: Option<mpsc::UnboundedSender<String>>,
}

impl AppState {
    /// Create state for `surface`. A relative `source` is resolved against
    /// `project_dir`.
    pub fn new(
        surface: Surface,
        project_dir: impl Into<PathBuf>,
        source: &Path,
        tracking: TrackingOptions,
        transpiler: Arc<dyn Transpiler>,
    ) -> Self {
        let project_dir = project_dir.into();
        let source_path = resolve_path(&project_dir, source);
        Self {
            surface,
            project_dir: Arc::new(project_dir),
            source_path: Arc::new(source_path),
            tracking,
            builder: ScriptBuilder::new(transpiler),
            registry: ReloadRegistry::new(),
            fatal: None,
        }
    }

    /// Report fatal request errors on `tx` instead of only logging them.
    pub fn with_fatal_channel(mut self, tx: mpsc::UnboundedSender<String>) -> Self {
        self.fatal = Some(tx);
        self
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Live-reload connections of this server
    pub fn registry(&self) -> &ReloadRegistry {
        &self.registry
    }

    /// Load the manifest, build the script and render the page.
    pub fn render_index(&self) -> Result<String, PreviewError> {
        let manifest = Manifest::load(&self.project_dir.join(MANIFEST_FILENAME))?;
        let config = manifest.config_mapping(self.surface);
        let build = self.builder.build(&self.source_path, self.surface)?;

        let source_name = self
            .source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.surface.default_source().to_string());
        let options = PageOptions { surface: self.surface, tracking: self.tracking.clone(), source_name };
        Ok(render_page(&manifest, &config, &build, &options))
    }

    /// Turn a preview failure into a response.
    ///
    /// The site preview answers with a 500. The web preview has no
    /// fallback: the failure is also reported as fatal and ends the process.
    fn fail(&self, error: PreviewError) -> Response {
        let message = error.to_string();
        tracing::error!("🤔 {}", message);
        if self.surface == Surface::Web {
            if let Some(tx) = &self.fatal {
                let _ = tx.send(message.clone());
            }
        }
        (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("surface", &self.surface)
            .field("project_dir", &self.project_dir)
            .field("source_path", &self.source_path)
            .field("tracking", &self.tracking)
            .finish_non_exhaustive()
    }
}

/// Build the router for the state's surface.
pub fn router(state: AppState) -> Router {
    let mut router = Router::new().route("/", get(index));
    if state.surface == Surface::Site {
        router = router.route(RELOAD_PATH, get(reload_stream));
    }
    router.layer(CorsLayer::permissive()).with_state(state)
}

async fn index(State(state): State<AppState>) -> Response {
    let render_state = state.clone();
    match tokio::task::spawn_blocking(move || render_state.render_index()).await {
        Ok(Ok(html)) => Html(html).into_response(),
        Ok(Err(error)) => state.fail(error),
        Err(join_error) => {
            let message = format!("Preview render panicked: {}", join_error);
            tracing::error!("{}", message);
            if let (Surface::Web, Some(tx)) = (state.surface, &state.fatal) {
                let _ = tx.send(message.clone());
            }
            (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
        }
    }
}

async fn reload_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = state.registry.register();
    Sse::new(stream.map(|signal| Ok(Event::default().data(signal.as_str()))))
}

/// Bind the listener, mapping `AddrInUse` to [`ServeError::PortInUse`].
pub async fn bind(host: &str, port: u16) -> Result<TcpListener, ServeError> {
    TcpListener::bind((host, port)).await.map_err(|source| {
        if source.kind() == ErrorKind::AddrInUse {
            ServeError::PortInUse { host: host.to_string(), port }
        } else {
            ServeError::Bind { host: host.to_string(), port, source }
        }
    })
}

/// Serve `state` on `listener` until a fatal request error occurs.
///
/// # Arguments
/// - `listener` - Bound listener, usually from [`bind`]
/// - `state` - Handler state; a fatal channel is attached here
///
/// # Returns
/// - `Ok(())` if the server loop ends without a fatal error
/// - `Err(ServeError::Fatal)` after a web preview failure shut the server down
/// - `Err(ServeError::Serve)` if accepting connections fails
///
/// # Example
/// ```ignore
/// let listener = bind("localhost", 3040).await?;
/// serve(listener, state).await?;
/// ```
pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), ServeError> {
    let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel();
    let (reason_tx, mut reason_rx) = oneshot::channel();
    let app = router(state.with_fatal_channel(fatal_tx));

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Some(message) = fatal_rx.recv().await {
                let _ = reason_tx.send(message);
            }
        })
        .await
        .map_err(ServeError::Serve)?;

    match reason_rx.try_recv() {
        Ok(message) => Err(ServeError::Fatal(message)),
        Err(_) => Ok(()),
    }
}

/// Bind `host:port`, start the watcher for the site surface and serve.
pub async fn run(host: &str, port: u16, state: AppState) -> Result<(), ServeError> {
    tracing::info!("🍱 Starting server at http://{}:{}", host, port);
    let listener = bind(host, port).await?;

    // Held for the lifetime of the server
    let _watcher = match state.surface {
        Surface::Site => Some(watch_project(state.project_dir(), state.registry().clone())?),
        Surface::Web => None,
    };

    serve(listener, state).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transpile::OxcTranspiler;
    use tempfile::TempDir;

    fn state(surface: Surface, dir: &Path) -> AppState {
        AppState::new(
            surface,
            dir,
            Path::new(surface.default_source()),
            TrackingOptions::default(),
            Arc::new(OxcTranspiler::new()),
        )
    }

    #[test]
    fn test_source_path_resolution() {
        let temp = TempDir::new().unwrap();
        let site = state(Surface::Site, temp.path());
        assert_eq!(site.source_path(), temp.path().join("site.ts"));

        let absolute = AppState::new(
            Surface::Web,
            temp.path(),
            Path::new("/elsewhere/web.ts"),
            TrackingOptions::default(),
            Arc::new(OxcTranspiler::new()),
        );
        assert_eq!(absolute.source_path(), Path::new("/elsewhere/web.ts"));
    }

    #[test]
    fn test_render_index_missing_manifest() {
        let temp = TempDir::new().unwrap();
        let err = state(Surface::Site, temp.path()).render_index().unwrap_err();
        assert!(matches!(err, PreviewError::Manifest(_)));
        assert!(err.to_string().starts_with("Could not read plugin.json: "));
    }

    #[test]
    fn test_render_index_site_without_source() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(MANIFEST_FILENAME), r#"{"name": "Demo"}"#).unwrap();
        let html = state(Surface::Site, temp.path()).render_index().unwrap();
        assert!(html.contains("This app does not come with a <code>site.ts</code> file."));
    }

    #[test]
    fn test_render_index_web_without_source() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(MANIFEST_FILENAME), r#"{"name": "Demo"}"#).unwrap();
        let err = state(Surface::Web, temp.path()).render_index().unwrap_err();
        assert!(matches!(err, PreviewError::Build(BuildError::Read { .. })));
    }

    #[tokio::test]
    async fn test_bind_port_in_use() {
        let first = bind("127.0.0.1", 0).await.unwrap();
        let port = first.local_addr().unwrap().port();
        let second = bind("127.0.0.1", port).await;
        assert!(matches!(second, Err(ServeError::PortInUse { port: p, .. }) if p == port));
    }
}

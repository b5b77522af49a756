//! HTTP front end of the preview.
//!
//! Routes:
//! - `GET /` and `GET /<document name>`: the rendered page.
//! - `GET /modified`: `{"hash": "..."}`, polled by the page to detect changes.
//! - `GET /css/github-markdown.css`: the stylesheet, custom or bundled.
//! - anything else: static files next to the document (images and the like).

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use percent_encoding::percent_decode_str;
use preview_core::{assets, RenderEngine};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::OnceCell;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

/// Options of the presentation layer.
#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    /// Stylesheet to serve instead of the bundled one.
    pub css: Option<PathBuf>,
}

/// Body of `GET /modified`.
#[derive(Debug, Serialize)]
struct Modified {
    hash: String,
}

/// Stylesheet loaded on first request.
struct Stylesheet {
    path: Option<PathBuf>,
    content: OnceCell<String>,
}

impl Stylesheet {
    async fn load(&self) -> std::io::Result<&str> {
        let content = self
            .content
            .get_or_try_init(|| async {
                match &self.path {
                    Some(path) => tokio::fs::read_to_string(path).await,
                    None => Ok(assets::GITHUB_MARKDOWN_CSS.to_string()),
                }
            })
            .await?;
        Ok(content.as_str())
    }
}

#[derive(Clone)]
struct AppState {
    engine: Arc<RenderEngine>,
    /// `/<document name>`, decoded.
    document_route: String,
    title: String,
    stylesheet: Arc<Stylesheet>,
    static_files: ServeDir,
}

/// Build the router serving `engine`'s document.
pub fn router(engine: Arc<RenderEngine>, options: ServerOptions) -> Router {
    let document = engine.document();
    let title = document.file_name();

    let state = AppState {
        document_route: format!("/{title}"),
        static_files: ServeDir::new(document.directory()),
        stylesheet: Arc::new(Stylesheet {
            path: options.css,
            content: OnceCell::new(),
        }),
        title,
        engine,
    };

    Router::new()
        .route("/", get(preview))
        .route("/modified", get(modified))
        .route("/css/github-markdown.css", get(stylesheet))
        .fallback(fallback)
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
}

async fn preview(State(state): State<AppState>) -> Html<String> {
    let snapshot = state.engine.current_state();
    Html(assets::render_page(&state.title, &snapshot))
}

/// Only reads the in-memory snapshot, so polling it is cheap.
async fn modified(State(state): State<AppState>) -> Json<Modified> {
    Json(Modified {
        hash: state.engine.current_state().hash.clone(),
    })
}

async fn stylesheet(State(state): State<AppState>) -> Response {
    match state.stylesheet.load().await {
        Ok(css) => (
            [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
            css.to_string(),
        )
            .into_response(),
        Err(err) => {
            tracing::error!(?err, path = ?state.stylesheet.path, "Failed to load stylesheet");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

async fn fallback(State(state): State<AppState>, request: Request) -> Response {
    let path = percent_decode_str(request.uri().path()).decode_utf8_lossy();
    if path == state.document_route {
        return preview(State(state)).await.into_response();
    }

    match state.static_files.clone().oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

/// URL to open for a server bound to `addr`.
///
/// Loopback and unspecified addresses are shown as `localhost`.
pub fn preview_url(addr: SocketAddr) -> String {
    let ip = addr.ip();
    if ip.is_loopback() || ip.is_unspecified() {
        format!("http://localhost:{}", addr.port())
    } else {
        format!("http://{addr}")
    }
}

/// Open `url` in the default browser. Failure is logged and otherwise ignored.
pub fn open_browser(url: &str) {
    if let Err(err) = webbrowser::open(url) {
        tracing::error!(?err, url, "Failed to open browser");
    }
}

/// Serve `app` on `listener` until `shutdown` completes.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    tracing::debug!("Listening on {listener:?}");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use preview_core::{fingerprint, LocalConverter, WatchedDocument};
    use std::path::Path;

    async fn engine(dir: &Path, name: &str, content: &str) -> Arc<RenderEngine> {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        let document = WatchedDocument::new(path).unwrap();
        Arc::new(RenderEngine::detached(document, LocalConverter::new().into()).await)
    }

    async fn get(app: &Router, uri: &str) -> (StatusCode, String, String) {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_preview_page() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), "README.md", "# Hello").await;
        let app = router(engine, ServerOptions::default());

        for uri in ["/", "/README.md"] {
            let (status, content_type, body) = get(&app, uri).await;
            assert_eq!(status, StatusCode::OK);
            assert!(content_type.starts_with("text/html"));
            assert!(body.contains("<h1 id=\"hello\">Hello</h1>"));
            assert!(body.contains(&format!("data-hash=\"{}\"", fingerprint(b"# Hello"))));
            assert!(body.contains("<title>README.md</title>"));
        }
    }

    #[tokio::test]
    async fn test_preview_page_with_encoded_name() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), "my notes.md", "*hi*").await;
        let app = router(engine, ServerOptions::default());

        let (status, _, body) = get(&app, "/my%20notes.md").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<em>hi</em>"));
    }

    #[tokio::test]
    async fn test_modified_reads_snapshot_only() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), "README.md", "# Hello").await;
        let app = router(engine.clone(), ServerOptions::default());
        let before = engine.stats();

        let (status, content_type, body) = get(&app, "/modified").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "application/json");

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json, serde_json::json!({ "hash": fingerprint(b"# Hello") }));
        assert_eq!(engine.stats(), before);
    }

    #[tokio::test]
    async fn test_bundled_stylesheet() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), "README.md", "").await;
        let app = router(engine, ServerOptions::default());

        let (status, content_type, body) = get(&app, "/css/github-markdown.css").await;
        assert_eq!(status, StatusCode::OK);
        assert!(content_type.starts_with("text/css"));
        assert_eq!(body, assets::GITHUB_MARKDOWN_CSS);
    }

    #[tokio::test]
    async fn test_custom_stylesheet() {
        let dir = tempfile::tempdir().unwrap();
        let css = dir.path().join("dark.css");
        std::fs::write(&css, "body { background: black; }").unwrap();
        let engine = engine(dir.path(), "README.md", "").await;
        let app = router(engine, ServerOptions { css: Some(css) });

        let (status, _, body) = get(&app, "/css/github-markdown.css").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "body { background: black; }");
    }

    #[tokio::test]
    async fn test_static_files_next_to_document() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "side file").unwrap();
        let engine = engine(dir.path(), "README.md", "![img](notes.txt)").await;
        let app = router(engine, ServerOptions::default());

        let (status, _, body) = get(&app, "/notes.txt").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "side file");

        let (status, _, _) = get(&app, "/missing.png").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_preview_url() {
        assert_eq!(
            preview_url("127.0.0.1:8080".parse().unwrap()),
            "http://localhost:8080"
        );
        assert_eq!(preview_url("0.0.0.0:6419".parse().unwrap()), "http://localhost:6419");
        assert_eq!(preview_url("[::]:80".parse().unwrap()), "http://localhost:80");
        assert_eq!(
            preview_url("192.168.1.20:8080".parse().unwrap()),
            "http://192.168.1.20:8080"
        );
    }

    #[tokio::test]
    async fn test_serve_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), "README.md", "# Hello").await;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(serve(
            listener,
            router(engine, ServerOptions::default()),
            async move {
                let _ = shutdown_rx.await;
            },
        ));

        shutdown_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}

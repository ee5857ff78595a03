//! Development server with live reload
//!
//! Serves the output tree over HTTP with `tower_http`'s `ServeDir`. Browsers
//! subscribe to reload signals on `/__livereload` (Server-Sent Events) through
//! a script injected into every HTML response.

use crate::config::ServerConfig;
use crate::error::{TaskError, TaskResult};
use crate::runner::{Context, Task};
use crate::ui;
use anyhow::Context as _;
use async_stream::stream;
use async_trait::async_trait;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::middleware;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tower_http::services::ServeDir;

/// Route browsers subscribe to for reload events
pub const LIVERELOAD_PATH: &str = "/__livereload";

const LIVERELOAD_SCRIPT: &str = "<script>(function(){var s=new EventSource('/__livereload');\
s.addEventListener('reload',function(){location.reload();});})();</script>";

/// Broadcasts reload signals to connected browsers
#[derive(Debug, Clone)]
pub struct Reloader {
    tx: broadcast::Sender<u64>,
    count: Arc<AtomicU64>,
}

impl Reloader {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Reloader {
            tx,
            count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Signal every subscriber; a no-op when nobody listens
    pub fn reload(&self) {
        let n = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.tx.send(n);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<u64> {
        self.tx.subscribe()
    }

    /// Reload signals sent so far
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }
}

impl Default for Reloader {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the router serving `root`
///
/// Directories map to their `index.html`; paths escaping `root` are refused.
pub fn router(root: PathBuf, livereload: bool, reloader: Reloader) -> Router {
    let app = Router::new().fallback_service(ServeDir::new(root));
    if !livereload {
        return app;
    }
    app.route(LIVERELOAD_PATH, get(livereload_events).with_state(reloader))
        .layer(middleware::map_response(inject_livereload))
}

/// Bind the listener and serve in the background; returns the bound address
pub async fn start(
    config: &ServerConfig,
    root: PathBuf,
    reloader: Reloader,
) -> anyhow::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?;
    let addr = listener
        .local_addr()
        .context("failed to read the bound address")?;

    let app = router(root, config.livereload, reloader);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "dev server terminated");
        }
    });

    Ok(addr)
}

async fn livereload_events(
    State(reloader): State<Reloader>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let mut rx = reloader.subscribe();

    let events = stream! {
        loop {
            match rx.recv().await {
                Ok(n) => yield Ok(Event::default().event("reload").data(n.to_string())),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "live-reload subscriber lagged");
                    yield Ok(Event::default().event("reload").data("lagged"));
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

/// Add the reload script to successful HTML responses
async fn inject_livereload(response: Response) -> Response {
    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/html"));
    if response.status() != StatusCode::OK || !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "failed to buffer html response");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let html = inject_script(&String::from_utf8_lossy(&bytes));
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(html))
}

/// Insert the reload script before `</body>`, or append it
pub fn inject_script(html: &str) -> String {
    match html.rfind("</body>") {
        Some(pos) => format!("{}{}{}", &html[..pos], LIVERELOAD_SCRIPT, &html[pos..]),
        None => format!("{}{}", html, LIVERELOAD_SCRIPT),
    }
}

/// Open `url` with the platform's default handler
pub fn open_browser(url: &str) -> std::io::Result<()> {
    let mut command = if cfg!(target_os = "macos") {
        Command::new("open")
    } else if cfg!(windows) {
        let mut command = Command::new("cmd");
        command.args(["/C", "start", ""]);
        command
    } else {
        Command::new("xdg-open")
    };

    command
        .arg(url)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
}

/// The `serve` task: starts the dev server once per process
pub struct ServeTask {
    config: ServerConfig,
    started: AtomicBool,
}

impl ServeTask {
    pub fn from_config(config: &ServerConfig) -> Self {
        ServeTask {
            config: config.clone(),
            started: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Task for ServeTask {
    async fn run(&self, ctx: &Context) -> TaskResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::debug!("dev server already running");
            return Ok(());
        }

        let root = ctx.resolve(&self.config.root);
        let addr = match start(&self.config, root, ctx.reloader.clone()).await {
            Ok(addr) => addr,
            Err(e) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(TaskError::Server(format!("{e:#}")));
            }
        };
        ctx.mark_background();

        let url = format!("http://{}:{}", self.config.host, addr.port());
        tracing::info!(%addr, livereload = self.config.livereload, "dev server listening");
        ui::log_color("green", &format!("serving {} at {}", self.config.root, url));

        if self.config.open {
            if let Err(e) = open_browser(&url) {
                tracing::warn!(error = %e, "could not open a browser");
            }
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!(
            "serve {} on {}:{}",
            self.config.root, self.config.host, self.config.port
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::time::Instant;

    async fn get_raw(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            path
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8_lossy(&response).into_owned()
    }

    fn test_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            open: false,
            ..ServerConfig::default()
        }
    }

    #[test]
    fn test_inject_script() {
        let html = inject_script("<html><body><p>hi</p></body></html>");
        assert!(html.contains("<p>hi</p><script>"));
        assert!(html.ends_with("</script></body></html>"));

        let fragment = inject_script("<p>hi</p>");
        assert!(fragment.starts_with("<p>hi</p><script>"));
    }

    #[test]
    fn test_reloader_counts_and_broadcasts() {
        let reloader = Reloader::new();
        reloader.reload();
        let mut rx = reloader.subscribe();
        reloader.reload();
        assert_eq!(rx.try_recv().unwrap(), 2);
        assert_eq!(reloader.count(), 2);
    }

    #[tokio::test]
    async fn test_serves_files_with_reload_script() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("css")).unwrap();
        fs::write(temp.path().join("index.html"), "<body>home</body>").unwrap();
        fs::write(temp.path().join("css/main.css"), "a{}").unwrap();

        let addr = start(&test_config(), temp.path().to_path_buf(), Reloader::new())
            .await
            .unwrap();

        let index = get_raw(addr, "/").await;
        assert!(index.starts_with("HTTP/1.1 200"));
        assert!(index.contains("home<script>"));
        assert!(index.contains(LIVERELOAD_PATH));

        let css = get_raw(addr, "/css/main.css").await;
        assert!(css.contains("text/css"));
        assert!(css.ends_with("a{}"));

        let missing = get_raw(addr, "/nope.html").await;
        assert!(missing.starts_with("HTTP/1.1 404"));
    }

    #[tokio::test]
    async fn test_decodes_paths_and_refuses_escapes() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("dist");
        fs::create_dir_all(root.join("blog")).unwrap();
        fs::write(root.join("my page.html"), "<p>spaced</p>").unwrap();
        fs::write(root.join("blog/index.html"), "<p>blog</p>").unwrap();
        fs::write(root.join("café.txt"), "latte").unwrap();
        fs::write(temp.path().join("secret.txt"), "hidden").unwrap();

        let addr = start(&test_config(), root, Reloader::new()).await.unwrap();

        let spaced = get_raw(addr, "/my%20page.html").await;
        assert!(spaced.starts_with("HTTP/1.1 200"));
        assert!(spaced.contains("<p>spaced</p><script>"));

        let accented = get_raw(addr, "/caf%C3%A9.txt").await;
        assert!(accented.starts_with("HTTP/1.1 200"));
        assert!(accented.ends_with("latte"));

        let blog = get_raw(addr, "/blog/").await;
        assert!(blog.contains("<p>blog</p>"));

        let escaped = get_raw(addr, "/../secret.txt").await;
        assert!(!escaped.contains("hidden"));
        let encoded = get_raw(addr, "/%2E%2E/secret.txt").await;
        assert!(!encoded.contains("hidden"));
    }

    #[tokio::test]
    async fn test_without_livereload_html_is_untouched() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("index.html"), "<body>home</body>").unwrap();
        let config = ServerConfig {
            livereload: false,
            ..test_config()
        };

        let addr = start(&config, temp.path().to_path_buf(), Reloader::new())
            .await
            .unwrap();

        let index = get_raw(addr, "/index.html").await;
        assert!(index.ends_with("<body>home</body>"));
        let events = get_raw(addr, LIVERELOAD_PATH).await;
        assert!(events.starts_with("HTTP/1.1 404"));
    }

    #[tokio::test]
    async fn test_livereload_stream_emits_reload_events() {
        let temp = TempDir::new().unwrap();
        let reloader = Reloader::new();
        let addr = start(&test_config(), temp.path().to_path_buf(), reloader.clone())
            .await
            .unwrap();

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\nAccept: text/event-stream\r\n\r\n",
            LIVERELOAD_PATH
        );
        stream.write_all(request.as_bytes()).await.unwrap();

        // Keep signalling until the subscription is live and an event arrives
        let mut received = String::new();
        let mut buf = [0u8; 1024];
        let deadline = Instant::now() + Duration::from_secs(10);
        while !received.contains("event: reload") {
            assert!(Instant::now() < deadline, "no reload event in: {received}");
            reloader.reload();
            let read = tokio::time::timeout(Duration::from_millis(200), stream.read(&mut buf)).await;
            if let Ok(read) = read {
                let n = read.unwrap();
                assert!(n > 0, "stream closed early: {received}");
                received.push_str(&String::from_utf8_lossy(&buf[..n]));
            }
        }

        assert!(received.starts_with("HTTP/1.1 200"));
        assert!(received.contains("text/event-stream"));
    }

    #[tokio::test]
    async fn test_serve_task_starts_once() {
        let temp = TempDir::new().unwrap();
        let ctx = Context::new(temp.path().to_path_buf());
        let task = ServeTask::from_config(&test_config());

        task.run(&ctx).await.unwrap();
        assert!(ctx.has_background());
        // A second run (e.g. from a re-run request) leaves the server alone
        task.run(&ctx).await.unwrap();
    }
}

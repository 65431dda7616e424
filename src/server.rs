use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Request, State},
    handler::Handler,
    http::{header, HeaderValue, Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use serde::Serialize;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};
use tracing::{debug, error, info};

use crate::config::ServerCfg;
use crate::stats_proxy::{StatsClient, StatsPayload};

/// Request paths with these extensions are cached for a year.
pub const CACHED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

pub const LONG_CACHE: &str = "public, max-age=31536000";
pub const NO_CACHE: &str = "no-cache";

/// Bytes escaped in listing hrefs.
const HREF_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ').add(b'"').add(b'#').add(b'%').add(b'<').add(b'>').add(b'?').add(b'`').add(b'{').add(b'}');

#[derive(Clone)]
pub struct AppState {
    stats: Arc<StatsClient>,
}

pub fn router(cfg: &ServerCfg) -> Result<Router> {
    let stats = StatsClient::new(&cfg.stats).context("failed to set up stats proxy")?;
    let state = AppState { stats: Arc::new(stats) };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let app = Router::new()
        .route(&cfg.stats_route, get(opensea_stats).fallback(method_not_allowed))
        .fallback_service(ServeDir::new(&cfg.root).fallback(directory_listing.with_state(Arc::new(cfg.root.clone()))))
        .layer(cors)
        .layer(middleware::from_fn(response_headers))
        // Idle/Handling: one request is answered before the next starts
        .layer(GlobalConcurrencyLimitLayer::new(1))
        .with_state(state);
    Ok(app)
}

/// Binds and serves until Ctrl-C.
pub async fn serve(cfg: ServerCfg) -> Result<()> {
    cfg.validate()?;
    let app = router(&cfg)?;

    let listener = tokio::net::TcpListener::bind(cfg.addr())
        .await
        .with_context(|| format!("failed to bind {}", cfg.addr()))?;
    info!(root = %cfg.root.display(), "serving files");
    println!("Server running at http://localhost:{}/", cfg.port);
    println!("Press Ctrl+C to stop the server");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    println!("\nServer stopped.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}

pub fn cache_control_for(path: &str) -> &'static str {
    let ext = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match ext {
        Some(ext) if CACHED_EXTENSIONS.contains(&ext.as_str()) => LONG_CACHE,
        _ => NO_CACHE,
    }
}

async fn response_headers(req: Request, next: Next) -> Response {
    let cache = cache_control_for(req.uri().path());
    let mut res = next.run(req).await;
    let headers = res.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("GET"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(cache));
    res
}

async fn opensea_stats(State(st): State<AppState>) -> Result<Json<StatsPayload>, ApiErr> {
    let payload = st.stats.fetch().await.map_err(|e| {
        error!("error fetching OpenSea data: {e}");
        ApiErr::internal(e)
    })?;
    Ok(Json(payload))
}

/// Maps a request path onto a directory under `root`. `None` for anything that
/// escapes the root or is not a directory.
fn resolve_dir(root: &Path, uri_path: &str) -> Option<PathBuf> {
    let decoded = percent_decode_str(uri_path).decode_utf8().ok()?;
    let mut dir = root.to_path_buf();
    for comp in Path::new(decoded.trim_start_matches('/')).components() {
        match comp {
            Component::Normal(part) => dir.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    dir.is_dir().then_some(dir)
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Entry names of `dir`, sorted case-insensitively, directories suffixed with `/`.
pub async fn list_entries(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    let mut rd = tokio::fs::read_dir(dir).await?;
    while let Some(ent) = rd.next_entry().await? {
        let mut name = ent.file_name().to_string_lossy().to_string();
        if ent.file_type().await?.is_dir() {
            name.push('/');
        }
        names.push(name);
    }
    names.sort_by_key(|n| n.to_lowercase());
    Ok(names)
}

pub fn render_listing(display_path: &str, entries: &[String]) -> String {
    let title = escape_html(display_path);
    let mut html = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>Directory listing for {title}</title>\n</head>\n<body>\n<h1>Directory listing for {title}</h1>\n<hr>\n<ul>\n"
    );
    for name in entries {
        let href = utf8_percent_encode(name, HREF_ESCAPE);
        html.push_str(&format!("<li><a href=\"{href}\">{}</a></li>\n", escape_html(name)));
    }
    html.push_str("</ul>\n<hr>\n</body>\n</html>\n");
    html
}

/// Reached when `ServeDir` finds nothing: directories without `index.html`
/// get an HTML index, everything else a 404.
async fn directory_listing(State(root): State<Arc<PathBuf>>, uri: Uri) -> Response {
    let Some(dir) = resolve_dir(&root, uri.path()) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match list_entries(&dir).await {
        Ok(entries) => {
            let shown = percent_decode_str(uri.path()).decode_utf8_lossy();
            Html(render_listing(&shown, &entries)).into_response()
        }
        Err(e) => {
            debug!("failed to list {}: {e}", dir.display());
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

async fn method_not_allowed() -> ApiErr {
    ApiErr { status: StatusCode::METHOD_NOT_ALLOWED, message: "Method not allowed".into() }
}

#[derive(Debug)]
struct ApiErr {
    status: StatusCode,
    message: String,
}

impl ApiErr {
    fn internal(e: impl std::fmt::Display) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, message: e.to_string() }
    }
}

impl IntoResponse for ApiErr {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
        }
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_paths_get_long_cache() {
        assert_eq!(cache_control_for("/photo.jpg"), LONG_CACHE);
        assert_eq!(cache_control_for("/Nifty%20Photos_thumbnails/a.JPEG"), LONG_CACHE);
        assert_eq!(cache_control_for("/img/anim.gif"), LONG_CACHE);
        assert_eq!(cache_control_for("/x.webp"), LONG_CACHE);
    }

    #[test]
    fn listing_escapes_names_and_links() {
        let html = render_listing("/a&b/", &["x <y>.jpg".to_string(), "sub/".to_string()]);
        assert!(html.contains("Directory listing for /a&amp;b/"));
        assert!(html.contains(r#"<a href="x%20%3Cy%3E.jpg">x &lt;y&gt;.jpg</a>"#));
        assert!(html.contains(r#"<a href="sub/">sub/</a>"#));
    }

    #[test]
    fn listing_paths_stay_under_root() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("my dir")).unwrap();
        std::fs::write(tmp.path().join("file.txt"), "x").unwrap();

        assert_eq!(resolve_dir(tmp.path(), "/my%20dir/"), Some(tmp.path().join("my dir")));
        assert_eq!(resolve_dir(tmp.path(), "/"), Some(tmp.path().to_path_buf()));
        assert_eq!(resolve_dir(tmp.path(), "/file.txt"), None);
        assert_eq!(resolve_dir(tmp.path(), "/../"), None);
        assert_eq!(resolve_dir(tmp.path(), "/%2e%2e/"), None);
    }

    #[test]
    fn everything_else_is_not_cached() {
        assert_eq!(cache_control_for("/index.html"), NO_CACHE);
        assert_eq!(cache_control_for("/"), NO_CACHE);
        assert_eq!(cache_control_for("/api/opensea-stats"), NO_CACHE);
        assert_eq!(cache_control_for("/script.js"), NO_CACHE);
        assert_eq!(cache_control_for("/jpg"), NO_CACHE);
    }
}

use std::path::Path;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    routing::get,
    Json, Router,
};
use gallery_tools::{server, ServerCfg, StatsProxyCfg};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const STATS_PATH: &str = "/api/v1/collection/otterful-otters/stats";
const COLLECTION_PATH: &str = "/api/v1/collection/otterful-otters";

async fn spawn_upstream(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
}

fn app(root: &Path, upstream: &str) -> Router {
    let cfg = ServerCfg {
        root: root.to_path_buf(),
        stats: StatsProxyCfg { upstream: upstream.into(), timeout_secs: 5, ..StatsProxyCfg::default() },
        ..ServerCfg::default()
    };
    server::router(&cfg).unwrap()
}

async fn send(app: Router, method: &str, uri: &str) -> Response {
    let req = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
    app.oneshot(req).await.unwrap()
}

async fn json_body(res: Response) -> Value {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn header_str<'a>(res: &'a Response, name: header::HeaderName) -> &'a str {
    res.headers().get(name).and_then(|v| v.to_str().ok()).unwrap_or("")
}

fn site() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("index.html"), "<h1>otters</h1>").unwrap();
    std::fs::write(dir.path().join("photo.jpg"), [0xFF, 0xD8, 0xFF, 0xD9]).unwrap();
    dir
}

#[tokio::test]
async fn static_files_get_cache_and_cors_headers() {
    let dir = site();
    let app = app(dir.path(), "http://127.0.0.1:1");

    let res = send(app.clone(), "GET", "/photo.jpg").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(header_str(&res, header::CACHE_CONTROL), "public, max-age=31536000");
    assert_eq!(header_str(&res, header::ACCESS_CONTROL_ALLOW_ORIGIN), "*");
    assert_eq!(header_str(&res, header::ACCESS_CONTROL_ALLOW_METHODS), "GET");
    assert_eq!(header_str(&res, header::CONTENT_TYPE), "image/jpeg");

    let res = send(app.clone(), "GET", "/index.html").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(header_str(&res, header::CACHE_CONTROL), "no-cache");
    assert_eq!(header_str(&res, header::ACCESS_CONTROL_ALLOW_ORIGIN), "*");
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"<h1>otters</h1>");

    let res = send(app, "GET", "/missing.png").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(header_str(&res, header::CACHE_CONTROL), "public, max-age=31536000");
    assert_eq!(header_str(&res, header::ACCESS_CONTROL_ALLOW_ORIGIN), "*");
}

#[tokio::test]
async fn stats_route_merges_both_payloads() {
    let upstream = spawn_upstream(
        Router::new()
            .route(STATS_PATH, get(|| async { Json(json!({"stats": {"floor_price": 0.42, "num_owners": 310}})) }))
            .route(COLLECTION_PATH, get(|| async { Json(json!({"collection": {"name": "Otterful Otters"}})) })),
    )
    .await;
    let dir = site();

    let res = send(app(dir.path(), &upstream), "GET", "/api/opensea-stats").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(header_str(&res, header::CONTENT_TYPE), "application/json");
    assert_eq!(header_str(&res, header::CACHE_CONTROL), "no-cache");
    assert_eq!(header_str(&res, header::ACCESS_CONTROL_ALLOW_ORIGIN), "*");
    assert_eq!(
        json_body(res).await,
        json!({
            "stats": {"floor_price": 0.42, "num_owners": 310},
            "collection": {"name": "Otterful Otters"},
        })
    );
}

#[tokio::test]
async fn collection_failure_is_not_fatal() {
    let upstream = spawn_upstream(
        Router::new().route(STATS_PATH, get(|| async { Json(json!({"stats": {"floor_price": 1}})) })),
    )
    .await;
    let dir = site();

    let res = send(app(dir.path(), &upstream), "GET", "/api/opensea-stats").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await, json!({"stats": {"floor_price": 1}, "collection": {}}));
}

#[tokio::test]
async fn upstream_error_status_becomes_500() {
    let upstream = spawn_upstream(
        Router::new().route(STATS_PATH, get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "maintenance") })),
    )
    .await;
    let dir = site();

    let res = send(app(dir.path(), &upstream), "GET", "/api/opensea-stats").await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(header_str(&res, header::ACCESS_CONTROL_ALLOW_ORIGIN), "*");
    let body = json_body(res).await;
    let msg = body["error"].as_str().unwrap();
    assert!(msg.contains("503"), "{msg}");
    assert!(msg.contains("maintenance"), "{msg}");
}

#[tokio::test]
async fn unreachable_upstream_becomes_500() {
    let dir = site();
    let app = app(dir.path(), "http://127.0.0.1:1");

    let res = send(app.clone(), "GET", "/api/opensea-stats").await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json_body(res).await.get("error").is_some());

    // still serving afterwards
    let res = send(app, "GET", "/index.html").await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn stats_route_rejects_other_methods() {
    let dir = site();
    let res = send(app(dir.path(), "http://127.0.0.1:1"), "POST", "/api/opensea-stats").await;
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(json_body(res).await, json!({"error": "Method not allowed"}));
}

#[tokio::test]
async fn requests_are_handled_one_at_a_time() {
    let upstream = spawn_upstream(
        Router::new()
            .route(
                STATS_PATH,
                get(|| async {
                    tokio::time::sleep(Duration::from_millis(800)).await;
                    Json(json!({"stats": {"floor_price": 2}}))
                }),
            )
            .route(COLLECTION_PATH, get(|| async { Json(json!({"collection": {}})) })),
    )
    .await;
    let dir = site();
    let app = app(dir.path(), &upstream);

    let stats_app = app.clone();
    let slow = tokio::spawn(async move {
        let res = send(stats_app, "GET", "/api/opensea-stats").await;
        (res.status(), Instant::now())
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let res = send(app, "GET", "/index.html").await;
    let page_done = Instant::now();
    assert_eq!(res.status(), StatusCode::OK);

    let (stats_status, stats_done) = slow.await.unwrap();
    assert_eq!(stats_status, StatusCode::OK);
    assert!(page_done >= stats_done, "page answered while stats request was in flight");
}

#[tokio::test]
async fn directory_without_index_is_listed() {
    let dir = site();
    let sub = dir.path().join("Nifty Photos_thumbnails");
    std::fs::create_dir_all(sub.join("nested")).unwrap();
    std::fs::write(sub.join("a.jpg"), [0xFF, 0xD8, 0xFF, 0xD9]).unwrap();
    std::fs::write(sub.join("B & c.png"), b"x").unwrap();
    let app = app(dir.path(), "http://127.0.0.1:1");

    let res = send(app.clone(), "GET", "/Nifty%20Photos_thumbnails/").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(header_str(&res, header::CONTENT_TYPE), "text/html; charset=utf-8");
    assert_eq!(header_str(&res, header::CACHE_CONTROL), "no-cache");
    assert_eq!(header_str(&res, header::ACCESS_CONTROL_ALLOW_ORIGIN), "*");
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(body.to_vec()).unwrap();
    assert!(html.contains("Directory listing for /Nifty Photos_thumbnails/"), "{html}");
    assert!(html.contains(r#"<a href="a.jpg">a.jpg</a>"#), "{html}");
    assert!(html.contains(r#"<a href="B%20&%20c.png">B &amp; c.png</a>"#), "{html}");
    assert!(html.contains(r#"<a href="nested/">nested/</a>"#), "{html}");
    assert!(html.find("a.jpg").unwrap() < html.find("B &amp; c.png").unwrap());

    // a directory with index.html still gets the page
    let res = send(app.clone(), "GET", "/").await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"<h1>otters</h1>");

    let res = send(app, "GET", "/nowhere/").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

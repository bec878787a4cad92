//! Integration tests for web routes.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use mbasic_scraper::config::Config;
use mbasic_scraper::signer::UrlSigner;
use mbasic_scraper::web::{create_app, AppState};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use common::{photo_post_page, scraper, years_page, ScriptedTransport};

const KEY: &str = "letmein";
const ASSET: &str = "https://scontent.xx.fbcdn.net/v/a.jpg";

/// Create a test app over a scripted transport, keyed with [`KEY`].
fn create_test_app(transport: &Arc<ScriptedTransport>, dir: &TempDir) -> (Router, Arc<UrlSigner>) {
    let config = Config {
        api_key: Some(KEY.to_string()),
        ..Config::for_testing()
    };
    let signer = Arc::new(UrlSigner::new(config.url_signing_secret.clone()));
    let scraper = scraper(transport, dir.path()).with_signer(signer.clone());

    let state = AppState {
        scraper: Arc::new(scraper),
        config: Arc::new(config),
    };
    (create_app(state), signer)
}

fn seeded_transport() -> Arc<ScriptedTransport> {
    let transport = ScriptedTransport::new();
    transport.page("/profile.php?id=zuck", &years_page());
    transport.page("/222", &photo_post_page("222"));
    transport.asset(
        ASSET,
        "JPEGDATA",
        vec![("content-type", "image/jpeg"), ("set-cookie", "datr=abc")],
    );
    transport
}

async fn get(app: Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, body.to_vec())
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let (status, _, body) = get(app, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_health_endpoint() {
    let dir = TempDir::new().unwrap();
    let (app, _) = create_test_app(&ScriptedTransport::new(), &dir);

    let (status, _, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"OK");
}

#[tokio::test]
async fn test_api_requires_key() {
    let dir = TempDir::new().unwrap();
    let transport = seeded_transport();
    let (app, _) = create_test_app(&transport, &dir);

    let (status, json) = get_json(app.clone(), "/api?action=getTimelineYears&username=zuck").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], 401);
    assert_eq!(json["error"], "Unauthorized");

    let (status, _) = get_json(app, "/api?action=getTimelineYears&username=zuck&key=wrong").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_api_bad_requests() {
    let dir = TempDir::new().unwrap();
    let (app, _) = create_test_app(&seeded_transport(), &dir);

    for uri in [
        format!("/api?key={KEY}"),
        format!("/api?key={KEY}&action=deletePost"),
        format!("/api?key={KEY}&action=getTimelineYears"),
        format!("/api?key={KEY}&action=getPost"),
        format!("/api?key={KEY}&action=getTimelinePosts&username=zuck&year=latest"),
        format!("/api?key={KEY}&action=getTimelinePosts&username=zuck&limit=-1"),
    ] {
        let (status, json) = get_json(app.clone(), &uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(json["code"], 400, "{uri}");
        assert!(json["error"].as_str().unwrap().starts_with("Bad request"), "{uri}");
    }
}

#[tokio::test]
async fn test_api_timeline_years() {
    let dir = TempDir::new().unwrap();
    let (app, _) = create_test_app(&seeded_transport(), &dir);

    let (status, json) = get_json(
        app,
        &format!("/api?key={KEY}&action=getTimelineYears&username=zuck"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["code"], 200);
    assert_eq!(json["res"]["2020"], "/y/2020");
    assert_eq!(json["res"]["2021"], "/y/2021");
}

#[tokio::test]
async fn test_api_get_post() {
    let dir = TempDir::new().unwrap();
    let (app, _) = create_test_app(&seeded_transport(), &dir);

    let (status, json) = get_json(app, &format!("/api?key={KEY}&action=getPost&id=222")).await;

    assert_eq!(status, StatusCode::OK);
    let res = &json["res"];
    assert_eq!(res["info"]["top_level_post_id"], "222");
    assert_eq!(res["content"]["kind"], "photo");
    assert_eq!(res["content"]["text"], "Beach day");
    assert_eq!(res["content"]["photos"][0]["width"], 640);
    assert_eq!(res["embeddedLink"]["url"], "https://example.org/a");
    assert!(res["embeddedLink"]["imagePreview"]["url"].is_string());
}

#[tokio::test]
async fn test_api_invalid_post_id() {
    let dir = TempDir::new().unwrap();
    let transport = seeded_transport();
    let (app, _) = create_test_app(&transport, &dir);

    let (status, json) = get_json(
        app,
        &format!("/api?key={KEY}&action=getPost&id=not-a-valid-id"),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("invalid identifier"));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_api_unknown_year() {
    let dir = TempDir::new().unwrap();
    let (app, _) = create_test_app(&seeded_transport(), &dir);

    let (status, json) = get_json(
        app,
        &format!("/api?key={KEY}&action=getTimelinePosts&username=zuck&year=1999"),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], 422);
    assert_eq!(json["error"], "Error: year 1999 not found");
}

#[tokio::test]
async fn test_api_transport_failure() {
    let dir = TempDir::new().unwrap();
    let (app, _) = create_test_app(&ScriptedTransport::new(), &dir);

    let (status, json) = get_json(
        app,
        &format!("/api?key={KEY}&action=getTimelineYears&username=nobody"),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], 502);
}

#[tokio::test]
async fn test_proxy_direct_url() {
    let dir = TempDir::new().unwrap();
    let (app, _) = create_test_app(&seeded_transport(), &dir);

    let (status, headers, body) = get(app, &format!("/proxy?key={KEY}&url={ASSET}")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "image/jpeg");
    assert!(headers.get("set-cookie").is_none());
    assert_eq!(body, b"JPEGDATA");
}

#[tokio::test]
async fn test_proxy_direct_url_requires_key() {
    let dir = TempDir::new().unwrap();
    let (app, _) = create_test_app(&seeded_transport(), &dir);

    let (status, _, _) = get(app, &format!("/proxy?url={ASSET}")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_proxy_rejects_foreign_host() {
    let dir = TempDir::new().unwrap();
    let transport = seeded_transport();
    let (app, _) = create_test_app(&transport, &dir);

    let (status, json) = get_json(
        app,
        &format!("/proxy?key={KEY}&url=https://evil.example/a.jpg"),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], 403);
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_proxy_signed_token_needs_no_key() {
    let dir = TempDir::new().unwrap();
    let (app, signer) = create_test_app(&seeded_transport(), &dir);

    let (status, _, body) = get(app, &format!("/proxy?t={}", signer.sign(ASSET))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"JPEGDATA");
}

#[tokio::test]
async fn test_proxy_bad_token() {
    let dir = TempDir::new().unwrap();
    let (app, _) = create_test_app(&seeded_transport(), &dir);

    let (status, json) = get_json(app.clone(), "/proxy?t=AAAAAAAAAAAAAAAAAAAAAAAAAA").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "Error: signature verification failed");

    let (status, _) = get_json(app, "/proxy").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

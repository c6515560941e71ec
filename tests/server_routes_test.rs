//! HTTP surface integration tests
//!
//! Drives the axum router with `tower::ServiceExt::oneshot` while wiremock
//! stands in for the resource and authorization servers.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mcp_installer::mcp::auth::registration::ClientInfo;
use mcp_installer::{create_router, AppState, AuthManager};

mod common;
use common::{
    mount_oidc_configuration, mount_registration, mount_resource_metadata, query_param,
    resource_metadata, REDIRECT_URI,
};

const RESOURCE: &str = "http://localhost:8080";

fn app() -> Router {
    app_for(RESOURCE)
}

fn app_for(resource: &str) -> Router {
    let config = common::test_config(resource);
    let manager = AuthManager::new(
        common::http_client(),
        common::session_store(),
        &config.client.client_name,
        &config.redirect_uri(),
        config.request_timeout(),
    );
    create_router(AppState::new(manager, config))
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Returns `name=value` from the response's `Set-Cookie` header.
fn session_cookie(response: &axum::response::Response) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &serde_json::Value, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn client_info(resource: &str, issuer: &str) -> ClientInfo {
    ClientInfo::from(&common::registration(
        resource,
        issuer,
        mcp_installer::mcp::auth::registration::Protocol::Oidc,
    ))
}

/// Installs `info` and returns the session cookie that was issued.
async fn install(app: &Router, info: &ClientInfo) -> String {
    let response = app
        .clone()
        .oneshot(post_json(
            "/auth/install",
            &serde_json::to_value(info).unwrap(),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response).expect("install should issue a session");
    assert_eq!(body_json(response).await, serde_json::json!({ "message": "ok" }));
    cookie
}

// ---------------------------------------------------------------------------
// Global endpoints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_health() {
    let response = app().oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(session_cookie(&response).is_none());

    let body = body_json(response).await;
    assert_eq!(body["healthy"], true);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_list_servers() {
    let response = app().oneshot(get("/api/servers", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        serde_json::json!([{ "name": "Todo API", "address": RESOURCE }])
    );
}

// ---------------------------------------------------------------------------
// /auth/discover
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_discover_requires_address() {
    for body in [serde_json::json!({}), serde_json::json!({ "address": "  " })] {
        let response = app()
            .oneshot(post_json("/auth/discover", &body, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "bad_request");
    }
}

#[tokio::test]
async fn test_discover_streams_ndjson() {
    let resource = MockServer::start().await;
    let auth = MockServer::start().await;
    mount_resource_metadata(
        &resource,
        resource_metadata(&resource.uri(), &auth.uri(), &["todos:read"]),
    )
    .await;
    mount_oidc_configuration(&auth, &[]).await;
    mount_registration(&auth, "client-123", "secret-456").await;

    let response = app_for(&resource.uri())
        .oneshot(post_json(
            "/auth/discover",
            &serde_json::json!({ "address": resource.uri() }),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/x-ndjson"
    );

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.ends_with('\n'));

    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines[0]["message"], format!("Discovering {}", resource.uri()));
    let last = lines.last().unwrap();
    assert_eq!(last["message"], "Done.");
    assert_eq!(last["clientId"], "client-123");
    assert_eq!(last["resource"], resource.uri());
}

#[tokio::test]
async fn test_discover_trims_address_before_matching() {
    let resource = MockServer::start().await;
    let auth = MockServer::start().await;
    mount_resource_metadata(
        &resource,
        resource_metadata(&resource.uri(), &auth.uri(), &["todos:read"]),
    )
    .await;
    mount_oidc_configuration(&auth, &[]).await;
    mount_registration(&auth, "client-123", "secret-456").await;

    let response = app_for(&resource.uri())
        .oneshot(post_json(
            "/auth/discover",
            &serde_json::json!({ "address": format!("  {}\n", resource.uri()) }),
            None,
        ))
        .await
        .unwrap();

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let lines: Vec<serde_json::Value> = String::from_utf8_lossy(&bytes)
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines[0]["message"], format!("Discovering {}", resource.uri()));
    let last = lines.last().unwrap();
    assert_eq!(last["message"], "Done.");
    assert_eq!(last["resource"], resource.uri());
}

#[tokio::test]
async fn test_discover_failure_is_streamed_not_status() {
    let response = app()
        .oneshot(post_json(
            "/auth/discover",
            &serde_json::json!({ "address": "http://127.0.0.1:1" }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let last: serde_json::Value =
        serde_json::from_str(String::from_utf8_lossy(&bytes).lines().last().unwrap()).unwrap();
    assert_eq!(last["error"], "metadata_fetch");
    assert!(last["message"]
        .as_str()
        .unwrap()
        .starts_with("Install failed:"));
}

// ---------------------------------------------------------------------------
// /auth/install
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_install_rejects_invalid_payload() {
    let mut payload = serde_json::to_value(client_info(RESOURCE, "http://localhost:8081")).unwrap();
    payload.as_object_mut().unwrap().remove("clientSecret");

    let response = app()
        .oneshot(post_json("/auth/install", &payload, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "validation");
}

#[tokio::test]
async fn test_install_keeps_existing_session() {
    let app = app();
    let cookie = install(&app, &client_info(RESOURCE, "http://localhost:8081")).await;

    let response = app
        .clone()
        .oneshot(get(
            &format!("/auth/status?resource={}", RESOURCE),
            Some(&cookie),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(session_cookie(&response).is_none());

    let status = body_json(response).await;
    assert_eq!(status["installed"], true);
    assert_eq!(status["authorized"], false);
}

#[tokio::test]
async fn test_unknown_session_cookie_is_replaced() {
    let response = app()
        .oneshot(get(
            &format!("/auth/status?resource={}", RESOURCE),
            Some("chat_session=forged"),
        ))
        .await
        .unwrap();

    let cookie = session_cookie(&response).expect("a new session should be issued");
    assert!(cookie.starts_with("chat_session="));
    assert_ne!(cookie, "chat_session=forged");

    let set_cookie = response.headers().get(header::SET_COOKIE).unwrap();
    let set_cookie = set_cookie.to_str().unwrap();
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
    assert!(set_cookie.contains("Path=/"));

    assert_eq!(body_json(response).await["installed"], false);
}

// ---------------------------------------------------------------------------
// /auth/start and /auth/callback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_start_requires_resource() {
    let response = app().oneshot(get("/auth/start", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_start_without_registration_is_not_found() {
    let response = app()
        .oneshot(get(&format!("/auth/start?resource={}", RESOURCE), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "not_found");
}

#[tokio::test]
async fn test_start_with_unreachable_server_is_bad_gateway() {
    let app = app();
    let cookie = install(&app, &client_info(RESOURCE, "http://127.0.0.1:1")).await;

    let response = app
        .oneshot(get(
            &format!("/auth/start?resource={}", RESOURCE),
            Some(&cookie),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["code"], "metadata_fetch");
}

#[tokio::test]
async fn test_callback_without_transaction_is_bad_request() {
    let response = app()
        .oneshot(get("/auth/callback?code=abc&state=xyz", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "no_transaction");
}

#[tokio::test]
async fn test_full_authorization_round_trip() {
    let auth = MockServer::start().await;
    mount_oidc_configuration(&auth, &[]).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "access-abc",
            "token_type": "Bearer",
            "expires_in": 3600,
            "refresh_token": "refresh-xyz",
            "id_token": "header.payload.signature"
        })))
        .expect(1)
        .mount(&auth)
        .await;

    let app = app();
    let cookie = install(&app, &client_info(RESOURCE, &auth.uri())).await;

    // Start redirects the browser to the authorization endpoint.
    let response = app
        .clone()
        .oneshot(get(
            &format!("/auth/start?resource={}", RESOURCE),
            Some(&cookie),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap();
    let location = url::Url::parse(location).unwrap();
    assert_eq!(location.path(), "/authorize");
    assert_eq!(
        query_param(&location, "redirect_uri").as_deref(),
        Some(REDIRECT_URI)
    );
    let state = query_param(&location, "state").unwrap();

    // The callback exchanges the code and lands on the home path.
    let response = app
        .clone()
        .oneshot(get(
            &format!("/auth/callback?code=auth-code&state={}", state),
            Some(&cookie),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/");

    let response = app
        .clone()
        .oneshot(get(
            &format!("/auth/status?resource={}", RESOURCE),
            Some(&cookie),
        ))
        .await
        .unwrap();
    let status = body_json(response).await;
    assert_eq!(status["authorized"], true);
    assert!(status["expiresAt"].is_string());

    // The transaction is gone.
    let response = app
        .oneshot(get(
            &format!("/auth/callback?code=auth-code&state={}", state),
            Some(&cookie),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_status_requires_resource() {
    let response = app().oneshot(get("/auth/status", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

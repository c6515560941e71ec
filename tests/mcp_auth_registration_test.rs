//! Dynamic client registration integration tests using wiremock
//!
//! Verifies `Registrar::register` locates the registration endpoint through
//! the protocol's discovery document, sends an RFC 7591 request, and maps
//! every failure to a protocol-tagged registration error.

use std::time::Duration;

use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mcp_installer::mcp::auth::registration::{Protocol, Registrar};
use mcp_installer::InstallerError;

mod common;
use common::{mount_oauth2_configuration, mount_oidc_configuration, REDIRECT_URI};

fn registrar() -> Registrar {
    Registrar::new(
        common::http_client(),
        "Basic Chat Client",
        REDIRECT_URI,
        Duration::from_secs(5),
    )
}

#[tokio::test]
async fn test_register_oidc_sends_rfc7591_request() {
    let server = MockServer::start().await;
    mount_oidc_configuration(&server, &["openid"]).await;
    Mock::given(method("POST"))
        .and(path("/register"))
        .and(body_string_contains("\"client_name\":\"Basic Chat Client\""))
        .and(body_string_contains("\"token_endpoint_auth_method\":\"client_secret_post\""))
        .and(body_string_contains("authorization_code"))
        .and(body_string_contains("refresh_token"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "client_id": "abc",
            "client_secret": "shh"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = registrar()
        .register(&server.uri(), Protocol::Oidc)
        .await
        .unwrap();
    assert_eq!(client.protocol, Protocol::Oidc);
    assert_eq!(client.client_id, "abc");
    assert_eq!(client.client_secret.as_deref(), Some("shh"));
    assert_eq!(client.client_secret_expires_at, 0);
    assert_eq!(client.server.issuer, server.uri());

    let requests = server.received_requests().await.unwrap();
    let register = requests
        .iter()
        .find(|r| r.url.path() == "/register")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&register.body).unwrap();
    assert_eq!(body["redirect_uris"], serde_json::json!([REDIRECT_URI]));
    assert_eq!(body["response_types"], serde_json::json!(["code"]));
}

#[tokio::test]
async fn test_register_oauth2_uses_rfc8414_document() {
    let server = MockServer::start().await;
    mount_oauth2_configuration(&server, &["todos:read"]).await;
    common::mount_registration(&server, "oauth-client", "oauth-secret").await;

    let client = registrar()
        .register(&server.uri(), Protocol::Oauth2)
        .await
        .unwrap();
    assert_eq!(client.protocol, Protocol::Oauth2);
    assert_eq!(client.client_id, "oauth-client");
}

#[tokio::test]
async fn test_register_without_secret_is_accepted_here() {
    let server = MockServer::start().await;
    mount_oidc_configuration(&server, &["openid"]).await;
    Mock::given(method("POST"))
        .and(path("/register"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "client_id": "public-client"
        })))
        .mount(&server)
        .await;

    let client = registrar()
        .register(&server.uri(), Protocol::Oidc)
        .await
        .unwrap();
    assert!(client.client_secret.is_none());
}

#[tokio::test]
async fn test_register_missing_discovery_document_is_registration_error() {
    let server = MockServer::start().await;

    let err = registrar()
        .register(&server.uri(), Protocol::Oidc)
        .await
        .unwrap_err();
    match err.downcast_ref::<InstallerError>() {
        Some(InstallerError::Registration { protocol, .. }) => assert_eq!(protocol, "oidc"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_register_without_registration_endpoint_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/oauth-authorization-server"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "issuer": server.uri(),
            "authorization_endpoint": format!("{}/authorize", server.uri()),
            "token_endpoint": format!("{}/token", server.uri())
        })))
        .mount(&server)
        .await;

    let err = registrar()
        .register(&server.uri(), Protocol::Oauth2)
        .await
        .unwrap_err();
    match err.downcast_ref::<InstallerError>() {
        Some(InstallerError::Registration { protocol, message }) => {
            assert_eq!(protocol, "oauth2");
            assert!(message.contains("registration_endpoint"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_register_rejected_is_registration_error() {
    let server = MockServer::start().await;
    mount_oidc_configuration(&server, &["openid"]).await;
    Mock::given(method("POST"))
        .and(path("/register"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_redirect_uri"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = registrar()
        .register(&server.uri(), Protocol::Oidc)
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("oidc registration failed"));
    assert!(message.contains("invalid_redirect_uri"));
}

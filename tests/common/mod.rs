//! Shared wiremock fixtures for integration tests
//!
//! A resource server and an authorization server are separate
//! [`MockServer`]s so that tests can assert which one was called.

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mcp_installer::mcp::auth::discovery::ResourceDescriptor;
use mcp_installer::mcp::auth::registration::{ClientRegistration, Protocol};
use mcp_installer::mcp::auth::store::InMemorySessionStore;
use mcp_installer::Config;

#[allow(dead_code)]
pub const REDIRECT_URI: &str = "http://localhost:3000/auth/callback";

/// Protected resource metadata for `resource` protected by `issuer`.
#[allow(dead_code)]
pub fn resource_metadata(resource: &str, issuer: &str, scopes: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "resource": resource,
        "resource_name": "Todo API",
        "authorization_servers": [issuer],
        "scopes_supported": scopes,
        "bearer_methods_supported": ["header"]
    })
}

/// Mounts `body` at the RFC 9728 well-known path of `server`.
#[allow(dead_code)]
pub async fn mount_resource_metadata(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/.well-known/oauth-protected-resource"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Authorization server metadata with endpoints under `issuer`.
#[allow(dead_code)]
pub fn server_metadata(issuer: &str, scopes: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{}/authorize", issuer),
        "token_endpoint": format!("{}/token", issuer),
        "registration_endpoint": format!("{}/register", issuer),
        "scopes_supported": scopes,
        "response_types_supported": ["code"],
        "code_challenge_methods_supported": ["S256"]
    })
}

/// Mounts the OpenID Connect discovery document of `server`.
#[allow(dead_code)]
pub async fn mount_oidc_configuration(server: &MockServer, scopes: &[&str]) {
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(server_metadata(&server.uri(), scopes)))
        .mount(server)
        .await;
}

/// Mounts the RFC 8414 discovery document of `server`.
#[allow(dead_code)]
pub async fn mount_oauth2_configuration(server: &MockServer, scopes: &[&str]) {
    Mock::given(method("GET"))
        .and(path("/.well-known/oauth-authorization-server"))
        .respond_with(ResponseTemplate::new(200).set_body_json(server_metadata(&server.uri(), scopes)))
        .mount(server)
        .await;
}

/// Mounts a registration endpoint issuing `client_id` and `client_secret`.
#[allow(dead_code)]
pub async fn mount_registration(server: &MockServer, client_id: &str, client_secret: &str) {
    Mock::given(method("POST"))
        .and(path("/register"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "client_id": client_id,
            "client_secret": client_secret,
            "client_secret_expires_at": 0,
            "redirect_uris": [REDIRECT_URI]
        })))
        .mount(server)
        .await;
}

/// A registration for `resource` whose authorization server is `issuer`.
#[allow(dead_code)]
pub fn registration(resource: &str, issuer: &str, protocol: Protocol) -> ClientRegistration {
    let scopes = vec![
        "openid".to_string(),
        "profile".to_string(),
        "todos:read".to_string(),
    ];
    ClientRegistration {
        client_id: "client-123".to_string(),
        client_secret: "secret-456".to_string(),
        protocol,
        scopes_supported: scopes.clone(),
        resource: ResourceDescriptor {
            resource_id: resource.to_string(),
            display_name: "Todo API".to_string(),
            authorization_server_issuer: issuer.to_string(),
            scopes_supported: Some(scopes),
        },
    }
}

#[allow(dead_code)]
pub fn http_client() -> Arc<reqwest::Client> {
    Arc::new(
        reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("failed to build HTTP client"),
    )
}

#[allow(dead_code)]
pub fn session_store() -> Arc<InMemorySessionStore> {
    Arc::new(InMemorySessionStore::new(
        chrono::Duration::minutes(10),
        chrono::Duration::hours(1),
    ))
}

/// Default configuration with the catalog pointing at `resource`.
#[allow(dead_code)]
pub fn test_config(resource: &str) -> Config {
    let mut config = Config::default();
    config.catalog[0].address = resource.to_string();
    config
}

/// Returns the value of query parameter `name` in `url`.
#[allow(dead_code)]
pub fn query_param(url: &url::Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Decodes an `application/x-www-form-urlencoded` request body.
#[allow(dead_code)]
pub fn form_param(body: &[u8], name: &str) -> Option<String> {
    url::form_urlencoded::parse(body)
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Writes `contents` to a `config.yaml` in a fresh temporary directory.
#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let temp_dir = tempfile::TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    std::fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

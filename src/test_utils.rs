//! Test utilities for mcp-installer
//!
//! This module provides sample registrations, token sets, and server
//! metadata shared by the unit tests.

use std::collections::HashMap;

use chrono::{Duration, Utc};

use crate::mcp::auth::discovery::{AuthorizationServerMetadata, ResourceDescriptor};
use crate::mcp::auth::registration::{ClientInfo, ClientRegistration, Protocol};
use crate::mcp::auth::tokens::TokenSet;

/// Create a registration for `resource` protected by `http://localhost:8081`
///
/// The registration uses the OIDC protocol and the scopes
/// `openid profile todos:read`.
pub fn sample_registration(resource: &str) -> ClientRegistration {
    let scopes = vec![
        "openid".to_string(),
        "profile".to_string(),
        "todos:read".to_string(),
    ];
    ClientRegistration {
        client_id: "client-123".to_string(),
        client_secret: "secret-456".to_string(),
        protocol: Protocol::Oidc,
        scopes_supported: scopes.clone(),
        resource: ResourceDescriptor {
            resource_id: resource.to_string(),
            display_name: "Todo API".to_string(),
            authorization_server_issuer: "http://localhost:8081".to_string(),
            scopes_supported: Some(scopes),
        },
    }
}

/// Create the install payload for [`sample_registration`] of
/// `http://localhost:8080`
pub fn sample_client_info() -> ClientInfo {
    ClientInfo::from(&sample_registration("http://localhost:8080"))
}

/// Create a token set expiring in one hour, with a refresh token
pub fn sample_token_set(access_token: &str) -> TokenSet {
    TokenSet {
        access_token: access_token.to_string(),
        token_type: "Bearer".to_string(),
        refresh_token: Some("refresh-789".to_string()),
        id_token: None,
        expires_at: Some(Utc::now() + Duration::hours(1)),
        scope: Some("openid profile todos:read".to_string()),
    }
}

/// Create authorization server metadata with conventional endpoint paths
/// under `issuer`
pub fn sample_server_metadata(issuer: &str) -> AuthorizationServerMetadata {
    AuthorizationServerMetadata {
        issuer: issuer.to_string(),
        authorization_endpoint: format!("{}/authorize", issuer),
        token_endpoint: format!("{}/token", issuer),
        registration_endpoint: Some(format!("{}/register", issuer)),
        scopes_supported: Some(vec!["openid".to_string(), "profile".to_string()]),
        response_types_supported: vec!["code".to_string()],
        grant_types_supported: None,
        code_challenge_methods_supported: Some(vec!["S256".to_string()]),
        extra: HashMap::new(),
    }
}

//! Session cookie middleware
//!
//! Every request is bound to a server-side session. The middleware reads the
//! session cookie, keeps the session alive in the store, and issues a fresh
//! session (with a `Set-Cookie` header on the response) when the cookie is
//! missing, unknown, or expired. Handlers receive the id as an
//! `Extension<SessionId>`.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::{SessionConfig, MAX_TTL_SECONDS};
use crate::error::Result;
use crate::mcp::auth::store::{SessionId, SessionStore};
use crate::server::AppState;

/// Resolves the request's session and attaches it as an extension.
pub async fn session_layer(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let cookie_name = &state.config.session.cookie_name;
    let existing = cookie_value(req.headers(), cookie_name).map(SessionId::from_cookie_value);

    let (session, issued) = match resolve(state.manager.store().as_ref(), existing).await {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::error!("Failed to resolve session: {:#}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    req.extensions_mut().insert(session.clone());
    let mut response = next.run(req).await;

    if issued {
        match HeaderValue::from_str(&set_cookie(&session, &state.config.session)) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => tracing::error!("Invalid session cookie header: {}", e),
        }
    }

    response
}

/// Returns the session to use and whether it was newly issued.
async fn resolve(
    store: &dyn SessionStore,
    existing: Option<SessionId>,
) -> Result<(SessionId, bool)> {
    if let Some(session) = existing {
        if store.touch(&session).await? {
            return Ok((session, false));
        }
        tracing::debug!("Session {} unknown or expired, issuing a new one", session);
    }

    let session = store.create_session().await?;
    tracing::debug!("Issued session {}", session);
    Ok((session, true))
}

/// Finds cookie `name` in the request's `Cookie` headers.
pub(crate) fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value)
}

fn set_cookie(session: &SessionId, config: &SessionConfig) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        config.cookie_name,
        session.as_str(),
        config.session_ttl_seconds.min(MAX_TTL_SECONDS)
    );
    if config.secure_cookie {
        cookie.push_str("; Secure");
    }
    cookie
}

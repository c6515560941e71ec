//! Discovery and registration orchestration
//!
//! The [`Discoverer`] turns a resource address into an installable
//! [`ClientInfo`]: it discovers the resource, registers with its
//! authorization server (OIDC first, then plain OAuth 2.0), negotiates the
//! scopes, and checks that a client secret was issued. Each step is reported
//! to a [`ProgressReporter`] as a human-readable [`DiscoveryEvent`].
//!
//! [`Discoverer::spawn`] runs the whole operation on its own task and hands
//! back the event stream for the HTTP layer to forward.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{error_kind, InstallerError, Result};
use crate::mcp::auth::discovery::discover_resource;
use crate::mcp::auth::registration::{ClientInfo, ClientRegistration, Protocol, Registrar};
use crate::mcp::auth::scopes::negotiate_scopes;

/// Registration strategies, tried in order until one succeeds
pub const ATTEMPTS: [Protocol; 2] = [Protocol::Oidc, Protocol::Oauth2];

/// Channel capacity between the discovery task and the stream reader
const EVENT_BUFFER: usize = 16;

// ---------------------------------------------------------------------------
// DiscoveryEvent
// ---------------------------------------------------------------------------

/// One line of the discovery progress stream.
///
/// Serialized as `{ "message": ... }`. The terminal success event also
/// carries the flattened [`ClientInfo`]; the terminal failure event carries
/// an `error` class code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryEvent {
    pub message: String,

    #[serde(flatten)]
    pub client: Option<ClientInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DiscoveryEvent {
    /// A non-terminal progress message
    pub fn progress(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            client: None,
            error: None,
        }
    }

    /// The terminal success event
    pub fn done(client: ClientInfo) -> Self {
        Self {
            message: "Done.".to_string(),
            client: Some(client),
            error: None,
        }
    }

    /// The terminal failure event
    pub fn failed(err: &anyhow::Error) -> Self {
        Self {
            message: format!("Install failed: {}", err),
            client: None,
            error: Some(error_kind(err).to_string()),
        }
    }

    /// Returns true for the success and failure events that end a stream
    pub fn is_terminal(&self) -> bool {
        self.client.is_some() || self.error.is_some()
    }
}

// ---------------------------------------------------------------------------
// ProgressReporter
// ---------------------------------------------------------------------------

/// Sink for discovery progress.
///
/// Holds the only sender of a discovery stream, so dropping the reporter
/// closes the stream. Send failures mean the reader has gone away and are
/// ignored; [`Discoverer::spawn`] notices through [`Self::closed`].
#[derive(Debug)]
pub struct ProgressReporter {
    tx: Option<mpsc::Sender<DiscoveryEvent>>,
}

impl ProgressReporter {
    /// Reports into `tx`.
    pub fn new(tx: mpsc::Sender<DiscoveryEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Discards every event.
    pub fn silent() -> Self {
        Self { tx: None }
    }

    /// Reports a progress message.
    pub async fn report(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("Discovery progress: {}", message);
        self.send(DiscoveryEvent::progress(message)).await;
    }

    async fn send(&self, event: DiscoveryEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event).await;
        }
    }

    /// Resolves once the reader has dropped the stream. Never resolves for a
    /// silent reporter.
    pub async fn closed(&self) {
        match &self.tx {
            Some(tx) => tx.closed().await,
            None => std::future::pending().await,
        }
    }

    /// Sends the terminal event for `outcome` and closes the stream.
    pub async fn finish(self, outcome: &Result<ClientInfo>) {
        let event = match outcome {
            Ok(client) => DiscoveryEvent::done(client.clone()),
            Err(e) => DiscoveryEvent::failed(e),
        };
        self.send(event).await;
    }
}

// ---------------------------------------------------------------------------
// Discoverer
// ---------------------------------------------------------------------------

/// Discovers a resource and registers this client with its authorization
/// server.
///
/// Nothing is persisted here; the browser decides whether to install the
/// returned [`ClientInfo`].
#[derive(Debug, Clone)]
pub struct Discoverer {
    http: Arc<reqwest::Client>,
    registrar: Registrar,
}

impl Discoverer {
    /// Creates a discoverer sharing `http` with `registrar`.
    pub fn new(http: Arc<reqwest::Client>, registrar: Registrar) -> Self {
        Self { http, registrar }
    }

    /// Runs discovery, registration, and scope negotiation for `address`.
    ///
    /// # Arguments
    ///
    /// * `address` - Resource address as typed by the user
    /// * `progress` - Receives one event per step
    ///
    /// # Returns
    ///
    /// The installable [`ClientInfo`] for the resource.
    ///
    /// # Errors
    ///
    /// - errors of [`discover_resource`]
    /// - the last [`InstallerError::Registration`] when every strategy in
    ///   [`ATTEMPTS`] fails
    /// - [`InstallerError::ScopeResolution`] when no scopes are advertised
    /// - [`InstallerError::MissingCredential`] when no client secret was
    ///   issued
    pub async fn discover_and_register(
        &self,
        address: &str,
        progress: &ProgressReporter,
    ) -> Result<ClientInfo> {
        progress.report(format!("Discovering {}", address)).await;
        let resource = discover_resource(&self.http, address).await?;
        progress
            .report(format!("Discovered: {}", resource.display_name))
            .await;

        if !resource.has_scopes() {
            progress
                .report("Warning: no scopes found in resource metadata")
                .await;
        }

        let issuer = resource.authorization_server_issuer.as_str();
        let mut registered = None;
        let mut last_error = None;

        for (i, protocol) in ATTEMPTS.iter().copied().enumerate() {
            progress
                .report(format!("Trying {} registration...", protocol.display_name()))
                .await;

            match self.registrar.register(issuer, protocol).await {
                Ok(client) => {
                    progress
                        .report(format!("{} registration succeeded.", protocol.display_name()))
                        .await;
                    registered = Some(client);
                    break;
                }
                Err(e) => {
                    tracing::warn!("{} registration with {} failed: {}", protocol, issuer, e);
                    let message = match ATTEMPTS.get(i + 1) {
                        Some(next) => format!(
                            "{} failed, trying {}...",
                            protocol.display_name(),
                            next.display_name()
                        ),
                        None => format!("{} registration failed.", protocol.display_name()),
                    };
                    progress.report(message).await;
                    last_error = Some(e);
                }
            }
        }

        let Some(client) = registered else {
            return Err(last_error.unwrap_or_else(|| {
                InstallerError::Registration {
                    protocol: "none".to_string(),
                    message: "no registration strategy configured".to_string(),
                }
                .into()
            }));
        };

        let scopes = negotiate_scopes(
            resource.scopes_supported.as_deref(),
            client.server.scopes_supported.as_deref(),
            client.protocol,
        )?;

        let client_secret = client
            .client_secret
            .filter(|secret| !secret.is_empty())
            .ok_or(InstallerError::MissingCredential)?;

        let registration = ClientRegistration {
            client_id: client.client_id,
            client_secret,
            protocol: client.protocol,
            scopes_supported: scopes,
            resource,
        };

        tracing::info!(
            "Registered with {} for {} using {}",
            registration.resource.authorization_server_issuer,
            registration.resource.resource_id,
            registration.protocol
        );
        Ok(ClientInfo::from(&registration))
    }

    /// Runs [`Self::discover_and_register`] on a new task and returns its
    /// event stream.
    ///
    /// The task owns the only sender: the stream ends right after the
    /// terminal event. If the reader drops the stream first, the work is
    /// abandoned at its next await point.
    pub fn spawn(&self, address: impl Into<String>) -> ReceiverStream<DiscoveryEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let discoverer = self.clone();
        let address = address.into();

        tokio::spawn(async move {
            let reporter = ProgressReporter::new(tx);
            let outcome = tokio::select! {
                result = discoverer.discover_and_register(&address, &reporter) => Some(result),
                _ = reporter.closed() => None,
            };

            match outcome {
                Some(result) => {
                    if let Err(e) = &result {
                        tracing::warn!("Install of {} failed: {}", address, e);
                    }
                    reporter.finish(&result).await;
                }
                None => tracing::info!("Discovery of {} abandoned by reader", address),
            }
        });

        ReceiverStream::new(rx)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_client_info;

    #[test]
    fn test_progress_event_serializes_message_only() {
        let json = serde_json::to_value(DiscoveryEvent::progress("Discovering x")).unwrap();
        assert_eq!(json, serde_json::json!({ "message": "Discovering x" }));
    }

    #[test]
    fn test_done_event_flattens_client_info() {
        let event = DiscoveryEvent::done(sample_client_info());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["message"], "Done.");
        assert_eq!(json["clientId"], "client-123");
        assert_eq!(json["protocol"], "oidc");
        assert!(json.get("client").is_none());
        assert!(event.is_terminal());
    }

    #[test]
    fn test_failed_event_carries_kind() {
        let err: anyhow::Error = InstallerError::MissingCredential.into();
        let event = DiscoveryEvent::failed(&err);
        assert!(event.message.starts_with("Install failed: "));
        assert_eq!(event.error.as_deref(), Some("missing_credential"));
        assert!(event.is_terminal());
    }

    #[test]
    fn test_done_event_round_trips() {
        let event = DiscoveryEvent::done(sample_client_info());
        let line = serde_json::to_string(&event).unwrap();
        let parsed: DiscoveryEvent = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_progress_event_parses_without_client() {
        let parsed: DiscoveryEvent =
            serde_json::from_str(r#"{"message":"Trying OIDC registration..."}"#).unwrap();
        assert!(parsed.client.is_none());
        assert!(!parsed.is_terminal());
    }

    #[test]
    fn test_attempt_order_is_oidc_then_oauth2() {
        assert_eq!(ATTEMPTS, [Protocol::Oidc, Protocol::Oauth2]);
    }

    #[tokio::test]
    async fn test_finish_closes_stream() {
        let (tx, mut rx) = mpsc::channel(4);
        let reporter = ProgressReporter::new(tx);
        reporter.report("step").await;
        reporter.finish(&Ok(sample_client_info())).await;

        assert_eq!(rx.recv().await.unwrap().message, "step");
        assert!(rx.recv().await.unwrap().is_terminal());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_silent_reporter_accepts_events() {
        let reporter = ProgressReporter::silent();
        reporter.report("ignored").await;
        reporter.finish(&Err(InstallerError::ScopeResolution.into())).await;
    }
}

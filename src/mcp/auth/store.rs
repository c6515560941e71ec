//! Server-side session store
//!
//! Every browser session is identified by an opaque [`SessionId`] carried in
//! a cookie. The records bound to it live here, on the server:
//!
//! - one [`ClientRegistration`] per resource (installed servers)
//! - at most one [`PendingAuthorization`] (the PKCE transaction between
//!   `/auth/start` and `/auth/callback`)
//! - one [`TokenSet`] per resource
//!
//! [`SessionStore`] is the seam; [`InMemorySessionStore`] is the
//! implementation the server uses.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::mcp::auth::registration::ClientRegistration;
use crate::mcp::auth::tokens::TokenSet;

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Opaque session identifier: 32 random bytes, base64url without padding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a fresh random session id.
    ///
    /// # Examples
    ///
    /// ```
    /// use mcp_installer::mcp::auth::store::SessionId;
    ///
    /// let id = SessionId::generate();
    /// assert_eq!(id.as_str().len(), 43);
    /// assert_ne!(id, SessionId::generate());
    /// ```
    pub fn generate() -> Self {
        use rand::RngCore as _;

        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        Self(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Wraps a value read from a cookie. The store decides whether it is
    /// known.
    pub fn from_cookie_value(value: &str) -> Self {
        Self(value.to_string())
    }

    /// The id as sent in the cookie
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Only a prefix; the full id is a bearer credential.
        let prefix: String = self.0.chars().take(8).collect();
        write!(f, "{}…", prefix)
    }
}

// ---------------------------------------------------------------------------
// PendingAuthorization
// ---------------------------------------------------------------------------

/// An authorization code transaction awaiting its callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAuthorization {
    /// PKCE verifier whose challenge was sent to the authorization endpoint
    pub code_verifier: String,
    /// Resource the authorization was started for
    pub resource_id: String,
    /// `state` nonce sent with the authorization request
    pub state: String,
    pub created_at: DateTime<Utc>,
}

impl PendingAuthorization {
    /// Creates a transaction stamped with the current time.
    pub fn new(
        code_verifier: impl Into<String>,
        resource_id: impl Into<String>,
        state: impl Into<String>,
    ) -> Self {
        Self {
            code_verifier: code_verifier.into(),
            resource_id: resource_id.into(),
            state: state.into(),
            created_at: Utc::now(),
        }
    }

    fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        // Overflow means the deadline is beyond any representable time
        self.created_at
            .checked_add_signed(ttl)
            .is_some_and(|deadline| now >= deadline)
    }
}

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

/// Storage for per-session registrations, transactions, and token sets.
///
/// All records are scoped to one session; nothing is shared across sessions.
/// Writes to a session the store has not seen create it.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Creates an empty session and returns its id.
    async fn create_session(&self) -> Result<SessionId>;

    /// Marks the session as active. Returns `false` when the id is unknown or
    /// the session has expired, in which case the caller should issue a new
    /// one.
    async fn touch(&self, session: &SessionId) -> Result<bool>;

    /// Stores a registration under its resource id, replacing any earlier
    /// one for that resource.
    async fn save_registration(
        &self,
        session: &SessionId,
        registration: ClientRegistration,
    ) -> Result<()>;

    /// Loads the registration for `resource`.
    async fn load_registration(
        &self,
        session: &SessionId,
        resource: &str,
    ) -> Result<Option<ClientRegistration>>;

    /// Stores the pending transaction, replacing any earlier one.
    async fn put_transaction(
        &self,
        session: &SessionId,
        pending: PendingAuthorization,
    ) -> Result<()>;

    /// Removes and returns the pending transaction. Expired transactions are
    /// removed and reported as absent.
    async fn take_transaction(&self, session: &SessionId) -> Result<Option<PendingAuthorization>>;

    /// Stores the token set for `resource`, replacing any earlier one.
    async fn save_token_set(&self, session: &SessionId, resource: &str, tokens: TokenSet)
        -> Result<()>;

    /// Loads the token set for `resource`.
    async fn load_token_set(&self, session: &SessionId, resource: &str)
        -> Result<Option<TokenSet>>;

    /// Drops idle sessions and stale transactions. Returns the number of
    /// sessions removed.
    async fn purge_expired(&self) -> Result<usize>;
}

// ---------------------------------------------------------------------------
// InMemorySessionStore
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct SessionRecord {
    registrations: HashMap<String, ClientRegistration>,
    pending: Option<PendingAuthorization>,
    tokens: HashMap<String, TokenSet>,
    last_seen: DateTime<Utc>,
}

impl SessionRecord {
    fn new() -> Self {
        Self {
            registrations: HashMap::new(),
            pending: None,
            tokens: HashMap::new(),
            last_seen: Utc::now(),
        }
    }
}

/// Process-local [`SessionStore`] backed by a `tokio::sync::RwLock`.
///
/// # Examples
///
/// ```
/// use chrono::Duration;
/// use mcp_installer::mcp::auth::store::{InMemorySessionStore, PendingAuthorization, SessionStore};
///
/// # async fn example() -> mcp_installer::error::Result<()> {
/// let store = InMemorySessionStore::new(Duration::minutes(10), Duration::hours(24));
/// let session = store.create_session().await?;
///
/// store
///     .put_transaction(&session, PendingAuthorization::new("verifier", "http://localhost:8080", "state"))
///     .await?;
/// assert!(store.take_transaction(&session).await?.is_some());
/// assert!(store.take_transaction(&session).await?.is_none());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, SessionRecord>>,
    transaction_ttl: Duration,
    session_ttl: Duration,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    ///
    /// # Arguments
    ///
    /// * `transaction_ttl` - How long a pending authorization stays valid
    /// * `session_ttl` - How long an idle session is kept
    pub fn new(transaction_ttl: Duration, session_ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            transaction_ttl,
            session_ttl,
        }
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns true when no session is stored
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    fn is_idle(&self, record: &SessionRecord, now: DateTime<Utc>) -> bool {
        record
            .last_seen
            .checked_add_signed(self.session_ttl)
            .is_some_and(|deadline| now >= deadline)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(&self) -> Result<SessionId> {
        let id = SessionId::generate();
        self.sessions
            .write()
            .await
            .insert(id.clone(), SessionRecord::new());
        tracing::debug!("Created session {}", id);
        Ok(id)
    }

    async fn touch(&self, session: &SessionId) -> Result<bool> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let idle = match sessions.get(session) {
            None => return Ok(false),
            Some(record) => self.is_idle(record, now),
        };
        if idle {
            sessions.remove(session);
            tracing::debug!("Session {} expired", session);
            return Ok(false);
        }
        if let Some(record) = sessions.get_mut(session) {
            record.last_seen = now;
        }
        Ok(true)
    }

    async fn save_registration(
        &self,
        session: &SessionId,
        registration: ClientRegistration,
    ) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .entry(session.clone())
            .or_insert_with(SessionRecord::new);
        record
            .registrations
            .insert(registration.resource.resource_id.clone(), registration);
        Ok(())
    }

    async fn load_registration(
        &self,
        session: &SessionId,
        resource: &str,
    ) -> Result<Option<ClientRegistration>> {
        Ok(self
            .sessions
            .read()
            .await
            .get(session)
            .and_then(|record| record.registrations.get(resource).cloned()))
    }

    async fn put_transaction(
        &self,
        session: &SessionId,
        pending: PendingAuthorization,
    ) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .entry(session.clone())
            .or_insert_with(SessionRecord::new);
        record.pending = Some(pending);
        Ok(())
    }

    async fn take_transaction(&self, session: &SessionId) -> Result<Option<PendingAuthorization>> {
        let pending = self
            .sessions
            .write()
            .await
            .get_mut(session)
            .and_then(|record| record.pending.take());

        Ok(pending.filter(|p| {
            let live = !p.is_expired(self.transaction_ttl, Utc::now());
            if !live {
                tracing::debug!("Discarding expired transaction for session {}", session);
            }
            live
        }))
    }

    async fn save_token_set(
        &self,
        session: &SessionId,
        resource: &str,
        tokens: TokenSet,
    ) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .entry(session.clone())
            .or_insert_with(SessionRecord::new);
        record.tokens.insert(resource.to_string(), tokens);
        Ok(())
    }

    async fn load_token_set(
        &self,
        session: &SessionId,
        resource: &str,
    ) -> Result<Option<TokenSet>> {
        Ok(self
            .sessions
            .read()
            .await
            .get(session)
            .and_then(|record| record.tokens.get(resource).cloned()))
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();

        sessions.retain(|_, record| !self.is_idle(record, now));
        for record in sessions.values_mut() {
            if record
                .pending
                .as_ref()
                .is_some_and(|p| p.is_expired(self.transaction_ttl, now))
            {
                record.pending = None;
            }
        }

        Ok(before - sessions.len())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

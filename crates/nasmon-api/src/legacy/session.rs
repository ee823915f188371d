// Legacy session management
//
// One `HostSession` per upstream host owns the cached cookie and the
// credentials to renew it. Acquisition is single-flight: the first caller
// that finds no token opens an attempt, and every caller arriving before
// that attempt settles awaits the same cell and gets the same outcome.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use crate::auth::{HostEndpoint, LegacyCredentials, SessionToken};
use crate::error::Error;
use crate::legacy::client::LegacyClient;
use crate::legacy::response::LegacyResponse;

const LOGIN_TIMEOUT: Duration = Duration::from_secs(15);

/// Why a login attempt failed, in a form every waiter can be handed.
#[derive(Debug, Clone)]
enum AcquireFailure {
    Rejected(String),
    TimedOut(u64),
    Unreachable(String),
}

impl AcquireFailure {
    fn from_error(err: &Error) -> Self {
        match err {
            Error::Authentication { message } => Self::Rejected(message.clone()),
            Error::Timeout { timeout_secs } => Self::TimedOut(*timeout_secs),
            other => Self::Unreachable(other.to_string()),
        }
    }

    fn to_error(&self, host: &str) -> Error {
        match self {
            Self::Rejected(message) => Error::Authentication {
                message: message.clone(),
            },
            Self::TimedOut(timeout_secs) => Error::Timeout {
                timeout_secs: *timeout_secs,
            },
            Self::Unreachable(message) => Error::Unreachable {
                host: host.to_owned(),
                message: message.clone(),
            },
        }
    }
}

/// One login exchange and its eventual outcome.
type Attempt = Arc<OnceCell<Result<SessionToken, AcquireFailure>>>;

#[derive(Default)]
struct SessionSlot {
    token: Option<SessionToken>,
    /// The attempt callers should join; cleared once it settles.
    in_flight: Option<Attempt>,
}

/// The authenticated legacy session for one host.
pub struct HostSession {
    client: LegacyClient,
    credentials: Option<LegacyCredentials>,
    slot: Mutex<SessionSlot>,
    generation: AtomicU64,
}

impl HostSession {
    pub fn new(client: LegacyClient, credentials: Option<LegacyCredentials>) -> Self {
        Self {
            client,
            credentials,
            slot: Mutex::new(SessionSlot::default()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn host(&self) -> &HostEndpoint {
        self.client.host()
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Return a valid session token, logging in if none is cached.
    ///
    /// Callers that arrive while a login is in flight wait for it and share
    /// its outcome, success or failure. The slot lock is never held across
    /// the login itself.
    pub async fn get_session(&self) -> Result<SessionToken, Error> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or_else(|| Error::MissingCredentials {
                host: self.host().name.clone(),
            })?;

        let attempt = {
            let mut slot = self.slot.lock().await;
            if let Some(token) = slot.token.as_ref() {
                return Ok(token.clone());
            }
            Arc::clone(slot.in_flight.get_or_insert_with(Attempt::default))
        };

        attempt
            .get_or_init(|| self.login(credentials, &attempt))
            .await
            .clone()
            .map_err(|failure| failure.to_error(&self.host().name))
    }

    /// Run the login exchange for `attempt` and settle the slot.
    ///
    /// If the caller driving this is dropped midway, the cell stays empty
    /// and the next waiter drives a fresh exchange.
    async fn login(
        &self,
        credentials: &LegacyCredentials,
        attempt: &Attempt,
    ) -> Result<SessionToken, AcquireFailure> {
        let outcome = match self.client.login(credentials, LOGIN_TIMEOUT).await {
            Ok(cookie) => {
                let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
                info!(host = %self.host().name, generation, "legacy session acquired");
                Ok(SessionToken::new(cookie, generation))
            }
            Err(e) => {
                warn!(host = %self.host().name, error = %e, "legacy login failed");
                Err(AcquireFailure::from_error(&e))
            }
        };

        let mut slot = self.slot.lock().await;
        if slot.in_flight.as_ref().is_some_and(|a| Arc::ptr_eq(a, attempt)) {
            slot.in_flight = None;
            if let Ok(token) = &outcome {
                slot.token = Some(token.clone());
            }
        }
        outcome
    }

    /// Drop the cached token if it is still the one the caller was refused with.
    ///
    /// A token renewed by another caller in the meantime is left alone.
    pub async fn invalidate(&self, token: &SessionToken) {
        let mut slot = self.slot.lock().await;
        if slot
            .token
            .as_ref()
            .is_some_and(|t| t.generation() == token.generation())
        {
            let age_secs = (Utc::now() - token.acquired_at()).num_seconds();
            debug!(host = %self.host().name, generation = token.generation(), age_secs, "legacy session invalidated");
            slot.token = None;
        }
    }

    /// GET a legacy path with the cached session.
    ///
    /// On auth rejection the session is invalidated, re-acquired and the
    /// request retried once. A second rejection is returned to the caller.
    pub async fn http_get(
        &self,
        path: &str,
        params: &[(&str, String)],
        timeout: Duration,
    ) -> Result<LegacyResponse, Error> {
        let token = self.get_session().await?;
        match self
            .client
            .get(path, params, token.cookie_header(), timeout)
            .await
        {
            Err(e) if e.is_auth_rejected() => {
                debug!(host = %self.host().name, path, "session refused, re-authenticating");
                self.invalidate(&token).await;
                let token = self.get_session().await?;
                self.client
                    .get(path, params, token.cookie_header(), timeout)
                    .await
            }
            other => other,
        }
    }

    /// Log out and forget the cached token.
    pub async fn close(&self) {
        let token = self.slot.lock().await.token.take();
        if let Some(token) = token {
            if let Err(e) = self.client.logout(token.cookie_header()).await {
                warn!(host = %self.host().name, error = %e, "logout failed (non-fatal)");
            }
        }
    }
}

/// Process-wide registry of legacy sessions, keyed by host name.
///
/// Constructed once at startup and passed by reference to every collector
/// that needs a legacy session.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<HostSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the session for a host, replacing any previous one.
    pub fn register(&self, session: HostSession) -> Arc<HostSession> {
        let session = Arc::new(session);
        self.sessions
            .insert(session.host().name.clone(), Arc::clone(&session));
        session
    }

    pub fn get(&self, host: &str) -> Option<Arc<HostSession>> {
        self.sessions.get(host).map(|s| Arc::clone(s.value()))
    }

    /// Token for `host`; see [`HostSession::get_session`].
    pub async fn get_session(&self, host: &str) -> Result<SessionToken, Error> {
        let session = self.get(host).ok_or_else(|| Error::MissingCredentials {
            host: host.to_owned(),
        })?;
        session.get_session().await
    }

    pub async fn invalidate(&self, host: &str, token: &SessionToken) {
        if let Some(session) = self.get(host) {
            session.invalidate(token).await;
        }
    }

    /// Log out of every host. Called once at process shutdown.
    pub async fn close_all(&self) {
        let sessions: Vec<Arc<HostSession>> =
            self.sessions.iter().map(|s| Arc::clone(s.value())).collect();
        for session in sessions {
            session.close().await;
        }
        self.sessions.clear();
    }
}

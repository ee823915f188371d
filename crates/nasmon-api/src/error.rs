use thiserror::Error;

/// Top-level error type for the `nasmon-api` crate.
///
/// Covers every failure mode across both upstream surfaces: the structured
/// query API and the legacy cookie-authenticated web endpoints.
/// `nasmon-core` folds these into its smaller collector-facing taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login rejected, or a request made with a cached session was refused.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// No username/password configured for a host that needs a legacy session.
    #[error("No legacy credentials configured for host '{host}'")]
    MissingCredentials { host: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A previous in-flight attempt against this host failed at the transport
    /// level; coalesced waiters receive this instead of the original error.
    #[error("Host '{host}' unreachable: {message}")]
    Unreachable { host: String, message: String },

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Upstream answered with a status the caller did not expect.
    #[error("Unexpected HTTP status {status}")]
    UnexpectedStatus { status: u16 },

    // ── Structured query API ────────────────────────────────────────
    /// The query endpoint answered with an `errors` array.
    #[error("Query failed: {message}")]
    Query { message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the upstream refused our session and
    /// re-authentication might resolve it.
    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if this is a transient error worth retrying next tick.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Timeout { .. } | Self::Unreachable { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::UnexpectedStatus { status: 404 } => true,
            _ => false,
        }
    }
}

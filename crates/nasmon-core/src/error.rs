// ── Core error types ──
//
// Collector-facing errors. Collectors and the runner never match on HTTP
// status codes or reqwest internals; the `From<nasmon_api::Error>` impl
// folds transport-layer failures into this smaller taxonomy.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Upstream errors ──────────────────────────────────────────────
    /// Network failure, timeout or an unexpected HTTP status.
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Credentials were refused, or a renewed session was refused again.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// A legacy endpoint was needed but the host has no username/password.
    #[error("No legacy credentials configured for host '{host}'")]
    MissingCredentials { host: String },

    /// The upstream answered, but not with anything we can use.
    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },

    // ── Local errors ─────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Publish failed: {message}")]
    Publish { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Credential problems are not fixed by waiting for the next tick.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            Self::Authentication { .. } | Self::MissingCredentials { .. }
        )
    }

    /// Worth retrying on the next tick without operator action.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Timeout { .. } | Self::MalformedResponse { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<nasmon_api::Error> for CoreError {
    fn from(err: nasmon_api::Error) -> Self {
        match err {
            nasmon_api::Error::Authentication { message } => CoreError::Authentication { message },
            nasmon_api::Error::MissingCredentials { host } => {
                CoreError::MissingCredentials { host }
            }
            nasmon_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else {
                    CoreError::Transport {
                        message: e.to_string(),
                    }
                }
            }
            nasmon_api::Error::Unreachable { host, message } => CoreError::Transport {
                message: format!("{host}: {message}"),
            },
            nasmon_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            nasmon_api::Error::UnexpectedStatus { status } => CoreError::Transport {
                message: format!("unexpected HTTP status {status}"),
            },
            nasmon_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            nasmon_api::Error::Tls(msg) => CoreError::Config {
                message: format!("TLS error: {msg}"),
            },
            nasmon_api::Error::Query { message } => CoreError::MalformedResponse {
                message: format!("query errors: {message}"),
            },
            nasmon_api::Error::Deserialization { message, body: _ } => {
                CoreError::MalformedResponse { message }
            }
        }
    }
}

//! CLI error types with miette diagnostics.
//!
//! Startup and one-shot failures end the process with a diagnostic and an
//! exit code. Failures inside a running collector never reach this type;
//! the runner logs them and carries on.

use miette::Diagnostic;
use thiserror::Error;

use nasmon_config::ConfigError;
use nasmon_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────

    #[error("No servers configured")]
    #[diagnostic(
        code(nasmon::no_servers),
        help(
            "Add at least one [[servers]] entry to the config file.\n\
             Expected at: {path}"
        )
    )]
    NoServers { path: String },

    #[error("Server '{name}' not found in configuration")]
    #[diagnostic(
        code(nasmon::unknown_server),
        help("Configured servers: {available}")
    )]
    UnknownServer { name: String, available: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(nasmon::validation))]
    Validation { field: String, reason: String },

    #[error(transparent)]
    #[diagnostic(code(nasmon::config))]
    Config(ConfigError),

    // ── Collectors ───────────────────────────────────────────────────

    #[error("Collector '{name}' is not available")]
    #[diagnostic(
        code(nasmon::collector_unavailable),
        help("{reason}\nRun: nasmon collectors")
    )]
    CollectorUnavailable { name: String, reason: String },

    // ── Upstream ─────────────────────────────────────────────────────

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(nasmon::auth_failed),
        help(
            "Check username/password (or password_env) for this server.\n\
             The API key is only used for the structured query API."
        )
    )]
    AuthFailed { message: String },

    #[error("Could not reach host: {message}")]
    #[diagnostic(
        code(nasmon::connection_failed),
        help("Check host, port and ssl settings. Self-signed certificates need verify_ssl = false.")
    )]
    ConnectionFailed { message: String },

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(nasmon::timeout),
        help("Increase the server's timeout or check host responsiveness.")
    )]
    Timeout { seconds: u64 },

    #[error("{0}")]
    #[diagnostic(code(nasmon::core))]
    Core(CoreError),

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render JSON: {0}")]
    #[diagnostic(code(nasmon::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoServers { .. } | Self::Validation { .. } | Self::Config(_) => exit_code::USAGE,
            Self::UnknownServer { .. } | Self::CollectorUnavailable { .. } => exit_code::NOT_FOUND,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            _ => exit_code::GENERAL,
        }
    }
}

// ── Conversions ──────────────────────────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::Io(e) => Self::Io(e),
            other => Self::Config(other),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Authentication { message } => Self::AuthFailed { message },
            CoreError::MissingCredentials { host } => Self::AuthFailed {
                message: format!("no username/password configured for '{host}'"),
            },
            CoreError::Transport { message } => Self::ConnectionFailed { message },
            CoreError::Timeout { timeout_secs } => Self::Timeout {
                seconds: timeout_secs,
            },
            CoreError::Config { message } => Self::Validation {
                field: "config".into(),
                reason: message,
            },
            other => Self::Core(other),
        }
    }
}

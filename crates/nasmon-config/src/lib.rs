//! Configuration for the nasmon binary.
//!
//! TOML server list, credential resolution (env + keyring + plaintext),
//! and translation to `nasmon_core::HostConfig`. The core never reads
//! files; everything it needs arrives through this crate.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;
use tracing::debug;

use nasmon_api::{HostEndpoint, LegacyCredentials};
use nasmon_core::collector::registry;
use nasmon_core::config::DEFAULT_SCAN_INTERVAL;
use nasmon_core::runner::DEFAULT_SHUTDOWN_GRACE;
use nasmon_core::model::slugify;
use nasmon_core::{HostConfig, TlsVerification};

const KEYRING_SERVICE: &str = "nasmon";
const REDACTED: &str = "********";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no servers configured")]
    NoServers,

    #[error("unknown server '{name}'")]
    UnknownServer { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Hosts to poll.
    #[serde(default)]
    pub servers: Vec<Server>,

    #[serde(default)]
    pub publisher: PublisherSettings,

    /// Seconds in-flight ticks get to finish at shutdown.
    #[serde(default = "default_grace")]
    pub shutdown_grace_secs: u64,

    /// Look up secrets in the OS keyring. Off on headless boxes without
    /// a secret service.
    #[serde(default = "default_true")]
    pub use_keyring: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            publisher: PublisherSettings::default(),
            shutdown_grace_secs: default_grace(),
            use_keyring: true,
        }
    }
}

/// One polled host.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Server {
    /// Name used in unique IDs and logs.
    pub name: String,

    /// Hostname or IP. A full `http(s)://` URL is used as-is.
    pub host: String,

    /// Defaults to 443 with `ssl`, 80 without.
    pub port: Option<u16>,

    #[serde(default = "default_true")]
    pub ssl: bool,

    /// Verify the certificate. NAS web UIs are usually self-signed.
    #[serde(default)]
    pub verify_ssl: bool,

    /// Path to a custom CA certificate (implies verification).
    pub ca_cert: Option<PathBuf>,

    /// Structured query API key (plaintext; prefer keyring or env var).
    pub api_key: Option<String>,

    /// Environment variable name containing the API key.
    pub api_key_env: Option<String>,

    /// Web UI username for the legacy endpoints.
    pub username: Option<String>,

    /// Web UI password (plaintext; prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Default collector interval, seconds.
    #[serde(default = "default_scan_interval")]
    pub scan_interval: u64,

    /// Request timeout, seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Per-collector interval overrides, seconds.
    #[serde(default)]
    pub intervals: BTreeMap<String, u64>,

    /// Collectors not to run for this server.
    #[serde(default)]
    pub disabled: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PublisherSettings {
    #[serde(default)]
    pub format: OutputFormat,

    /// First topic segment: `{base_topic}/{component}/{unique_id}/state`.
    #[serde(default = "default_base_topic")]
    pub base_topic: String,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            base_topic: default_base_topic(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON record per entity on stdout.
    #[default]
    Json,
    /// One log line per entity.
    Log,
}

fn default_true() -> bool {
    true
}
fn default_grace() -> u64 {
    DEFAULT_SHUTDOWN_GRACE.as_secs()
}
fn default_scan_interval() -> u64 {
    DEFAULT_SCAN_INTERVAL.as_secs()
}
fn default_timeout() -> u64 {
    30
}
fn default_base_topic() -> String {
    "nasmon".into()
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "nasmon", "nasmon").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("nasmon");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load config from `path` + `NASMON_*` environment variables.
///
/// Nested keys use a double underscore: `NASMON_PUBLISHER__FORMAT=log`.
/// A missing file is not an error; an empty server list is caught by
/// [`Config::validate`].
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("NASMON_").ignore(&["CONFIG", "SERVER"]).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

impl Config {
    /// Reject configs the runner could not make sense of.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.servers.is_empty() {
            return Err(ConfigError::NoServers);
        }
        // Entity ids are built from the slugged name, so names must stay
        // distinct after slugging too.
        let mut seen: HashMap<String, &str> = HashMap::new();
        for server in &self.servers {
            server.validate()?;
            let slug = slugify(&server.name);
            if slug.is_empty() {
                return Err(invalid(
                    "servers.name",
                    format!("server name '{}' has no letters or digits", server.name),
                ));
            }
            if let Some(other) = seen.insert(slug, server.name.as_str()) {
                let message = if other == server.name {
                    format!("duplicate server name '{}'", server.name)
                } else {
                    format!("server names '{other}' and '{}' collide", server.name)
                };
                return Err(invalid("servers.name", message));
            }
        }
        Ok(())
    }

    pub fn server(&self, name: &str) -> Result<&Server, ConfigError> {
        self.servers
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ConfigError::UnknownServer { name: name.into() })
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Copy with every plaintext secret masked, for display.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut cfg = self.clone();
        for server in &mut cfg.servers {
            for secret in [&mut server.api_key, &mut server.password] {
                if secret.is_some() {
                    *secret = Some(REDACTED.into());
                }
            }
        }
        cfg
    }

    /// Redacted TOML rendering.
    pub fn to_redacted_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&self.redacted())?)
    }
}

fn invalid(field: &str, reason: String) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason,
    }
}

impl Server {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(invalid("servers.name", "must not be empty".into()));
        }
        if self.host.trim().is_empty() {
            return Err(invalid("servers.host", format!("server '{}' has no host", self.name)));
        }
        if self.scan_interval == 0 {
            return Err(invalid("servers.scan_interval", "must be at least 1 second".into()));
        }
        if self.timeout == 0 {
            return Err(invalid("servers.timeout", "must be at least 1 second".into()));
        }
        for (collector, secs) in &self.intervals {
            if registry::find(collector).is_none() {
                return Err(invalid("servers.intervals", format!("unknown collector '{collector}'")));
            }
            if *secs == 0 {
                return Err(invalid("servers.intervals", format!("'{collector}' interval must be at least 1 second")));
            }
        }
        if let Some(unknown) = self.disabled.iter().find(|c| registry::find(c).is_none()) {
            return Err(invalid("servers.disabled", format!("unknown collector '{unknown}'")));
        }
        Ok(())
    }

    /// Web root for this server.
    pub fn url(&self) -> Result<url::Url, ConfigError> {
        let host = self.host.trim();
        if host.starts_with("http://") || host.starts_with("https://") {
            return host
                .parse()
                .map_err(|e| invalid("servers.host", format!("invalid URL '{host}': {e}")));
        }
        let port = self.port.unwrap_or(if self.ssl { 443 } else { 80 });
        HostEndpoint::from_parts(self.name.as_str(), host, port, self.ssl)
            .map(|endpoint| endpoint.base_url)
            .map_err(|e| invalid("servers.host", format!("'{host}': {e}")))
    }

    pub fn tls(&self) -> TlsVerification {
        match (&self.ca_cert, self.verify_ssl) {
            (Some(ca), _) => TlsVerification::CustomCa(ca.clone()),
            (None, true) => TlsVerification::SystemDefaults,
            (None, false) => TlsVerification::DangerAcceptInvalid,
        }
    }
}

// ── Credential resolution ───────────────────────────────────────────

fn keyring_secret(server: &str, kind: &str) -> Option<SecretString> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &format!("{server}/{kind}")).ok()?;
    entry.get_password().ok().map(SecretString::from)
}

/// API key: `api_key_env` → keyring `{server}/api-key` → plaintext.
pub fn resolve_api_key(server: &Server, use_keyring: bool) -> Option<SecretString> {
    if let Some(ref env_name) = server.api_key_env {
        if let Ok(val) = std::env::var(env_name) {
            return Some(SecretString::from(val));
        }
    }
    if use_keyring {
        if let Some(secret) = keyring_secret(&server.name, "api-key") {
            return Some(secret);
        }
    }
    server.api_key.clone().map(SecretString::from)
}

/// Web login: needs a username; the password comes from `password_env`
/// → keyring `{server}/password` → plaintext.
pub fn resolve_legacy_credentials(server: &Server, use_keyring: bool) -> Option<LegacyCredentials> {
    let username = server.username.as_deref()?.trim();
    if username.is_empty() {
        return None;
    }
    let password = server
        .password_env
        .as_ref()
        .and_then(|env_name| std::env::var(env_name).ok())
        .map(SecretString::from)
        .or_else(|| {
            use_keyring
                .then(|| keyring_secret(&server.name, "password"))
                .flatten()
        })
        .or_else(|| server.password.clone().map(SecretString::from))?;
    Some(LegacyCredentials::new(username, password))
}

// ── Translation to core config ──────────────────────────────────────

/// Build the runtime `HostConfig` for one server, resolving secrets.
pub fn server_to_host_config(server: &Server, use_keyring: bool) -> Result<HostConfig, ConfigError> {
    let mut host = HostConfig::new(server.name.clone(), server.url()?);
    host.tls = server.tls();
    host.timeout = Duration::from_secs(server.timeout);
    host.scan_interval = Duration::from_secs(server.scan_interval);
    host.intervals = server
        .intervals
        .iter()
        .map(|(name, secs)| (name.clone(), Duration::from_secs(*secs)))
        .collect::<HashMap<_, _>>();
    host.disabled.clone_from(&server.disabled);
    host.api_key = resolve_api_key(server, use_keyring);
    host.credentials = resolve_legacy_credentials(server, use_keyring);
    Ok(host)
}

/// Every configured server as a `HostConfig`, optionally narrowed to one.
pub fn host_configs(config: &Config, only: Option<&str>) -> Result<Vec<HostConfig>, ConfigError> {
    let servers: Vec<&Server> = match only {
        Some(name) => vec![config.server(name)?],
        None => config.servers.iter().collect(),
    };
    servers
        .into_iter()
        .map(|s| server_to_host_config(s, config.use_keyring))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn server(host: &str) -> Server {
        toml::from_str(&format!("name = \"tower\"\nhost = \"{host}\"")).unwrap()
    }

    #[test]
    fn defaults_fill_in() {
        let s = server("10.0.0.5");
        assert!(s.ssl);
        assert!(!s.verify_ssl);
        assert_eq!(s.scan_interval, 30);
        assert_eq!(s.url().unwrap().as_str(), "https://10.0.0.5/");
        assert_eq!(s.tls(), TlsVerification::DangerAcceptInvalid);
    }

    #[test]
    fn explicit_url_and_port() {
        assert_eq!(server("http://nas.lan:8080").url().unwrap().as_str(), "http://nas.lan:8080/");
        let mut s = server("nas.lan");
        s.ssl = false;
        s.port = Some(8080);
        assert_eq!(s.url().unwrap().as_str(), "http://nas.lan:8080/");
    }

    #[test]
    fn ca_cert_implies_verification() {
        let mut s = server("nas.lan");
        s.ca_cert = Some("/etc/ssl/nas.pem".into());
        assert_eq!(s.tls(), TlsVerification::CustomCa("/etc/ssl/nas.pem".into()));
        s.ca_cert = None;
        s.verify_ssl = true;
        assert_eq!(s.tls(), TlsVerification::SystemDefaults);
    }

    #[test]
    fn unknown_collectors_are_rejected() {
        let mut s = server("nas.lan");
        s.disabled = vec!["gpu".into()];
        assert!(matches!(s.validate(), Err(ConfigError::Validation { .. })));
        s.disabled = vec!["gpu_plugin".into()];
        s.intervals.insert("memory".into(), 0);
        assert!(matches!(s.validate(), Err(ConfigError::Validation { .. })));
    }

    fn named(names: &[&str]) -> Config {
        let servers = names
            .iter()
            .map(|name| Server {
                name: (*name).to_owned(),
                ..server("nas.lan")
            })
            .collect();
        Config {
            servers,
            ..Config::default()
        }
    }

    #[test]
    fn slug_collisions_are_rejected() {
        assert!(named(&["tower", "backup"]).validate().is_ok());
        for pair in [["tower", "tower"], ["Tower", "tower"], ["nas-1", "nas_1"]] {
            assert!(
                matches!(named(&pair).validate(), Err(ConfigError::Validation { .. })),
                "{pair:?} should collide"
            );
        }
    }

    #[test]
    fn names_without_alphanumerics_are_rejected() {
        assert!(matches!(
            named(&["!!!"]).validate(),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn credentials_need_username() {
        let mut s = server("nas.lan");
        s.password = Some("hunter2".into());
        assert!(resolve_legacy_credentials(&s, false).is_none());
        s.username = Some("root".into());
        let creds = resolve_legacy_credentials(&s, false).unwrap();
        assert_eq!(creds.username, "root");
    }

    #[test]
    fn redaction_masks_only_present_secrets() {
        let mut s = server("nas.lan");
        s.password = Some("hunter2".into());
        let cfg = Config {
            servers: vec![s],
            ..Config::default()
        };
        let shown = cfg.redacted();
        assert_eq!(shown.servers[0].password.as_deref(), Some(REDACTED));
        assert!(shown.servers[0].api_key.is_none());
        assert!(!cfg.to_redacted_toml().unwrap().contains("hunter2"));
    }
}

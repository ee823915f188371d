// ── Runtime host configuration ──
//
// These types describe *how* to reach one NAS host and which collectors
// to run against it. They carry credential data and polling cadence, but
// never touch disk. The binary builds a `HostConfig` per configured host
// and hands it in.

use std::collections::HashMap;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use nasmon_api::{LegacyCredentials, TlsMode, TransportConfig};

/// Default polling cadence for collectors without their own default.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(30);

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification. NAS web UIs ship self-signed certificates.
    #[default]
    DangerAcceptInvalid,
}

impl TlsVerification {
    pub fn to_transport(&self, timeout: Duration) -> TransportConfig {
        let tls = match self {
            Self::SystemDefaults => TlsMode::System,
            Self::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            Self::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        };
        TransportConfig { tls, timeout }
    }
}

/// Configuration for polling a single host.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Operator-chosen name; forms the first part of every unique ID.
    pub name: String,
    /// Web root, e.g. `https://192.168.1.10`.
    pub url: Url,
    pub tls: TlsVerification,
    /// Default request timeout.
    pub timeout: Duration,
    /// Structured query API key. Query-backed collectors are skipped without it.
    pub api_key: Option<SecretString>,
    /// Web UI login. Legacy-backed collectors idle without it.
    pub credentials: Option<LegacyCredentials>,
    /// Cadence for collectors without a default of their own.
    pub scan_interval: Duration,
    /// Per-collector interval overrides, keyed by collector name.
    pub intervals: HashMap<String, Duration>,
    /// Collector names that must not run for this host.
    pub disabled: Vec<String>,
}

impl HostConfig {
    pub fn new(name: impl Into<String>, url: Url) -> Self {
        Self {
            name: name.into(),
            url,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            api_key: None,
            credentials: None,
            scan_interval: DEFAULT_SCAN_INTERVAL,
            intervals: HashMap::new(),
            disabled: Vec::new(),
        }
    }

    pub fn is_enabled(&self, collector: &str) -> bool {
        !self.disabled.iter().any(|d| d == collector)
    }

    /// Effective interval: explicit override, then the collector's own
    /// default, then the host scan interval.
    pub fn interval_for(&self, collector: &str, default: Option<Duration>) -> Duration {
        self.intervals
            .get(collector)
            .copied()
            .or(default)
            .unwrap_or(self.scan_interval)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn host() -> HostConfig {
        HostConfig::new("tower", "https://10.0.0.5".parse().unwrap())
    }

    #[test]
    fn interval_prefers_override_then_default() {
        let mut cfg = host();
        cfg.intervals.insert("docker".into(), Duration::from_secs(15));

        assert_eq!(cfg.interval_for("docker", Some(Duration::from_secs(60))), Duration::from_secs(15));
        assert_eq!(cfg.interval_for("system", Some(Duration::from_secs(60))), Duration::from_secs(60));
        assert_eq!(cfg.interval_for("array", None), DEFAULT_SCAN_INTERVAL);
    }

    #[test]
    fn disabled_collectors() {
        let mut cfg = host();
        cfg.disabled.push("gpu_plugin".into());
        assert!(!cfg.is_enabled("gpu_plugin"));
        assert!(cfg.is_enabled("memory"));
    }

    #[test]
    fn tls_maps_to_transport() {
        let t = TlsVerification::SystemDefaults.to_transport(Duration::from_secs(5));
        assert!(matches!(t.tls, TlsMode::System));
        assert_eq!(t.timeout, Duration::from_secs(5));
    }
}

use std::fmt;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::error::Error;

/// Username/password pair for the legacy web login.
#[derive(Debug, Clone)]
pub struct LegacyCredentials {
    pub username: String,
    pub password: SecretString,
}

impl LegacyCredentials {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }

    /// Reject obviously unusable pairs before they hit the wire.
    pub(crate) fn validate(&self, host: &str) -> Result<(), Error> {
        if self.username.trim().is_empty() || self.password.expose_secret().is_empty() {
            return Err(Error::Authentication {
                message: format!("empty username or password for host '{host}'"),
            });
        }
        Ok(())
    }
}

/// Identity and address of one upstream host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEndpoint {
    /// Operator-chosen name (e.g. `"tower"`); forms part of entity IDs.
    pub name: String,
    /// Web root, e.g. `https://192.168.1.10`.
    pub base_url: Url,
}

impl HostEndpoint {
    pub fn new(name: impl Into<String>, base_url: Url) -> Self {
        Self {
            name: name.into(),
            base_url,
        }
    }

    /// Build the base URL from host, port and TLS flag.
    ///
    /// Default ports (80 / 443) are left implicit.
    pub fn from_parts(name: impl Into<String>, host: &str, port: u16, ssl: bool) -> Result<Self, Error> {
        let scheme = if ssl { "https" } else { "http" };
        let default_port = if ssl { 443 } else { 80 };
        let raw = if port == default_port {
            format!("{scheme}://{host}")
        } else {
            format!("{scheme}://{host}:{port}")
        };
        Ok(Self::new(name, Url::parse(&raw)?))
    }

    /// Join an absolute path (`/login`, `/plugins/...`) onto the web root.
    pub fn url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }
}

impl fmt::Display for HostEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.base_url)
    }
}

/// A cached legacy session: the cookie header value plus acquisition metadata.
#[derive(Debug, Clone)]
pub struct SessionToken {
    cookie: SecretString,
    acquired_at: DateTime<Utc>,
    /// Bumped on every successful login for this host. Lets a consumer
    /// invalidate exactly the token it was refused with.
    generation: u64,
}

impl SessionToken {
    pub(crate) fn new(cookie: String, generation: u64) -> Self {
        Self {
            cookie: SecretString::from(cookie),
            acquired_at: Utc::now(),
            generation,
        }
    }

    /// The `Cookie` header value (`name=value; name2=value2`).
    pub fn cookie_header(&self) -> &str {
        self.cookie.expose_secret()
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

// Legacy web endpoint HTTP client
//
// Wraps `reqwest::Client` with host-relative URL construction, explicit
// cookie headers and auth-rejection detection. The cookie is passed per
// request rather than kept in a jar: one session is shared by every
// collector of a host, and the session store decides when it is stale.
// Login/logout live in `legacy/auth.rs`.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, COOKIE, LOCATION};
use tracing::{debug, trace};

use crate::auth::HostEndpoint;
use crate::error::Error;
use crate::legacy::response::LegacyResponse;
use crate::transport::TransportConfig;

/// Raw HTTP client for a host's legacy web interface.
#[derive(Clone)]
pub struct LegacyClient {
    http: reqwest::Client,
    host: HostEndpoint,
}

impl LegacyClient {
    /// Create a new legacy client from a `TransportConfig`.
    pub fn new(host: HostEndpoint, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self { http, host })
    }

    /// The underlying HTTP client (for auth flows that need direct access).
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn host(&self) -> &HostEndpoint {
        &self.host
    }

    /// Send an authenticated GET and read the whole body.
    ///
    /// Returns `Error::Authentication` when the upstream refuses the cookie
    /// (401/403, or a redirect to the login page). Every other status is
    /// handed back to the caller: 404 means "not present", which is an
    /// answer, not a failure.
    pub async fn get(
        &self,
        path: &str,
        params: &[(&str, String)],
        cookie: &str,
        timeout: Duration,
    ) -> Result<LegacyResponse, Error> {
        let url = self.host.url(path)?;
        debug!("GET {url}");

        let mut builder = self.http.get(url).header(COOKIE, cookie).timeout(timeout);
        if !params.is_empty() {
            builder = builder.query(params);
        }

        let resp = builder.send().await.map_err(|e| map_send_error(e, timeout))?;
        let status = resp.status();
        trace!(%status, path, "legacy response");

        if is_auth_rejection(status, resp.headers()) {
            return Err(Error::Authentication {
                message: format!("session refused for {path} (HTTP {status})"),
            });
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let text = resp.text().await.map_err(|e| map_send_error(e, timeout))?;

        Ok(LegacyResponse::new(status, content_type, text))
    }
}

/// Classify a response as "your session is no good".
///
/// The web UI answers stale cookies with 302 → `/login`; some plugin
/// scripts answer with 401/403 directly.
pub(crate) fn is_auth_rejection(status: StatusCode, headers: &reqwest::header::HeaderMap) -> bool {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return true;
    }
    if status.is_redirection() {
        return headers
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|loc| loc.contains("/login"));
    }
    false
}

/// Timeouts get their own variant so logs say how long we waited.
pub(crate) fn map_send_error(e: reqwest::Error, timeout: Duration) -> Error {
    if e.is_timeout() {
        Error::Timeout {
            timeout_secs: timeout.as_secs(),
        }
    } else {
        Error::Transport(e)
    }
}

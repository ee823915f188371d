// Legacy web authentication
//
// Form-based login against the host's web UI. A successful login sets one
// or more session cookies; the joined `name=value` pairs become the token
// every legacy request carries until the host refuses it.

use std::time::Duration;

use reqwest::header::{COOKIE, LOCATION};
use secrecy::ExposeSecret;
use tracing::debug;

use crate::auth::LegacyCredentials;
use crate::error::Error;
use crate::legacy::client::{LegacyClient, is_auth_rejection, map_send_error};
use crate::legacy::response::preview;

const LOGIN_PATH: &str = "/login";
const LOGOUT_PATH: &str = "/logout";
const LOGOUT_TIMEOUT: Duration = Duration::from_secs(5);

impl LegacyClient {
    /// Authenticate with username/password and return the cookie header value.
    ///
    /// `POST /login` (form-encoded). Redirects are not followed; the
    /// response must set at least one cookie and must not bounce back to
    /// the login page.
    pub async fn login(&self, credentials: &LegacyCredentials, timeout: Duration) -> Result<String, Error> {
        credentials.validate(&self.host().name)?;

        let url = self.host().url(LOGIN_PATH)?;
        debug!("logging in at {}", url);

        let form = [
            ("username", credentials.username.as_str()),
            ("password", credentials.password.expose_secret()),
        ];

        let resp = self
            .http()
            .post(url)
            .form(&form)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_send_error(e, timeout))?;

        let status = resp.status();
        if is_auth_rejection(status, resp.headers()) {
            return Err(Error::Authentication {
                message: format!("login rejected (HTTP {status})"),
            });
        }

        if !status.is_success() && !status.is_redirection() {
            let body = resp.text().await.unwrap_or_default();
            debug!(%status, body = preview(&body), "login failed");
            return Err(Error::UnexpectedStatus {
                status: status.as_u16(),
            });
        }

        let cookie = resp
            .cookies()
            .filter(|c| !c.value().is_empty() && c.value() != "deleted")
            .map(|c| format!("{}={}", c.name(), c.value()))
            .collect::<Vec<_>>()
            .join("; ");

        if cookie.is_empty() {
            let location = resp
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_owned();
            return Err(Error::Authentication {
                message: format!("login returned no session cookie (HTTP {status}, location {location:?})"),
            });
        }

        debug!("login successful");
        Ok(cookie)
    }

    /// End a session. Best-effort; the web UI answers with a redirect.
    ///
    /// `GET /logout`
    pub async fn logout(&self, cookie: &str) -> Result<(), Error> {
        let url = self.host().url(LOGOUT_PATH)?;
        debug!("logging out at {}", url);

        let _resp = self
            .http()
            .get(url)
            .header(COOKIE, cookie)
            .timeout(LOGOUT_TIMEOUT)
            .send()
            .await
            .map_err(|e| map_send_error(e, LOGOUT_TIMEOUT))?;

        debug!("logout complete");
        Ok(())
    }
}

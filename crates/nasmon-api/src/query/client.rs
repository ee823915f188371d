// Async client for the host's structured query API.
//
// Endpoint: POST {base}/graphql
// Auth: x-api-key header
//
// The client is shape-agnostic: it returns the `data` member as loose JSON
// and leaves field extraction to the collectors.

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use url::Url;

use crate::auth::HostEndpoint;
use crate::error::Error;
use crate::legacy::response::preview;
use crate::transport::TransportConfig;

const QUERY_PATH: &str = "/graphql";

#[derive(Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    errors: Vec<QueryError>,
}

#[derive(Deserialize)]
struct QueryError {
    #[serde(default)]
    message: Option<String>,
}

/// Async client for the structured query API of one host.
#[derive(Clone)]
pub struct QueryClient {
    http: reqwest::Client,
    endpoint: Url,
    timeout_secs: u64,
}

impl QueryClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build from an API key and transport config.
    ///
    /// Injects `x-api-key` as a default header on every request.
    pub fn from_api_key(
        host: &HostEndpoint,
        api_key: &SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        let mut key_value =
            HeaderValue::from_str(api_key.expose_secret()).map_err(|e| Error::Authentication {
                message: format!("invalid API key header value: {e}"),
            })?;
        key_value.set_sensitive(true);
        headers.insert("x-api-key", key_value);

        let http = transport.build_client_with_headers(headers)?;
        Ok(Self {
            http,
            endpoint: host.url(QUERY_PATH)?,
            timeout_secs: transport.timeout_secs(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    // ── Query ────────────────────────────────────────────────────────

    /// Run one query and return its `data` member.
    ///
    /// A non-empty `errors` array fails the whole query; partial data is
    /// discarded because collectors cannot tell which parts are stale.
    pub async fn query(&self, query: &str) -> Result<serde_json::Value, Error> {
        debug!("POST {}", self.endpoint);

        let resp = self
            .http
            .post(self.endpoint.clone())
            .json(&QueryRequest { query })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout {
                        timeout_secs: self.timeout_secs,
                    }
                } else {
                    Error::Transport(e)
                }
            })?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::Authentication {
                message: format!("API key rejected (HTTP {status})"),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            trace!(%status, body = preview(&body), "query endpoint error");
            return Err(Error::UnexpectedStatus {
                status: status.as_u16(),
            });
        }

        let body = resp.text().await.map_err(Error::Transport)?;
        let parsed: QueryResponse = serde_json::from_str(&body).map_err(|e| {
            let preview = preview(&body);
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body: body.clone(),
            }
        })?;

        if !parsed.errors.is_empty() {
            let message = parsed
                .errors
                .iter()
                .map(|e| e.message.as_deref().unwrap_or("unknown error"))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::Query { message });
        }

        Ok(parsed.data.unwrap_or_else(|| serde_json::json!({})))
    }
}

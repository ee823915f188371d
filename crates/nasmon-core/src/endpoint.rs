// ── Endpoint discovery ──
//
// Companion scripts move between plugin versions, so some collectors
// carry an ordered list of candidate paths. The first candidate that
// answers 200 with a JSON body of the expected shape is bound for the
// life of the process. Discovery runs at most once per binding; callers
// that arrive while it is running wait for its answer.

use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::legacy::{FETCH_TIMEOUT, LegacyAccess, PROBE_TIMEOUT};

/// Resolution state of an [`EndpointBinding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState<'a> {
    /// Not tried yet, or the last attempt was cut short.
    Unresolved,
    Resolved(&'a str),
    /// Every candidate was tried and none qualified.
    Exhausted,
}

pub struct EndpointBinding {
    candidates: &'static [&'static str],
    accept: fn(&Value) -> bool,
    bound: OnceCell<Option<&'static str>>,
}

impl EndpointBinding {
    /// Bind to the first candidate answering with a JSON object.
    pub fn new(candidates: &'static [&'static str]) -> Self {
        Self {
            candidates,
            accept: Value::is_object,
            bound: OnceCell::new(),
        }
    }

    /// Narrow what counts as a usable answer.
    #[must_use]
    pub fn with_shape(mut self, accept: fn(&Value) -> bool) -> Self {
        self.accept = accept;
        self
    }

    pub fn candidates(&self) -> &'static [&'static str] {
        self.candidates
    }

    pub fn state(&self) -> BindingState<'static> {
        match self.bound.get() {
            None => BindingState::Unresolved,
            Some(Some(path)) => BindingState::Resolved(path),
            Some(None) => BindingState::Exhausted,
        }
    }

    /// The bound path, probing candidates in order on first use.
    ///
    /// `Ok(None)` is permanent: every candidate was tried. An auth failure
    /// is returned as an error and leaves the binding unresolved, so the
    /// next call tries again. Dropping the future mid-attempt also leaves
    /// it unresolved.
    pub async fn resolve(&self, legacy: &LegacyAccess) -> Result<Option<&'static str>, CoreError> {
        self.bound
            .get_or_try_init(|| self.try_candidates(legacy))
            .await
            .copied()
    }

    /// One tick's fetch from the bound endpoint.
    ///
    /// Yields an empty object when the host has no credentials, no
    /// candidate qualified, or the endpoint answered with something other
    /// than the expected JSON this time round. Transport errors propagate.
    pub async fn fetch(&self, legacy: &LegacyAccess) -> Result<Value, CoreError> {
        let empty = || Value::Object(serde_json::Map::new());
        if !legacy.ready() {
            return Ok(empty());
        }
        let Some(path) = self.resolve(legacy).await? else {
            return Ok(empty());
        };

        let host = legacy.host_name();
        let resp = legacy.get(path, &[], FETCH_TIMEOUT).await?;
        if resp.is_not_found() {
            debug!(host, path, "endpoint returned 404");
            return Ok(empty());
        }
        if !resp.is_success() {
            warn!(host, path, status = %resp.status(), "endpoint fetch failed");
            return Ok(empty());
        }
        match resp.json() {
            Ok(body) if (self.accept)(&body) => Ok(body),
            Ok(_) => {
                debug!(host, path, "endpoint answered with unexpected shape");
                Ok(empty())
            }
            Err(e) => {
                warn!(host, path, error = %e, "endpoint answered with invalid JSON");
                Ok(empty())
            }
        }
    }

    async fn try_candidates(&self, legacy: &LegacyAccess) -> Result<Option<&'static str>, CoreError> {
        let host = legacy.host_name();
        for &path in self.candidates {
            match legacy.get(path, &[], PROBE_TIMEOUT).await {
                Ok(resp) if resp.is_success() => match resp.json() {
                    Ok(body) if (self.accept)(&body) => {
                        info!(host, path, "endpoint resolved");
                        return Ok(Some(path));
                    }
                    Ok(_) => debug!(host, path, "candidate answered with unexpected shape"),
                    Err(_) => debug!(
                        host,
                        path,
                        content_type = resp.content_type().unwrap_or("-"),
                        "candidate answered with non-JSON body"
                    ),
                },
                Ok(resp) => debug!(host, path, status = %resp.status(), "candidate unavailable"),
                Err(e) if e.is_auth() => return Err(e),
                Err(e) => debug!(host, path, error = %e, "candidate request failed"),
            }
        }
        info!(host, candidates = ?self.candidates, "no working endpoint found");
        Ok(None)
    }
}

// ── Legacy endpoint access ──
//
// Per-collector handle onto the host's shared legacy session. Adds the
// collector name to logs and reports a missing username/password once
// per collector rather than once per tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use nasmon_api::{HostSession, LegacyResponse};

use crate::error::CoreError;

/// Timeout for regular legacy fetches.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for each candidate endpoint request; a dead candidate should not stall a tick.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct LegacyAccess {
    session: Arc<HostSession>,
    collector: &'static str,
    missing_reported: AtomicBool,
}

impl LegacyAccess {
    pub fn new(session: Arc<HostSession>, collector: &'static str) -> Self {
        Self {
            session,
            collector,
            missing_reported: AtomicBool::new(false),
        }
    }

    pub fn session(&self) -> &HostSession {
        &self.session
    }

    pub fn host_name(&self) -> &str {
        &self.session.host().name
    }

    /// `false` when the host has no legacy credentials. The first call
    /// logs a warning; later calls stay at debug.
    pub fn ready(&self) -> bool {
        if self.session.has_credentials() {
            return true;
        }
        if self.missing_reported.swap(true, Ordering::Relaxed) {
            debug!(host = %self.host_name(), collector = self.collector, "no legacy credentials, skipping");
        } else {
            warn!(
                host = %self.host_name(),
                collector = self.collector,
                "no legacy credentials configured; collector will stay idle"
            );
        }
        false
    }

    /// Like [`ready`](Self::ready), without logging.
    pub fn has_credentials(&self) -> bool {
        self.session.has_credentials()
    }

    pub async fn get(
        &self,
        path: &str,
        params: &[(&str, String)],
        timeout: Duration,
    ) -> Result<LegacyResponse, CoreError> {
        Ok(self.session.http_get(path, params, timeout).await?)
    }
}

// ── Collector contract ──
//
// A collector is a named, independently scheduled source. `fetch()` does
// all the I/O and returns the raw payload; `parse()` turns that payload
// into entity updates without touching the network. Collectors are peers:
// the runner composes them, none builds on another.

pub mod array;
pub mod coral_tpu;
pub mod docker;
pub mod gpu;
pub mod memory;
pub mod registry;
pub mod system;
pub mod vms;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use nasmon_api::{HostSession, QueryClient};

use crate::error::CoreError;
use crate::model::EntityUpdate;

#[async_trait]
pub trait Collector: Send + Sync {
    /// Unique within a host; forms part of every unique ID.
    fn name(&self) -> &'static str;

    fn interval(&self) -> Duration;

    /// Whether `fetch()` goes through the legacy session.
    fn needs_legacy_auth(&self) -> bool;

    /// Retrieve the raw payload. An empty object means "nothing this tick".
    async fn fetch(&self) -> Result<Value, CoreError>;

    /// Pure transformation. Missing or malformed parts of `raw` skip the
    /// affected entities, never the whole batch.
    fn parse(&self, raw: &Value) -> Vec<EntityUpdate>;

    fn info(&self) -> CollectorInfo {
        CollectorInfo {
            name: self.name(),
            interval_secs: self.interval().as_secs(),
            needs_legacy_auth: self.needs_legacy_auth(),
        }
    }
}

/// Static description of a collector, for listings and startup logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectorInfo {
    pub name: &'static str,
    pub interval_secs: u64,
    pub needs_legacy_auth: bool,
}

/// What a collector factory gets to build one instance for one host.
#[derive(Clone)]
pub struct CollectorContext {
    pub host: String,
    /// Absent when the host has no API key.
    pub query: Option<QueryClient>,
    pub session: Arc<HostSession>,
    pub interval: Duration,
}

/// Fetch-side helper for query-backed collectors: errors are logged and
/// turned into an empty payload, so the tick publishes nothing.
pub(crate) async fn run_query(
    query: &QueryClient,
    host: &str,
    collector: &'static str,
    document: &str,
) -> Value {
    match query.query(document).await {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(host, collector, error = %e, "query failed");
            Value::Object(serde_json::Map::new())
        }
    }
}

/// Empty raw payload.
pub(crate) fn empty() -> Value {
    Value::Object(serde_json::Map::new())
}

// ── Collector registry ──
//
// Every collector the process knows about, in start order. Collectors are
// opted out per host through configuration rather than discovered at
// runtime.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::{Collector, CollectorContext, CollectorInfo};
use super::{array, coral_tpu, docker, gpu, memory, system, vms};
use crate::config::HostConfig;
use crate::host::HostContext;

/// Which upstream surface a collector reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Source {
    Query,
    Legacy,
    /// Query API plus optional legacy enrichment.
    Mixed,
    Local,
}

pub struct CollectorFactory {
    pub name: &'static str,
    pub source: Source,
    pub needs_legacy_auth: bool,
    /// `None` follows the host scan interval.
    pub default_interval: Option<Duration>,
    /// `None` when the host lacks what the collector needs (e.g. an API key).
    pub build: fn(&CollectorContext) -> Option<Box<dyn Collector>>,
}

impl CollectorFactory {
    fn needs_query(&self) -> bool {
        matches!(self.source, Source::Query | Source::Mixed)
    }
}

pub static REGISTRY: &[CollectorFactory] = &[
    CollectorFactory {
        name: array::NAME,
        source: Source::Query,
        needs_legacy_auth: false,
        default_interval: None,
        build: array::build,
    },
    CollectorFactory {
        name: docker::NAME,
        source: Source::Query,
        needs_legacy_auth: false,
        default_interval: None,
        build: docker::build,
    },
    CollectorFactory {
        name: vms::NAME,
        source: Source::Mixed,
        needs_legacy_auth: true,
        default_interval: None,
        build: vms::build,
    },
    CollectorFactory {
        name: memory::NAME,
        source: Source::Legacy,
        needs_legacy_auth: true,
        default_interval: None,
        build: memory::build,
    },
    CollectorFactory {
        name: gpu::NAME,
        source: Source::Legacy,
        needs_legacy_auth: true,
        default_interval: None,
        build: gpu::build,
    },
    CollectorFactory {
        name: coral_tpu::NAME,
        source: Source::Legacy,
        needs_legacy_auth: true,
        default_interval: None,
        build: coral_tpu::build,
    },
    CollectorFactory {
        name: system::NAME,
        source: Source::Local,
        needs_legacy_auth: false,
        default_interval: Some(system::DEFAULT_INTERVAL),
        build: system::build,
    },
];

pub fn find(name: &str) -> Option<&'static CollectorFactory> {
    REGISTRY.iter().find(|f| f.name == name)
}

pub fn names() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|f| f.name)
}

/// Static listing with the intervals `config` would give each collector.
pub fn catalog(config: &HostConfig) -> Vec<(CollectorInfo, Source, bool)> {
    REGISTRY
        .iter()
        .map(|f| {
            let info = CollectorInfo {
                name: f.name,
                interval_secs: config.interval_for(f.name, f.default_interval).as_secs(),
                needs_legacy_auth: f.needs_legacy_auth,
            };
            (info, f.source, config.is_enabled(f.name))
        })
        .collect()
}

/// Build one collector for `host`, if it is enabled and buildable there.
pub fn build_one(factory: &CollectorFactory, host: &HostContext) -> Option<Arc<dyn Collector>> {
    let config = host.config();
    if !config.is_enabled(factory.name) {
        debug!(host = %config.name, collector = factory.name, "collector disabled");
        return None;
    }
    if factory.needs_query() && host.query().is_none() {
        info!(host = %config.name, collector = factory.name, "no API key configured, collector skipped");
        return None;
    }
    let ctx = CollectorContext {
        host: config.name.clone(),
        query: host.query().cloned(),
        session: host.session(),
        interval: config.interval_for(factory.name, factory.default_interval),
    };
    (factory.build)(&ctx).map(Arc::from)
}

/// Every enabled collector for `host`, in registry order.
pub fn create_collectors(host: &HostContext) -> Vec<Arc<dyn Collector>> {
    let collectors: Vec<_> = REGISTRY.iter().filter_map(|f| build_one(f, host)).collect();
    info!(host = %host.config().name, count = collectors.len(), "initialized collectors");
    collectors
}

// GPU collector for the GPU Statistics plugin.
//
// The plugin embeds its GPU map in the Dashboard page as the argument of a
// `gpustat_statusm({...})` call. That map is discovered once, then sent
// back on every tick to the plugin's multi-GPU status script.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::{Collector, CollectorContext, empty};
use crate::error::CoreError;
use crate::fields::{is_valid_reading, number, whole};
use crate::legacy::{FETCH_TIMEOUT, LegacyAccess};
use crate::model::{EntityDescriptor, EntityUpdate, expiry};

pub const NAME: &str = "gpu_plugin";

const DASHBOARD_PATH: &str = "/Dashboard";
const STATUS_PATH: &str = "/plugins/gpustat/gpustatusmulti.php";
const MAP_MARKER: &str = "gpustat_statusm(";

// ── Field aliases ───────────────────────────────────────────────────
//
// Plugin releases have renamed most fields. First match wins.

const UTIL: &[&str] = &["util", "gpuutil", "utilization", "load"];
const TEMP: &[&str] = &["temp", "temperature", "gputemp"];
const FAN: &[&str] = &["fan", "fanspeed"];
const POWER: &[&str] = &["power", "powerdraw"];
const MEM_UTIL: &[&str] = &["memutil", "memory_util"];
const MEM_USED: &[&str] = &["memused", "memory_used"];
const MEM_TOTAL: &[&str] = &["memtotal", "memory_total"];

/// Simple per-GPU gauge: (aliases, label, unit, icon, suffix, device class).
type Gauge = (
    &'static [&'static str],
    &'static str,
    &'static str,
    &'static str,
    &'static str,
    Option<&'static str>,
);

const LOAD: Gauge = (UTIL, "Load", "%", "mdi:chart-line", "load", None);

/// Emitted after load and memory usage, in this order.
const GAUGES: &[Gauge] = &[
    (FAN, "Fan Speed", "%", "mdi:fan", "fan", None),
    (POWER, "Power Usage", "W", "mdi:flash", "power", None),
    (TEMP, "Temperature", "°C", "mdi:thermometer", "temp", Some("temperature")),
];

pub struct GpuPluginCollector {
    legacy: LegacyAccess,
    interval: Duration,
    /// `None` once discovery found no plugin on this host.
    gpus: OnceCell<Option<Map<String, Value>>>,
}

impl GpuPluginCollector {
    pub fn new(legacy: LegacyAccess, interval: Duration) -> Self {
        Self {
            legacy,
            interval,
            gpus: OnceCell::new(),
        }
    }

    /// Read the GPU map off the Dashboard. Transport and HTTP failures are
    /// errors (retried next tick); a page without the plugin's call is a
    /// permanent "not installed".
    async fn discover(&self) -> Result<Option<Map<String, Value>>, CoreError> {
        let host = self.legacy.host_name();
        let resp = self.legacy.get(DASHBOARD_PATH, &[], FETCH_TIMEOUT).await?;
        if !resp.is_success() {
            return Err(CoreError::Transport {
                message: format!("GPU discovery: Dashboard answered HTTP {}", resp.status()),
            });
        }
        match extract_gpu_map(resp.text()) {
            Some(map) => {
                info!(host, gpus = ?map.keys().collect::<Vec<_>>(), "discovered GPUs");
                Ok(Some(map))
            }
            None => {
                info!(host, "GPU Statistics plugin not found on Dashboard");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl Collector for GpuPluginCollector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn needs_legacy_auth(&self) -> bool {
        true
    }

    async fn fetch(&self) -> Result<Value, CoreError> {
        if !self.legacy.ready() {
            return Ok(empty());
        }
        let Some(gpus) = self.gpus.get_or_try_init(|| self.discover()).await? else {
            return Ok(empty());
        };

        let param = serde_json::to_string(gpus).map_err(|e| CoreError::Internal(e.to_string()))?;
        let resp = self
            .legacy
            .get(STATUS_PATH, &[("gpus", param)], FETCH_TIMEOUT)
            .await?;
        if !resp.is_success() {
            warn!(host = self.legacy.host_name(), status = %resp.status(), "GPU status fetch failed");
            return Ok(empty());
        }
        match resp.json() {
            Ok(data @ Value::Object(_)) => Ok(data),
            Ok(_) => {
                debug!(host = self.legacy.host_name(), "GPU status was not an object");
                Ok(empty())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn parse(&self, raw: &Value) -> Vec<EntityUpdate> {
        parse_gpus(raw, self.interval.as_secs())
    }
}

pub(crate) fn build(ctx: &CollectorContext) -> Option<Box<dyn Collector>> {
    Some(Box::new(GpuPluginCollector::new(
        LegacyAccess::new(ctx.session.clone(), NAME),
        ctx.interval,
    )))
}

fn parse_gpus(raw: &Value, interval_secs: u64) -> Vec<EntityUpdate> {
    let Some(gpus) = raw.as_object() else {
        return Vec::new();
    };
    let expire = expiry(interval_secs, 2, 60);
    let mut updates = Vec::new();

    for (gpu_id, gpu) in gpus {
        let Some(gpu) = gpu.as_object() else {
            continue;
        };
        let name = gpu
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.trim().is_empty())
            .map_or_else(|| format!("GPU {gpu_id}"), str::to_owned);

        updates.extend(gauge(gpu, &LOAD, &name, gpu_id, expire));

        if let (Some(pct), Some(used), Some(total)) = (
            number(gpu, MEM_UTIL),
            number(gpu, MEM_USED),
            number(gpu, MEM_TOTAL),
        ) {
            updates.push(
                EntityUpdate::sensor(
                    EntityDescriptor::new(format!("{name} Memory Usage"))
                        .measurement("%")
                        .icon("mdi:memory"),
                    whole(pct),
                    format!("{gpu_id}_mem"),
                )
                .attribute("used", whole(used))
                .attribute("total", whole(total))
                .expire_after(expire),
            );
        }

        updates.extend(
            GAUGES
                .iter()
                .filter_map(|g| gauge(gpu, g, &name, gpu_id, expire)),
        );

        if let Some(load) = number(gpu, UTIL) {
            let attributes: Map<String, Value> = gpu
                .iter()
                .filter(|(_, v)| is_valid_reading(v))
                .map(|(k, v)| (k.to_lowercase(), v.clone()))
                .collect();
            updates.push(
                EntityUpdate::sensor(
                    EntityDescriptor::new(name.clone())
                        .measurement("%")
                        .icon("mdi:expansion-card"),
                    whole(load),
                    format!("{gpu_id}_summary"),
                )
                .attributes(attributes)
                .expire_after(expire),
            );
        }
    }

    updates
}

/// One simple gauge for `gpu`, if any of its aliases carries a number.
fn gauge(
    gpu: &Map<String, Value>,
    &(aliases, label, unit, icon, suffix, device_class): &Gauge,
    name: &str,
    gpu_id: &str,
    expire: u64,
) -> Option<EntityUpdate> {
    let v = number(gpu, aliases)?;
    let mut descriptor = EntityDescriptor::new(format!("{name} {label}"))
        .measurement(unit)
        .icon(icon);
    if let Some(class) = device_class {
        descriptor = descriptor.device_class(class);
    }
    Some(
        EntityUpdate::sensor(descriptor, whole(v), format!("{gpu_id}_{suffix}"))
            .expire_after(expire),
    )
}

/// Find the object literal passed to `gpustat_statusm(` in the page.
///
/// The name also appears in the function's own definition, so every
/// occurrence is tried until one is followed by a parseable, non-empty
/// JSON object.
pub fn extract_gpu_map(page: &str) -> Option<Map<String, Value>> {
    page.match_indices(MAP_MARKER).find_map(|(idx, _)| {
        let rest = page[idx + MAP_MARKER.len()..].trim_start();
        if !rest.starts_with('{') {
            return None;
        }
        let literal = balanced_object(rest)?;
        match serde_json::from_str::<Value>(literal) {
            Ok(Value::Object(map)) if !map.is_empty() => Some(map),
            _ => None,
        }
    })
}

/// The `{...}` prefix of `text`, honouring strings and escapes.
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

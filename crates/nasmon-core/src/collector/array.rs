// Array collector: array state, capacity, parity and member disks via the
// structured query API.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use nasmon_api::QueryClient;

use super::{Collector, CollectorContext, run_query};
use crate::error::CoreError;
use crate::fields::{number, round_to, text};
use crate::model::{EntityDescriptor, EntityUpdate, StateClass};

pub const NAME: &str = "array";

const QUERY: &str = r"
query {
  array {
    state
    capacity { kilobytes { free used total } }
    parities { id name device size status temp }
    disks { id name device size status temp fsType fsSize fsUsed fsFree }
    caches { id name device size status temp fsType fsSize fsUsed fsFree }
  }
}";

const KIB_PER_TIB: f64 = 1024.0 * 1024.0 * 1024.0;

pub struct ArrayCollector {
    host: String,
    query: QueryClient,
    interval: Duration,
}

impl ArrayCollector {
    pub fn new(host: String, query: QueryClient, interval: Duration) -> Self {
        Self { host, query, interval }
    }
}

#[async_trait]
impl Collector for ArrayCollector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn needs_legacy_auth(&self) -> bool {
        false
    }

    async fn fetch(&self) -> Result<Value, CoreError> {
        Ok(run_query(&self.query, &self.host, NAME, QUERY).await)
    }

    fn parse(&self, raw: &Value) -> Vec<EntityUpdate> {
        parse_array(raw)
    }
}

pub(crate) fn build(ctx: &CollectorContext) -> Option<Box<dyn Collector>> {
    let query = ctx.query.clone()?;
    Some(Box::new(ArrayCollector::new(ctx.host.clone(), query, ctx.interval)))
}

fn parse_array(raw: &Value) -> Vec<EntityUpdate> {
    let Some(array) = raw.get("array").and_then(Value::as_object) else {
        return Vec::new();
    };
    let mut updates = Vec::new();

    let state = text(array, "state").unwrap_or("UNKNOWN");
    updates.push(EntityUpdate::sensor(
        EntityDescriptor::new("Array State").icon("mdi:server"),
        state,
        "array_state",
    ));

    if let Some(kb) = array
        .get("capacity")
        .and_then(|c| c.get("kilobytes"))
        .and_then(Value::as_object)
    {
        updates.extend(capacity(kb));
    }

    for parity in objects(array, "parities") {
        let name = text(parity, "name").unwrap_or("parity");
        let status = text(parity, "status").unwrap_or("UNKNOWN");
        updates.push(EntityUpdate::sensor(
            EntityDescriptor::new(format!("Parity {name} Status")).icon("mdi:shield-check"),
            status,
            format!("parity_{name}_status"),
        ));
        if let Some(temp) = number(parity, &["temp"]).filter(|t| *t > 0.0) {
            updates.push(temperature(format!("Parity {name} Temperature"), temp, format!("parity_{name}_temperature")));
        }
        // Parity size is reported in KiB.
        if let Some(size) = number(parity, &["size"]).filter(|s| *s > 0.0) {
            updates.push(
                EntityUpdate::sensor(
                    EntityDescriptor::new(format!("Parity {name} Size"))
                        .measurement("TB")
                        .icon("mdi:harddisk"),
                    round_to(size * 1024.0 / 1e12, 2),
                    format!("parity_{name}_size"),
                )
                .retained(),
            );
        }
    }

    for (label, prefix, key) in [("Disk", "disk", "disks"), ("Cache", "cache", "caches")] {
        for disk in objects(array, key) {
            let Some(name) = text(disk, "name") else {
                continue;
            };
            updates.extend(member_disk(label, prefix, name, disk));
        }
    }

    updates
}

fn capacity(kb: &Map<String, Value>) -> Option<EntityUpdate> {
    let total = number(kb, &["total"]).filter(|t| *t > 0.0)?;
    let used = number(kb, &["used"]).unwrap_or(0.0);
    let free = number(kb, &["free"]).unwrap_or(0.0);

    Some(
        EntityUpdate::sensor(
            EntityDescriptor::new("Array Usage")
                .measurement("%")
                .icon("mdi:database"),
            round_to(used / total * 100.0, 2),
            "array_usage",
        )
        .attribute("total_tb", round_to(total / KIB_PER_TIB, 2))
        .attribute("used_tb", round_to(used / KIB_PER_TIB, 2))
        .attribute("free_tb", round_to(free / KIB_PER_TIB, 2)),
    )
}

fn member_disk(label: &str, prefix: &str, name: &str, disk: &Map<String, Value>) -> Vec<EntityUpdate> {
    let mut updates = Vec::new();

    let status = text(disk, "status").unwrap_or("UNKNOWN");
    let mut status_update = EntityUpdate::sensor(
        EntityDescriptor::new(format!("{label} {name} Status")).icon("mdi:harddisk"),
        status,
        format!("{prefix}_{name}_status"),
    );
    if let Some(device) = text(disk, "device") {
        status_update = status_update.attribute("device", device);
    }
    if let Some(fs) = text(disk, "fsType") {
        status_update = status_update.attribute("fs_type", fs);
    }
    updates.push(status_update);

    if let Some(temp) = number(disk, &["temp"]).filter(|t| *t > 0.0) {
        updates.push(temperature(
            format!("{label} {name} Temperature"),
            temp,
            format!("{prefix}_{name}_temperature"),
        ));
    }

    if let (Some(size), Some(used)) = (number(disk, &["fsSize"]), number(disk, &["fsUsed"])) {
        if size > 0.0 {
            let mut usage = EntityUpdate::sensor(
                EntityDescriptor::new(format!("{label} {name} Usage"))
                    .measurement("%")
                    .icon("mdi:chart-pie"),
                round_to(used / size * 100.0, 2),
                format!("{prefix}_{name}_usage"),
            )
            .attribute("size_tb", round_to(size / KIB_PER_TIB, 2))
            .attribute("used_tb", round_to(used / KIB_PER_TIB, 2));
            if let Some(free) = number(disk, &["fsFree"]) {
                usage = usage.attribute("free_tb", round_to(free / KIB_PER_TIB, 2));
            }
            updates.push(usage);
        }
    }

    updates
}

fn temperature(name: String, celsius: f64, suffix: String) -> EntityUpdate {
    EntityUpdate::sensor(
        EntityDescriptor::new(name)
            .unit("°C")
            .device_class("temperature")
            .state_class(StateClass::Measurement),
        celsius,
        suffix,
    )
}

fn objects<'a>(parent: &'a Map<String, Value>, key: &str) -> impl Iterator<Item = &'a Map<String, Value>> {
    parent
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::model::EntityState;

    #[test]
    fn empty_payload_yields_nothing() {
        assert!(parse_array(&json!({})).is_empty());
    }

    #[test]
    fn state_usage_and_parity() {
        let raw = json!({
            "array": {
                "state": "STARTED",
                "capacity": {"kilobytes": {"total": "2147483648", "used": "1073741824", "free": "1073741824"}},
                "parities": [{"name": "parity", "status": "DISK_OK", "temp": 34, "size": 3_906_250_000_u64}]
            }
        });
        let updates = parse_array(&raw);
        let suffixes: Vec<&str> = updates.iter().map(|u| u.unique_id_suffix.as_str()).collect();
        assert_eq!(
            suffixes,
            ["array_state", "array_usage", "parity_parity_status", "parity_parity_temperature", "parity_parity_size"]
        );
        assert_eq!(updates[0].state, EntityState::Text("STARTED".into()));
        assert_eq!(updates[1].state, EntityState::Float(50.0));
        assert_eq!(updates[1].attributes["total_tb"], json!(2.0));
        assert_eq!(updates[4].state, EntityState::Float(4.0));
        assert!(updates[4].retain);
    }

    #[test]
    fn disks_without_names_or_sizes_are_partial() {
        let raw = json!({
            "array": {
                "disks": [
                    {"status": "DISK_OK"},
                    {"name": "disk1", "status": "DISK_OK", "temp": 0, "fsSize": 100, "fsUsed": 25}
                ],
                "caches": [{"name": "cache", "temp": "41"}]
            }
        });
        let updates = parse_array(&raw);
        let suffixes: Vec<&str> = updates.iter().map(|u| u.unique_id_suffix.as_str()).collect();
        assert_eq!(
            suffixes,
            ["array_state", "disk_disk1_status", "disk_disk1_usage", "cache_cache_status", "cache_cache_temperature"]
        );
        assert_eq!(updates[0].state, EntityState::Text("UNKNOWN".into()));
        assert_eq!(updates[2].state, EntityState::Float(25.0));
    }
}

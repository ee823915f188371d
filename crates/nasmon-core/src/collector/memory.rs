// Memory collector: RAM totals plus VM/Docker breakdown from a companion
// script installed on the host. The script location is discovered once.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{Collector, CollectorContext};
use crate::endpoint::EndpointBinding;
use crate::error::CoreError;
use crate::fields::{bytes_to_gib, parse_number};
use crate::legacy::LegacyAccess;
use crate::model::{EntityDescriptor, EntityUpdate, StateClass, expiry};

pub const NAME: &str = "memory";

pub const CANDIDATES: &[&str] = &[
    "/plugins/hass/memory_status.php",
    "/plugins/unraid-monitor/memory_status.php",
    "/plugins/dynamix/memory_status.php",
    "/state/memory_status.json",
];

/// (field, name, icon, unique ID suffix) for the breakdown sensors.
const BREAKDOWN: &[(&str, &str, &str, &str)] = &[
    ("system", "Memory System", "mdi:cog", "memory_system"),
    ("vm", "Memory VM", "mdi:monitor", "memory_vm"),
    ("docker", "Memory Docker", "mdi:docker", "memory_docker"),
];

pub struct MemoryCollector {
    legacy: LegacyAccess,
    endpoint: EndpointBinding,
    interval: Duration,
}

impl MemoryCollector {
    pub fn new(legacy: LegacyAccess, interval: Duration) -> Self {
        Self {
            legacy,
            endpoint: EndpointBinding::new(CANDIDATES).with_shape(has_memory),
            interval,
        }
    }

    pub fn endpoint(&self) -> &EndpointBinding {
        &self.endpoint
    }
}

fn has_memory(body: &Value) -> bool {
    body.get("memory").is_some_and(Value::is_object)
}

#[async_trait]
impl Collector for MemoryCollector {
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
        self.endpoint.fetch(&self.legacy).await
    }

    fn parse(&self, raw: &Value) -> Vec<EntityUpdate> {
        parse_memory(raw, self.interval.as_secs())
    }
}

pub(crate) fn build(ctx: &CollectorContext) -> Option<Box<dyn Collector>> {
    Some(Box::new(MemoryCollector::new(
        LegacyAccess::new(ctx.session.clone(), NAME),
        ctx.interval,
    )))
}

/// A reading in GiB: the script's precomputed `{field}_gib` when positive,
/// else the byte count converted.
fn gib(memory: &Map<String, Value>, field: &str) -> Option<f64> {
    memory
        .get(&format!("{field}_gib"))
        .and_then(parse_number)
        .filter(|v| *v > 0.0)
        .or_else(|| memory.get(field).and_then(parse_number).map(bytes_to_gib))
}

fn gib_sensor(name: &str, icon: &str, gib: f64, suffix: &str, expire: u64) -> EntityUpdate {
    EntityUpdate::sensor(
        EntityDescriptor::new(name).measurement("GiB").icon(icon),
        gib,
        suffix,
    )
    .expire_after(expire)
}

fn parse_memory(raw: &Value, interval_secs: u64) -> Vec<EntityUpdate> {
    let Some(memory) = raw.get("memory").and_then(Value::as_object) else {
        return Vec::new();
    };
    let expire = expiry(interval_secs, 3, 120);
    let bytes = |field: &str| memory.get(field).cloned().unwrap_or(Value::from(0));
    let mut updates = Vec::new();

    if let Some(total) = gib(memory, "total").filter(|t| *t > 0.0) {
        updates.push(
            EntityUpdate::sensor(
                EntityDescriptor::new("Memory Total")
                    .unit("GiB")
                    .icon("mdi:memory")
                    .state_class(StateClass::Total),
                total,
                "memory_total",
            )
            .attribute("bytes", bytes("total"))
            .retained()
            .expire_after(expire),
        );

        if let Some(used) = gib(memory, "used") {
            let mut update = gib_sensor("Memory Used", "mdi:memory", used, "memory_used", expire)
                .attribute("bytes", bytes("used"));
            if let Some(pct) = memory.get("percent_used").and_then(parse_number) {
                update = update.attribute("percent", pct);
            }
            updates.push(update);
        }

        if let Some(free) = gib(memory, "free") {
            let mut update = gib_sensor("Memory Free", "mdi:memory", free, "memory_free", expire)
                .attribute("bytes", bytes("free"));
            if let Some(available) = gib(memory, "available") {
                update = update
                    .attribute("available_bytes", bytes("available"))
                    .attribute("available_gib", available);
            }
            updates.push(update);
        }
    }

    for &(field, name, icon, suffix) in BREAKDOWN {
        if let Some(v) = gib(memory, field).filter(|v| *v > 0.0) {
            updates.push(gib_sensor(name, icon, v, suffix, expire).attribute("bytes", bytes(field)));
        }
    }

    updates
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::model::EntityState;

    #[test]
    fn totals_from_bytes() {
        let raw = json!({"memory": {"total": 17_179_869_184_u64, "used": 8_589_934_592_u64}});
        let updates = parse_memory(&raw, 30);

        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].descriptor.name, "Memory Total");
        assert_eq!(updates[0].state, EntityState::Float(16.0));
        assert!(updates[0].retain);
        assert_eq!(updates[0].expire_after, Some(120));
        assert_eq!(updates[1].descriptor.name, "Memory Used");
        assert_eq!(updates[1].state, EntityState::Float(8.0));
    }

    #[test]
    fn precomputed_gib_wins_and_breakdown_skips_zero() {
        let raw = json!({"memory": {
            "total": 1, "total_gib": 31.25,
            "free": 0, "free_gib": 0,
            "vm": 4_294_967_296_u64, "docker": 0
        }});
        let updates = parse_memory(&raw, 60);
        let suffixes: Vec<&str> = updates.iter().map(|u| u.unique_id_suffix.as_str()).collect();
        assert_eq!(suffixes, ["memory_total", "memory_free", "memory_vm"]);
        assert_eq!(updates[0].state, EntityState::Float(31.25));
        assert_eq!(updates[2].state, EntityState::Float(4.0));
        assert_eq!(updates[2].expire_after, Some(180));
    }

    #[test]
    fn missing_memory_member_yields_nothing() {
        assert!(parse_memory(&json!({}), 30).is_empty());
        assert!(parse_memory(&json!({"memory": "n/a"}), 30).is_empty());
    }

    #[test]
    fn accepted_shape_requires_memory_object() {
        assert!(has_memory(&json!({"memory": {}})));
        assert!(!has_memory(&json!({"mem": {}})));
    }
}

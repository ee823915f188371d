// Coral TPU collector.
//
// PCIe/M.2 accelerators report temperature and throttle state; USB sticks
// only report presence and whether a runtime has initialised them. Data
// comes from a companion script whose location is discovered once.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use super::{Collector, CollectorContext};
use crate::endpoint::EndpointBinding;
use crate::error::CoreError;
use crate::fields::{parse_number, round_to, text};
use crate::legacy::LegacyAccess;
use crate::model::{EntityDescriptor, EntityUpdate, StateClass, expiry};

pub const NAME: &str = "coral_tpu";

pub const CANDIDATES: &[&str] = &[
    "/plugins/coral/coral_status.php",
    "/plugins/dynamix/coral_status.php",
    "/state/coral_status.json",
];

/// Sysfs trip points in millidegrees, renamed for attributes.
const TRIP_POINTS: &[(&str, &str)] = &[
    ("trip_point0", "trip_point_250mhz"),
    ("trip_point1", "trip_point_125mhz"),
    ("trip_point2", "trip_point_62mhz"),
    ("shutdown_temp", "shutdown_temp"),
];

pub struct CoralTpuCollector {
    legacy: LegacyAccess,
    endpoint: EndpointBinding,
    interval: Duration,
}

impl CoralTpuCollector {
    pub fn new(legacy: LegacyAccess, interval: Duration) -> Self {
        Self {
            legacy,
            endpoint: EndpointBinding::new(CANDIDATES),
            interval,
        }
    }
}

#[async_trait]
impl Collector for CoralTpuCollector {
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
        parse_coral(raw, self.interval.as_secs())
    }
}

pub(crate) fn build(ctx: &CollectorContext) -> Option<Box<dyn Collector>> {
    Some(Box::new(CoralTpuCollector::new(
        LegacyAccess::new(ctx.session.clone(), NAME),
        ctx.interval,
    )))
}

fn throttle_label(state: &str) -> (&str, &'static str) {
    match state {
        "normal" => ("Normal", "mdi:speedometer"),
        "throttled_250" => ("Throttled (250 MHz)", "mdi:speedometer-medium"),
        "throttled_125" => ("Throttled (125 MHz)", "mdi:speedometer-slow"),
        "throttled_62" => ("Throttled (62.5 MHz)", "mdi:alert"),
        "shutdown_risk" => ("Critical - Shutdown Risk", "mdi:alert-octagon"),
        other => (other, "mdi:help-circle"),
    }
}

fn devices<'a>(raw: &'a Map<String, Value>, key: &str) -> Vec<&'a Map<String, Value>> {
    raw.get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
        .collect()
}

fn parse_coral(raw: &Value, interval_secs: u64) -> Vec<EntityUpdate> {
    let Some(raw) = raw.as_object().filter(|r| r.contains_key("pcie") || r.contains_key("usb")) else {
        return Vec::new();
    };
    let expire = expiry(interval_secs, 2, 60);
    let pcie = devices(raw, "pcie");
    let usb = devices(raw, "usb");
    let mut updates = Vec::new();

    for dev in &pcie {
        let id = text(dev, "id").unwrap_or("unknown");
        let num = id.strip_prefix("apex_").unwrap_or(id);
        let path = text(dev, "device").map_or_else(|| format!("/dev/apex{num}"), str::to_owned);
        let temp = dev.get("temp_c").and_then(parse_number);

        if let Some(celsius) = temp {
            updates.push(
                EntityUpdate::sensor(
                    EntityDescriptor::new(format!("Coral TPU {num} Temperature"))
                        .unit("°C")
                        .icon("mdi:chip")
                        .device_class("temperature")
                        .state_class(StateClass::Measurement),
                    round_to(celsius, 1),
                    format!("coral_pcie_{num}_temp"),
                )
                .attributes(pcie_attributes(dev))
                .expire_after(expire),
            );
        }

        if let Some(throttle) = text(dev, "throttle_state").filter(|s| *s != "unknown") {
            let (label, icon) = throttle_label(throttle);
            updates.push(
                EntityUpdate::sensor(
                    EntityDescriptor::new(format!("Coral TPU {num} Status")).icon(icon),
                    label,
                    format!("coral_pcie_{num}_status"),
                )
                .attribute("raw_state", throttle)
                .attribute("temp_c", temp)
                .attribute("device", path.as_str())
                .expire_after(expire),
            );
        }

        updates.push(
            EntityUpdate::binary(
                EntityDescriptor::new(format!("Coral TPU {num}"))
                    .device_class("connectivity")
                    .icon("mdi:chip"),
                true,
                format!("coral_pcie_{num}_presence"),
            )
            .attribute("device", path)
            .attribute("type", "pcie")
            .attribute("id", id)
            .retained(),
        );
    }

    for (idx, dev) in usb.iter().enumerate() {
        let id = text(dev, "id").map_or_else(|| format!("usb_coral_{idx}"), str::to_owned);
        let initialized = dev.get("initialized").and_then(Value::as_bool).unwrap_or(false);
        let vendor = text(dev, "vendor_id").unwrap_or("");
        let product = text(dev, "product_id").unwrap_or("");

        updates.push(
            EntityUpdate::binary(
                EntityDescriptor::new(format!("Coral USB {idx}"))
                    .device_class("connectivity")
                    .icon("mdi:usb"),
                true,
                format!("coral_usb_{idx}_presence"),
            )
            .attribute("bus", text(dev, "bus").unwrap_or("unknown"))
            .attribute("usb_device", text(dev, "device").unwrap_or("unknown"))
            .attribute("type", "usb")
            .attribute("id", id)
            .attribute("vendor_id", vendor)
            .attribute("product_id", product)
            .retained(),
        );

        let (icon, description) = if initialized {
            ("mdi:check-circle", "Ready for inference")
        } else {
            ("mdi:alert-circle", "Not yet accessed by application")
        };
        updates.push(
            EntityUpdate::binary(
                EntityDescriptor::new(format!("Coral USB {idx} Initialized"))
                    .device_class("running")
                    .icon(icon),
                initialized,
                format!("coral_usb_{idx}_initialized"),
            )
            .attribute("vendor_id", vendor)
            .attribute("product_id", product)
            .attribute("description", description)
            .expire_after(expire),
        );
    }

    let listing: Vec<Value> = pcie
        .iter()
        .map(|d| json!({"type": "pcie", "id": text(d, "id").unwrap_or("unknown")}))
        .chain(usb.iter().map(|d| json!({"type": "usb", "id": text(d, "id").unwrap_or("unknown")})))
        .collect();
    updates.push(
        EntityUpdate::sensor(
            EntityDescriptor::new("Coral TPU Count")
                .icon("mdi:counter")
                .state_class(StateClass::Measurement),
            u64::try_from(listing.len()).unwrap_or(u64::MAX),
            "coral_tpu_count",
        )
        .attribute("pcie_count", pcie.len())
        .attribute("usb_count", usb.len())
        .attribute("devices", listing)
        .expire_after(expire),
    );

    updates
}

fn pcie_attributes(dev: &Map<String, Value>) -> Map<String, Value> {
    let mut attrs = Map::new();
    if let Some(path) = text(dev, "device") {
        attrs.insert("device".into(), path.into());
    }
    for &(field, attr) in TRIP_POINTS {
        if let Some(milli) = dev.get(field).and_then(parse_number) {
            attrs.insert(attr.into(), round_to(milli / 1000.0, 1).into());
        }
    }
    if let Some(ms) = dev.get("poll_interval").and_then(Value::as_u64) {
        attrs.insert("poll_interval_ms".into(), ms.into());
    }
    if let Some(state) = text(dev, "throttle_state") {
        attrs.insert("throttle_state".into(), state.into());
    }
    attrs
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::model::{BinaryState, EntityState};

    #[test]
    fn empty_payload_yields_nothing() {
        assert!(parse_coral(&json!({}), 30).is_empty());
    }

    #[test]
    fn pcie_device() {
        let raw = json!({"pcie": [{
            "id": "apex_0", "temp_c": "52.36", "throttle_state": "throttled_250",
            "trip_point0": 85000, "shutdown_temp": "104800", "poll_interval": 1000
        }], "usb": []});
        let updates = parse_coral(&raw, 30);
        let suffixes: Vec<&str> = updates.iter().map(|u| u.unique_id_suffix.as_str()).collect();

        assert_eq!(
            suffixes,
            ["coral_pcie_0_temp", "coral_pcie_0_status", "coral_pcie_0_presence", "coral_tpu_count"]
        );
        assert_eq!(updates[0].state, EntityState::Float(52.4));
        assert_eq!(updates[0].attributes["trip_point_250mhz"], json!(85.0));
        assert_eq!(updates[0].attributes["shutdown_temp"], json!(104.8));
        assert_eq!(updates[1].state, EntityState::Text("Throttled (250 MHz)".into()));
        assert_eq!(updates[2].attributes["device"], json!("/dev/apex0"));
        assert!(updates[2].retain);
        assert_eq!(updates[3].state, EntityState::Integer(1));
    }

    #[test]
    fn usb_device_and_count() {
        let raw = json!({"usb": [{"bus": "002", "device": "003", "initialized": false}]});
        let updates = parse_coral(&raw, 45);

        assert_eq!(updates.len(), 3);
        assert_eq!(updates[0].unique_id_suffix, "coral_usb_0_presence");
        assert_eq!(updates[0].attributes["id"], json!("usb_coral_0"));
        assert_eq!(updates[1].state, EntityState::Binary(BinaryState::Off));
        assert_eq!(updates[1].expire_after, Some(90));
        assert_eq!(updates[2].attributes["devices"], json!([{"type": "usb", "id": "unknown"}]));
    }

    #[test]
    fn endpoint_without_devices_still_reports_zero() {
        let updates = parse_coral(&json!({"pcie": [], "usb": []}), 30);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].state, EntityState::Integer(0));
    }
}

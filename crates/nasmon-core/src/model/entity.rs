// ── Entity updates ──
//
// The single output shape of every collector: one published state plus
// the metadata a home-automation broker needs to create the entity.
// Collectors build these; publishers serialize them.

use serde::Serialize;
use serde_json::{Map, Value};
use strum::{Display, EnumString};

// ── Kinds ───────────────────────────────────────────────────────────

/// What kind of entity a consumer should create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SensorKind {
    Sensor,
    BinarySensor,
}

/// Statistical meaning of a numeric sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StateClass {
    Measurement,
    Total,
    TotalIncreasing,
}

/// Binary sensor states are published as the literals `ON` / `OFF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum BinaryState {
    #[serde(rename = "ON")]
    #[strum(serialize = "ON")]
    On,
    #[serde(rename = "OFF")]
    #[strum(serialize = "OFF")]
    Off,
}

impl From<bool> for BinaryState {
    fn from(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }
}

// ── State ───────────────────────────────────────────────────────────

/// A published state value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EntityState {
    Binary(BinaryState),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for EntityState {
    fn from(on: bool) -> Self {
        Self::Binary(on.into())
    }
}

impl From<i64> for EntityState {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<u64> for EntityState {
    fn from(v: u64) -> Self {
        i64::try_from(v).map_or(Self::Text(v.to_string()), Self::Integer)
    }
}

impl From<f64> for EntityState {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for EntityState {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for EntityState {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl std::fmt::Display for EntityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Binary(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

// ── Descriptor ──────────────────────────────────────────────────────

/// Display and classification metadata for an entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntityDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_class: Option<StateClass>,
}

impl EntityDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit_of_measurement = Some(unit.into());
        self
    }

    #[must_use]
    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    #[must_use]
    pub fn device_class(mut self, class: impl Into<String>) -> Self {
        self.device_class = Some(class.into());
        self
    }

    #[must_use]
    pub fn state_class(mut self, class: StateClass) -> Self {
        self.state_class = Some(class);
        self
    }

    /// Shorthand for a `measurement` sensor with a unit.
    #[must_use]
    pub fn measurement(self, unit: impl Into<String>) -> Self {
        self.unit(unit).state_class(StateClass::Measurement)
    }
}

// ── Update ──────────────────────────────────────────────────────────

/// One published state for one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityUpdate {
    pub kind: SensorKind,
    #[serde(flatten)]
    pub descriptor: EntityDescriptor,
    pub state: EntityState,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
    /// Stable per-collector suffix; see [`SourceIdentity::unique_id`](crate::SourceIdentity::unique_id).
    pub unique_id_suffix: String,
    /// Consumers should keep the last value across their own restarts.
    pub retain: bool,
    /// Seconds after which the state should be considered stale.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_after: Option<u64>,
}

impl EntityUpdate {
    pub fn sensor(
        descriptor: EntityDescriptor,
        state: impl Into<EntityState>,
        suffix: impl Into<String>,
    ) -> Self {
        Self {
            kind: SensorKind::Sensor,
            descriptor,
            state: state.into(),
            attributes: Map::new(),
            unique_id_suffix: suffix.into(),
            retain: false,
            expire_after: None,
        }
    }

    pub fn binary(descriptor: EntityDescriptor, on: bool, suffix: impl Into<String>) -> Self {
        Self {
            kind: SensorKind::BinarySensor,
            ..Self::sensor(descriptor, on, suffix)
        }
    }

    #[must_use]
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    #[must_use]
    pub fn retained(mut self) -> Self {
        self.retain = true;
        self
    }

    #[must_use]
    pub fn expire_after(mut self, secs: u64) -> Self {
        self.expire_after = Some(secs);
        self
    }
}

/// Staleness window for a collector polling every `interval_secs`:
/// `factor` missed polls, never less than `floor` seconds.
pub fn expiry(interval_secs: u64, factor: u64, floor: u64) -> u64 {
    interval_secs.saturating_mul(factor).max(floor)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn binary_serializes_as_on_off() {
        let update = EntityUpdate::binary(EntityDescriptor::new("Plex"), true, "docker_plex");
        let v = serde_json::to_value(&update).unwrap();
        assert_eq!(v["state"], json!("ON"));
        assert_eq!(v["kind"], json!("binary_sensor"));
    }

    #[test]
    fn descriptor_is_flattened_and_sparse() {
        let update = EntityUpdate::sensor(
            EntityDescriptor::new("Total Memory").measurement("GiB"),
            16.0,
            "memory_total",
        )
        .retained();
        let v = serde_json::to_value(&update).unwrap();
        assert_eq!(v["name"], json!("Total Memory"));
        assert_eq!(v["unit_of_measurement"], json!("GiB"));
        assert_eq!(v["state_class"], json!("measurement"));
        assert!(v.get("icon").is_none());
        assert!(v.get("attributes").is_none());
        assert_eq!(v["retain"], json!(true));
    }

    #[test]
    fn expiry_has_floor() {
        assert_eq!(expiry(30, 3, 120), 120);
        assert_eq!(expiry(60, 3, 120), 180);
        assert_eq!(expiry(10, 2, 60), 60);
    }

    #[test]
    fn kind_parses_from_str() {
        assert_eq!("binary_sensor".parse::<SensorKind>().unwrap(), SensorKind::BinarySensor);
    }
}

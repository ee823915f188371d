// Docker collector: one running/stopped binary sensor per container.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use nasmon_api::QueryClient;

use super::{Collector, CollectorContext, run_query};
use crate::error::CoreError;
use crate::fields::text;
use crate::model::{EntityDescriptor, EntityUpdate};

pub const NAME: &str = "docker";

const QUERY: &str = r"
query {
  docker {
    containers {
      id names image state status autoStart
      ports { ip privatePort publicPort type }
    }
  }
}";

pub struct DockerCollector {
    host: String,
    query: QueryClient,
    interval: Duration,
}

impl DockerCollector {
    pub fn new(host: String, query: QueryClient, interval: Duration) -> Self {
        Self { host, query, interval }
    }
}

#[async_trait]
impl Collector for DockerCollector {
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
        parse_containers(raw)
    }
}

pub(crate) fn build(ctx: &CollectorContext) -> Option<Box<dyn Collector>> {
    let query = ctx.query.clone()?;
    Some(Box::new(DockerCollector::new(ctx.host.clone(), query, ctx.interval)))
}

fn parse_containers(raw: &Value) -> Vec<EntityUpdate> {
    raw.pointer("/docker/containers")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
        .filter_map(container)
        .collect()
}

fn container(c: &Map<String, Value>) -> Option<EntityUpdate> {
    // Names arrive as `["/plex"]`; older schemas send a bare string.
    let name = match c.get("names")? {
        Value::Array(names) => names.first()?.as_str()?,
        Value::String(name) => name.as_str(),
        _ => return None,
    }
    .trim_start_matches('/');
    if name.is_empty() {
        return None;
    }

    let state = text(c, "state").unwrap_or("").to_lowercase();
    let short_id: String = text(c, "id").unwrap_or("").chars().take(12).collect();

    let port_mappings: Vec<String> = c
        .get("ports")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|p| {
            let public = p.get("publicPort").and_then(Value::as_u64)?;
            let private = p.get("privatePort").and_then(Value::as_u64)?;
            let proto = p.get("type").and_then(Value::as_str).unwrap_or("tcp").to_lowercase();
            Some(format!("{public}:{private}/{proto}"))
        })
        .collect();

    Some(
        EntityUpdate::binary(
            EntityDescriptor::new(format!("Docker {name} State"))
                .device_class("running")
                .icon("mdi:docker"),
            state == "running",
            format!("docker_{name}_state"),
        )
        .attribute("container_id", short_id)
        .attribute("image", text(c, "image").unwrap_or(""))
        .attribute("status", text(c, "status").unwrap_or(""))
        .attribute("state", state)
        .attribute("auto_start", c.get("autoStart").and_then(Value::as_bool).unwrap_or(false))
        .attribute("port_mappings", port_mappings),
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::model::{BinaryState, EntityState, SensorKind};

    #[test]
    fn empty_payload_yields_nothing() {
        assert!(parse_containers(&json!({})).is_empty());
        assert!(parse_containers(&json!({"docker": {}})).is_empty());
    }

    #[test]
    fn containers_become_binary_sensors() {
        let raw = json!({"docker": {"containers": [
            {
                "id": "0123456789abcdef0123",
                "names": ["/plex"],
                "image": "plexinc/pms-docker",
                "state": "RUNNING",
                "status": "Up 3 days",
                "autoStart": true,
                "ports": [{"privatePort": 32400, "publicPort": 32400, "type": "TCP"}, {"privatePort": 1900}]
            },
            {"names": ["/db"], "state": "EXITED"},
            {"names": [], "state": "RUNNING"}
        ]}});
        let updates = parse_containers(&raw);
        assert_eq!(updates.len(), 2);

        let plex = &updates[0];
        assert_eq!(plex.kind, SensorKind::BinarySensor);
        assert_eq!(plex.unique_id_suffix, "docker_plex_state");
        assert_eq!(plex.state, EntityState::Binary(BinaryState::On));
        assert_eq!(plex.attributes["container_id"], json!("0123456789ab"));
        assert_eq!(plex.attributes["port_mappings"], json!(["32400:32400/tcp"]));

        assert_eq!(updates[1].state, EntityState::Binary(BinaryState::Off));
        assert_eq!(updates[1].attributes["state"], json!("exited"));
    }
}

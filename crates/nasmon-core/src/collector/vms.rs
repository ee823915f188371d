// VM collector: running state per VM from the structured query API, with
// vCPU and memory figures scraped from the legacy VM page when the host
// has web credentials. Scraping happens in `fetch()`; the specs travel to
// `parse()` under the `vm_specs` key of the raw payload.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use nasmon_api::QueryClient;

use super::{Collector, CollectorContext, run_query};
use crate::error::CoreError;
use crate::fields::text;
use crate::legacy::{FETCH_TIMEOUT, LegacyAccess};
use crate::model::{EntityDescriptor, EntityUpdate, StateClass};

pub const NAME: &str = "vms";

const QUERY: &str = r"
query {
  vms {
    id
    domains { id uuid name state }
  }
}";

const SPECS_PATH: &str = "/VMMachines.php";
const SPECS_KEY: &str = "vm_specs";

static ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<tr[^>]*class="[^"]*sortable[^"]*"[^>]*>(.*?)</tr>"#).expect("valid regex")
});
static NAME_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<span class="inner">\s*<a[^>]*>([^<]*)</a>"#).expect("valid regex")
});
static VCPU_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<a[^>]*class="[^"]*vcpu-[^"]*"[^>]*>([^<]*)</a>"#).expect("valid regex")
});
static CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<td[^>]*>(.*?)</td>").expect("valid regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

pub struct VmCollector {
    host: String,
    query: QueryClient,
    legacy: LegacyAccess,
    interval: Duration,
}

impl VmCollector {
    pub fn new(host: String, query: QueryClient, legacy: LegacyAccess, interval: Duration) -> Self {
        Self {
            host,
            query,
            legacy,
            interval,
        }
    }

    /// Best effort: any failure leaves the specs out, never the VMs.
    async fn fetch_specs(&self) -> Option<Map<String, Value>> {
        if !self.legacy.has_credentials() {
            debug!(host = %self.host, "no legacy credentials, VM specs skipped");
            return None;
        }
        match self.legacy.get(SPECS_PATH, &[], FETCH_TIMEOUT).await {
            Ok(resp) if resp.is_success() => Some(parse_vm_specs(resp.text())),
            Ok(resp) => {
                warn!(host = %self.host, status = %resp.status(), "could not fetch VM specs");
                None
            }
            Err(e) => {
                warn!(host = %self.host, error = %e, "could not fetch VM specs");
                None
            }
        }
    }
}

#[async_trait]
impl Collector for VmCollector {
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
        let mut raw = run_query(&self.query, &self.host, NAME, QUERY).await;
        if domains(&raw).next().is_none() {
            return Ok(raw);
        }
        if let (Some(specs), Some(obj)) = (self.fetch_specs().await, raw.as_object_mut()) {
            obj.insert(SPECS_KEY.into(), Value::Object(specs));
        }
        Ok(raw)
    }

    fn parse(&self, raw: &Value) -> Vec<EntityUpdate> {
        parse_vms(raw)
    }
}

pub(crate) fn build(ctx: &CollectorContext) -> Option<Box<dyn Collector>> {
    let query = ctx.query.clone()?;
    Some(Box::new(VmCollector::new(
        ctx.host.clone(),
        query,
        LegacyAccess::new(ctx.session.clone(), NAME),
        ctx.interval,
    )))
}

/// `vms.domains` is a list, or a single object on hosts with one VM.
fn domains(raw: &Value) -> impl Iterator<Item = &Map<String, Value>> {
    let domains = raw.pointer("/vms/domains");
    let list: Vec<&Value> = match domains {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(v @ Value::Object(_)) => vec![v],
        _ => Vec::new(),
    };
    list.into_iter().filter_map(Value::as_object)
}

fn parse_vms(raw: &Value) -> Vec<EntityUpdate> {
    let specs = raw.get(SPECS_KEY).and_then(Value::as_object);
    let mut updates = Vec::new();

    for vm in domains(raw) {
        let Some(name) = text(vm, "name") else {
            continue;
        };
        let state = text(vm, "state").unwrap_or("").to_lowercase();
        let spec = specs.and_then(|s| s.get(name));
        let vcpus = spec.and_then(|s| s.get("vcpus")).and_then(Value::as_u64).filter(|v| *v > 0);
        let memory_mb = spec
            .and_then(|s| s.get("memory_mb"))
            .and_then(Value::as_u64)
            .filter(|v| *v > 0);

        let mut status = EntityUpdate::binary(
            EntityDescriptor::new(format!("VM {name} State"))
                .device_class("running")
                .icon("mdi:monitor"),
            state.contains("running"),
            format!("vm_{name}_state"),
        )
        .attribute("uuid", text(vm, "uuid").unwrap_or(""))
        .attribute("state", state);
        if let Some(v) = vcpus {
            status = status.attribute("vcpus", v);
        }
        if let Some(m) = memory_mb {
            status = status.attribute("memory_mb", m);
        }
        updates.push(status);

        if let Some(v) = vcpus {
            updates.push(EntityUpdate::sensor(
                EntityDescriptor::new(format!("VM {name} vCPUs"))
                    .icon("mdi:chip")
                    .state_class(StateClass::Measurement),
                v,
                format!("vm_{name}_vcpus"),
            ));
        }
        if let Some(m) = memory_mb {
            updates.push(EntityUpdate::sensor(
                EntityDescriptor::new(format!("VM {name} Memory"))
                    .measurement("MB")
                    .icon("mdi:memory"),
                m,
                format!("vm_{name}_memory"),
            ));
        }
    }

    updates
}

/// Extract `{name: {vcpus, memory_mb}}` from the VM manager page.
///
/// Each VM is a `sortable` table row: the name sits in `span.inner > a`,
/// the vCPU count in an `a.vcpu-*` link, and memory in the fourth cell.
pub fn parse_vm_specs(html: &str) -> Map<String, Value> {
    let mut specs = Map::new();
    for row in ROW.captures_iter(html) {
        let row = &row[1];
        let Some(name) = NAME_LINK.captures(row).map(|c| c[1].trim().to_owned()) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        let vcpus = VCPU_LINK
            .captures(row)
            .and_then(|c| c[1].trim().parse::<u64>().ok())
            .unwrap_or(0);
        let memory_mb = CELL
            .captures_iter(row)
            .nth(3)
            .map(|c| {
                TAG.replace_all(&c[1], "")
                    .chars()
                    .filter(char::is_ascii_digit)
                    .collect::<String>()
            })
            .and_then(|digits| digits.parse::<u64>().ok())
            .unwrap_or(0);
        specs.insert(name, json!({"vcpus": vcpus, "memory_mb": memory_mb}));
    }
    specs
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::model::{BinaryState, EntityState};

    const PAGE: &str = r##"
<table>
<tr class="sortable" id="vm-1">
  <td><span class="inner"><a href="#">win11</a></span></td>
  <td>Windows 11</td>
  <td><a class="vcpu-abc" href="#">4</a></td>
  <td>8192 MB</td>
</tr>
<tr class="sortable">
  <td><span class="inner"><a href="#">HomeAssistant</a></span></td>
  <td></td>
  <td><a class="vcpu-def">2</a></td>
  <td><span>4096</span>M</td>
</tr>
<tr class="header"><td>ignored</td></tr>
</table>"##;

    #[test]
    fn specs_are_scraped_per_row() {
        let specs = parse_vm_specs(PAGE);
        assert_eq!(specs["win11"], json!({"vcpus": 4, "memory_mb": 8192}));
        assert_eq!(specs["HomeAssistant"], json!({"vcpus": 2, "memory_mb": 4096}));
        assert_eq!(specs.len(), 2);
    }

    #[test]
    fn empty_payload_yields_nothing() {
        assert!(parse_vms(&json!({})).is_empty());
    }

    #[test]
    fn vms_with_and_without_specs() {
        let raw = json!({
            "vms": {"domains": [
                {"name": "win11", "uuid": "u-1", "state": "RUNNING"},
                {"name": "nas-test", "state": "SHUTOFF"},
                {"state": "RUNNING"}
            ]},
            "vm_specs": {"win11": {"vcpus": 4, "memory_mb": 8192}}
        });
        let updates = parse_vms(&raw);
        let suffixes: Vec<&str> = updates.iter().map(|u| u.unique_id_suffix.as_str()).collect();
        assert_eq!(suffixes, ["vm_win11_state", "vm_win11_vcpus", "vm_win11_memory", "vm_nas-test_state"]);
        assert_eq!(updates[0].state, EntityState::Binary(BinaryState::On));
        assert_eq!(updates[0].attributes["vcpus"], json!(4));
        assert_eq!(updates[1].state, EntityState::Integer(4));
        assert_eq!(updates[3].state, EntityState::Binary(BinaryState::Off));
    }

    #[test]
    fn single_domain_object_is_accepted() {
        let raw = json!({"vms": {"domains": {"name": "solo", "state": "running"}}});
        assert_eq!(parse_vms(&raw).len(), 1);
    }
}

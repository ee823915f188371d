// System collector: uptime of the machine the monitor runs on, read from
// the kernel's uptime file.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{Collector, CollectorContext};
use crate::error::CoreError;
use crate::model::{EntityDescriptor, EntityUpdate, StateClass};

pub const NAME: &str = "system";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

const UPTIME_PATH: &str = "/proc/uptime";

pub struct SystemCollector {
    uptime_path: PathBuf,
    interval: Duration,
}

impl SystemCollector {
    pub fn new(interval: Duration) -> Self {
        Self::with_uptime_path(UPTIME_PATH, interval)
    }

    pub fn with_uptime_path(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            uptime_path: path.into(),
            interval,
        }
    }
}

#[async_trait]
impl Collector for SystemCollector {
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
        let contents = tokio::fs::read_to_string(&self.uptime_path)
            .await
            .map_err(|e| CoreError::Internal(format!("reading {}: {e}", self.uptime_path.display())))?;
        let seconds = parse_uptime(&contents).ok_or_else(|| CoreError::MalformedResponse {
            message: format!("unexpected uptime format: {:?}", contents.trim()),
        })?;
        Ok(json!({ "uptime_seconds": seconds }))
    }

    fn parse(&self, raw: &Value) -> Vec<EntityUpdate> {
        let Some(seconds) = raw.get("uptime_seconds").and_then(Value::as_u64).filter(|s| *s > 0) else {
            return Vec::new();
        };
        vec![
            EntityUpdate::sensor(
                EntityDescriptor::new("System Uptime")
                    .unit("s")
                    .icon("mdi:clock-outline")
                    .state_class(StateClass::Measurement),
                seconds,
                "system_uptime",
            )
            .attribute("formatted", format_uptime(seconds))
            .retained(),
        ]
    }
}

pub(crate) fn build(ctx: &CollectorContext) -> Option<Box<dyn Collector>> {
    Some(Box::new(SystemCollector::new(ctx.interval)))
}

/// Whole seconds from the first field of `/proc/uptime` (`"12345.67 54321.00"`).
fn parse_uptime(contents: &str) -> Option<u64> {
    let secs: f64 = contents.split_whitespace().next()?.parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs).ok().map(|d| d.as_secs())
}

fn format_uptime(total: u64) -> String {
    let (days, rem) = (total / 86_400, total % 86_400);
    let (hours, rem) = (rem / 3_600, rem % 3_600);
    let (minutes, seconds) = (rem / 60, rem % 60);
    format!("{days}d {hours}h {minutes}m {seconds}s")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::model::EntityState;

    #[test]
    fn uptime_is_formatted() {
        assert_eq!(format_uptime(93_784), "1d 2h 3m 4s");
        assert_eq!(parse_uptime("93784.91 180000.00\n"), Some(93_784));
        assert_eq!(parse_uptime("garbage"), None);
    }

    #[test]
    fn parse_emits_retained_uptime() {
        let collector = SystemCollector::new(DEFAULT_INTERVAL);
        let updates = collector.parse(&json!({"uptime_seconds": 93_784}));
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].state, EntityState::Integer(93_784));
        assert_eq!(updates[0].attributes["formatted"], json!("1d 2h 3m 4s"));
        assert!(updates[0].retain);
        assert!(collector.parse(&json!({})).is_empty());
    }

    #[tokio::test]
    async fn fetch_reads_uptime_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uptime");
        std::fs::write(&path, "3600.50 7200.00\n").unwrap();

        let collector = SystemCollector::with_uptime_path(&path, DEFAULT_INTERVAL);
        let raw = collector.fetch().await.unwrap();
        assert_eq!(raw, json!({"uptime_seconds": 3600}));
    }

    #[tokio::test]
    async fn missing_uptime_file_is_an_error() {
        let collector = SystemCollector::with_uptime_path("/nonexistent/uptime", DEFAULT_INTERVAL);
        assert!(collector.fetch().await.is_err());
    }
}

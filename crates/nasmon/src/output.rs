//! Entity rendering: JSON lines on stdout, or one log line per entity.
//!
//! Each update becomes a discovery-style record carrying everything a
//! broker bridge needs: the component, the unique ID, the topics, the
//! entity config and the state itself.

use std::io::{self, Write};
use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use nasmon_config::OutputFormat;
use nasmon_core::{EntityDescriptor, EntityState, EntityUpdate, PublishBatch, SensorKind, SourceIdentity};

use crate::error::CliError;

// ── Records ──────────────────────────────────────────────────────────

/// Entity config as a discovery consumer expects it.
#[derive(Debug, Serialize)]
pub struct EntityConfig {
    #[serde(flatten)]
    pub descriptor: EntityDescriptor,
    pub unique_id: String,
    pub state_topic: String,
    pub json_attributes_topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_on: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_off: Option<&'static str>,
}

/// One rendered entity.
#[derive(Debug, Serialize)]
pub struct EntityRecord {
    pub component: SensorKind,
    pub unique_id: String,
    pub state_topic: String,
    pub config: EntityConfig,
    pub state: EntityState,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
    pub retain: bool,
    pub host: String,
    pub collector: String,
    pub collected_at: String,
}

/// `{base_topic}/{component}/{unique_id}`
fn topic_root(base_topic: &str, component: SensorKind, unique_id: &str) -> String {
    format!("{}/{component}/{unique_id}", base_topic.trim_end_matches('/'))
}

pub fn render_record(
    base_topic: &str,
    source: &SourceIdentity,
    update: &EntityUpdate,
    collected_at: SystemTime,
) -> EntityRecord {
    let unique_id = source.unique_id(&update.unique_id_suffix);
    let root = topic_root(base_topic, update.kind, &unique_id);
    let state_topic = format!("{root}/state");
    let binary = update.kind == SensorKind::BinarySensor;

    EntityRecord {
        component: update.kind,
        config: EntityConfig {
            descriptor: update.descriptor.clone(),
            unique_id: unique_id.clone(),
            state_topic: state_topic.clone(),
            json_attributes_topic: format!("{root}/attributes"),
            expire_after: update.expire_after,
            payload_on: binary.then_some("ON"),
            payload_off: binary.then_some("OFF"),
        },
        unique_id,
        state_topic,
        state: update.state.clone(),
        attributes: update.attributes.clone(),
        retain: update.retain,
        host: source.host.clone(),
        collector: source.collector.clone(),
        collected_at: DateTime::<Utc>::from(collected_at).to_rfc3339_opts(SecondsFormat::Secs, true),
    }
}

// ── Sink ─────────────────────────────────────────────────────────────

/// Where rendered batches go. Only the writer task owns one, so records
/// from concurrent collectors never interleave.
pub struct Sink {
    format: OutputFormat,
    base_topic: String,
}

impl Sink {
    pub fn new(format: OutputFormat, base_topic: impl Into<String>) -> Self {
        Self {
            format,
            base_topic: base_topic.into(),
        }
    }

    pub fn write_batch(&self, batch: &PublishBatch) -> Result<(), CliError> {
        self.write_updates(&batch.source, &batch.updates, batch.collected_at)
    }

    pub fn write_updates(
        &self,
        source: &SourceIdentity,
        updates: &[EntityUpdate],
        collected_at: SystemTime,
    ) -> Result<(), CliError> {
        match self.format {
            OutputFormat::Json => {
                let mut out = io::stdout().lock();
                for update in updates {
                    let record = render_record(&self.base_topic, source, update, collected_at);
                    serde_json::to_writer(&mut out, &record)?;
                    out.write_all(b"\n")?;
                }
                out.flush()?;
            }
            OutputFormat::Log => {
                for update in updates {
                    info!(
                        target: "nasmon::entity",
                        unique_id = %source.unique_id(&update.unique_id_suffix),
                        name = %update.descriptor.name,
                        state = %update.state,
                        unit = update.descriptor.unit_of_measurement.as_deref().unwrap_or(""),
                        retain = update.retain,
                        "entity"
                    );
                }
            }
        }
        Ok(())
    }
}

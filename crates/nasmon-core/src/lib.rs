//! Collector framework between `nasmon-api` and the `nasmon` binary.
//!
//! - **[`Collector`]**: the unit of polymorphism. `fetch()` does the I/O,
//!   `parse()` turns the raw payload into [`EntityUpdate`]s without any.
//!   The concrete collectors live in [`collector`] and are listed in a
//!   static [`registry`](collector::registry).
//!
//! - **[`EndpointBinding`]**: tries a collector's candidate companion
//!   script paths once and remembers the first that answers.
//!
//! - **[`Runner`]**: one task per (host, collector), each on its own
//!   interval, isolated from the others' failures.
//!
//! - **[`Publisher`]**: the hand-off point for each tick's updates.

pub mod collector;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod fields;
pub mod host;
pub mod legacy;
pub mod model;
pub mod publish;
pub mod runner;

// ── Primary re-exports ──────────────────────────────────────────────
pub use collector::{Collector, CollectorContext, CollectorInfo};
pub use config::{HostConfig, TlsVerification};
pub use endpoint::{BindingState, EndpointBinding};
pub use error::CoreError;
pub use host::HostContext;
pub use legacy::LegacyAccess;
pub use model::{
    BinaryState, EntityDescriptor, EntityState, EntityUpdate, SensorKind, SourceIdentity,
    StateClass,
};
pub use publish::{ChannelPublisher, PublishBatch, Publisher};
pub use runner::{Runner, TickOutcome, run_tick};

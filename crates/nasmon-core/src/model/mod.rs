pub mod entity;
pub mod identity;

pub use entity::{
    BinaryState, EntityDescriptor, EntityState, EntityUpdate, SensorKind, StateClass, expiry,
};
pub use identity::{SourceIdentity, slugify};

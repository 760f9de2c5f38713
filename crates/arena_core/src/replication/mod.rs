//! Entity replication: the authoritative entity table, per-entity state and
//! dirty-tracked properties.

mod cache;
mod entity;
mod property;

pub use cache::EntityCache;
pub use entity::Entity;
pub use property::{read_properties, write_property_count, Property, State};

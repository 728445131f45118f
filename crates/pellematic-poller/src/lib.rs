//! Pellematic Poller - Live data for discovered entities
//!
//! This crate provides:
//! - A poll gate serializing device requests behind a minimum interval
//! - The shared snapshot store entities read their values from
//! - A background poller that re-runs discovery and broadcasts events

pub mod entity;
pub mod gate;
pub mod poller;
pub mod store;

#[cfg(test)]
mod testing;

pub use entity::{resolve_climate, resolve_state, ClimateState, EntityState, LiveEntity};
pub use gate::{PollGate, SnapshotSource, DEFAULT_MIN_INTERVAL};
pub use poller::{PollError, PollEvent, Poller, PollerConfig};
pub use store::SnapshotStore;

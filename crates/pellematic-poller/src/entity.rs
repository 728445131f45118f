//! Live entities: a definition plus a handle to the shared store

use pellematic_client::DeviceSnapshot;
use pellematic_core::climate::ClimateDefinition;
use pellematic_core::component::component_prefix;
use pellematic_core::{
    decode, decode_binary, decode_option, DecodeContext, DeviceClass, DisplayValue,
    EntityDefinition, EntityKind,
};
use serde::Serialize;
use std::sync::Arc;

use crate::store::SnapshotStore;

/// Current state of one entity
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EntityState {
    Value(DisplayValue),
    On(bool),
    Option(String),
    /// Serialized as `null`
    Unavailable,
}

impl EntityState {
    pub fn is_available(&self) -> bool {
        !matches!(self, Self::Unavailable)
    }
}

/// Resolve an entity's state from a snapshot
pub fn resolve_state(definition: &EntityDefinition, snapshot: &DeviceSnapshot) -> EntityState {
    let Some(field) = snapshot.field(&definition.component, &definition.field) else {
        return EntityState::Unavailable;
    };

    let state = match definition.kind {
        EntityKind::Sensor | EntityKind::Number => {
            decode(&definition.decode_context(), &field).map(EntityState::Value)
        }
        EntityKind::BinarySensor => decode_binary(&field).map(EntityState::On),
        EntityKind::Select => decode_option(definition, &field).map(EntityState::Option),
    };
    state.unwrap_or(EntityState::Unavailable)
}

/// Current state of a climate grouping
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClimateState {
    pub current_temperature: Option<DisplayValue>,
    pub target_temperature: Option<DisplayValue>,
    /// Raw mode key (e.g. `1` for auto)
    pub mode: Option<String>,
}

pub fn resolve_climate(definition: &ClimateDefinition, snapshot: &DeviceSnapshot) -> ClimateState {
    let temperature = |field: &str| {
        let ctx = DecodeContext {
            device_class: Some(DeviceClass::Temperature),
            unit: definition.unit.as_deref(),
            prefix: component_prefix(&definition.component),
            field,
        };
        decode(&ctx, &snapshot.field(&definition.component, field)?)
    };

    let mode = definition.mode_field.as_deref().and_then(|field| {
        snapshot
            .node(&definition.component, field)
            .and_then(|node| match node {
                serde_json::Value::Object(map) => map.get("val"),
                other => Some(other),
            })
            .map(|val| match val {
                serde_json::Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
    });

    ClimateState {
        current_temperature: temperature(&definition.current_field),
        target_temperature: temperature(&definition.target_field),
        mode,
    }
}

/// An entity as exposed to consumers: identity plus live value lookup
#[derive(Clone)]
pub struct LiveEntity {
    pub definition: Arc<EntityDefinition>,
    store: Arc<SnapshotStore>,
}

impl LiveEntity {
    pub fn new(definition: Arc<EntityDefinition>, store: Arc<SnapshotStore>) -> Self {
        Self { definition, store }
    }

    pub fn unique_id(&self) -> &str {
        &self.definition.unique_id
    }

    /// State from the latest snapshot; unavailable before the first poll
    pub async fn state(&self) -> EntityState {
        match self.store.current().await {
            Some(snapshot) => resolve_state(&self.definition, &snapshot),
            None => EntityState::Unavailable,
        }
    }
}

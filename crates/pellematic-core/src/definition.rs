//! Entity definitions: the output unit of discovery

use serde::{Deserialize, Serialize};

use crate::classify::EntityKind;
use crate::component::{component_prefix, ComponentKey, Language};
use crate::decode::DecodeContext;
use crate::field::RawField;
use crate::semantics::{DeviceClass, Semantics, StateClass};

/// Identity of a field, unique within one response
pub fn unique_id(component: &str, field: &str) -> String {
    format!("{}_{}", component, field)
}

/// Everything a thin wrapper needs to register and render one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub kind: EntityKind,
    /// Component key as it appears in the response (e.g. `hk1`)
    pub component: String,
    /// Field key inside the component (e.g. `L_roomtemp_act`)
    pub field: String,
    pub name: String,
    pub unique_id: String,
    pub unit: Option<String>,
    pub device_class: Option<DeviceClass>,
    pub state_class: Option<StateClass>,
    pub icon: String,
    /// Explicit scale factor; without one the unit fallback table applies
    pub factor: Option<f64>,
    /// Bounds in raw device units
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub format: Option<String>,
    /// Numbers only
    pub step: Option<f64>,
    /// Selects only: option labels, in format order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    /// Selects only: raw device keys, parallel to `options`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub option_keys: Vec<String>,
}

impl EntityDefinition {
    /// Assemble a definition from a classified field and its semantics
    pub fn build(
        component: &ComponentKey,
        field_key: &str,
        field: &RawField,
        kind: EntityKind,
        semantics: Semantics,
        language: Language,
    ) -> Self {
        let (options, option_keys): (Vec<String>, Vec<String>) = match kind {
            EntityKind::Select => field
                .options()
                .iter()
                .map(|option| (option.slug(), option.key.clone()))
                .unzip(),
            _ => (Vec::new(), Vec::new()),
        };

        Self {
            kind,
            component: component.key.clone(),
            field: field_key.to_string(),
            name: display_name(component, field_key, field, language),
            unique_id: unique_id(&component.key, field_key),
            unit: semantics.unit,
            device_class: semantics.device_class,
            state_class: semantics.state_class,
            icon: semantics.icon.to_string(),
            factor: field.factor,
            min: field.min,
            max: field.max,
            format: field.format.clone(),
            step: semantics.step,
            options,
            option_keys,
        }
    }

    /// Domain prefix of the owning component
    pub fn prefix(&self) -> &str {
        component_prefix(&self.component)
    }

    /// Inputs the value decoder needs for this entity
    pub fn decode_context(&self) -> DecodeContext<'_> {
        DecodeContext {
            device_class: self.device_class,
            unit: self.unit.as_deref(),
            prefix: self.prefix(),
            field: &self.field,
        }
    }
}

/// Field text (or key), prefixed by the component's label unless it is `system`
fn display_name(
    component: &ComponentKey,
    field_key: &str,
    field: &RawField,
    language: Language,
) -> String {
    let own = field.text.as_deref().unwrap_or(field_key);
    match component.display_name(language) {
        Some(prefix) => format!("{} {}", prefix, own),
        None => own.to_string(),
    }
}

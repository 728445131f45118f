//! Climate grouping of heating circuits

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::classify::{classify, EntityKind};
use crate::component::{ComponentKey, Language};
use crate::field::RawField;
use crate::semantics::{normalize_unit, step};

pub const CLIMATE_PREFIX: &str = "hk";
pub const CURRENT_TEMPERATURE_FIELD: &str = "L_roomtemp_act";
pub const TARGET_TEMPERATURE_FIELD: &str = "temp_heat";
pub const MODE_FIELD: &str = "mode_auto";

/// A heating circuit presented as one thermostat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateDefinition {
    pub component: String,
    pub name: String,
    pub unique_id: String,
    pub current_field: String,
    pub target_field: String,
    /// Select field carrying the circuit's operating mode, if present
    pub mode_field: Option<String>,
    pub unit: Option<String>,
    /// Target bounds in raw device units
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: f64,
    pub factor: Option<f64>,
}

impl ClimateDefinition {
    /// Derive a climate grouping from one component's fields
    pub fn from_component(
        component: &ComponentKey,
        fields: &Map<String, Value>,
        language: Language,
    ) -> Option<Self> {
        if component.prefix != CLIMATE_PREFIX {
            return None;
        }

        let current = fields.get(CURRENT_TEMPERATURE_FIELD)?;
        RawField::from_value(current).ok()?;

        let target = RawField::from_value(fields.get(TARGET_TEMPERATURE_FIELD)?).ok()?;
        if classify(TARGET_TEMPERATURE_FIELD, &target) != Some(EntityKind::Number) {
            return None;
        }

        let mode_field = fields
            .get(MODE_FIELD)
            .and_then(|node| RawField::from_value(node).ok())
            .filter(|field| classify(MODE_FIELD, field) == Some(EntityKind::Select))
            .map(|_| MODE_FIELD.to_string());

        let unit = normalize_unit(target.unit.as_deref()).or_else(|| Some("°C".to_string()));
        let name = component
            .display_name(language)
            .unwrap_or_else(|| component.key.clone());

        Some(Self {
            component: component.key.clone(),
            name,
            unique_id: format!("{}_climate", component.key),
            current_field: CURRENT_TEMPERATURE_FIELD.to_string(),
            target_field: TARGET_TEMPERATURE_FIELD.to_string(),
            mode_field,
            step: step(unit.as_deref(), &target),
            unit,
            min: target.min,
            max: target.max,
            factor: target.factor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(node: Value) -> Map<String, Value> {
        node.as_object().cloned().unwrap()
    }

    fn climate(component: &str, fields: &Map<String, Value>) -> Option<ClimateDefinition> {
        ClimateDefinition::from_component(&ComponentKey::parse(component), fields, Language::En)
    }

    #[test]
    fn test_heating_circuit_with_mode() {
        let hk = fields(json!({
            "L_roomtemp_act": {"val": 215, "unit": "°C", "factor": 0.1},
            "temp_heat": {"val": 210, "unit": "°C", "factor": 0.1, "min": 100, "max": 300},
            "mode_auto": {"val": 1, "format": "0:Off|1:Auto|2:Heat|3:Setback"}
        }));
        let climate = climate("hk1", &hk).unwrap();

        assert_eq!(climate.unique_id, "hk1_climate");
        assert_eq!(climate.name, "Heating circuit 1");
        assert_eq!(climate.mode_field.as_deref(), Some("mode_auto"));
        assert_eq!(climate.min, Some(100.0));
        assert_eq!(climate.max, Some(300.0));
        assert_eq!(climate.step, 0.1);
        assert_eq!(climate.factor, Some(0.1));
        assert_eq!(climate.unit.as_deref(), Some("°C"));
    }

    #[test]
    fn test_missing_fields_yield_nothing() {
        let no_room = fields(json!({
            "temp_heat": {"val": 210, "min": 100, "max": 300}
        }));
        assert!(climate("hk2", &no_room).is_none());

        let unbounded = fields(json!({
            "L_roomtemp_act": 215,
            "temp_heat": {"val": 210}
        }));
        assert!(climate("hk2", &unbounded).is_none());
    }

    #[test]
    fn test_other_prefix_ignored() {
        let ww = fields(json!({
            "L_roomtemp_act": 215,
            "temp_heat": {"val": 210, "min": 100, "max": 300}
        }));
        assert!(climate("ww1", &ww).is_none());
    }
}

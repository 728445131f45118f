//! Discovery: a status response in, an immutable set of entity definitions out

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

use crate::classify::{classify, EntityKind};
use crate::climate::ClimateDefinition;
use crate::component::{ComponentKey, Language};
use crate::definition::EntityDefinition;
use crate::field::RawField;
use crate::semantics::infer;

/// Top-level keys that are never components
pub const RESERVED_KEYS: &[&str] = &["error"];
/// Fields ending in this suffix are metadata, not values
pub const METADATA_SUFFIX: &str = "_info";

/// Result of one discovery pass, in response order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiscoveryResult {
    pub sensors: Vec<EntityDefinition>,
    pub binary_sensors: Vec<EntityDefinition>,
    pub selects: Vec<EntityDefinition>,
    pub numbers: Vec<EntityDefinition>,
    pub climates: Vec<ClimateDefinition>,
}

impl DiscoveryResult {
    /// Number of entity definitions, climates excluded
    pub fn len(&self) -> usize {
        self.sensors.len() + self.binary_sensors.len() + self.selects.len() + self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entity definitions, grouped by kind
    pub fn iter(&self) -> impl Iterator<Item = &EntityDefinition> {
        self.sensors
            .iter()
            .chain(&self.binary_sensors)
            .chain(&self.selects)
            .chain(&self.numbers)
    }

    pub fn get(&self, unique_id: &str) -> Option<&EntityDefinition> {
        self.iter().find(|def| def.unique_id == unique_id)
    }

    pub fn by_kind(&self, kind: EntityKind) -> &[EntityDefinition] {
        match kind {
            EntityKind::Sensor => &self.sensors,
            EntityKind::BinarySensor => &self.binary_sensors,
            EntityKind::Select => &self.selects,
            EntityKind::Number => &self.numbers,
        }
    }

    fn push(&mut self, definition: EntityDefinition) {
        match definition.kind {
            EntityKind::Sensor => self.sensors.push(definition),
            EntityKind::BinarySensor => self.binary_sensors.push(definition),
            EntityKind::Select => self.selects.push(definition),
            EntityKind::Number => self.numbers.push(definition),
        }
    }
}

fn is_component_key(key: &str) -> bool {
    !RESERVED_KEYS.contains(&key)
}

/// Components of a response: object-valued, non-reserved top-level keys
fn components(
    response: &Map<String, Value>,
) -> impl Iterator<Item = (&String, &Map<String, Value>)> {
    response.iter().filter_map(|(key, node)| {
        if !is_component_key(key) {
            return None;
        }
        match node {
            Value::Object(fields) => Some((key, fields)),
            _ => {
                debug!(component = %key, "Skipping non-object component");
                None
            }
        }
    })
}

/// Run discovery over a parsed status response
pub fn discover(response: &Map<String, Value>, language: Language) -> DiscoveryResult {
    let mut result = DiscoveryResult::default();
    let mut seen = HashSet::new();
    let mut skipped = 0usize;

    for (key, fields) in components(response) {
        let component = ComponentKey::parse(key);

        for (field_key, node) in fields {
            if field_key.ends_with(METADATA_SUFFIX) {
                continue;
            }

            let field = match RawField::from_value(node) {
                Ok(field) => field,
                Err(e) => {
                    debug!(component = %component, field = %field_key, "Skipping field: {}", e);
                    skipped += 1;
                    continue;
                }
            };

            let Some(kind) = classify(field_key, &field) else {
                debug!(component = %component, field = %field_key, "Field is not an entity");
                continue;
            };

            let semantics = infer(kind, field_key, &field);
            let definition =
                EntityDefinition::build(&component, field_key, &field, kind, semantics, language);

            if !seen.insert(definition.unique_id.clone()) {
                debug!(id = %definition.unique_id, "Skipping duplicate identity");
                continue;
            }
            result.push(definition);
        }

        if let Some(climate) = ClimateDefinition::from_component(&component, fields, language) {
            result.climates.push(climate);
        }
    }

    info!(
        sensors = result.sensors.len(),
        binary_sensors = result.binary_sensors.len(),
        selects = result.selects.len(),
        numbers = result.numbers.len(),
        climates = result.climates.len(),
        skipped,
        "Discovery complete"
    );
    result
}

/// Component instances per domain prefix
pub fn count_instances(response: &Map<String, Value>) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for (key, _) in components(response) {
        let component = ComponentKey::parse(key);
        *counts.entry(component.prefix).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(node: Value) -> Map<String, Value> {
        node.as_object().cloned().unwrap()
    }

    fn sample() -> Map<String, Value> {
        response(json!({
            "system": {
                "L_ambient": {"val": -35, "unit": "°C", "factor": 0.1},
                "L_usb_stick": {"val": "false", "format": "false:Aus|true:Ein"}
            },
            "hk1": {
                "L_roomtemp_act": {"val": 215, "unit": "°C", "factor": 0.1, "text": "Raum Ist"},
                "L_pump": {"val": 1, "format": "0:Aus|1:Ein"},
                "mode_auto": {"val": 1, "format": "0:Aus|1:Auto|2:Heizen|3:Absenken"},
                "temp_heat": {"val": 210, "unit": "°C", "factor": 0.1, "min": 100, "max": 300},
                "oekomode": {"val": 2},
                "name_info": {"val": "Erdgeschoss"}
            },
            "error": {"L_error": {"val": 0}},
            "pe1": "offline"
        }))
    }

    #[test]
    fn test_scenario_kinds() {
        let result = discover(&sample(), Language::En);

        let sensors: Vec<&str> = result.sensors.iter().map(|d| d.unique_id.as_str()).collect();
        assert_eq!(sensors, ["system_L_ambient", "hk1_L_roomtemp_act"]);

        let binary: Vec<&str> = result
            .binary_sensors
            .iter()
            .map(|d| d.unique_id.as_str())
            .collect();
        assert_eq!(binary, ["system_L_usb_stick", "hk1_L_pump"]);

        assert_eq!(result.selects.len(), 1);
        assert_eq!(result.selects[0].options, ["0_aus", "1_auto", "2_heizen", "3_absenken"]);

        assert_eq!(result.numbers.len(), 1);
        assert_eq!(result.numbers[0].unique_id, "hk1_temp_heat");

        assert_eq!(result.climates.len(), 1);
        assert_eq!(result.climates[0].unique_id, "hk1_climate");
        assert_eq!(result.len(), 6);
    }

    #[test]
    fn test_reserved_and_metadata_skipped() {
        let result = discover(&sample(), Language::En);
        assert!(result.iter().all(|d| d.component != "error"));
        assert!(result.get("hk1_name_info").is_none());
        assert!(result.get("hk1_oekomode").is_none());
    }

    #[test]
    fn test_idempotent() {
        let response = sample();
        let first = discover(&response, Language::En);
        let second = discover(&response, Language::En);
        assert_eq!(first, second);
    }

    #[test]
    fn test_identities_unique() {
        let result = discover(&sample(), Language::De);
        let mut ids = HashSet::new();
        assert!(result.iter().all(|d| ids.insert(d.unique_id.clone())));
    }

    #[test]
    fn test_partial_fields_do_not_abort() {
        let result = discover(
            &response(json!({
                "hk1": {
                    "L_flowtemp_act": {"unit": "°C"},
                    "L_flowtemp_set": {"val": 400, "factor": "bogus"},
                    "L_list": [1, 2],
                    "L_roomtemp_act": {"val": 215, "unit": "°C", "factor": 0.1}
                }
            })),
            Language::En,
        );
        assert_eq!(result.len(), 1);
        assert_eq!(result.sensors[0].field, "L_roomtemp_act");
    }

    #[test]
    fn test_empty_response() {
        let result = discover(&Map::new(), Language::En);
        assert!(result.is_empty());
        assert!(result.climates.is_empty());
    }

    #[test]
    fn test_german_names() {
        let result = discover(&sample(), Language::De);
        let def = result.get("hk1_L_roomtemp_act").unwrap();
        assert_eq!(def.name, "Heizkreis 1 Raum Ist");
    }

    #[test]
    fn test_count_instances() {
        let counts = count_instances(&response(json!({
            "system": {}, "hk1": {}, "hk2": {}, "ww1": {}, "error": {}, "pe1": 0
        })));
        assert_eq!(counts.get("hk"), Some(&2));
        assert_eq!(counts.get("ww"), Some(&1));
        assert_eq!(counts.get("system"), Some(&1));
        assert_eq!(counts.get("error"), None);
        assert_eq!(counts.get("pe"), None);
    }
}

//! Unit, device class, state class, icon and step inference
//!
//! Explicit metadata wins where the controller provides it (unit, step);
//! everything else falls back to substring heuristics over the field's
//! descriptive text and key. The empirical exceptions are kept in the
//! named tables at the top of this module.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::classify::EntityKind;
use crate::field::RawField;

/// Raw unit tokens and their canonical unit
const UNIT_ALIASES: &[(&[&str], &str)] = &[
    (&["°C", "C", "Â°C", "° C"], "°C"),
    (&["K"], "K"),
    (&["%"], "%"),
    (&["W"], "W"),
    (&["kW"], "kW"),
    (&["Wh"], "Wh"),
    (&["kWh"], "kWh"),
    (&["kg"], "kg"),
    (&["t"], "t"),
    (&["h", "std", "Std"], "h"),
    (&["min"], "min"),
    (&["s", "sec"], "s"),
    (&["bar"], "bar"),
    (&["mbar"], "mbar"),
    (&["Pa"], "Pa"),
    (&["hPa"], "hPa"),
    (&["V"], "V"),
    (&["A"], "A"),
    (&["Hz"], "Hz"),
    (&["rps", "U/s"], "rps"),
    (&["l/h", "L/h"], "L/h"),
    (&["l/min", "L/min"], "L/min"),
    (&["m3/h", "m³/h"], "m³/h"),
];

/// Canonical unit to sensor device class
const UNIT_DEVICE_CLASSES: &[(&str, DeviceClass)] = &[
    ("°C", DeviceClass::Temperature),
    ("K", DeviceClass::Temperature),
    ("kWh", DeviceClass::Energy),
    ("Wh", DeviceClass::Energy),
    ("W", DeviceClass::Power),
    ("kW", DeviceClass::Power),
    ("kg", DeviceClass::Weight),
    ("t", DeviceClass::Weight),
    ("h", DeviceClass::Duration),
    ("min", DeviceClass::Duration),
    ("s", DeviceClass::Duration),
    ("bar", DeviceClass::Pressure),
    ("mbar", DeviceClass::Pressure),
    ("Pa", DeviceClass::Pressure),
    ("hPa", DeviceClass::Pressure),
    ("V", DeviceClass::Voltage),
    ("A", DeviceClass::Current),
    ("Hz", DeviceClass::Frequency),
    ("rps", DeviceClass::Frequency),
    ("L/h", DeviceClass::VolumeFlowRate),
    ("L/min", DeviceClass::VolumeFlowRate),
    ("m³/h", DeviceClass::VolumeFlowRate),
    ("%", DeviceClass::PowerFactor),
];

const HUMIDITY_WORDS: &[&str] = &["humid", "feucht"];
const TEMPERATURE_WORDS: &[&str] = &["temp"];
const ERROR_WORDS: &[&str] = &["error", "fehler", "stoer", "störung"];

const PROBLEM_WORDS: &[&str] = &[
    "error", "fault", "stoer", "störung", "emergency", "notaus", "alarm",
];
const CONNECTIVITY_WORDS: &[&str] = &["usb"];
const RUNNING_WORDS: &[&str] = &[
    "pump", "burner", "brenner", "motor", "fan", "geblaese", "gebläse",
];

const COUNTER_WORDS: &[&str] = &["total", "starts", "runtime", "counter", "gesamt", "laufzeit"];

/// Keys reported as instantaneous although their names look like counters
/// (modes, states and efficiency ratios).
pub const FORCED_MEASUREMENT_KEYS: &[&str] = &[
    "L_state",
    "L_mode",
    "L_cop",
    "L_jaz_all",
    "L_jaz_heat",
    "L_jaz_cool",
    "L_az_all",
    "L_total_efficiency",
];

/// Ordered icon rules over text and key
const ICON_RULES: &[(&[&str], &str)] = &[
    (&["temp"], "mdi:thermometer"),
    (&["error", "fehler", "stoer", "störung"], "mdi:alert"),
    (&["pump"], "mdi:pump"),
    (&["solar"], "mdi:solar-power"),
    (&["water", "wasser"], "mdi:water"),
    (&["flame", "flamme", "burner", "brenner"], "mdi:fire"),
    (&["usb"], "mdi:usb"),
    (&["mode", "modus"], "mdi:cog"),
];

pub const DEFAULT_ICON: &str = "mdi:gauge";

const TEMPERATURE_STEP: f64 = 0.1;
const DEFAULT_STEP: f64 = 1.0;

/// Semantic class of an entity's value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Temperature,
    Energy,
    Power,
    Weight,
    Duration,
    Pressure,
    Voltage,
    Current,
    Frequency,
    VolumeFlowRate,
    PowerFactor,
    Humidity,
    Enum,
    // Binary sensor classes
    Running,
    Problem,
    Connectivity,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Energy => "energy",
            Self::Power => "power",
            Self::Weight => "weight",
            Self::Duration => "duration",
            Self::Pressure => "pressure",
            Self::Voltage => "voltage",
            Self::Current => "current",
            Self::Frequency => "frequency",
            Self::VolumeFlowRate => "volume_flow_rate",
            Self::PowerFactor => "power_factor",
            Self::Humidity => "humidity",
            Self::Enum => "enum",
            Self::Running => "running",
            Self::Problem => "problem",
            Self::Connectivity => "connectivity",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    Measurement,
    TotalIncreasing,
}

/// Everything inferred about one field
#[derive(Debug, Clone, PartialEq)]
pub struct Semantics {
    pub unit: Option<String>,
    pub device_class: Option<DeviceClass>,
    pub state_class: Option<StateClass>,
    pub icon: &'static str,
    pub step: Option<f64>,
}

/// Map a raw unit token to its canonical unit; unknown tokens pass through
pub fn normalize_unit(raw: Option<&str>) -> Option<String> {
    let token = raw.map(str::trim).filter(|t| !t.is_empty())?;
    let canonical = UNIT_ALIASES
        .iter()
        .find(|(aliases, _)| aliases.contains(&token))
        .map(|(_, unit)| *unit)
        .unwrap_or(token);
    Some(canonical.to_string())
}

fn contains_any(haystack: &str, words: &[&str]) -> bool {
    words.iter().any(|w| haystack.contains(w))
}

/// Lowercased text and key, the input of every substring heuristic
fn haystack(key: &str, field: &RawField) -> String {
    match &field.text {
        Some(text) => format!("{} {}", text, key).to_lowercase(),
        None => key.to_lowercase(),
    }
}

/// Device class for sensors and numbers: unit first, then text/key
pub fn sensor_device_class(unit: Option<&str>, haystack: &str) -> Option<DeviceClass> {
    if let Some(unit) = unit {
        let by_unit = UNIT_DEVICE_CLASSES
            .iter()
            .find(|(u, _)| *u == unit)
            .map(|(_, class)| *class);
        match by_unit {
            Some(DeviceClass::PowerFactor) if contains_any(haystack, HUMIDITY_WORDS) => {
                return Some(DeviceClass::Humidity)
            }
            Some(class) => return Some(class),
            None => {}
        }
    }

    if contains_any(haystack, TEMPERATURE_WORDS) {
        Some(DeviceClass::Temperature)
    } else if contains_any(haystack, ERROR_WORDS) {
        Some(DeviceClass::Enum)
    } else {
        None
    }
}

/// Device class for binary sensors; problem beats connectivity beats running
pub fn binary_device_class(haystack: &str) -> Option<DeviceClass> {
    if contains_any(haystack, PROBLEM_WORDS) {
        Some(DeviceClass::Problem)
    } else if contains_any(haystack, CONNECTIVITY_WORDS) {
        Some(DeviceClass::Connectivity)
    } else if contains_any(haystack, RUNNING_WORDS) {
        Some(DeviceClass::Running)
    } else {
        None
    }
}

/// State class for sensors
pub fn state_class(
    key: &str,
    haystack: &str,
    unit: Option<&str>,
    device_class: Option<DeviceClass>,
    field: &RawField,
) -> Option<StateClass> {
    if FORCED_MEASUREMENT_KEYS.contains(&key) {
        return Some(StateClass::Measurement);
    }
    match device_class {
        Some(DeviceClass::Energy) => return Some(StateClass::TotalIncreasing),
        Some(DeviceClass::Enum) => return None,
        _ => {}
    }
    if contains_any(haystack, COUNTER_WORDS) {
        return Some(StateClass::TotalIncreasing);
    }
    if unit.is_some() && field.numeric_value().is_some() {
        return Some(StateClass::Measurement);
    }
    None
}

/// Icon from ordered substring rules
pub fn icon(haystack: &str) -> &'static str {
    ICON_RULES
        .iter()
        .find(|(words, _)| contains_any(haystack, words))
        .map(|(_, icon)| *icon)
        .unwrap_or(DEFAULT_ICON)
}

/// Step for numbers: explicit metadata, else finer for temperatures
pub fn step(unit: Option<&str>, field: &RawField) -> f64 {
    if let Some(step) = field.step.filter(|s| *s > 0.0) {
        return step;
    }
    match unit {
        Some("°C") | Some("K") => TEMPERATURE_STEP,
        _ => DEFAULT_STEP,
    }
}

/// Infer all semantics for a classified field
pub fn infer(kind: EntityKind, key: &str, field: &RawField) -> Semantics {
    let unit = normalize_unit(field.unit.as_deref());
    let haystack = haystack(key, field);

    let device_class = match kind {
        EntityKind::Sensor | EntityKind::Number => {
            sensor_device_class(unit.as_deref(), &haystack)
        }
        EntityKind::BinarySensor => binary_device_class(&haystack),
        EntityKind::Select => None,
    };

    let state_class = match kind {
        EntityKind::Sensor => state_class(key, &haystack, unit.as_deref(), device_class, field),
        _ => None,
    };

    let step = match kind {
        EntityKind::Number => Some(step(unit.as_deref(), field)),
        _ => None,
    };

    Semantics {
        icon: icon(&haystack),
        unit,
        device_class,
        state_class,
        step,
    }
}

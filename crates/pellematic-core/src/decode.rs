//! Poll-time value decoding
//!
//! Turns a field's current raw value into a display value. Order matters:
//! marker strings, sentinel filtering, explicit factor, then the per-unit
//! fallback tables for fields without a factor.

use serde::Serialize;
use serde_json::Value;

use crate::definition::EntityDefinition;
use crate::field::{parse_numeric_str, RawField};
use crate::semantics::DeviceClass;

/// Values this close to a declared bound, the bound included, are "no data"
pub const SENTINEL_DISTANCE: f64 = 2.0;

/// Strings the controller uses for missing values
pub const UNAVAILABLE_MARKERS: &[&str] = &[
    "", "none", "null", "n/a", "na", "unavailable", "unknown", "-", "--", "---", "???",
];

/// Component families whose kWh counters are reported in tenths
pub const TENTH_KWH_FAMILIES: &[&str] = &["se"];
/// Divisor for kWh counters of every other family
pub const DEFAULT_KWH_DIVISOR: f64 = 10_000.0;
/// Fields whose humidity is reported in tenths of a percent
pub const HUMIDITY_TENTHS_KEYS: &[&str] = &["L_humidity"];
/// Raw per-minute flow values are multiplied by this
pub const FLOW_MULTIPLIER: f64 = 60.0;

/// Decimal places kept after scaling, to hide float noise like 58.300000000000004
const PRECISION: f64 = 1e6;

/// A decoded value ready for display
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DisplayValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl DisplayValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Text(_) => None,
        }
    }
}

/// What the decoder needs to know about an entity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeContext<'a> {
    pub device_class: Option<DeviceClass>,
    pub unit: Option<&'a str>,
    pub prefix: &'a str,
    pub field: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Raw {
    Number(f64),
    Bool(bool),
}

pub fn is_unavailable_marker(s: &str) -> bool {
    let trimmed = s.trim();
    UNAVAILABLE_MARKERS
        .iter()
        .any(|marker| marker.eq_ignore_ascii_case(trimmed))
}

/// Within the sentinel band of a bound, or outside the declared range
pub fn is_sentinel(value: f64, min: Option<f64>, max: Option<f64>) -> bool {
    let near = |bound: f64| (value - bound).abs() <= SENTINEL_DISTANCE;
    if let Some(max) = max {
        if near(max) || value > max {
            return true;
        }
    }
    if let Some(min) = min {
        if near(min) || value < min {
            return true;
        }
    }
    false
}

/// Round away float noise and collapse integral values to integers
fn collapse(value: f64) -> DisplayValue {
    let rounded = (value * PRECISION).round() / PRECISION;
    if rounded.fract() == 0.0 && rounded.abs() < i64::MAX as f64 {
        DisplayValue::Int(rounded as i64)
    } else {
        DisplayValue::Float(rounded)
    }
}

fn kwh_divisor(prefix: &str) -> f64 {
    if TENTH_KWH_FAMILIES.contains(&prefix) {
        10.0
    } else {
        DEFAULT_KWH_DIVISOR
    }
}

/// Unit conversions applied when the field carries no usable factor
fn apply_fallback(ctx: &DecodeContext<'_>, raw: Raw) -> DisplayValue {
    let mut value = match raw {
        Raw::Bool(on) => {
            return match ctx.device_class {
                Some(DeviceClass::PowerFactor) => DisplayValue::Int(if on { 100 } else { 0 }),
                _ => DisplayValue::Int(i64::from(on)),
            };
        }
        Raw::Number(value) => value,
    };

    match (ctx.device_class, ctx.unit) {
        (Some(DeviceClass::Temperature), _) => value /= 10.0,
        (Some(DeviceClass::VolumeFlowRate), Some("m³/h")) => value *= FLOW_MULTIPLIER,
        (Some(DeviceClass::Power), Some("kW")) => value /= 10.0,
        (Some(DeviceClass::Energy), Some("kWh")) => value /= kwh_divisor(ctx.prefix),
        _ => {}
    }

    if HUMIDITY_TENTHS_KEYS.contains(&ctx.field) {
        value /= 10.0;
    }

    collapse(value)
}

/// Inverse of the fallback table, for writes to fields without a factor
pub(crate) fn invert_fallback(ctx: &DecodeContext<'_>, display: f64) -> f64 {
    let mut value = display;
    if HUMIDITY_TENTHS_KEYS.contains(&ctx.field) {
        value *= 10.0;
    }

    match (ctx.device_class, ctx.unit) {
        (Some(DeviceClass::Temperature), _) => value * 10.0,
        (Some(DeviceClass::VolumeFlowRate), Some("m³/h")) => value / FLOW_MULTIPLIER,
        (Some(DeviceClass::Power), Some("kW")) => value * 10.0,
        (Some(DeviceClass::Energy), Some("kWh")) => value * kwh_divisor(ctx.prefix),
        _ => value,
    }
}

/// Decode a field's current value; `None` means "no value"
pub fn decode(ctx: &DecodeContext<'_>, field: &RawField) -> Option<DisplayValue> {
    let raw = match &field.val {
        Value::Number(n) => Raw::Number(n.as_f64()?),
        Value::Bool(b) => Raw::Bool(*b),
        Value::String(s) => {
            if is_unavailable_marker(s) {
                return None;
            }
            let trimmed = s.trim();
            if trimmed.eq_ignore_ascii_case("true") {
                Raw::Bool(true)
            } else if trimmed.eq_ignore_ascii_case("false") {
                Raw::Bool(false)
            } else {
                match parse_numeric_str(s) {
                    Some(n) => Raw::Number(n),
                    None => return Some(DisplayValue::Text(s.clone())),
                }
            }
        }
        _ => return None,
    };

    if let Raw::Number(value) = raw {
        if is_sentinel(value, field.min, field.max) {
            return None;
        }
        if let Some(factor) = field.factor {
            return Some(collapse(value * factor));
        }
    }

    Some(apply_fallback(ctx, raw))
}

/// Decode a binary sensor's state
pub fn decode_binary(field: &RawField) -> Option<bool> {
    match &field.val {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        Value::String(s) => {
            let lowered = s.trim().to_ascii_lowercase();
            match lowered.as_str() {
                "1" | "true" | "on" | "ein" => Some(true),
                "0" | "false" | "off" | "aus" => Some(false),
                other if is_unavailable_marker(other) => None,
                other => parse_numeric_str(other).map(|v| v != 0.0),
            }
        }
        _ => None,
    }
}

/// Raw value as an option key (`1.0` -> `"1"`)
fn option_key(val: &Value) -> Option<String> {
    match val {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(i.to_string()),
            None => n.as_f64().map(|f| {
                if f.fract() == 0.0 {
                    format!("{}", f as i64)
                } else {
                    f.to_string()
                }
            }),
        },
        Value::String(s) => Some(s.trim().to_string()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        _ => None,
    }
}

/// Current option label of a select
pub fn decode_option(definition: &EntityDefinition, field: &RawField) -> Option<String> {
    let key = option_key(&field.val)?;
    definition
        .option_keys
        .iter()
        .position(|k| *k == key)
        .and_then(|i| definition.options.get(i).cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx<'a>(
        device_class: Option<DeviceClass>,
        unit: Option<&'a str>,
        prefix: &'a str,
        field: &'a str,
    ) -> DecodeContext<'a> {
        DecodeContext {
            device_class,
            unit,
            prefix,
            field,
        }
    }

    const PLAIN: DecodeContext<'static> = DecodeContext {
        device_class: None,
        unit: None,
        prefix: "system",
        field: "L_value",
    };

    fn field(node: serde_json::Value) -> RawField {
        RawField::from_value(&node).unwrap()
    }

    #[test]
    fn test_factor_collapses_integral() {
        let f = field(json!({"val": 580, "factor": 0.1}));
        assert_eq!(decode(&PLAIN, &f), Some(DisplayValue::Int(58)));

        let f = field(json!({"val": 583, "factor": 0.1}));
        assert_eq!(decode(&PLAIN, &f), Some(DisplayValue::Float(58.3)));
    }

    #[test]
    fn test_factor_ignores_fallback_table() {
        let temp = ctx(Some(DeviceClass::Temperature), Some("°C"), "hk", "L_flowtemp_act");
        let f = field(json!({"val": "583", "factor": 0.1}));
        assert_eq!(decode(&temp, &f), Some(DisplayValue::Float(58.3)));

        let f = field(json!({"val": 583, "factor": 1}));
        assert_eq!(decode(&temp, &f), Some(DisplayValue::Int(583)));
    }

    #[test]
    fn test_temperature_fallback() {
        let temp = ctx(Some(DeviceClass::Temperature), Some("°C"), "hk", "L_roomtemp_act");
        let f = field(json!({"val": 225}));
        assert_eq!(decode(&temp, &f), Some(DisplayValue::Float(22.5)));
    }

    #[test]
    fn test_sentinel_near_max() {
        let f = field(json!({"val": 32766, "factor": 0.1, "min": -32768, "max": 32767}));
        assert_eq!(decode(&PLAIN, &f), None);

        let f = field(json!({"val": 32764, "factor": 0.1, "min": -32768, "max": 32767}));
        assert_eq!(decode(&PLAIN, &f), Some(DisplayValue::Float(3276.4)));
    }

    #[test]
    fn test_sentinel_band_includes_bound() {
        let f = field(json!({"val": "32767", "factor": "0.1", "min": "-32768", "max": "32767"}));
        assert_eq!(decode(&PLAIN, &f), None);

        let f = field(json!({"val": 0, "min": 0, "max": 100}));
        assert_eq!(decode(&PLAIN, &f), None);

        let f = field(json!({"val": 1, "min": 0, "max": 100}));
        assert_eq!(decode(&PLAIN, &f), None);

        let f = field(json!({"val": 3, "min": 0, "max": 100}));
        assert_eq!(decode(&PLAIN, &f), Some(DisplayValue::Int(3)));
    }

    #[test]
    fn test_sentinel_out_of_range() {
        let f = field(json!({"val": 32767, "min": -100, "max": 1000}));
        assert_eq!(decode(&PLAIN, &f), None);
    }

    #[test]
    fn test_unavailable_markers() {
        for marker in ["", " N/A ", "unknown", "--", "None"] {
            let f = RawField::scalar(json!(marker));
            assert_eq!(decode(&PLAIN, &f), None, "marker {marker:?}");
        }
    }

    #[test]
    fn test_numeric_and_text_strings() {
        assert_eq!(decode(&PLAIN, &RawField::scalar(json!("42"))), Some(DisplayValue::Int(42)));
        assert_eq!(
            decode(&PLAIN, &RawField::scalar(json!("Zündung"))),
            Some(DisplayValue::Text("Zündung".to_string()))
        );
    }

    #[test]
    fn test_unit_fallbacks() {
        let flow = ctx(Some(DeviceClass::VolumeFlowRate), Some("m³/h"), "wp", "L_flow");
        assert_eq!(decode(&flow, &RawField::scalar(json!(2))), Some(DisplayValue::Int(120)));

        let power = ctx(Some(DeviceClass::Power), Some("kW"), "pe", "L_power");
        assert_eq!(decode(&power, &RawField::scalar(json!(125))), Some(DisplayValue::Float(12.5)));

        let solar = ctx(Some(DeviceClass::Energy), Some("kWh"), "se", "L_total");
        assert_eq!(
            decode(&solar, &RawField::scalar(json!(1234))),
            Some(DisplayValue::Float(123.4))
        );

        let pump = ctx(Some(DeviceClass::Energy), Some("kWh"), "wp", "L_total");
        assert_eq!(
            decode(&pump, &RawField::scalar(json!(12340000))),
            Some(DisplayValue::Int(1234))
        );
    }

    #[test]
    fn test_power_factor_boolean() {
        let pf = ctx(Some(DeviceClass::PowerFactor), Some("%"), "pu", "L_pump");
        assert_eq!(decode(&pf, &RawField::scalar(json!(true))), Some(DisplayValue::Int(100)));
        assert_eq!(decode(&pf, &RawField::scalar(json!(false))), Some(DisplayValue::Int(0)));
        assert_eq!(decode(&pf, &RawField::scalar(json!(" TRUE "))), Some(DisplayValue::Int(100)));
        assert_eq!(decode(&pf, &RawField::scalar(json!("false"))), Some(DisplayValue::Int(0)));
    }

    #[test]
    fn test_humidity_tenths() {
        let hum = ctx(Some(DeviceClass::Humidity), Some("%"), "system", "L_humidity");
        assert_eq!(decode(&hum, &RawField::scalar(json!(553))), Some(DisplayValue::Float(55.3)));
    }

    #[test]
    fn test_decode_binary() {
        assert_eq!(decode_binary(&RawField::scalar(json!(1))), Some(true));
        assert_eq!(decode_binary(&RawField::scalar(json!("0"))), Some(false));
        assert_eq!(decode_binary(&RawField::scalar(json!("true"))), Some(true));
        assert_eq!(decode_binary(&RawField::scalar(json!("n/a"))), None);
        assert_eq!(decode_binary(&RawField::scalar(json!([1]))), None);
    }
}

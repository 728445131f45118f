//! Display value -> raw device value, the inverse of decoding

use serde_json::Value;
use thiserror::Error;

use crate::classify::EntityKind;
use crate::decode::invert_fallback;
use crate::definition::EntityDefinition;
use crate::field::parse_number;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandValueError {
    #[error("{0} entities are read-only")]
    NotWritable(EntityKind),
    #[error("Not a number: {0}")]
    NotANumber(String),
    #[error("Raw value {value} outside [{min}, {max}]")]
    OutOfRange { value: i64, min: f64, max: f64 },
    #[error("Unknown option: {0}")]
    UnknownOption(String),
}

/// Encode a user-supplied value into the string the command endpoint expects
pub fn encode_command_value(
    definition: &EntityDefinition,
    value: &Value,
) -> Result<String, CommandValueError> {
    match definition.kind {
        EntityKind::Number => encode_number(definition, value).map(|raw| raw.to_string()),
        EntityKind::Select => encode_option(definition, value),
        kind => Err(CommandValueError::NotWritable(kind)),
    }
}

fn encode_number(definition: &EntityDefinition, value: &Value) -> Result<i64, CommandValueError> {
    let display =
        parse_number(value).ok_or_else(|| CommandValueError::NotANumber(value.to_string()))?;

    let scaled = match definition.factor {
        Some(factor) if factor != 0.0 => display / factor,
        _ => invert_fallback(&definition.decode_context(), display),
    };
    let raw = scaled.round() as i64;

    let out_of_range = definition.min.is_some_and(|min| (raw as f64) < min)
        || definition.max.is_some_and(|max| (raw as f64) > max);
    if out_of_range {
        return Err(CommandValueError::OutOfRange {
            value: raw,
            min: definition.min.unwrap_or(f64::NEG_INFINITY),
            max: definition.max.unwrap_or(f64::INFINITY),
        });
    }
    Ok(raw)
}

/// Accepts an option label (`1_auto`) or a raw key (`1`)
fn encode_option(
    definition: &EntityDefinition,
    value: &Value,
) -> Result<String, CommandValueError> {
    let wanted = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        other => return Err(CommandValueError::UnknownOption(other.to_string())),
    };

    if let Some(i) = definition.options.iter().position(|label| *label == wanted) {
        if let Some(key) = definition.option_keys.get(i) {
            return Ok(key.clone());
        }
    }
    if definition.option_keys.contains(&wanted) {
        return Ok(wanted);
    }
    Err(CommandValueError::UnknownOption(wanted))
}

//! Raw field model
//!
//! A field is one leaf under a component. Current firmware sends an object
//! (`{"val": .., "unit": .., "factor": .., ...}`), legacy firmware a bare
//! scalar. Numeric metadata arrives as JSON numbers or numeric strings.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("Field has no value")]
    MissingValue,
    #[error("Field is neither an object nor a scalar")]
    Unsupported,
    #[error("Invalid numeric metadata {key}: {value}")]
    InvalidNumber { key: &'static str, value: String },
}

/// One `key:label` entry of a field's `format` string
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatOption {
    pub key: String,
    pub label: String,
}

impl FormatOption {
    /// Stable option identifier, e.g. `1:Auto` -> `1_auto`
    pub fn slug(&self) -> String {
        slugify(&format!("{}_{}", self.key, self.label))
    }
}

/// Parse a `0:Off|1:Auto|2:On` format string
pub fn parse_format(format: &str) -> Vec<FormatOption> {
    format
        .split('|')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((key, label)) => FormatOption {
                key: key.trim().to_string(),
                label: label.trim().to_string(),
            },
            None => FormatOption {
                key: entry.to_string(),
                label: entry.to_string(),
            },
        })
        .collect()
}

/// Lowercase, with every run of non-alphanumerics collapsed to one `_`
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}

/// Parse a JSON number or numeric string (decimal comma accepted)
pub fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_numeric_str(s),
        _ => None,
    }
}

pub(crate) fn parse_numeric_str(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}

/// A normalized field: value plus optional metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawField {
    pub val: Value,
    pub unit: Option<String>,
    pub factor: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub format: Option<String>,
    pub text: Option<String>,
}

impl RawField {
    /// Field carrying only a value (legacy firmware)
    pub fn scalar(val: Value) -> Self {
        Self {
            val,
            unit: None,
            factor: None,
            min: None,
            max: None,
            step: None,
            format: None,
            text: None,
        }
    }

    /// Normalize a JSON node into a field
    pub fn from_value(node: &Value) -> Result<Self, FieldError> {
        match node {
            Value::Object(map) => Self::from_map(map),
            Value::Null => Err(FieldError::MissingValue),
            Value::Array(_) => Err(FieldError::Unsupported),
            scalar => Ok(Self::scalar(scalar.clone())),
        }
    }

    fn from_map(map: &Map<String, Value>) -> Result<Self, FieldError> {
        let val = map
            .get("val")
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or(FieldError::MissingValue)?;

        Ok(Self {
            val,
            unit: string_meta(map, "unit"),
            factor: numeric_meta(map, "factor")?,
            min: numeric_meta(map, "min")?,
            max: numeric_meta(map, "max")?,
            step: numeric_meta(map, "step")?,
            format: string_meta(map, "format"),
            text: string_meta(map, "text"),
        })
    }

    /// Parsed `format` options, empty when there is no format
    pub fn options(&self) -> Vec<FormatOption> {
        self.format.as_deref().map(parse_format).unwrap_or_default()
    }

    /// Both bounds are declared
    pub fn has_bounds(&self) -> bool {
        self.min.is_some() && self.max.is_some()
    }

    /// Numeric view of the value, if it has one
    pub fn numeric_value(&self) -> Option<f64> {
        parse_number(&self.val)
    }
}

fn string_meta(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn numeric_meta(map: &Map<String, Value>, key: &'static str) -> Result<Option<f64>, FieldError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(value) => parse_number(value)
            .map(Some)
            .ok_or_else(|| FieldError::InvalidNumber {
                key,
                value: value.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_standard_field() {
        let field = RawField::from_value(&json!({
            "val": "215", "unit": "°C", "factor": 0.1, "min": "-32768", "max": "32767",
            "text": "Vorlauftemperatur"
        }))
        .unwrap();

        assert_eq!(field.val, json!("215"));
        assert_eq!(field.unit.as_deref(), Some("°C"));
        assert_eq!(field.factor, Some(0.1));
        assert_eq!(field.min, Some(-32768.0));
        assert_eq!(field.max, Some(32767.0));
        assert_eq!(field.text.as_deref(), Some("Vorlauftemperatur"));
        assert_eq!(field.numeric_value(), Some(215.0));
    }

    #[test]
    fn test_bare_scalar_field() {
        let field = RawField::from_value(&json!(42)).unwrap();
        assert_eq!(field, RawField::scalar(json!(42)));
        assert!(!field.has_bounds());
    }

    #[test]
    fn test_missing_value() {
        assert_eq!(
            RawField::from_value(&json!({"unit": "°C"})),
            Err(FieldError::MissingValue)
        );
        assert_eq!(RawField::from_value(&Value::Null), Err(FieldError::MissingValue));
        assert_eq!(
            RawField::from_value(&json!([1, 2])),
            Err(FieldError::Unsupported)
        );
    }

    #[test]
    fn test_invalid_numeric_metadata() {
        let err = RawField::from_value(&json!({"val": 1, "factor": "abc"})).unwrap_err();
        assert!(matches!(err, FieldError::InvalidNumber { key: "factor", .. }));
    }

    #[test]
    fn test_blank_metadata_is_absent() {
        let field = RawField::from_value(&json!({"val": 1, "min": "", "unit": " "})).unwrap();
        assert_eq!(field.min, None);
        assert_eq!(field.unit, None);
    }

    #[test]
    fn test_parse_format() {
        let options = parse_format("0:Off|1:Auto|2:On");
        assert_eq!(options.len(), 3);
        assert_eq!(options[1].key, "1");
        assert_eq!(options[1].label, "Auto");
        let slugs: Vec<String> = options.iter().map(FormatOption::slug).collect();
        assert_eq!(slugs, ["0_off", "1_auto", "2_on"]);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("3:Nur Heizen (Komfort)"), "3_nur_heizen_komfort");
        assert_eq!(slugify("1_Übergang"), "1_übergang");
    }

    #[test]
    fn test_decimal_comma() {
        assert_eq!(parse_number(&json!("22,5")), Some(22.5));
        assert_eq!(parse_number(&json!("n/a")), None);
        assert_eq!(parse_number(&json!(true)), None);
    }
}

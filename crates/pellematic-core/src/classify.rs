//! Field classification
//!
//! The controller has no schema; the kind of a field follows from
//! conventions in its key and metadata. The conventions are kept as an
//! ordered rule table so new firmware quirks become new rows.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::field::RawField;

/// Key prefix marking a field as reported, not settable
pub const READ_ONLY_PREFIX: &str = "L_";

/// The entity kinds discovery produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Sensor,
    BinarySensor,
    Select,
    Number,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sensor => "sensor",
            Self::BinarySensor => "binary_sensor",
            Self::Select => "select",
            Self::Number => "number",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classification rule: predicate over (key, field) and resulting kind
struct Rule {
    name: &'static str,
    matches: fn(&str, &RawField) -> bool,
    kind: EntityKind,
}

/// Evaluated top to bottom, first match wins. No match drops the field.
const RULES: &[Rule] = &[
    Rule {
        name: "read-only two-state format",
        matches: read_only_binary,
        kind: EntityKind::BinarySensor,
    },
    Rule {
        name: "read-only",
        matches: read_only,
        kind: EntityKind::Sensor,
    },
    Rule {
        name: "writable multi-option format",
        matches: writable_options,
        kind: EntityKind::Select,
    },
    Rule {
        name: "writable bounded",
        matches: writable_bounded,
        kind: EntityKind::Number,
    },
];

pub fn is_read_only_key(key: &str) -> bool {
    key.starts_with(READ_ONLY_PREFIX)
}

/// Exactly two options whose keys are the off/on markers
pub fn is_binary_format(field: &RawField) -> bool {
    let options = field.options();
    let [off, on] = options.as_slice() else {
        return false;
    };
    let off_key = off.key.to_ascii_lowercase();
    let on_key = on.key.to_ascii_lowercase();
    matches!(off_key.as_str(), "0" | "false") && matches!(on_key.as_str(), "1" | "true")
}

fn read_only_binary(key: &str, field: &RawField) -> bool {
    is_read_only_key(key) && is_binary_format(field)
}

fn read_only(key: &str, _field: &RawField) -> bool {
    is_read_only_key(key)
}

fn writable_options(key: &str, field: &RawField) -> bool {
    !is_read_only_key(key) && field.options().len() > 2
}

fn writable_bounded(key: &str, field: &RawField) -> bool {
    !is_read_only_key(key) && field.has_bounds()
}

/// Classify a field, or `None` when it is dropped
pub fn classify(key: &str, field: &RawField) -> Option<EntityKind> {
    let rule = RULES.iter().find(|rule| (rule.matches)(key, field))?;
    tracing::trace!(field = %key, rule = rule.name, kind = %rule.kind, "Classified field");
    Some(rule.kind)
}

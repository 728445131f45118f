//! Repair of known malformations in controller JSON
//!
//! The normalizer is best-effort: it fixes the defects observed in the field
//! and passes anything else through untouched, so the JSON parser reports
//! whatever is still broken.

use serde_json::{Map, Value};
use std::borrow::Cow;
use thiserror::Error;
use tracing::debug;

use crate::charset::{self, Charset};

/// Exact textual substitutions for firmware defects
///
/// Some firmware builds drop the closing quote after `L_statetext`.
const KNOWN_DEFECTS: &[(&str, &str)] = &[("\"L_statetext:", "\"L_statetext\":")];

#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("Invalid JSON in device response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Device response is not a JSON object")]
    NotAnObject,
}

/// Repair known defects in a decoded response body
pub fn normalize(text: &str) -> String {
    let mut repaired = Cow::Borrowed(text);
    for (broken, fixed) in KNOWN_DEFECTS {
        if repaired.contains(broken) {
            debug!(defect = %broken, "Repairing known firmware defect");
            repaired = Cow::Owned(repaired.replace(broken, fixed));
        }
    }
    escape_control_chars(&repaired)
}

/// Escape literal newlines, carriage returns and tabs inside JSON strings
fn escape_control_chars(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if !in_string {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
            continue;
        }

        if escaped {
            escaped = false;
            out.push(c);
            continue;
        }

        match c {
            '\\' => {
                escaped = true;
                out.push(c);
            }
            '"' => {
                in_string = false;
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }

    out
}

/// Normalize and parse a decoded response body into its top-level object
pub fn parse_payload(text: &str) -> Result<Map<String, Value>, PayloadError> {
    match serde_json::from_str(&normalize(text))? {
        Value::Object(map) => Ok(map),
        _ => Err(PayloadError::NotAnObject),
    }
}

/// Full pipeline from raw bytes: charset, repair, parse
///
/// Returns the charset that was used so callers can log or persist it.
pub fn parse_bytes(
    bytes: &[u8],
    configured: Option<Charset>,
) -> Result<(Charset, Map<String, Value>), PayloadError> {
    let (charset, text) = charset::decode_with(bytes, configured);
    let map = parse_payload(&text)?;
    Ok((charset, map))
}

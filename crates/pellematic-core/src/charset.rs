//! Text encoding detection for controller responses
//!
//! Most firmware builds answer in UTF-8, older ones in ISO-8859-1, and a few
//! mix both: one or two fields carry raw Latin-1 bytes inside an otherwise
//! UTF-8 document. Detection runs on the raw bytes, before any JSON parsing,
//! and the result is passed explicitly through the decode pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Share of non-ASCII bytes that may fail UTF-8 decoding while the payload
/// is still treated as UTF-8.
pub const MIXED_ENCODING_THRESHOLD: f64 = 0.2;

/// UTF-8 byte pairs for ü ö ä ß ° Ü Ö Ä (shown as "Ã¼", "Â°", ... when
/// mis-decoded as Latin-1).
const MOJIBAKE_SIGNATURES: &[[u8; 2]] = &[
    [0xC3, 0xBC],
    [0xC3, 0xB6],
    [0xC3, 0xA4],
    [0xC3, 0x9F],
    [0xC2, 0xB0],
    [0xC3, 0x9C],
    [0xC3, 0x96],
    [0xC3, 0x84],
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unsupported charset: {0}")]
pub struct UnknownCharset(pub String);

/// Text encodings the controller is known to emit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Charset {
    #[default]
    #[serde(rename = "utf-8")]
    Utf8,
    /// ISO-8859-1 family (also used for cp1252 configurations)
    #[serde(rename = "iso-8859-1")]
    Latin1,
}

impl Charset {
    /// Canonical label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Latin1 => "iso-8859-1",
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Charset {
    type Err = UnknownCharset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "iso-8859-1" | "iso8859-1" | "iso-8859-15" | "latin1" | "latin-1" | "cp1252"
            | "windows-1252" => Ok(Self::Latin1),
            other => Err(UnknownCharset(other.to_string())),
        }
    }
}

/// Byte statistics gathered for the mixed-encoding heuristic
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct ByteStats {
    /// Non-ASCII bytes inside valid UTF-8 sequences
    valid_non_ascii: usize,
    /// Bytes that are not part of any valid UTF-8 sequence
    invalid: usize,
    /// Contiguous runs of invalid bytes
    invalid_runs: usize,
    /// Occurrences of known UTF-8 umlaut/degree byte pairs
    signature_hits: usize,
}

impl ByteStats {
    fn scan(bytes: &[u8]) -> Self {
        let mut stats = Self::default();
        for chunk in bytes.utf8_chunks() {
            stats.valid_non_ascii += chunk.valid().bytes().filter(|b| !b.is_ascii()).count();
            if !chunk.invalid().is_empty() {
                stats.invalid += chunk.invalid().len();
                stats.invalid_runs += 1;
            }
        }
        stats.signature_hits = bytes
            .windows(2)
            .filter(|pair| MOJIBAKE_SIGNATURES.iter().any(|sig| sig == pair))
            .count();
        stats
    }

    fn prefers_utf8(&self) -> bool {
        let non_ascii = self.valid_non_ascii + self.invalid;
        if non_ascii == 0 {
            return true;
        }
        let invalid_share = self.invalid as f64 / non_ascii as f64;
        invalid_share < MIXED_ENCODING_THRESHOLD
            || (self.signature_hits > 0 && self.signature_hits >= self.invalid_runs)
    }
}

/// Detect the encoding of a raw response body
pub fn detect(bytes: &[u8]) -> Charset {
    if bytes.is_ascii() || std::str::from_utf8(bytes).is_ok() {
        return Charset::Utf8;
    }

    let stats = ByteStats::scan(bytes);
    let charset = if stats.prefers_utf8() {
        Charset::Utf8
    } else {
        Charset::Latin1
    };

    tracing::debug!(
        charset = %charset,
        valid_non_ascii = stats.valid_non_ascii,
        invalid = stats.invalid,
        signatures = stats.signature_hits,
        "Detected mixed or single-byte payload encoding"
    );
    charset
}

/// Decode a response body with the given charset
///
/// UTF-8 decoding never fails: stray bytes that are not part of a valid
/// sequence are taken as Latin-1 characters, which is what the mixed
/// firmware payloads contain.
pub fn decode(bytes: &[u8], charset: Charset) -> String {
    match charset {
        Charset::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        Charset::Utf8 => {
            let mut text = String::with_capacity(bytes.len());
            for chunk in bytes.utf8_chunks() {
                text.push_str(chunk.valid());
                text.extend(chunk.invalid().iter().map(|&b| b as char));
            }
            text
        }
    }
}

/// Decode with a configured charset, or detect one when none is configured
pub fn decode_with(bytes: &[u8], configured: Option<Charset>) -> (Charset, String) {
    let charset = configured.unwrap_or_else(|| detect(bytes));
    (charset, decode(bytes, charset))
}

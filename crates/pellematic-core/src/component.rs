//! Component keys and their display labels
//!
//! A component key is a lowercase domain prefix optionally followed by an
//! instance index: `hk1` is heating circuit 1, `system` is a singleton.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The singleton component whose fields are named without a prefix
pub const SYSTEM_COMPONENT: &str = "system";

/// (prefix, English label, German label)
const DOMAIN_LABELS: &[(&str, &str, &str)] = &[
    ("system", "System", "System"),
    ("weather", "Weather", "Wetter"),
    ("forecast", "Forecast", "Prognose"),
    ("hk", "Heating circuit", "Heizkreis"),
    ("pu", "Buffer storage", "Pufferspeicher"),
    ("ww", "Hot water", "Warmwasser"),
    ("wp", "Heat pump", "Wärmepumpe"),
    ("sk", "Solar collector", "Solarkollektor"),
    ("se", "Solar gain", "Solarertrag"),
    ("pe", "Pellet burner", "Pelletkessel"),
    ("circ", "Circulation pump", "Zirkulationspumpe"),
    ("stirling", "Stirling engine", "Stirlingmotor"),
    ("power", "Smart PV", "Smart PV"),
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unsupported language: {0}")]
pub struct UnknownLanguage(pub String);

/// Language used for component labels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    De,
}

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Self::En),
            "de" | "german" | "deutsch" => Ok(Self::De),
            other => Err(UnknownLanguage(other.to_string())),
        }
    }
}

/// Domain prefix of a component key (`hk1` -> `hk`)
pub fn component_prefix(key: &str) -> &str {
    key.trim_end_matches(|c: char| c.is_ascii_digit())
}

/// Parsed component key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentKey {
    /// Key as it appears in the response
    pub key: String,
    /// Domain prefix
    pub prefix: String,
    /// Instance index, 0 for singletons
    pub index: u32,
}

impl ComponentKey {
    /// Parse a top-level response key
    pub fn parse(key: &str) -> Self {
        let digits: String = key.chars().filter(char::is_ascii_digit).collect();
        let index = digits.parse().unwrap_or(0);
        Self {
            key: key.to_string(),
            prefix: component_prefix(key).to_string(),
            index,
        }
    }

    pub fn is_system(&self) -> bool {
        self.key == SYSTEM_COMPONENT
    }

    /// Translated domain label for this component's prefix
    pub fn label(&self, language: Language) -> Cow<'static, str> {
        domain_label(&self.prefix, language)
    }

    /// Label plus instance index, or `None` for the system component
    pub fn display_name(&self, language: Language) -> Option<String> {
        if self.is_system() {
            return None;
        }
        let label = self.label(language);
        Some(if self.index > 0 {
            format!("{} {}", label, self.index)
        } else {
            label.into_owned()
        })
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Label for a domain prefix; unknown prefixes are shown upper-cased
pub fn domain_label(prefix: &str, language: Language) -> Cow<'static, str> {
    DOMAIN_LABELS
        .iter()
        .find(|(p, _, _)| *p == prefix)
        .map(|(_, en, de)| match language {
            Language::En => Cow::Borrowed(*en),
            Language::De => Cow::Borrowed(*de),
        })
        .unwrap_or_else(|| Cow::Owned(prefix.to_uppercase()))
}

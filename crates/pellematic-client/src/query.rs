//! Status and command requests against the controller

use chrono::{DateTime, Utc};
use pellematic_core::charset::Charset;
use pellematic_core::normalize::parse_bytes;
use pellematic_core::{
    encode_command_value, CommandValueError, EntityDefinition, PayloadError, RawField,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::transport::{redact, HttpTransport};

/// Path of the status endpoint, relative to the base URL
pub const STATUS_PATH: &str = "all";

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Device answered {status} for {url}")]
    Status { status: u16, url: String },
    #[error("No response after {attempts} attempts: {last}")]
    Exhausted { attempts: usize, last: String },
    #[error("Invalid device response: {0}")]
    Payload(#[from] PayloadError),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid command: {0}")]
    Value(#[from] CommandValueError),
}

impl ClientError {
    /// The device answered, but not with a usable status document
    fn is_rejected_payload(&self) -> bool {
        matches!(self, Self::Status { .. } | Self::Payload(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown query suffix: {0:?}")]
pub struct UnknownQuerySuffix(pub String);

/// Suffix appended to the status path
///
/// `??` asks newer firmware for descriptive texts alongside values; older
/// firmware only understands `?`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuerySuffix {
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "?")]
    Plain,
    #[serde(rename = "??")]
    Described,
}

impl QuerySuffix {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Plain => "?",
            Self::Described => "??",
        }
    }
}

impl fmt::Display for QuerySuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuerySuffix {
    type Err = UnknownQuerySuffix;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "auto" | "" => Ok(Self::Auto),
            "?" => Ok(Self::Plain),
            "??" => Ok(Self::Described),
            other => Err(UnknownQuerySuffix(other.to_string())),
        }
    }
}

/// One decoded status response
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSnapshot {
    /// Top-level object keyed by component
    pub data: Map<String, Value>,
    pub charset: Charset,
    pub suffix: QuerySuffix,
    pub fetched_at: DateTime<Utc>,
}

impl DeviceSnapshot {
    /// Raw JSON node of one field
    pub fn node(&self, component: &str, field: &str) -> Option<&Value> {
        self.data.get(component)?.get(field)
    }

    /// Normalized field, `None` when missing or unusable
    pub fn field(&self, component: &str, field: &str) -> Option<RawField> {
        RawField::from_value(self.node(component, field)?).ok()
    }
}

/// Client for one controller
pub struct DeviceClient {
    transport: HttpTransport,
    base_url: String,
    charset: Option<Charset>,
    suffix: QuerySuffix,
    /// Suffix that worked last time, when `suffix` is `Auto`
    detected: RwLock<Option<QuerySuffix>>,
}

impl DeviceClient {
    /// Create a client; `charset: None` detects the encoding per response
    pub fn new(
        base_url: &str,
        charset: Option<Charset>,
        suffix: QuerySuffix,
    ) -> Result<Self, ClientError> {
        Self::with_transport(HttpTransport::new()?, base_url, charset, suffix)
    }

    pub fn with_transport(
        transport: HttpTransport,
        base_url: &str,
        charset: Option<Charset>,
        suffix: QuerySuffix,
    ) -> Result<Self, ClientError> {
        let base_url = base_url.trim().trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::InvalidUrl(redact(base_url)));
        }

        Ok(Self {
            transport,
            base_url: base_url.to_string(),
            charset,
            suffix,
            detected: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Status URL for a concrete suffix
    pub fn status_url(&self, suffix: QuerySuffix) -> String {
        match suffix {
            QuerySuffix::Auto => format!("{}/{}", self.base_url, STATUS_PATH),
            concrete => format!("{}/{}{}", self.base_url, STATUS_PATH, concrete.as_str()),
        }
    }

    /// Command URL: `{base}/{component}.{field}={value}`
    pub fn command_url(
        &self,
        component: &str,
        field: &str,
        value: &str,
    ) -> Result<String, ClientError> {
        for (what, part) in [("component", component), ("field", field)] {
            if !is_identifier(part) {
                return Err(ClientError::InvalidUrl(format!("{} {:?}", what, part)));
            }
        }
        let value_ok = value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'));
        if value.is_empty() || !value_ok {
            return Err(ClientError::InvalidUrl(format!("value {:?}", value)));
        }
        Ok(format!("{}/{}.{}={}", self.base_url, component, field, value))
    }

    /// Suffix currently in use, if one has been detected or configured
    pub async fn active_suffix(&self) -> Option<QuerySuffix> {
        match self.suffix {
            QuerySuffix::Auto => *self.detected.read().await,
            concrete => Some(concrete),
        }
    }

    /// Fetch and decode the full status document
    pub async fn fetch_status(&self) -> Result<DeviceSnapshot, ClientError> {
        if let Some(suffix) = self.active_suffix().await {
            return self.fetch_with(suffix).await;
        }

        let snapshot = match self.fetch_with(QuerySuffix::Described).await {
            Ok(snapshot) => snapshot,
            Err(e) if e.is_rejected_payload() => {
                debug!(error = %e, "Described status unavailable, falling back to plain");
                self.fetch_with(QuerySuffix::Plain).await?
            }
            Err(e) => return Err(e),
        };

        info!(
            suffix = %snapshot.suffix,
            charset = %snapshot.charset,
            "Detected status query suffix"
        );
        *self.detected.write().await = Some(snapshot.suffix);
        Ok(snapshot)
    }

    async fn fetch_with(&self, suffix: QuerySuffix) -> Result<DeviceSnapshot, ClientError> {
        let body = self.transport.get(&self.status_url(suffix)).await?;
        let (charset, data) = parse_bytes(&body, self.charset)?;
        debug!(components = data.len(), charset = %charset, "Decoded status response");

        Ok(DeviceSnapshot {
            data,
            charset,
            suffix,
            fetched_at: Utc::now(),
        })
    }

    /// Write a raw device value; only the HTTP status is checked
    pub async fn set_value(
        &self,
        component: &str,
        field: &str,
        value: &str,
    ) -> Result<(), ClientError> {
        let url = self.command_url(component, field, value)?;
        info!(component = %component, field = %field, value = %value, "Sending command");
        self.transport.get(&url).await?;
        Ok(())
    }

    /// Encode a display value for a writable entity and send it
    ///
    /// Returns the raw value that was written.
    pub async fn send_command(
        &self,
        definition: &EntityDefinition,
        value: &Value,
    ) -> Result<String, ClientError> {
        let raw = encode_command_value(definition, value)?;
        self.set_value(&definition.component, &definition.field, &raw).await?;
        Ok(raw)
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

//! Configuration loading and validation

use anyhow::{Context, Result};
use pellematic_client::transport::redact;
use pellematic_client::QuerySuffix;
use pellematic_core::{Charset, Language};
use pellematic_poller::PollerConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    /// Component instances per domain prefix, as last discovered
    #[serde(default)]
    pub components: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind address for web server
    #[serde(default = "default_bind")]
    pub bind: String,
    /// TLS configuration (optional - enables HTTPS when present)
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            tls: None,
        }
    }
}

/// TLS/HTTPS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM format)
    pub cert: String,
    /// Path to private key file (PEM format)
    pub key: String,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Base URL including the password segment, e.g. `http://192.168.1.50:4321/abcd`
    #[serde(default)]
    pub host: String,
    /// Display name of the installation
    #[serde(default = "default_name")]
    pub name: String,
    /// `auto`, `utf-8` or `iso-8859-1`
    #[serde(default = "default_charset")]
    pub charset: String,
    #[serde(default)]
    pub query_suffix: QuerySuffix,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Minimum spacing between requests to the controller
    #[serde(default = "default_min_request_interval")]
    pub min_request_interval_ms: u64,
    #[serde(default)]
    pub language: Language,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            name: default_name(),
            charset: default_charset(),
            query_suffix: QuerySuffix::Auto,
            poll_interval_secs: default_poll_interval(),
            min_request_interval_ms: default_min_request_interval(),
            language: Language::En,
        }
    }
}

fn default_name() -> String {
    "Pellematic".to_string()
}

fn default_charset() -> String {
    "auto".to_string()
}

fn default_poll_interval() -> u64 {
    30
}

fn default_min_request_interval() -> u64 {
    2500
}

impl DeviceConfig {
    /// Configured charset, `None` for per-response detection
    pub fn charset(&self) -> Result<Option<Charset>> {
        match self.charset.trim() {
            "" | "auto" => Ok(None),
            other => other
                .parse()
                .map(Some)
                .with_context(|| format!("Invalid device.charset {:?}", other)),
        }
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    /// Polling parameters; the interval is never shorter than the request spacing
    pub fn poller_config(&self) -> PollerConfig {
        let interval = Duration::from_secs(self.poll_interval_secs.max(1))
            .max(self.min_request_interval());
        PollerConfig {
            interval,
            language: self.language,
        }
    }
}

impl Config {
    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.device.host.trim().is_empty() {
            anyhow::bail!("device.host is not configured");
        }
        self.device.charset()?;
        Ok(())
    }

    /// Copy safe to expose over the API: the device password is masked
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if !config.device.host.is_empty() {
            config.device.host = redact(&config.device.host);
        }
        config
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let config = Config {
        daemon: DaemonConfig::default(),
        device: DeviceConfig {
            host: "http://192.168.1.50:4321/abcd".to_string(),
            ..DeviceConfig::default()
        },
        components: BTreeMap::from([("hk".to_string(), 1), ("ww".to_string(), 1)]),
    };

    let content = toml::to_string_pretty(&config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.daemon.bind, "0.0.0.0:8080");
        assert_eq!(config.device.poll_interval_secs, 30);
        assert_eq!(config.device.min_request_interval_ms, 2500);
        assert_eq!(config.device.query_suffix, QuerySuffix::Auto);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_full_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[daemon]
bind = "127.0.0.1:9000"

[device]
host = "http://10.0.0.7:4321/pw12"
charset = "iso-8859-1"
query_suffix = "??"
poll_interval_secs = 60
language = "de"

[components]
hk = 2
ww = 1
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.daemon.bind, "127.0.0.1:9000");
        assert_eq!(config.device.charset().unwrap(), Some(Charset::Latin1));
        assert_eq!(config.device.query_suffix, QuerySuffix::Described);
        assert_eq!(config.device.language, Language::De);
        assert_eq!(config.device.name, "Pellematic");
        assert_eq!(config.components.get("hk"), Some(&2));
        assert_eq!(config.device.poller_config().interval, Duration::from_secs(60));
    }

    #[test]
    fn test_invalid_charset() {
        let config = Config {
            device: DeviceConfig {
                host: "http://device/pw".to_string(),
                charset: "ebcdic".to_string(),
                ..DeviceConfig::default()
            },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pellematic.toml");
        save_default_config(&path).unwrap();

        let config = load_config(&path).unwrap();
        config.validate().unwrap();
        assert_eq!(config.device.charset().unwrap(), None);
        assert_eq!(config.components.get("hk"), Some(&1));
    }

    #[test]
    fn test_redacted_hides_password() {
        let config = Config {
            device: DeviceConfig {
                host: "http://10.0.0.7:4321/secret".to_string(),
                ..DeviceConfig::default()
            },
            ..Config::default()
        };
        assert_eq!(config.redacted().device.host, "http://10.0.0.7:4321/***");
    }
}

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

pub fn build_api_url(host: &str, port: u16) -> String {
    format!("http://{host}:{port}")
}

/// Bridge configuration, usually read from a TOML file:
///
/// ```toml
/// scan_interval_secs = 30
///
/// [[devices]]
/// device_id = "pi-garage"
/// name = "Garage"
/// host = "192.168.1.40"
/// api_key = "secret"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

fn default_scan_interval() -> u64 {
    DEFAULT_SCAN_INTERVAL_SECS
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: DEFAULT_SCAN_INTERVAL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            devices: Vec::new(),
        }
    }
}

/// One device as written in the config file. Either `api_url` or `host`
/// (with optional `port`) locates it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    pub device_id: String,
    pub entry_id: Option<String>,
    pub name: Option<String>,
    pub api_url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    #[serde(default)]
    pub api_key: String,
}

/// A validated device connection description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    pub entry_id: String,
    pub device_id: String,
    pub title: String,
    pub api_url: String,
    pub api_key: String,
}

impl DeviceEntry {
    pub fn new(device_id: impl Into<String>, api_url: impl Into<String>) -> Self {
        let device_id = device_id.into();
        Self {
            entry_id: device_id.clone(),
            title: device_id.clone(),
            device_id,
            api_url: api_url.into(),
            api_key: String::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_entry_id(mut self, entry_id: impl Into<String>) -> Self {
        self.entry_id = entry_id.into();
        self
    }
}

impl BridgeConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: BridgeConfig =
            toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Resolve every configured device into a [`DeviceEntry`].
    pub fn entries(&self) -> Result<Vec<DeviceEntry>> {
        self.devices.iter().map(DeviceConfig::to_entry).collect()
    }

    fn validate(&self) -> Result<()> {
        if self.scan_interval_secs == 0 {
            return Err(Error::Config("scan_interval_secs must be positive".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config("request_timeout_secs must be positive".into()));
        }
        let entries = self.entries()?;
        for (i, entry) in entries.iter().enumerate() {
            if entries[..i].iter().any(|e| e.entry_id == entry.entry_id) {
                return Err(Error::Config(format!("duplicate entry id '{}'", entry.entry_id)));
            }
        }
        Ok(())
    }
}

impl DeviceConfig {
    pub fn to_entry(&self) -> Result<DeviceEntry> {
        let device_id = self.device_id.trim();
        if device_id.is_empty() {
            return Err(Error::Config("device_id must not be empty".into()));
        }
        let api_url = match (&self.api_url, &self.host) {
            (Some(url), None) => url.trim().trim_end_matches('/').to_string(),
            (None, Some(host)) => {
                build_api_url(host.trim(), self.port.unwrap_or(DEFAULT_PORT))
            }
            (Some(_), Some(_)) => {
                return Err(Error::Config(format!(
                    "device '{device_id}': set either api_url or host, not both"
                )));
            }
            (None, None) => {
                return Err(Error::Config(format!(
                    "device '{device_id}': api_url or host is required"
                )));
            }
        };

        let mut entry = DeviceEntry::new(device_id, api_url).with_api_key(self.api_key.trim());
        if let Some(entry_id) = &self.entry_id {
            entry = entry.with_entry_id(entry_id.as_str());
        }
        if let Some(name) = &self.name {
            entry = entry.with_title(name.as_str());
        }
        Ok(entry)
    }
}

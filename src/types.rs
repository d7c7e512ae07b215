use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Configuration sections the device exposes under `/api/config/{section}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSection {
    Mqtt,
    Devices,
    Covers,
    Sensors,
    Modbus,
    System,
}

impl ConfigSection {
    pub const ALL: [ConfigSection; 6] = [
        ConfigSection::Mqtt,
        ConfigSection::Devices,
        ConfigSection::Covers,
        ConfigSection::Sensors,
        ConfigSection::Modbus,
        ConfigSection::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigSection::Mqtt => "mqtt",
            ConfigSection::Devices => "devices",
            ConfigSection::Covers => "covers",
            ConfigSection::Sensors => "sensors",
            ConfigSection::Modbus => "modbus",
            ConfigSection::System => "system",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|section| section.as_str() == s)
    }
}

impl fmt::Display for ConfigSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered key sequence locating a value inside a [`Snapshot`].
pub type FieldPath = &'static [&'static str];

/// Walk `path` from `root`. Absent keys, non-object intermediates and JSON
/// `null` all read as `None`.
pub fn lookup<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = root;
    for key in path {
        current = current.as_object()?.get(*key)?;
    }
    match current {
        Value::Null => None,
        v => Some(v),
    }
}

/// The merged result of one refresh cycle.
///
/// `status` and `system_info` always come from the same cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    root: Value,
    fetched_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(status: Value, system_info: Value) -> Self {
        Self::at(status, system_info, Utc::now())
    }

    pub fn at(status: Value, system_info: Value, fetched_at: DateTime<Utc>) -> Self {
        let mut root = Map::new();
        root.insert("status".to_string(), status);
        root.insert("system_info".to_string(), system_info);
        Self {
            root: Value::Object(root),
            fetched_at,
        }
    }

    pub fn status(&self) -> &Value {
        &self.root["status"]
    }

    pub fn system_info(&self) -> &Value {
        &self.root["system_info"]
    }

    /// Both halves as one JSON object keyed `status` / `system_info`.
    pub fn as_value(&self) -> &Value {
        &self.root
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn get(&self, path: &[&str]) -> Option<&Value> {
        lookup(&self.root, path)
    }

    /// Firmware version reported by `system_info.version`.
    pub fn version(&self) -> Option<&str> {
        self.get(&["system_info", "version"]).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorDeviceClass {
    Temperature,
    DataSize,
    Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateClass {
    Measurement,
    TotalIncreasing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinarySensorDeviceClass {
    Connectivity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityCategory {
    Diagnostic,
    Config,
}

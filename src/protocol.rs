use serde_json::Value;

use crate::types::ConfigSection;
use crate::{Error, Result};

pub const API_STATUS: &str = "/api/status";
pub const API_SYSTEM_INFO: &str = "/api/system/info";
pub const API_CONFIG: &str = "/api/config";
pub const API_RELOAD: &str = "/api/config/reload";
pub const API_RESTART: &str = "/api/system/restart";
pub const API_DEVICES: &str = "/api/devices";

pub const API_KEY_HEADER: &str = "X-API-Key";

pub fn config_section_path(section: ConfigSection) -> String {
    format!("{API_CONFIG}/{}", section.as_str())
}

/// Parse a response body as JSON regardless of its declared content type.
/// An empty body is JSON `null`.
pub fn parse_body(body: &str) -> Result<Value> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|e| Error::Protocol(format!("invalid JSON body: {e}")))
}

/// `/api/devices` answers either a bare list or `{"devices": [...]}`.
pub fn normalize_devices(body: Value) -> Vec<Value> {
    match body {
        Value::Array(devices) => devices,
        Value::Object(mut map) => match map.remove("devices") {
            Some(Value::Array(devices)) => devices,
            _ => vec![],
        },
        _ => vec![],
    }
}

pub fn restart_required(body: &Value) -> bool {
    body.get("restart_required")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

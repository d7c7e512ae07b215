use std::sync::Arc;

use serde_json::Value;

use crate::coordinator::Coordinator;
use crate::entity::{DeviceIdentity, EntityBase};
use crate::types::{BinarySensorDeviceClass, EntityCategory, FieldPath};

const ON_STRINGS: &[&str] = &["true", "ok", "running", "active", "1"];

/// Declarative description of a module-state binary sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinarySensorDescription {
    pub key: &'static str,
    pub device_class: Option<BinarySensorDeviceClass>,
    pub entity_category: Option<EntityCategory>,
    pub path: FieldPath,
    pub icon_on: Option<&'static str>,
    pub icon_off: Option<&'static str>,
}

const fn module(key: &'static str, path: FieldPath) -> BinarySensorDescription {
    BinarySensorDescription {
        key,
        device_class: Some(BinarySensorDeviceClass::Connectivity),
        entity_category: Some(EntityCategory::Diagnostic),
        path,
        icon_on: None,
        icon_off: None,
    }
}

pub const BINARY_SENSORS: &[BinarySensorDescription] = &[
    module("module_mqtt", &["status", "modules", "mqtt"]),
    module("module_mcp", &["status", "modules", "mcp"]),
    module("module_gpio", &["status", "modules", "gpio"]),
    module("module_modbus", &["status", "modules", "modbus"]),
    module("module_ds18b20", &["status", "modules", "ds18b20"]),
    BinarySensorDescription {
        key: "overlay_active",
        device_class: None,
        entity_category: Some(EntityCategory::Diagnostic),
        path: &["system_info", "overlay_active"],
        icon_on: Some("mdi:shield-lock"),
        icon_off: Some("mdi:shield-lock-open"),
    },
];

/// Interpret a device value as on/off. `None` means unknown.
pub fn interpret_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(*b),
        Value::String(s) => {
            let s = s.to_lowercase();
            Some(ON_STRINGS.contains(&s.as_str()))
        }
        Value::Number(n) => Some(n.as_f64().is_some_and(|f| f != 0.0)),
        Value::Array(items) => Some(!items.is_empty()),
        Value::Object(map) => Some(!map.is_empty()),
    }
}

pub struct BinarySensor {
    base: EntityBase,
    description: &'static BinarySensorDescription,
}

impl BinarySensor {
    pub fn new(
        coordinator: Coordinator,
        description: &'static BinarySensorDescription,
        device: Arc<DeviceIdentity>,
    ) -> Self {
        Self {
            base: EntityBase::new(coordinator, device, description.key),
            description,
        }
    }

    pub fn all(coordinator: &Coordinator, device: &Arc<DeviceIdentity>) -> Vec<BinarySensor> {
        BINARY_SENSORS
            .iter()
            .map(|d| BinarySensor::new(coordinator.clone(), d, Arc::clone(device)))
            .collect()
    }

    pub fn description(&self) -> &'static BinarySensorDescription {
        self.description
    }

    pub fn is_on(&self) -> Option<bool> {
        self.base
            .read(self.description.path)
            .as_ref()
            .and_then(interpret_bool)
    }

    /// Custom icon for descriptions that define one.
    pub fn icon(&self) -> Option<&'static str> {
        let d = self.description;
        if d.icon_on.is_none() && d.icon_off.is_none() {
            return None;
        }
        if self.is_on() == Some(true) {
            d.icon_on
        } else {
            d.icon_off
        }
    }

    pub fn base(&self) -> &EntityBase {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut EntityBase {
        &mut self.base
    }
}

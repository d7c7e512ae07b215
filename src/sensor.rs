use std::sync::Arc;

use serde_json::Value;

use crate::coordinator::Coordinator;
use crate::entity::{DeviceIdentity, EntityBase};
use crate::types::{EntityCategory, FieldPath, SensorDeviceClass, StateClass};

/// Declarative description of a diagnostic sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorDescription {
    pub key: &'static str,
    pub unit: Option<&'static str>,
    pub device_class: Option<SensorDeviceClass>,
    pub state_class: Option<StateClass>,
    pub entity_category: Option<EntityCategory>,
    pub path: FieldPath,
}

pub const SENSORS: &[SensorDescription] = &[
    SensorDescription {
        key: "cpu_temperature",
        unit: Some("°C"),
        device_class: Some(SensorDeviceClass::Temperature),
        state_class: Some(StateClass::Measurement),
        entity_category: Some(EntityCategory::Diagnostic),
        path: &["system_info", "cpu_temp"],
    },
    SensorDescription {
        key: "ram_used",
        unit: Some("MB"),
        device_class: Some(SensorDeviceClass::DataSize),
        state_class: Some(StateClass::Measurement),
        entity_category: Some(EntityCategory::Diagnostic),
        path: &["system_info", "memory_used_mb"],
    },
    SensorDescription {
        key: "ram_total",
        unit: Some("MB"),
        device_class: Some(SensorDeviceClass::DataSize),
        state_class: Some(StateClass::Measurement),
        entity_category: Some(EntityCategory::Diagnostic),
        path: &["system_info", "memory_total_mb"],
    },
    SensorDescription {
        key: "uptime",
        unit: Some("s"),
        device_class: Some(SensorDeviceClass::Duration),
        state_class: Some(StateClass::TotalIncreasing),
        entity_category: Some(EntityCategory::Diagnostic),
        path: &["system_info", "uptime_seconds"],
    },
];

/// Numeric or text reading projected from the coordinator's snapshot.
pub struct Sensor {
    base: EntityBase,
    description: &'static SensorDescription,
}

impl Sensor {
    pub fn new(
        coordinator: Coordinator,
        description: &'static SensorDescription,
        device: Arc<DeviceIdentity>,
    ) -> Self {
        Self {
            base: EntityBase::new(coordinator, device, description.key),
            description,
        }
    }

    /// One sensor per entry in [`SENSORS`].
    pub fn all(coordinator: &Coordinator, device: &Arc<DeviceIdentity>) -> Vec<Sensor> {
        SENSORS
            .iter()
            .map(|d| Sensor::new(coordinator.clone(), d, Arc::clone(device)))
            .collect()
    }

    pub fn description(&self) -> &'static SensorDescription {
        self.description
    }

    /// The located value, unmodified. `None` means unknown.
    pub fn native_value(&self) -> Option<Value> {
        self.base.read(self.description.path)
    }

    pub fn base(&self) -> &EntityBase {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut EntityBase {
        &mut self.base
    }
}

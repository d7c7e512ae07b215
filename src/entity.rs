use std::sync::Arc;

use serde_json::Value;

use crate::coordinator::{Coordinator, SubscriptionId};
use crate::host::{DeviceInfo, MANUFACTURER, MODEL};
use crate::types::{lookup, Snapshot};
use crate::DOMAIN;

/// Identity of the device the views belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub device_id: String,
    pub name: String,
    pub api_url: String,
}

impl DeviceIdentity {
    pub fn new(
        device_id: impl Into<String>,
        name: impl Into<String>,
        api_url: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            name: name.into(),
            api_url: api_url.into(),
        }
    }

    /// Registry record, with the firmware version taken from `snapshot`.
    pub fn device_info(&self, snapshot: Option<&Snapshot>) -> DeviceInfo {
        DeviceInfo {
            identifiers: vec![(DOMAIN.to_string(), self.device_id.clone())],
            name: self.name.clone(),
            manufacturer: MANUFACTURER.to_string(),
            model: MODEL.to_string(),
            sw_version: snapshot.and_then(Snapshot::version).map(str::to_string),
            configuration_url: self.api_url.clone(),
        }
    }
}

/// State shared by every view attached to a coordinator: the device it
/// belongs to, its unique id and its observer subscription while mounted.
pub struct EntityBase {
    coordinator: Coordinator,
    device: Arc<DeviceIdentity>,
    unique_id: String,
    subscription: Option<SubscriptionId>,
}

impl EntityBase {
    pub fn new(coordinator: Coordinator, device: Arc<DeviceIdentity>, key: &str) -> Self {
        let unique_id = format!("{}_{key}", device.device_id);
        Self {
            coordinator,
            device,
            unique_id,
            subscription: None,
        }
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn device(&self) -> &DeviceIdentity {
        &self.device
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn device_info(&self) -> DeviceInfo {
        self.device.device_info(self.coordinator.snapshot().as_deref())
    }

    /// Available while the most recent refresh cycle succeeded.
    pub fn available(&self) -> bool {
        self.coordinator.last_update_success()
    }

    /// Read `path` from the last good snapshot.
    pub fn read(&self, path: &[&str]) -> Option<Value> {
        let snapshot = self.coordinator.snapshot()?;
        lookup(snapshot.as_value(), path).cloned()
    }

    /// Attach to the coordinator; `on_update` runs after every refresh cycle.
    /// Mounting twice replaces the previous subscription.
    pub fn mount(&mut self, on_update: impl Fn() + Send + Sync + 'static) {
        self.unmount();
        self.subscription = Some(self.coordinator.subscribe(on_update));
    }

    pub fn unmount(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.coordinator.unsubscribe(id);
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.subscription.is_some()
    }
}

impl Drop for EntityBase {
    fn drop(&mut self) {
        self.unmount();
    }
}

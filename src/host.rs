//! Narrow interfaces to the services the home-automation host provides.
//!
//! The bridge only ever talks to the host through [`Notifier`] and
//! [`DeviceRegistry`]. The in-memory implementations back the tests and the
//! monitor demo.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

pub const MANUFACTURER: &str = "Akari";
pub const MODEL: &str = "Akari";

/// Registry record describing one Akari device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// `(domain, device_id)` pairs identifying the device.
    pub identifiers: Vec<(String, String)>,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub sw_version: Option<String>,
    pub configuration_url: String,
}

pub trait Notifier: Send + Sync {
    /// Create or replace the persistent notification `notification_id`.
    fn notify(&self, title: &str, message: &str, notification_id: &str);
}

pub trait DeviceRegistry: Send + Sync {
    fn register_device(&self, info: &DeviceInfo);
}

/// Host collaborators handed to every device connection.
#[derive(Clone)]
pub struct HostServices {
    pub notifier: Arc<dyn Notifier>,
    pub registry: Arc<dyn DeviceRegistry>,
}

impl HostServices {
    pub fn new(notifier: Arc<dyn Notifier>, registry: Arc<dyn DeviceRegistry>) -> Self {
        Self { notifier, registry }
    }

    /// Services backed by [`MemoryNotifier`] and [`MemoryDeviceRegistry`].
    pub fn in_memory() -> (Self, Arc<MemoryNotifier>, Arc<MemoryDeviceRegistry>) {
        let notifier = Arc::new(MemoryNotifier::default());
        let registry = Arc::new(MemoryDeviceRegistry::default());
        let services = Self::new(notifier.clone(), registry.clone());
        (services, notifier, registry)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub notification_id: String,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Keeps notifications in memory, replacing any with the same id.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    notifications: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub fn notifications(&self) -> Vec<Notification> {
        self.lock().clone()
    }

    pub fn get(&self, notification_id: &str) -> Option<Notification> {
        self.lock()
            .iter()
            .find(|n| n.notification_id == notification_id)
            .cloned()
    }

    pub fn dismiss(&self, notification_id: &str) -> Option<Notification> {
        let mut notifications = self.lock();
        let idx = notifications
            .iter()
            .position(|n| n.notification_id == notification_id)?;
        Some(notifications.remove(idx))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Notification>> {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, title: &str, message: &str, notification_id: &str) {
        let notification = Notification {
            notification_id: notification_id.to_string(),
            title: title.to_string(),
            message: message.to_string(),
            created_at: Utc::now(),
        };
        let mut notifications = self.lock();
        match notifications
            .iter_mut()
            .find(|n| n.notification_id == notification_id)
        {
            Some(existing) => {
                debug!(notification_id, "updated notification");
                *existing = notification;
            }
            None => {
                info!(notification_id, "created notification");
                notifications.push(notification);
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryDeviceRegistry {
    devices: Mutex<Vec<DeviceInfo>>,
}

impl MemoryDeviceRegistry {
    pub fn devices(&self) -> Vec<DeviceInfo> {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DeviceRegistry for MemoryDeviceRegistry {
    fn register_device(&self, info: &DeviceInfo) {
        let mut devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
        match devices.iter_mut().find(|d| d.identifiers == info.identifiers) {
            Some(existing) => *existing = info.clone(),
            None => devices.push(info.clone()),
        }
    }
}

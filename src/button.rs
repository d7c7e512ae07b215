use std::sync::Arc;

use tracing::{debug, error};

use crate::coordinator::Coordinator;
use crate::entity::{DeviceIdentity, EntityBase};
use crate::host::Notifier;
use crate::Result;

pub const NOTIFICATION_TITLE: &str = "Akari Manager";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    /// Fire-and-forget service restart. No refresh: the device is about to go away.
    Restart,
    /// Hot-reload the config, then refresh so views pick up the result.
    ReloadConfig,
}

impl ButtonAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ButtonAction::Restart => "restart",
            ButtonAction::ReloadConfig => "reload",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonDescription {
    pub key: &'static str,
    pub action: ButtonAction,
    pub icon: &'static str,
}

pub const BUTTONS: &[ButtonDescription] = &[
    ButtonDescription {
        key: "restart_service",
        action: ButtonAction::Restart,
        icon: "mdi:restart",
    },
    ButtonDescription {
        key: "reload_config",
        action: ButtonAction::ReloadConfig,
        icon: "mdi:reload",
    },
];

/// Write adapter: calls the device and reports the outcome as a notification.
pub struct Button {
    base: EntityBase,
    description: &'static ButtonDescription,
    notifier: Arc<dyn Notifier>,
}

impl Button {
    pub fn new(
        coordinator: Coordinator,
        description: &'static ButtonDescription,
        device: Arc<DeviceIdentity>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            base: EntityBase::new(coordinator, device, description.key),
            description,
            notifier,
        }
    }

    pub fn all(
        coordinator: &Coordinator,
        device: &Arc<DeviceIdentity>,
        notifier: &Arc<dyn Notifier>,
    ) -> Vec<Button> {
        BUTTONS
            .iter()
            .map(|d| Button::new(coordinator.clone(), d, Arc::clone(device), Arc::clone(notifier)))
            .collect()
    }

    pub fn description(&self) -> &'static ButtonDescription {
        self.description
    }

    pub fn icon(&self) -> &'static str {
        self.description.icon
    }

    /// Run the action. Device errors never propagate: they are logged and
    /// shown to the user as a notification.
    pub async fn press(&self) {
        let device = self.base.device();
        let action = self.description.action;
        match self.execute().await {
            Ok(message) => {
                debug!(device_id = %device.device_id, action = action.as_str(), "action sent");
                self.notifier.notify(
                    NOTIFICATION_TITLE,
                    &message,
                    &format!("akari_{}_{}", device.device_id, action.as_str()),
                );
            }
            Err(e) => {
                error!(
                    device_id = %device.device_id,
                    action = action.as_str(),
                    error = %e,
                    "failed to execute action"
                );
                self.notifier.notify(
                    NOTIFICATION_TITLE,
                    &format!("Failed to execute {} on {}:\n{e}", action.as_str(), device.name),
                    &format!("akari_{}_{}_error", device.device_id, action.as_str()),
                );
            }
        }
    }

    async fn execute(&self) -> Result<String> {
        let coordinator = self.base.coordinator();
        let name = &self.base.device().name;
        match self.description.action {
            ButtonAction::Restart => {
                coordinator.client().restart().await?;
                Ok(format!("Restart command sent to {name}."))
            }
            ButtonAction::ReloadConfig => {
                coordinator.client().reload_config().await?;
                if let Err(e) = coordinator.request_refresh().await {
                    debug!(
                        device_id = %self.base.device().device_id,
                        error = %e,
                        "refresh after reload failed"
                    );
                }
                Ok(format!("Config reloaded on {name}."))
            }
        }
    }

    pub fn base(&self) -> &EntityBase {
        &self.base
    }
}

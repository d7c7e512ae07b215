//! Host services addressed to one loaded device by `entry_id`.
//!
//! Device failures never reach the caller: they are logged and surfaced as
//! notifications, like button presses.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::entry::DeviceConnection;
use crate::types::ConfigSection;
use crate::{Error, Result};

pub const SERVICE_GET_CONFIG_SECTION: &str = "get_config_section";
pub const SERVICE_UPDATE_CONFIG_SECTION: &str = "update_config_section";
pub const SERVICE_GET_DEVICES: &str = "get_devices";

pub const SERVICES: &[&str] = &[
    SERVICE_GET_CONFIG_SECTION,
    SERVICE_UPDATE_CONFIG_SECTION,
    SERVICE_GET_DEVICES,
];

const TITLE: &str = "Akari Manager";
const TITLE_CONFIG: &str = "Akari Manager: Config";
const TITLE_CONFIG_UPDATED: &str = "Akari Manager: Config Updated";
const TITLE_DEVICES: &str = "Akari Manager: Devices";

const RESTART_NOTICE: &str =
    "**Restart required** for changes to take effect. Use the Restart Service button.";

#[derive(Debug, Clone, PartialEq)]
pub enum ServiceCall {
    GetConfigSection {
        entry_id: String,
        section: ConfigSection,
    },
    UpdateConfigSection {
        entry_id: String,
        section: ConfigSection,
        data: Map<String, Value>,
    },
    GetDevices {
        entry_id: String,
    },
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SectionPayload {
    entry_id: String,
    section: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdatePayload {
    entry_id: String,
    section: String,
    data: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DevicesPayload {
    entry_id: String,
}

impl ServiceCall {
    /// Validate a raw call as the host delivers it: service name plus payload.
    pub fn parse(service: &str, payload: &Value) -> Result<Self> {
        match service {
            SERVICE_GET_CONFIG_SECTION => {
                let p: SectionPayload = decode(service, payload)?;
                Ok(ServiceCall::GetConfigSection {
                    section: section(&p.section)?,
                    entry_id: p.entry_id,
                })
            }
            SERVICE_UPDATE_CONFIG_SECTION => {
                let p: UpdatePayload = decode(service, payload)?;
                Ok(ServiceCall::UpdateConfigSection {
                    section: section(&p.section)?,
                    entry_id: p.entry_id,
                    data: p.data,
                })
            }
            SERVICE_GET_DEVICES => {
                let p: DevicesPayload = decode(service, payload)?;
                Ok(ServiceCall::GetDevices {
                    entry_id: p.entry_id,
                })
            }
            other => Err(Error::InvalidServiceCall(format!("unknown service '{other}'"))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServiceCall::GetConfigSection { .. } => SERVICE_GET_CONFIG_SECTION,
            ServiceCall::UpdateConfigSection { .. } => SERVICE_UPDATE_CONFIG_SECTION,
            ServiceCall::GetDevices { .. } => SERVICE_GET_DEVICES,
        }
    }

    pub fn entry_id(&self) -> &str {
        match self {
            ServiceCall::GetConfigSection { entry_id, .. }
            | ServiceCall::UpdateConfigSection { entry_id, .. }
            | ServiceCall::GetDevices { entry_id } => entry_id,
        }
    }

    /// Run the call against `connection` and post the outcome as a notification.
    pub(crate) async fn execute(&self, connection: &DeviceConnection) {
        let client = connection.coordinator().client();
        let notifier = &connection.host().notifier;
        let entry_id = self.entry_id();

        match self {
            ServiceCall::GetConfigSection { section, .. } => {
                match client.get_config_section(*section).await {
                    Ok(data) => notifier.notify(
                        TITLE_CONFIG,
                        &format!("**Config section: {section}**\n{}", json_block(&data)),
                        &format!("akari_{entry_id}_config_{section}"),
                    ),
                    Err(e) => {
                        error!(entry_id, %section, error = %e, "get_config_section failed");
                        notifier.notify(
                            TITLE,
                            &format!("Error reading config section '{section}':\n{e}"),
                            &format!("akari_{entry_id}_config_error"),
                        );
                    }
                }
            }
            ServiceCall::UpdateConfigSection { section, data, .. } => {
                let body = Value::Object(data.clone());
                match client.update_config_section(*section, &body).await {
                    Ok(update) => {
                        debug!(
                            entry_id,
                            %section,
                            restart_required = update.restart_required,
                            "config section updated"
                        );
                        let mut message =
                            format!("Config section '{section}' updated successfully.");
                        if update.restart_required {
                            message.push_str("\n\n");
                            message.push_str(RESTART_NOTICE);
                        }
                        notifier.notify(
                            TITLE_CONFIG_UPDATED,
                            &message,
                            &format!("akari_{entry_id}_updated_{section}"),
                        );
                    }
                    Err(e) => {
                        error!(entry_id, %section, error = %e, "update_config_section failed");
                        notifier.notify(
                            TITLE,
                            &format!("Error updating config section '{section}':\n{e}"),
                            &format!("akari_{entry_id}_update_error"),
                        );
                    }
                }
            }
            ServiceCall::GetDevices { .. } => match client.get_devices().await {
                Ok(devices) => notifier.notify(
                    TITLE_DEVICES,
                    &format!(
                        "**Devices on {entry_id}**\n{}",
                        json_block(&Value::Array(devices))
                    ),
                    &format!("akari_{entry_id}_devices"),
                ),
                Err(e) => {
                    error!(entry_id, error = %e, "get_devices failed");
                    notifier.notify(
                        TITLE,
                        &format!("Error fetching devices:\n{e}"),
                        &format!("akari_{entry_id}_devices_error"),
                    );
                }
            },
        }
    }
}

fn decode<T: DeserializeOwned>(service: &str, payload: &Value) -> Result<T> {
    T::deserialize(payload)
        .map_err(|e| Error::InvalidServiceCall(format!("{service}: {e}")))
}

fn section(name: &str) -> Result<ConfigSection> {
    ConfigSection::from_name(name).ok_or_else(|| {
        Error::InvalidServiceCall(format!("unknown config section '{name}'"))
    })
}

fn json_block(value: &Value) -> String {
    let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    format!("```json\n{pretty}\n```")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_get_config_section() {
        let call = ServiceCall::parse(
            "get_config_section",
            &json!({"entry_id": "e1", "section": "mqtt"}),
        )
        .unwrap();
        assert_eq!(
            call,
            ServiceCall::GetConfigSection {
                entry_id: "e1".into(),
                section: ConfigSection::Mqtt,
            }
        );
        assert_eq!(call.entry_id(), "e1");
        assert_eq!(call.name(), SERVICE_GET_CONFIG_SECTION);
    }

    #[test]
    fn update_requires_object_data() {
        let err = ServiceCall::parse(
            "update_config_section",
            &json!({"entry_id": "e1", "section": "system", "data": [1, 2]}),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidServiceCall(_)));

        let call = ServiceCall::parse(
            "update_config_section",
            &json!({"entry_id": "e1", "section": "system", "data": {"log_level": "debug"}}),
        )
        .unwrap();
        assert!(matches!(
            call,
            ServiceCall::UpdateConfigSection { section: ConfigSection::System, ref data, .. }
                if data["log_level"] == "debug"
        ));
    }

    #[test]
    fn unknown_section_rejected() {
        let err = ServiceCall::parse(
            "get_config_section",
            &json!({"entry_id": "e1", "section": "wifi"}),
        )
        .unwrap_err();
        assert_eq!(
            err,
            Error::InvalidServiceCall("unknown config section 'wifi'".into())
        );
    }

    #[test]
    fn missing_entry_id_rejected() {
        let err = ServiceCall::parse("get_devices", &json!({})).unwrap_err();
        assert!(matches!(err, Error::InvalidServiceCall(msg) if msg.starts_with("get_devices")));
    }

    #[test]
    fn unknown_service_rejected() {
        assert!(ServiceCall::parse("factory_reset", &json!({"entry_id": "e1"})).is_err());
    }
}

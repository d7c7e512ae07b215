use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, info, trace};

use crate::binary_sensor::BinarySensor;
use crate::button::Button;
use crate::client::{AkariClient, DEFAULT_REQUEST_TIMEOUT};
use crate::config::DeviceEntry;
use crate::coordinator::{Coordinator, SubscriptionId, DEFAULT_UPDATE_INTERVAL};
use crate::entity::DeviceIdentity;
use crate::host::HostServices;
use crate::sensor::Sensor;
use crate::Error;

/// Called with a view's unique id whenever the coordinator publishes.
pub type ViewListener = Arc<dyn Fn(&str) + Send + Sync>;

/// Why a device could not be set up.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SetupError {
    /// The device rejected the credential. Needs a new key, do not retry.
    #[error("authentication failed for {device_id}: {source}")]
    AuthFailed {
        device_id: String,
        #[source]
        source: Error,
    },
    /// The device is unreachable right now. Try again later.
    #[error("cannot connect to Akari at {api_url}: {source}")]
    NotReady {
        api_url: String,
        #[source]
        source: Error,
    },
    #[error("invalid entry {entry_id}: {source}")]
    Invalid {
        entry_id: String,
        #[source]
        source: Error,
    },
}

impl SetupError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SetupError::NotReady { .. })
    }
}

#[derive(Clone)]
pub struct SetupOptions {
    pub scan_interval: Duration,
    pub request_timeout: Duration,
    pub view_listener: Option<ViewListener>,
}

impl Default for SetupOptions {
    fn default() -> Self {
        Self {
            scan_interval: DEFAULT_UPDATE_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            view_listener: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub unique_id: String,
    pub key: &'static str,
    pub value: Option<Value>,
    pub unit: Option<&'static str>,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinarySensorReading {
    pub unique_id: String,
    pub key: &'static str,
    pub is_on: Option<bool>,
    pub icon: Option<&'static str>,
    pub available: bool,
}

struct MountedViews {
    sensors: Vec<Sensor>,
    binary_sensors: Vec<BinarySensor>,
}

/// One loaded device: its client, coordinator and mounted views.
pub struct DeviceConnection {
    entry: DeviceEntry,
    device: Arc<DeviceIdentity>,
    coordinator: Coordinator,
    host: HostServices,
    views: Mutex<Option<MountedViews>>,
    buttons: Vec<Button>,
    registry_subscription: Mutex<Option<SubscriptionId>>,
}

impl std::fmt::Debug for DeviceConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceConnection")
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl DeviceConnection {
    /// Build the client and coordinator for `entry`, run the first refresh,
    /// register the device, mount the views and start polling.
    ///
    /// `http` is the host-wide session; unloading never closes it.
    pub async fn setup(
        entry: DeviceEntry,
        http: reqwest::Client,
        host: HostServices,
        options: SetupOptions,
    ) -> Result<Self, SetupError> {
        let client = AkariClient::builder(&entry.api_url)
            .api_key(&entry.api_key)
            .timeout(options.request_timeout)
            .http_client(http)
            .build()
            .map_err(|source| SetupError::Invalid {
                entry_id: entry.entry_id.clone(),
                source,
            })?;

        let coordinator = Coordinator::new(
            client,
            format!("{}_{}", crate::DOMAIN, entry.device_id),
            options.scan_interval,
        );

        if let Err(source) = coordinator.first_refresh().await {
            coordinator.shutdown().await;
            return Err(if source.is_auth() {
                error!(device_id = %entry.device_id, error = %source, "authentication failed");
                SetupError::AuthFailed {
                    device_id: entry.device_id.clone(),
                    source,
                }
            } else {
                debug!(device_id = %entry.device_id, error = %source, "device not ready");
                SetupError::NotReady {
                    api_url: entry.api_url.clone(),
                    source,
                }
            });
        }

        let device = Arc::new(DeviceIdentity::new(
            &entry.device_id,
            &entry.title,
            &entry.api_url,
        ));
        host.registry
            .register_device(&device.device_info(coordinator.snapshot().as_deref()));

        let registry_subscription = {
            let registry = Arc::clone(&host.registry);
            let device = Arc::clone(&device);
            let snapshots = coordinator.watch_snapshot();
            let last_version = Mutex::new(
                coordinator
                    .snapshot()
                    .and_then(|s| s.version().map(str::to_string)),
            );
            coordinator.subscribe(move || {
                let Some(snapshot) = snapshots.borrow().clone() else {
                    return;
                };
                let version = snapshot.version().map(str::to_string);
                let mut last = last_version.lock().unwrap_or_else(PoisonError::into_inner);
                if *last != version {
                    debug!(device_id = %device.device_id, ?version, "firmware version changed");
                    registry.register_device(&device.device_info(Some(&snapshot)));
                    *last = version;
                }
            })
        };

        let buttons = Button::all(&coordinator, &device, &host.notifier);
        let connection = Self {
            views: Mutex::new(None),
            buttons,
            registry_subscription: Mutex::new(Some(registry_subscription)),
            entry,
            device,
            coordinator,
            host,
        };
        connection.mount_views(options.view_listener);
        connection.coordinator.start();

        info!(
            device_id = %connection.entry.device_id,
            api_url = %connection.entry.api_url,
            "Akari device set up"
        );
        Ok(connection)
    }

    fn mount_views(&self, listener: Option<ViewListener>) {
        let mut sensors = Sensor::all(&self.coordinator, &self.device);
        let mut binary_sensors = BinarySensor::all(&self.coordinator, &self.device);

        let bases = sensors
            .iter_mut()
            .map(Sensor::base_mut)
            .chain(binary_sensors.iter_mut().map(BinarySensor::base_mut));
        for base in bases {
            let unique_id = base.unique_id().to_string();
            let listener = listener.clone();
            base.mount(move || match &listener {
                Some(listener) => listener(&unique_id),
                None => trace!(%unique_id, "view invalidated"),
            });
        }

        *self.views() = Some(MountedViews {
            sensors,
            binary_sensors,
        });
    }

    /// Tear the device down: unmount views, stop polling, drop any in-flight
    /// refresh. The shared HTTP session stays open.
    pub async fn unload(&self) {
        self.views().take();
        let subscription = self
            .registry_subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(id) = subscription {
            self.coordinator.unsubscribe(id);
        }
        self.coordinator.shutdown().await;
        info!(device_id = %self.entry.device_id, "Akari device unloaded");
    }

    pub fn entry(&self) -> &DeviceEntry {
        &self.entry
    }

    pub fn device(&self) -> &DeviceIdentity {
        &self.device
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub(crate) fn host(&self) -> &HostServices {
        &self.host
    }

    pub fn buttons(&self) -> &[Button] {
        &self.buttons
    }

    pub fn button(&self, key: &str) -> Option<&Button> {
        self.buttons.iter().find(|b| b.description().key == key)
    }

    pub fn sensor_readings(&self) -> Vec<SensorReading> {
        let views = self.views();
        let Some(views) = views.as_ref() else {
            return Vec::new();
        };
        views
            .sensors
            .iter()
            .map(|s| SensorReading {
                unique_id: s.base().unique_id().to_string(),
                key: s.description().key,
                value: s.native_value(),
                unit: s.description().unit,
                available: s.base().available(),
            })
            .collect()
    }

    pub fn binary_sensor_readings(&self) -> Vec<BinarySensorReading> {
        let views = self.views();
        let Some(views) = views.as_ref() else {
            return Vec::new();
        };
        views
            .binary_sensors
            .iter()
            .map(|b| BinarySensorReading {
                unique_id: b.base().unique_id().to_string(),
                key: b.description().key,
                is_on: b.is_on(),
                icon: b.icon(),
                available: b.base().available(),
            })
            .collect()
    }

    fn views(&self) -> std::sync::MutexGuard<'_, Option<MountedViews>> {
        self.views.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub mod binary_sensor;
mod bridge;
pub mod button;
mod client;
pub mod config;
mod coordinator;
mod diff;
pub mod entity;
mod entry;
mod error;
pub mod host;
mod logger;
mod protocol;
pub mod sensor;
pub mod services;
mod types;

/// Integration domain, used in device identifiers.
pub const DOMAIN: &str = "akari_manager";

pub use bridge::Bridge;
pub use client::{AkariClient, AkariClientBuilder, SectionUpdate, DEFAULT_REQUEST_TIMEOUT};
pub use config::{BridgeConfig, DeviceEntry};
pub use coordinator::{Coordinator, RefreshState, SubscriptionId, DEFAULT_UPDATE_INTERVAL};
pub use entry::{
    BinarySensorReading, DeviceConnection, SensorReading, SetupError, SetupOptions, ViewListener,
};
pub use error::{Error, Result};
pub use host::{DeviceRegistry, HostServices, Notifier};
pub use logger::MessageLogMode;
pub use protocol::normalize_devices;
pub use services::ServiceCall;
pub use types::*;

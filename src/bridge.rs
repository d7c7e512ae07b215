use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{BridgeConfig, DeviceEntry};
use crate::entry::{DeviceConnection, SetupError, SetupOptions, ViewListener};
use crate::host::HostServices;
use crate::services::ServiceCall;
use crate::{Error, Result};

/// Owns every loaded device and the HTTP session they share.
///
/// Host services are available while at least one device is loaded.
pub struct Bridge {
    http: reqwest::Client,
    host: HostServices,
    options: SetupOptions,
    connections: Mutex<HashMap<String, Arc<DeviceConnection>>>,
}

impl Bridge {
    pub fn new(http: reqwest::Client, host: HostServices, options: SetupOptions) -> Self {
        Self {
            http,
            host,
            options,
            connections: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &BridgeConfig, host: HostServices) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        let options = SetupOptions {
            scan_interval: config.scan_interval(),
            request_timeout: config.request_timeout(),
            view_listener: None,
        };
        Ok(Self::new(http, host, options))
    }

    /// Callback handed to the views of devices set up from now on.
    pub fn set_view_listener(&mut self, listener: ViewListener) {
        self.options.view_listener = Some(listener);
    }

    pub fn host(&self) -> &HostServices {
        &self.host
    }

    /// Set up `entry` and keep it loaded. A loaded entry with the same id is
    /// replaced only once the new connection is up; if setup fails the old one
    /// stays loaded.
    pub async fn setup_entry(
        &self,
        entry: DeviceEntry,
    ) -> std::result::Result<Arc<DeviceConnection>, SetupError> {
        let entry_id = entry.entry_id.clone();
        let connection = Arc::new(
            DeviceConnection::setup(
                entry,
                self.http.clone(),
                self.host.clone(),
                self.options.clone(),
            )
            .await?,
        );

        let (previous, first) = {
            let mut connections = self.connections();
            let previous = connections.insert(entry_id.clone(), Arc::clone(&connection));
            let first = previous.is_none() && connections.len() == 1;
            (previous, first)
        };
        if let Some(previous) = previous {
            debug!(%entry_id, "replacing loaded entry");
            previous.unload().await;
        }
        if first {
            info!("Akari services registered");
        }
        Ok(connection)
    }

    /// Set up every device in `config`, logging the ones that fail.
    pub async fn setup_all(&self, config: &BridgeConfig) -> Result<Vec<(String, SetupError)>> {
        let mut failures = Vec::new();
        for entry in config.entries()? {
            let entry_id = entry.entry_id.clone();
            if let Err(e) = self.setup_entry(entry).await {
                warn!(%entry_id, error = %e, retryable = e.is_retryable(), "setup failed");
                failures.push((entry_id, e));
            }
        }
        Ok(failures)
    }

    /// Unload `entry_id`. Returns false if it was not loaded.
    pub async fn unload_entry(&self, entry_id: &str) -> bool {
        let Some(connection) = self.remove(entry_id) else {
            return false;
        };
        connection.unload().await;
        if !self.services_registered() {
            info!("last Akari entry unloaded, services removed");
        }
        true
    }

    pub async fn unload_all(&self) {
        let connections: Vec<_> = self.connections().drain().map(|(_, c)| c).collect();
        for connection in connections {
            connection.unload().await;
        }
    }

    pub fn services_registered(&self) -> bool {
        !self.connections().is_empty()
    }

    pub fn connection(&self, entry_id: &str) -> Option<Arc<DeviceConnection>> {
        self.connections().get(entry_id).cloned()
    }

    pub fn entry_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.connections().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Dispatch a validated service call to its device.
    pub async fn call_service(&self, call: &ServiceCall) -> Result<()> {
        if !self.services_registered() {
            return Err(Error::InvalidServiceCall(format!(
                "service '{}' is not registered",
                call.name()
            )));
        }
        let connection = self
            .connection(call.entry_id())
            .ok_or_else(|| Error::UnknownEntry(call.entry_id().to_string()))?;
        debug!(service = call.name(), entry_id = call.entry_id(), "service called");
        call.execute(&connection).await;
        Ok(())
    }

    /// Parse and dispatch a raw call.
    pub async fn handle_service(&self, service: &str, payload: &Value) -> Result<()> {
        let call = ServiceCall::parse(service, payload)?;
        self.call_service(&call).await
    }

    fn remove(&self, entry_id: &str) -> Option<Arc<DeviceConnection>> {
        self.connections().remove(entry_id)
    }

    fn connections(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<DeviceConnection>>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

use std::sync::{Arc, Mutex};
use std::time::Duration;

use akari_manager::host::{MemoryDeviceRegistry, MemoryNotifier};
use akari_manager::{
    Bridge, DeviceEntry, Error, HostServices, ServiceCall, SetupError, SetupOptions,
};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    bridge: Bridge,
    notifier: Arc<MemoryNotifier>,
    registry: Arc<MemoryDeviceRegistry>,
}

fn harness() -> Harness {
    let (host, notifier, registry) = HostServices::in_memory();
    let options = SetupOptions {
        scan_interval: Duration::from_secs(3600),
        request_timeout: Duration::from_secs(2),
        view_listener: None,
    };
    Harness {
        bridge: Bridge::new(reqwest::Client::new(), host, options),
        notifier,
        registry,
    }
}

fn entry(server: &MockServer) -> DeviceEntry {
    DeviceEntry::new("pi-1", server.uri())
        .with_title("Garage")
        .with_entry_id("e1")
        .with_api_key("k")
}

async fn mount_device(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/status"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"modules": {"mqtt": "running"}})),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/system/info"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"version": "1.4.0", "cpu_temp": 51.0})),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn setup_registers_device_and_services() {
    let server = MockServer::start().await;
    mount_device(&server).await;
    let h = harness();
    assert!(!h.bridge.services_registered());

    let connection = h.bridge.setup_entry(entry(&server)).await.unwrap();
    assert!(h.bridge.services_registered());
    assert_eq!(h.bridge.entry_ids(), vec!["e1".to_string()]);

    let devices = h.registry.devices();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].name, "Garage");
    assert_eq!(devices[0].manufacturer, "Akari");
    assert_eq!(devices[0].sw_version.as_deref(), Some("1.4.0"));
    assert_eq!(
        devices[0].identifiers,
        vec![("akari_manager".to_string(), "pi-1".to_string())]
    );

    let cpu = connection
        .sensor_readings()
        .into_iter()
        .find(|r| r.key == "cpu_temperature")
        .unwrap();
    assert_eq!(cpu.unique_id, "pi-1_cpu_temperature");
    assert_eq!(cpu.value, Some(json!(51.0)));
    assert_eq!(cpu.unit, Some("°C"));
    assert!(cpu.available);

    let mqtt = connection
        .binary_sensor_readings()
        .into_iter()
        .find(|r| r.key == "module_mqtt")
        .unwrap();
    assert_eq!(mqtt.is_on, Some(true));

    let coordinator = connection.coordinator().clone();
    assert!(coordinator.observer_count() > 0);
    assert!(h.bridge.unload_entry("e1").await);
    assert!(!h.bridge.unload_entry("e1").await);
    assert!(!h.bridge.services_registered());
    assert!(coordinator.is_shut_down());
    assert_eq!(coordinator.observer_count(), 0);
    assert!(connection.sensor_readings().is_empty());
}

#[tokio::test]
async fn unauthorized_first_refresh_aborts_setup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    let h = harness();

    let err = h.bridge.setup_entry(entry(&server)).await.unwrap_err();
    assert!(matches!(err, SetupError::AuthFailed { ref device_id, .. } if device_id == "pi-1"));
    assert!(!err.is_retryable());
    assert!(!h.bridge.services_registered());
    assert!(h.registry.devices().is_empty());
}

#[tokio::test]
async fn unreachable_device_is_not_ready() {
    let h = harness();
    let entry = DeviceEntry::new("pi-2", "http://127.0.0.1:1");

    let err = h.bridge.setup_entry(entry).await.unwrap_err();
    assert!(matches!(err, SetupError::NotReady { .. }), "{err:?}");
    assert!(err.is_retryable());
    assert!(!h.bridge.services_registered());
}

#[tokio::test]
async fn reload_button_refreshes_before_next_tick() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"modules": {}})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/system/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"version": "1.0.0"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/system/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"version": "1.1.0"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/config/reload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;
    let h = harness();
    let connection = h.bridge.setup_entry(entry(&server)).await.unwrap();
    assert_eq!(connection.coordinator().snapshot().unwrap().version(), Some("1.0.0"));

    connection.button("reload_config").unwrap().press().await;

    assert_eq!(connection.coordinator().snapshot().unwrap().version(), Some("1.1.0"));
    let note = h.notifier.get("akari_pi-1_reload").unwrap();
    assert_eq!(note.message, "Config reloaded on Garage.");
    assert_eq!(note.title, "Akari Manager");
    assert_eq!(h.registry.devices()[0].sw_version.as_deref(), Some("1.1.0"));

    h.bridge.unload_all().await;
}

#[tokio::test]
async fn failed_restart_becomes_notification() {
    let server = MockServer::start().await;
    mount_device(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/system/restart"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let h = harness();
    let connection = h.bridge.setup_entry(entry(&server)).await.unwrap();

    let button = connection.button("restart_service").unwrap();
    assert_eq!(button.icon(), "mdi:restart");
    button.press().await;

    assert!(h.notifier.get("akari_pi-1_restart").is_none());
    let note = h.notifier.get("akari_pi-1_restart_error").unwrap();
    assert!(
        note.message.starts_with("Failed to execute restart on Garage:\n"),
        "{}",
        note.message
    );

    h.bridge.unload_all().await;
}

#[tokio::test]
async fn restart_button_sends_command() {
    let server = MockServer::start().await;
    mount_device(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/system/restart"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    let h = harness();
    let connection = h.bridge.setup_entry(entry(&server)).await.unwrap();

    connection.button("restart_service").unwrap().press().await;
    assert_eq!(
        h.notifier.get("akari_pi-1_restart").unwrap().message,
        "Restart command sent to Garage."
    );

    h.bridge.unload_all().await;
}

#[tokio::test]
async fn update_section_notification_mentions_restart_only_when_required() {
    let server = MockServer::start().await;
    mount_device(&server).await;
    Mock::given(method("PUT"))
        .and(path("/api/config/mqtt"))
        .and(body_json(json!({"broker": "10.0.0.9"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"restart_required": true})),
        )
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/config/system"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"restart_required": false})),
        )
        .mount(&server)
        .await;
    let h = harness();
    h.bridge.setup_entry(entry(&server)).await.unwrap();

    h.bridge
        .handle_service(
            "update_config_section",
            &json!({"entry_id": "e1", "section": "mqtt", "data": {"broker": "10.0.0.9"}}),
        )
        .await
        .unwrap();
    let mqtt = h.notifier.get("akari_e1_updated_mqtt").unwrap();
    assert!(mqtt.message.starts_with("Config section 'mqtt' updated successfully."));
    assert!(mqtt.message.contains("**Restart required**"));

    h.bridge
        .handle_service(
            "update_config_section",
            &json!({"entry_id": "e1", "section": "system", "data": {"log_level": "info"}}),
        )
        .await
        .unwrap();
    let system = h.notifier.get("akari_e1_updated_system").unwrap();
    assert_eq!(system.message, "Config section 'system' updated successfully.");

    h.bridge.unload_all().await;
}

#[tokio::test]
async fn get_services_post_results_and_errors() {
    let server = MockServer::start().await;
    mount_device(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"devices": [{"id": "d1"}]})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/config/modbus"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/config/mqtt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"port": 1883})))
        .mount(&server)
        .await;
    let h = harness();
    h.bridge.setup_entry(entry(&server)).await.unwrap();

    h.bridge
        .handle_service("get_devices", &json!({"entry_id": "e1"}))
        .await
        .unwrap();
    let devices = h.notifier.get("akari_e1_devices").unwrap();
    assert!(devices.message.starts_with("**Devices on e1**"));
    assert!(devices.message.contains("\"d1\""));

    h.bridge
        .handle_service("get_config_section", &json!({"entry_id": "e1", "section": "mqtt"}))
        .await
        .unwrap();
    let mqtt = h.notifier.get("akari_e1_config_mqtt").unwrap();
    assert!(mqtt.message.contains("1883"));

    h.bridge
        .handle_service("get_config_section", &json!({"entry_id": "e1", "section": "modbus"}))
        .await
        .unwrap();
    let err = h.notifier.get("akari_e1_config_error").unwrap();
    assert!(err.message.starts_with("Error reading config section 'modbus':\n"));

    h.bridge.unload_all().await;
}

#[tokio::test]
async fn service_calls_validate_entry() {
    let server = MockServer::start().await;
    mount_device(&server).await;
    let h = harness();

    let call = ServiceCall::GetDevices {
        entry_id: "e1".into(),
    };
    assert!(matches!(
        h.bridge.call_service(&call).await,
        Err(Error::InvalidServiceCall(_))
    ));

    h.bridge.setup_entry(entry(&server)).await.unwrap();
    let missing = ServiceCall::GetDevices {
        entry_id: "nope".into(),
    };
    assert_eq!(
        h.bridge.call_service(&missing).await,
        Err(Error::UnknownEntry("nope".into()))
    );
    assert!(matches!(
        h.bridge
            .handle_service("get_config_section", &json!({"entry_id": "e1", "section": "wifi"}))
            .await,
        Err(Error::InvalidServiceCall(_))
    ));

    h.bridge.unload_all().await;
    assert!(!h.bridge.services_registered());
}

#[tokio::test]
async fn view_listener_hears_each_refresh() {
    let server = MockServer::start().await;
    mount_device(&server).await;
    let (host, _notifier, _registry) = HostServices::in_memory();
    let mut bridge = Bridge::new(
        reqwest::Client::new(),
        host,
        SetupOptions {
            scan_interval: Duration::from_secs(3600),
            ..SetupOptions::default()
        },
    );
    let heard = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = heard.clone();
    bridge.set_view_listener(Arc::new(move |unique_id: &str| {
        sink.lock().unwrap().push(unique_id.to_string());
    }));

    let connection = bridge.setup_entry(entry(&server)).await.unwrap();
    assert!(heard.lock().unwrap().is_empty());

    connection.coordinator().request_refresh().await.unwrap();
    let heard = heard.lock().unwrap().clone();
    assert!(heard.contains(&"pi-1_cpu_temperature".to_string()));
    assert!(heard.contains(&"pi-1_module_mqtt".to_string()));
    assert!(!heard.iter().any(|id| id.contains("restart")));

    bridge.unload_all().await;
}

#[tokio::test]
async fn failed_resetup_keeps_loaded_entry() {
    let server = MockServer::start().await;
    mount_device(&server).await;
    let h = harness();
    let original = h.bridge.setup_entry(entry(&server)).await.unwrap();

    let unreachable = DeviceEntry::new("pi-1", "http://127.0.0.1:1").with_entry_id("e1");
    let err = h.bridge.setup_entry(unreachable).await.unwrap_err();
    assert!(err.is_retryable());

    let loaded = h.bridge.connection("e1").unwrap();
    assert!(Arc::ptr_eq(&loaded, &original));
    assert!(!original.coordinator().is_shut_down());
    assert!(!original.sensor_readings().is_empty());

    h.bridge.unload_all().await;
}

#[tokio::test]
async fn resetup_replaces_and_unloads_previous() {
    let server = MockServer::start().await;
    mount_device(&server).await;
    let h = harness();
    let original = h.bridge.setup_entry(entry(&server)).await.unwrap();

    let replacement = h
        .bridge
        .setup_entry(entry(&server).with_title("Garage Pi"))
        .await
        .unwrap();

    assert_eq!(h.bridge.entry_ids(), vec!["e1".to_string()]);
    assert!(original.coordinator().is_shut_down());
    assert!(!replacement.coordinator().is_shut_down());
    assert_eq!(h.registry.devices()[0].name, "Garage Pi");

    h.bridge.unload_all().await;
}

#[tokio::test]
async fn dropping_bridge_without_unload_stops_polling() {
    let server = MockServer::start().await;
    mount_device(&server).await;
    let (host, _notifier, _registry) = HostServices::in_memory();
    let bridge = Bridge::new(
        reqwest::Client::new(),
        host,
        SetupOptions {
            scan_interval: Duration::from_millis(50),
            ..SetupOptions::default()
        },
    );
    let connection = bridge.setup_entry(entry(&server)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;

    drop(connection);
    drop(bridge);
    tokio::time::sleep(Duration::from_millis(100)).await;
    let settled = server.received_requests().await.unwrap().len();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.received_requests().await.unwrap().len(), settled);
}

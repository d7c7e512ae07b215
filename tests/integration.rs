use std::time::Duration;

use akari_manager::host::HostServices;
use akari_manager::{Bridge, DeviceEntry, SetupOptions};

/// Run with:
///   AKARI_URL=http://<pi>:8080 AKARI_API_KEY=<key> \
///     cargo test --test integration -- --ignored
/// Requires a reachable Akari device.
#[tokio::test]
#[ignore]
async fn setup_refresh_unload() {
    let url = std::env::var("AKARI_URL").expect("AKARI_URL must be set");
    let key = std::env::var("AKARI_API_KEY").unwrap_or_default();

    let (host, _notifier, registry) = HostServices::in_memory();
    let bridge = Bridge::new(
        reqwest::Client::new(),
        host,
        SetupOptions {
            scan_interval: Duration::from_secs(5),
            ..SetupOptions::default()
        },
    );

    let connection = bridge
        .setup_entry(DeviceEntry::new("live", url).with_api_key(key))
        .await
        .expect("setup failed");

    let snapshot = connection.coordinator().snapshot().expect("no snapshot after setup");
    assert!(snapshot.status().is_object(), "status should be an object");
    assert!(snapshot.system_info().is_object(), "system info should be an object");
    assert_eq!(registry.devices().len(), 1);

    for reading in connection.sensor_readings() {
        println!("{} = {:?} {}", reading.key, reading.value, reading.unit.unwrap_or(""));
    }

    connection
        .coordinator()
        .request_refresh()
        .await
        .expect("refresh failed");

    assert!(bridge.unload_entry("live").await);
}

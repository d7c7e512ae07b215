use std::env;
use std::sync::Arc;

use akari_manager::host::HostServices;
use akari_manager::{Bridge, BridgeConfig};

#[tokio::main]
async fn main() -> akari_manager::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let Some(config_path) = args.get(1) else {
        eprintln!("usage: monitor <config.toml>");
        std::process::exit(2);
    };

    let config = BridgeConfig::load(config_path)?;
    let (host, notifier, _registry) = HostServices::in_memory();
    let mut bridge = Bridge::from_config(&config, host)?;
    bridge.set_view_listener(Arc::new(|unique_id: &str| {
        tracing::trace!(unique_id, "view updated");
    }));

    println!("Setting up {} device(s)...", config.devices.len());
    for (entry_id, error) in bridge.setup_all(&config).await? {
        let hint = if error.is_retryable() { "device unreachable" } else { "check api_key" };
        eprintln!("[{entry_id}] setup failed ({hint}): {error}");
    }
    if !bridge.services_registered() {
        eprintln!("No device could be set up.");
        std::process::exit(1);
    }

    let mut watchers = Vec::new();
    for entry_id in bridge.entry_ids() {
        let Some(connection) = bridge.connection(&entry_id) else {
            continue;
        };
        let mut snapshots = connection.coordinator().watch_snapshot();
        watchers.push(tokio::spawn(async move {
            loop {
                let name = &connection.device().name;
                let available = connection.coordinator().last_update_success();
                println!("[{name}] {}", if available { "online" } else { "unavailable" });
                for r in connection.sensor_readings() {
                    match r.value {
                        Some(v) => println!("  {:<16} {v} {}", r.key, r.unit.unwrap_or("")),
                        None => println!("  {:<16} unknown", r.key),
                    }
                }
                for r in connection.binary_sensor_readings() {
                    let state = match r.is_on {
                        Some(true) => "on",
                        Some(false) => "off",
                        None => "unknown",
                    };
                    println!("  {:<16} {state}", r.key);
                }
                if snapshots.changed().await.is_err() {
                    break;
                }
            }
        }));
    }

    println!("Polling. Ctrl-C to stop.");
    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("Cannot listen for Ctrl-C: {e}");
    }

    bridge.unload_all().await;
    for watcher in watchers {
        watcher.abort();
    }
    for note in notifier.notifications() {
        println!("{}: {}", note.title, note.message);
    }
    Ok(())
}

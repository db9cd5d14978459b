//! Keep a drone connected and print its property changes.
//!
//! Run with (device address optional):
//!   cargo run --example telemetry --features peer -- 192.168.42.1

use std::sync::Arc;

use arnet::catalog::Catalog;
use arnet::peer::{
    AttachOptions, DeviceEvent, DeviceManager, ManagerConfig, ManagerEvent, NetworkConnector,
    DEFAULT_HOST, DEFAULT_PORT,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let host = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_HOST.to_string());
    let catalog = Arc::new(Catalog::embedded()?);

    let (mut manager, mut events) = DeviceManager::new(ManagerConfig::default());
    manager.attach(
        NetworkConnector::new(host, DEFAULT_PORT, catalog),
        AttachOptions::default(),
    )?;

    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => event,
        };
        let Some(event) = event else { break };

        match event {
            ManagerEvent::Connected { uid, mut device } => {
                eprintln!("{uid}: connected");
                // Each device is drained on its own task.
                tokio::spawn(async move {
                    while let Some(event) = device.next_event().await {
                        if let DeviceEvent::PropertyChanged { change, .. } = event {
                            println!(
                                "{} = {}",
                                change.property,
                                serde_json::to_string(&change.value).unwrap_or_default()
                            );
                        }
                    }
                });
            }
            ManagerEvent::Error { uid, error } => eprintln!("{uid}: {error}"),
            other => eprintln!("{}: {:?}", other.uid(), other),
        }
    }

    manager.shutdown().await;
    Ok(())
}

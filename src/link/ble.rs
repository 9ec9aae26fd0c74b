//! Host Bluetooth backend built on btleplug

use super::transport::{DeviceHandle, Inbound, Transport, TransportFault};
use crate::protocol::GattProfile;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures_util::StreamExt;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

fn backend(e: btleplug::Error) -> TransportFault {
    TransportFault::Backend(Box::new(e))
}

async fn first_adapter() -> Result<Adapter, TransportFault> {
    let manager = Manager::new()
        .await
        .map_err(|e| TransportFault::Unavailable(e.to_string()))?;
    let adapters = manager
        .adapters()
        .await
        .map_err(|e| TransportFault::Unavailable(e.to_string()))?;
    adapters
        .into_iter()
        .next()
        .ok_or_else(|| TransportFault::Unavailable("no Bluetooth adapter found".to_string()))
}

async fn advertises(peripheral: &Peripheral, service: Uuid) -> bool {
    match peripheral.properties().await {
        Ok(Some(props)) => props.services.contains(&service),
        _ => false,
    }
}

/// Scans the first local adapter for pads
pub struct BleTransport {
    scan_timeout: Duration,
}

impl BleTransport {
    pub fn new(scan_timeout: Duration) -> Self {
        Self { scan_timeout }
    }
}

impl Transport for BleTransport {
    type Device = BlePeripheral;

    async fn request_device(&self, profile: &GattProfile) -> Result<BlePeripheral, TransportFault> {
        let adapter = first_adapter().await?;
        let mut events = adapter.events().await.map_err(backend)?;

        tracing::info!("Scanning for service {}", profile.service);
        adapter
            .start_scan(ScanFilter {
                services: vec![profile.service],
            })
            .await
            .map_err(backend)?;

        let service = profile.service;
        let found = tokio::time::timeout(self.scan_timeout, async {
            while let Some(event) = events.next().await {
                let CentralEvent::DeviceDiscovered(id) = event else {
                    continue;
                };
                let peripheral = match adapter.peripheral(&id).await {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::debug!("Discovered peripheral vanished: {}", e);
                        continue;
                    }
                };
                if advertises(&peripheral, service).await {
                    return Some(peripheral);
                }
            }
            None
        })
        .await;

        if let Err(e) = adapter.stop_scan().await {
            tracing::warn!("Failed to stop scan: {}", e);
        }

        let peripheral = found
            .ok()
            .flatten()
            .ok_or(TransportFault::DeviceNotFound(profile.service))?;
        let name = peripheral
            .properties()
            .await
            .ok()
            .flatten()
            .and_then(|props| props.local_name);

        tracing::info!("Found pad {:?}", name);
        Ok(BlePeripheral {
            adapter,
            peripheral,
            name,
            tx: Mutex::new(None),
            pump: Mutex::new(None),
        })
    }
}

/// A pad found by [`BleTransport`]
pub struct BlePeripheral {
    adapter: Adapter,
    peripheral: Peripheral,
    name: Option<String>,
    tx: Mutex<Option<Characteristic>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl BlePeripheral {
    async fn stop_pump(&self) {
        if let Some(handle) = self.pump.lock().await.take() {
            handle.abort();
        }
    }
}

impl DeviceHandle for BlePeripheral {
    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    async fn open(
        &self,
        profile: &GattProfile,
    ) -> Result<mpsc::UnboundedReceiver<Inbound>, TransportFault> {
        if !self.peripheral.is_connected().await.map_err(backend)? {
            self.peripheral.connect().await.map_err(backend)?;
        }
        self.peripheral.discover_services().await.map_err(backend)?;

        let characteristics = self.peripheral.characteristics();
        let find = |uuid: Uuid| {
            characteristics
                .iter()
                .find(|c| c.uuid == uuid)
                .cloned()
                .ok_or(TransportFault::MissingCharacteristic(uuid))
        };
        let tx = find(profile.tx_characteristic)?;
        let rx = find(profile.rx_characteristic)?;

        self.peripheral.subscribe(&rx).await.map_err(backend)?;
        let mut notifications = self.peripheral.notifications().await.map_err(backend)?;
        let mut central_events = self.adapter.events().await.map_err(backend)?;

        *self.tx.lock().await = Some(tx);
        self.stop_pump().await;

        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.peripheral.id();
        let rx_uuid = rx.uuid;
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(n) = notifications.next() => {
                        if n.uuid == rx_uuid && sender.send(Inbound::Notification(n.value)).is_err() {
                            break;
                        }
                    }
                    Some(event) = central_events.next() => {
                        if matches!(event, CentralEvent::DeviceDisconnected(ref gone) if *gone == id) {
                            let _ = sender.send(Inbound::Closed);
                            break;
                        }
                    }
                    else => {
                        let _ = sender.send(Inbound::Closed);
                        break;
                    }
                }
            }
        });
        *self.pump.lock().await = Some(handle);

        Ok(receiver)
    }

    async fn write(&self, byte: u8) -> Result<(), TransportFault> {
        let tx = self
            .tx
            .lock()
            .await
            .clone()
            .ok_or(TransportFault::Disconnected)?;
        self.peripheral
            .write(&tx, &[byte], WriteType::WithResponse)
            .await
            .map_err(backend)
    }

    async fn close(&self) -> Result<(), TransportFault> {
        self.stop_pump().await;
        *self.tx.lock().await = None;
        if self.peripheral.is_connected().await.map_err(backend)? {
            self.peripheral.disconnect().await.map_err(backend)?;
        }
        Ok(())
    }
}

//! In-process simulated pad, used by tests and `--simulate`

use super::transport::{DeviceHandle, Inbound, Transport, TransportFault};
use crate::protocol::{GattProfile, TAP_BYTE};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct SimState {
    name: Option<String>,
    hidden: bool,
    connected: bool,
    sender: Option<mpsc::UnboundedSender<Inbound>>,
    written: Vec<u8>,
    fail_next_open: bool,
    fail_writes: bool,
    open_delay: Option<Duration>,
    open_count: usize,
}

/// A fake peripheral with test controls
///
/// Clones share state, so a test can keep one clone while the link owns another.
#[derive(Debug, Clone, Default)]
pub struct SimPeripheral {
    state: Arc<Mutex<SimState>>,
}

impl SimPeripheral {
    pub fn new(name: impl Into<String>) -> Self {
        let peripheral = Self::default();
        peripheral.lock().name = Some(name.into());
        peripheral
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push a notification payload; returns false when nothing is connected
    pub fn notify(&self, payload: &[u8]) -> bool {
        let state = self.lock();
        match (&state.sender, state.connected) {
            (Some(sender), true) => sender.send(Inbound::Notification(payload.to_vec())).is_ok(),
            _ => false,
        }
    }

    pub fn tap(&self) -> bool {
        self.notify(&[TAP_BYTE])
    }

    /// The pad closes the link on its own
    pub fn drop_connection(&self) {
        let mut state = self.lock();
        state.connected = false;
        if let Some(sender) = state.sender.take() {
            let _ = sender.send(Inbound::Closed);
        }
    }

    /// Stop advertising so discovery finds nothing
    pub fn set_hidden(&self, hidden: bool) {
        self.lock().hidden = hidden;
    }

    pub fn fail_next_open(&self) {
        self.lock().fail_next_open = true;
    }

    /// Make the next `open` finish only after `delay`, as a slow service discovery would
    pub fn delay_next_open(&self, delay: Duration) {
        self.lock().open_delay = Some(delay);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Bytes written to the TX characteristic, oldest first
    pub fn written(&self) -> Vec<u8> {
        self.lock().written.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    pub fn open_count(&self) -> usize {
        self.lock().open_count
    }
}

impl DeviceHandle for SimPeripheral {
    fn name(&self) -> Option<String> {
        self.lock().name.clone()
    }

    async fn open(
        &self,
        _profile: &GattProfile,
    ) -> Result<mpsc::UnboundedReceiver<Inbound>, TransportFault> {
        let delay = {
            let mut state = self.lock();
            if state.fail_next_open {
                state.fail_next_open = false;
                return Err(TransportFault::Backend("simulated GATT failure".into()));
            }
            state.open_count += 1;
            tracing::debug!("Simulated pad opened (#{})", state.open_count);
            state.open_delay.take()
        };

        let (sender, receiver) = mpsc::unbounded_channel();
        {
            let mut state = self.lock();
            state.sender = Some(sender);
            state.connected = true;
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(receiver)
    }

    async fn write(&self, byte: u8) -> Result<(), TransportFault> {
        let mut state = self.lock();
        if !state.connected {
            return Err(TransportFault::Disconnected);
        }
        if state.fail_writes {
            return Err(TransportFault::Backend("simulated write failure".into()));
        }
        state.written.push(byte);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportFault> {
        let mut state = self.lock();
        state.connected = false;
        state.sender = None;
        Ok(())
    }
}

/// Transport that always discovers the same simulated pad
#[derive(Debug, Clone)]
pub struct SimTransport {
    peripheral: SimPeripheral,
    powered: bool,
}

impl SimTransport {
    pub fn new(peripheral: SimPeripheral) -> Self {
        Self {
            peripheral,
            powered: true,
        }
    }

    /// A transport whose adapter is missing
    pub fn unpowered() -> Self {
        Self {
            peripheral: SimPeripheral::default(),
            powered: false,
        }
    }

    pub fn peripheral(&self) -> &SimPeripheral {
        &self.peripheral
    }
}

impl Transport for SimTransport {
    type Device = SimPeripheral;

    async fn request_device(&self, profile: &GattProfile) -> Result<SimPeripheral, TransportFault> {
        if !self.powered {
            return Err(TransportFault::Unavailable(
                "simulated adapter is powered off".to_string(),
            ));
        }
        if self.peripheral.lock().hidden {
            return Err(TransportFault::DeviceNotFound(profile.service));
        }
        Ok(self.peripheral.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_write_close() {
        let pad = SimPeripheral::new("Pad-1");
        let _rx = pad.open(&GattProfile::default()).await.unwrap();

        pad.write(2).await.unwrap();
        assert_eq!(pad.written(), vec![2]);

        pad.close().await.unwrap();
        assert!(!pad.is_connected());
        assert!(matches!(pad.write(0).await, Err(TransportFault::Disconnected)));
    }

    #[tokio::test]
    async fn test_drop_connection_sends_closed() {
        let pad = SimPeripheral::new("Pad-1");
        let mut rx = pad.open(&GattProfile::default()).await.unwrap();

        assert!(pad.tap());
        pad.drop_connection();

        assert_eq!(rx.recv().await, Some(Inbound::Notification(vec![TAP_BYTE])));
        assert_eq!(rx.recv().await, Some(Inbound::Closed));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_hidden_pad_is_not_found() {
        let pad = SimPeripheral::new("Pad-1");
        pad.set_hidden(true);
        let transport = SimTransport::new(pad);

        let result = transport.request_device(&GattProfile::default()).await;
        assert!(matches!(result, Err(TransportFault::DeviceNotFound(_))));
    }
}

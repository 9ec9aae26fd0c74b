//! Device link - one logical connection to a tap pad
//!
//! The link owns the connection lifecycle and publishes [`LinkEvent`]s on a
//! broadcast channel. Any number of subscribers may listen; dropping the
//! receiver unsubscribes.

#[cfg(feature = "bluetooth")]
mod ble;
mod sim;
mod transport;

#[cfg(feature = "bluetooth")]
pub use ble::{BlePeripheral, BleTransport};
pub use sim::{SimPeripheral, SimTransport};
pub use transport::{BoxError, DeviceHandle, Inbound, Transport, TransportFault};

use crate::protocol::{GattProfile, Notification, Pattern};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Capacity of the event broadcast; slow subscribers see `Lagged`
const EVENT_CAPACITY: usize = 64;

/// Device link errors
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Bluetooth is not supported here: {0}")]
    UnsupportedPlatform(String),

    #[error("Connection failed: {0}")]
    Connection(#[source] TransportFault),

    #[error("Device not connected")]
    NotConnected,

    #[error("No device to reconnect to")]
    NoDevice,

    #[error("Transport error: {0}")]
    Transport(#[source] TransportFault),

    #[error("A connection attempt is already in progress")]
    Busy,
}

impl LinkError {
    /// Remediation hint shown to the user next to the error
    pub fn hint(&self) -> &'static str {
        match self {
            LinkError::UnsupportedPlatform(_) => platform_hint(),
            LinkError::Connection(TransportFault::DeviceNotFound(_)) => {
                "No pad found. Make sure it is powered on, in range and not paired elsewhere."
            }
            LinkError::Connection(_) => "Move closer to the pad and try connecting again.",
            LinkError::NotConnected => "Connect to a pad from the home screen first.",
            LinkError::NoDevice => "Reconnect needs a pad that was connected before. Connect first.",
            LinkError::Transport(_) => "The link dropped or the write failed. Try reconnecting.",
            LinkError::Busy => "Wait for the current connection attempt to finish.",
        }
    }

    fn from_discovery(fault: TransportFault) -> Self {
        match fault {
            TransportFault::Unavailable(reason) => LinkError::UnsupportedPlatform(reason),
            other => LinkError::Connection(other),
        }
    }
}

fn platform_hint() -> &'static str {
    if cfg!(target_os = "linux") {
        "Start bluetoothd, power the adapter on (bluetoothctl power on) and check D-Bus access."
    } else if cfg!(target_os = "macos") {
        "Allow Bluetooth for your terminal in System Settings > Privacy & Security > Bluetooth."
    } else if cfg!(target_os = "windows") {
        "Turn Bluetooth on in Settings > Bluetooth & devices."
    } else {
        "No Bluetooth backend exists for this platform. Run with --simulate."
    }
}

/// Events published by the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    ConnectionChanged {
        connected: bool,
        device_name: Option<String>,
    },
    /// The pad reported a tap
    Tap,
}

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl LinkState {
    pub fn is_busy(&self) -> bool {
        matches!(self, LinkState::Connecting | LinkState::Reconnecting)
    }
}

/// Snapshot for status widgets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStatus {
    pub connected: bool,
    /// Name of the last discovered device, kept across disconnects
    pub device_name: Option<String>,
}

struct LinkInner<D> {
    state: LinkState,
    device: Option<Arc<D>>,
    /// Bumped whenever a connection is opened or torn down; signals tagged
    /// with an older epoch are ignored
    epoch: u64,
    pump: Option<JoinHandle<()>>,
}

type Shared<D> = Arc<Mutex<LinkInner<D>>>;

fn lock<D>(inner: &Shared<D>) -> MutexGuard<'_, LinkInner<D>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns exactly one connection to a pad
pub struct DeviceLink<T: Transport> {
    transport: T,
    profile: GattProfile,
    inner: Shared<T::Device>,
    /// Serializes writes so pattern bytes leave in call order
    write_gate: tokio::sync::Mutex<()>,
    events: broadcast::Sender<LinkEvent>,
}

impl<T: Transport> DeviceLink<T> {
    pub fn new(transport: T, profile: GattProfile) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            transport,
            profile,
            inner: Arc::new(Mutex::new(LinkInner {
                state: LinkState::Disconnected,
                device: None,
                epoch: 0,
                pump: None,
            })),
            write_gate: tokio::sync::Mutex::new(()),
            events,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Subscribe to connection and tap events
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> LinkState {
        lock(&self.inner).state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    pub fn status(&self) -> LinkStatus {
        let inner = lock(&self.inner);
        LinkStatus {
            connected: inner.state == LinkState::Connected,
            device_name: inner.device.as_ref().and_then(|d| d.name()),
        }
    }

    /// Discover a pad, open it and subscribe to taps
    ///
    /// Returns the advertised device name. An existing connection is closed first.
    pub async fn connect(&self) -> Result<Option<String>, LinkError> {
        let (attempt, previous) = {
            let mut inner = lock(&self.inner);
            if inner.state.is_busy() {
                return Err(LinkError::Busy);
            }
            let previous = (inner.state == LinkState::Connected)
                .then(|| inner.device.clone())
                .flatten();
            if let Some(pump) = inner.pump.take() {
                pump.abort();
            }
            inner.state = LinkState::Connecting;
            inner.epoch += 1;
            (inner.epoch, previous)
        };

        if let Some(device) = previous {
            if let Err(e) = device.close().await {
                tracing::warn!("Failed to close previous connection: {}", e);
            }
        }

        tracing::info!("Requesting device for service {}", self.profile.service);
        let device = match self.transport.request_device(&self.profile).await {
            Ok(device) => Arc::new(device),
            Err(fault) => return Err(self.fail_attempt(attempt, LinkError::from_discovery(fault))),
        };
        {
            let mut inner = lock(&self.inner);
            if inner.epoch == attempt {
                inner.device = Some(Arc::clone(&device));
            }
        }

        let signals = match device.open(&self.profile).await {
            Ok(signals) => signals,
            Err(fault) => return Err(self.fail_attempt(attempt, LinkError::Connection(fault))),
        };

        let name = device.name();
        self.finish_attempt(attempt, &device, signals)
            .await
            .map_err(LinkError::Connection)?;

        tracing::info!("Connected to {:?}", name);
        self.publish_connection(true, name.clone());
        Ok(name)
    }

    /// Tear the connection down; always ends disconnected and notifies subscribers
    pub async fn disconnect(&self) {
        let (device, was_connected) = {
            let mut inner = lock(&self.inner);
            let was_connected = inner.state == LinkState::Connected;
            inner.epoch += 1;
            inner.state = LinkState::Disconnected;
            if let Some(pump) = inner.pump.take() {
                pump.abort();
            }
            (inner.device.clone(), was_connected)
        };

        if let (Some(device), true) = (device, was_connected) {
            match device.close().await {
                Ok(()) => tracing::info!("Disconnected from device"),
                Err(e) => tracing::warn!("Error while disconnecting: {}", e),
            }
        }

        self.publish_connection(false, None);
    }

    /// Write a pattern byte to the pad
    pub async fn send_pattern(&self, pattern: Pattern) -> Result<(), LinkError> {
        let _gate = self.write_gate.lock().await;

        let device = {
            let inner = lock(&self.inner);
            match (&inner.device, inner.state) {
                (Some(device), LinkState::Connected) => Arc::clone(device),
                _ => return Err(LinkError::NotConnected),
            }
        };

        device.write(pattern.byte()).await.map_err(|e| {
            tracing::error!("Failed to send pattern {:?}: {}", pattern, e);
            LinkError::Transport(e)
        })?;

        tracing::debug!("Sent pattern {} to device", pattern.byte());
        Ok(())
    }

    /// Re-open the previously discovered device without scanning
    pub async fn reconnect(&self) -> Result<(), LinkError> {
        let (attempt, device) = {
            let mut inner = lock(&self.inner);
            if inner.state.is_busy() {
                return Err(LinkError::Busy);
            }
            let device = inner.device.clone().ok_or(LinkError::NoDevice)?;
            if let Some(pump) = inner.pump.take() {
                pump.abort();
            }
            inner.state = LinkState::Reconnecting;
            inner.epoch += 1;
            (inner.epoch, device)
        };

        tracing::info!("Reconnecting...");
        let signals = match device.open(&self.profile).await {
            Ok(signals) => signals,
            Err(fault) => return Err(self.fail_attempt(attempt, LinkError::Transport(fault))),
        };

        self.finish_attempt(attempt, &device, signals)
            .await
            .map_err(LinkError::Transport)?;

        tracing::info!("Reconnected successfully");
        self.publish_connection(true, device.name());
        Ok(())
    }

    /// Mark an attempt connected and start its signal pump, unless it went stale
    async fn finish_attempt(
        &self,
        attempt: u64,
        device: &Arc<T::Device>,
        signals: mpsc::UnboundedReceiver<Inbound>,
    ) -> Result<(), TransportFault> {
        let orphaned = {
            let mut inner = lock(&self.inner);
            if inner.epoch == attempt {
                inner.state = LinkState::Connected;
                inner.pump = Some(tokio::spawn(pump_signals(
                    Arc::clone(&self.inner),
                    self.events.clone(),
                    attempt,
                    signals,
                )));
                return Ok(());
            }
            // disconnect() ran while we were connecting. A newer attempt may
            // already own the peripheral; only an idle link leaves it orphaned.
            inner.state == LinkState::Disconnected
        };

        if orphaned {
            if let Err(e) = device.close().await {
                tracing::warn!("Failed to close stale connection: {}", e);
            }
        } else {
            tracing::debug!("Stale connection attempt {} dropped", attempt);
        }
        Err(TransportFault::Disconnected)
    }

    fn fail_attempt(&self, attempt: u64, error: LinkError) -> LinkError {
        tracing::error!("Connection attempt failed: {}", error);
        let current = {
            let mut inner = lock(&self.inner);
            let current = inner.epoch == attempt;
            if current {
                inner.state = LinkState::Disconnected;
            }
            current
        };
        if current {
            self.publish_connection(false, None);
        }
        error
    }

    fn publish_connection(&self, connected: bool, device_name: Option<String>) {
        // No subscribers is fine
        let _ = self.events.send(LinkEvent::ConnectionChanged {
            connected,
            device_name,
        });
    }
}

/// Forward inbound signals of one connection until it closes
async fn pump_signals<D: DeviceHandle>(
    inner: Shared<D>,
    events: broadcast::Sender<LinkEvent>,
    epoch: u64,
    mut signals: mpsc::UnboundedReceiver<Inbound>,
) {
    while let Some(signal) = signals.recv().await {
        if lock(&inner).epoch != epoch {
            return;
        }
        match signal {
            Inbound::Notification(payload) => match Notification::decode(&payload) {
                Notification::Tap => {
                    tracing::debug!("Tap received");
                    let _ = events.send(LinkEvent::Tap);
                }
                Notification::Unknown(byte) => {
                    tracing::debug!("Ignoring notification byte {}", byte);
                }
                Notification::Empty => tracing::debug!("Ignoring empty notification"),
            },
            Inbound::Closed => break,
        }
    }

    // Closed, or the transport dropped its sender
    let torn_down = {
        let mut inner = lock(&inner);
        if inner.epoch == epoch {
            inner.epoch += 1;
            inner.state = LinkState::Disconnected;
            inner.pump = None;
            true
        } else {
            false
        }
    };
    if torn_down {
        tracing::info!("Device disconnected");
        let _ = events.send(LinkEvent::ConnectionChanged {
            connected: false,
            device_name: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim_link() -> (DeviceLink<SimTransport>, SimPeripheral) {
        let pad = SimPeripheral::new("Pad-1");
        let link = DeviceLink::new(SimTransport::new(pad.clone()), GattProfile::default());
        (link, pad)
    }

    #[tokio::test]
    async fn test_connect_reports_name_and_state() {
        let (link, pad) = sim_link();
        let mut events = link.subscribe();

        let name = link.connect().await.unwrap();

        assert_eq!(name.as_deref(), Some("Pad-1"));
        assert_eq!(link.state(), LinkState::Connected);
        assert!(pad.is_connected());
        assert_eq!(
            events.recv().await.unwrap(),
            LinkEvent::ConnectionChanged {
                connected: true,
                device_name: Some("Pad-1".into())
            }
        );
    }

    #[tokio::test]
    async fn test_unpowered_adapter_is_unsupported() {
        let link = DeviceLink::new(SimTransport::unpowered(), GattProfile::default());
        let err = link.connect().await.unwrap_err();
        assert!(matches!(err, LinkError::UnsupportedPlatform(_)));
        assert!(!err.hint().is_empty());
    }

    #[tokio::test]
    async fn test_send_without_connection() {
        let (link, pad) = sim_link();
        let err = link.send_pattern(Pattern::Chance).await.unwrap_err();
        assert!(matches!(err, LinkError::NotConnected));
        assert!(pad.written().is_empty());
    }

    #[tokio::test]
    async fn test_reconnect_without_device() {
        let (link, _pad) = sim_link();
        assert!(matches!(link.reconnect().await, Err(LinkError::NoDevice)));
    }

    #[tokio::test]
    async fn test_disconnect_when_idle_still_notifies() {
        let (link, _pad) = sim_link();
        let mut events = link.subscribe();

        link.disconnect().await;

        assert_eq!(
            events.recv().await.unwrap(),
            LinkEvent::ConnectionChanged {
                connected: false,
                device_name: None
            }
        );
        assert_eq!(link.state(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn test_status_keeps_last_device_name() {
        let (link, _pad) = sim_link();
        link.connect().await.unwrap();
        link.disconnect().await;

        let status = link.status();
        assert!(!status.connected);
        assert_eq!(status.device_name.as_deref(), Some("Pad-1"));
    }
}

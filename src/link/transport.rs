//! Transport seam between the device link and a concrete BLE stack

use crate::protocol::GattProfile;
use std::future::Future;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures reported by a transport backend
#[derive(Debug, Error)]
pub enum TransportFault {
    #[error("Bluetooth is unavailable: {0}")]
    Unavailable(String),

    #[error("No peripheral advertising service {0} was found")]
    DeviceNotFound(Uuid),

    #[error("Characteristic {0} not found on peripheral")]
    MissingCharacteristic(Uuid),

    #[error("Peripheral is not connected")]
    Disconnected,

    #[error("Bluetooth backend error: {0}")]
    Backend(#[source] BoxError),
}

/// Signals delivered from an open connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Notification payload from the RX characteristic
    Notification(Vec<u8>),
    /// The peripheral closed the connection
    Closed,
}

/// Finds peripherals
pub trait Transport: Send + Sync + 'static {
    type Device: DeviceHandle;

    /// Discover one peripheral advertising `profile.service`
    fn request_device(
        &self,
        profile: &GattProfile,
    ) -> impl Future<Output = Result<Self::Device, TransportFault>> + Send;
}

/// A discovered peripheral that can be (re)opened
///
/// The handle outlives individual connections so the link can reconnect
/// without scanning again.
pub trait DeviceHandle: Send + Sync + 'static {
    /// Advertised name, if any
    fn name(&self) -> Option<String>;

    /// Connect, locate both characteristics and subscribe to notifications.
    ///
    /// The returned receiver yields notifications until the connection closes.
    /// Calling `open` on an already-open handle replaces the previous receiver.
    fn open(
        &self,
        profile: &GattProfile,
    ) -> impl Future<Output = Result<mpsc::UnboundedReceiver<Inbound>, TransportFault>> + Send;

    /// Write one byte to the TX characteristic
    fn write(&self, byte: u8) -> impl Future<Output = Result<(), TransportFault>> + Send;

    /// Close the connection if it is open
    fn close(&self) -> impl Future<Output = Result<(), TransportFault>> + Send;
}

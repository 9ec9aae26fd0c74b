//! Wire protocol for the tap pad peripheral
//!
//! The peripheral exposes one GATT service with two characteristics:
//! - TX (write): a single byte selecting the light/vibration pattern
//! - RX (notify): a single byte signalling a tap on the pad

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Primary service advertised by the pad
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdef0);

/// Outbound characteristic (central writes pattern bytes)
pub const TX_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdef1);

/// Inbound characteristic (peripheral notifies taps)
pub const RX_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdef2);

/// Notification byte the pad sends for a tap
pub const TAP_BYTE: u8 = 1;

/// Protocol-specific errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unknown pattern byte: {0}")]
    UnknownPattern(u8),
}

/// The set of identifiers needed to talk to a pad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GattProfile {
    pub service: Uuid,
    pub tx_characteristic: Uuid,
    pub rx_characteristic: Uuid,
}

impl Default for GattProfile {
    fn default() -> Self {
        Self {
            service: SERVICE_UUID,
            tx_characteristic: TX_CHARACTERISTIC_UUID,
            rx_characteristic: RX_CHARACTERISTIC_UUID,
        }
    }
}

/// Pattern commands written to the TX characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Pattern {
    Normal = 0,
    Chance = 1,
    Pinch = 2,
}

impl Pattern {
    pub const ALL: [Pattern; 3] = [Pattern::Normal, Pattern::Chance, Pattern::Pinch];

    /// The single byte put on the wire
    pub fn byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Pattern {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Pattern::Normal),
            1 => Ok(Pattern::Chance),
            2 => Ok(Pattern::Pinch),
            other => Err(ProtocolError::UnknownPattern(other)),
        }
    }
}

/// Decoded inbound notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// The pad was tapped
    Tap,
    /// A byte the pad sent that has no meaning yet
    Unknown(u8),
    /// Zero-length payload
    Empty,
}

impl Notification {
    /// Decode a notification payload. Only the first byte is significant.
    pub fn decode(payload: &[u8]) -> Self {
        match payload.first() {
            Some(&TAP_BYTE) => Notification::Tap,
            Some(&other) => Notification::Unknown(other),
            None => Notification::Empty,
        }
    }
}

/// Kind of a logged event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Tap,
    Chance,
    Pinch,
    Normal,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Tap => "tap",
            EventType::Chance => "chance",
            EventType::Pinch => "pinch",
            EventType::Normal => "normal",
        }
    }
}

/// Status signals the operator sends from the spectating screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusSignal {
    Normal,
    Chance,
    Pinch,
}

impl StatusSignal {
    pub const ALL: [StatusSignal; 3] = [
        StatusSignal::Normal,
        StatusSignal::Chance,
        StatusSignal::Pinch,
    ];

    pub fn pattern(self) -> Pattern {
        match self {
            StatusSignal::Normal => Pattern::Normal,
            StatusSignal::Chance => Pattern::Chance,
            StatusSignal::Pinch => Pattern::Pinch,
        }
    }

    pub fn event_type(self) -> EventType {
        match self {
            StatusSignal::Normal => EventType::Normal,
            StatusSignal::Chance => EventType::Chance,
            StatusSignal::Pinch => EventType::Pinch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_bytes() {
        assert_eq!(Pattern::Normal.byte(), 0);
        assert_eq!(Pattern::Chance.byte(), 1);
        assert_eq!(Pattern::Pinch.byte(), 2);
    }

    #[test]
    fn test_pattern_from_byte() {
        for pattern in Pattern::ALL {
            assert_eq!(Pattern::try_from(pattern.byte()), Ok(pattern));
        }
        assert_eq!(Pattern::try_from(7), Err(ProtocolError::UnknownPattern(7)));
    }

    #[test]
    fn test_decode_notification() {
        assert_eq!(Notification::decode(&[1]), Notification::Tap);
        assert_eq!(Notification::decode(&[1, 9]), Notification::Tap);
        assert_eq!(Notification::decode(&[0]), Notification::Unknown(0));
        assert_eq!(Notification::decode(&[]), Notification::Empty);
    }

    #[test]
    fn test_status_signal_mapping() {
        assert_eq!(StatusSignal::Chance.pattern(), Pattern::Chance);
        assert_eq!(StatusSignal::Pinch.event_type(), EventType::Pinch);
        assert_eq!(StatusSignal::Normal.pattern().byte(), 0);
    }

    #[test]
    fn test_event_type_serializes_lowercase() {
        let json = serde_json::to_string(&EventType::Chance).unwrap();
        assert_eq!(json, "\"chance\"");
    }

    #[test]
    fn test_default_profile_uuids() {
        let profile = GattProfile::default();
        assert_eq!(
            profile.service.to_string(),
            "12345678-1234-5678-1234-56789abcdef0"
        );
        assert_eq!(
            profile.rx_characteristic.to_string(),
            "12345678-1234-5678-1234-56789abcdef2"
        );
    }
}

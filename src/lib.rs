//! spectator - record spectating sessions from a BLE tap pad
//!
//! This crate provides the core functionality for spectator, including:
//! - The device link (one connection to one pad, broadcast events)
//! - The session controller (operator intent to link writes and store records)
//! - The persistent store of sessions and events
//! - History views and the terminal UI
//!
//! # Architecture
//!
//! The pad exposes one GATT service. The central writes single pattern bytes
//! to it and receives single tap bytes back. Everything else is local:
//! sessions and events are JSON arrays in a key-value backend.

pub mod client;
pub mod config;
pub mod format;
pub mod history;
pub mod link;
pub mod protocol;
pub mod session;
pub mod store;

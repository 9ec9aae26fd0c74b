//! Session controller - binds operator intent to the link and the store

use crate::link::{DeviceLink, LinkError, Transport};
use crate::protocol::{EventType, StatusSignal};
use crate::store::{Backend, DataStore, Event, Session, StoreError};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Connect to a device before starting a session")]
    NotConnected,

    #[error("No active session")]
    NoActiveSession,

    #[error("Session {0} is already running")]
    AlreadyActive(String),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Counters for the running session, as shown on the spectating screen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCounts {
    pub tap: u64,
    pub chance: u64,
    pub pinch: u64,
    pub normal: u64,
}

impl SessionCounts {
    fn bump(&mut self, event_type: EventType) {
        match event_type {
            EventType::Tap => self.tap += 1,
            EventType::Chance => self.chance += 1,
            EventType::Pinch => self.pinch += 1,
            EventType::Normal => self.normal += 1,
        }
    }
}

/// Starts, feeds and ends spectating sessions
pub struct SessionController<T: Transport, B: Backend> {
    link: Arc<DeviceLink<T>>,
    store: DataStore<B>,
    current: Option<Session>,
    counts: SessionCounts,
}

impl<T: Transport, B: Backend> SessionController<T, B> {
    pub fn new(link: Arc<DeviceLink<T>>, store: DataStore<B>) -> Self {
        Self {
            link,
            store,
            current: None,
            counts: SessionCounts::default(),
        }
    }

    /// The session being recorded, if any
    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    pub fn counts(&self) -> SessionCounts {
        self.counts
    }

    /// Begin a session on the connected device
    pub fn start_session(&mut self) -> Result<Session, SessionError> {
        if let Some(session) = &self.current {
            return Err(SessionError::AlreadyActive(session.id.clone()));
        }

        let status = self.link.status();
        if !status.connected {
            return Err(SessionError::NotConnected);
        }

        let session = self.store.create_session(status.device_name)?;
        tracing::info!("Session {} started", session.id);
        self.current = Some(session.clone());
        self.counts = SessionCounts::default();
        Ok(session)
    }

    /// Send a status pattern to the pad and record it once the write succeeds
    pub async fn record_status(&mut self, signal: StatusSignal) -> Result<Event, SessionError> {
        let session_id = self.active_id()?;

        self.link.send_pattern(signal.pattern()).await?;

        let event_type = signal.event_type();
        let event = self
            .store
            .log_event(&session_id, event_type, serde_json::json!({}))?;
        self.counts.bump(event_type);
        Ok(event)
    }

    /// Record a tap reported by the pad
    pub fn record_tap(&mut self) -> Result<Event, SessionError> {
        let session_id = self.active_id()?;

        let event = self
            .store
            .log_event(&session_id, EventType::Tap, serde_json::json!({}))?;
        self.counts.bump(EventType::Tap);
        Ok(event)
    }

    /// Complete the running session and clear it
    pub fn end_session(&mut self) -> Result<Session, SessionError> {
        let session_id = self.active_id()?;

        let ended = self.store.end_session(&session_id)?;
        self.current = None;
        self.counts = SessionCounts::default();

        // The record can only be missing if the store was cleared underneath us
        let ended = ended.ok_or(SessionError::NoActiveSession)?;
        tracing::info!("Session {} ended", ended.id);
        Ok(ended)
    }

    fn active_id(&self) -> Result<String, SessionError> {
        self.current
            .as_ref()
            .map(|s| s.id.clone())
            .ok_or(SessionError::NoActiveSession)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{SimPeripheral, SimTransport};
    use crate::protocol::GattProfile;
    use crate::store::MemoryBackend;

    fn controller() -> (
        SessionController<SimTransport, MemoryBackend>,
        Arc<DeviceLink<SimTransport>>,
    ) {
        let pad = SimPeripheral::new("Pad-1");
        let link = Arc::new(DeviceLink::new(
            SimTransport::new(pad),
            GattProfile::default(),
        ));
        let store = DataStore::new(MemoryBackend::new());
        (SessionController::new(Arc::clone(&link), store), link)
    }

    #[test]
    fn test_start_requires_connection() {
        let (mut controller, _link) = controller();
        assert!(matches!(
            controller.start_session(),
            Err(SessionError::NotConnected)
        ));
        assert!(controller.current().is_none());
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let (mut controller, link) = controller();
        link.connect().await.unwrap();

        let session = controller.start_session().unwrap();
        let err = controller.start_session().unwrap_err();
        assert!(matches!(err, SessionError::AlreadyActive(id) if id == session.id));
    }

    #[test]
    fn test_tap_without_session() {
        let (mut controller, _link) = controller();
        assert!(matches!(
            controller.record_tap(),
            Err(SessionError::NoActiveSession)
        ));
    }

    #[test]
    fn test_end_without_session_is_error() {
        let (mut controller, _link) = controller();
        assert!(matches!(
            controller.end_session(),
            Err(SessionError::NoActiveSession)
        ));
    }

    #[tokio::test]
    async fn test_counts_follow_recorded_events() {
        let (mut controller, link) = controller();
        link.connect().await.unwrap();
        controller.start_session().unwrap();

        controller.record_tap().unwrap();
        controller.record_status(StatusSignal::Pinch).await.unwrap();
        controller.record_status(StatusSignal::Normal).await.unwrap();

        assert_eq!(
            controller.counts(),
            SessionCounts {
                tap: 1,
                chance: 0,
                pinch: 1,
                normal: 1
            }
        );
    }
}

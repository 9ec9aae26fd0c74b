//! Persistent store for sessions and events
//!
//! Two JSON arrays live in a key-value [`Backend`]: `spectator_sessions` and
//! `spectator_events`. Every mutation rewrites the whole array it touches.

mod backend;

pub use backend::{Backend, FileBackend, MemoryBackend};

use crate::format::format_duration;
use crate::protocol::EventType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

/// Backend key holding the session array
pub const SESSIONS_KEY: &str = "spectator_sessions";

/// Backend key holding the event array
pub const EVENTS_KEY: &str = "spectator_events";

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stored record '{key}' is not valid JSON: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
}

/// One timed spectating interval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub date_time: DateTime<Utc>,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub game_title: Option<String>,
    #[serde(default)]
    pub tap_count_total: u64,
    #[serde(default)]
    pub chance_count_total: u64,
    #[serde(default)]
    pub pinch_count_total: u64,
    #[serde(default)]
    pub normal_count_total: u64,
    pub status: SessionStatus,
    /// Epoch milliseconds
    pub start_time: i64,
    /// Epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Running total for one event type
    pub fn count(&self, event_type: EventType) -> u64 {
        match event_type {
            EventType::Tap => self.tap_count_total,
            EventType::Chance => self.chance_count_total,
            EventType::Pinch => self.pinch_count_total,
            EventType::Normal => self.normal_count_total,
        }
    }

    fn count_mut(&mut self, event_type: EventType) -> &mut u64 {
        match event_type {
            EventType::Tap => &mut self.tap_count_total,
            EventType::Chance => &mut self.chance_count_total,
            EventType::Pinch => &mut self.pinch_count_total,
            EventType::Normal => &mut self.normal_count_total,
        }
    }
}

/// One discrete timestamped occurrence within a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub timestamp_ms: i64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Partial update merged into a stored session; `None` fields are left alone
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub device_name: Option<String>,
    pub game_title: Option<String>,
    pub tap_count_total: Option<u64>,
    pub chance_count_total: Option<u64>,
    pub pinch_count_total: Option<u64>,
    pub normal_count_total: Option<u64>,
    pub status: Option<SessionStatus>,
    pub end_time: Option<i64>,
}

impl SessionUpdate {
    fn apply(self, session: &mut Session) {
        if let Some(v) = self.device_name {
            session.device_name = Some(v);
        }
        if let Some(v) = self.game_title {
            session.game_title = Some(v);
        }
        if let Some(v) = self.tap_count_total {
            session.tap_count_total = v;
        }
        if let Some(v) = self.chance_count_total {
            session.chance_count_total = v;
        }
        if let Some(v) = self.pinch_count_total {
            session.pinch_count_total = v;
        }
        if let Some(v) = self.normal_count_total {
            session.normal_count_total = v;
        }
        if let Some(v) = self.status {
            session.status = v;
        }
        if let Some(v) = self.end_time {
            session.end_time = Some(v);
        }
    }
}

/// Derived view of a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatistics {
    pub session: Session,
    pub event_count: usize,
    /// Milliseconds from start to end (or to now while active)
    pub duration_ms: i64,
    pub duration_formatted: String,
    pub tap_count: u64,
    pub chance_count: u64,
    pub pinch_count: u64,
    pub normal_count: u64,
}

/// CRUD over sessions and events
///
/// Cloning is cheap; clones share the backend and the write lock.
pub struct DataStore<B> {
    backend: Arc<B>,
    write_lock: Arc<Mutex<()>>,
}

impl<B> Clone for DataStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            write_lock: Arc::clone(&self.write_lock),
        }
    }
}

impl<B: Backend> DataStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Create and persist a new active session with zeroed counters
    pub fn create_session(&self, device_name: Option<String>) -> Result<Session, StoreError> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;

        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            date_time: now,
            device_name,
            game_title: None,
            tap_count_total: 0,
            chance_count_total: 0,
            pinch_count_total: 0,
            normal_count_total: 0,
            status: SessionStatus::Active,
            start_time: now.timestamp_millis(),
            end_time: None,
        };

        let mut sessions = self.get_all_sessions()?;
        sessions.push(session.clone());
        self.save(SESSIONS_KEY, &sessions)?;

        tracing::info!("Created session {}", session.id);
        Ok(session)
    }

    /// Merge `update` into the session with `session_id`
    pub fn update_session(
        &self,
        session_id: &str,
        update: SessionUpdate,
    ) -> Result<Option<Session>, StoreError> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        self.update_session_locked(session_id, update)
    }

    /// Mark a session completed with the current time as its end
    ///
    /// A session that is already completed is returned untouched.
    pub fn end_session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;

        match self.find_session(session_id)? {
            Some(session) if !session.is_active() => Ok(Some(session)),
            Some(_) => {
                let update = SessionUpdate {
                    status: Some(SessionStatus::Completed),
                    end_time: Some(Utc::now().timestamp_millis()),
                    ..Default::default()
                };
                let ended = self.update_session_locked(session_id, update)?;
                tracing::info!("Ended session {}", session_id);
                Ok(ended)
            }
            None => Ok(None),
        }
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        self.find_session(session_id)
    }

    pub fn get_all_sessions(&self) -> Result<Vec<Session>, StoreError> {
        self.load(SESSIONS_KEY)
    }

    /// Append an event and bump the owning session's counter
    ///
    /// The event is persisted even when the session is missing or completed;
    /// counters are only touched on an active session.
    pub fn log_event(
        &self,
        session_id: &str,
        event_type: EventType,
        data: serde_json::Value,
    ) -> Result<Event, StoreError> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;

        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            timestamp: now,
            timestamp_ms: now.timestamp_millis(),
            event_type,
            data,
        };

        let mut events = self.get_all_events()?;
        events.push(event.clone());
        self.save(EVENTS_KEY, &events)?;

        self.bump_counter_locked(session_id, event_type)?;

        tracing::debug!("Logged {} event for session {}", event_type.as_str(), session_id);
        Ok(event)
    }

    pub fn get_session_events(&self, session_id: &str) -> Result<Vec<Event>, StoreError> {
        Ok(self
            .get_all_events()?
            .into_iter()
            .filter(|e| e.session_id == session_id)
            .collect())
    }

    pub fn get_all_events(&self) -> Result<Vec<Event>, StoreError> {
        self.load(EVENTS_KEY)
    }

    pub fn get_session_statistics(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionStatistics>, StoreError> {
        let Some(session) = self.find_session(session_id)? else {
            return Ok(None);
        };
        let event_count = self.get_session_events(session_id)?.len();

        let end = session
            .end_time
            .unwrap_or_else(|| Utc::now().timestamp_millis());
        let duration_ms = (end - session.start_time).max(0);

        Ok(Some(SessionStatistics {
            event_count,
            duration_ms,
            duration_formatted: format_duration(duration_ms),
            tap_count: session.tap_count_total,
            chance_count: session.chance_count_total,
            pinch_count: session.pinch_count_total,
            normal_count: session.normal_count_total,
            session,
        }))
    }

    /// Drop both collections
    pub fn clear_all_data(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        self.backend.remove(SESSIONS_KEY)?;
        self.backend.remove(EVENTS_KEY)?;
        tracing::info!("Cleared all stored sessions and events");
        Ok(())
    }

    fn find_session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self
            .get_all_sessions()?
            .into_iter()
            .find(|s| s.id == session_id))
    }

    // Callers must hold `write_lock`.
    fn update_session_locked(
        &self,
        session_id: &str,
        update: SessionUpdate,
    ) -> Result<Option<Session>, StoreError> {
        let mut sessions = self.get_all_sessions()?;
        let Some(session) = sessions.iter_mut().find(|s| s.id == session_id) else {
            return Ok(None);
        };
        update.apply(session);
        let updated = session.clone();
        self.save(SESSIONS_KEY, &sessions)?;
        Ok(Some(updated))
    }

    // Callers must hold `write_lock`.
    fn bump_counter_locked(&self, session_id: &str, event_type: EventType) -> Result<(), StoreError> {
        let mut sessions = self.get_all_sessions()?;
        let Some(session) = sessions.iter_mut().find(|s| s.id == session_id) else {
            tracing::warn!(
                "Event logged for unknown session {}; counters not updated",
                session_id
            );
            return Ok(());
        };
        if !session.is_active() {
            tracing::warn!(
                "Event logged for completed session {}; counters not updated",
                session_id
            );
            return Ok(());
        }
        *session.count_mut(event_type) += 1;
        self.save(SESSIONS_KEY, &sessions)
    }

    fn load<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Result<Vec<T>, StoreError> {
        match self.backend.get(key)? {
            Some(data) => serde_json::from_str(&data).map_err(|source| StoreError::Corrupt {
                key: key.to_string(),
                source,
            }),
            None => Ok(Vec::new()),
        }
    }

    fn save<T: Serialize>(&self, key: &str, records: &[T]) -> Result<(), StoreError> {
        let data = serde_json::to_string(records).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.backend.set(key, &data)
    }
}

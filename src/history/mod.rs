//! History viewer - read-only views over stored sessions

use crate::protocol::EventType;
use crate::store::{Backend, DataStore, Event, Session, SessionStatistics, StoreError};

/// Default number of timeline entries shown in a session detail
pub const DEFAULT_TIMELINE_LIMIT: usize = 50;

/// Everything the detail view shows for one session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDetail {
    pub stats: SessionStatistics,
    /// Newest first, capped at the requested limit
    pub timeline: Vec<Event>,
    /// Total events before the cap was applied
    pub total_events: usize,
}

/// All sessions, newest first
pub fn list_sessions<B: Backend>(store: &DataStore<B>) -> Result<Vec<Session>, StoreError> {
    let mut sessions = store.get_all_sessions()?;
    sessions.sort_by(|a, b| b.date_time.cmp(&a.date_time));
    Ok(sessions)
}

pub fn session_detail<B: Backend>(
    store: &DataStore<B>,
    session_id: &str,
    limit: usize,
) -> Result<Option<SessionDetail>, StoreError> {
    let Some(stats) = store.get_session_statistics(session_id)? else {
        return Ok(None);
    };

    let mut events = store.get_session_events(session_id)?;
    let total_events = events.len();
    // Stable sort keeps insertion order for events sharing a timestamp, so reverse after
    events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    events.reverse();
    events.truncate(limit);

    Ok(Some(SessionDetail {
        stats,
        timeline: events,
        total_events,
    }))
}

pub fn event_label(event_type: EventType) -> &'static str {
    match event_type {
        EventType::Tap => "Tap",
        EventType::Chance => "Chance sent",
        EventType::Pinch => "Pinch sent",
        EventType::Normal => "Normal sent",
    }
}

pub fn event_icon(event_type: EventType) -> &'static str {
    match event_type {
        EventType::Tap => "👏",
        EventType::Chance => "🔥",
        EventType::Pinch => "💪",
        EventType::Normal => "😌",
    }
}

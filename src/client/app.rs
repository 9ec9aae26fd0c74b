use crate::history::SessionDetail;
use crate::link::{LinkState, LinkStatus};
use crate::protocol::StatusSignal;
use crate::session::SessionCounts;
use crate::store::Session;
use std::time::{Duration, Instant};

/// The three fixed screens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Home,
    Spectating,
    Log,
}

impl Screen {
    pub const ALL: [Screen; 3] = [Screen::Home, Screen::Spectating, Screen::Log];

    pub fn id(&self) -> &'static str {
        match self {
            Screen::Home => "home-screen",
            Screen::Spectating => "spectating-screen",
            Screen::Log => "log-screen",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.id() == id)
    }

    pub fn title(&self) -> &'static str {
        match self {
            Screen::Home => "Home",
            Screen::Spectating => "Spectating",
            Screen::Log => "Log",
        }
    }

    pub fn next(&self) -> Self {
        match self {
            Screen::Home => Screen::Spectating,
            Screen::Spectating => Screen::Log,
            Screen::Log => Screen::Home,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

/// Toast shown in the bottom-right corner until it expires
#[derive(Debug, Clone)]
pub struct Notification {
    pub message: String,
    pub kind: NoticeKind,
    pub timestamp: Instant,
    pub duration: Duration,
}

pub struct App {
    pub screen: Screen,
    pub link_state: LinkState,
    pub connection: LinkStatus,
    pub session: Option<Session>,
    pub counts: SessionCounts,
    pub sessions: Vec<Session>,
    pub selected: usize,
    pub detail: Option<SessionDetail>,
    pub detail_scroll: usize,
    pub confirm_end: bool,
    /// Set by a user disconnect so the resulting drop is not reported as an error
    pub disconnect_requested: bool,
    pub last_signal: Option<(StatusSignal, Instant)>,
    pub notifications: Vec<Notification>,
    pub notification_duration: Duration,
    pub show_help: bool,
    pub show_seconds: bool,
    pub simulate: bool,
}

impl App {
    pub fn new() -> Self {
        Self {
            screen: Screen::Home,
            link_state: LinkState::Disconnected,
            connection: LinkStatus {
                connected: false,
                device_name: None,
            },
            session: None,
            counts: SessionCounts::default(),
            sessions: Vec::new(),
            selected: 0,
            detail: None,
            detail_scroll: 0,
            confirm_end: false,
            disconnect_requested: false,
            last_signal: None,
            notifications: Vec::new(),
            notification_duration: Duration::from_secs(3),
            show_help: false,
            show_seconds: false,
            simulate: false,
        }
    }

    /// Switch to the screen named `id`; unknown ids are rejected
    pub fn navigate_to(&mut self, id: &str) -> Option<Screen> {
        match Screen::from_id(id) {
            Some(screen) => {
                self.screen = screen;
                self.detail = None;
                Some(screen)
            }
            None => {
                tracing::error!("Invalid screen: {}", id);
                None
            }
        }
    }

    pub fn notify(&mut self, message: impl Into<String>, kind: NoticeKind) {
        self.notifications.push(Notification {
            message: message.into(),
            kind,
            timestamp: Instant::now(),
            duration: self.notification_duration,
        });
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.notify(message, NoticeKind::Success);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.notify(message, NoticeKind::Error);
    }

    pub fn expire_notifications(&mut self, now: Instant) {
        self.notifications
            .retain(|n| now.duration_since(n.timestamp) < n.duration);
    }

    pub fn set_connection(&mut self, status: LinkStatus, state: LinkState) {
        self.connection = status;
        self.link_state = state;
    }

    pub fn set_sessions(&mut self, sessions: Vec<Session>) {
        self.sessions = sessions;
        if self.selected >= self.sessions.len() {
            self.selected = self.sessions.len().saturating_sub(1);
        }
    }

    pub fn selected_session(&self) -> Option<&Session> {
        self.sessions.get(self.selected)
    }

    pub fn select_next(&mut self) {
        if !self.sessions.is_empty() {
            self.selected = (self.selected + 1) % self.sessions.len();
        }
    }

    pub fn select_prev(&mut self) {
        if !self.sessions.is_empty() {
            self.selected = if self.selected == 0 {
                self.sessions.len() - 1
            } else {
                self.selected - 1
            };
        }
    }

    pub fn begin_session(&mut self, session: Session) {
        self.session = Some(session);
        self.counts = SessionCounts::default();
        self.last_signal = None;
        self.confirm_end = false;
    }

    pub fn clear_session(&mut self) {
        self.session = None;
        self.counts = SessionCounts::default();
        self.confirm_end = false;
    }

    /// Whether the status key for `signal` should still be highlighted
    pub fn signal_highlighted(&self, signal: StatusSignal, now: Instant) -> bool {
        matches!(self.last_signal, Some((s, at)) if s == signal
            && now.duration_since(at) < Duration::from_millis(500))
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screen_ids_round_trip() {
        for screen in Screen::ALL {
            assert_eq!(Screen::from_id(screen.id()), Some(screen));
        }
        assert_eq!(Screen::from_id("settings-screen"), None);
    }

    #[test]
    fn test_navigate_rejects_unknown_screen() {
        let mut app = App::new();
        assert_eq!(app.navigate_to("log-screen"), Some(Screen::Log));
        assert_eq!(app.navigate_to("bogus"), None);
        assert_eq!(app.screen, Screen::Log);
    }

    #[test]
    fn test_selection_wraps() {
        let mut app = App::new();
        app.select_next();
        assert_eq!(app.selected, 0);

        let store = crate::store::DataStore::new(crate::store::MemoryBackend::new());
        let a = store.create_session(None).unwrap();
        let b = store.create_session(None).unwrap();
        app.set_sessions(vec![a, b]);

        app.select_prev();
        assert_eq!(app.selected, 1);
        app.select_next();
        assert_eq!(app.selected, 0);
    }

    #[test]
    fn test_notifications_expire() {
        let mut app = App::new();
        app.notification_duration = Duration::from_millis(10);
        app.success("Connected");
        let later = Instant::now() + Duration::from_millis(20);
        app.expire_notifications(later);
        assert!(app.notifications.is_empty());
    }
}

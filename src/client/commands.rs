//! Action handling - turn parsed keys into link, session and store work
//!
//! Anything that may suspend on the transport runs in a spawned task and
//! reports back through an [`Outcome`], so the screen keeps redrawing.
//! Status signals and taps share one recording queue and are handled in
//! arrival order.

use crate::client::app::{App, Screen};
use crate::client::input::Action;
use crate::history;
use crate::link::{DeviceLink, LinkError, LinkEvent, SimPeripheral, Transport};
use crate::protocol::StatusSignal;
use crate::session::{SessionController, SessionCounts, SessionError};
use crate::store::{Backend, DataStore};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};

pub enum CommandResult {
    Continue,
    Exit,
}

/// Completed background work
#[derive(Debug)]
pub enum Outcome {
    Connected(Result<Option<String>, LinkError>),
    Reconnected(Result<(), LinkError>),
    Disconnected,
    Signal(StatusSignal, Result<SessionCounts, SessionError>),
    Tap(Result<SessionCounts, SessionError>),
}

/// Work for the recording queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Record {
    Signal(StatusSignal),
    Tap,
}

/// Services the screens act on
pub struct Services<T: Transport, B: Backend> {
    pub link: Arc<DeviceLink<T>>,
    pub store: DataStore<B>,
    pub controller: Arc<Mutex<SessionController<T, B>>>,
    pub outcomes: mpsc::UnboundedSender<Outcome>,
    pub simulator: Option<SimPeripheral>,
    pub timeline_limit: usize,
    records: mpsc::UnboundedSender<Record>,
}

impl<T: Transport, B: Backend + 'static> Services<T, B> {
    /// Build the services and start the recording worker
    ///
    /// Must be called inside a tokio runtime. The worker stops when the
    /// services are dropped.
    pub fn new(
        link: Arc<DeviceLink<T>>,
        store: DataStore<B>,
        outcomes: mpsc::UnboundedSender<Outcome>,
        simulator: Option<SimPeripheral>,
        timeline_limit: usize,
    ) -> Self {
        let controller = Arc::new(Mutex::new(SessionController::new(
            Arc::clone(&link),
            store.clone(),
        )));
        let (records, queue) = mpsc::unbounded_channel();
        tokio::spawn(record_worker(
            Arc::clone(&controller),
            queue,
            outcomes.clone(),
        ));
        Self {
            link,
            store,
            controller,
            outcomes,
            simulator,
            timeline_limit,
            records,
        }
    }

    fn enqueue(&self, record: Record) {
        if self.records.send(record).is_err() {
            tracing::error!("Recording worker stopped, dropped {:?}", record);
        }
    }
}

async fn record_worker<T: Transport, B: Backend>(
    controller: Arc<Mutex<SessionController<T, B>>>,
    mut queue: mpsc::UnboundedReceiver<Record>,
    outcomes: mpsc::UnboundedSender<Outcome>,
) {
    while let Some(record) = queue.recv().await {
        let mut controller = controller.lock().await;
        let outcome = match record {
            Record::Signal(signal) => {
                let result = controller.record_status(signal).await;
                Outcome::Signal(signal, result.map(|_| controller.counts()))
            }
            Record::Tap => {
                let result = controller.record_tap();
                Outcome::Tap(result.map(|_| controller.counts()))
            }
        };
        drop(controller);
        if outcomes.send(outcome).is_err() {
            break;
        }
    }
}

fn link_message(err: &LinkError) -> String {
    format!("{}. {}", err, err.hint())
}

fn session_message(err: &SessionError) -> String {
    match err {
        SessionError::Link(link) => link_message(link),
        other => other.to_string(),
    }
}

/// Refresh hooks run whenever a screen becomes visible
pub fn on_screen_change<T: Transport, B: Backend + 'static>(
    screen: Screen,
    app: &mut App,
    services: &Services<T, B>,
) {
    match screen {
        Screen::Log => refresh_sessions(app, services),
        Screen::Home => app.set_connection(services.link.status(), services.link.state()),
        Screen::Spectating => {}
    }
}

fn refresh_sessions<T: Transport, B: Backend + 'static>(app: &mut App, services: &Services<T, B>) {
    match history::list_sessions(&services.store) {
        Ok(sessions) => app.set_sessions(sessions),
        Err(e) => {
            tracing::error!("Failed to load sessions: {}", e);
            app.error(format!("Failed to load sessions: {}", e));
        }
    }
}

fn navigate<T: Transport, B: Backend + 'static>(
    screen: Screen,
    app: &mut App,
    services: &Services<T, B>,
) {
    if let Some(screen) = app.navigate_to(screen.id()) {
        on_screen_change(screen, app, services);
    }
}

/// Handle one action and return whether to continue or exit
pub fn handle_action<T: Transport, B: Backend + 'static>(
    action: Action,
    app: &mut App,
    services: &Services<T, B>,
) -> CommandResult {
    match action {
        Action::Quit => return CommandResult::Exit,
        Action::Navigate(screen) => navigate(screen, app, services),
        Action::NextScreen => navigate(app.screen.next(), app, services),
        Action::ToggleHelp => app.show_help = !app.show_help,

        Action::Connect => {
            if app.link_state.is_busy() {
                return CommandResult::Continue;
            }
            app.link_state = crate::link::LinkState::Connecting;
            let link = Arc::clone(&services.link);
            let tx = services.outcomes.clone();
            tokio::spawn(async move {
                let _ = tx.send(Outcome::Connected(link.connect().await));
            });
        }
        Action::Disconnect => {
            app.disconnect_requested = true;
            let link = Arc::clone(&services.link);
            let tx = services.outcomes.clone();
            tokio::spawn(async move {
                link.disconnect().await;
                let _ = tx.send(Outcome::Disconnected);
            });
        }
        Action::Reconnect => {
            if app.link_state.is_busy() {
                return CommandResult::Continue;
            }
            app.link_state = crate::link::LinkState::Reconnecting;
            let link = Arc::clone(&services.link);
            let tx = services.outcomes.clone();
            tokio::spawn(async move {
                let _ = tx.send(Outcome::Reconnected(link.reconnect().await));
            });
        }
        Action::StartSession => start_session(app, services),

        Action::Signal(signal) => {
            if app.session.is_none() {
                app.error("No active session");
                return CommandResult::Continue;
            }
            services.enqueue(Record::Signal(signal));
        }
        Action::EndSession => {
            if app.session.is_some() {
                app.confirm_end = true;
            } else {
                app.error("No active session");
            }
        }
        Action::ConfirmEnd(false) => app.confirm_end = false,
        Action::ConfirmEnd(true) => end_session(app, services),
        Action::SimulateTap => {
            let delivered = services.simulator.as_ref().is_some_and(|pad| pad.tap());
            if !delivered {
                app.error("Simulated pad is not connected");
            }
        }

        Action::SelectNext => app.select_next(),
        Action::SelectPrev => app.select_prev(),
        Action::OpenDetail => open_detail(app, services),
        Action::CloseDetail => {
            app.detail = None;
            app.detail_scroll = 0;
        }
        Action::ScrollDetail(delta) => {
            app.detail_scroll = app.detail_scroll.saturating_add_signed(delta as isize);
        }
        Action::Refresh => refresh_sessions(app, services),
    }

    CommandResult::Continue
}

fn start_session<T: Transport, B: Backend + 'static>(app: &mut App, services: &Services<T, B>) {
    let Ok(mut controller) = services.controller.try_lock() else {
        app.error("Busy sending to the pad, try again");
        return;
    };
    match controller.start_session() {
        Ok(session) => {
            drop(controller);
            app.begin_session(session);
            navigate(Screen::Spectating, app, services);
            app.success("Spectating started");
        }
        Err(SessionError::NotConnected) => app.error("Connect to a device first"),
        Err(e) => app.error(session_message(&e)),
    }
}

fn end_session<T: Transport, B: Backend + 'static>(app: &mut App, services: &Services<T, B>) {
    app.confirm_end = false;
    let Ok(mut controller) = services.controller.try_lock() else {
        app.error("Busy sending to the pad, try again");
        return;
    };
    match controller.end_session() {
        Ok(_) => {
            drop(controller);
            app.clear_session();
            navigate(Screen::Log, app, services);
            app.success("Spectating ended");
        }
        Err(e) => app.error(session_message(&e)),
    }
}

fn open_detail<T: Transport, B: Backend + 'static>(app: &mut App, services: &Services<T, B>) {
    let Some(id) = app.selected_session().map(|s| s.id.clone()) else {
        return;
    };
    match history::session_detail(&services.store, &id, services.timeline_limit) {
        Ok(Some(detail)) => {
            app.detail = Some(detail);
            app.detail_scroll = 0;
        }
        Ok(None) => app.error("Session not found"),
        Err(e) => app.error(format!("Failed to load session: {}", e)),
    }
}

/// Apply finished background work to the screen state
pub fn handle_outcome<T: Transport, B: Backend + 'static>(
    outcome: Outcome,
    app: &mut App,
    services: &Services<T, B>,
) {
    match outcome {
        Outcome::Connected(Ok(name)) => {
            app.success(format!(
                "Connected to {}",
                name.as_deref().unwrap_or("unknown device")
            ));
        }
        Outcome::Connected(Err(e)) | Outcome::Reconnected(Err(e)) => app.error(link_message(&e)),
        Outcome::Reconnected(Ok(())) => app.success("Reconnected"),
        Outcome::Disconnected => {}
        Outcome::Signal(signal, Ok(counts)) => {
            app.counts = counts;
            app.last_signal = Some((signal, Instant::now()));
        }
        Outcome::Signal(_, Err(e)) => app.error(format!("Send failed: {}", session_message(&e))),
        Outcome::Tap(Ok(counts)) => app.counts = counts,
        Outcome::Tap(Err(e)) => tracing::warn!("Tap not recorded: {}", e),
    }
    app.set_connection(services.link.status(), services.link.state());
}

/// React to an event published by the device link
pub fn handle_link_event<T: Transport, B: Backend + 'static>(
    event: LinkEvent,
    app: &mut App,
    services: &Services<T, B>,
) {
    match event {
        LinkEvent::ConnectionChanged { connected, .. } => {
            let was_connected = app.connection.connected;
            app.set_connection(services.link.status(), services.link.state());
            if !connected {
                let requested = std::mem::take(&mut app.disconnect_requested);
                if was_connected && !requested {
                    app.error("Pad disconnected");
                }
            }
        }
        LinkEvent::Tap => {
            if app.session.is_none() {
                tracing::debug!("Tap ignored, no active session");
                return;
            }
            services.enqueue(Record::Tap);
        }
    }
}

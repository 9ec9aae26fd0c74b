//! Client - the terminal navigation shell and its three screens

mod app;
mod commands;
mod input;
mod ui;

pub use app::{App, NoticeKind, Screen};
pub use commands::{handle_action, handle_link_event, handle_outcome, CommandResult, Outcome, Services};
pub use input::{parse_key, Action, KeyContext};

use crate::config::Config;
use crate::link::{DeviceLink, SimPeripheral, Transport};
use crate::store::{Backend, DataStore};
use anyhow::Result;
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

type Term = Terminal<CrosstermBackend<std::io::Stdout>>;

/// Run the terminal UI until the user quits
pub async fn run<T: Transport, B: Backend + 'static>(
    config: &Config,
    link: Arc<DeviceLink<T>>,
    store: DataStore<B>,
    simulator: Option<SimPeripheral>,
) -> Result<()> {
    let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
    let services = Services::new(
        link,
        store,
        outcome_tx,
        simulator,
        config.history.timeline_limit,
    );

    let mut app = App::new();
    app.show_seconds = config.appearance.show_seconds;
    app.notification_duration = Duration::from_secs(config.appearance.notification_secs);
    app.simulate = services.simulator.is_some();
    commands::on_screen_change(Screen::Home, &mut app, &services);

    // Setup Ratatui Terminal
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = event_loop(&mut terminal, &mut app, &services, outcome_rx).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if services.link.is_connected() {
        services.link.disconnect().await;
    }
    result
}

async fn event_loop<T: Transport, B: Backend + 'static>(
    terminal: &mut Term,
    app: &mut App,
    services: &Services<T, B>,
    mut outcome_rx: mpsc::UnboundedReceiver<Outcome>,
) -> Result<()> {
    let (input_tx, mut input_rx) = mpsc::channel(100);

    // Input thread
    std::thread::spawn(move || loop {
        if let Ok(event) = event::read() {
            if input_tx.blocking_send(event).is_err() {
                break;
            }
        }
    });

    let mut link_events = services.link.subscribe();
    let mut tick = tokio::time::interval(Duration::from_millis(250));

    loop {
        app.expire_notifications(std::time::Instant::now());
        terminal.draw(|f| ui::draw(f, app))?;

        tokio::select! {
            Some(event) = input_rx.recv() => {
                if let Event::Key(key) = event {
                    let ctx = KeyContext {
                        screen: app.screen,
                        confirming: app.confirm_end,
                        detail_open: app.detail.is_some(),
                        simulate: app.simulate,
                    };
                    if let Some(action) = parse_key(key, ctx) {
                        if let CommandResult::Exit = handle_action(action, app, services) {
                            break;
                        }
                    }
                }
            }
            Some(outcome) = outcome_rx.recv() => {
                handle_outcome(outcome, app, services);
            }
            event = link_events.recv() => match event {
                Ok(event) => handle_link_event(event, app, services),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!("UI missed {} link events", missed);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = tick.tick() => {}
        }
    }

    Ok(())
}

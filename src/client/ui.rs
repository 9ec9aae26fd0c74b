use crate::client::app::{App, NoticeKind, Screen};
use crate::format::{format_date, format_date_time, format_duration, format_time, from_epoch_ms};
use crate::history::{event_icon, event_label, SessionDetail};
use crate::link::LinkState;
use crate::protocol::StatusSignal;
use crate::store::{Session, SessionStatus};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Tabs, Wrap},
    Frame,
};
use std::time::Instant;

const UNKNOWN_DEVICE: &str = "Unknown device";

const HELP_TEXT: &[&str] = &[
    "spectator - record taps and status signals from a BLE pad",
    "",
    "Navigation:",
    "  1 / 2 / 3           Home / Spectating / Log",
    "  Tab                 Next screen",
    "  ?                   Toggle this help",
    "  q, Ctrl+C           Quit",
    "",
    "Home:",
    "  c                   Scan and connect to a pad",
    "  d                   Disconnect",
    "  r                   Reconnect to the last pad",
    "  s, Enter            Start spectating",
    "",
    "Spectating:",
    "  n / h / p           Send normal / chance / pinch",
    "  e                   End spectating",
    "  t                   Simulated tap (--simulate only)",
    "",
    "Log:",
    "  Up/Down, j/k        Select session",
    "  Enter               Show session detail",
    "  r                   Reload sessions",
    "  Esc                 Close detail",
];

pub fn draw(f: &mut Frame, app: &mut App) {
    let now = Instant::now();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Tabs + connection
            Constraint::Min(0),    // Screen body
            Constraint::Length(1), // Key hints
        ])
        .split(f.area());

    draw_header(f, app, chunks[0]);
    match app.screen {
        Screen::Home => draw_home(f, app, chunks[1]),
        Screen::Spectating => draw_spectating(f, app, chunks[1], now),
        Screen::Log => draw_log(f, app, chunks[1]),
    }
    draw_hints(f, app, chunks[2]);

    if let Some(detail) = &app.detail {
        draw_detail_popup(f, detail, app.detail_scroll, app.show_seconds);
    }
    if app.confirm_end {
        draw_confirm_popup(f);
    }
    draw_notifications(f, app, now);
    draw_help_popup(f, app);
}

fn connection_span(app: &App) -> Span<'static> {
    match app.link_state {
        LinkState::Connected => Span::styled(
            format!(
                "● Connected: {}",
                app.connection.device_name.as_deref().unwrap_or(UNKNOWN_DEVICE)
            ),
            Style::default().fg(Color::Green),
        ),
        LinkState::Connecting => {
            Span::styled("◌ Connecting...", Style::default().fg(Color::Yellow))
        }
        LinkState::Reconnecting => {
            Span::styled("◌ Reconnecting...", Style::default().fg(Color::Yellow))
        }
        LinkState::Disconnected => {
            Span::styled("○ Not connected", Style::default().fg(Color::Red))
        }
    }
}

fn draw_header(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title("spectator")
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(0), Constraint::Length(36)])
        .split(inner);

    let titles: Vec<String> = Screen::ALL
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}:{}", i + 1, s.title()))
        .collect();
    let selected = Screen::ALL
        .iter()
        .position(|s| *s == app.screen)
        .unwrap_or(0);
    let tabs = Tabs::new(titles)
        .select(selected)
        .style(Style::default().fg(Color::DarkGray))
        .highlight_style(Style::default().fg(Color::White).add_modifier(Modifier::BOLD));
    f.render_widget(tabs, halves[0]);

    f.render_widget(
        Paragraph::new(Line::from(connection_span(app))).alignment(Alignment::Right),
        halves[1],
    );
}

fn key_span(key: &str, label: &str, enabled: bool) -> Vec<Span<'static>> {
    let (key_style, label_style) = if enabled {
        (
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            Style::default().fg(Color::White),
        )
    } else {
        (
            Style::default().fg(Color::DarkGray),
            Style::default().fg(Color::DarkGray),
        )
    };
    vec![
        Span::styled(format!("[{}]", key), key_style),
        Span::styled(format!(" {}   ", label), label_style),
    ]
}

fn draw_home(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Home")
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let busy = app.link_state.is_busy();
    let connected = app.link_state == LinkState::Connected;
    let device = if connected {
        app.connection.device_name.as_deref().unwrap_or(UNKNOWN_DEVICE)
    } else {
        "-"
    };

    let mut actions = Vec::new();
    actions.extend(key_span(
        "c",
        if busy { "Connecting..." } else { "Connect" },
        !busy,
    ));
    actions.extend(key_span("d", "Disconnect", connected));
    actions.extend(key_span("r", "Reconnect", !busy));
    actions.extend(key_span("s", "Start spectating", connected && app.session.is_none()));

    let mut lines = vec![
        Line::from(""),
        Line::from(vec![Span::raw("  Status:  "), connection_span(app)]),
        Line::from(format!("  Device:  {}", device)),
        Line::from(""),
        Line::from(actions),
    ];
    if let Some(session) = &app.session {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!(
                "  Spectating since {} (press 2 to return)",
                format_time(&session.date_time, app.show_seconds)
            ),
            Style::default().fg(Color::Yellow),
        )));
    }

    f.render_widget(Paragraph::new(Text::from(lines)), inner);
}

fn counter_block<'a>(label: &'a str, value: u64, color: Color) -> Paragraph<'a> {
    Paragraph::new(Text::from(vec![
        Line::from(""),
        Line::from(Span::styled(
            value.to_string(),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )),
    ]))
    .alignment(Alignment::Center)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(label)
            .border_style(Style::default().fg(Color::DarkGray)),
    )
}

fn signal_key(signal: StatusSignal) -> (&'static str, &'static str, Color) {
    match signal {
        StatusSignal::Normal => ("n", "Normal", Color::Blue),
        StatusSignal::Chance => ("h", "Chance", Color::Red),
        StatusSignal::Pinch => ("p", "Pinch", Color::Magenta),
    }
}

fn draw_spectating(f: &mut Frame, app: &App, area: Rect, now: Instant) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Spectating")
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let Some(session) = &app.session else {
        let p = Paragraph::new("No active session. Start one from the home screen.")
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Center);
        f.render_widget(p, inner);
        return;
    };

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2), // Session info
            Constraint::Length(5), // Counters
            Constraint::Length(3), // Status keys
            Constraint::Min(0),
        ])
        .split(inner);

    let info = format!(
        " Started {}  ·  {}",
        format_time(&session.date_time, app.show_seconds),
        session.device_name.as_deref().unwrap_or(UNKNOWN_DEVICE)
    );
    f.render_widget(Paragraph::new(info), rows[0]);

    let counters = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
        ])
        .split(rows[1]);
    f.render_widget(counter_block("Taps", app.counts.tap, Color::Yellow), counters[0]);
    f.render_widget(counter_block("Chance", app.counts.chance, Color::Red), counters[1]);
    f.render_widget(counter_block("Pinch", app.counts.pinch, Color::Magenta), counters[2]);

    let mut keys = vec![Span::raw(" ")];
    for signal in StatusSignal::ALL {
        let (key, label, color) = signal_key(signal);
        let style = if app.signal_highlighted(signal, now) {
            Style::default().fg(Color::Black).bg(color).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(color)
        };
        keys.push(Span::styled(format!(" [{}] {} ", key, label), style));
        keys.push(Span::raw("  "));
    }
    keys.extend(key_span("e", "End", true));
    if app.simulate {
        keys.extend(key_span("t", "Tap", true));
    }
    f.render_widget(
        Paragraph::new(Line::from(keys)).block(Block::default().borders(Borders::TOP)),
        rows[2],
    );
}

fn status_text(session: &Session) -> &'static str {
    match session.status {
        SessionStatus::Active => "Spectating",
        SessionStatus::Completed => "Ended",
    }
}

fn draw_log(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Log")
        .border_style(Style::default().fg(Color::DarkGray));

    if app.sessions.is_empty() {
        let p = Paragraph::new("No sessions recorded yet.")
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Center)
            .block(block);
        f.render_widget(p, area);
        return;
    }

    let items: Vec<ListItem> = app
        .sessions
        .iter()
        .map(|s| {
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{} ", format_date(&s.date_time)),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
                Span::raw(format!(
                    "{} start · {:<10}",
                    format_time(&s.date_time, app.show_seconds),
                    status_text(s)
                )),
                Span::styled(
                    format!("  taps {:>4}", s.tap_count_total),
                    Style::default().fg(Color::Yellow),
                ),
                Span::styled(
                    format!("  chance {:>3}", s.chance_count_total),
                    Style::default().fg(Color::Red),
                ),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::DarkGray))
        .highlight_symbol("> ");
    let mut state = ListState::default().with_selected(Some(app.selected));
    f.render_stateful_widget(list, area, &mut state);
}

fn draw_hints(f: &mut Frame, app: &App, area: Rect) {
    let hint = if app.confirm_end {
        "y: end session  n: keep spectating"
    } else if app.detail.is_some() {
        "Up/Down: scroll  Esc: close"
    } else {
        match app.screen {
            Screen::Home => "c: connect  d: disconnect  r: reconnect  s: start  ?: help  q: quit",
            Screen::Spectating => "n/h/p: send status  e: end  ?: help  q: quit",
            Screen::Log => "Up/Down: select  Enter: detail  r: reload  ?: help  q: quit",
        }
    };
    f.render_widget(
        Paragraph::new(Span::styled(hint, Style::default().fg(Color::DarkGray))),
        area,
    );
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

fn detail_lines(detail: &SessionDetail, show_seconds: bool) -> Vec<Line<'static>> {
    let session = &detail.stats.session;
    let mut lines = vec![Line::from(Span::styled(
        "Overview",
        Style::default().add_modifier(Modifier::BOLD),
    ))];
    lines.push(Line::from(format!(
        "  Started    {}",
        format_date_time(&session.date_time)
    )));
    if let Some(end) = session.end_time.and_then(from_epoch_ms) {
        lines.push(Line::from(format!("  Ended      {}", format_date_time(&end))));
        lines.push(Line::from(format!(
            "  Duration   {}",
            detail.stats.duration_formatted
        )));
    } else {
        lines.push(Line::from(format!(
            "  Running    {}",
            format_duration(detail.stats.duration_ms)
        )));
    }
    lines.push(Line::from(format!(
        "  Device     {}",
        session.device_name.as_deref().unwrap_or("Unknown")
    )));
    lines.push(Line::from(format!("  Status     {}", status_text(session))));
    lines.push(Line::from(""));

    lines.push(Line::from(Span::styled(
        "Statistics",
        Style::default().add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(format!(
        "  Taps {:>5}    Chance {:>5}",
        detail.stats.tap_count, detail.stats.chance_count
    )));
    lines.push(Line::from(format!(
        "  Pinch {:>4}    Normal {:>5}",
        detail.stats.pinch_count, detail.stats.normal_count
    )));
    lines.push(Line::from(""));

    lines.push(Line::from(Span::styled(
        format!(
            "Timeline ({} of {} events)",
            detail.timeline.len(),
            detail.total_events
        ),
        Style::default().add_modifier(Modifier::BOLD),
    )));
    if detail.timeline.is_empty() {
        lines.push(Line::from(Span::styled(
            "  No events",
            Style::default().fg(Color::DarkGray),
        )));
    }
    for event in &detail.timeline {
        lines.push(Line::from(vec![
            Span::raw(format!("  {} ", event_icon(event.event_type))),
            Span::raw(format!("{:<14}", event_label(event.event_type))),
            Span::styled(
                format_time(&event.timestamp, show_seconds),
                Style::default().fg(Color::DarkGray),
            ),
        ]));
    }
    lines
}

fn draw_detail_popup(f: &mut Frame, detail: &SessionDetail, scroll: usize, show_seconds: bool) {
    let size = f.area();
    let area = centered_rect(60, size.height.saturating_sub(6), size);

    let lines = detail_lines(detail, show_seconds);
    let scroll = scroll.min(lines.len().saturating_sub(1)) as u16;

    let block = Block::default()
        .title("Session detail (Esc to close)")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue))
        .style(Style::default().bg(Color::Black));

    f.render_widget(Clear, area);
    f.render_widget(
        Paragraph::new(Text::from(lines))
            .block(block)
            .wrap(Wrap { trim: false })
            .scroll((scroll, 0)),
        area,
    );
}

fn draw_confirm_popup(f: &mut Frame) {
    let area = centered_rect(40, 5, f.area());
    let block = Block::default()
        .title("End spectating?")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .style(Style::default().bg(Color::Black));
    f.render_widget(Clear, area);
    f.render_widget(
        Paragraph::new("\n[y] End    [n] Keep going")
            .alignment(Alignment::Center)
            .block(block),
        area,
    );
}

fn draw_notifications(f: &mut Frame, app: &App, now: Instant) {
    let notifications: Vec<_> = app
        .notifications
        .iter()
        .filter(|n| now.duration_since(n.timestamp) < n.duration)
        .collect();

    if notifications.is_empty() {
        return;
    }

    let max_width = f.area().width.saturating_sub(4);
    let mut current_y = f.area().height.saturating_sub(2); // Above the hint line

    for notification in notifications.iter().rev() {
        let message = format!(" {}", notification.message);
        let message_len = message.chars().count();
        let display_message = if message_len > max_width as usize {
            message
                .chars()
                .take((max_width as usize).saturating_sub(3))
                .collect::<String>()
                + "..."
        } else {
            message
        };

        let width = display_message.chars().count() as u16 + 2;
        let x = f.area().width.saturating_sub(width).saturating_sub(1);
        let area = Rect::new(x, current_y, width.min(f.area().width), 1);

        let bg = match notification.kind {
            NoticeKind::Success => Color::Green,
            NoticeKind::Error => Color::Red,
        };
        let p = Paragraph::new(display_message).style(Style::default().bg(bg).fg(Color::White));
        f.render_widget(Clear, area);
        f.render_widget(p, area);

        current_y = current_y.saturating_sub(1);
        if current_y < 3 {
            // Don't draw over the header
            break;
        }
    }
}

fn draw_help_popup(f: &mut Frame, app: &App) {
    if !app.show_help {
        return;
    }

    let size = f.area();
    let width = size.width.saturating_sub(10).min(72);
    let height = size.height.saturating_sub(4).min(HELP_TEXT.len() as u16 + 2);
    let area = centered_rect(width, height, size);

    let block = Block::default()
        .title("Help (press ? to close)")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue))
        .style(Style::default().bg(Color::Black));

    let lines: Vec<ListItem> = HELP_TEXT
        .iter()
        .map(|&s| ListItem::new(Text::raw(s)))
        .collect();

    f.render_widget(Clear, area);
    f.render_widget(
        List::new(lines)
            .block(block)
            .style(Style::default().fg(Color::White)),
        area,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::{backend::TestBackend, Terminal};

    fn render(app: &mut App) -> String {
        let backend = TestBackend::new(100, 30);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|f| draw(f, app)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        buffer
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect::<String>()
    }

    #[test]
    fn test_home_shows_not_connected() {
        let mut app = App::new();
        let screen = render(&mut app);
        assert!(screen.contains("Not connected"));
        assert!(screen.contains("Start spectating"));
    }

    #[test]
    fn test_log_empty_state() {
        let mut app = App::new();
        app.screen = Screen::Log;
        let screen = render(&mut app);
        assert!(screen.contains("No sessions recorded yet."));
    }

    #[test]
    fn test_spectating_without_session() {
        let mut app = App::new();
        app.screen = Screen::Spectating;
        let screen = render(&mut app);
        assert!(screen.contains("No active session"));
    }
}

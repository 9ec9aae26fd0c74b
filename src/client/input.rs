//! Input handling - map key presses to screen actions

use crate::client::app::Screen;
use crate::protocol::StatusSignal;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// What the user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    Navigate(Screen),
    NextScreen,
    ToggleHelp,

    Connect,
    Disconnect,
    Reconnect,
    StartSession,

    Signal(StatusSignal),
    EndSession,
    ConfirmEnd(bool),
    SimulateTap,

    SelectNext,
    SelectPrev,
    OpenDetail,
    CloseDetail,
    ScrollDetail(i16),
    Refresh,
}

/// UI state that changes how keys are read
#[derive(Debug, Clone, Copy)]
pub struct KeyContext {
    pub screen: Screen,
    pub confirming: bool,
    pub detail_open: bool,
    pub simulate: bool,
}

/// Parse a key press into an action
pub fn parse_key(key: KeyEvent, ctx: KeyContext) -> Option<Action> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(Action::Quit);
    }

    if ctx.confirming {
        return match key.code {
            KeyCode::Char('y') | KeyCode::Enter => Some(Action::ConfirmEnd(true)),
            KeyCode::Char('n') | KeyCode::Esc => Some(Action::ConfirmEnd(false)),
            _ => None,
        };
    }

    if ctx.detail_open {
        return match key.code {
            KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q') => Some(Action::CloseDetail),
            KeyCode::Up | KeyCode::Char('k') => Some(Action::ScrollDetail(-1)),
            KeyCode::Down | KeyCode::Char('j') => Some(Action::ScrollDetail(1)),
            KeyCode::PageUp => Some(Action::ScrollDetail(-10)),
            KeyCode::PageDown => Some(Action::ScrollDetail(10)),
            _ => None,
        };
    }

    let global = match key.code {
        KeyCode::Char('q') => Some(Action::Quit),
        KeyCode::Tab => Some(Action::NextScreen),
        KeyCode::Char('1') => Some(Action::Navigate(Screen::Home)),
        KeyCode::Char('2') => Some(Action::Navigate(Screen::Spectating)),
        KeyCode::Char('3') => Some(Action::Navigate(Screen::Log)),
        KeyCode::Char('?') => Some(Action::ToggleHelp),
        _ => None,
    };
    if global.is_some() {
        return global;
    }

    match ctx.screen {
        Screen::Home => match key.code {
            KeyCode::Char('c') => Some(Action::Connect),
            KeyCode::Char('d') => Some(Action::Disconnect),
            KeyCode::Char('r') => Some(Action::Reconnect),
            KeyCode::Char('s') | KeyCode::Enter => Some(Action::StartSession),
            _ => None,
        },
        Screen::Spectating => match key.code {
            KeyCode::Char('n') => Some(Action::Signal(StatusSignal::Normal)),
            KeyCode::Char('h') => Some(Action::Signal(StatusSignal::Chance)),
            KeyCode::Char('p') => Some(Action::Signal(StatusSignal::Pinch)),
            KeyCode::Char('e') => Some(Action::EndSession),
            KeyCode::Char('t') if ctx.simulate => Some(Action::SimulateTap),
            _ => None,
        },
        Screen::Log => match key.code {
            KeyCode::Down | KeyCode::Char('j') => Some(Action::SelectNext),
            KeyCode::Up | KeyCode::Char('k') => Some(Action::SelectPrev),
            KeyCode::Enter => Some(Action::OpenDetail),
            KeyCode::Char('r') => Some(Action::Refresh),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(screen: Screen) -> KeyContext {
        KeyContext {
            screen,
            confirming: false,
            detail_open: false,
            simulate: false,
        }
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_parse_navigation() {
        assert_eq!(
            parse_key(press(KeyCode::Char('3')), ctx(Screen::Home)),
            Some(Action::Navigate(Screen::Log))
        );
        assert_eq!(
            parse_key(press(KeyCode::Tab), ctx(Screen::Log)),
            Some(Action::NextScreen)
        );
    }

    #[test]
    fn test_parse_status_keys() {
        let spectating = ctx(Screen::Spectating);
        assert_eq!(
            parse_key(press(KeyCode::Char('h')), spectating),
            Some(Action::Signal(StatusSignal::Chance))
        );
        assert_eq!(
            parse_key(press(KeyCode::Char('p')), spectating),
            Some(Action::Signal(StatusSignal::Pinch))
        );
    }

    #[test]
    fn test_tap_key_only_when_simulating() {
        let mut spectating = ctx(Screen::Spectating);
        assert_eq!(parse_key(press(KeyCode::Char('t')), spectating), None);
        spectating.simulate = true;
        assert_eq!(
            parse_key(press(KeyCode::Char('t')), spectating),
            Some(Action::SimulateTap)
        );
    }

    #[test]
    fn test_confirm_captures_keys() {
        let mut confirming = ctx(Screen::Spectating);
        confirming.confirming = true;
        assert_eq!(
            parse_key(press(KeyCode::Char('y')), confirming),
            Some(Action::ConfirmEnd(true))
        );
        assert_eq!(parse_key(press(KeyCode::Char('q')), confirming), None);
    }

    #[test]
    fn test_ctrl_c_quits_everywhere() {
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(parse_key(key, ctx(Screen::Home)), Some(Action::Quit));
    }
}

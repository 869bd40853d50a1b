use std::time::Duration;
use tracing::trace;

use crate::domain::{AppConfig, CrmError, MENU, Message, Page};
use crate::model::Model;
use ratatui::crossterm::event::{self, Event, KeyCode, KeyModifiers};

pub struct Controller {
    event_poll_time: u64,
}

impl Controller {
    pub fn new(cfg: &AppConfig) -> Self {
        Self {
            event_poll_time: cfg.event_poll_time,
        }
    }

    pub fn handle_event(&self, model: &Model) -> Result<Option<Message>, CrmError> {
        if event::poll(Duration::from_millis(self.event_poll_time))? {
            match event::read()? {
                Event::Key(key) if key.kind == event::KeyEventKind::Press => {
                    if model.raw_keyevents() {
                        return Ok(Some(Message::RawKey(key)));
                    }
                    return Ok(Self::handle_key(key, model.page()));
                }
                Event::Resize(width, height) => {
                    return Ok(Some(Message::Resize(width as usize, height as usize)));
                }
                _ => {}
            }
        }
        Ok(None)
    }

    /// `d` depends on the page: renewal window on renovaciones, delete on clientes.
    pub fn handle_key(key: event::KeyEvent, page: Page) -> Option<Message> {
        let message = match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(Message::Quit),
            (KeyCode::Char('q'), _) => Some(Message::Quit),
            (KeyCode::Esc, _) => Some(Message::Exit),
            (KeyCode::Down | KeyCode::Char('j'), _) => Some(Message::MoveDown),
            (KeyCode::Up | KeyCode::Char('k'), _) => Some(Message::MoveUp),
            (KeyCode::Left | KeyCode::Char('h'), _) => Some(Message::MoveLeft),
            (KeyCode::Right | KeyCode::Char('l'), _) => Some(Message::MoveRight),
            (KeyCode::PageUp, _) => Some(Message::MovePageUp),
            (KeyCode::PageDown, _) => Some(Message::MovePageDown),
            (KeyCode::Home | KeyCode::Char('g'), _) => Some(Message::MoveBeginning),
            (KeyCode::End | KeyCode::Char('G'), _) => Some(Message::MoveEnd),
            (KeyCode::Char('s'), _) => Some(Message::Sort),
            (KeyCode::Char('/'), _) => Some(Message::Filter),
            (KeyCode::Char('c'), _) => Some(Message::ClearFilters),
            (KeyCode::Tab, _) => Some(Message::NextTab),
            (KeyCode::BackTab, _) => Some(Message::PrevTab),
            (KeyCode::Char(']'), _) => Some(Message::NextInsurer),
            (KeyCode::Char('['), _) => Some(Message::PrevInsurer),
            (KeyCode::Char('d'), _) => match page {
                Page::Renovaciones => Some(Message::CycleWindow),
                Page::Clientes => Some(Message::DeleteClient),
                _ => None,
            },
            (KeyCode::Char('t'), _) => Some(Message::EditDateRange),
            (KeyCode::Char('T'), _) => Some(Message::ResetDateRange),
            (KeyCode::Char('x'), _) => Some(Message::Export),
            (KeyCode::Char('r'), _) => Some(Message::Reload),
            (KeyCode::Char('n'), _) => Some(Message::NewClient),
            (KeyCode::Char('m'), _) => Some(Message::SendEmail),
            (KeyCode::Char('f'), _) => Some(Message::Search),
            (KeyCode::Char('o'), _) => Some(Message::OpenFile),
            (KeyCode::Char('y'), _) => Some(Message::CopyCell),
            (KeyCode::Enter, _) => Some(Message::Enter),
            (KeyCode::Char('L'), _) => Some(Message::Logout),
            (KeyCode::Char('?'), _) => Some(Message::Help),
            (KeyCode::Char(c @ '1'..='6'), _) => c
                .to_digit(10)
                .and_then(|d| MENU.get(d as usize - 1))
                .map(|p| Message::GoTo(*p)),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::KeyEvent;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn d_depends_on_the_page() {
        let d = key(KeyCode::Char('d'));
        assert_eq!(Controller::handle_key(d, Page::Renovaciones), Some(Message::CycleWindow));
        assert_eq!(Controller::handle_key(d, Page::Clientes), Some(Message::DeleteClient));
        assert_eq!(Controller::handle_key(d, Page::Cartera), None);
    }

    #[test]
    fn number_keys_open_pages() {
        assert_eq!(
            Controller::handle_key(key(KeyCode::Char('3')), Page::Inicio),
            Some(Message::GoTo(Page::Renovaciones))
        );
        assert_eq!(
            Controller::handle_key(key(KeyCode::Char('6')), Page::Inicio),
            Some(Message::GoTo(Page::Dashboards))
        );
        assert_eq!(Controller::handle_key(key(KeyCode::Char('7')), Page::Inicio), None);
    }

    #[test]
    fn ctrl_c_quits_but_c_clears() {
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(Controller::handle_key(ctrl_c, Page::Inicio), Some(Message::Quit));
        assert_eq!(
            Controller::handle_key(key(KeyCode::Char('c')), Page::Inicio),
            Some(Message::ClearFilters)
        );
    }
}

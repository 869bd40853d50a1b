use ratatui::crossterm::event::{self, KeyCode, KeyModifiers};
use tracing::trace;

#[derive(Default)]
pub struct Inputter {
    current_input: String,
    curser_pos: usize,
    prompt: String,
    secret: bool,
    finished: bool,
    canceled: bool,
}

#[derive(Default, Clone, Debug)]
pub struct InputResult {
    pub input: String,
    pub prompt: String,
    pub secret: bool,
    pub finished: bool,
    pub canceled: bool,
    pub curser_pos: usize,
}

impl InputResult {
    /// What the command line shows, secrets masked.
    pub fn visible_input(&self) -> String {
        if self.secret {
            "*".repeat(self.input.chars().count())
        } else {
            self.input.clone()
        }
    }
}

impl Inputter {
    pub fn read(&mut self, key: event::KeyEvent) -> InputResult {
        match (key.code, key.modifiers) {
            (KeyCode::Enter, _) => self.enter(),
            (KeyCode::Esc, _) => self.escape(),
            (KeyCode::Backspace, _) => self.backspace(),
            (KeyCode::Delete, _) => self.delete(),
            (KeyCode::Left, _) => self.left(),
            (KeyCode::Right, _) => self.right(),
            (KeyCode::Home, _) => self.home(),
            (KeyCode::End, _) => self.end(),
            (kc, km) => self.key(kc, km),
        }
    }

    /// Start a fresh prompt, optionally prefilled.
    pub fn start(&mut self, prompt: impl Into<String>, prefill: &str, secret: bool) {
        self.clear();
        self.prompt = prompt.into();
        self.secret = secret;
        self.set(prefill);
    }

    pub fn set(&mut self, s: &str) {
        self.current_input = s.to_string();
        self.curser_pos = s.chars().count();
    }

    pub fn get(&self) -> InputResult {
        InputResult {
            canceled: self.canceled,
            finished: self.finished,
            input: self.current_input.clone(),
            prompt: self.prompt.clone(),
            secret: self.secret,
            curser_pos: self.curser_pos,
        }
    }

    pub fn clear(&mut self) {
        self.canceled = false;
        self.finished = false;
        self.secret = false;
        self.prompt.clear();
        self.current_input.clear();
        self.curser_pos = 0;
    }

    fn enter(&mut self) -> InputResult {
        self.finished = true;
        trace!("Input finished");
        self.get()
    }

    fn escape(&mut self) -> InputResult {
        let prompt = std::mem::take(&mut self.prompt);
        self.clear();
        self.prompt = prompt;
        self.canceled = true;
        self.finished = true;
        self.get()
    }

    fn backspace(&mut self) -> InputResult {
        if self.curser_pos > 0 {
            self.curser_pos -= 1;
            let pos = self.getbytepos();
            self.current_input.remove(pos);
        }
        self.get()
    }

    fn delete(&mut self) -> InputResult {
        if self.curser_pos < self.current_input.chars().count() {
            let pos = self.getbytepos();
            self.current_input.remove(pos);
        }
        self.get()
    }

    fn left(&mut self) -> InputResult {
        self.curser_pos = self.curser_pos.saturating_sub(1);
        self.get()
    }

    fn right(&mut self) -> InputResult {
        if self.curser_pos < self.current_input.chars().count() {
            self.curser_pos += 1;
        }
        self.get()
    }

    fn home(&mut self) -> InputResult {
        self.curser_pos = 0;
        self.get()
    }

    fn end(&mut self) -> InputResult {
        self.curser_pos = self.current_input.chars().count();
        self.get()
    }

    fn key(&mut self, code: KeyCode, modifier: KeyModifiers) -> InputResult {
        if modifier.contains(KeyModifiers::CONTROL) {
            return self.get();
        }
        if let Some(chr) = code.as_char() {
            self.current_input.insert(self.getbytepos(), chr);
            self.curser_pos += 1;
        }
        self.get()
    }

    fn getbytepos(&self) -> usize {
        self.current_input
            .char_indices()
            .nth(self.curser_pos)
            .map(|(byte_idx, _)| byte_idx)
            .unwrap_or(self.current_input.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::KeyEvent;

    fn press(input: &mut Inputter, code: KeyCode) -> InputResult {
        input.read(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_str(input: &mut Inputter, s: &str) {
        for c in s.chars() {
            press(input, KeyCode::Char(c));
        }
    }

    #[test]
    fn edits_in_the_middle_of_multibyte_text() {
        let mut input = Inputter::default();
        input.start("Nombre: ", "José", false);
        press(&mut input, KeyCode::Left);
        press(&mut input, KeyCode::Backspace);
        type_str(&mut input, "sé M");
        press(&mut input, KeyCode::End);
        let result = press(&mut input, KeyCode::Enter);
        assert_eq!(result.input, "José Mé");
        assert!(result.finished);
        assert!(!result.canceled);
        assert_eq!(result.prompt, "Nombre: ");
    }

    #[test]
    fn delete_and_home() {
        let mut input = Inputter::default();
        input.start("", "abc", false);
        press(&mut input, KeyCode::Home);
        press(&mut input, KeyCode::Delete);
        assert_eq!(input.get().input, "bc");
        assert_eq!(input.get().curser_pos, 0);
    }

    #[test]
    fn escape_cancels() {
        let mut input = Inputter::default();
        input.start("Buscar: ", "", false);
        type_str(&mut input, "ana");
        let result = press(&mut input, KeyCode::Esc);
        assert!(result.canceled && result.finished);
        assert_eq!(result.input, "");
    }

    #[test]
    fn secrets_are_masked() {
        let mut input = Inputter::default();
        input.start("Contraseña: ", "", true);
        type_str(&mut input, "ñu42");
        let result = input.get();
        assert_eq!(result.input, "ñu42");
        assert_eq!(result.visible_input(), "****");
    }
}

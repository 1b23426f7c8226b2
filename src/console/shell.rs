//! Line editor and command dispatch for one session

use core::fmt::Write;
use std::sync::Arc;

use super::commands::{CommandOutcome, CommandRegistry, InputConsumer, SessionControl};
use super::{parse_line, Completer, ConsoleError, History, LineBuffer};

/// Version string (set by build.rs, includes git hash)
pub const VERSION: &str = env!("VERSION_STRING");

const ERASE_CHAR: &str = "\x08 \x08";
const BELL: char = '\x07';

/// What a completed line produced
pub enum ShellEvent {
    /// A command ran to completion; the prompt has been printed
    Executed(Result<(), ConsoleError>),
    /// A command took over the input; no prompt printed
    Interactive(Box<dyn InputConsumer>),
    /// The user asked to end the session; no prompt printed
    Exit,
}

/// Caps one command's output at the session's verbosity budget.
struct Budget<'a> {
    out: &'a mut dyn Write,
    remaining: usize,
    truncated: bool,
}

impl Write for Budget<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        if self.truncated {
            return Ok(());
        }
        if s.len() <= self.remaining {
            self.remaining -= s.len();
            return self.out.write_str(s);
        }
        let mut cut = self.remaining;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        self.remaining = 0;
        self.truncated = true;
        self.out.write_str(&s[..cut])
    }
}

/// Console line editor state machine
pub struct Shell {
    line: LineBuffer,
    history: History,
    completer: Completer,
    /// Escape sequence state
    escape_state: EscapeState,
    prompt: String,
    registry: Arc<CommandRegistry>,
    control: SessionControl,
}

#[derive(Clone, Copy, PartialEq)]
enum EscapeState {
    Normal,
    Escape,  // Got ESC
    Bracket, // Got ESC [
}

impl Shell {
    /// Create new shell
    pub fn new(registry: Arc<CommandRegistry>, prompt: &str, control: SessionControl) -> Self {
        Self {
            line: LineBuffer::new(),
            history: History::new(),
            completer: Completer::new(),
            escape_state: EscapeState::Normal,
            prompt: prompt.to_string(),
            registry,
            control,
        }
    }

    /// Session flags as last set by commands
    pub fn control(&self) -> &SessionControl {
        &self.control
    }

    pub fn control_mut(&mut self) -> &mut SessionControl {
        &mut self.control
    }

    /// Partially typed line
    pub fn line(&self) -> &str {
        self.line.as_str()
    }

    /// Process a single input byte
    ///
    /// Input is expected with CR already turned into LF. Returns
    /// `Some(event)` once a non-empty line was submitted.
    pub fn process_byte(&mut self, byte: u8, out: &mut dyn Write) -> Option<ShellEvent> {
        match self.escape_state {
            EscapeState::Normal => self.process_normal(byte, out),
            EscapeState::Escape => {
                self.escape_state = if byte == b'[' { EscapeState::Bracket } else { EscapeState::Normal };
                None
            }
            EscapeState::Bracket => {
                self.escape_state = EscapeState::Normal;
                match byte {
                    b'A' => self.handle_up(out),   // Up arrow
                    b'B' => self.handle_down(out), // Down arrow
                    _ => {}
                }
                None
            }
        }
    }

    fn process_normal(&mut self, byte: u8, out: &mut dyn Write) -> Option<ShellEvent> {
        match byte {
            // Enter
            b'\n' | b'\r' => {
                let _ = writeln!(out);
                self.completer.reset();
                if self.line.is_empty() {
                    self.print_prompt(out);
                    return None;
                }
                Some(self.submit(out))
            }

            // Backspace
            0x7F | 0x08 => {
                if self.line.backspace() {
                    let _ = out.write_str(ERASE_CHAR);
                }
                self.completer.reset();
                self.history.reset_nav();
                None
            }

            // Tab
            b'\t' => {
                self.handle_tab(out);
                None
            }

            // Escape
            0x1B => {
                self.escape_state = EscapeState::Escape;
                None
            }

            // Ctrl+C
            0x03 => {
                let _ = writeln!(out, "^C");
                self.line.clear();
                self.history.reset_nav();
                self.print_prompt(out);
                None
            }

            // Ctrl+U (clear line)
            0x15 => {
                self.clear_displayed(out);
                self.line.clear();
                None
            }

            // Ctrl+R (redraw)
            0x12 => {
                let _ = writeln!(out);
                self.redraw(out);
                None
            }

            // Printable character
            0x20..=0x7E => {
                if self.line.push(byte) {
                    let _ = out.write_char(byte as char);
                } else {
                    let _ = out.write_char(BELL);
                }
                self.completer.reset();
                self.history.reset_nav();
                None
            }

            _ => None,
        }
    }

    fn submit(&mut self, out: &mut dyn Write) -> ShellEvent {
        let line = self.line.as_str().to_string();
        self.line.clear();
        self.history.push(&line);

        let mut budget = Budget {
            out: &mut *out,
            remaining: self.control.verbosity.max_output(),
            truncated: false,
        };
        let result = parse_line(&line).and_then(|cmd| self.registry.execute(&cmd, &mut budget, &mut self.control));
        if budget.truncated {
            let _ = out.write_str("\n[output truncated]\n");
        }

        match result {
            Ok(CommandOutcome::Interactive(consumer)) => ShellEvent::Interactive(consumer),
            Ok(CommandOutcome::Done) if self.control.take_exit() => ShellEvent::Exit,
            Ok(CommandOutcome::Done) => {
                self.print_prompt(out);
                ShellEvent::Executed(Ok(()))
            }
            Err(e) => {
                let _ = writeln!(out, "{}", e);
                self.print_prompt(out);
                ShellEvent::Executed(Err(e))
            }
        }
    }

    fn handle_tab(&mut self, out: &mut dyn Write) {
        let input = self.line.as_str();
        let last_word_start = input.rfind(' ').map(|i| i + 1).unwrap_or(0);
        let word = input[last_word_start..].to_string();
        let first = input.split_whitespace().next().unwrap_or("");
        let secure = self.control.secure;

        let completion = if last_word_start == 0 {
            self.completer.complete(&word, self.registry.names(secure))
        } else {
            // First argument only
            let at_first_arg = input[..last_word_start].split_whitespace().count() == 1;
            match self.registry.find(first) {
                Some(c) if at_first_arg && (secure || !c.secure) => {
                    self.completer.complete(&word, c.values.iter().copied())
                }
                _ => None,
            }
        };

        match completion {
            Some(completed) => {
                for _ in 0..word.len() {
                    self.line.backspace();
                    let _ = out.write_str(ERASE_CHAR);
                }
                for c in completed.bytes() {
                    if self.line.push(c) {
                        let _ = out.write_char(c as char);
                    }
                }
            }
            None => {
                let _ = out.write_char(BELL);
            }
        }
    }

    fn handle_up(&mut self, out: &mut dyn Write) {
        if let Some(prev) = self.history.get_prev().map(str::to_string) {
            self.replace_line(&prev, out);
        }
    }

    fn handle_down(&mut self, out: &mut dyn Write) {
        let next = self.history.get_next().map(str::to_string).unwrap_or_default();
        self.replace_line(&next, out);
    }

    fn clear_displayed(&self, out: &mut dyn Write) {
        for _ in 0..self.line.len() {
            let _ = out.write_str(ERASE_CHAR);
        }
    }

    fn replace_line(&mut self, new_line: &str, out: &mut dyn Write) {
        self.clear_displayed(out);
        self.line.set(new_line);
        let _ = out.write_str(self.line.as_str());
    }

    /// Print the prompt
    pub fn print_prompt(&self, out: &mut dyn Write) {
        let _ = out.write_str(&self.prompt);
    }

    /// Print the prompt followed by the partially typed line
    pub fn redraw(&self, out: &mut dyn Write) {
        self.print_prompt(out);
        let _ = out.write_str(self.line.as_str());
    }

    /// Print welcome banner and the first prompt
    pub fn print_banner(&self, out: &mut dyn Write, transport: &str) {
        let _ = writeln!(out, "\n{}", VERSION);
        let _ = writeln!(out, "Console on {}. Type 'help' for commands.", transport);
        self.print_prompt(out);
    }
}

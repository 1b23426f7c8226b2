//! Per-session display and input state machine.
//!
//! # Events
//!
//! ```text
//!              Idle                           CommandRunning
//! Recv         restore prompt, line editor    running command's input
//! Alert        print with display prefix      deferred queue
//! timeout      lost notice / prompt redraw    lost notice (deferred)
//! ```
//!
//! Output always goes through the transport's `write`. The display state
//! decides how the next print starts.

use core::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::{debug, info};

use super::deferred::DeferredQueue;
use super::display::{self, DisplayState, ERASE_LINE, NEWLINE};
use super::event::{Event, LogBatch, RecvData};
use super::queue::Wait;
use crate::config::ConsoleConfig;
use crate::console::{CommandRegistry, InputConsumer, InputStatus, SessionControl, Shell, ShellEvent};
use crate::transport::{Decoded, Transport};

/// Counters shared between a session and its log sink.
#[derive(Debug, Default)]
pub struct SessionShared {
    /// Alerts the session queue refused.
    lost: AtomicU32,
}

impl SessionShared {
    pub fn record_lost(&self) {
        self.lost.fetch_add(1, Ordering::Relaxed);
    }

    pub fn lost(&self) -> u32 {
        self.lost.load(Ordering::Relaxed)
    }
}

/// Whether the session loop goes on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Terminate,
}

enum Mode {
    Idle,
    CommandRunning(Box<dyn InputConsumer>),
}

/// `fmt::Write` over a transport's raw write.
struct Out<'a, T: Transport>(&'a mut T);

impl<T: Transport> fmt::Write for Out<'_, T> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if !s.is_empty() {
            self.0.write(s.as_bytes());
        }
        Ok(())
    }
}

/// Output of a running command; remembers whether it ended a line.
struct CommandOut<'a, T: Transport> {
    transport: &'a mut T,
    at_line_start: &'a mut bool,
}

impl<T: Transport> fmt::Write for CommandOut<'_, T> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if !s.is_empty() {
            self.transport.write(s.as_bytes());
            *self.at_line_start = s.ends_with('\n');
        }
        Ok(())
    }
}

/// One terminal session over a transport.
pub struct ConsoleEngine<T: Transport> {
    transport: T,
    shell: Shell,
    state: DisplayState,
    mode: Mode,
    deferred: DeferredQueue,
    shared: Arc<SessionShared>,
    /// Lost count already announced.
    acknowledged: u32,
    wait: Wait,
    housekeeping: Wait,
    input: Vec<u8>,
    /// Last output of the running command ended with a newline.
    command_at_line_start: bool,
}

impl<T: Transport> ConsoleEngine<T> {
    pub fn new(transport: T, registry: Arc<CommandRegistry>, config: &ConsoleConfig, shared: Arc<SessionShared>) -> Self {
        let control = SessionControl::new(config.monitor, config.verbosity, transport.is_secure());
        Self {
            shell: Shell::new(registry, &config.prompt, control),
            transport,
            state: DisplayState::AtPrompt,
            mode: Mode::Idle,
            deferred: DeferredQueue::new(config.deferred_depth),
            shared,
            acknowledged: 0,
            wait: Wait::Forever,
            housekeeping: Wait::For(config.housekeeping),
            input: Vec::new(),
            command_at_line_start: false,
        }
    }

    /// Print the banner and first prompt.
    pub fn start(&mut self) {
        let name = self.transport.name().to_string();
        self.shell.print_banner(&mut Out(&mut self.transport), &name);
        self.state = DisplayState::AtPrompt;
    }

    /// How long the session should wait for the next event.
    pub fn wait(&self) -> Wait {
        self.wait
    }

    pub fn state(&self) -> DisplayState {
        self.state
    }

    pub fn is_command_running(&self) -> bool {
        matches!(self.mode, Mode::CommandRunning(_))
    }

    pub fn deferred(&self) -> &DeferredQueue {
        &self.deferred
    }

    pub fn control(&self) -> &SessionControl {
        self.shell.control()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Process one dequeued event.
    pub fn handle(&mut self, event: Event) -> Flow {
        match event {
            Event::Recv(data) => self.on_recv(data),
            Event::Alert(line) => {
                self.on_alert(Event::Alert(line));
                Flow::Continue
            }
            Event::AlertMulti(batch) => {
                self.on_alert(Event::AlertMulti(batch));
                Flow::Continue
            }
        }
    }

    fn on_recv(&mut self, data: RecvData) -> Flow {
        if data.is_closed() {
            return self.on_closed();
        }

        let mut input = core::mem::take(&mut self.input);
        input.clear();
        let decoded = self.transport.decode(&data, &mut input);
        let flow = if decoded == Decoded::Closed {
            self.on_closed()
        } else {
            self.feed(&input)
        };
        self.input = input;
        flow
    }

    /// Channel gone: a running command gets one last newline.
    fn on_closed(&mut self) -> Flow {
        if let Mode::CommandRunning(consumer) = &mut self.mode {
            consumer.input(b"\n", &mut Out(&mut self.transport));
        }
        debug!("{}: channel closed", self.transport.name());
        Flow::Terminate
    }

    fn feed(&mut self, mut bytes: &[u8]) -> Flow {
        while !bytes.is_empty() {
            match &mut self.mode {
                Mode::CommandRunning(consumer) => {
                    let mut out = CommandOut {
                        transport: &mut self.transport,
                        at_line_start: &mut self.command_at_line_start,
                    };
                    match consumer.input(bytes, &mut out) {
                        InputStatus::More => return Flow::Continue,
                        InputStatus::Done(used) => {
                            bytes = &bytes[used.min(bytes.len())..];
                            self.command_finished();
                        }
                    }
                }
                Mode::Idle => {
                    if self.state != DisplayState::AtPrompt {
                        self.restore_prompt();
                    }
                    let (&byte, rest) = match bytes.split_first() {
                        Some(split) => split,
                        None => break,
                    };
                    bytes = rest;
                    if let Some(event) = self.shell.process_byte(byte, &mut Out(&mut self.transport)) {
                        self.on_shell_event(event);
                    }
                }
            }
        }
        Flow::Continue
    }

    fn on_shell_event(&mut self, event: ShellEvent) {
        match event {
            ShellEvent::Executed(_) => self.state = DisplayState::AtPrompt,
            ShellEvent::Interactive(consumer) => {
                self.command_at_line_start = false;
                self.mode = Mode::CommandRunning(consumer);
            }
            ShellEvent::Exit => {
                info!("{}: exit", self.transport.name());
                if !self.transport.exit() {
                    self.shell.print_prompt(&mut Out(&mut self.transport));
                }
                self.state = DisplayState::AtPrompt;
            }
        }
    }

    /// CommandRunning cleared: synthetic newline, then the deferred flush.
    ///
    /// A command whose output already ended the line only gets the prompt.
    fn command_finished(&mut self) {
        self.mode = Mode::Idle;
        if self.command_at_line_start {
            self.shell.redraw(&mut Out(&mut self.transport));
        } else if let Some(event) = self.shell.process_byte(b'\n', &mut Out(&mut self.transport)) {
            self.on_shell_event(event);
        }
        self.state = DisplayState::AtPrompt;
        self.finalise();
    }

    /// Report evictions, then print held alerts in arrival order.
    pub fn finalise(&mut self) {
        let discarded = self.deferred.take_unreported();
        if discarded > 0 {
            self.print(display::discarded_notice(discarded).as_bytes());
        }
        while let Some(event) = self.deferred.pop() {
            self.on_alert(event);
        }
    }

    fn on_alert(&mut self, event: Event) {
        if !self.shell.control().monitor {
            return;
        }
        if self.is_command_running() {
            // The evicted alert is released here.
            drop(self.deferred.push(event));
            return;
        }
        match event {
            Event::Alert(line) => self.print(line.as_bytes()),
            Event::AlertMulti(batch) => self.print_batch(batch),
            Event::Recv(_) => {}
        }
    }

    fn print_batch(&mut self, batch: LogBatch) {
        for line in batch.lines() {
            self.print(line.as_bytes());
        }
        batch.release();
    }

    /// Print one log body with the prefix the display state requires.
    fn print(&mut self, body: &[u8]) {
        if body.is_empty() {
            return;
        }
        let prefix = self.state.alert_prefix();
        if !prefix.is_empty() {
            self.transport.write(prefix);
        }
        let (text, state) = display::strip_trailing_newline(body);
        if !text.is_empty() {
            self.transport.write(text);
        }
        self.state = state;
        self.wait = self.housekeeping;
    }

    /// Finish pending log output and redraw the prompt and typed line.
    fn restore_prompt(&mut self) {
        self.transport.write(NEWLINE);
        self.transport.write(ERASE_LINE);
        self.shell.redraw(&mut Out(&mut self.transport));
        self.state = DisplayState::AtPrompt;
    }

    /// Idle wait expired.
    pub fn on_timeout(&mut self) {
        let lost = self.shared.lost();
        if lost != self.acknowledged {
            let count = lost.wrapping_sub(self.acknowledged);
            self.acknowledged = lost;
            self.on_alert(Event::Alert(display::lost_notice(count)));
            return;
        }
        if !self.is_command_running() && self.state != DisplayState::AtPrompt {
            self.restore_prompt();
        }
        self.wait = Wait::Forever;
    }
}

//! Command registry and builtin commands

use core::fmt::Write;
use std::str::FromStr;

use log::{info, LevelFilter};

use super::parser::ParsedCommand;
use super::ConsoleError;
use crate::config::Verbosity;

/// Command handler
pub type CommandHandler =
    fn(&ParsedCommand<'_>, &mut CommandContext<'_>) -> Result<CommandOutcome, ConsoleError>;

/// Command descriptor
#[derive(Clone, Copy)]
pub struct CommandDescriptor {
    pub name: &'static str,
    pub brief: &'static str,
    pub usage: &'static str,
    /// Completion candidates for the first argument
    pub values: &'static [&'static str],
    /// Hidden from and refused on insecure transports
    pub secure: bool,
    pub handler: CommandHandler,
}

/// Per-session state commands may change
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionControl {
    /// Print log messages on this session
    pub monitor: bool,
    /// Command output verbosity
    pub verbosity: Verbosity,
    /// Transport is secure
    pub secure: bool,
    exit: bool,
}

impl SessionControl {
    pub fn new(monitor: bool, verbosity: Verbosity, secure: bool) -> Self {
        Self {
            monitor,
            verbosity,
            secure,
            exit: false,
        }
    }

    /// Ask the session to close its transport.
    pub fn request_exit(&mut self) {
        self.exit = true;
    }

    /// Consume a pending exit request.
    pub fn take_exit(&mut self) -> bool {
        core::mem::take(&mut self.exit)
    }
}

/// What a handler sees while it runs
pub struct CommandContext<'a> {
    pub out: &'a mut dyn Write,
    pub control: &'a mut SessionControl,
    pub registry: &'a CommandRegistry,
}

/// Progress of an interactive command
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputStatus {
    /// Wants more input
    More,
    /// Finished after consuming this many bytes of the last chunk
    Done(usize),
}

/// A command that takes over the session's input until it finishes.
pub trait InputConsumer: Send {
    fn input(&mut self, bytes: &[u8], out: &mut dyn Write) -> InputStatus;
}

/// Result of a handler
pub enum CommandOutcome {
    /// Finished; the prompt returns
    Done,
    /// Owns the input until the consumer reports `Done`
    Interactive(Box<dyn InputConsumer>),
}

impl core::fmt::Debug for CommandOutcome {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Done => f.write_str("Done"),
            Self::Interactive(_) => f.write_str("Interactive"),
        }
    }
}

/// Every command a session can run
pub struct CommandRegistry {
    commands: Vec<CommandDescriptor>,
}

impl CommandRegistry {
    /// Registry without commands
    pub fn new() -> Self {
        Self { commands: Vec::new() }
    }

    /// Registry holding the builtin commands
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for desc in BUILTINS {
            registry.register(*desc);
        }
        registry
    }

    /// Add a command, replacing one with the same name
    pub fn register(&mut self, desc: CommandDescriptor) {
        match self.commands.iter_mut().find(|c| c.name == desc.name) {
            Some(slot) => *slot = desc,
            None => self.commands.push(desc),
        }
    }

    /// Look up a command by name
    pub fn find(&self, name: &str) -> Option<&CommandDescriptor> {
        self.commands.iter().find(|c| c.name == name)
    }

    /// Command names visible to a session
    pub fn names(&self, secure: bool) -> impl Iterator<Item = &'static str> + '_ {
        self.visible(secure).map(|c| c.name)
    }

    fn visible(&self, secure: bool) -> impl Iterator<Item = &CommandDescriptor> + '_ {
        self.commands.iter().filter(move |c| secure || !c.secure)
    }

    /// Execute a parsed command
    pub fn execute(
        &self,
        cmd: &ParsedCommand<'_>,
        out: &mut dyn Write,
        control: &mut SessionControl,
    ) -> Result<CommandOutcome, ConsoleError> {
        if cmd.command.is_empty() {
            return Ok(CommandOutcome::Done);
        }

        let desc = self.find(cmd.command).ok_or(ConsoleError::UnknownCommand)?;
        if desc.secure && !control.secure {
            return Err(ConsoleError::Insecure);
        }

        let mut ctx = CommandContext { out, control, registry: self };
        (desc.handler)(cmd, &mut ctx)
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

static BUILTINS: &[CommandDescriptor] = &[
    CommandDescriptor { name: "help", brief: "List commands", usage: "help [command]", values: &[], secure: false, handler: cmd_help },
    CommandDescriptor { name: "exit", brief: "End this console session", usage: "exit", values: &[], secure: false, handler: cmd_exit },
    CommandDescriptor { name: "logout", brief: "End this console session", usage: "logout", values: &[], secure: false, handler: cmd_exit },
    CommandDescriptor { name: "monitor", brief: "Show log messages here", usage: "monitor [yes|no]", values: &["yes", "no"], secure: false, handler: cmd_monitor },
    CommandDescriptor { name: "level", brief: "Set the global log level", usage: "level [off|error|warn|info|debug|trace]", values: LEVELS, secure: true, handler: cmd_level },
    CommandDescriptor { name: "verbosity", brief: "Set command output verbosity", usage: "verbosity [minimal|normal|verbose]", values: &["minimal", "normal", "verbose"], secure: false, handler: cmd_verbosity },
    CommandDescriptor { name: "capture", brief: "Read lines until a lone '.'", usage: "capture", values: &[], secure: false, handler: cmd_capture },
];

const LEVELS: &[&str] = &["off", "error", "warn", "info", "debug", "trace"];

// --- Command Implementations ---

fn cmd_help(cmd: &ParsedCommand<'_>, ctx: &mut CommandContext<'_>) -> Result<CommandOutcome, ConsoleError> {
    let secure = ctx.control.secure;
    if let Some(name) = cmd.arg(0) {
        let c = ctx
            .registry
            .find(name)
            .filter(|c| secure || !c.secure)
            .ok_or(ConsoleError::UnknownCommand)?;
        let _ = writeln!(ctx.out, "{}: {}", c.name, c.brief);
        let _ = writeln!(ctx.out, "usage: {}", c.usage);
        return Ok(CommandOutcome::Done);
    }

    let minimal = ctx.control.verbosity == Verbosity::Minimal;
    for c in ctx.registry.visible(secure) {
        if minimal {
            let _ = write!(ctx.out, "{} ", c.name);
        } else {
            let _ = writeln!(ctx.out, "  {:<14} {}", c.name, c.brief);
        }
    }
    if minimal {
        let _ = writeln!(ctx.out);
    }
    Ok(CommandOutcome::Done)
}

fn cmd_exit(_cmd: &ParsedCommand<'_>, ctx: &mut CommandContext<'_>) -> Result<CommandOutcome, ConsoleError> {
    ctx.control.request_exit();
    Ok(CommandOutcome::Done)
}

fn parse_yes_no(value: &str) -> Result<bool, ConsoleError> {
    match value {
        "yes" | "on" | "1" | "true" => Ok(true),
        "no" | "off" | "0" | "false" => Ok(false),
        _ => Err(ConsoleError::InvalidValue),
    }
}

fn cmd_monitor(cmd: &ParsedCommand<'_>, ctx: &mut CommandContext<'_>) -> Result<CommandOutcome, ConsoleError> {
    if let Some(value) = cmd.arg(0) {
        ctx.control.monitor = parse_yes_no(value)?;
    }
    let state = if ctx.control.monitor { "yes" } else { "no" };
    let _ = writeln!(ctx.out, "Monitoring log messages: {}", state);
    Ok(CommandOutcome::Done)
}

fn cmd_level(cmd: &ParsedCommand<'_>, ctx: &mut CommandContext<'_>) -> Result<CommandOutcome, ConsoleError> {
    if let Some(value) = cmd.arg(0) {
        let level = LevelFilter::from_str(value).map_err(|_| ConsoleError::InvalidValue)?;
        log::set_max_level(level);
        info!("Log level set to {}", level);
    }
    let _ = writeln!(ctx.out, "Log level: {}", log::max_level().as_str().to_ascii_lowercase());
    Ok(CommandOutcome::Done)
}

fn cmd_verbosity(cmd: &ParsedCommand<'_>, ctx: &mut CommandContext<'_>) -> Result<CommandOutcome, ConsoleError> {
    if let Some(value) = cmd.arg(0) {
        ctx.control.verbosity = Verbosity::parse(value).ok_or(ConsoleError::InvalidValue)?;
    }
    let _ = writeln!(
        ctx.out,
        "Verbosity: {} ({} bytes)",
        ctx.control.verbosity.as_str(),
        ctx.control.verbosity.max_output()
    );
    Ok(CommandOutcome::Done)
}

fn cmd_capture(_cmd: &ParsedCommand<'_>, ctx: &mut CommandContext<'_>) -> Result<CommandOutcome, ConsoleError> {
    let _ = writeln!(ctx.out, "Enter lines, end with '.' or Ctrl-D");
    Ok(CommandOutcome::Interactive(Box::new(Capture::default())))
}

/// Interactive line reader behind the `capture` command.
#[derive(Default)]
pub struct Capture {
    line: String,
    lines: usize,
}

const CTRL_D: u8 = 0x04;

impl Capture {
    fn finish(&self, out: &mut dyn Write) {
        let _ = writeln!(out, "Captured {} lines", self.lines);
    }
}

impl InputConsumer for Capture {
    fn input(&mut self, bytes: &[u8], out: &mut dyn Write) -> InputStatus {
        for (i, &b) in bytes.iter().enumerate() {
            match b {
                CTRL_D => {
                    self.finish(out);
                    return InputStatus::Done(i + 1);
                }
                b'\n' => {
                    let _ = writeln!(out);
                    if self.line == "." {
                        self.finish(out);
                        return InputStatus::Done(i + 1);
                    }
                    self.lines += 1;
                    self.line.clear();
                }
                0x20..=0x7E => {
                    self.line.push(b as char);
                    let _ = out.write_char(b as char);
                }
                _ => {}
            }
        }
        InputStatus::More
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::parse_line;

    fn run(registry: &CommandRegistry, line: &str, control: &mut SessionControl) -> (Result<CommandOutcome, ConsoleError>, String) {
        let mut out = String::new();
        let cmd = parse_line(line).unwrap();
        let result = registry.execute(&cmd, &mut out, control);
        (result, out)
    }

    #[test]
    fn test_capture_counts_lines_until_dot() {
        let mut capture = Capture::default();
        let mut out = String::new();
        assert_eq!(capture.input(b"one\ntwo\n", &mut out), InputStatus::More);
        assert_eq!(capture.input(b".\nrest", &mut out), InputStatus::Done(2));
        assert!(out.ends_with("Captured 2 lines\n"));
    }

    #[test]
    fn test_capture_ctrl_d() {
        let mut capture = Capture::default();
        let mut out = String::new();
        assert_eq!(capture.input(b"x\x04", &mut out), InputStatus::Done(2));
        assert!(out.contains("Captured 0 lines"));
    }

    #[test]
    fn test_secure_command_refused_on_insecure_session() {
        let registry = CommandRegistry::with_builtins();
        let mut control = SessionControl::new(true, Verbosity::Normal, false);
        let (result, _) = run(&registry, "level debug", &mut control);
        assert_eq!(result.unwrap_err(), ConsoleError::Insecure);
        assert!(!registry.names(false).any(|n| n == "level"));
        assert!(registry.names(true).any(|n| n == "level"));
    }

    #[test]
    fn test_exit_sets_request() {
        let registry = CommandRegistry::with_builtins();
        let mut control = SessionControl::new(true, Verbosity::Normal, true);
        let (result, _) = run(&registry, "logout", &mut control);
        assert!(matches!(result, Ok(CommandOutcome::Done)));
        assert!(control.take_exit());
        assert!(!control.take_exit());
    }

    #[test]
    fn test_register_replaces_by_name() {
        fn quiet(_: &ParsedCommand<'_>, _: &mut CommandContext<'_>) -> Result<CommandOutcome, ConsoleError> {
            Ok(CommandOutcome::Done)
        }
        let mut registry = CommandRegistry::with_builtins();
        let before = registry.names(true).count();
        registry.register(CommandDescriptor { name: "help", brief: "quiet", usage: "help", values: &[], secure: false, handler: quiet });
        assert_eq!(registry.names(true).count(), before);
        assert_eq!(registry.find("help").map(|c| c.brief), Some("quiet"));
    }
}

//! Module: config
//!
//! Purpose: Console knobs for every transport's sessions.
//!
//! Architecture:
//! - `ConsoleConfig::default()`: compiled-in values
//! - `nvs::load_console_config()`: overrides from flash on target
//! - Sessions copy the config at creation; later changes apply to new
//!   sessions only. Per-session flags (monitor, verbosity) then live in
//!   the session and are changed by console commands.

use std::time::Duration;

use crate::task::TaskConfig;

pub mod nvs;

/// Default depth of a session's event queue.
pub const DEFAULT_QUEUE_DEPTH: usize = 100;

/// Default depth of a session's deferred alert queue.
pub const DEFAULT_DEFERRED_DEPTH: usize = 32;

/// How much output a command may produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Verbosity {
    /// Fits a short status reply.
    Minimal = 0,
    /// Normal interactive output.
    Normal = 1,
    /// Everything.
    Verbose = 2,
}

impl Verbosity {
    /// Output budget in bytes.
    pub fn max_output(self) -> usize {
        match self {
            Verbosity::Minimal => 140,
            Verbosity::Normal => 1024,
            Verbosity::Verbose => 65535,
        }
    }

    /// Convert to string for output.
    pub fn as_str(self) -> &'static str {
        match self {
            Verbosity::Minimal => "minimal",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
        }
    }

    /// Parse a name as printed by `as_str`.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "minimal" => Some(Verbosity::Minimal),
            "normal" => Some(Verbosity::Normal),
            "verbose" => Some(Verbosity::Verbose),
            _ => None,
        }
    }

    /// Convert from raw u8 value.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Verbosity::Minimal,
            1 => Verbosity::Normal,
            _ => Verbosity::Verbose,
        }
    }
}

/// Knobs shared by every console session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsoleConfig {
    /// Event queue depth per session.
    pub queue_depth: usize,
    /// Deferred alert queue depth per session.
    pub deferred_depth: usize,
    /// Whether new sessions print log messages.
    pub monitor: bool,
    /// Command output verbosity for new sessions.
    pub verbosity: Verbosity,
    /// Idle wait after printing, before housekeeping runs.
    pub housekeeping: Duration,
    /// Longest a receiver waits to queue input.
    pub recv_timeout: Duration,
    /// Delay before a session prints its banner.
    pub startup_delay: Duration,
    /// Telnet listen port.
    pub telnet_port: u16,
    /// Prompt string.
    pub prompt: String,
    /// Thread parameters for session tasks.
    pub session_task: TaskConfig,
    /// Thread parameters for satellite receiver tasks.
    pub receiver_task: TaskConfig,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            queue_depth: DEFAULT_QUEUE_DEPTH,
            deferred_depth: DEFAULT_DEFERRED_DEPTH,
            monitor: true,
            verbosity: Verbosity::Verbose,
            housekeeping: Duration::from_millis(200),
            recv_timeout: Duration::from_millis(1000),
            startup_delay: Duration::from_millis(50),
            telnet_port: 23,
            prompt: "vtm# ".to_string(),
            session_task: TaskConfig::with_stack(6000),
            receiver_task: TaskConfig::with_stack(2048),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_round_trip_names() {
        for v in [Verbosity::Minimal, Verbosity::Normal, Verbosity::Verbose] {
            assert_eq!(Verbosity::parse(v.as_str()), Some(v));
            assert_eq!(Verbosity::from_u8(v as u8), v);
        }
        assert_eq!(Verbosity::parse("loud"), None);
    }

    #[test]
    fn test_verbosity_budget_grows() {
        assert!(Verbosity::Minimal.max_output() < Verbosity::Normal.max_output());
        assert!(Verbosity::Normal.max_output() < Verbosity::Verbose.max_output());
    }

    #[test]
    fn test_default_depths() {
        let cfg = ConsoleConfig::default();
        assert_eq!(cfg.queue_depth, 100);
        assert_eq!(cfg.deferred_depth, 32);
        assert!(cfg.monitor);
    }
}

//! Command line parser
//!
//! Split on whitespace, at most `MAX_ARGS` arguments.

use super::ConsoleError;

/// Maximum number of arguments after the command name
pub const MAX_ARGS: usize = 8;

/// Parsed command with its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand<'a> {
    /// The command name (first token)
    pub command: &'a str,
    /// Arguments in order
    pub args: Vec<&'a str>,
}

impl<'a> ParsedCommand<'a> {
    /// Create empty command
    pub const fn empty() -> Self {
        Self {
            command: "",
            args: Vec::new(),
        }
    }

    /// Get argument by index (0-based)
    pub fn arg(&self, idx: usize) -> Option<&'a str> {
        self.args.get(idx).copied()
    }

    /// Number of arguments
    pub fn argc(&self) -> usize {
        self.args.len()
    }
}

/// Parse a command line into command and arguments
pub fn parse_line(line: &str) -> Result<ParsedCommand<'_>, ConsoleError> {
    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or("");
    let args: Vec<&str> = parts.collect();
    if args.len() > MAX_ARGS {
        return Err(ConsoleError::TooManyArgs);
    }
    Ok(ParsedCommand { command, args })
}

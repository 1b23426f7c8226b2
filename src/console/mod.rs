//! Command interpreter shared by every console session
//!
//! Each session owns a `Shell`; the command table is shared.

pub mod commands;
pub mod completion;
pub mod error;
pub mod history;
pub mod line_buffer;
pub mod parser;
pub mod shell;

pub use commands::{
    CommandContext, CommandDescriptor, CommandOutcome, CommandRegistry, InputConsumer, InputStatus,
    SessionControl,
};
pub use completion::Completer;
pub use error::ConsoleError;
pub use history::History;
pub use line_buffer::LineBuffer;
pub use parser::{parse_line, ParsedCommand};
pub use shell::{Shell, ShellEvent};

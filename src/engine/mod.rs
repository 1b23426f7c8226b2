//! Console engine: one coherent terminal session fed by two independent
//! sources, transport input and log output.
//!
//! - `event`: what goes through a session's queue
//! - `queue`: the bounded session queue
//! - `display`: display state and control sequences
//! - `deferred`: alerts held while a command owns the input
//! - `machine`: the per-session state machine
//! - `session`: the session task and its log sink

pub mod deferred;
pub mod display;
pub mod event;
pub mod machine;
pub mod queue;
pub mod session;

pub use deferred::DeferredQueue;
pub use display::DisplayState;
pub use event::{Event, LogBatch, RecvData};
pub use machine::{ConsoleEngine, Flow, SessionShared};
pub use queue::{EventQueue, Received, SendError, Wait};
pub use session::{ConsoleServices, ConsoleSession, SessionSink};

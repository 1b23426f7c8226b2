//! # RustVehicleConsole
//!
//! Interactive command console engine for a vehicle telemetry module.
//!
//! ## Architecture
//!
//! Every transport (UART, Telnet, SSH, BLE) runs the same session engine:
//! - `task`: parent/child task ownership with exactly-once teardown
//! - `engine`: per-session event queue and terminal display state machine
//! - `console`: line editor and command interpreter
//! - `transport`: channel adapters and satellite receivers
//! - `logging`: log delivery to every open console
//!
//! Tasks are `std` threads; on ESP-IDF they are FreeRTOS tasks.

pub mod config;
pub mod console;
pub mod engine;
pub mod logging;
pub mod sync;
pub mod task;
pub mod transport;

pub use config::ConsoleConfig;
pub use engine::{ConsoleEngine, ConsoleServices, ConsoleSession};
pub use logging::{ConsoleLogger, LogRouter};
pub use task::{Parent, TaskBase, TaskError};
pub use transport::{Transport, TransportError};

//! Shared test fixtures: a transport that records every write.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rust_vehicle_console::config::ConsoleConfig;
use rust_vehicle_console::console::CommandRegistry;
use rust_vehicle_console::engine::event::RecvData;
use rust_vehicle_console::engine::{ConsoleEngine, SessionShared};
use rust_vehicle_console::transport::{normalize_cr, Decoded, Transport};

pub const PROMPT: &str = "vtm# ";

/// Every `write` call, in order.
#[derive(Clone, Default)]
pub struct Writes(Arc<Mutex<Vec<Vec<u8>>>>);

impl Writes {
    pub fn calls(&self) -> Vec<Vec<u8>> {
        self.0.lock().unwrap().clone()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.calls().concat()).into_owned()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    /// Wait until the concatenated output contains `needle`.
    pub fn wait_for(&self, needle: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.text().contains(needle) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }
}

pub struct MockTransport {
    pub writes: Writes,
    pub exits: Arc<AtomicUsize>,
    pub secure: bool,
    after_cr: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            writes: Writes::default(),
            exits: Arc::new(AtomicUsize::new(0)),
            secure: true,
            after_cr: false,
        }
    }
}

impl Transport for MockTransport {
    fn name(&self) -> &str {
        "Mock"
    }

    fn write(&mut self, bytes: &[u8]) -> usize {
        self.writes.0.lock().unwrap().push(bytes.to_vec());
        bytes.len()
    }

    fn decode(&mut self, data: &RecvData, out: &mut Vec<u8>) -> Decoded {
        if let RecvData::Owned(bytes) = data {
            normalize_cr(bytes, out, &mut self.after_cr);
        }
        Decoded::Open
    }

    fn exit(&mut self) -> bool {
        self.exits.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn is_secure(&self) -> bool {
        self.secure
    }
}

pub fn test_config(deferred_depth: usize) -> ConsoleConfig {
    ConsoleConfig {
        deferred_depth,
        startup_delay: Duration::ZERO,
        housekeeping: Duration::from_millis(20),
        ..ConsoleConfig::default()
    }
}

/// Engine at the prompt with its banner already written and cleared.
pub fn engine_with(
    registry: CommandRegistry,
    deferred_depth: usize,
) -> (ConsoleEngine<MockTransport>, Writes, Arc<SessionShared>) {
    let transport = MockTransport::new();
    let writes = transport.writes.clone();
    let shared = Arc::new(SessionShared::default());
    let mut engine = ConsoleEngine::new(
        transport,
        Arc::new(registry),
        &test_config(deferred_depth),
        Arc::clone(&shared),
    );
    engine.start();
    writes.clear();
    (engine, writes, shared)
}

pub fn engine(deferred_depth: usize) -> (ConsoleEngine<MockTransport>, Writes, Arc<SessionShared>) {
    engine_with(CommandRegistry::with_builtins(), deferred_depth)
}

pub fn recv(bytes: &[u8]) -> rust_vehicle_console::engine::Event {
    rust_vehicle_console::engine::Event::Recv(RecvData::Owned(bytes.to_vec()))
}

pub fn alert(s: &str) -> rust_vehicle_console::engine::Event {
    rust_vehicle_console::engine::Event::Alert(s.to_string())
}

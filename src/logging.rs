//! Log delivery to console sessions.
//!
//! # Architecture
//!
//! ```text
//! any thread              LogRouter                  session queues
//! ──────────              ─────────                  ──────────────
//!
//! log::info!() ──▶ ConsoleLogger ──▶ [sink][sink] ──▶ Alert / AlertMulti
//!                  format line       snapshot,        try_send, never
//!                                    deliver unlocked blocks; full = lost
//! ```
//!
//! # Rules
//!
//! - A log producer never blocks and never sees a delivery failure.
//! - The registry lock is held only to copy the sink list.
//! - A multi-line message is delivered as one shared `LogBatch`, so its
//!   lines cannot interleave with other alerts.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

use crate::engine::event::LogBatch;
use crate::sync::lock;

/// Receiver of log output, one per console session.
pub trait LogSink: Send + Sync {
    /// Deliver one owned line.
    fn log(&self, line: String);

    /// Deliver one handle of a shared batch.
    fn log_multi(&self, batch: LogBatch);
}

/// Registration handle returned by `LogRouter::register`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SinkId(u32);

/// Registry of consoles receiving log output.
///
/// Cheap to clone; clones share the registry.
#[derive(Clone, Default)]
pub struct LogRouter {
    inner: Arc<RouterInner>,
}

#[derive(Default)]
struct RouterInner {
    sinks: Mutex<Vec<(SinkId, Arc<dyn LogSink>)>>,
    next_id: AtomicU32,
}

impl LogRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start delivering to `sink`.
    pub fn register(&self, sink: Arc<dyn LogSink>) -> SinkId {
        let id = SinkId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.inner.sinks).push((id, sink));
        id
    }

    /// Stop delivering to a sink. Returns whether it was registered.
    ///
    /// A delivery already in progress on another thread may still reach
    /// the sink once.
    pub fn deregister(&self, id: SinkId) -> bool {
        let mut sinks = lock(&self.inner.sinks);
        let before = sinks.len();
        sinks.retain(|(sid, _)| *sid != id);
        sinks.len() != before
    }

    /// Number of registered consoles.
    pub fn consoles(&self) -> usize {
        lock(&self.inner.sinks).len()
    }

    fn snapshot(&self) -> Vec<Arc<dyn LogSink>> {
        lock(&self.inner.sinks).iter().map(|(_, s)| Arc::clone(s)).collect()
    }

    /// Deliver one line to every console.
    pub fn log(&self, line: &str) {
        for sink in self.snapshot() {
            sink.log(line.to_string());
        }
    }

    /// Deliver a batch of lines to every console as one unit.
    ///
    /// Empty batches are not delivered.
    pub fn log_batch(&self, lines: Vec<String>) {
        if lines.is_empty() {
            return;
        }
        let batch = LogBatch::new(lines);
        for sink in self.snapshot() {
            sink.log_multi(batch.clone());
        }
        batch.release();
    }
}

/// `log` backend feeding the console router.
///
/// Lines look like ESP-IDF's: `I (1234) target: message`.
pub struct ConsoleLogger {
    router: LogRouter,
    started: Instant,
    fallback: Option<Box<dyn Log>>,
}

impl ConsoleLogger {
    pub fn new(router: LogRouter) -> Self {
        Self {
            router,
            started: Instant::now(),
            fallback: None,
        }
    }

    /// Also pass every record to another logger.
    pub fn with_fallback(mut self, fallback: Box<dyn Log>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Install as the global logger.
    pub fn init(self, level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(level);
        Ok(())
    }

    /// Format one record, split into lines each ending in `\n`.
    pub fn format(&self, record: &Record<'_>) -> Vec<String> {
        let ms = self.started.elapsed().as_millis();
        let text = format!("{}", record.args());
        let mut lines: Vec<String> = text
            .lines()
            .map(|line| format!("{} ({}) {}: {}\n", level_letter(record.level()), ms, record.target(), line))
            .collect();
        if lines.is_empty() {
            lines.push(format!("{} ({}) {}: \n", level_letter(record.level()), ms, record.target()));
        }
        lines
    }
}

/// ESP-IDF style level letter.
pub fn level_letter(level: log::Level) -> char {
    match level {
        log::Level::Error => 'E',
        log::Level::Warn => 'W',
        log::Level::Info => 'I',
        log::Level::Debug => 'D',
        log::Level::Trace => 'V',
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Some(fallback) = &self.fallback {
            fallback.log(record);
        }
        let mut lines = self.format(record);
        if lines.len() == 1 {
            if let Some(line) = lines.pop() {
                self.router.log(&line);
            }
        } else {
            self.router.log_batch(lines);
        }
    }

    fn flush(&self) {
        if let Some(fallback) = &self.fallback {
            fallback.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collect {
        lines: Mutex<Vec<String>>,
        batches: Mutex<Vec<LogBatch>>,
    }

    impl LogSink for Collect {
        fn log(&self, line: String) {
            self.lines.lock().unwrap().push(line);
        }
        fn log_multi(&self, batch: LogBatch) {
            self.batches.lock().unwrap().push(batch);
        }
    }

    #[test]
    fn test_register_and_deregister() {
        let router = LogRouter::new();
        let sink = Arc::new(Collect::default());
        let id = router.register(sink.clone());
        router.log("one\n");
        assert!(router.deregister(id));
        assert!(!router.deregister(id));
        router.log("two\n");
        assert_eq!(*sink.lines.lock().unwrap(), vec!["one\n".to_string()]);
        assert_eq!(router.consoles(), 0);
    }

    #[test]
    fn test_batch_shared_between_sinks() {
        let router = LogRouter::new();
        let a = Arc::new(Collect::default());
        let b = Arc::new(Collect::default());
        router.register(a.clone());
        router.register(b.clone());
        router.log_batch(vec!["x\n".into(), "y\n".into()]);
        router.log_batch(Vec::new());

        let held = a.batches.lock().unwrap()[0].clone();
        // a's queued handle, b's queued handle, and this clone.
        assert_eq!(held.holders(), 3);
        assert_eq!(b.batches.lock().unwrap().len(), 1);
        assert_eq!(held.lines(), ["x\n".to_string(), "y\n".to_string()]);
    }

    #[test]
    fn test_format_splits_lines() {
        let logger = ConsoleLogger::new(LogRouter::new());
        let lines = logger.format(
            &Record::builder()
                .level(log::Level::Warn)
                .target("can")
                .args(format_args!("a\nb"))
                .build(),
        );
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("W ("));
        assert!(lines[0].ends_with(" can: a\n"));
        assert!(lines[1].ends_with(" can: b\n"));
    }
}

//! Console session task: event loop, log registration, receiver ownership.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info};

use super::event::{Event, LogBatch};
use super::machine::{ConsoleEngine, Flow, SessionShared};
use super::queue::{EventQueue, Received};
use crate::config::ConsoleConfig;
use crate::console::CommandRegistry;
use crate::logging::{LogRouter, LogSink, SinkId};
use crate::sync::lock;
use crate::task::{Parent, TaskBase, TaskConfig, TaskContext, TaskError};
use crate::transport::{RecvLink, Transport};

/// What every session needs from the rest of the system.
#[derive(Clone)]
pub struct ConsoleServices {
    pub registry: Arc<CommandRegistry>,
    pub router: LogRouter,
    pub config: ConsoleConfig,
}

impl ConsoleServices {
    pub fn new(registry: CommandRegistry, router: LogRouter, config: ConsoleConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            router,
            config,
        }
    }
}

/// Log delivery into one session's queue. Never blocks.
pub struct SessionSink {
    queue: Arc<EventQueue>,
    shared: Arc<SessionShared>,
}

impl SessionSink {
    pub fn new(queue: Arc<EventQueue>, shared: Arc<SessionShared>) -> Self {
        Self { queue, shared }
    }
}

impl LogSink for SessionSink {
    fn log(&self, line: String) {
        if self.queue.try_send(Event::Alert(line)).is_err() {
            self.shared.record_lost();
        }
    }

    fn log_multi(&self, batch: LogBatch) {
        // A refused batch handle is dropped with the error.
        if self.queue.try_send(Event::AlertMulti(batch)).is_err() {
            self.shared.record_lost();
        }
    }
}

/// One interactive session as a task.
///
/// Created on connection accept; ends when the channel closes or its
/// owner deletes it. Teardown deregisters from the router before the
/// queue is drained.
pub struct ConsoleSession<T: Transport> {
    name: String,
    task: TaskConfig,
    queue: Arc<EventQueue>,
    shared: Arc<SessionShared>,
    router: LogRouter,
    sink: Mutex<Option<SinkId>>,
    engine: Mutex<Option<ConsoleEngine<T>>>,
    recv_timeout: Duration,
    startup_delay: Duration,
    receivers: Parent,
}

impl<T: Transport> ConsoleSession<T> {
    pub fn new(transport: T, services: &ConsoleServices) -> Self {
        let config = &services.config;
        let name = format!("{}Console", transport.name().split_whitespace().next().unwrap_or("Console"));
        let shared = Arc::new(SessionShared::default());
        let engine = ConsoleEngine::new(transport, Arc::clone(&services.registry), config, Arc::clone(&shared));
        Self {
            name,
            task: config.session_task,
            queue: Arc::new(EventQueue::new(config.queue_depth)),
            shared,
            router: services.router.clone(),
            sink: Mutex::new(None),
            engine: Mutex::new(Some(engine)),
            recv_timeout: config.recv_timeout,
            startup_delay: config.startup_delay,
            receivers: Parent::new(),
        }
    }

    /// Where inbound data for this session goes.
    pub fn recv_link(&self) -> RecvLink {
        RecvLink {
            queue: Arc::clone(&self.queue),
            timeout: self.recv_timeout,
        }
    }

    /// Alerts refused because the queue was full.
    pub fn lost(&self) -> u32 {
        self.shared.lost()
    }
}

impl<T: Transport> TaskBase for ConsoleSession<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> TaskConfig {
        self.task
    }

    fn instantiate(&self) -> Result<(), TaskError> {
        let receiver = match lock(&self.engine).as_mut() {
            Some(engine) => engine.transport_mut().receiver(self.recv_link()),
            None => None,
        };
        if let Some(receiver) = receiver {
            self.receivers.add_child(receiver)?;
        }
        let sink = Arc::new(SessionSink::new(Arc::clone(&self.queue), Arc::clone(&self.shared)));
        *lock(&self.sink) = Some(self.router.register(sink));
        Ok(())
    }

    fn service(&self, ctx: &TaskContext) {
        let Some(mut engine) = lock(&self.engine).take() else {
            return;
        };

        std::thread::sleep(self.startup_delay);
        engine.start();
        info!("{} started {}", self.name, ctx.id());

        while !ctx.is_cancelled() {
            match self.queue.recv(engine.wait()) {
                Received::Event(event) => {
                    if engine.handle(event) == Flow::Terminate {
                        break;
                    }
                }
                Received::Timeout => engine.on_timeout(),
                Received::Closed => break,
            }
        }
        debug!("{} loop ended", self.name);
    }

    fn cleanup(&self) {
        if let Some(id) = lock(&self.sink).take() {
            self.router.deregister(id);
        }
        let released = self.queue.close();
        if released > 0 {
            debug!("{}: released {} queued events", self.name, released);
        }
        self.receivers.delete_children();
        info!("{} closed", self.name);
    }
}

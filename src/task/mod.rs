//! Task ownership for console sessions, servers and receivers.
//!
//! # Architecture
//!
//! ```text
//! Parent ──owns──▶ [child]──[child]──[child]     list under a short lock
//!    │                          │
//!    │ delete_child()           │ service() returns
//!    ▼                          ▼
//!  unlink ◀──── one arbiter ───▶ unlink
//!    │ won                       │ won
//!    ▼                           ▼
//!  cleanup, cancel, detach     cleanup, thread exits
//! ```
//!
//! # Rules
//!
//! - A task has at most one owner at any instant.
//! - Whoever performs the successful unlink runs `cleanup`. The loser does
//!   nothing destructive.
//! - The child list lock is never held across teardown work.

mod parent;

pub use parent::Parent;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;

use log::{debug, error};

use crate::sync::{lock, Semaphore};
use parent::ParentInner;

/// Default task stack size in bytes (on target).
pub const DEFAULT_STACK: usize = 4096;

/// Default FreeRTOS priority for console tasks.
pub const DEFAULT_PRIORITY: u8 = 5;

/// Host threads get at least this much stack; target sizes are tuned for
/// the ESP-IDF allocator, not for unoptimised host builds.
#[cfg(not(target_os = "espidf"))]
const HOST_MIN_STACK: usize = 256 * 1024;

/// Execution parameters for a task's thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskConfig {
    /// Stack size in bytes.
    pub stack_size: usize,
    /// Scheduler priority (target only).
    pub priority: u8,
    /// Pin to this core (target only).
    pub pin_to_core: Option<u8>,
}

impl TaskConfig {
    /// Config with the given stack and default priority, pinned to core 1.
    pub const fn with_stack(stack_size: usize) -> Self {
        Self {
            stack_size,
            priority: DEFAULT_PRIORITY,
            pin_to_core: Some(1),
        }
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self::with_stack(DEFAULT_STACK)
    }
}

/// Task creation errors.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The execution context could not be created.
    #[error("insufficient memory to create {name} task: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
    /// The task's own pre-start hook refused to start.
    #[error("{name} task failed to instantiate: {reason}")]
    Instantiate { name: String, reason: String },
}

/// Unique task identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u32);

impl TaskId {
    fn next() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric id.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl core::fmt::Display for TaskId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One execution unit.
///
/// The task object is shared between its own thread and its owner's child
/// list, so every hook takes `&self`; state the body mutates lives behind
/// the implementor's own lock.
pub trait TaskBase: Send + Sync + 'static {
    /// Task name, used for the thread and in logs.
    fn name(&self) -> &str;

    /// Thread parameters.
    fn config(&self) -> TaskConfig {
        TaskConfig::default()
    }

    /// Acquire whatever the task needs before its thread starts.
    ///
    /// An error here is a creation failure: `cleanup` runs and the task is
    /// discarded without ever becoming visible to its parent.
    fn instantiate(&self) -> Result<(), TaskError> {
        Ok(())
    }

    /// Task body, executed in the task's own thread.
    ///
    /// Must return once `ctx.is_cancelled()` or once `cleanup` has closed
    /// whatever it blocks on.
    fn service(&self, ctx: &TaskContext);

    /// Release resources. Runs exactly once, on whichever destruction path
    /// wins, and may run on a thread other than the task's own.
    fn cleanup(&self) {}
}

/// Per-task execution state shared by the task's thread and its owner.
pub struct TaskContext {
    id: TaskId,
    name: String,
    parent: Option<Weak<ParentInner>>,
    cancelled: AtomicBool,
    /// Unlinked by `remove_child`; owns its destruction from then on.
    orphaned: AtomicBool,
    /// Opened once the task is registered with its parent.
    gate: Semaphore,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl TaskContext {
    fn new(name: &str, parent: Option<Weak<ParentInner>>) -> Self {
        Self {
            id: TaskId::next(),
            name: name.to_string(),
            parent,
            cancelled: AtomicBool::new(false),
            orphaned: AtomicBool::new(false),
            gate: Semaphore::new(),
            thread: Mutex::new(None),
        }
    }

    /// Task id.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Task name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once the owner has torn this task down.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Check whether the task's thread has been detached by teardown.
    pub fn is_detached(&self) -> bool {
        lock(&self.thread).is_none()
    }

    pub(crate) fn orphan(&self) {
        self.orphaned.store(true, Ordering::Release);
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.gate.give();
    }

    /// End-of-work path, run in the task's own thread.
    ///
    /// Returns whether this path owned destruction. When it did not, a
    /// forced teardown already ran `cleanup` and the task must not touch
    /// its resources again.
    fn self_terminate(&self, task: &dyn TaskBase) -> bool {
        let owned = match &self.parent {
            None => true,
            // A dropped parent unlinked every child before going away.
            Some(parent) => {
                parent.upgrade().is_some_and(|p| p.unlink(self.id).is_some())
                    || self.orphaned.load(Ordering::Acquire)
            }
        };
        if owned {
            task.cleanup();
            drop(lock(&self.thread).take());
        }
        owned
    }
}

/// A started task as held by its owner.
pub(crate) struct Child {
    task: Arc<dyn TaskBase>,
    context: Arc<TaskContext>,
}

impl Child {
    fn id(&self) -> TaskId {
        self.context.id
    }

    /// Forced teardown, run outside the task's own thread.
    fn teardown(self) {
        debug!("Deleting task {} {}", self.context.name, self.context.id);
        self.task.cleanup();
        self.context.cancel();
        // A thread cannot be killed: cleanup unblocked it, detach it here.
        drop(lock(&self.context.thread).take());
    }
}

/// Start a task that owns its own destruction.
///
/// Used for top-level tasks that have no parent: it always wins the
/// self-termination path.
pub fn spawn(task: Arc<dyn TaskBase>) -> Result<Arc<TaskContext>, TaskError> {
    let child = start(task, None)?;
    child.context.gate.give();
    Ok(child.context)
}

fn start(task: Arc<dyn TaskBase>, parent: Option<Weak<ParentInner>>) -> Result<Child, TaskError> {
    if let Err(e) = task.instantiate() {
        error!("{}", e);
        task.cleanup();
        return Err(e);
    }

    let context = Arc::new(TaskContext::new(task.name(), parent));
    let config = task.config();
    let name = task.name().to_string();
    let handle = {
        let task = Arc::clone(&task);
        let context = Arc::clone(&context);
        spawn_thread(&config, &name, move || run(task, context))
    };

    match handle {
        Ok(handle) => {
            *lock(&context.thread) = Some(handle);
            Ok(Child { task, context })
        }
        Err(source) => {
            let e = TaskError::Spawn { name: task.name().to_string(), source };
            error!("{}", e);
            task.cleanup();
            Err(e)
        }
    }
}

fn run(task: Arc<dyn TaskBase>, context: Arc<TaskContext>) {
    context.gate.take();
    if !context.is_cancelled() {
        task.service(&context);
    }
    debug!("Task {} {} finished", context.name, context.id);
    context.self_terminate(task.as_ref());
}

#[cfg(not(target_os = "espidf"))]
fn spawn_thread<F>(config: &TaskConfig, name: &str, f: F) -> std::io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name(name.to_string())
        .stack_size(config.stack_size.max(HOST_MIN_STACK))
        .spawn(f)
}

#[cfg(target_os = "espidf")]
fn spawn_thread<F>(config: &TaskConfig, name: &str, f: F) -> std::io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    use esp_idf_svc::hal::cpu::Core;
    use esp_idf_svc::hal::task::thread::ThreadSpawnConfiguration;

    let spawn_config = ThreadSpawnConfiguration {
        stack_size: config.stack_size,
        priority: config.priority,
        pin_to_core: config.pin_to_core.map(|core| if core == 0 { Core::Core0 } else { Core::Core1 }),
        ..Default::default()
    };
    spawn_config
        .set()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    let handle = std::thread::Builder::new()
        .name(name.to_string())
        .stack_size(config.stack_size)
        .spawn(f);

    // Restore defaults so unrelated std threads are not pinned.
    let _ = ThreadSpawnConfiguration::default().set();
    handle
}

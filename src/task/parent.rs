//! Parent side of task ownership.

use std::sync::{Arc, Mutex};

use super::{start, Child, TaskBase, TaskError, TaskId};
use crate::sync::lock;

/// Owner of a set of child tasks.
///
/// Dropping the parent force-deletes every remaining child.
pub struct Parent {
    inner: Arc<ParentInner>,
}

pub(crate) struct ParentInner {
    children: Mutex<Vec<Child>>,
}

impl ParentInner {
    /// Unlink a child. The single arbitration point for destruction.
    pub(crate) fn unlink(&self, id: TaskId) -> Option<Child> {
        let mut children = lock(&self.children);
        let pos = children.iter().position(|c| c.id() == id)?;
        Some(children.remove(pos))
    }

    /// Unlink a child and make it the owner of its own destruction.
    fn release(&self, id: TaskId) -> bool {
        let mut children = lock(&self.children);
        match children.iter().position(|c| c.id() == id) {
            Some(pos) => {
                // Set under the lock: a racing self-termination sees it.
                children[pos].context.orphan();
                children.remove(pos);
                true
            }
            None => false,
        }
    }

    fn pop(&self) -> Option<Child> {
        lock(&self.children).pop()
    }
}

impl Parent {
    /// Create a parent with no children.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ParentInner { children: Mutex::new(Vec::new()) }),
        }
    }

    /// Create and start a child task.
    ///
    /// On failure the task's `cleanup` has already run and nothing was
    /// registered. The child cannot begin `service` before it is visible
    /// in the list.
    pub fn add_child(&self, task: Arc<dyn TaskBase>) -> Result<TaskId, TaskError> {
        let child = start(task, Some(Arc::downgrade(&self.inner)))?;
        let id = child.id();
        let context = Arc::clone(&child.context);
        lock(&self.inner.children).push(child);
        context.gate.give();
        Ok(id)
    }

    /// Unlink a running child without tearing it down.
    ///
    /// The child keeps running and runs its own `cleanup` when `service`
    /// returns. Returns whether it was actually removed. Of any number of
    /// racing callers for the same id, exactly one observes `true`.
    pub fn remove_child(&self, id: TaskId) -> bool {
        self.inner.release(id)
    }

    /// Unlink and tear down a child from outside its own thread.
    ///
    /// Teardown happens only if this call won the unlink; returns whether
    /// it did. A child that already ended on its own is left alone.
    pub fn delete_child(&self, id: TaskId) -> bool {
        match self.inner.unlink(id) {
            Some(child) => {
                child.teardown();
                true
            }
            None => false,
        }
    }

    /// Tear down every child.
    ///
    /// The lock is held only to pop each child, so a child's teardown may
    /// add or remove children of this parent without deadlocking.
    pub fn delete_children(&self) {
        while let Some(child) = self.inner.pop() {
            child.teardown();
        }
    }

    /// Number of registered children.
    pub fn len(&self) -> usize {
        lock(&self.inner.children).len()
    }

    /// True if no children are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids and names of the registered children.
    pub fn children(&self) -> Vec<(TaskId, String)> {
        lock(&self.inner.children)
            .iter()
            .map(|c| (c.id(), c.context.name().to_string()))
            .collect()
    }
}

impl Default for Parent {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Parent {
    fn drop(&mut self) {
        self.delete_children();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskContext;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    /// Runs until cancelled, counting cleanups.
    struct Sleeper {
        cleanups: Arc<AtomicUsize>,
    }

    impl TaskBase for Sleeper {
        fn name(&self) -> &str {
            "sleeper"
        }

        fn service(&self, ctx: &TaskContext) {
            while !ctx.is_cancelled() {
                std::thread::sleep(Duration::from_millis(1));
            }
        }

        fn cleanup(&self) {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Ends immediately and reports which path cleaned it up.
    struct OneShot {
        done: Mutex<Option<mpsc::Sender<()>>>,
    }

    impl TaskBase for OneShot {
        fn name(&self) -> &str {
            "oneshot"
        }

        fn service(&self, _ctx: &TaskContext) {}

        fn cleanup(&self) {
            if let Some(tx) = lock(&self.done).take() {
                let _ = tx.send(());
            }
        }
    }

    #[test]
    fn test_add_and_delete_child() {
        let parent = Parent::new();
        let cleanups = Arc::new(AtomicUsize::new(0));
        let id = parent
            .add_child(Arc::new(Sleeper { cleanups: Arc::clone(&cleanups) }))
            .unwrap();

        assert_eq!(parent.len(), 1);
        assert!(parent.delete_child(id));
        assert!(parent.is_empty());
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);

        // Second delete finds nothing to do
        assert!(!parent.delete_child(id));
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_child_removes_itself() {
        let parent = Parent::new();
        let (tx, rx) = mpsc::channel();
        parent
            .add_child(Arc::new(OneShot { done: Mutex::new(Some(tx)) }))
            .unwrap();

        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(parent.is_empty());
    }

    #[test]
    fn test_drop_deletes_children() {
        let cleanups = Arc::new(AtomicUsize::new(0));
        {
            let parent = Parent::new();
            for _ in 0..3 {
                parent
                    .add_child(Arc::new(Sleeper { cleanups: Arc::clone(&cleanups) }))
                    .unwrap();
            }
            assert_eq!(parent.children().len(), 3);
        }
        assert_eq!(cleanups.load(Ordering::SeqCst), 3);
    }
}

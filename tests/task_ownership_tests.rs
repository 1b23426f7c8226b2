//! Parent/child task ownership: exactly-once teardown under races.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use rand::Rng;
use rust_vehicle_console::sync::Semaphore;
use rust_vehicle_console::task::{Parent, TaskBase, TaskContext, TaskError};

/// Signals when the last handle to a task goes away.
struct DropSignal(Mutex<Option<mpsc::Sender<()>>>);

impl Drop for DropSignal {
    fn drop(&mut self) {
        if let Some(tx) = self.0.lock().unwrap().take() {
            let _ = tx.send(());
        }
    }
}

/// Ends on its own after a random delay, racing its owner's delete.
struct Racer {
    start: Arc<Barrier>,
    jitter: Duration,
    counter: Arc<AtomicUsize>,
    _dropped: DropSignal,
}

impl TaskBase for Racer {
    fn name(&self) -> &str {
        "racer"
    }

    fn service(&self, _ctx: &TaskContext) {
        self.start.wait();
        thread::sleep(self.jitter);
    }

    fn cleanup(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_self_termination_races_delete() {
    let parent = Parent::new();
    let mut rng = rand::rng();

    for round in 0..1000 {
        let start = Arc::new(Barrier::new(2));
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();
        let racer = Arc::new(Racer {
            start: Arc::clone(&start),
            jitter: Duration::from_micros(rng.random_range(0..50)),
            counter: Arc::clone(&counter),
            _dropped: DropSignal(Mutex::new(Some(tx))),
        });
        let id = parent.add_child(racer).unwrap();

        start.wait();
        thread::sleep(Duration::from_micros(rng.random_range(0..50)));
        parent.delete_child(id);

        // Both paths have let go of the task.
        rx.recv_timeout(Duration::from_secs(5))
            .unwrap_or_else(|_| panic!("round {} never released the task", round));
        assert_eq!(counter.load(Ordering::SeqCst), 1, "round {}", round);
        assert!(parent.is_empty());
    }
}

/// Blocks until released, never cancelled by anything but its owner.
struct Blocker {
    release: Arc<Semaphore>,
    cleanups: Arc<AtomicUsize>,
}

impl TaskBase for Blocker {
    fn name(&self) -> &str {
        "blocker"
    }

    fn service(&self, _ctx: &TaskContext) {
        self.release.take();
    }

    fn cleanup(&self) {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        self.release.close();
    }
}

#[test]
fn test_remove_child_succeeds_once() {
    let parent = Arc::new(Parent::new());
    let release = Arc::new(Semaphore::new());
    let cleanups = Arc::new(AtomicUsize::new(0));
    let id = parent
        .add_child(Arc::new(Blocker {
            release: Arc::clone(&release),
            cleanups: Arc::clone(&cleanups),
        }))
        .unwrap();

    let wins: usize = (0..8)
        .map(|_| {
            let parent = Arc::clone(&parent);
            thread::spawn(move || parent.remove_child(id))
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|h| h.join().unwrap() as usize)
        .sum();

    assert_eq!(wins, 1);
    assert!(parent.is_empty());
    assert!(!parent.delete_child(id));

    // Unlinked but not torn down: ending on its own, it cleans up once.
    assert_eq!(cleanups.load(Ordering::SeqCst), 0);
    release.give();
    assert!(wait_until(|| cleanups.load(Ordering::SeqCst) == 1));
    thread::sleep(Duration::from_millis(20));
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
}

#[test]
fn test_remove_child_races_self_termination() {
    let parent = Parent::new();
    let mut rng = rand::rng();

    for round in 0..200 {
        let start = Arc::new(Barrier::new(2));
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();
        let id = parent
            .add_child(Arc::new(Racer {
                start: Arc::clone(&start),
                jitter: Duration::from_micros(rng.random_range(0..50)),
                counter: Arc::clone(&counter),
                _dropped: DropSignal(Mutex::new(Some(tx))),
            }))
            .unwrap();

        start.wait();
        thread::sleep(Duration::from_micros(rng.random_range(0..50)));
        parent.remove_child(id);

        rx.recv_timeout(Duration::from_secs(5))
            .unwrap_or_else(|_| panic!("round {} never released the task", round));
        assert_eq!(counter.load(Ordering::SeqCst), 1, "round {}", round);
        assert!(parent.is_empty());
    }
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while std::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

struct Refuses {
    cleanups: Arc<AtomicUsize>,
    ran: Arc<AtomicBool>,
}

impl TaskBase for Refuses {
    fn name(&self) -> &str {
        "refuses"
    }

    fn instantiate(&self) -> Result<(), TaskError> {
        Err(TaskError::Instantiate {
            name: self.name().to_string(),
            reason: "no socket".to_string(),
        })
    }

    fn service(&self, _ctx: &TaskContext) {
        self.ran.store(true, Ordering::SeqCst);
    }

    fn cleanup(&self) {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_failed_create_registers_nothing() {
    let parent = Parent::new();
    let cleanups = Arc::new(AtomicUsize::new(0));
    let ran = Arc::new(AtomicBool::new(false));

    let result = parent.add_child(Arc::new(Refuses {
        cleanups: Arc::clone(&cleanups),
        ran: Arc::clone(&ran),
    }));

    assert!(matches!(result, Err(TaskError::Instantiate { .. })));
    assert!(parent.is_empty());
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    assert!(!ran.load(Ordering::SeqCst));
}

#[test]
fn test_delete_children_tears_down_all() {
    let parent = Parent::new();
    let cleanups = Arc::new(AtomicUsize::new(0));
    for _ in 0..4 {
        parent
            .add_child(Arc::new(Blocker {
                release: Arc::new(Semaphore::new()),
                cleanups: Arc::clone(&cleanups),
            }))
            .unwrap();
    }
    assert_eq!(parent.len(), 4);

    parent.delete_children();

    assert!(parent.is_empty());
    assert_eq!(cleanups.load(Ordering::SeqCst), 4);
}

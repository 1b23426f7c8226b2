//! History buffer tests

use rust_vehicle_console::console::history::{History, HISTORY_SIZE};

#[test]
fn test_history_empty() {
    let mut history = History::new();
    assert!(history.get_prev().is_none());
    assert!(history.get_next().is_none());
}

#[test]
fn test_history_push_and_recall() {
    let mut history = History::new();

    history.push("help");
    history.push("monitor no");

    // Navigate back
    assert_eq!(history.get_prev(), Some("monitor no"));
    assert_eq!(history.get_prev(), Some("help"));
    assert_eq!(history.get_prev(), Some("help")); // stays at oldest

    // Navigate forward
    assert_eq!(history.get_next(), Some("monitor no"));
    assert_eq!(history.get_next(), None); // back to current input
}

#[test]
fn test_history_overflow() {
    let mut history = History::new();

    for i in 0..=HISTORY_SIZE {
        history.push(&format!("cmd{}", i));
    }
    assert_eq!(history.len(), HISTORY_SIZE);

    // cmd0 was dropped
    for _ in 0..HISTORY_SIZE {
        history.get_prev();
    }
    assert_eq!(history.get_prev(), Some("cmd1"));
}

#[test]
fn test_history_skips_repeats_and_blanks() {
    let mut history = History::new();

    history.push("help");
    history.push("help");
    history.push("");
    assert_eq!(history.len(), 1);
}

#[test]
fn test_history_reset_on_push() {
    let mut history = History::new();

    history.push("cmd1");
    history.push("cmd2");

    // Navigate back
    history.get_prev();

    // Push new command resets navigation
    history.push("cmd3");

    // Should start from newest
    assert_eq!(history.get_prev(), Some("cmd3"));
}

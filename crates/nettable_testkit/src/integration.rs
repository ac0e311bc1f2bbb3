//! Helpers for waiting on replication.

use nettable::ChangeEvent;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

/// Default time to wait for replication in tests.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);

/// Polls `condition` until it holds or `timeout` passes.
///
/// Returns whether the condition held.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Receives exactly `count` events, waiting up to `timeout` in total.
///
/// # Panics
///
/// Panics if fewer than `count` events arrive in time.
pub fn expect_changes(
    events: &Receiver<ChangeEvent>,
    count: usize,
    timeout: Duration,
) -> Vec<ChangeEvent> {
    let deadline = Instant::now() + timeout;
    let mut received = Vec::with_capacity(count);
    while received.len() < count {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(event) => received.push(event),
            Err(_) => panic!(
                "expected {count} changes, got {}: {:?}",
                received.len(),
                received.iter().map(|e| e.key.as_str()).collect::<Vec<_>>()
            ),
        }
    }
    received
}

/// Asserts that no event arrives within `quiet`.
///
/// # Panics
///
/// Panics with the unexpected event.
pub fn expect_no_changes(events: &Receiver<ChangeEvent>, quiet: Duration) {
    if let Ok(event) = events.recv_timeout(quiet) {
        panic!("unexpected change of {}: {:?}", event.key, event.kind);
    }
}

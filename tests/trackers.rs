use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use weft::{Signal, Tracker};

#[test]
fn test_dropping_a_tracker_disconnects_the_slot() {
    let signal = Signal::<()>::new();
    let tracker = Tracker::new();

    let connection = signal.connect(|_: &()| {}).bind(&tracker);
    assert!(connection.is_valid());

    drop(tracker);
    assert!(!connection.is_valid());
    assert!(signal.emit(()).is_empty());
}

#[test]
fn test_shared_handle_as_tracker() {
    let signal = Signal::<()>::new();
    let anchor = Arc::new(42u32);

    let connection = signal.connect(|_: &()| {}).bind(&anchor);
    assert!(connection.is_valid());
    assert_eq!(signal.emit(()).len(), 1);

    drop(anchor);
    assert!(!connection.is_valid());
    assert!(signal.emit(()).is_empty());
}

#[test]
fn test_either_of_two_trackers_invalidates_the_slot() {
    let signal = Signal::<()>::new();
    let anchor = Arc::new(());
    let tracker = Tracker::new();

    let connection = signal.connect(|_: &()| {}).bind(&anchor).bind(&tracker);
    assert!(connection.is_valid());

    drop(tracker);
    assert!(!connection.is_valid());
    // The other witness is still alive; the slot stays dead regardless.
    assert!(signal.emit(()).is_empty());
}

#[test]
fn test_one_tracker_governs_slots_of_multiple_signals() {
    let unit_signal = Signal::<()>::new();
    let value_signal = Signal::<(), i32>::new();
    let tracker = Tracker::new();

    let connection1 = unit_signal.connect(|_: &()| {}).bind(&tracker);
    let connection2 = value_signal.connect(|_: &()| 0).bind(&tracker);
    assert!(connection1.is_valid());
    assert!(connection2.is_valid());

    drop(tracker);
    assert!(!connection1.is_valid());
    assert!(!connection2.is_valid());
}

#[test]
fn test_clear_disconnects_without_dropping_the_tracker() {
    let signal = Signal::<()>::new();
    let tracker = Tracker::new();

    let connection = signal.connect(|_: &()| {}).bind(&tracker);
    tracker.clear();

    assert!(!connection.is_valid());
    assert!(signal.emit(()).is_empty());

    // The tracker is still usable for new slots.
    let connection = signal.connect(|_: &()| {}).bind(&tracker);
    assert!(connection.is_valid());
    assert_eq!(signal.emit(()).len(), 1);
}

#[test]
fn test_untracked_slot_survives_the_tracker() {
    let signal = Signal::<()>::new();
    let tracker = Tracker::new();

    let connection = signal.connect(|_: &()| {}).bind(&tracker);
    tracker.untrack(&connection);
    drop(tracker);

    assert!(connection.is_valid());
    assert_eq!(signal.emit(()).len(), 1);
}

#[test]
fn test_dropping_the_tracker_inside_a_governed_slot() {
    let signal = Signal::<()>::new();
    let tracker = Arc::new(Mutex::new(Some(Tracker::new())));
    let counter = Arc::new(AtomicUsize::new(0));

    {
        let counter = counter.clone();
        signal.connect(move |_: &()| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }
    let connection = {
        let tracker_cell = tracker.clone();
        let connection = signal.connect(move |_: &()| {
            tracker_cell.lock().unwrap().take();
        });
        let guard = tracker.lock().unwrap();
        connection.bind(guard.as_ref().unwrap())
    };
    {
        let counter = counter.clone();
        signal.connect(move |_: &()| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }

    // All three slots run: the tracker dies while its own slot is active,
    // which disconnects that slot but does not abort the emission.
    assert_eq!(signal.emit(()).len(), 3);
    assert!(tracker.lock().unwrap().is_none());
    assert!(!connection.is_valid());
    assert_eq!(signal.emit(()).len(), 2);
    assert_eq!(counter.load(Ordering::SeqCst), 4);
}

#[test]
fn test_explicit_track_on_a_connection() {
    let signal = Signal::<()>::new();
    let tracker = Tracker::new();

    let connection = signal.connect(|_: &()| {});
    tracker.track(&connection);
    assert!(connection.is_valid());

    drop(tracker);
    assert!(!connection.is_valid());
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use weft::{Property, Signal};

#[test]
fn test_concurrent_emissions_never_double_activate() {
    let signal = Arc::new(Signal::<()>::new());
    let counter = Arc::new(AtomicUsize::new(0));
    {
        let counter = counter.clone();
        signal.connect(move |_: &()| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }

    // Emissions overlapping on other threads are no-ops; whatever ran must
    // match the side effects exactly.
    let activations: usize = (0..4)
        .map(|_| {
            let signal = signal.clone();
            thread::spawn(move || {
                let mut ran = 0;
                for _ in 0..250 {
                    ran += signal.emit(()).len();
                }
                ran
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .sum();

    assert_eq!(counter.load(Ordering::SeqCst), activations);
}

#[test]
fn test_connect_and_disconnect_race_emission() {
    let signal = Arc::new(Signal::<()>::new());
    let stable = Arc::new(AtomicUsize::new(0));
    {
        let stable = stable.clone();
        signal.connect(move |_: &()| {
            stable.fetch_add(1, Ordering::SeqCst);
        });
    }

    let churn = {
        let signal = signal.clone();
        thread::spawn(move || {
            for _ in 0..200 {
                let connection = signal.connect(|_: &()| {});
                connection.disconnect();
            }
        })
    };
    let emitter = {
        let signal = signal.clone();
        thread::spawn(move || {
            let mut ran = 0;
            for _ in 0..200 {
                ran += signal.emit(()).len();
            }
            ran
        })
    };

    churn.join().unwrap();
    let _ = emitter.join().unwrap();

    // Quiesced: exactly the stable slot remains.
    let before = stable.load(Ordering::SeqCst);
    assert_eq!(signal.emit(()).len(), 1);
    assert_eq!(stable.load(Ordering::SeqCst), before + 1);
}

#[test]
fn test_concurrent_property_writes_settle() {
    let property = Arc::new(Property::new(0usize));
    let notifications = Arc::new(AtomicUsize::new(0));
    {
        let notifications = notifications.clone();
        let _ = property.on_changed(move || {
            notifications.fetch_add(1, Ordering::SeqCst);
        });
    }

    let writers: Vec<_> = (1..=4)
        .map(|lane: usize| {
            let property = property.clone();
            thread::spawn(move || {
                for step in 0..100 {
                    property.set(lane * 1000 + step);
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let settled = property.get();
    let lane = settled / 1000;
    let step = settled % 1000;
    assert!((1..=4).contains(&lane));
    assert!(step < 100);
    // Every notification corresponds to a write; equal overwrites are silent.
    assert!(notifications.load(Ordering::SeqCst) <= 400);
}

#[test]
fn test_binding_scopes_are_per_thread() {
    let shared = Arc::new(Property::new(21i64));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let shared = shared.clone();
            thread::spawn(move || {
                // Each thread evaluates its own binding; the thread-local
                // scope on one thread must not leak tracking into another.
                let local = Property::new(0i64);
                local.bind({
                    let shared = shared.read();
                    move || shared.get() * 2
                });
                for _ in 0..100 {
                    assert_eq!(local.get(), 42);
                }
            })
        })
        .collect();

    for reader in readers {
        reader.join().unwrap();
    }
}

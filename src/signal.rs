use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::debug;

use crate::collector::{Collected, Collector, Last};
use crate::connection::Connection;
use crate::error::SlotError;
use crate::slot::{Callable, Slot, SlotControl};
use crate::tracker::SharedWitness;

pub mod hosted;

pub use hosted::HostedSignal;

/// Conversion of callables into slot functions.
///
/// Implemented for closures and functions `Fn(&A) -> R`, and for channel
/// senders (`std::sync::mpsc::Sender<A>`, and with the `tokio` feature
/// `tokio::sync::mpsc::UnboundedSender<A>`) on signals returning `()`.
pub trait IntoSlot<A, R> {
    fn into_slot_fn(self) -> Box<dyn Fn(&A) -> R + Send + Sync>;
}

impl<F, A, R> IntoSlot<A, R> for F
where F: Fn(&A) -> R + Send + Sync + 'static
{
    fn into_slot_fn(self) -> Box<dyn Fn(&A) -> R + Send + Sync> { Box::new(self) }
}

impl<A> IntoSlot<A, ()> for std::sync::mpsc::Sender<A>
where A: Clone + Send + 'static
{
    fn into_slot_fn(self) -> Box<dyn Fn(&A) + Send + Sync> {
        Box::new(move |args: &A| {
            // The receiving end may already be gone.
            let _ = self.send(args.clone());
        })
    }
}

#[cfg(feature = "tokio")]
impl<A> IntoSlot<A, ()> for tokio::sync::mpsc::UnboundedSender<A>
where A: Clone + Send + 'static
{
    fn into_slot_fn(self) -> Box<dyn Fn(&A) + Send + Sync> {
        Box::new(move |args: &A| {
            let _ = self.send(args.clone());
        })
    }
}

pub(crate) struct SignalInner<A: 'static, R: 'static> {
    slots: Mutex<Vec<Arc<Slot<A, R>>>>,
    /// Slots of other signals forwarding into this one; they are disconnected
    /// when this signal is dropped.
    inbound: Mutex<Vec<Weak<dyn SlotControl>>>,
    blocked: AtomicBool,
    emitting: AtomicBool,
}

impl<A: 'static, R: 'static> SignalInner<A, R> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            slots: Mutex::new(Vec::new()),
            inbound: Mutex::new(Vec::new()),
            blocked: AtomicBool::new(false),
            emitting: AtomicBool::new(false),
        })
    }

    /// Removes a slot from the list. Called by the slot itself on disconnect.
    pub(crate) fn forget(&self, key: u64) {
        self.slots.lock().unwrap().retain(|slot| slot.key() != key);
    }

    pub(crate) fn emit<C>(&self, mut collector: C, args: &A) -> C
    where C: Collector<R> {
        if self.blocked.load(Ordering::Acquire) {
            return collector;
        }
        if self.emitting.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            // Re-entrant (or concurrent) emission; degenerate result.
            return collector;
        }
        let _reset = ResetOnDrop(&self.emitting);

        // Snapshot-then-invoke: the slot list lock is never held across user
        // callables. Slots connected from inside a callable become visible to
        // the next emission, not this one.
        let snapshot = {
            let mut slots = self.slots.lock().unwrap();
            slots.retain(|slot| slot.is_connected());
            slots.clone()
        };

        for slot in snapshot {
            if !slot.is_connected() {
                // Disconnected after the snapshot was taken, e.g. by an
                // earlier slot of this same emission.
                continue;
            }
            let connection = slot.connection();
            match slot.activate(args) {
                Ok(value) => {
                    if !collector.collect(&connection, value) {
                        break;
                    }
                }
                Err(SlotError::Disconnected) | Err(SlotError::ReceiverDropped) => slot.disconnect(),
            }
        }
        collector
    }
}

struct ResetOnDrop<'a>(&'a AtomicBool);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) { self.0.store(false, Ordering::Release); }
}

/// An ordered, typed publisher of events.
///
/// `A` is the argument value handed to every slot by reference (use a tuple
/// for multiple arguments), `R` the return type collected from the slots.
/// Slots are activated in connection order; emission returns the collector.
///
/// Every operation is safe to call from any thread. Dropping the signal
/// disconnects all of its slots and invalidates their connections.
pub struct Signal<A: 'static = (), R: 'static = ()> {
    inner: Arc<SignalInner<A, R>>,
}

impl<A: 'static, R: 'static> Signal<A, R> {
    pub fn new() -> Self { Self { inner: SignalInner::new() } }

    fn push(&self, callable: Callable<A, R>) -> Connection {
        let slot = Slot::new(&self.inner, callable);
        let connection = slot.connection();
        self.inner.slots.lock().unwrap().push(slot);
        connection
    }

    /// Connects a callable; see [`IntoSlot`] for what is accepted. Returns
    /// the connection handle for the new slot.
    pub fn connect<F>(&self, callable: F) -> Connection
    where F: IntoSlot<A, R> {
        self.push(Callable::Function(callable.into_slot_fn()))
    }

    /// Connects a callable that receives its own connection handle as the
    /// first argument on each activation, e.g. to disconnect itself.
    pub fn connect_with_handle<F>(&self, callable: F) -> Connection
    where F: Fn(&Connection, &A) -> R + Send + Sync + 'static {
        self.push(Callable::FunctionWithHandle(Box::new(callable)))
    }

    /// Connects a method of a shared receiver. The receiver is held weakly
    /// and auto-bound as a tracker: dropping it invalidates the slot.
    pub fn connect_method<T, F>(&self, receiver: &Arc<T>, method: F) -> Connection
    where
        T: Send + Sync + 'static,
        F: Fn(&T, &A) -> R + Send + Sync + 'static,
    {
        let target = Arc::downgrade(receiver);
        let callable: Box<dyn Fn(&A) -> Result<R, SlotError> + Send + Sync> = Box::new(move |args: &A| {
            let receiver = target.upgrade().ok_or(SlotError::ReceiverDropped)?;
            Ok(method(&receiver, args))
        });
        self.push(Callable::Method(callable)).bind(receiver)
    }

    /// Like [`connect_method`](Self::connect_method), with the slot's own
    /// connection handle passed between the receiver and the arguments.
    pub fn connect_method_with_handle<T, F>(&self, receiver: &Arc<T>, method: F) -> Connection
    where
        T: Send + Sync + 'static,
        F: Fn(&T, &Connection, &A) -> R + Send + Sync + 'static,
    {
        let target = Arc::downgrade(receiver);
        let callable: Box<dyn Fn(&Connection, &A) -> Result<R, SlotError> + Send + Sync> =
            Box::new(move |connection: &Connection, args: &A| {
                let receiver = target.upgrade().ok_or(SlotError::ReceiverDropped)?;
                Ok(method(&receiver, connection, args))
            });
        self.push(Callable::MethodWithHandle(callable)).bind(receiver)
    }

    /// Connects another signal as a forwarding slot: emitting this signal
    /// re-emits on `receiver` with the same arguments, yielding the last
    /// result its slots produced. Dropping the receiver disconnects the slot.
    pub fn connect_signal(&self, receiver: &Signal<A, R>) -> Connection
    where
        A: Clone,
        R: Default,
    {
        let target = Arc::downgrade(&receiver.inner);
        let callable: Box<dyn Fn(&A) -> Result<R, SlotError> + Send + Sync> = Box::new(move |args: &A| {
            let receiver = target.upgrade().ok_or(SlotError::ReceiverDropped)?;
            let last = receiver.emit(Last::default(), args);
            Ok(last.into_value().unwrap_or_default())
        });
        let connection = self.push(Callable::Forward(callable));
        if let Some(slot) = connection.slot() {
            // The receiver acts as a tracker of the forwarding slot.
            slot.add_witness(Box::new(SharedWitness(Arc::downgrade(&receiver.inner))));
            let mut inbound = receiver.inner.inbound.lock().unwrap();
            inbound.retain(|existing| existing.strong_count() > 0);
            inbound.push(Arc::downgrade(&slot));
        }
        connection
    }

    /// Disconnects the slot behind `connection`.
    pub fn disconnect(&self, connection: &Connection) { connection.disconnect(); }

    /// A blocked signal does nothing on emission.
    pub fn block(&self, blocked: bool) { self.inner.blocked.store(blocked, Ordering::Release); }

    pub fn is_blocked(&self) -> bool { self.inner.blocked.load(Ordering::Acquire) }

    /// Emits with the default collector. Returns the empty collector when the
    /// signal is blocked or this emission re-enters an ongoing one.
    pub fn emit(&self, args: A) -> Collected<R> { self.inner.emit(Collected::default(), &args) }

    /// Emits with a caller-supplied collector; its final state is returned.
    pub fn emit_with<C>(&self, collector: C, args: A) -> C
    where C: Collector<R> {
        self.inner.emit(collector, &args)
    }

    /// A non-owning emitter handle that survives the signal.
    pub fn downgrade(&self) -> WeakSignal<A, R> { WeakSignal { inner: Arc::downgrade(&self.inner) } }
}

impl<A: 'static, R: 'static> Default for Signal<A, R> {
    fn default() -> Self { Self::new() }
}

impl<A: 'static, R: 'static> Drop for Signal<A, R> {
    fn drop(&mut self) {
        // Relock pattern: pop one slot under the lock, disconnect it outside,
        // because disconnect re-enters the signal to forget the slot.
        loop {
            let inbound = self.inner.inbound.lock().unwrap().pop();
            match inbound {
                Some(weak) => {
                    if let Some(slot) = weak.upgrade() {
                        slot.disconnect();
                    }
                }
                None => break,
            }
        }
        let mut dropped = 0usize;
        loop {
            let slot = self.inner.slots.lock().unwrap().pop();
            match slot {
                Some(slot) => {
                    slot.disconnect();
                    dropped += 1;
                }
                None => break,
            }
        }
        if dropped > 0 {
            debug!(slots = dropped, "signal dropped with live slots");
        }
    }
}

/// A weak handle to a signal, for emitting without owning it.
///
/// Emitting through a `WeakSignal` whose signal was dropped is a no-op that
/// returns the empty collector. This also makes it safe for a slot to drop
/// the signal it is being activated from: the remaining slots of the running
/// emission are skipped.
pub struct WeakSignal<A: 'static = (), R: 'static = ()> {
    inner: Weak<SignalInner<A, R>>,
}

impl<A: 'static, R: 'static> Clone for WeakSignal<A, R> {
    fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

impl<A: 'static, R: 'static> WeakSignal<A, R> {
    pub fn emit(&self, args: A) -> Collected<R> {
        match self.inner.upgrade() {
            Some(inner) => inner.emit(Collected::default(), &args),
            None => Collected::default(),
        }
    }

    pub fn emit_with<C>(&self, collector: C, args: A) -> C
    where C: Collector<R> {
        match self.inner.upgrade() {
            Some(inner) => inner.emit(collector, &args),
            None => collector,
        }
    }

    pub fn is_alive(&self) -> bool { self.inner.strong_count() > 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_connect_and_emit() {
        let signal = Signal::<i32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let _connection = {
            let seen = seen.clone();
            signal.connect(move |value: &i32| seen.lock().unwrap().push(*value))
        };

        assert_eq!(signal.emit(7).len(), 1);
        assert_eq!(signal.emit(8).len(), 1);
        assert_eq!(*seen.lock().unwrap(), vec![7, 8]);
    }

    #[test]
    fn test_connect_from_slot_activates_next_time() {
        let signal = Arc::new(Signal::<()>::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let _connection = {
            let signal = signal.clone();
            let counter = counter.clone();
            signal.clone().connect(move |_: &()| {
                let counter = counter.clone();
                signal.connect(move |_: &()| {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            })
        };

        assert_eq!(signal.emit(()).len(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(signal.emit(()).len(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reentrant_emit_is_a_no_op() {
        let signal = Arc::new(Signal::<()>::new());
        let _connection = {
            let signal = signal.clone();
            signal.clone().connect(move |_: &()| {
                assert!(signal.emit(()).is_empty());
            })
        };

        assert_eq!(signal.emit(()).len(), 1);
    }

    #[test]
    fn test_collected_results_keep_connection_order() {
        let signal = Signal::<(), i32>::new();
        signal.connect(|_: &()| 1);
        signal.connect(|_: &()| 2);
        signal.connect(|_: &()| 3);

        assert_eq!(signal.emit(()).into_results(), vec![1, 2, 3]);
    }
}

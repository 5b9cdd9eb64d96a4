use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::connection::Connection;
use crate::error::SlotError;
use crate::signal::SignalInner;
use crate::tracker::TrackerWitness;

static NEXT_SLOT_KEY: AtomicU64 = AtomicU64::new(1);

pub(crate) type PlainFn<A, R> = Box<dyn Fn(&A) -> R + Send + Sync>;
pub(crate) type HandleFn<A, R> = Box<dyn Fn(&Connection, &A) -> R + Send + Sync>;
pub(crate) type FallibleFn<A, R> = Box<dyn Fn(&A) -> Result<R, SlotError> + Send + Sync>;
pub(crate) type FallibleHandleFn<A, R> = Box<dyn Fn(&Connection, &A) -> Result<R, SlotError> + Send + Sync>;

/// The callable held by a slot. Methods and forwarders can fail at activation
/// time when the object behind their weak handle is gone.
pub(crate) enum Callable<A: 'static, R: 'static> {
    Function(PlainFn<A, R>),
    FunctionWithHandle(HandleFn<A, R>),
    Method(FallibleFn<A, R>),
    MethodWithHandle(FallibleHandleFn<A, R>),
    Forward(FallibleFn<A, R>),
}

/// One connection between a signal and one callable.
pub(crate) struct Slot<A: 'static, R: 'static> {
    key: u64,
    /// Self-reference handed out as connection handles.
    this: Weak<Slot<A, R>>,
    connected: AtomicBool,
    /// The owning signal; taken on disconnect.
    signal: Mutex<Option<Weak<SignalInner<A, R>>>>,
    callable: Callable<A, R>,
    witnesses: Mutex<Vec<Box<dyn TrackerWitness>>>,
}

impl<A: 'static, R: 'static> Slot<A, R> {
    pub(crate) fn new(signal: &Arc<SignalInner<A, R>>, callable: Callable<A, R>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            key: NEXT_SLOT_KEY.fetch_add(1, Ordering::Relaxed),
            this: this.clone(),
            connected: AtomicBool::new(true),
            signal: Mutex::new(Some(Arc::downgrade(signal))),
            callable,
            witnesses: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn connection(&self) -> Connection {
        let weak: Weak<dyn SlotControl> = self.this.clone();
        Connection::new(weak)
    }

    /// Validates connectivity and runs the callable. No lock is held while
    /// user code runs, so the callable may freely disconnect this slot or
    /// reach back into the signal.
    pub(crate) fn activate(&self, args: &A) -> Result<R, SlotError> {
        if !self.is_connected() {
            return Err(SlotError::Disconnected);
        }
        match &self.callable {
            Callable::Function(callable) => Ok(callable(args)),
            Callable::FunctionWithHandle(callable) => Ok(callable(&self.connection(), args)),
            Callable::Method(callable) | Callable::Forward(callable) => callable(args),
            Callable::MethodWithHandle(callable) => callable(&self.connection(), args),
        }
    }
}

/// Type-erased slot surface used by connections, trackers, and receiver
/// signals, which do not know the slot's argument and return types.
pub(crate) trait SlotControl: Send + Sync {
    fn key(&self) -> u64;

    fn is_connected(&self) -> bool;

    fn disconnect(&self);

    fn add_witness(&self, witness: Box<dyn TrackerWitness>);

    fn remove_witness(&self, registry_key: usize);
}

impl<A: 'static, R: 'static> SlotControl for Slot<A, R> {
    fn key(&self) -> u64 { self.key }

    fn is_connected(&self) -> bool {
        if !self.connected.load(Ordering::Acquire) {
            return false;
        }
        self.witnesses.lock().unwrap().iter().all(|witness| witness.is_alive())
    }

    fn disconnect(&self) {
        // Leave the signal first, so a concurrent emission stops considering
        // this slot before the flag even flips.
        let signal = self.signal.lock().unwrap().take();
        if let Some(signal) = signal.and_then(|weak| weak.upgrade()) {
            signal.forget(self.key);
        }
        if !self.connected.swap(false, Ordering::AcqRel) {
            // Already disconnected.
            return;
        }
        let witnesses = std::mem::take(&mut *self.witnesses.lock().unwrap());
        for witness in witnesses {
            witness.release(self.key);
        }
    }

    fn add_witness(&self, witness: Box<dyn TrackerWitness>) {
        self.witnesses.lock().unwrap().push(witness);
    }

    fn remove_witness(&self, registry_key: usize) {
        self.witnesses.lock().unwrap().retain(|witness| witness.registry_key() != Some(registry_key));
    }
}

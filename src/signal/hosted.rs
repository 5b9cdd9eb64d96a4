use std::ops::Deref;
use std::sync::{Arc, Weak};

use crate::collector::{Collected, Collector};
use crate::signal::Signal;

/// A signal living as a field of a shared host object.
///
/// Every emission first upgrades the weak host handle; once the host is gone
/// the emission is a no-op. Use this variant for signals whose slots assume
/// the host is alive while they run; a plain [`Signal`] makes no such
/// guarantee. Note that emissions from the host's own drop are therefore
/// no-ops as well.
///
/// Derefs to [`Signal`] for connection management.
pub struct HostedSignal<H, A: 'static = (), R: 'static = ()> {
    host: Weak<H>,
    signal: Signal<A, R>,
}

impl<H, A: 'static, R: 'static> HostedSignal<H, A, R> {
    pub fn new(host: &Arc<H>) -> Self { Self::from_weak(Arc::downgrade(host)) }

    /// Construction from a weak host handle, for use inside
    /// `Arc::new_cyclic` when the signal is a field of the host itself.
    pub fn from_weak(host: Weak<H>) -> Self { Self { host, signal: Signal::new() } }

    /// Emits only while the host is alive; the host is kept alive for the
    /// duration of the emission.
    pub fn emit(&self, args: A) -> Collected<R> {
        match self.host.upgrade() {
            Some(_host) => self.signal.emit(args),
            None => Collected::default(),
        }
    }

    pub fn emit_with<C>(&self, collector: C, args: A) -> C
    where C: Collector<R> {
        match self.host.upgrade() {
            Some(_host) => self.signal.emit_with(collector, args),
            None => collector,
        }
    }
}

impl<H, A: 'static, R: 'static> Deref for HostedSignal<H, A, R> {
    type Target = Signal<A, R>;

    fn deref(&self) -> &Self::Target { &self.signal }
}

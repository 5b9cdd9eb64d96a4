use std::sync::{Arc, Weak};

use tracing::warn;

use crate::connection::Connection;
use crate::property::provider::ProviderInner;
use crate::property::Value;
use crate::signal::Signal;

/// The currently-evaluating binding provider, as seen by a property whose
/// value is being read.
pub(crate) trait BindingTarget: Send + Sync {
    /// Identity of the property owning this binding, so a property can skip
    /// subscribing a binding to itself.
    fn owner_key(&self) -> usize;

    /// Subscribes this binding to a property its expression just read.
    fn observe(self: Arc<Self>, source: Arc<dyn PropertyNode>);
}

/// The property side of dependency tracking.
pub(crate) trait PropertyNode: Send + Sync {
    fn node_key(&self) -> usize;

    /// Connects this property's `changed` signal to the receiver signal.
    fn forward_changed(&self, receiver: &Signal<()>) -> Connection;

    /// Records a provider of another property as depending on this one, so
    /// dropping this property can reach it.
    fn register_dependent(&self, provider: Weak<dyn DependentProvider>);
}

/// A provider registered as dependent on some property. When that property is
/// dropped it tells the provider to remove itself from its owner, reverting
/// the owner to the previous provider in its stack.
pub(crate) trait DependentProvider: Send + Sync {
    fn provider_key(&self) -> usize;

    fn remove_self(&self);
}

/// One dependency subscription of a binding, keyed by source property.
/// `marked` drives the mark-and-sweep over re-evaluations: stable
/// dependencies are unmarked in place instead of being reconnected.
pub(crate) struct DepEntry {
    connection: Connection,
    marked: bool,
}

impl<T: Value> ProviderInner<T> {
    /// Mark phase: flags every dependency; the evaluation that follows
    /// unmarks the ones the expression still reads.
    pub(crate) fn mark_dependencies(&self) {
        let mut deps = self.deps.lock().unwrap();
        for entry in deps.values_mut() {
            entry.marked = true;
        }
    }

    /// Sweep phase: disconnects dependencies the last evaluation no longer
    /// read.
    pub(crate) fn sweep_dependencies(&self) {
        let mut deps = self.deps.lock().unwrap();
        deps.retain(|_, entry| {
            if entry.marked {
                entry.connection.disconnect();
            }
            !entry.marked
        });
    }

    /// Drops every dependency subscription. Runs on deactivation and detach.
    pub(crate) fn clear_dependencies(&self) {
        let deps = std::mem::take(&mut *self.deps.lock().unwrap());
        for (_, entry) in deps {
            entry.connection.disconnect();
        }
    }
}

impl<T: Value> BindingTarget for ProviderInner<T> {
    fn owner_key(&self) -> usize { self.owner().map_or(0, |owner| owner.host_key()) }

    fn observe(self: Arc<Self>, source: Arc<dyn PropertyNode>) {
        let key = source.node_key();
        {
            let mut deps = self.deps.lock().unwrap();
            if let Some(entry) = deps.get_mut(&key) {
                if entry.connection.is_valid() {
                    entry.marked = false;
                    return;
                }
                // Stale entry: the old source died and its address was
                // reused. Fall through and subscribe afresh.
                deps.remove(&key);
            }
        }
        // Lock released before connecting: the connection machinery may walk
        // back into this provider.
        let owner = match self.owner() {
            Some(owner) => owner,
            None => return,
        };
        // The subscription is a signal-to-signal connection from the source's
        // `changed` to the owner's `changed`, tracked by this provider so its
        // death invalidates the slot.
        let connection = source.forward_changed(owner.changed_ref()).bind(&self);
        source.register_dependent(Arc::downgrade(&self) as Weak<dyn DependentProvider>);
        self.deps.lock().unwrap().insert(key, DepEntry { connection, marked: false });
    }
}

impl<T: Value> DependentProvider for ProviderInner<T> {
    fn provider_key(&self) -> usize { self.key() }

    fn remove_self(&self) {
        match self.owner() {
            Some(owner) => owner.remove_erased(self.key()),
            None => warn!("dependency of a detached provider dropped; nothing to remove"),
        }
    }
}

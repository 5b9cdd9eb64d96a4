use std::sync::{Arc, Mutex, Weak};

use tracing::debug;

use crate::connection::Connection;
use crate::slot::SlotControl;

/// Witness stored by a slot for each tracker bound to it.
pub(crate) trait TrackerWitness: Send + Sync {
    /// Cheap liveness check, called on every connectivity test.
    fn is_alive(&self) -> bool;

    /// Called once on slot teardown so registries can drop their
    /// backreference to the slot.
    fn release(&self, slot_key: u64);

    /// Identity of the registry behind this witness, if any; used by
    /// `Tracker::untrack` to remove the witness from the slot again.
    fn registry_key(&self) -> Option<usize> { None }
}

/// Shared-ownership handles used as trackers: valid while the strong count is
/// non-zero, and nothing to clean up on slot teardown.
pub(crate) struct SharedWitness<T: ?Sized>(pub(crate) Weak<T>);

impl<T: ?Sized + Send + Sync> TrackerWitness for SharedWitness<T> {
    fn is_alive(&self) -> bool { self.0.strong_count() > 0 }

    fn release(&self, _slot_key: u64) {}
}

/// Witness for a [`Tracker`] registry: calls back on slot teardown so the
/// registry's list stays minimal.
struct RegistryWitness {
    registry: Weak<Registry>,
}

impl TrackerWitness for RegistryWitness {
    fn is_alive(&self) -> bool { self.registry.strong_count() > 0 }

    fn release(&self, slot_key: u64) {
        if let Some(registry) = self.registry.upgrade() {
            registry.entries.lock().unwrap().retain(|(key, _)| *key != slot_key);
        }
    }

    fn registry_key(&self) -> Option<usize> { Some(self.registry.as_ptr() as usize) }
}

struct Registry {
    entries: Mutex<Vec<(u64, Weak<dyn SlotControl>)>>,
}

/// A lifetime witness for slots.
///
/// Bind a tracker to a connection (via [`Connection::bind`] or [`track`]
/// directly) and every governed slot is disconnected when the tracker is
/// dropped. One tracker can govern slots of any number of signals.
///
/// [`track`]: Tracker::track
pub struct Tracker {
    registry: Arc<Registry>,
}

impl Tracker {
    pub fn new() -> Self { Self { registry: Arc::new(Registry { entries: Mutex::new(Vec::new()) }) } }

    /// Registers a slot with this tracker. The slot stays connected only
    /// while the tracker is alive.
    pub fn track(&self, connection: &Connection) {
        if let Some(slot) = connection.slot() {
            slot.add_witness(Box::new(RegistryWitness { registry: Arc::downgrade(&self.registry) }));
            self.registry.entries.lock().unwrap().push((slot.key(), Arc::downgrade(&slot)));
        }
    }

    /// Removes a single slot registration without disconnecting it; the slot
    /// no longer cares whether this tracker lives or dies.
    pub fn untrack(&self, connection: &Connection) {
        if let Some(slot) = connection.slot() {
            let key = slot.key();
            self.registry.entries.lock().unwrap().retain(|(k, _)| *k != key);
            slot.remove_witness(Arc::as_ptr(&self.registry) as usize);
        }
    }

    /// Disconnects every slot governed by this tracker.
    pub fn clear(&self) {
        // Drain under the lock, disconnect outside it: slot teardown calls
        // back into `release`, which wants the same lock.
        let entries = std::mem::take(&mut *self.registry.entries.lock().unwrap());
        if !entries.is_empty() {
            debug!(slots = entries.len(), "tracker disconnecting governed slots");
        }
        for (_, slot) in entries {
            if let Some(slot) = slot.upgrade() {
                slot.disconnect();
            }
        }
    }
}

impl Default for Tracker {
    fn default() -> Self { Self::new() }
}

impl Drop for Tracker {
    fn drop(&mut self) { self.clear(); }
}

/// Types acceptable as trackers when binding a connection.
///
/// Implemented by [`Tracker`] and by any `Arc<T>`; a shared handle bound this
/// way invalidates the slot as soon as its strong count reaches zero.
pub trait Trackable {
    fn bind_to(&self, connection: &Connection);
}

impl Trackable for Tracker {
    fn bind_to(&self, connection: &Connection) { self.track(connection); }
}

impl<T> Trackable for Arc<T>
where T: Send + Sync + ?Sized + 'static
{
    fn bind_to(&self, connection: &Connection) {
        if let Some(slot) = connection.slot() {
            slot.add_witness(Box::new(SharedWitness(Arc::downgrade(self))));
        }
    }
}

use std::sync::{Arc, Weak};

use crate::slot::SlotControl;
use crate::tracker::Trackable;

/// A weak token identifying one slot of a signal.
///
/// Connections are cheap to clone and never keep the slot alive; a valid
/// connection whose slot has since been disconnected reports invalid.
#[derive(Clone)]
pub struct Connection {
    slot: Weak<dyn SlotControl>,
}

impl Connection {
    pub(crate) fn new(slot: Weak<dyn SlotControl>) -> Self { Self { slot } }

    pub(crate) fn slot(&self) -> Option<Arc<dyn SlotControl>> { self.slot.upgrade() }

    /// True while the slot is connected and every bound tracker still
    /// witnesses a live object.
    pub fn is_valid(&self) -> bool { self.slot.upgrade().map_or(false, |slot| slot.is_connected()) }

    /// Disconnects the slot. Idempotent, and a no-op once the slot is gone.
    pub fn disconnect(&self) {
        if let Some(slot) = self.slot.upgrade() {
            slot.disconnect();
        }
    }

    /// Binds a tracker to the slot and returns the connection, so multiple
    /// trackers can be chained: `connection.bind(&a).bind(&b)`.
    ///
    /// Accepts a [`Tracker`](crate::tracker::Tracker) or any `Arc<T>`; see
    /// [`Trackable`].
    pub fn bind<T>(self, tracker: &T) -> Self
    where T: Trackable + ?Sized {
        tracker.bind_to(&self);
        self
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("valid", &self.is_valid()).finish()
    }
}

use thiserror::Error;

/// Why a single slot activation failed.
///
/// The emission loop treats any of these as the cue to disconnect the failing
/// slot and continue with the next one; they never abort an emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SlotError {
    /// The slot was disconnected, or one of its bound trackers no longer
    /// witnesses a live object.
    #[error("slot is disconnected")]
    Disconnected,

    /// The weak receiver behind a bound method, or the receiver signal behind
    /// a forwarding slot, has been dropped.
    #[error("slot receiver has been dropped")]
    ReceiverDropped,
}

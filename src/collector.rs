use crate::connection::Connection;

/// Accumulates per-slot results during one emission.
///
/// A collector is passed into `emit` by value and handed back once the
/// emission completes. `collect` is called once per successful activation, in
/// connection order, with the slot's connection handle and its return value.
pub trait Collector<R> {
    /// Handles one activation result. Return `false` to stop the emission
    /// loop; the remaining slots are not activated.
    fn collect(&mut self, connection: &Connection, value: R) -> bool;
}

/// The default collector: gathers results in activation order.
///
/// For signals returning `()` the interesting part is [`len`](Self::len),
/// which is the number of slots activated by the emission.
pub struct Collected<R> {
    results: Vec<R>,
}

impl<R> Collected<R> {
    /// Number of slots activated during the emission.
    pub fn len(&self) -> usize { self.results.len() }

    /// True when no slot was activated (empty signal, blocked signal, or a
    /// re-entrant emission).
    pub fn is_empty(&self) -> bool { self.results.is_empty() }

    pub fn results(&self) -> &[R] { &self.results }

    pub fn into_results(self) -> Vec<R> { self.results }
}

impl<R> Default for Collected<R> {
    fn default() -> Self { Self { results: Vec::new() } }
}

impl<R> Collector<R> for Collected<R> {
    fn collect(&mut self, _connection: &Connection, value: R) -> bool {
        self.results.push(value);
        true
    }
}

/// Keeps only the most recent result. Forwarding slots use this to turn a
/// receiver signal's whole emission into one return value.
pub(crate) struct Last<R>(Option<R>);

impl<R> Default for Last<R> {
    fn default() -> Self { Self(None) }
}

impl<R> Last<R> {
    pub(crate) fn into_value(self) -> Option<R> { self.0 }
}

impl<R> Collector<R> for Last<R> {
    fn collect(&mut self, _connection: &Connection, value: R) -> bool {
        self.0 = Some(value);
        true
    }
}

/*!
Thread-safe signal/slot dispatch and reactive properties.

Two pieces that compose:

- [`Signal`]: an ordered, typed publisher. Slots are connected callables
  (functions, closures, methods of shared receivers, channel senders, or
  other signals), activated in connection order on each emission; results are
  gathered by a [`Collector`]. Connections are weak [`Connection`] tokens, and
  slot lifetimes can be bound to [`Tracker`]s or to any `Arc` handle.
- [`Property`]: a reactive cell whose value comes from a stack of
  [`Provider`]s and which fires an arity-zero `changed` signal whenever its
  observable value changes. A [`bind`](Property::bind) expression reads other
  properties through [`Read`] handles, and every such read subscribes the
  binding automatically: when a dependency changes, the bound property's
  `changed` fires too.

# Signals

```rust
use weft::Signal;

let clicks = Signal::<u32>::new();
let connection = clicks.connect(|count: &u32| println!("clicked {count} times"));

assert_eq!(clicks.emit(1).len(), 1);
connection.disconnect();
assert_eq!(clicks.emit(2).len(), 0);
```

# Properties and bindings

```rust
use weft::Property;

let base = Property::new(2);
let doubled = Property::new(0);

doubled.bind({
    let base = base.read();
    move || base.get() * 2
});

assert_eq!(doubled.get(), 4);
base.set(21);
assert_eq!(doubled.get(), 42);
```

Everything is safe to use from any thread; no lock is ever held while user
code (slot callables, collectors, binding expressions) runs.
*/

pub mod collector;
pub mod connection;
pub mod error;
pub mod property;
pub mod signal;
mod slot;
pub mod tracker;

pub use collector::{Collected, Collector};
pub use connection::Connection;
pub use error::SlotError;
pub use property::{Property, Provider, ProviderState, Read, State, Value, WritePolicy};
pub use signal::{HostedSignal, IntoSlot, Signal, WeakSignal};
pub use tracker::{Trackable, Tracker};

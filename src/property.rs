use std::sync::{Arc, Mutex, Weak};

use crate::connection::Connection;
use crate::signal::Signal;

pub(crate) mod binding;
pub mod provider;
pub(crate) mod scope;

pub use provider::{Provider, ProviderState, WritePolicy};

use binding::{DependentProvider, PropertyNode};
use provider::{BindingHost, ProviderInner};
use scope::CurrentBinding;

/// Marker for types properties can hold.
pub trait Value: Clone + Default + PartialEq + Send + Sync + 'static {}

impl<T> Value for T where T: Clone + Default + PartialEq + Send + Sync + 'static {}

struct ProviderStack<T: Value> {
    /// Insertion order; the top is the active provider by default.
    entries: Vec<Arc<ProviderInner<T>>>,
    active: Weak<ProviderInner<T>>,
}

pub(crate) struct PropertyCore<T: Value> {
    /// Self-reference for dependency tracking, where the binding side needs
    /// the property as a shared `PropertyNode`.
    this: Weak<PropertyCore<T>>,
    stack: Mutex<ProviderStack<T>>,
    changed: Signal<()>,
    /// Providers of other properties whose expressions read this one.
    dependents: Mutex<Vec<Weak<dyn DependentProvider>>>,
}

impl<T: Value> PropertyCore<T> {
    fn new(initial: Provider<T>) -> Arc<Self> {
        assert_eq!(
            initial.policy(),
            WritePolicy::Keep,
            "a property's floor provider must have write policy Keep"
        );
        let core = Arc::new_cyclic(|this| Self {
            this: this.clone(),
            stack: Mutex::new(ProviderStack { entries: Vec::new(), active: Weak::new() }),
            changed: Signal::new(),
            dependents: Mutex::new(Vec::new()),
        });
        core.add_provider(initial);
        core
    }

    fn key(&self) -> usize { self as *const Self as *const () as usize }

    fn active_provider(&self) -> Arc<ProviderInner<T>> {
        self.stack.lock().unwrap().active.upgrade().expect("property has an active provider")
    }

    /// Reads the active provider. Fetching it happens under the property
    /// lock; evaluation happens outside it, which is where binding scopes
    /// come into play.
    fn get(&self) -> T {
        let provider = self.active_provider();
        if let Some(target) = CurrentBinding::current() {
            if target.owner_key() != self.key() {
                if let Some(this) = self.this.upgrade() {
                    target.observe(this as Arc<dyn PropertyNode>);
                }
            }
        }
        provider.evaluate()
    }

    /// The value without dependency tracking.
    fn peek(&self) -> T { self.active_provider().evaluate() }

    fn set(&self, value: T) {
        let before = self.peek();

        let (discarded, reverted, active) = {
            let mut stack = self.stack.lock().unwrap();
            let mut discarded = Vec::new();
            let mut reverted = false;
            stack.entries.retain(|provider| {
                if provider.policy() == WritePolicy::Discard {
                    if provider.is_active() {
                        provider.deactivate();
                        reverted = true;
                    }
                    discarded.push(Arc::clone(provider));
                    false
                } else {
                    true
                }
            });
            let active = stack
                .entries
                .last()
                .cloned()
                .expect("a property always keeps at least one provider");
            if reverted {
                stack.active = Arc::downgrade(&active);
            }
            (discarded, reverted, active)
        };

        for provider in &discarded {
            provider.detach();
        }
        if reverted {
            // The surviving top provider was deactivated when the discarded
            // one went on top of it.
            let _ = active.activate();
        }
        let _ = active.store(&value);

        // Notify only when the observable value actually changed, and only if
        // the provider written is still the active one; a concurrent
        // add_provider has already notified for the newer value.
        let after = active.evaluate();
        if after == before {
            return;
        }
        let still_active = {
            let stack = self.stack.lock().unwrap();
            stack.active.upgrade().map_or(false, |current| Arc::ptr_eq(&current, &active))
        };
        if still_active {
            self.changed.emit(());
        }
    }

    fn add_provider(&self, provider: Provider<T>) {
        let inner = provider.inner;
        let before = {
            let stack = self.stack.lock().unwrap();
            stack.active.upgrade()
        }
        .map(|previous| previous.evaluate());

        inner.attach(self.this.clone() as Weak<dyn BindingHost>);
        {
            let mut stack = self.stack.lock().unwrap();
            if let Some(previous) = stack.active.upgrade() {
                previous.deactivate();
            }
            stack.entries.push(Arc::clone(&inner));
            stack.active = Arc::downgrade(&inner);
        }

        // Activation evaluates outside the property lock; for a binding this
        // is where the dependency subscriptions get established.
        let value = inner.activate();
        if before.map_or(true, |before| before != value) {
            self.changed.emit(());
        }
    }

    fn remove_provider(&self, target: &Arc<ProviderInner<T>>) {
        let was_active = target.is_active();
        let before = if was_active { Some(target.evaluate()) } else { None };

        let next = {
            let mut stack = self.stack.lock().unwrap();
            let count = stack.entries.len();
            stack.entries.retain(|provider| !Arc::ptr_eq(provider, target));
            if stack.entries.len() == count {
                // Not one of ours (or already removed).
                return;
            }
            assert!(
                stack.entries.iter().any(|provider| provider.policy() == WritePolicy::Keep),
                "a property always keeps at least one provider with write policy Keep"
            );
            if was_active {
                target.deactivate();
                let next = stack.entries.last().cloned().unwrap();
                stack.active = Arc::downgrade(&next);
                Some(next)
            } else {
                None
            }
        };

        target.detach();
        if let Some(next) = next {
            let value = next.activate();
            if before.map_or(true, |before| before != value) {
                self.changed.emit(());
            }
        }
    }
}

impl<T: Value> BindingHost for PropertyCore<T> {
    fn host_key(&self) -> usize { self.key() }

    fn changed_ref(&self) -> &Signal<()> { &self.changed }

    fn remove_erased(&self, provider_key: usize) {
        let target = {
            let stack = self.stack.lock().unwrap();
            stack.entries.iter().find(|provider| provider.key() == provider_key).cloned()
        };
        if let Some(target) = target {
            self.remove_provider(&target);
        }
    }
}

impl<T: Value> PropertyNode for PropertyCore<T> {
    fn node_key(&self) -> usize { self.key() }

    fn forward_changed(&self, receiver: &Signal<()>) -> Connection {
        self.changed.connect_signal(receiver)
    }

    fn register_dependent(&self, provider: Weak<dyn DependentProvider>) {
        let mut dependents = self.dependents.lock().unwrap();
        dependents.retain(|existing| existing.strong_count() > 0);
        if let Some(upgraded) = provider.upgrade() {
            let key = upgraded.provider_key();
            let known = dependents
                .iter()
                .any(|existing| existing.upgrade().map_or(false, |existing| existing.provider_key() == key));
            if !known {
                dependents.push(provider);
            }
        }
    }
}

impl<T: Value> Drop for PropertyCore<T> {
    fn drop(&mut self) {
        // Tell every provider that reads this property to remove itself from
        // its owner; their bindings revert to the previous provider there.
        let dependents = std::mem::take(self.dependents.get_mut().unwrap());
        for dependent in dependents {
            if let Some(dependent) = dependent.upgrade() {
                dependent.remove_self();
            }
        }
        let entries = std::mem::take(&mut self.stack.get_mut().unwrap().entries);
        for provider in entries {
            provider.detach();
        }
    }
}

/// A reactive cell.
///
/// The value comes from the active element of a stack of
/// [providers](Provider); `changed` fires whenever the observable value
/// changes. Reading the property from inside a binding expression of another
/// property subscribes that binding automatically.
pub struct Property<T: Value> {
    core: Arc<PropertyCore<T>>,
}

impl<T: Value> Property<T> {
    pub fn new(initial: T) -> Self { Self { core: PropertyCore::new(Provider::stored(initial)) } }

    /// Constructs with a custom floor provider; its policy must be Keep.
    pub fn with_provider(provider: Provider<T>) -> Self { Self { core: PropertyCore::new(provider) } }

    /// The current value of the active provider.
    pub fn get(&self) -> T { self.core.get() }

    /// Writes a value: removes every Discard provider (dropping any binding),
    /// stores into the top Keep provider, and fires `changed` once if the
    /// observable value changed.
    pub fn set(&self, value: T) { self.core.set(value) }

    /// Pushes a provider on top of the stack and makes it active; `changed`
    /// fires if the observable value changed.
    pub fn add_provider(&self, provider: Provider<T>) { self.core.add_provider(provider) }

    /// Removes a provider from the stack. If it was active, the topmost
    /// remaining provider takes over and `changed` fires if the observable
    /// value changed.
    pub fn remove_provider(&self, provider: &Provider<T>) { self.core.remove_provider(&provider.inner) }

    /// Installs `expression` as a binding provider and returns its handle.
    /// Each re-evaluation subscribes the binding to every property the
    /// expression reads; a later [`set`](Self::set) removes it.
    pub fn bind<F>(&self, expression: F) -> Provider<T>
    where F: Fn() -> T + Send + Sync + 'static {
        let provider = Provider::binding(expression);
        self.add_provider(provider.clone());
        provider
    }

    /// Fires after the observable value changes; observers re-read with
    /// [`get`](Self::get).
    pub fn changed(&self) -> &Signal<()> { &self.core.changed }

    pub fn on_changed<F>(&self, callback: F) -> Connection
    where F: Fn() + Send + Sync + 'static {
        self.core.changed.connect(move |_: &()| callback())
    }

    /// A weak reader handle for use inside binding expressions.
    pub fn read(&self) -> Read<T> { Read { core: Arc::downgrade(&self.core) } }
}

/// A read-only reactive cell with a single provider.
///
/// Values change only through the provider itself (see [`Provider::set`]).
pub struct State<T: Value> {
    core: Arc<PropertyCore<T>>,
}

impl<T: Value> State<T> {
    pub fn new(initial: T) -> Self { Self { core: PropertyCore::new(Provider::stored(initial)) } }

    /// Constructs from a provider; its policy must be Keep.
    pub fn with_provider(provider: Provider<T>) -> Self { Self { core: PropertyCore::new(provider) } }

    pub fn get(&self) -> T { self.core.get() }

    pub fn changed(&self) -> &Signal<()> { &self.core.changed }

    pub fn on_changed<F>(&self, callback: F) -> Connection
    where F: Fn() + Send + Sync + 'static {
        self.core.changed.connect(move |_: &()| callback())
    }

    pub fn read(&self) -> Read<T> { Read { core: Arc::downgrade(&self.core) } }
}

/// A weak reader handle to a property or state.
///
/// Binding expressions capture these instead of the owning cell, so an
/// observed property can be dropped independently of its observers; reading a
/// dropped property yields `T::default()`. Reads participate in dependency
/// tracking exactly like reads on the cell itself.
pub struct Read<T: Value> {
    core: Weak<PropertyCore<T>>,
}

impl<T: Value> Clone for Read<T> {
    fn clone(&self) -> Self { Self { core: self.core.clone() } }
}

impl<T: Value> Read<T> {
    pub fn get(&self) -> T {
        match self.core.upgrade() {
            Some(core) => core.get(),
            None => T::default(),
        }
    }
}

impl<T: Value + std::fmt::Display> std::fmt::Display for Read<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.get()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_provider_answers_from_construction() {
        let property = Property::new(1);
        assert_eq!(property.get(), 1);
    }

    #[test]
    fn test_provider_states_through_the_stack() {
        let property = Property::new(1);
        let top = Provider::stored(2);
        assert_eq!(top.state(), ProviderState::Detached);

        property.add_provider(top.clone());
        assert_eq!(top.state(), ProviderState::Active);
        assert_eq!(property.get(), 2);

        property.remove_provider(&top);
        assert_eq!(top.state(), ProviderState::Detached);
        assert_eq!(property.get(), 1);
    }

    #[test]
    #[should_panic(expected = "floor provider")]
    fn test_discard_floor_is_rejected() {
        let provider = Provider::computed(|| 0, |_: &i32| false, WritePolicy::Discard);
        let _property = Property::with_provider(provider);
    }

    #[test]
    fn test_bind_then_set_reverts_to_the_floor() {
        let property = Property::new(4);
        property.bind(|| 9);
        assert_eq!(property.get(), 9);

        property.set(6);
        assert_eq!(property.get(), 6);
    }
}

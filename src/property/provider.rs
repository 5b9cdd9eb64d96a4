use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::property::binding::{BindingTarget, DepEntry};
use crate::property::scope::BindingScope;
use crate::property::Value;
use crate::signal::Signal;

/// What happens to a provider when the property is written directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// The provider survives a direct write.
    Keep,
    /// The provider is removed by a direct write.
    Discard,
}

/// Lifecycle of a provider within a property's stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    Detached,
    Attaching,
    Inactive,
    Active,
    Detaching,
}

/// The three provider kinds. Exactly one provider of a property is Active at
/// a time and answers `evaluate` for it.
pub(crate) enum ProviderKind<T: 'static> {
    /// A plain cell holding the value.
    Stored(Mutex<T>),
    /// Application-supplied evaluate/set.
    User {
        evaluate: Box<dyn Fn() -> T + Send + Sync>,
        set: Box<dyn Fn(&T) -> bool + Send + Sync>,
    },
    /// A nullary expression whose property reads auto-subscribe.
    Binding(Box<dyn Fn() -> T + Send + Sync>),
}

/// The property side a provider talks back to, without knowing the concrete
/// property type.
pub(crate) trait BindingHost: Send + Sync {
    fn host_key(&self) -> usize;

    fn changed_ref(&self) -> &Signal<()>;

    fn remove_erased(&self, provider_key: usize);
}

pub(crate) struct ProviderInner<T: 'static> {
    /// Self-reference; a binding installs it as the thread's current binding
    /// while its expression runs.
    this: Weak<ProviderInner<T>>,
    kind: ProviderKind<T>,
    policy: WritePolicy,
    state: Mutex<ProviderState>,
    owner: Mutex<Option<Weak<dyn BindingHost>>>,
    /// Re-entry flag: a cyclic evaluation yields the default value instead of
    /// recursing forever.
    evaluating: AtomicBool,
    /// Dependency subscriptions, keyed by source property identity. Only
    /// bindings ever populate this.
    pub(crate) deps: Mutex<HashMap<usize, DepEntry>>,
}

impl<T: Value> ProviderInner<T> {
    pub(crate) fn key(&self) -> usize { self as *const Self as *const () as usize }

    pub(crate) fn owner(&self) -> Option<Arc<dyn BindingHost>> {
        self.owner.lock().unwrap().as_ref().and_then(|weak| weak.upgrade())
    }

    pub(crate) fn state(&self) -> ProviderState { *self.state.lock().unwrap() }

    pub(crate) fn policy(&self) -> WritePolicy { self.policy }

    pub(crate) fn is_active(&self) -> bool { matches!(self.state(), ProviderState::Active) }

    /// Evaluates the current value. No lock is held while user code runs. A
    /// re-entrant evaluation of the same provider (a cyclic binding) returns
    /// `T::default()` and is otherwise a no-op.
    pub(crate) fn evaluate(&self) -> T {
        if self.evaluating.swap(true, Ordering::AcqRel) {
            return T::default();
        }
        let _reset = ResetOnDrop(&self.evaluating);
        match &self.kind {
            ProviderKind::Stored(cell) => cell.lock().unwrap().clone(),
            ProviderKind::User { evaluate, .. } => evaluate(),
            ProviderKind::Binding(expression) => {
                let target = self.this.upgrade().expect("providers are reference-counted");
                let scope = BindingScope::enter(target as Arc<dyn BindingTarget>);
                self.mark_dependencies();
                let value = expression();
                drop(scope);
                self.sweep_dependencies();
                value
            }
        }
    }

    /// Stores a value; returns whether the stored value changed. Notification
    /// is the caller's business.
    pub(crate) fn store(&self, value: &T) -> bool {
        match &self.kind {
            ProviderKind::Stored(cell) => {
                let mut current = cell.lock().unwrap();
                if *current == *value {
                    false
                } else {
                    *current = value.clone();
                    true
                }
            }
            ProviderKind::User { set, .. } => set(value),
            ProviderKind::Binding(_) => panic!("cannot store a value into a binding provider"),
        }
    }

    pub(crate) fn attach(&self, owner: Weak<dyn BindingHost>) {
        let mut state = self.state.lock().unwrap();
        assert_eq!(*state, ProviderState::Detached, "provider is already attached to a property");
        *state = ProviderState::Attaching;
        *self.owner.lock().unwrap() = Some(owner);
        *state = ProviderState::Inactive;
    }

    pub(crate) fn detach(&self) {
        {
            let mut state = self.state.lock().unwrap();
            assert!(
                !matches!(*state, ProviderState::Detached | ProviderState::Detaching),
                "provider is not attached to a property"
            );
            *state = ProviderState::Detaching;
        }
        self.clear_dependencies();
        *self.owner.lock().unwrap() = None;
        *self.state.lock().unwrap() = ProviderState::Detached;
    }

    /// Inactive -> Active. Returns the freshly evaluated value so the
    /// property can decide whether the observable value changed.
    pub(crate) fn activate(&self) -> T {
        {
            let mut state = self.state.lock().unwrap();
            assert_eq!(*state, ProviderState::Inactive, "only an inactive provider can activate");
            *state = ProviderState::Active;
        }
        self.evaluate()
    }

    pub(crate) fn deactivate(&self) {
        {
            let mut state = self.state.lock().unwrap();
            assert_eq!(*state, ProviderState::Active, "only the active provider can deactivate");
            *state = ProviderState::Inactive;
        }
        self.clear_dependencies();
    }
}

struct ResetOnDrop<'a>(&'a AtomicBool);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) { self.0.store(false, Ordering::Release); }
}

/// A value provider: one element of a property's stack.
///
/// The handle is cheap to clone and shares the underlying provider, so it can
/// be kept around to [`set`](Self::set) values or to remove the provider from
/// its property later.
pub struct Provider<T: Value> {
    pub(crate) inner: Arc<ProviderInner<T>>,
}

impl<T: Value> Clone for Provider<T> {
    fn clone(&self) -> Self { Self { inner: Arc::clone(&self.inner) } }
}

impl<T: Value> Provider<T> {
    /// A plain stored cell; write policy Keep.
    pub fn stored(initial: T) -> Self {
        Self::from_kind(ProviderKind::Stored(Mutex::new(initial)), WritePolicy::Keep)
    }

    /// An application-defined provider. `evaluate` produces the current
    /// value; `set` stores one and reports whether it changed.
    pub fn computed<E, S>(evaluate: E, set: S, policy: WritePolicy) -> Self
    where
        E: Fn() -> T + Send + Sync + 'static,
        S: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self::from_kind(
            ProviderKind::User { evaluate: Box::new(evaluate), set: Box::new(set) },
            policy,
        )
    }

    pub(crate) fn binding<E>(expression: E) -> Self
    where E: Fn() -> T + Send + Sync + 'static {
        Self::from_kind(ProviderKind::Binding(Box::new(expression)), WritePolicy::Discard)
    }

    fn from_kind(kind: ProviderKind<T>, policy: WritePolicy) -> Self {
        Self {
            inner: Arc::new_cyclic(|this| ProviderInner {
                this: this.clone(),
                kind,
                policy,
                state: Mutex::new(ProviderState::Detached),
                owner: Mutex::new(None),
                evaluating: AtomicBool::new(false),
                deps: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn state(&self) -> ProviderState { self.inner.state() }

    pub fn policy(&self) -> WritePolicy { self.inner.policy() }

    /// Stores a value directly into this provider; returns whether it
    /// changed. If the provider is attached and active, the owning property's
    /// `changed` fires. This is how a [`State`](crate::property::State)
    /// publishes new values.
    ///
    /// Panics on a binding provider; bindings are write-through-removal only.
    pub fn set(&self, value: T) -> bool {
        let changed = self.inner.store(&value);
        if changed && self.inner.is_active() {
            if let Some(owner) = self.inner.owner() {
                owner.changed_ref().emit(());
            }
        }
        changed
    }
}

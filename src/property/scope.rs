use std::cell::RefCell;
use std::sync::Arc;

use crate::property::binding::BindingTarget;

thread_local! {
    static CURRENT_BINDING: RefCell<Option<Arc<dyn BindingTarget>>> = RefCell::new(None);
}

/// Accessor for the binding provider currently evaluating on this thread, if
/// any. Property reads consult this to auto-subscribe the binding.
pub(crate) struct CurrentBinding;

impl CurrentBinding {
    pub(crate) fn current() -> Option<Arc<dyn BindingTarget>> {
        CURRENT_BINDING.with(|current| current.borrow().clone())
    }
}

/// Installs a binding provider as the thread's current binding for the
/// lifetime of the value, restoring the previous one on drop. Saving and
/// restoring (rather than clearing) is what lets scopes nest correctly across
/// bindings whose expressions read each other.
pub(crate) struct BindingScope {
    previous: Option<Arc<dyn BindingTarget>>,
}

impl BindingScope {
    pub(crate) fn enter(target: Arc<dyn BindingTarget>) -> Self {
        let previous = CURRENT_BINDING.with(|current| current.borrow_mut().replace(target));
        Self { previous }
    }
}

impl Drop for BindingScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_BINDING.with(|current| *current.borrow_mut() = previous);
    }
}

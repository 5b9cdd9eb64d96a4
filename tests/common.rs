use std::sync::{Arc, Mutex};

/// Returns a recording closure and a drain-and-check closure, for observing
/// what a slot saw without threading state through the test by hand.
#[allow(unused)]
pub fn watcher<T: Send + Sync + 'static>() -> (Box<dyn Fn(T) + Send + Sync>, Box<dyn Fn() -> Vec<T> + Send + Sync>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = {
        let seen = seen.clone();
        Box::new(move |value: T| {
            seen.lock().unwrap().push(value);
        })
    };
    let check = Box::new(move || seen.lock().unwrap().drain(..).collect::<Vec<T>>());
    (record, check)
}

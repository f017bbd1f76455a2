//! Publish/subscribe hub for host-originated events.
//!
//! Listeners run in registration order. Each callback's failure is isolated:
//! a panicking listener is caught and logged, and the remaining listeners
//! still run. A listener removed during the current dispatch pass is not
//! invoked in that pass.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;
use tracing::{debug, warn};

type Callback = Box<dyn FnMut(&Value) + Send>;

struct Listener {
    id: u64,
    once: bool,
    // Taken out while the callback runs so a re-entrant unsubscribe or
    // dispatch cannot deadlock on the table lock.
    callback: Option<Callback>,
}

#[derive(Default)]
struct Inner {
    next_listener: u64,
    listeners: HashMap<String, Vec<Listener>>,
}

/// Handle returned by [`EventDispatcher::on`] / [`EventDispatcher::once`].
/// `unsubscribe` is idempotent; calling it twice has no second effect.
pub struct Subscription {
    event: String,
    id: u64,
    inner: Weak<Mutex<Inner>>,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        if let Ok(mut inner) = inner.lock() {
            if let Some(list) = inner.listeners.get_mut(&self.event) {
                list.retain(|l| l.id != self.id);
            }
        };
    }
}

/// Dispatches host events to registered listeners.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    inner: Arc<Mutex<Inner>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for `event`. Invoked every time the event fires,
    /// in registration order relative to other listeners.
    pub fn on(&self, event: &str, callback: impl FnMut(&Value) + Send + 'static) -> Subscription {
        self.subscribe(event, Box::new(callback), false)
    }

    /// Register a listener that fires at most once, then removes itself.
    pub fn once(&self, event: &str, callback: impl FnMut(&Value) + Send + 'static) -> Subscription {
        self.subscribe(event, Box::new(callback), true)
    }

    /// Remove every listener for `event`.
    pub fn off(&self, event: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.listeners.remove(event);
        }
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.listeners.get(event).map(Vec::len).unwrap_or(0))
            .unwrap_or(0)
    }

    fn subscribe(&self, event: &str, callback: Callback, once: bool) -> Subscription {
        let id = match self.inner.lock() {
            Ok(mut inner) => {
                let id = inner.next_listener;
                inner.next_listener += 1;
                inner
                    .listeners
                    .entry(event.to_string())
                    .or_default()
                    .push(Listener {
                        id,
                        once,
                        callback: Some(callback),
                    });
                id
            }
            Err(_) => u64::MAX,
        };
        Subscription {
            event: event.to_string(),
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `data` to every listener registered for `event` at the start
    /// of the pass, skipping any removed mid-pass.
    pub fn dispatch(&self, event: &str, data: &Value) {
        let pass: Vec<u64> = match self.inner.lock() {
            Ok(inner) => inner
                .listeners
                .get(event)
                .map(|list| list.iter().map(|l| l.id).collect())
                .unwrap_or_default(),
            Err(_) => return,
        };
        if pass.is_empty() {
            debug!(event, "event with no listeners");
            return;
        }

        for id in pass {
            let taken = match self.inner.lock() {
                Ok(mut inner) => inner
                    .listeners
                    .get_mut(event)
                    .and_then(|list| list.iter_mut().find(|l| l.id == id))
                    .and_then(|l| l.callback.take().map(|cb| (cb, l.once))),
                Err(_) => None,
            };
            // Removed (or currently running re-entrantly) since the pass
            // started: skip.
            let Some((mut callback, once)) = taken else {
                continue;
            };

            let outcome = catch_unwind(AssertUnwindSafe(|| callback(data)));
            if let Err(panic) = outcome {
                warn!(
                    event,
                    listener = id,
                    panic = %panic_message(&panic),
                    "listener panicked during dispatch; continuing"
                );
            }

            if let Ok(mut inner) = self.inner.lock() {
                if let Some(list) = inner.listeners.get_mut(event) {
                    if once {
                        list.retain(|l| l.id != id);
                    } else if let Some(slot) = list.iter_mut().find(|l| l.id == id) {
                        // Still registered: hand the callback back. If the
                        // listener removed itself while running, there is no
                        // slot and the callback is dropped here.
                        slot.callback = Some(callback);
                    }
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Box<dyn FnMut(&Value) + Send>) {
        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let log2 = log.clone();
        let make = move |tag: &str| -> Box<dyn FnMut(&Value) + Send> {
            let log = log2.clone();
            let tag = tag.to_string();
            Box::new(move |data: &Value| {
                log.lock().unwrap().push(format!("{tag}:{data}"));
            })
        };
        (log, make)
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let d = EventDispatcher::new();
        let (log, make) = recorder();
        let _a = d.on("e", make("a"));
        let _b = d.on("e", make("b"));
        let _c = d.on("e", make("c"));

        d.dispatch("e", &json!(1));
        assert_eq!(
            log.lock().unwrap().clone(),
            vec!["a:1", "b:1", "c:1"]
        );
    }

    #[test]
    fn panicking_listener_does_not_stop_the_rest() {
        let d = EventDispatcher::new();
        let (log, make) = recorder();
        let _l1 = d.on("e", |_: &Value| panic!("boom"));
        let _l2 = d.on("e", make("survivor"));

        d.dispatch("e", &json!("x"));
        assert_eq!(log.lock().unwrap().clone(), vec!["survivor:\"x\""]);
        // The panicking listener stays registered.
        assert_eq!(d.listener_count("e"), 2);
    }

    #[test]
    fn once_fires_exactly_once() {
        let d = EventDispatcher::new();
        let (log, make) = recorder();
        let _l = d.once("e", make("once"));
        let _k = d.on("e", make("always"));

        d.dispatch("e", &json!(1));
        d.dispatch("e", &json!(2));
        assert_eq!(
            log.lock().unwrap().clone(),
            vec!["once:1", "always:1", "always:2"]
        );
        assert_eq!(d.listener_count("e"), 1);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let d = EventDispatcher::new();
        let (log, make) = recorder();
        let sub = d.on("e", make("gone"));
        let _keep = d.on("e", make("keep"));

        sub.unsubscribe();
        sub.unsubscribe();
        assert_eq!(d.listener_count("e"), 1);

        d.dispatch("e", &json!(1));
        assert_eq!(log.lock().unwrap().clone(), vec!["keep:1"]);
    }

    #[test]
    fn listener_removed_mid_pass_is_not_invoked() {
        let d = EventDispatcher::new();
        let (log, make) = recorder();

        // First listener unsubscribes the third during dispatch.
        let victim: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let victim2 = victim.clone();
        let _l1 = d.on("e", move |_: &Value| {
            if let Some(sub) = victim2.lock().unwrap().take() {
                sub.unsubscribe();
            }
        });
        let _l2 = d.on("e", make("second"));
        let l3 = d.on("e", make("third"));
        *victim.lock().unwrap() = Some(l3);

        d.dispatch("e", &json!(1));
        assert_eq!(log.lock().unwrap().clone(), vec!["second:1"]);
    }

    #[test]
    fn listener_can_remove_itself_while_running() {
        let d = EventDispatcher::new();
        let (log, make) = recorder();

        let own: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let own2 = own.clone();
        let log2 = log.clone();
        let sub = d.on("e", move |_: &Value| {
            log2.lock().unwrap().push("self".into());
            if let Some(sub) = own2.lock().unwrap().take() {
                sub.unsubscribe();
            }
        });
        *own.lock().unwrap() = Some(sub);
        let _after = d.on("e", make("after"));

        d.dispatch("e", &json!(1));
        d.dispatch("e", &json!(2));
        assert_eq!(
            log.lock().unwrap().clone(),
            vec!["self", "after:1", "after:2"]
        );
        assert_eq!(d.listener_count("e"), 1);
    }

    #[test]
    fn off_clears_all_listeners_for_a_type() {
        let d = EventDispatcher::new();
        let (log, make) = recorder();
        let _a = d.on("e", make("a"));
        let _b = d.on("e", make("b"));
        let _other = d.on("other", make("other"));

        d.off("e");
        d.dispatch("e", &json!(1));
        d.dispatch("other", &json!(1));

        assert_eq!(log.lock().unwrap().clone(), vec!["other:1"]);
    }

    #[test]
    fn dispatch_with_no_listeners_is_harmless() {
        let d = EventDispatcher::new();
        d.dispatch("nobody-home", &json!({"any": "thing"}));
    }

    #[test]
    fn listeners_registered_mid_pass_wait_for_the_next_pass() {
        let d = EventDispatcher::new();
        let (log, make) = recorder();

        let d2 = d.clone();
        let log2 = log.clone();
        let added = Arc::new(Mutex::new(false));
        let added2 = added.clone();
        let make2 = {
            let log3 = log.clone();
            move || -> Box<dyn FnMut(&Value) + Send> {
                let log = log3.clone();
                Box::new(move |data: &Value| {
                    log.lock().unwrap().push(format!("late:{data}"));
                })
            }
        };
        let _l1 = d.on("e", move |_: &Value| {
            log2.lock().unwrap().push("first".into());
            let mut added = added2.lock().unwrap();
            if !*added {
                *added = true;
                // Leak the subscription; the listener should stay registered.
                std::mem::forget(d2.on("e", make2()));
            }
        });
        let _l2 = d.on("e", make("second"));

        d.dispatch("e", &json!(1));
        assert_eq!(
            log.lock().unwrap().clone(),
            vec!["first", "second:1"]
        );

        d.dispatch("e", &json!(2));
        assert_eq!(
            log.lock().unwrap().clone(),
            vec!["first", "second:1", "first", "second:2", "late:2"]
        );
    }
}

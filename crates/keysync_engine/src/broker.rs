//! In-process change broker.
//!
//! The broker fans committed changes out to every listener registered for a
//! key, enabling:
//! - Sibling attachments on the same key to converge after a write
//! - An attachment to observe its own committed write
//! - One-shot writes made outside any attachment to reach live consumers
//!
//! # Usage
//!
//! ```rust
//! use keysync_engine::ChangeBroker;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let broker = ChangeBroker::new();
//! let hits = Arc::new(AtomicUsize::new(0));
//!
//! let counter = Arc::clone(&hits);
//! let id = broker.subscribe("theme", move |_raw: Option<&str>| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! broker.publish("theme", Some(r#""dark""#));
//! broker.unsubscribe("theme", id);
//! broker.publish("theme", None);
//!
//! assert_eq!(hits.load(Ordering::SeqCst), 1);
//! ```

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Callback invoked with the raw committed value, `None` for a deletion.
pub type Listener = Arc<dyn Fn(Option<&str>) + Send + Sync>;

/// Handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// A publish/subscribe registry keyed by storage key.
///
/// The broker:
/// - Delivers synchronously, in subscription order
/// - Passes raw text; it knows nothing about JSON or attachment state
/// - Drops a key's entry when its last listener unsubscribes
/// - Is thread-safe
#[derive(Default)]
pub struct ChangeBroker {
    /// Listeners per key, in subscription order.
    listeners: RwLock<HashMap<String, Vec<(ListenerId, Listener)>>>,
    next_id: AtomicU64,
}

impl ChangeBroker {
    /// Creates an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for changes to `key`.
    pub fn subscribe<F>(&self, key: &str, listener: F) -> ListenerId
    where
        F: Fn(Option<&str>) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .entry(key.to_string())
            .or_default()
            .push((id, Arc::new(listener)));
        tracing::trace!(key, listener = id.0, "subscribed");
        id
    }

    /// Removes a listener. Unknown ids are ignored.
    pub fn unsubscribe(&self, key: &str, id: ListenerId) {
        let mut listeners = self.listeners.write();
        if let Some(entries) = listeners.get_mut(key) {
            entries.retain(|(existing, _)| *existing != id);
            if entries.is_empty() {
                listeners.remove(key);
            }
        }
        tracing::trace!(key, listener = id.0, "unsubscribed");
    }

    /// Delivers `raw` to every listener currently registered for `key`.
    ///
    /// Listeners run after the registry lock is released, so a listener may
    /// itself subscribe or unsubscribe.
    pub fn publish(&self, key: &str, raw: Option<&str>) {
        let targets: Vec<Listener> = match self.listeners.read().get(key) {
            Some(entries) => entries.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return,
        };

        tracing::trace!(key, listeners = targets.len(), deleted = raw.is_none(), "publish");
        for listener in targets {
            listener(raw);
        }
    }

    /// Returns the number of listeners registered for `key`.
    pub fn listener_count(&self, key: &str) -> usize {
        self.listeners.read().get(key).map_or(0, Vec::len)
    }

    /// Returns the number of keys with at least one listener.
    pub fn key_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl std::fmt::Debug for ChangeBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeBroker")
            .field("keys", &self.key_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Listener) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_for = Arc::clone(&log);
        let make = move |tag: &str| -> Listener {
            let log = Arc::clone(&log_for);
            let tag = tag.to_string();
            Arc::new(move |raw: Option<&str>| {
                log.lock()
                    .push(format!("{tag}:{}", raw.unwrap_or("null")));
            })
        };
        (log, make)
    }

    #[test]
    fn publish_reaches_subscribers_in_order() {
        let broker = ChangeBroker::new();
        let (log, make) = recorder();

        let first = make("first");
        let second = make("second");
        broker.subscribe("k", move |raw| first(raw));
        broker.subscribe("k", move |raw| second(raw));

        broker.publish("k", Some("1"));
        assert_eq!(*log.lock(), vec!["first:1", "second:1"]);
    }

    #[test]
    fn publish_is_scoped_to_key() {
        let broker = ChangeBroker::new();
        let (log, make) = recorder();

        let a = make("a");
        broker.subscribe("a", move |raw| a(raw));
        broker.publish("b", Some("1"));
        broker.publish("a", None);

        assert_eq!(*log.lock(), vec!["a:null"]);
    }

    #[test]
    fn last_unsubscribe_removes_key() {
        let broker = ChangeBroker::new();
        let id1 = broker.subscribe("k", |_| {});
        let id2 = broker.subscribe("k", |_| {});
        assert_eq!(broker.listener_count("k"), 2);

        broker.unsubscribe("k", id1);
        assert_eq!(broker.listener_count("k"), 1);
        assert_eq!(broker.key_count(), 1);

        broker.unsubscribe("k", id2);
        assert_eq!(broker.listener_count("k"), 0);
        assert_eq!(broker.key_count(), 0);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let broker = ChangeBroker::new();
        let id = broker.subscribe("k", |_| {});

        broker.unsubscribe("k", id);
        broker.unsubscribe("k", id);
        broker.unsubscribe("other", id);
        assert_eq!(broker.key_count(), 0);
    }

    #[test]
    fn publish_without_listeners_is_noop() {
        let broker = ChangeBroker::new();
        broker.publish("nobody", Some("1"));
        assert_eq!(broker.key_count(), 0);
    }

    #[test]
    fn listener_may_unsubscribe_itself() {
        let broker = Arc::new(ChangeBroker::new());
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicU64::new(0));

        let inner_broker = Arc::clone(&broker);
        let inner_slot = Arc::clone(&slot);
        let inner_calls = Arc::clone(&calls);
        let id = broker.subscribe("k", move |_| {
            inner_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = *inner_slot.lock() {
                inner_broker.unsubscribe("k", id);
            }
        });
        *slot.lock() = Some(id);

        broker.publish("k", Some("1"));
        broker.publish("k", Some("2"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(broker.key_count(), 0);
    }

    #[test]
    fn threaded_publish() {
        let broker = Arc::new(ChangeBroker::new());
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        broker.subscribe("k", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let broker = Arc::clone(&broker);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        broker.publish("k", Some("x"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 100);
    }
}

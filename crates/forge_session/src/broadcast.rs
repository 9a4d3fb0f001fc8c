//! Change broadcaster.
//!
//! Observers receive no payload: a notification only means "state changed,
//! re-read it". Callbacks run synchronously on whichever task mutated the
//! session, with no lock held, so they may read the session or
//! (un)subscribe from inside the callback.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Observer = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    observers: Vec<(u64, Observer)>,
}

impl Registry {
    fn contains(&self, id: u64) -> bool {
        self.observers.iter().any(|(i, _)| *i == id)
    }
}

/// Registry of observers notified on every session mutation
#[derive(Clone, Default)]
pub struct Broadcaster {
    registry: Arc<Mutex<Registry>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. It stays registered until the returned
    /// subscription is unsubscribed.
    pub fn subscribe(&self, observer: impl Fn() + Send + Sync + 'static) -> Subscription {
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.observers.push((id, Arc::new(observer)));

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Invoke every live observer in registration order.
    pub fn notify(&self) {
        let round: Vec<(u64, Observer)> = self.registry.lock().observers.clone();
        for (id, observer) in round {
            // An earlier observer in this round may have removed this one.
            if self.registry.lock().contains(id) {
                observer();
            }
        }
    }

    /// Number of registered observers
    pub fn observer_count(&self) -> usize {
        self.registry.lock().observers.len()
    }
}

/// Token returned by [`Broadcaster::subscribe`]
#[must_use = "dropping a Subscription keeps the observer registered; call unsubscribe() to remove it"]
#[derive(Clone)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the observer. Calling this more than once is harmless.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().observers.retain(|(id, _)| *id != self.id);
        }
    }
}

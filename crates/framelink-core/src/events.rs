//! Event hook with ordered subscribers
//!
//! A minimal observer list used for transport notifications. Callbacks run
//! synchronously on the emitting thread in subscription order, so they are
//! expected to be fast and non-blocking; anything slow belongs on a channel
//! or worker owned by the subscriber.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Token identifying a subscribed callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

/// An ordered list of callbacks invoked on [`emit`](EventHook::emit)
pub struct EventHook<T = ()> {
    callbacks: Mutex<Vec<(u64, Callback<T>)>>,
    next_id: AtomicU64,
}

impl<T> EventHook<T> {
    /// Create an empty hook
    pub fn new() -> Self {
        Self {
            callbacks: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Append a callback and return the token that removes it.
    ///
    /// The same closure may be subscribed more than once; each call gets a
    /// distinct token and a distinct slot in the invocation order.
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut callbacks) = self.callbacks.lock() {
            callbacks.push((id, Arc::new(callback)));
        }
        Subscription(id)
    }

    /// Remove a previously subscribed callback.
    ///
    /// Returns `false` if the token was already removed (or never issued by
    /// this hook).
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        if let Ok(mut callbacks) = self.callbacks.lock() {
            let before = callbacks.len();
            callbacks.retain(|(id, _)| *id != subscription.0);
            before != callbacks.len()
        } else {
            false
        }
    }

    /// Remove every subscriber
    pub fn clear(&self) {
        if let Ok(mut callbacks) = self.callbacks.lock() {
            callbacks.clear();
        }
    }

    /// True when no callbacks are subscribed
    pub fn is_empty(&self) -> bool {
        self.callbacks.lock().map(|c| c.is_empty()).unwrap_or(true)
    }

    /// Number of subscribed callbacks
    pub fn len(&self) -> usize {
        self.callbacks.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Invoke every callback with `value`, in subscription order.
    ///
    /// The list is snapshotted first, so callbacks may subscribe or
    /// unsubscribe on this same hook without deadlocking; such changes take
    /// effect from the next emission.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Callback<T>> = match self.callbacks.lock() {
            Ok(callbacks) => callbacks.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
            Err(_) => return,
        };
        for callback in snapshot {
            callback(value);
        }
    }
}

impl EventHook<()> {
    /// Emit a payload-less event
    pub fn notify(&self) {
        self.emit(&());
    }
}

impl<T> Default for EventHook<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for EventHook<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHook")
            .field("subscribers", &self.len())
            .finish()
    }
}

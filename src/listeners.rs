//! Ordered listener lists with panic isolation.
//!
//! Used for transport events, named signal subscriptions and the telemetry
//! bus. Emission runs over a snapshot of the list, so a listener may add or
//! remove listeners (including itself) without deadlocking.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::error;

// ============================================================================
// Types
// ============================================================================

/// Shared listener callback.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct ListenerList<T> {
    next_id: u64,
    entries: Vec<(u64, Callback<T>)>,
}

// ============================================================================
// Listeners
// ============================================================================

/// Registration-ordered list of callbacks receiving `&T`.
pub struct Listeners<T> {
    label: &'static str,
    inner: Arc<Mutex<ListenerList<T>>>,
}

impl<T> Clone for Listeners<T> {
    fn clone(&self) -> Self {
        Self {
            label: self.label,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: 'static> fmt::Debug for Listeners<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("label", &self.label)
            .field("len", &self.len())
            .finish()
    }
}

impl<T: 'static> Listeners<T> {
    /// Creates an empty list; `label` names it in panic logs.
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            inner: Arc::new(Mutex::new(ListenerList {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Appends a callback.
    pub fn add<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut list = self.inner.lock();
            let id = list.next_id;
            list.next_id += 1;
            list.entries.push((id, Arc::new(callback)));
            id
        };

        let weak: Weak<Mutex<ListenerList<T>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.lock().entries.retain(|(entry, _)| *entry != id);
            }
        })
    }

    /// Calls every callback in registration order.
    ///
    /// A panicking callback is logged and skipped. Returns the number of
    /// callbacks that panicked.
    pub fn emit(&self, value: &T) -> usize {
        let snapshot: Vec<Callback<T>> = self
            .inner
            .lock()
            .entries
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        let mut panicked = 0;
        for callback in snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
                panicked += 1;
                error!(listener = self.label, "Listener panicked");
            }
        }
        panicked
    }

    /// Returns the number of registered callbacks.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns `true` if no callback is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every callback.
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Handle for removing a registered callback.
///
/// Dropping the handle keeps the callback registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
#[must_use = "dropping a Subscription leaves the listener registered"]
pub struct Subscription {
    remove: Box<dyn FnOnce() + Send + Sync>,
}

impl Subscription {
    /// Wraps a removal closure.
    pub(crate) fn new(remove: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            remove: Box::new(remove),
        }
    }

    /// Combines several subscriptions into one.
    pub(crate) fn all(subscriptions: Vec<Subscription>) -> Self {
        Self::new(move || {
            for subscription in subscriptions {
                subscription.unsubscribe();
            }
        })
    }

    /// Removes the callback. Idempotent with respect to the list.
    pub fn unsubscribe(self) {
        (self.remove)();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

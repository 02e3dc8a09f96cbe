//! Plugin contract shared by every incremental statistic.

use std::sync::Arc;

use parking_lot::Mutex;

/// Callback invoked synchronously with a plugin's latest result.
///
/// The reference is only valid for the duration of the call.
pub type Listener<O> = Box<dyn FnMut(&O) + Send>;

/// Predicate deciding whether an item participates in a statistic.
pub type ItemFilter<V> = Box<dyn Fn(&V) -> bool + Send>;

/// Maps a window item to the numeric value a plugin works on.
pub type Extractor<V, N> = Box<dyn Fn(&V) -> N + Send>;

/// An incremental computation attached to a [`SlidingWindow`](super::SlidingWindow).
///
/// The window calls `on_add` after an item is stored and `on_remove` right
/// before an evicted item is discarded, always in FIFO order.
pub trait WindowPlugin<V>: Send {
    fn on_add(&mut self, item: &V);

    fn on_remove(&mut self, item: &V);

    /// Returns the accumulator to its initial state without notifying.
    fn reset(&mut self);

    /// Called by [`SlidingWindow::refresh`](super::SlidingWindow::refresh) so
    /// plugins with internal timed state can catch up without new data.
    fn on_refresh(&mut self) {}
}

/// Fan-out of results to registered listeners.
pub(crate) struct Notifier<O> {
    listeners: Vec<Listener<O>>,
}

impl<O> Default for Notifier<O> {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }
}

impl<O> Notifier<O> {
    pub(crate) fn push(&mut self, listener: Listener<O>) {
        self.listeners.push(listener);
    }

    pub(crate) fn notify(&mut self, output: &O) {
        for listener in self.listeners.iter_mut() {
            listener(output);
        }
    }
}

/// Shared cell holding the most recent result of a plugin.
///
/// Useful when the owner of a window needs to read a statistic back
/// synchronously, e.g. the sent-bytes sum consulted by the overuse test.
///
/// ```
/// # use mprtp_cc::stats::{LatestValue, SlidingWindow, Sum};
/// let sum = LatestValue::new(0.0);
/// let mut window = SlidingWindow::new(16, None);
/// window.add_plugin(Sum::new(|v: &f64| *v).with_listener(sum.recorder()));
/// window.add(3.0);
/// window.add(4.5);
/// assert_eq!(sum.get(), 7.5);
/// ```
pub struct LatestValue<O> {
    inner: Arc<Mutex<O>>,
}

impl<O> Clone for LatestValue<O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<O: Clone + Send + 'static> LatestValue<O> {
    pub fn new(initial: O) -> Self {
        Self {
            inner: Arc::new(Mutex::new(initial)),
        }
    }

    /// Returns a listener that stores every notified value into this cell.
    pub fn recorder(&self) -> Listener<O> {
        let inner = Arc::clone(&self.inner);
        Box::new(move |value: &O| {
            *inner.lock() = value.clone();
        })
    }

    pub fn get(&self) -> O {
        self.inner.lock().clone()
    }

    pub fn set(&self, value: O) {
        *self.inner.lock() = value;
    }
}

impl<O: std::fmt::Debug> std::fmt::Debug for LatestValue<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("LatestValue").field(&*self.inner.lock()).finish()
    }
}

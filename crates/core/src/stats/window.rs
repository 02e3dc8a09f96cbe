use std::collections::VecDeque;
use std::time::Duration;

use super::plugin::WindowPlugin;
use crate::time::{RealTime, TimeSource};

struct WindowItem<V> {
    value: V,
    added_at: u64,
}

/// FIFO window of timestamped items bounded by count and/or age.
///
/// A `capacity` of 0 leaves the window unbounded by count; a `threshold` of
/// `None` disables age based eviction. Evicted items are handed to every
/// plugin and to every removal listener before they are dropped, which is how
/// windows chain into each other (see [`Correlation`](super::Correlation)).
pub struct SlidingWindow<V, T: TimeSource = RealTime> {
    items: VecDeque<WindowItem<V>>,
    capacity: usize,
    threshold: Option<Duration>,
    plugins: Vec<Box<dyn WindowPlugin<V>>>,
    removal_listeners: Vec<Box<dyn FnMut(&V) + Send>>,
    time_source: T,
}

impl<V> SlidingWindow<V, RealTime> {
    pub fn new(capacity: usize, threshold: Option<Duration>) -> Self {
        Self::new_with_time_source(capacity, threshold, RealTime::new())
    }
}

impl<V, T: TimeSource> SlidingWindow<V, T> {
    pub fn new_with_time_source(capacity: usize, threshold: Option<Duration>, time_source: T) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            threshold,
            plugins: Vec::new(),
            removal_listeners: Vec::new(),
            time_source,
        }
    }

    pub fn add_plugin(&mut self, plugin: impl WindowPlugin<V> + 'static) {
        self.plugins.push(Box::new(plugin));
    }

    /// Registers a callback invoked with every evicted item, after the plugins.
    pub fn on_remove(&mut self, listener: impl FnMut(&V) + Send + 'static) {
        self.removal_listeners.push(Box::new(listener));
    }

    /// Stores `value` stamped with the current time, then evicts.
    pub fn add(&mut self, value: V) {
        let added_at = self.time_source.now_nanos();
        for plugin in self.plugins.iter_mut() {
            plugin.on_add(&value);
        }
        self.items.push_back(WindowItem { value, added_at });
        self.evict();
    }

    /// Evicts expired items without inserting anything.
    pub fn refresh(&mut self) {
        self.evict();
        for plugin in self.plugins.iter_mut() {
            plugin.on_refresh();
        }
    }

    /// Evicts every item through the plugins, oldest first.
    pub fn clear(&mut self) {
        while let Some(item) = self.items.pop_front() {
            self.discard(item);
        }
    }

    /// Drops all items and resets plugin state without notifying anyone.
    pub fn reset(&mut self) {
        self.items.clear();
        for plugin in self.plugins.iter_mut() {
            plugin.reset();
        }
    }

    /// Takes effect on the next eviction pass.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    /// Takes effect on the next eviction pass.
    pub fn set_threshold(&mut self, threshold: Option<Duration>) {
        self.threshold = threshold;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn threshold(&self) -> Option<Duration> {
        self.threshold
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn front(&self) -> Option<&V> {
        self.items.front().map(|item| &item.value)
    }

    pub fn back(&self) -> Option<&V> {
        self.items.back().map(|item| &item.value)
    }

    /// Iterates items oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &V> {
        self.items.iter().map(|item| &item.value)
    }

    fn evict(&mut self) {
        let now = self.time_source.now_nanos();
        loop {
            let over_capacity = self.capacity > 0 && self.items.len() > self.capacity;
            let expired = match (self.threshold, self.items.front()) {
                (Some(threshold), Some(oldest)) => {
                    now.saturating_sub(oldest.added_at) > threshold.as_nanos() as u64
                }
                _ => false,
            };
            if !over_capacity && !expired {
                break;
            }
            let Some(item) = self.items.pop_front() else {
                break;
            };
            self.discard(item);
        }
    }

    fn discard(&mut self, item: WindowItem<V>) {
        for plugin in self.plugins.iter_mut() {
            plugin.on_remove(&item.value);
        }
        for listener in self.removal_listeners.iter_mut() {
            listener(&item.value);
        }
    }
}

impl<V, T: TimeSource> std::fmt::Debug for SlidingWindow<V, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindow")
            .field("len", &self.items.len())
            .field("capacity", &self.capacity)
            .field("threshold", &self.threshold)
            .field("plugins", &self.plugins.len())
            .finish()
    }
}

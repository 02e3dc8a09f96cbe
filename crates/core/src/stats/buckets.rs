use std::collections::VecDeque;

use super::plugin::{Extractor, WindowPlugin};

/// Receives every bucket sum after each change.
pub type BucketListener = Box<dyn FnMut(&[i64]) + Send>;

/// Sums values into buckets split by ascending thresholds.
///
/// With `n` thresholds there are `n + 1` buckets: a value lands in the first
/// bucket whose threshold is `>=` the value, or in the last one. The bucket
/// chosen at insertion is remembered, so removals stay consistent even after
/// [`change_thresholds`](Self::change_thresholds).
pub struct Bucketizer<V> {
    extractor: Extractor<V, i64>,
    thresholds: Vec<i64>,
    buckets: Vec<i64>,
    assigned: VecDeque<usize>,
    listeners: Vec<BucketListener>,
}

impl<V> Bucketizer<V> {
    pub fn new(thresholds: Vec<i64>, extractor: impl Fn(&V) -> i64 + Send + 'static) -> Self {
        let buckets = vec![0; thresholds.len() + 1];
        Self {
            extractor: Box::new(extractor),
            thresholds,
            buckets,
            assigned: VecDeque::new(),
            listeners: Vec::new(),
        }
    }

    pub fn with_listener(mut self, listener: BucketListener) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Applies to future insertions only. The bucket count never changes;
    /// surplus thresholds are ignored and missing ones fall into the last bucket.
    pub fn change_thresholds(&mut self, thresholds: Vec<i64>) {
        if thresholds.len() + 1 != self.buckets.len() {
            tracing::warn!(
                expected = self.buckets.len() - 1,
                got = thresholds.len(),
                "Bucket threshold count mismatch"
            );
        }
        self.thresholds = thresholds;
    }

    pub fn buckets(&self) -> &[i64] {
        &self.buckets
    }

    pub fn thresholds(&self) -> &[i64] {
        &self.thresholds
    }

    fn index_of(&self, value: i64) -> usize {
        let last = self.buckets.len() - 1;
        self.thresholds
            .iter()
            .take(last)
            .position(|threshold| value <= *threshold)
            .unwrap_or(last)
    }

    fn notify(&mut self) {
        for listener in self.listeners.iter_mut() {
            listener(&self.buckets);
        }
    }
}

impl<V> WindowPlugin<V> for Bucketizer<V> {
    fn on_add(&mut self, item: &V) {
        let value = (self.extractor)(item);
        let index = self.index_of(value);
        self.buckets[index] += value;
        self.assigned.push_back(index);
        self.notify();
    }

    fn on_remove(&mut self, item: &V) {
        let Some(index) = self.assigned.pop_front() else {
            tracing::warn!("Bucket removal without a matching insertion");
            return;
        };
        self.buckets[index] -= (self.extractor)(item);
        self.notify();
    }

    fn reset(&mut self) {
        self.buckets.iter_mut().for_each(|b| *b = 0);
        self.assigned.clear();
    }
}

use super::plugin::{ItemFilter, Listener, Notifier, WindowPlugin};

/// Receives every bucket count after each change.
pub type HistogramListener = Box<dyn FnMut(&[u64]) + Send>;

/// Incremental "which bucket holds the p-th percentile" pointer.
struct BucketPercentile {
    percentile: u32,
    /// Bucket currently holding the percentile rank.
    index: usize,
    /// Number of samples in buckets strictly below `index`.
    before: u64,
    total: u64,
    notifier: Notifier<usize>,
}

impl BucketPercentile {
    /// Keeps `before < rank <= before + counts[index]` after a count change
    /// at `changed`, walking the pointer one bucket at a time.
    fn update(&mut self, counts: &[u64], changed: usize, added: bool) {
        if changed < self.index {
            if added {
                self.before += 1;
            } else {
                self.before = self.before.saturating_sub(1);
            }
        }
        if added {
            self.total += 1;
        } else {
            self.total = self.total.saturating_sub(1);
        }
        self.seek(counts);
        let index = self.index;
        self.notifier.notify(&index);
    }

    fn seek(&mut self, counts: &[u64]) {
        let rank = (self.total * self.percentile as u64).div_ceil(100).max(1);
        while self.index > 0 && self.before >= rank {
            self.index -= 1;
            self.before -= counts[self.index];
        }
        while self.index + 1 < counts.len() && self.before + counts[self.index] < rank {
            self.before += counts[self.index];
            self.index += 1;
        }
    }
}

/// Fixed-length histogram with an injected bucket index function.
///
/// Indexes past the end are clamped into the last bucket.
pub struct Histogram<V> {
    index_of: Box<dyn Fn(&V) -> usize + Send>,
    filter: Option<ItemFilter<V>>,
    counts: Vec<u64>,
    trackers: Vec<BucketPercentile>,
    listeners: Vec<HistogramListener>,
}

impl<V> Histogram<V> {
    pub fn new(buckets: usize, index_of: impl Fn(&V) -> usize + Send + 'static) -> Self {
        Self {
            index_of: Box::new(index_of),
            filter: None,
            counts: vec![0; buckets.max(1)],
            trackers: Vec::new(),
            listeners: Vec::new(),
        }
    }

    pub fn with_listener(mut self, listener: HistogramListener) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn with_filter(mut self, filter: impl Fn(&V) -> bool + Send + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Attaches a tracker reporting the index of the bucket holding `percentile`.
    ///
    /// A tracker attached to a populated histogram starts from the current
    /// counts and notifies its listener right away.
    pub fn add_percentile_tracker(&mut self, percentile: u32, listener: Listener<usize>) {
        let mut notifier = Notifier::default();
        notifier.push(listener);
        let mut tracker = BucketPercentile {
            percentile: percentile.min(100),
            index: 0,
            before: 0,
            total: self.counts.iter().sum(),
            notifier,
        };
        if tracker.total > 0 {
            tracker.seek(&self.counts);
            let index = tracker.index;
            tracker.notifier.notify(&index);
        }
        self.trackers.push(tracker);
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Bucket indexes of every attached tracker, in attach order.
    pub fn percentile_indexes(&self) -> Vec<usize> {
        self.trackers.iter().map(|t| t.index).collect()
    }

    fn bucket(&self, item: &V) -> Option<usize> {
        if self.filter.as_ref().is_some_and(|filter| !filter(item)) {
            return None;
        }
        Some((self.index_of)(item).min(self.counts.len() - 1))
    }

    fn changed(&mut self, index: usize, added: bool) {
        for listener in self.listeners.iter_mut() {
            listener(&self.counts);
        }
        for tracker in self.trackers.iter_mut() {
            tracker.update(&self.counts, index, added);
        }
    }
}

impl<V> WindowPlugin<V> for Histogram<V> {
    fn on_add(&mut self, item: &V) {
        let Some(index) = self.bucket(item) else {
            return;
        };
        self.counts[index] += 1;
        self.changed(index, true);
    }

    fn on_remove(&mut self, item: &V) {
        let Some(index) = self.bucket(item) else {
            return;
        };
        if self.counts[index] == 0 {
            tracing::warn!(index, "Removing from an empty histogram bucket");
            return;
        }
        self.counts[index] -= 1;
        self.changed(index, false);
    }

    fn reset(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0);
        for tracker in self.trackers.iter_mut() {
            tracker.index = 0;
            tracker.before = 0;
            tracker.total = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::LatestValue;

    fn by_tens() -> Histogram<u32> {
        Histogram::new(10, |v: &u32| (*v / 10) as usize)
    }

    #[test]
    fn test_counts_and_clamping() {
        let mut h = by_tens();
        for v in [1, 5, 15, 95, 500] {
            h.on_add(&v);
        }
        assert_eq!(h.counts(), &[2, 1, 0, 0, 0, 0, 0, 0, 0, 2]);
        h.on_remove(&500);
        assert_eq!(h.counts()[9], 1);
    }

    #[test]
    fn test_percentile_tracker_follows_counts() {
        let mut h = by_tens();
        let median = LatestValue::new(usize::MAX);
        h.add_percentile_tracker(50, median.recorder());

        for v in [5, 15, 25, 35, 45] {
            h.on_add(&v);
        }
        assert_eq!(median.get(), 2, "third of five samples is in bucket 2");

        for v in [85, 86, 87, 88] {
            h.on_add(&v);
        }
        assert_eq!(median.get(), 4, "fifth of nine samples is in bucket 4");

        for v in [5, 15, 25, 35] {
            h.on_remove(&v);
        }
        assert_eq!(median.get(), 8);
    }

    #[test]
    fn test_percentile_tracker_matches_full_scan() {
        let mut h = by_tens();
        h.add_percentile_tracker(90, Box::new(|_: &usize| {}));
        let samples: Vec<u32> = (0..200).map(|i| (i * 37) % 100).collect();
        for (i, v) in samples.iter().enumerate() {
            h.on_add(v);
            if i >= 50 {
                h.on_remove(&samples[i - 50]);
            }
            let total: u64 = h.counts().iter().sum();
            let rank = (total * 90).div_ceil(100).max(1);
            let mut seen = 0;
            let expected = h
                .counts()
                .iter()
                .position(|c| {
                    seen += c;
                    seen >= rank
                })
                .unwrap_or(9);
            assert_eq!(h.percentile_indexes(), vec![expected]);
        }
    }

    #[test]
    fn test_tracker_attached_late_starts_from_counts() {
        let mut h = by_tens();
        for v in [5, 15, 25, 35, 45, 55, 65] {
            h.on_add(&v);
        }
        let p75 = LatestValue::new(usize::MAX);
        h.add_percentile_tracker(75, p75.recorder());
        assert_eq!(p75.get(), 5, "sixth of seven samples is in bucket 5");

        h.on_remove(&5);
        h.on_remove(&15);
        // Rank 4 of five remaining samples.
        assert_eq!(p75.get(), 5);
        h.on_add(&95);
        // Rank 5 of six.
        assert_eq!(p75.get(), 6);
        assert_eq!(h.percentile_indexes(), vec![6]);
    }

    #[test]
    fn test_filter() {
        let mut h = by_tens().with_filter(|v| *v % 2 == 0);
        h.on_add(&3);
        h.on_add(&4);
        assert_eq!(h.counts()[0], 1);
    }
}

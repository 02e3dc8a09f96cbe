//! Streaming percentile over an evictable multiset.
//!
//! Values are split into two ordered multisets: `low` holds everything at or
//! below the pivot, `high` everything above it. The balancer keeps
//! `|low| / |high|` at `p / (100 - p)`, so the requested percentile always sits
//! on the boundary between `top(low)` and `bottom(high)`. Inserting and
//! evicting are `O(log n)`; duplicates share one node with a count.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use ordered_float::OrderedFloat;

use super::plugin::{Extractor, ItemFilter, Listener, Notifier, WindowPlugin};

/// Lowest percentile accepted; requests below are clamped.
pub const MIN_PERCENTILE: u32 = 10;
/// Highest percentile accepted; requests above are clamped.
pub const MAX_PERCENTILE: u32 = 90;

/// Values the percentile trees can hold.
///
/// `midpoint` is used when the percentile falls exactly between two samples.
pub trait PercentileValue: Ord + Copy + Send + std::fmt::Debug + 'static {
    fn midpoint(a: Self, b: Self) -> Self;
}

macro_rules! int_midpoint {
    ($($ty:ty),*) => {
        $(
            impl PercentileValue for $ty {
                /// Floor of the half-sum, computed without overflow.
                fn midpoint(a: Self, b: Self) -> Self {
                    (a & b) + ((a ^ b) >> 1)
                }
            }
        )*
    };
}

int_midpoint!(i32, i64, u16, u32, u64);

impl PercentileValue for OrderedFloat<f64> {
    fn midpoint(a: Self, b: Self) -> Self {
        OrderedFloat(a.0 / 2.0 + b.0 / 2.0)
    }
}

/// Result emitted after every change to the tracked multiset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PercentileStats<N> {
    /// `None` until at least `required` samples are tracked.
    pub value: Option<N>,
    pub min: Option<N>,
    pub max: Option<N>,
}

impl<N> PercentileStats<N> {
    pub fn is_ready(&self) -> bool {
        self.value.is_some()
    }
}

#[derive(Debug)]
struct Multiset<N> {
    nodes: BTreeMap<N, usize>,
    len: usize,
}

impl<N: Ord + Copy> Multiset<N> {
    fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            len: 0,
        }
    }

    fn insert(&mut self, value: N) {
        *self.nodes.entry(value).or_insert(0) += 1;
        self.len += 1;
    }

    fn remove(&mut self, value: &N) -> bool {
        match self.nodes.get_mut(value) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                self.nodes.remove(value);
            }
            None => return false,
        }
        self.len -= 1;
        true
    }

    fn top(&self) -> Option<N> {
        self.nodes.last_key_value().map(|(k, _)| *k)
    }

    fn bottom(&self) -> Option<N> {
        self.nodes.first_key_value().map(|(k, _)| *k)
    }

    fn pop_top(&mut self) -> Option<N> {
        let top = self.top()?;
        self.remove(&top);
        Some(top)
    }

    fn pop_bottom(&mut self) -> Option<N> {
        let bottom = self.bottom()?;
        self.remove(&bottom);
        Some(bottom)
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.len = 0;
    }
}

/// Dual order-statistics tree percentile estimator.
pub struct Percentile<V, N> {
    extractor: Extractor<V, N>,
    filter: Option<ItemFilter<V>>,
    percentile: u32,
    required: usize,
    low: Multiset<N>,
    high: Multiset<N>,
    stats: PercentileStats<N>,
    notifier: Notifier<PercentileStats<N>>,
}

impl<V, N: PercentileValue> Percentile<V, N> {
    /// `percentile` is clamped into `[MIN_PERCENTILE, MAX_PERCENTILE]`.
    pub fn new(percentile: u32, extractor: impl Fn(&V) -> N + Send + 'static) -> Self {
        let mut this = Self {
            extractor: Box::new(extractor),
            filter: None,
            percentile: 0,
            required: 2,
            low: Multiset::new(),
            high: Multiset::new(),
            stats: PercentileStats {
                value: None,
                min: None,
                max: None,
            },
            notifier: Notifier::default(),
        };
        this.set_percentile(percentile);
        this
    }

    pub fn with_listener(mut self, listener: Listener<PercentileStats<N>>) -> Self {
        self.notifier.push(listener);
        self
    }

    /// Only items accepted by `filter` are tracked; the same check runs on removal.
    pub fn with_filter(mut self, filter: impl Fn(&V) -> bool + Send + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Changes the tracked percentile and rebalances the existing samples.
    pub fn set_percentile(&mut self, percentile: u32) {
        self.percentile = percentile.clamp(MIN_PERCENTILE, MAX_PERCENTILE);
        self.required = required_samples(self.percentile);
        self.balance();
        self.calculate();
    }

    pub fn percentile(&self) -> u32 {
        self.percentile
    }

    /// Number of samples needed before an estimate is produced.
    pub fn required(&self) -> usize {
        self.required
    }

    pub fn stats(&self) -> PercentileStats<N> {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.low.len + self.high.len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(|low|, |high|)`.
    pub fn tree_sizes(&self) -> (usize, usize) {
        (self.low.len, self.high.len)
    }

    /// Compares `low / high` against the target `p / (100 - p)` exactly.
    fn compare_ratio(&self, low: usize, high: usize) -> Ordering {
        let p = self.percentile as u128;
        (low as u128 * (100 - p)).cmp(&(high as u128 * p))
    }

    fn accepts(&self, item: &V) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(item))
    }

    /// Keeps `top(low) <= bottom(high)`; an empty `low` defers to `bottom(high)`.
    fn insert(&mut self, value: N) {
        let into_low = match (self.low.top(), self.high.bottom()) {
            (Some(top), _) => value <= top,
            (None, Some(bottom)) => value <= bottom,
            (None, None) => true,
        };
        if into_low {
            self.low.insert(value);
        } else {
            self.high.insert(value);
        }
    }

    fn balance(&mut self) {
        if self.len() < self.required {
            return;
        }
        let shrink_low = self.high.len == 0
            || (self.low.len != 0
                && self.compare_ratio(self.low.len, self.high.len) == Ordering::Greater);

        if shrink_low {
            // Move while one more move keeps low/high at or above the target.
            while self.low.len > 0
                && self.compare_ratio(self.low.len - 1, self.high.len + 1) != Ordering::Less
            {
                let Some(value) = self.low.pop_top() else { break };
                self.high.insert(value);
            }
        } else {
            while self.high.len > 0
                && self.compare_ratio(self.low.len + 1, self.high.len - 1) != Ordering::Greater
            {
                let Some(value) = self.high.pop_bottom() else { break };
                self.low.insert(value);
            }
        }
    }

    fn calculate(&mut self) {
        self.stats.value = if self.len() < self.required {
            None
        } else {
            match self.compare_ratio(self.low.len, self.high.len) {
                Ordering::Greater => self.low.top(),
                Ordering::Less => self.high.bottom(),
                Ordering::Equal => match (self.low.top(), self.high.bottom()) {
                    (Some(left), Some(right)) => Some(N::midpoint(left, right)),
                    (left, right) => left.or(right),
                },
            }
        };
        self.stats.min = self.low.bottom().or_else(|| self.high.bottom());
        self.stats.max = self.high.top().or_else(|| self.low.top());
        let stats = self.stats;
        self.notifier.notify(&stats);
    }
}

/// `⌊ratio⌋ + 1` (or `⌊1/ratio⌋ + 1` below the median), at least 2.
fn required_samples(percentile: u32) -> usize {
    let p = percentile as usize;
    match p.cmp(&50) {
        Ordering::Less => (100 - p) / p + 1,
        Ordering::Greater => p / (100 - p) + 1,
        Ordering::Equal => 2,
    }
    .max(2)
}

impl<V, N: PercentileValue> WindowPlugin<V> for Percentile<V, N> {
    fn on_add(&mut self, item: &V) {
        if !self.accepts(item) {
            return;
        }
        let value = (self.extractor)(item);
        self.insert(value);
        self.balance();
        self.calculate();
    }

    fn on_remove(&mut self, item: &V) {
        if !self.accepts(item) {
            return;
        }
        let value = (self.extractor)(item);
        if !self.low.remove(&value) && !self.high.remove(&value) {
            tracing::warn!(?value, "Removing value not tracked by percentile estimator");
            return;
        }
        self.balance();
        self.calculate();
    }

    fn reset(&mut self) {
        self.low.clear();
        self.high.clear();
        self.stats = PercentileStats {
            value: None,
            min: None,
            max: None,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(p: u32) -> Percentile<i64, i64> {
        Percentile::new(p, |v: &i64| *v)
    }

    #[test]
    fn test_percentile_is_clamped() {
        assert_eq!(tracker(5).percentile(), 10);
        assert_eq!(tracker(99).percentile(), 90);
        assert_eq!(tracker(40).percentile(), 40);
    }

    #[test]
    fn test_required_samples() {
        assert_eq!(required_samples(10), 10);
        assert_eq!(required_samples(30), 3);
        assert_eq!(required_samples(40), 2);
        assert_eq!(required_samples(50), 2);
        assert_eq!(required_samples(60), 2);
        assert_eq!(required_samples(75), 4);
        assert_eq!(required_samples(90), 10);
    }

    #[test]
    fn test_fortieth_percentile_example() {
        let mut p = tracker(40);
        for v in [7, 1, 3, 8, 2, 6, 4, 5, 9, 10] {
            p.on_add(&v);
        }
        let stats = p.stats();
        assert_eq!(p.tree_sizes(), (4, 6));
        assert_eq!(stats.value, Some(4), "floor((4 + 5) / 2)");
        assert_eq!(stats.min, Some(1));
        assert_eq!(stats.max, Some(10));
    }

    #[test]
    fn test_not_ready_below_required() {
        let mut p = tracker(75);
        for v in [1, 2, 3] {
            p.on_add(&v);
            assert!(!p.stats().is_ready());
        }
        p.on_add(&4);
        assert!(p.stats().is_ready(), "exactly `required` samples must yield a value");
    }

    #[test]
    fn test_median_of_odd_and_even() {
        let mut p = tracker(50);
        for v in [5, 1, 3] {
            p.on_add(&v);
        }
        assert_eq!(p.stats().value, Some(3));
        p.on_add(&8);
        assert_eq!(p.stats().value, Some(4), "floor((3 + 5) / 2)");
    }

    #[test]
    fn test_duplicates_share_nodes() {
        let mut p = tracker(50);
        for _ in 0..100 {
            p.on_add(&7);
        }
        assert_eq!(p.len(), 100);
        assert_eq!(p.stats().value, Some(7));
        assert!(p.low.nodes.len() <= 1 && p.high.nodes.len() <= 1);
    }

    #[test]
    fn test_remove_unknown_value_leaves_state() {
        let mut p = tracker(50);
        for v in [1, 2, 3, 4] {
            p.on_add(&v);
        }
        let before = (p.tree_sizes(), p.stats());
        p.on_remove(&42);
        assert_eq!((p.tree_sizes(), p.stats()), before);
    }

    #[test]
    fn test_remove_everything_returns_to_empty() {
        let mut p = tracker(30);
        let values = [9, 3, 3, 7, 1, 12, 3];
        for v in values {
            p.on_add(&v);
        }
        for v in values {
            p.on_remove(&v);
        }
        assert!(p.is_empty());
        assert_eq!(p.stats(), PercentileStats::default());
    }

    #[test]
    fn test_filter_skips_items() {
        let mut p = Percentile::new(50, |v: &(bool, i64)| v.1).with_filter(|v| v.0);
        for v in [(true, 10), (false, 1000), (true, 20), (false, -5), (true, 30)] {
            p.on_add(&v);
        }
        assert_eq!(p.len(), 3);
        assert_eq!(p.stats().value, Some(20));
        p.on_remove(&(false, 1000));
        assert_eq!(p.len(), 3);
    }

    #[test]
    fn test_midpoint_does_not_overflow() {
        assert_eq!(
            <u64 as PercentileValue>::midpoint(u64::MAX, u64::MAX - 1),
            u64::MAX - 1
        );
        assert_eq!(
            <i64 as PercentileValue>::midpoint(i64::MIN, i64::MIN + 1),
            i64::MIN
        );
        assert_eq!(<i64 as PercentileValue>::midpoint(-3, 4), 0);
        assert_eq!(<i64 as PercentileValue>::midpoint(-3, -2), -3);
        assert_eq!(
            <OrderedFloat<f64> as PercentileValue>::midpoint(OrderedFloat(1.0), OrderedFloat(2.0)),
            OrderedFloat(1.5)
        );
    }

    #[test]
    fn test_refill_after_low_tree_empties() {
        let mut p = tracker(50);
        p.on_add(&5);
        p.on_add(&10);
        p.on_remove(&5);
        assert_eq!(p.tree_sizes(), (0, 1));

        p.on_add(&20);
        p.on_add(&7);
        assert_eq!(p.stats().value, Some(10));
        assert_eq!(p.tree_sizes(), (2, 1));
        assert!(p.low.top() <= p.high.bottom());
    }

    #[test]
    fn test_set_percentile_rebalances() {
        let mut p = tracker(50);
        for v in 1..=10 {
            p.on_add(&v);
        }
        p.set_percentile(90);
        assert_eq!(p.tree_sizes(), (9, 1));
        assert_eq!(p.stats().value, Some(9));
    }
}

use itertools::Itertools;

use super::percentile::{PercentileValue, MAX_PERCENTILE, MIN_PERCENTILE};
use super::plugin::{Extractor, Listener, Notifier, WindowPlugin};

/// Reference percentile that sorts every tracked value on each change.
///
/// `O(n log n)` per update; meant for verifying [`Percentile`](super::Percentile)
/// and for small windows where simplicity wins.
pub struct LinearPercentile<V, N> {
    extractor: Extractor<V, N>,
    percentile: u32,
    values: Vec<N>,
    result: Option<N>,
    notifier: Notifier<Option<N>>,
}

impl<V, N: PercentileValue> LinearPercentile<V, N> {
    pub fn new(percentile: u32, extractor: impl Fn(&V) -> N + Send + 'static) -> Self {
        Self {
            extractor: Box::new(extractor),
            percentile: percentile.clamp(MIN_PERCENTILE, MAX_PERCENTILE),
            values: Vec::new(),
            result: None,
            notifier: Notifier::default(),
        }
    }

    pub fn with_listener(mut self, listener: Listener<Option<N>>) -> Self {
        self.notifier.push(listener);
        self
    }

    pub fn value(&self) -> Option<N> {
        self.result
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn calculate(&mut self) {
        let sorted: Vec<N> = self.values.iter().copied().sorted().collect();
        let scaled = sorted.len() * self.percentile as usize;
        let position = scaled / 100;
        self.result = if sorted.is_empty() {
            None
        } else if scaled % 100 == 0 {
            Some(N::midpoint(sorted[position - 1], sorted[position]))
        } else {
            Some(sorted[position])
        };
        let result = self.result;
        self.notifier.notify(&result);
    }
}

impl<V, N: PercentileValue> WindowPlugin<V> for LinearPercentile<V, N> {
    fn on_add(&mut self, item: &V) {
        self.values.push((self.extractor)(item));
        self.calculate();
    }

    fn on_remove(&mut self, item: &V) {
        let value = (self.extractor)(item);
        match self.values.iter().position(|v| *v == value) {
            Some(index) => {
                self.values.swap_remove(index);
            }
            None => {
                tracing::warn!(?value, "Removing value not tracked by linear percentile");
                return;
            }
        }
        self.calculate();
    }

    fn reset(&mut self) {
        self.values.clear();
        self.result = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_matches_worked_example() {
        let mut p = LinearPercentile::new(40, |v: &i64| *v);
        for v in [7, 1, 3, 8, 2, 6, 4, 5, 9, 10] {
            p.on_add(&v);
        }
        assert_eq!(p.value(), Some(4));
    }

    #[test]
    fn test_linear_fractional_position() {
        let mut p = LinearPercentile::new(50, |v: &u32| *v);
        for v in [30, 10, 20] {
            p.on_add(&v);
        }
        // position 1.5 -> sorted[1]
        assert_eq!(p.value(), Some(20));
    }

    #[test]
    fn test_linear_empty_is_none() {
        let mut p = LinearPercentile::new(50, |v: &u32| *v);
        p.on_add(&1);
        p.on_remove(&1);
        assert!(p.is_empty());
        assert_eq!(p.value(), None);
    }
}

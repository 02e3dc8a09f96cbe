use std::collections::BTreeMap;

use super::plugin::{Extractor, ItemFilter, Listener, Notifier, WindowPlugin};

/// Smallest and largest tracked value; both `None` while empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MinMaxStats<N> {
    pub min: Option<N>,
    pub max: Option<N>,
}

/// Min/max over an ordered multiset of the extracted keys.
///
/// Removal of a key that was never added is logged and ignored.
pub struct MinMax<V, N> {
    extractor: Extractor<V, N>,
    filter: Option<ItemFilter<V>>,
    values: BTreeMap<N, usize>,
    notifier: Notifier<MinMaxStats<N>>,
}

impl<V, N: Ord + Copy + std::fmt::Debug> MinMax<V, N> {
    pub fn new(extractor: impl Fn(&V) -> N + Send + 'static) -> Self {
        Self {
            extractor: Box::new(extractor),
            filter: None,
            values: BTreeMap::new(),
            notifier: Notifier::default(),
        }
    }

    pub fn with_listener(mut self, listener: Listener<MinMaxStats<N>>) -> Self {
        self.notifier.push(listener);
        self
    }

    pub fn with_filter(mut self, filter: impl Fn(&V) -> bool + Send + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    pub fn stats(&self) -> MinMaxStats<N> {
        MinMaxStats {
            min: self.values.first_key_value().map(|(k, _)| *k),
            max: self.values.last_key_value().map(|(k, _)| *k),
        }
    }

    fn accepts(&self, item: &V) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(item))
    }
}

impl<V, N> WindowPlugin<V> for MinMax<V, N>
where
    N: Ord + Copy + std::fmt::Debug + Send,
{
    fn on_add(&mut self, item: &V) {
        if !self.accepts(item) {
            return;
        }
        let key = (self.extractor)(item);
        *self.values.entry(key).or_insert(0) += 1;
        let stats = self.stats();
        self.notifier.notify(&stats);
    }

    fn on_remove(&mut self, item: &V) {
        if !self.accepts(item) {
            return;
        }
        let key = (self.extractor)(item);
        match self.values.get_mut(&key) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                self.values.remove(&key);
            }
            None => {
                tracing::warn!(?key, "Removing value not tracked by min/max");
                return;
            }
        }
        let stats = self.stats();
        self.notifier.notify(&stats);
    }

    fn reset(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordered_float::OrderedFloat;

    #[test]
    fn test_min_max_with_duplicates() {
        let mut mm = MinMax::new(|v: &i64| *v);
        for v in [5, 1, 9, 1, 9] {
            mm.on_add(&v);
        }
        assert_eq!(mm.stats(), MinMaxStats { min: Some(1), max: Some(9) });

        mm.on_remove(&1);
        assert_eq!(mm.stats().min, Some(1), "one duplicate of 1 remains");
        mm.on_remove(&1);
        assert_eq!(mm.stats().min, Some(5));
    }

    #[test]
    fn test_min_max_float_keys() {
        let mut mm = MinMax::new(|v: &f64| OrderedFloat(*v));
        mm.on_add(&0.25);
        mm.on_add(&-3.5);
        assert_eq!(mm.stats().min, Some(OrderedFloat(-3.5)));
        assert_eq!(mm.stats().max, Some(OrderedFloat(0.25)));
    }

    #[test]
    fn test_unknown_removal_is_ignored() {
        let mut mm = MinMax::new(|v: &i64| *v);
        mm.on_add(&3);
        mm.on_remove(&4);
        assert_eq!(mm.stats(), MinMaxStats { min: Some(3), max: Some(3) });
    }

    #[test]
    fn test_filter_applies_to_both_directions() {
        let mut mm = MinMax::new(|v: &i64| *v).with_filter(|v| *v >= 0);
        mm.on_add(&-10);
        mm.on_add(&2);
        mm.on_remove(&-10);
        assert_eq!(mm.stats(), MinMaxStats { min: Some(2), max: Some(2) });
    }
}

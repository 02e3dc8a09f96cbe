use super::plugin::{Extractor, Listener, Notifier, WindowPlugin};

/// Running sum of the extracted values.
///
/// Non-finite values are skipped in both directions.
pub struct Sum<V> {
    extractor: Extractor<V, f64>,
    sum: f64,
    notifier: Notifier<f64>,
}

impl<V> Sum<V> {
    pub fn new(extractor: impl Fn(&V) -> f64 + Send + 'static) -> Self {
        Self {
            extractor: Box::new(extractor),
            sum: 0.0,
            notifier: Notifier::default(),
        }
    }

    pub fn with_listener(mut self, listener: Listener<f64>) -> Self {
        self.notifier.push(listener);
        self
    }

    pub fn value(&self) -> f64 {
        self.sum
    }

    fn apply(&mut self, item: &V, sign: f64) {
        let value = (self.extractor)(item);
        if !value.is_finite() {
            tracing::trace!(value, "Skipping non-finite value in sum");
            return;
        }
        self.sum += sign * value;
        self.notifier.notify(&self.sum);
    }
}

impl<V> WindowPlugin<V> for Sum<V> {
    fn on_add(&mut self, item: &V) {
        self.apply(item, 1.0);
    }

    fn on_remove(&mut self, item: &V) {
        self.apply(item, -1.0);
    }

    fn reset(&mut self) {
        self.sum = 0.0;
    }
}

/// Running mean of the extracted values; emits 0 while empty.
pub struct Average<V> {
    extractor: Extractor<V, f64>,
    sum: f64,
    counter: i64,
    notifier: Notifier<f64>,
}

impl<V> Average<V> {
    pub fn new(extractor: impl Fn(&V) -> f64 + Send + 'static) -> Self {
        Self {
            extractor: Box::new(extractor),
            sum: 0.0,
            counter: 0,
            notifier: Notifier::default(),
        }
    }

    pub fn with_listener(mut self, listener: Listener<f64>) -> Self {
        self.notifier.push(listener);
        self
    }

    pub fn value(&self) -> f64 {
        if self.counter > 0 {
            self.sum / self.counter as f64
        } else {
            0.0
        }
    }

    pub fn count(&self) -> i64 {
        self.counter
    }

    fn apply(&mut self, item: &V, change: i64) {
        let value = (self.extractor)(item);
        if !value.is_finite() {
            return;
        }
        self.sum += value * change as f64;
        self.counter += change;
        let avg = self.value();
        self.notifier.notify(&avg);
    }
}

impl<V> WindowPlugin<V> for Average<V> {
    fn on_add(&mut self, item: &V) {
        self.apply(item, 1);
    }

    fn on_remove(&mut self, item: &V) {
        self.apply(item, -1);
    }

    fn reset(&mut self) {
        self.sum = 0.0;
        self.counter = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_add_and_remove() {
        let mut sum = Sum::new(|v: &f64| *v);
        sum.on_add(&1.5);
        sum.on_add(&2.5);
        assert_eq!(sum.value(), 4.0);
        sum.on_remove(&1.5);
        assert_eq!(sum.value(), 2.5);
    }

    #[test]
    fn test_sum_skips_nan_and_inf() {
        let mut sum = Sum::new(|v: &f64| *v);
        sum.on_add(&3.0);
        sum.on_add(&f64::NAN);
        sum.on_add(&f64::INFINITY);
        sum.on_remove(&f64::NEG_INFINITY);
        assert_eq!(sum.value(), 3.0);
    }

    #[test]
    fn test_average_empty_is_zero() {
        let mut avg = Average::new(|v: &i32| *v as f64);
        assert_eq!(avg.value(), 0.0);
        avg.on_add(&4);
        avg.on_remove(&4);
        assert_eq!(avg.value(), 0.0, "no division by zero after draining");
    }

    #[test]
    fn test_average_tracks_mean() {
        let mut avg = Average::new(|v: &i32| *v as f64);
        for v in [2, 4, 6, 8] {
            avg.on_add(&v);
        }
        assert_eq!(avg.value(), 5.0);
        avg.on_remove(&2);
        assert_eq!(avg.value(), 6.0);
        assert_eq!(avg.count(), 3);
    }
}

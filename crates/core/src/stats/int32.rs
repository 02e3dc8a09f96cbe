use super::plugin::{Extractor, Listener, Notifier, WindowPlugin};

/// Moments of an integer stream.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Int32Summary {
    pub counter: i64,
    pub sum: i64,
    pub avg: f64,
    /// Sample variance; 0 with fewer than two values.
    pub var: f64,
    pub dev: f64,
}

/// Exact integer sum and sum of squares with derived mean and variance.
pub struct Int32Stats<V> {
    extractor: Extractor<V, i32>,
    sum_sq: i128,
    summary: Int32Summary,
    notifier: Notifier<Int32Summary>,
}

impl<V> Int32Stats<V> {
    pub fn new(extractor: impl Fn(&V) -> i32 + Send + 'static) -> Self {
        Self {
            extractor: Box::new(extractor),
            sum_sq: 0,
            summary: Int32Summary::default(),
            notifier: Notifier::default(),
        }
    }

    pub fn with_listener(mut self, listener: Listener<Int32Summary>) -> Self {
        self.notifier.push(listener);
        self
    }

    pub fn summary(&self) -> Int32Summary {
        self.summary
    }

    fn apply(&mut self, value: i32, sign: i64) {
        let s = &mut self.summary;
        s.counter += sign;
        s.sum += sign * value as i64;
        self.sum_sq += sign as i128 * (value as i128 * value as i128);

        let n = s.counter;
        s.avg = if n > 0 { s.sum as f64 / n as f64 } else { 0.0 };
        if n > 1 {
            let sum = s.sum as f64;
            s.var = ((self.sum_sq as f64 - sum * sum / n as f64) / (n - 1) as f64).max(0.0);
            s.dev = s.var.sqrt();
        } else {
            s.var = 0.0;
            s.dev = 0.0;
        }
        let summary = self.summary;
        self.notifier.notify(&summary);
    }
}

impl<V> WindowPlugin<V> for Int32Stats<V> {
    fn on_add(&mut self, item: &V) {
        let value = (self.extractor)(item);
        self.apply(value, 1);
    }

    fn on_remove(&mut self, item: &V) {
        let value = (self.extractor)(item);
        self.apply(value, -1);
    }

    fn reset(&mut self) {
        self.sum_sq = 0;
        self.summary = Int32Summary::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_variance() {
        let mut stats = Int32Stats::new(|v: &i32| *v);
        for v in [2, 4, 4, 4, 5, 5, 7, 9] {
            stats.on_add(&v);
        }
        let s = stats.summary();
        assert_eq!(s.counter, 8);
        assert_eq!(s.avg, 5.0);
        // sum of squared deviations is 32, sample variance 32 / 7
        assert!((s.var - 32.0 / 7.0).abs() < 1e-12);
        assert!((s.dev - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_removal_restores_zero() {
        let mut stats = Int32Stats::new(|v: &i32| *v);
        for v in [-3, 8, 1] {
            stats.on_add(&v);
        }
        for v in [-3, 8, 1] {
            stats.on_remove(&v);
        }
        assert_eq!(stats.summary(), Int32Summary::default());
    }
}

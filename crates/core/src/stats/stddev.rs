use std::collections::VecDeque;

use super::plugin::{Extractor, Listener, Notifier, WindowPlugin};

/// Lower bound of the damping factor applied by the unbounded estimator.
pub(crate) const MIN_DAMPING: f64 = 0.1;

enum Mode {
    /// Welford-style running estimate with damping; never forgets values
    /// on its own, removal only rewinds the sample counter.
    Unbounded { mean: f64, var: f64, counter: u64 },
    /// Exact accumulators over the most recent `capacity` values.
    Windowed {
        capacity: usize,
        items: VecDeque<f64>,
        deviations: VecDeque<f64>,
        sum: f64,
        var: f64,
        /// Items added and not yet removed by the owning window.
        outstanding: u64,
    },
}

/// Standard deviation of the extracted values.
///
/// Non-finite inputs leave the state untouched and re-emit the previous result.
pub struct StdDev<V> {
    extractor: Extractor<V, f64>,
    mode: Mode,
    result: f64,
    notifier: Notifier<f64>,
}

impl<V> StdDev<V> {
    /// Damped online estimator with no memory bound.
    pub fn unbounded(extractor: impl Fn(&V) -> f64 + Send + 'static) -> Self {
        Self::with_mode(
            extractor,
            Mode::Unbounded {
                mean: 0.0,
                var: 0.0,
                counter: 0,
            },
        )
    }

    /// Estimator over the last `capacity` values. Both buffers are allocated
    /// once and reused for the life of the plugin.
    pub fn windowed(extractor: impl Fn(&V) -> f64 + Send + 'static, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self::with_mode(
            extractor,
            Mode::Windowed {
                capacity,
                items: VecDeque::with_capacity(capacity),
                deviations: VecDeque::with_capacity(capacity),
                sum: 0.0,
                var: 0.0,
                outstanding: 0,
            },
        )
    }

    fn with_mode(extractor: impl Fn(&V) -> f64 + Send + 'static, mode: Mode) -> Self {
        Self {
            extractor: Box::new(extractor),
            mode,
            result: 0.0,
            notifier: Notifier::default(),
        }
    }

    pub fn with_listener(mut self, listener: Listener<f64>) -> Self {
        self.notifier.push(listener);
        self
    }

    pub fn value(&self) -> f64 {
        self.result
    }

    /// Mean as seen by the estimator (running mean or window average).
    pub fn mean(&self) -> f64 {
        match &self.mode {
            Mode::Unbounded { mean, .. } => *mean,
            Mode::Windowed { items, sum, .. } if !items.is_empty() => sum / items.len() as f64,
            Mode::Windowed { .. } => 0.0,
        }
    }

    fn push(&mut self, x: f64) {
        match &mut self.mode {
            Mode::Unbounded { mean, var, counter } => {
                *counter += 1;
                let n = *counter as f64;
                let before = x - *mean;
                *mean += before / n;
                if *counter >= 2 {
                    let after = x - *mean;
                    let alpha = (1.0 / n).max(MIN_DAMPING);
                    *var = alpha * before * after + (1.0 - alpha) * *var;
                    self.result = var.max(0.0).sqrt();
                }
            }
            Mode::Windowed {
                capacity,
                items,
                deviations,
                sum,
                var,
                outstanding,
            } => {
                *outstanding += 1;
                if items.len() == *capacity {
                    if let Some(oldest) = items.pop_front() {
                        *sum -= oldest;
                    }
                }
                items.push_back(x);
                *sum += x;

                let n = items.len() as f64;
                let avg = *sum / n;
                let deviation = (x - avg) * (x - avg);
                let evicted = if deviations.len() == *capacity {
                    deviations.pop_front().unwrap_or(0.0)
                } else {
                    0.0
                };
                deviations.push_back(deviation);
                *var += deviation - evicted;

                if items.len() >= 2 {
                    self.result = (var.max(0.0) / n).sqrt();
                }
            }
        }
    }

    fn pop(&mut self) {
        match &mut self.mode {
            Mode::Unbounded { mean, var, counter } => {
                *counter = counter.saturating_sub(1);
                if *counter == 0 {
                    *mean = 0.0;
                    *var = 0.0;
                    self.result = 0.0;
                }
            }
            Mode::Windowed {
                items,
                deviations,
                sum,
                var,
                outstanding,
                ..
            } => {
                *outstanding = outstanding.saturating_sub(1);
                // Only the oldest values can leave, so the removed item is ours
                // exactly when we hold more values than remain outstanding.
                if items.len() as u64 > *outstanding {
                    if let Some(oldest) = items.pop_front() {
                        *sum -= oldest;
                    }
                    if let Some(deviation) = deviations.pop_front() {
                        *var -= deviation;
                    }
                }
                match items.len() {
                    0 => {
                        *sum = 0.0;
                        *var = 0.0;
                        self.result = 0.0;
                    }
                    1 => self.result = 0.0,
                    n => self.result = (var.max(0.0) / n as f64).sqrt(),
                }
            }
        }
    }
}

impl<V> WindowPlugin<V> for StdDev<V> {
    fn on_add(&mut self, item: &V) {
        let x = (self.extractor)(item);
        if x.is_finite() {
            self.push(x);
        }
        self.notifier.notify(&self.result);
    }

    fn on_remove(&mut self, item: &V) {
        let x = (self.extractor)(item);
        if !x.is_finite() {
            return;
        }
        self.pop();
        self.notifier.notify(&self.result);
    }

    fn reset(&mut self) {
        self.result = 0.0;
        match &mut self.mode {
            Mode::Unbounded { mean, var, counter } => {
                *mean = 0.0;
                *var = 0.0;
                *counter = 0;
            }
            Mode::Windowed {
                items,
                deviations,
                sum,
                var,
                outstanding,
                ..
            } => {
                items.clear();
                deviations.clear();
                *sum = 0.0;
                *var = 0.0;
                *outstanding = 0;
            }
        }
    }
}

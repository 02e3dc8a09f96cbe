use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::plugin::{Extractor, Listener, Notifier, WindowPlugin};
use super::window::SlidingWindow;
use crate::time::{RealTime, TimeSource};

#[derive(Debug, Default)]
struct Accumulators {
    /// Latest first signal seen on insertion, paired with delayed second signals.
    i1_add: f64,
    /// Latest first signal seen on removal.
    i1_rem: f64,
    counter_1: i64,
    counter_2: i64,
    sum_1: f64,
    sum_2: f64,
    sum_12: f64,
}

impl Accumulators {
    fn g(&self) -> f64 {
        if self.counter_1 == 0 || self.counter_2 == 0 || self.sum_1 == 0.0 || self.sum_2 == 0.0 {
            return 0.0;
        }
        let c1 = 1.0 / self.counter_1 as f64;
        let c2 = 1.0 / self.counter_2 as f64;
        (c2 * self.sum_12) / ((c1 * self.sum_1) * (c2 * self.sum_2)) - 1.0
    }
}

/// Lagged cross-correlation between two signals of the same item.
///
/// The first signal is paired immediately; the second passes through a delay
/// window and contributes only once it leaves that window `tau` later. Both
/// insertions and removals are delayed symmetrically, each through its own
/// window, so the accumulators describe the same time-aligned pairs.
///
/// Emits `g = (Σ I1·I2 / n) / ((Σ I1 / n) · (Σ I2 / n)) - 1`, or 0 while any
/// counter or sum is zero.
pub struct Correlation<V, T: TimeSource = RealTime> {
    first: Extractor<V, f64>,
    second: Extractor<V, f64>,
    acc: Arc<Mutex<Accumulators>>,
    delay_in: SlidingWindow<f64, T>,
    delay_out: SlidingWindow<f64, T>,
    notifier: Notifier<f64>,
}

impl<V> Correlation<V, RealTime> {
    pub fn new(
        first: impl Fn(&V) -> f64 + Send + 'static,
        second: impl Fn(&V) -> f64 + Send + 'static,
        tau: Duration,
        max_length: usize,
    ) -> Self {
        Self::new_with_time_source(first, second, tau, max_length, RealTime::new())
    }
}

impl<V, T: TimeSource> Correlation<V, T> {
    pub fn new_with_time_source(
        first: impl Fn(&V) -> f64 + Send + 'static,
        second: impl Fn(&V) -> f64 + Send + 'static,
        tau: Duration,
        max_length: usize,
        time_source: T,
    ) -> Self {
        let acc = Arc::new(Mutex::new(Accumulators::default()));

        let mut delay_in =
            SlidingWindow::new_with_time_source(max_length, Some(tau), time_source.clone());
        let sink = Arc::clone(&acc);
        delay_in.on_remove(move |i2: &f64| {
            let mut acc = sink.lock();
            acc.counter_2 += 1;
            acc.sum_1 += acc.i1_add;
            acc.sum_2 += *i2;
            acc.sum_12 += acc.i1_add * *i2;
        });

        let mut delay_out = SlidingWindow::new_with_time_source(max_length, Some(tau), time_source);
        let sink = Arc::clone(&acc);
        delay_out.on_remove(move |i2: &f64| {
            let mut acc = sink.lock();
            acc.counter_2 -= 1;
            acc.sum_1 -= acc.i1_rem;
            acc.sum_2 -= *i2;
            acc.sum_12 -= acc.i1_rem * *i2;
        });

        Self {
            first: Box::new(first),
            second: Box::new(second),
            acc,
            delay_in,
            delay_out,
            notifier: Notifier::default(),
        }
    }

    pub fn with_listener(mut self, listener: Listener<f64>) -> Self {
        self.notifier.push(listener);
        self
    }

    /// Changes the lag applied to the second signal.
    pub fn set_tau(&mut self, tau: Duration) {
        self.delay_in.set_threshold(Some(tau));
        self.delay_out.set_threshold(Some(tau));
    }

    pub fn value(&self) -> f64 {
        self.acc.lock().g()
    }

    /// `(counter_1, counter_2)`: items seen directly and items that left the delay.
    pub fn counters(&self) -> (i64, i64) {
        let acc = self.acc.lock();
        (acc.counter_1, acc.counter_2)
    }

    fn emit(&mut self) {
        let g = self.acc.lock().g();
        self.notifier.notify(&g);
    }
}

impl<V, T: TimeSource> WindowPlugin<V> for Correlation<V, T> {
    fn on_add(&mut self, item: &V) {
        let i2 = (self.second)(item);
        {
            let mut acc = self.acc.lock();
            acc.i1_add = (self.first)(item);
            acc.counter_1 += 1;
        }
        self.delay_in.add(i2);
        self.emit();
    }

    fn on_remove(&mut self, item: &V) {
        let i2 = (self.second)(item);
        {
            let mut acc = self.acc.lock();
            acc.i1_rem = (self.first)(item);
            acc.counter_1 -= 1;
        }
        self.delay_out.add(i2);
        self.emit();
    }

    fn reset(&mut self) {
        self.delay_in.reset();
        self.delay_out.reset();
        *self.acc.lock() = Accumulators::default();
    }

    fn on_refresh(&mut self) {
        self.delay_in.refresh();
        self.delay_out.refresh();
    }
}

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Samples kept in the one-way-delay window.
pub(crate) const OWD_WINDOW_CAPACITY: usize = 1000;

/// Horizon of the one-way-delay window.
pub(crate) const OWD_WINDOW: Duration = Duration::from_secs(2);

/// Period between receiver reports produced by the core's tick.
pub(crate) const REPORT_INTERVAL: Duration = Duration::from_millis(100);

/// Loss rate above which a report marks its path lossy.
pub(crate) const DEFAULT_LOSSY_THRESHOLD: f64 = 0.05;

/// Report producer and processor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ReceiverConfig {
    pub owd_window_capacity: usize,
    pub owd_window_ms: u64,
    /// Percentile of one-way delay reported as the "median".
    pub owd_percentile: u32,
    pub lossy_threshold: f64,
    pub report_interval_ms: u64,
}

impl ReceiverConfig {
    pub fn owd_window(&self) -> Duration {
        Duration::from_millis(self.owd_window_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            owd_window_capacity: OWD_WINDOW_CAPACITY,
            owd_window_ms: OWD_WINDOW.as_millis() as u64,
            owd_percentile: 50,
            lossy_threshold: DEFAULT_LOSSY_THRESHOLD,
            report_interval_ms: REPORT_INTERVAL.as_millis() as u64,
        }
    }
}

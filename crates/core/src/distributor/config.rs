//! Distributor configuration and constants.

use serde::{Deserialize, Serialize};

/// Extra bitrate a monitored subflow may receive per round, as a fraction of
/// its own target.
pub(crate) const MONITORED_CAP: f64 = 0.10;

/// Extra bitrate a stable subflow without supply may receive per round.
pub(crate) const STABLE_CAP: f64 = 0.05;

/// Leftover surplus above this fraction of the total target raises the
/// pacing hint.
pub(crate) const PACING_HINT_THRESHOLD: f64 = 0.10;

/// Headroom applied when pacing a path to its committed target.
pub(crate) const DEFAULT_PACING_HEADROOM: f64 = 1.25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DistributorConfig {
    pub monitored_cap: f64,
    pub stable_cap: f64,
    pub pacing_hint_threshold: f64,
    /// After each round, pace every path to `target * pacing_headroom`.
    pub pace_to_target: bool,
    pub pacing_headroom: f64,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            monitored_cap: MONITORED_CAP,
            stable_cap: STABLE_CAP,
            pacing_hint_threshold: PACING_HINT_THRESHOLD,
            pace_to_target: false,
            pacing_headroom: DEFAULT_PACING_HEADROOM,
        }
    }
}

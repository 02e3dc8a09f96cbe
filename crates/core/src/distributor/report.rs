use serde::{Deserialize, Serialize};

/// Probing state of a subflow as seen by the path-quality estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportState {
    /// Steady allocation.
    #[default]
    Stable,
    /// Under active bandwidth probing.
    Monitored,
}

/// Periodic summary of a subflow's usable versus current bitrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UtilizationReport {
    /// Bitrate the estimator considers sustainable.
    pub target_rate: i64,
    /// Bitrate actually sent over the last interval.
    pub sending_rate: i64,
    pub state: ReportState,
}

/// Outcome of one distributor round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistributionRound {
    /// Sum of the targets before the round.
    pub previous_total_target: i64,
    /// Sum of the committed targets.
    pub total_target: i64,
    /// Committed target per subflow, ascending by id.
    pub targets: Vec<(u8, i64)>,
    /// Surplus left after both extra-bitrate passes.
    pub remaining: i64,
    /// The leftover surplus exceeds the pacing-hint threshold.
    pub pacing_hint: bool,
}

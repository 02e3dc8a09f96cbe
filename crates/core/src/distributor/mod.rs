//! Sending-rate distribution across paths.
//!
//! The [`RateDistributor`] is ticked periodically. Every round it collects
//! one [`UtilizationReport`] per controlled subflow, moves each subflow's
//! target toward its reported sustainable rate, and hands the net surplus out
//! under per-subflow caps:
//!
//! | Pass | Eligible | Cap per subflow |
//! |------|----------|-----------------|
//! | 1 | monitored | 10% of its target |
//! | 2 | stable, no supply of its own | 5% of its target |
//!
//! Within a pass, a subflow's share is proportional to its target over the
//! class's total sending rate. Surplus still left afterwards only raises a
//! pacing hint in the returned [`DistributionRound`].

mod config;
mod controller;
mod report;

pub use config::DistributorConfig;
pub use controller::{PathSelector, RateDistributor};
pub use report::{DistributionRound, ReportState, UtilizationReport};

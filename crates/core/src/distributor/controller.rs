use std::collections::BTreeMap;

use super::config::DistributorConfig;
use super::report::{DistributionRound, ReportState, UtilizationReport};

/// Downstream component that routes traffic according to per-path targets.
pub trait PathSelector {
    fn set_sending_target(&mut self, id: u8, target: i64);

    /// Called once after every target of a round has been set.
    fn commit_changes(&mut self);
}

#[derive(Debug, Clone, Default)]
struct Subflow {
    controlled: bool,
    ready: bool,
    sending_target: i64,
    supplied_bitrate: i64,
    requested_bitrate: i64,
    delta_rate: i64,
    report: UtilizationReport,
}

/// Periodic reallocation of the aggregate bitrate across controlled subflows.
///
/// Each subflow reports how far its sustainable rate is from its current
/// target. A round applies every subflow's own delta, then hands the net
/// surplus (what some subflows gave up beyond what others asked for) to
/// monitored subflows first and to stable subflows without supply second,
/// each capped at a small fraction of the receiver's target.
///
/// Rounds are all-or-nothing: unless every controlled subflow has a fresh
/// report, nothing changes.
#[derive(Debug, Default)]
pub struct RateDistributor {
    config: DistributorConfig,
    subflows: BTreeMap<u8, Subflow>,
    rounds: u64,
}

impl RateDistributor {
    pub fn new(config: DistributorConfig) -> Self {
        Self {
            config,
            subflows: BTreeMap::new(),
            rounds: 0,
        }
    }

    pub fn config(&self) -> &DistributorConfig {
        &self.config
    }

    pub fn add_controlled(&mut self, id: u8) {
        self.subflows.entry(id).or_default().controlled = true;
        tracing::debug!(subflow_id = id, "Subflow joined rate control");
    }

    pub fn remove_controlled(&mut self, id: u8) {
        if let Some(subflow) = self.subflows.get_mut(&id) {
            subflow.controlled = false;
            subflow.ready = false;
            tracing::debug!(subflow_id = id, "Subflow left rate control");
        }
    }

    pub fn is_controlled(&self, id: u8) -> bool {
        self.subflows.get(&id).is_some_and(|s| s.controlled)
    }

    pub fn controlled_ids(&self) -> Vec<u8> {
        self.subflows
            .iter()
            .filter(|(_, s)| s.controlled)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn set_initial_target(&mut self, id: u8, rate: i64) {
        self.subflows.entry(id).or_default().sending_target = rate;
    }

    /// Records a utilization report and marks the subflow ready for the
    /// next round. Reports for subflows never added are ignored.
    pub fn setup_report(&mut self, id: u8, report: UtilizationReport) {
        let Some(subflow) = self.subflows.get_mut(&id) else {
            tracing::debug!(subflow_id = id, "Utilization report for unknown subflow");
            return;
        };
        subflow.ready = true;
        subflow.report = report;
        if report.target_rate < subflow.sending_target {
            subflow.supplied_bitrate = subflow.sending_target - report.target_rate;
            subflow.requested_bitrate = 0;
        } else {
            subflow.requested_bitrate = report.target_rate - subflow.sending_target;
            subflow.supplied_bitrate = 0;
        }
        tracing::trace!(
            subflow_id = id,
            target_rate = report.target_rate,
            sending_rate = report.sending_rate,
            supplied = subflow.supplied_bitrate,
            requested = subflow.requested_bitrate,
            "Utilization report"
        );
    }

    pub fn sending_rate(&self, id: u8) -> Option<i64> {
        self.subflows.get(&id).map(|s| s.sending_target)
    }

    /// Rounds completed so far.
    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// Runs one distribution round and commits the new targets to `selector`.
    ///
    /// Returns `None` without touching any state when there is no controlled
    /// subflow or when one of them has not reported since the last round.
    pub fn tick(&mut self, selector: &mut dyn PathSelector) -> Option<DistributionRound> {
        let mut any = false;
        let mut ready = true;
        let mut supplied = 0i64;
        let mut requested = 0i64;
        let mut previous_total_target = 0i64;
        let mut monitored_rate = 0i64;
        let mut stable_rate = 0i64;

        for subflow in self.subflows.values().filter(|s| s.controlled) {
            any = true;
            ready &= subflow.ready;
            supplied += subflow.supplied_bitrate;
            requested += subflow.requested_bitrate;
            previous_total_target += subflow.sending_target;
            match subflow.report.state {
                ReportState::Stable => stable_rate += subflow.report.sending_rate,
                ReportState::Monitored => monitored_rate += subflow.report.sending_rate,
            }
        }
        if !any {
            return None;
        }
        if !ready {
            tracing::debug!("Distributor round skipped, waiting for reports");
            return None;
        }

        for subflow in self.controlled_mut() {
            subflow.delta_rate = subflow.requested_bitrate - subflow.supplied_bitrate;
            subflow.sending_target += subflow.delta_rate;
        }

        let mut remaining = supplied - requested;
        if remaining > 0 && monitored_rate > 0 {
            let cap = self.config.monitored_cap;
            for subflow in self
                .controlled_mut()
                .filter(|s| s.report.state == ReportState::Monitored)
            {
                let extra = extra_bitrate(subflow.sending_target, remaining, monitored_rate, cap);
                subflow.delta_rate += extra;
                subflow.sending_target += extra;
                remaining -= extra;
            }
        }
        if remaining > 0 && stable_rate > 0 {
            let cap = self.config.stable_cap;
            for subflow in self
                .controlled_mut()
                .filter(|s| s.report.state == ReportState::Stable && s.supplied_bitrate == 0)
            {
                let extra = extra_bitrate(subflow.sending_target, remaining, stable_rate, cap);
                subflow.delta_rate += extra;
                subflow.sending_target += extra;
                remaining -= extra;
            }
        }
        let pacing_hint =
            remaining > 0 && remaining as f64 > previous_total_target as f64 * self.config.pacing_hint_threshold;

        let mut targets = Vec::new();
        for (id, subflow) in self.subflows.iter_mut().filter(|(_, s)| s.controlled) {
            selector.set_sending_target(*id, subflow.sending_target);
            targets.push((*id, subflow.sending_target));
            subflow.ready = false;
            subflow.supplied_bitrate = 0;
            subflow.requested_bitrate = 0;
        }
        selector.commit_changes();
        self.rounds += 1;

        let total_target: i64 = targets.iter().map(|(_, t)| t).sum();
        tracing::debug!(
            round = self.rounds,
            previous_total_target,
            total_target,
            supplied,
            requested,
            remaining,
            pacing_hint,
            "Distributor round committed"
        );
        Some(DistributionRound {
            previous_total_target,
            total_target,
            targets,
            remaining: remaining.max(0),
            pacing_hint,
        })
    }

    fn controlled_mut(&mut self) -> impl Iterator<Item = &mut Subflow> {
        self.subflows.values_mut().filter(|s| s.controlled)
    }
}

/// `min(cap * target, remaining * target / class_rate)`, never more than
/// what is left and never negative.
fn extra_bitrate(target: i64, remaining: i64, class_rate: i64, cap: f64) -> i64 {
    if target <= 0 || class_rate <= 0 || remaining <= 0 {
        return 0;
    }
    let capped = target as f64 * cap;
    let share = remaining as f64 * (target as f64 / class_rate as f64);
    (capped.min(share) as i64).clamp(0, remaining)
}

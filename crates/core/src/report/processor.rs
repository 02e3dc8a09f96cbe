//! Sender-side processing of feedback reports.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use super::config::ReceiverConfig;
use super::summary::{ntp_short, ntp_short_to_duration, DiscardedBlock, OwdBlock, ReceiverReportBlock, ReportSummary};
use crate::time::{RealTime, TimeSource};

/// Latest feedback known for one path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PathFeedback {
    pub rtt: Option<Duration>,
    pub lost_rate: f64,
    pub cumulative_lost: u32,
    pub highest_seq: u32,
    pub jitter: Duration,
    pub owd: Option<OwdBlock>,
    pub discarded: DiscardedBlock,
    pub reports: u64,
    pub last_report_at: Option<u64>,
}

/// Loss classification a report implies for its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateHint {
    Lossy,
    NonLossy,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProcessedReport {
    pub path_id: u8,
    pub feedback: PathFeedback,
    pub hint: Option<StateHint>,
}

pub struct ReportProcessor<T: TimeSource = RealTime> {
    time_source: T,
    lossy_threshold: f64,
    paths: BTreeMap<u8, PathFeedback>,
}

impl ReportProcessor<RealTime> {
    pub fn new(config: &ReceiverConfig) -> Self {
        Self::new_with_time_source(config, RealTime::new())
    }
}

impl<T: TimeSource> ReportProcessor<T> {
    pub fn new_with_time_source(config: &ReceiverConfig, time_source: T) -> Self {
        Self {
            time_source,
            lossy_threshold: config.lossy_threshold,
            paths: BTreeMap::new(),
        }
    }

    pub fn register_path(&mut self, path_id: u8) {
        self.paths.entry(path_id).or_default();
    }

    pub fn remove_path(&mut self, path_id: u8) {
        self.paths.remove(&path_id);
    }

    pub fn feedback(&self, path_id: u8) -> Option<&PathFeedback> {
        self.paths.get(&path_id)
    }

    /// Folds a report into its path's feedback. Reports for unregistered
    /// paths are dropped.
    pub fn process(&mut self, summary: &ReportSummary) -> Option<ProcessedReport> {
        let now = self.time_source.now();
        let Some(feedback) = self.paths.get_mut(&summary.path_id) else {
            tracing::warn!(path_id = summary.path_id, "Report for unknown path, discarding");
            return None;
        };
        feedback.reports += 1;
        feedback.last_report_at = Some(now.as_nanos() as u64);

        let mut hint = None;
        if let Some(block) = summary.receiver_report {
            if let Some(rtt) = round_trip_time(summary.path_id, &block, now) {
                feedback.rtt = Some(rtt);
            }
            feedback.lost_rate = block.lost_rate();
            feedback.cumulative_lost = block.cumulative_lost;
            feedback.highest_seq = block.highest_seq;
            feedback.jitter = block.jitter;
            hint = if feedback.lost_rate > self.lossy_threshold {
                Some(StateHint::Lossy)
            } else if block.fraction_lost == 0 {
                Some(StateHint::NonLossy)
            } else {
                None
            };
        }
        if let Some(owd) = summary.owd {
            feedback.owd = Some(owd);
        }
        if let Some(discarded) = summary.discarded {
            feedback.discarded = discarded;
        }

        tracing::debug!(
            path_id = summary.path_id,
            rtt_us = feedback.rtt.map(|rtt| rtt.as_micros() as u64),
            lost_rate = feedback.lost_rate,
            ?hint,
            "Processed report"
        );
        Some(ProcessedReport {
            path_id: summary.path_id,
            feedback: *feedback,
            hint,
        })
    }
}

/// `now - LSR - DLSR` in 1/65536 s.
fn round_trip_time(path_id: u8, block: &ReceiverReportBlock, now: Duration) -> Option<Duration> {
    if block.lsr == 0 || block.dlsr == 0 {
        tracing::warn!(path_id, lsr = block.lsr, dlsr = block.dlsr, "Report without sender-report echo, RTT skipped");
        return None;
    }
    let units = ntp_short(now).wrapping_sub(block.lsr).wrapping_sub(block.dlsr);
    if units > i32::MAX as u32 {
        tracing::warn!(path_id, lsr = block.lsr, dlsr = block.dlsr, "Report echoes a future time, RTT skipped");
        return None;
    }
    Some(ntp_short_to_duration(units))
}

impl<T: TimeSource> std::fmt::Debug for ReportProcessor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportProcessor")
            .field("lossy_threshold", &self.lossy_threshold)
            .field("paths", &self.paths)
            .finish()
    }
}

use std::time::Duration;

use super::*;
use crate::time::VirtualTime;

const MS: u64 = 1_000_000;

// ============================================================================
// Harness
// ============================================================================

fn receiver() -> (ReceiverStats<VirtualTime>, VirtualTime) {
    let time = VirtualTime::new();
    let stats = ReceiverStats::new_with_time_source(1, &ReceiverConfig::default(), time.clone());
    (stats, time)
}

fn processor() -> (ReportProcessor<VirtualTime>, VirtualTime) {
    let time = VirtualTime::with_initial_time(10_000 * MS);
    let processor = ReportProcessor::new_with_time_source(&ReceiverConfig::default(), time.clone());
    (processor, time)
}

/// Delivers `seq` with a constant 10 ms transit time.
fn deliver(stats: &mut ReceiverStats<VirtualTime>, seq: u16) {
    let sent_at = seq as u64 * MS;
    stats.on_packet_received(seq, 1000, sent_at, sent_at + 10 * MS);
}

fn rr(fraction_lost: u8) -> ReportSummary {
    ReportSummary {
        path_id: 1,
        receiver_report: Some(ReceiverReportBlock {
            fraction_lost,
            ..Default::default()
        }),
        ..Default::default()
    }
}

// ============================================================================
// ReceiverStats
// ============================================================================

#[test]
fn test_no_report_before_first_packet() {
    let (mut stats, _time) = receiver();
    assert!(stats.produce_report().is_none());
}

#[test]
fn test_fraction_lost_is_per_interval() {
    let (mut stats, _time) = receiver();
    for seq in (1..=10).filter(|seq| *seq != 3 && *seq != 4) {
        deliver(&mut stats, seq);
    }
    let report = stats.produce_report().unwrap();
    assert_eq!(report.fraction_lost, 51); // (2 << 8) / 10
    assert_eq!(report.cumulative_lost, 2);
    assert_eq!(report.ext_highest_seq, 10);
    assert_eq!(report.received_packets, 8);
    assert_eq!(report.received_bytes, 8000);

    for seq in 11..=20 {
        deliver(&mut stats, seq);
    }
    let report = stats.produce_report().unwrap();
    assert_eq!(report.fraction_lost, 0);
    assert_eq!(report.cumulative_lost, 2);
    assert_eq!(report.ext_highest_seq, 20);
}

#[test]
fn test_duplicates_never_report_negative_loss() {
    let (mut stats, _time) = receiver();
    for seq in [1, 2, 2, 3, 3, 3] {
        deliver(&mut stats, seq);
    }
    let report = stats.produce_report().unwrap();
    assert_eq!(report.fraction_lost, 0);
    assert_eq!(report.cumulative_lost, 0);
}

#[test]
fn test_reordered_packet_does_not_move_highest() {
    let (mut stats, _time) = receiver();
    for seq in [1, 2, 4, 3] {
        deliver(&mut stats, seq);
    }
    let report = stats.produce_report().unwrap();
    assert_eq!(report.ext_highest_seq, 4);
    assert_eq!(report.fraction_lost, 0);
}

#[test]
fn test_sequence_wrap_extends_highest() {
    let (mut stats, _time) = receiver();
    for seq in [65534, 65535, 0, 1] {
        stats.on_packet_received(seq, 100, 0, 0);
    }
    let report = stats.produce_report().unwrap();
    assert_eq!(report.ext_highest_seq, (1 << 16) | 1);
    assert_eq!(report.cumulative_lost, 0);
}

#[test]
fn test_jitter_smoothing() {
    let (mut stats, _time) = receiver();
    stats.on_packet_received(1, 100, 0, 10 * MS);
    stats.on_packet_received(2, 100, 20 * MS, 32 * MS);
    stats.on_packet_received(3, 100, 40 * MS, 50 * MS);
    // |D| = 2 ms twice: 2e6 / 16 = 125_000, then + (2e6 - 125_000) / 16.
    let report = stats.produce_report().unwrap();
    assert_eq!(report.jitter, Duration::from_nanos(242_188));
}

#[test]
fn test_owd_block_and_expiry() {
    let (mut stats, time) = receiver();
    stats.on_packet_received(1, 100, 0, 10 * MS);
    stats.on_packet_received(2, 100, 0, 30 * MS);
    stats.on_packet_received(3, 100, 0, 20 * MS);

    let owd = stats.produce_report().unwrap().owd.unwrap();
    assert_eq!(owd.median, Duration::from_millis(20));
    assert_eq!(owd.min, Duration::from_millis(10));
    assert_eq!(owd.max, Duration::from_millis(30));

    time.advance(Duration::from_secs(3));
    assert!(stats.produce_report().unwrap().owd.is_none());
}

#[test]
fn test_discarded_only_reported_on_change() {
    let (mut stats, _time) = receiver();
    deliver(&mut stats, 1);
    assert!(stats.produce_report().unwrap().discarded.is_none());

    stats.on_packet_discarded(500);
    stats.on_packet_discarded(700);
    let discarded = stats.produce_report().unwrap().discarded.unwrap();
    assert_eq!(discarded, DiscardedBlock { bytes: 1200, packets: 2 });

    assert!(stats.produce_report().unwrap().discarded.is_none());
}

// ============================================================================
// ReportProcessor
// ============================================================================

#[test_log::test]
fn test_report_for_unknown_path_is_discarded() {
    let (mut processor, _time) = processor();
    assert!(processor.process(&rr(0)).is_none());
    assert!(processor.feedback(1).is_none());
}

#[test]
fn test_rtt_from_echoed_sender_report() {
    let (mut processor, _time) = processor();
    processor.register_path(1);
    let mut summary = rr(0);
    if let Some(block) = summary.receiver_report.as_mut() {
        block.lsr = ntp_short(Duration::from_secs(9));
        block.dlsr = ntp_short(Duration::from_millis(800));
    }

    let processed = processor.process(&summary).unwrap();
    let rtt = processed.feedback.rtt.unwrap();
    assert!(
        rtt > Duration::from_millis(199) && rtt < Duration::from_millis(201),
        "rtt {rtt:?}"
    );
    assert_eq!(processed.feedback.reports, 1);
    assert_eq!(processed.feedback.last_report_at, Some(10_000 * MS));
}

#[test_log::test]
fn test_rtt_skipped_without_echo() {
    let (mut processor, _time) = processor();
    processor.register_path(1);
    let processed = processor.process(&rr(128)).unwrap();
    assert!(processed.feedback.rtt.is_none());
    assert_eq!(processed.feedback.lost_rate, 0.5);
}

#[test]
fn test_state_hints_follow_loss() {
    let (mut processor, _time) = processor();
    processor.register_path(1);
    assert_eq!(processor.process(&rr(64)).unwrap().hint, Some(StateHint::Lossy));
    // 5 / 256 is under the threshold but not loss-free.
    assert_eq!(processor.process(&rr(5)).unwrap().hint, None);
    assert_eq!(processor.process(&rr(0)).unwrap().hint, Some(StateHint::NonLossy));

    let summary = ReportSummary {
        path_id: 1,
        ..Default::default()
    };
    assert_eq!(processor.process(&summary).unwrap().hint, None);
}

#[test]
fn test_receiver_report_feeds_processor() {
    let (mut stats, _rx_time) = receiver();
    for seq in (1..=10).filter(|seq| *seq != 5) {
        deliver(&mut stats, seq);
    }
    stats.on_packet_discarded(1000);
    let report = stats.produce_report().unwrap();

    let (mut processor, _time) = processor();
    processor.register_path(1);
    let processed = processor.process(&report.to_summary(0, 0)).unwrap();
    assert_eq!(processed.feedback.lost_rate, 25.0 / 256.0);
    assert_eq!(processed.feedback.cumulative_lost, 1);
    assert_eq!(processed.feedback.highest_seq, 10);
    assert_eq!(processed.feedback.discarded.packets, 1);
    assert_eq!(processed.feedback.owd.map(|owd| owd.median), Some(Duration::from_millis(10)));
    assert_eq!(processed.hint, Some(StateHint::Lossy));

    processor.remove_path(1);
    assert!(processor.process(&report.to_summary(0, 0)).is_none());
}

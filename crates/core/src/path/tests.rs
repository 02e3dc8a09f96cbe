use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::*;
use crate::time::VirtualTime;

// ============================================================================
// Harness
// ============================================================================

type Sent = Arc<Mutex<Vec<SubflowPacket>>>;

fn recording_sender() -> (Arc<dyn PacketSender>, Sent) {
    let sent: Sent = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&sent);
    let sender: Arc<dyn PacketSender> =
        Arc::new(move |packet: SubflowPacket| sink.lock().push(packet));
    (sender, sent)
}

fn test_path(config: PathConfig) -> (Path<VirtualTime>, VirtualTime, Sent) {
    let time = VirtualTime::new();
    let (sender, sent) = recording_sender();
    let path = Path::new_with_time_source(1, config, sender, time.clone());
    (path, time, sent)
}

fn media(timestamp: u32, size: usize) -> OutboundPacket {
    OutboundPacket::new(96, timestamp, vec![0u8; size])
}

fn sent_timestamps(sent: &Sent) -> Vec<u32> {
    sent.lock().iter().map(|p| p.packet.timestamp).collect()
}

// ============================================================================
// Pacing and overuse
// ============================================================================

#[test_log::test]
fn test_overuse_queues_excess_and_drains_fifo() {
    let (path, time, sent) = test_path(PathConfig {
        max_bytes_per_second: 1000,
        ..Default::default()
    });

    // 1.5 KB within the first 300 ms; the overuse test runs before each send
    // so the fourth packet still goes out and pushes the sum to 1200.
    for ts in 0..4 {
        path.send(media(ts, 300));
        time.advance(Duration::from_millis(100));
    }
    assert_eq!(path.sent_bytes_in_1s(), 1200);
    assert!(path.is_overused());

    for ts in 4..7 {
        path.send(media(ts, 300));
        time.advance(Duration::from_millis(100));
    }
    assert_eq!(path.queued_packets(), 3, "excess must be queued, not sent");
    assert_eq!(sent_timestamps(&sent), vec![0, 1, 2, 3]);

    // t = 1150 ms: the first two samples left the 1 s horizon, sum is 600.
    time.advance(Duration::from_millis(450));
    assert!(!path.tick(), "flush must stop once overused again");
    assert_eq!(sent_timestamps(&sent), vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(path.queued_packets(), 1);

    // t = 1350 ms: samples at 200 and 300 ms expired as well.
    time.advance(Duration::from_millis(200));
    assert!(path.tick());
    assert_eq!(sent_timestamps(&sent), vec![0, 1, 2, 3, 4, 5, 6]);
    assert_eq!(path.queued_packets(), 0);

    let seqs: Vec<u16> = sent.lock().iter().map(|p| p.subflow_seq).collect();
    assert_eq!(seqs, (1..=7).collect::<Vec<_>>());
}

#[test]
fn test_no_pacing_sends_immediately() {
    let (path, _time, sent) = test_path(PathConfig::default());
    for ts in 0..50 {
        path.send(media(ts, 1200));
    }
    assert_eq!(sent.lock().len(), 50);
    assert!(!path.is_overused());
    assert_eq!(path.max_bytes_per_second(), None);
    assert_eq!(path.sent_bytes_in_1s(), 60_000);
}

#[test_log::test]
fn test_full_queue_drops_oldest() {
    let (path, _time, sent) = test_path(PathConfig {
        max_bytes_per_second: 100,
        max_queued_packets: 2,
        ..Default::default()
    });
    path.send(media(0, 200));
    for ts in 1..4 {
        path.send(media(ts, 10));
    }
    assert_eq!(sent_timestamps(&sent), vec![0]);
    let stats = path.stats();
    assert_eq!(stats.queued_packets, 2);
    assert_eq!(stats.dropped_packets, 1);
}

#[test]
fn test_pacing_can_be_toggled() {
    let (path, _time, sent) = test_path(PathConfig::default());
    path.send(media(0, 500));
    path.set_pacing(100);
    assert_eq!(path.max_bytes_per_second(), Some(100));
    path.send(media(1, 500));
    assert_eq!(path.queued_packets(), 1);

    path.set_pacing(0);
    assert!(path.tick());
    assert_eq!(sent_timestamps(&sent), vec![0, 1]);
}

// ============================================================================
// Probes, frames and counters
// ============================================================================

#[test]
fn test_probe_every_nth_normal_packet() {
    let (path, _time, sent) = test_path(PathConfig {
        monitoring_interval: 3,
        ..Default::default()
    });
    for ts in [0, 0, 1, 1, 2, 2] {
        path.send(media(ts, 800));
    }

    let kinds: Vec<PacketKind> = sent.lock().iter().map(|p| p.packet.kind).collect();
    use PacketKind::{Normal, Probe};
    assert_eq!(kinds, vec![Normal, Normal, Normal, Probe, Normal, Normal, Normal, Probe]);
    {
        let sent = sent.lock();
        assert_eq!(sent[3].packet.payload_type, 127);
        assert_eq!(sent[3].packet.payload_size(), 1400);
    }

    let stats = path.stats();
    assert_eq!(stats.total_sent_packets, 8);
    assert_eq!(stats.total_sent_normal_packets, 6);
    assert_eq!(stats.total_sent_probe_packets, 2);
    assert_eq!(stats.total_sent_payload_bytes, 4800);
    assert_eq!(stats.total_sent_frames, 3);
    assert_eq!(stats.sent_bytes_in_1s, 6 * 800 + 2 * 1400);

    // 800 bytes are 100 eight-byte units; probes contribute nothing.
    assert_eq!(path.sent_octet_sum_for(4), 300);
    assert_eq!(path.sent_octet_sum_for(100), 300);
    assert_eq!(path.sent_octet_sum_for(10), 0);
}

#[test]
fn test_monitoring_interval_zero_disables_probes() {
    let (path, _time, sent) = test_path(PathConfig::default());
    path.set_monitoring_interval(2);
    assert!(path.is_monitoring());
    path.set_monitoring_interval(0);
    for ts in 0..10 {
        path.send(media(ts, 100));
    }
    assert!(sent.lock().iter().all(|p| !p.packet.is_probe()));
}

#[test]
fn test_sequence_wraps_with_cycle() {
    let (path, _time, _sent) = test_path(PathConfig::default());
    for _ in 0..u16::MAX {
        path.send(media(0, 1));
    }
    assert_eq!(path.seq(), u16::MAX);
    assert_eq!(path.cycle_num(), 0);
    assert_eq!(path.highest_sent_seq(), u16::MAX);

    path.send(media(0, 1));
    assert_eq!(path.seq(), 0);
    assert_eq!(path.cycle_num(), 1);
    assert_eq!(path.highest_sent_seq(), 0, "0 follows 65535 in serial order");
}

#[test]
fn test_constant_sizes_have_no_variance() {
    let (path, _time, _sent) = test_path(PathConfig::default());
    for ts in 0..8 {
        path.send(media(ts, 500));
    }
    assert!(path.sent_bytes_variance() < 1e-9);

    for ts in 8..16 {
        path.send(media(ts, if ts % 2 == 0 { 100 } else { 900 }));
    }
    assert!(path.sent_bytes_variance() > 1000.0);
}

// ============================================================================
// State machine
// ============================================================================

#[test_log::test]
fn test_state_transitions_record_timestamps() {
    let (path, time, _sent) = test_path(PathConfig::default());
    assert_eq!(path.state(), PathState::NonCongested);
    assert!(path.is_active() && path.is_non_congested() && path.is_non_lossy());

    time.advance(Duration::from_nanos(5_000));
    path.set_congested();
    assert_eq!(path.state(), PathState::Congested);
    assert_eq!(path.transitions().congested_since, 5_000);

    time.advance(Duration::from_nanos(1_000));
    path.set_lossy();
    assert_eq!(path.state(), PathState::Congested, "congested outranks lossy");
    path.set_non_congested();
    assert_eq!(path.state(), PathState::Lossy);
    assert_eq!(path.transitions().non_congested_since, 6_000);

    path.set_passive();
    assert_eq!(path.state(), PathState::Passive);
    time.advance(Duration::from_nanos(1_000));
    path.set_active();
    let transitions = path.transitions();
    assert_eq!(transitions.active_since, 7_000);
    assert_eq!(transitions.passive_since, 0);
    assert_eq!(path.state(), PathState::Lossy);

    path.set_trial_begin();
    assert!(path.is_in_trial());
    assert_eq!(path.state(), PathState::Lossy);
    path.set_trial_end();
    assert!(!path.is_in_trial());
    path.set_non_lossy();
    assert_eq!(path.flags(), PathFlags::DEFAULT);
}

#[test]
fn test_reset_restores_fresh_state() {
    let (path, _time, _sent) = test_path(PathConfig {
        max_bytes_per_second: 100,
        ..Default::default()
    });
    path.set_not_new();
    path.set_congested();
    path.set_pacing(5);
    path.set_sending_target(9_000);
    for ts in 0..5 {
        path.send(media(ts, 300));
    }
    assert!(path.queued_packets() > 0);

    path.reset();
    let stats = path.stats();
    assert!(path.is_new());
    assert_eq!(stats.state, PathState::NonCongested);
    assert_eq!(stats.max_bytes_per_second, Some(100), "configured pacing returns");
    assert_eq!(stats.seq, 0);
    assert_eq!(stats.total_sent_packets, 0);
    assert_eq!(stats.queued_packets, 0);
    assert_eq!(stats.sent_bytes_in_1s, 0);
    assert_eq!(stats.sending_target, 0);
}

#[test]
fn test_stats_serialize() -> testresult::TestResult {
    let (path, _time, _sent) = test_path(PathConfig::default());
    path.send(media(1, 64));
    path.set_lossy();
    let json = serde_json::to_value(path.stats())?;
    assert_eq!(json["state"], "lossy");
    assert_eq!(json["flags"], 12);
    assert_eq!(json["total_sent_payload_bytes"], 64);
    assert_eq!(json["max_bytes_per_second"], serde_json::Value::Null);
    Ok(())
}

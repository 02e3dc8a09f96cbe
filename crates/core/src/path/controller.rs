//! Per-path sending state machine.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::config::{PathConfig, SENT_BYTES_HORIZON, SENT_BYTES_WINDOW_CAPACITY, SENT_OCTET_RING_SIZE};
use super::packet::{OutboundPacket, PacketSender, SubflowPacket};
use super::state::{PathFlags, PathState, StateTransitions};
use super::stats::PathStats;
use crate::stats::{LatestValue, SlidingWindow, StdDev, Sum};
use crate::time::{RealTime, TimeSource};

/// Recent-sent-bytes window with its sum and spread.
///
/// The window sits behind its own mutex so `PathInner` stays `Sync`; under the
/// path's write lock it is reached through `get_mut` without locking.
struct SentBytes<T: TimeSource> {
    window: Mutex<SlidingWindow<usize, T>>,
    sum: LatestValue<f64>,
    deviation: LatestValue<f64>,
}

impl<T: TimeSource> SentBytes<T> {
    fn new(time_source: T) -> Self {
        let sum = LatestValue::new(0.0);
        let deviation = LatestValue::new(0.0);
        let mut window = SlidingWindow::new_with_time_source(
            SENT_BYTES_WINDOW_CAPACITY,
            Some(SENT_BYTES_HORIZON),
            time_source,
        );
        window.add_plugin(Sum::new(|bytes: &usize| *bytes as f64).with_listener(sum.recorder()));
        window.add_plugin(
            StdDev::windowed(|bytes: &usize| *bytes as f64, SENT_BYTES_WINDOW_CAPACITY)
                .with_listener(deviation.recorder()),
        );
        Self {
            window: Mutex::new(window),
            sum,
            deviation,
        }
    }

    fn add(&mut self, bytes: usize) {
        self.window.get_mut().add(bytes);
    }

    fn refresh(&mut self) {
        self.window.get_mut().refresh();
    }

    fn sum(&self) -> u64 {
        self.sum.get().max(0.0).round() as u64
    }

    fn variance(&self) -> f64 {
        let deviation = self.deviation.get();
        deviation * deviation
    }

    fn reset(&mut self) {
        self.window.get_mut().reset();
        self.sum.set(0.0);
        self.deviation.set(0.0);
    }
}

struct PathInner<T: TimeSource> {
    is_new: bool,
    flags: PathFlags,
    transitions: StateTransitions,
    config: PathConfig,
    sent_bytes: SentBytes<T>,
    queue: VecDeque<SubflowPacket>,
    /// Payload sizes in 8-byte units; probes contribute 0.
    sent_octets: VecDeque<u32>,
    seq: u16,
    cycle_num: u16,
    highest_sent_seq: u16,
    last_frame_timestamps: BTreeMap<u8, u32>,
    submitted_normal_packets: u64,
    total_sent_packets: u64,
    total_sent_normal_packets: u64,
    total_sent_probe_packets: u64,
    total_sent_payload_bytes: u64,
    total_sent_frames: u64,
    dropped_packets: u64,
    last_sent_at: Option<u64>,
    sending_target: i64,
}

impl<T: TimeSource> PathInner<T> {
    fn new(config: PathConfig, time_source: T) -> Self {
        Self {
            is_new: true,
            flags: PathFlags::default(),
            transitions: StateTransitions::default(),
            config,
            sent_bytes: SentBytes::new(time_source),
            queue: VecDeque::new(),
            sent_octets: VecDeque::new(),
            seq: 0,
            cycle_num: 0,
            highest_sent_seq: 0,
            last_frame_timestamps: BTreeMap::new(),
            submitted_normal_packets: 0,
            total_sent_packets: 0,
            total_sent_normal_packets: 0,
            total_sent_probe_packets: 0,
            total_sent_payload_bytes: 0,
            total_sent_frames: 0,
            dropped_packets: 0,
            last_sent_at: None,
            sending_target: 0,
        }
    }

    fn is_overused(&self) -> bool {
        let limit = self.config.max_bytes_per_second;
        limit > 0 && self.sent_bytes.sum() > limit as u64
    }

    fn next_seq(&mut self) -> u16 {
        self.seq = self.seq.wrapping_add(1);
        if self.seq == 0 {
            self.cycle_num = self.cycle_num.wrapping_add(1);
        }
        self.seq
    }

    fn stamp(&mut self, path_id: u8, packet: OutboundPacket) -> SubflowPacket {
        SubflowPacket {
            path_id,
            subflow_seq: self.next_seq(),
            packet,
        }
    }

    fn enqueue(&mut self, path_id: u8, packet: SubflowPacket) {
        if self.queue.len() >= self.config.max_queued_packets.max(1) {
            if let Some(dropped) = self.queue.pop_front() {
                self.dropped_packets += 1;
                tracing::warn!(
                    path_id,
                    dropped_seq = dropped.subflow_seq,
                    dropped_total = self.dropped_packets,
                    "Path queue full, dropping oldest packet"
                );
            }
        }
        self.queue.push_back(packet);
    }

    /// Sends queued packets oldest first until the queue drains or the path
    /// becomes overused. Returns whether the queue drained.
    fn flush(&mut self, now: u64, sender: &dyn PacketSender) -> bool {
        self.sent_bytes.refresh();
        while !self.queue.is_empty() {
            if self.is_overused() {
                return false;
            }
            let Some(packet) = self.queue.pop_front() else {
                break;
            };
            self.transmit(packet, now, sender);
        }
        true
    }

    fn submit(&mut self, packet: SubflowPacket, now: u64, sender: &dyn PacketSender) {
        self.sent_bytes.refresh();
        let path_id = packet.path_id;
        if self.is_overused() {
            tracing::trace!(
                path_id,
                seq = packet.subflow_seq,
                sent_bytes = self.sent_bytes.sum(),
                "Path overused, queueing packet"
            );
            self.enqueue(path_id, packet);
            return;
        }
        if !self.queue.is_empty() {
            self.enqueue(path_id, packet);
            self.flush(now, sender);
            return;
        }
        self.transmit(packet, now, sender);
    }

    fn transmit(&mut self, packet: SubflowPacket, now: u64, sender: &dyn PacketSender) {
        let size = packet.packet.payload_size();
        self.total_sent_packets += 1;
        self.last_sent_at = Some(now);
        if packet.packet.is_probe() {
            self.total_sent_probe_packets += 1;
            self.push_octets(0);
        } else {
            self.total_sent_normal_packets += 1;
            self.total_sent_payload_bytes += size as u64;
            self.push_octets((size >> 3) as u32);
            let payload_type = packet.packet.payload_type;
            let timestamp = packet.packet.timestamp;
            if self.last_frame_timestamps.insert(payload_type, timestamp) != Some(timestamp) {
                self.total_sent_frames += 1;
            }
        }
        // Sequence numbers wrap; take the newer one in serial-number order.
        if (packet.subflow_seq.wrapping_sub(self.highest_sent_seq) as i16) > 0 || self.total_sent_packets == 1 {
            self.highest_sent_seq = packet.subflow_seq;
        }
        self.sent_bytes.add(size);

        tracing::trace!(
            path_id = packet.path_id,
            seq = packet.subflow_seq,
            size,
            probe = packet.packet.is_probe(),
            "Sending packet"
        );
        sender.send_packet(packet);
    }

    fn push_octets(&mut self, octets: u32) {
        if self.sent_octets.len() >= SENT_OCTET_RING_SIZE {
            self.sent_octets.pop_front();
        }
        self.sent_octets.push_back(octets);
    }
}

/// One network path of the multipath sender.
///
/// All state lives behind a single reader/writer lock: queries take it
/// shared, every mutation (including the whole send path) takes it
/// exclusively. Packets cleared for transmission are handed to the
/// [`PacketSender`] while the lock is held.
pub struct Path<T: TimeSource = RealTime> {
    id: u8,
    base_config: PathConfig,
    sender: Arc<dyn PacketSender>,
    time_source: T,
    inner: RwLock<PathInner<T>>,
}

impl Path<RealTime> {
    pub fn new(id: u8, config: PathConfig, sender: Arc<dyn PacketSender>) -> Self {
        Self::new_with_time_source(id, config, sender, RealTime::new())
    }
}

impl<T: TimeSource> Path<T> {
    pub fn new_with_time_source(
        id: u8,
        config: PathConfig,
        sender: Arc<dyn PacketSender>,
        time_source: T,
    ) -> Self {
        let inner = PathInner::new(config.clone(), time_source.clone());
        Self {
            id,
            base_config: config,
            sender,
            time_source,
            inner: RwLock::new(inner),
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    /// Restores the freshly created state: default flags, configured pacing
    /// and probing, empty queue, zeroed counters and sequence numbers.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        let queued = inner.queue.len();
        *inner = PathInner::new(self.base_config.clone(), self.time_source.clone());
        tracing::debug!(path_id = self.id, discarded = queued, "Path reset");
    }

    pub fn is_new(&self) -> bool {
        self.inner.read().is_new
    }

    pub fn set_not_new(&self) {
        self.inner.write().is_new = false;
    }

    // ------------------------------------------------------------------
    // State bits
    // ------------------------------------------------------------------

    pub fn state(&self) -> PathState {
        PathState::from_flags(self.inner.read().flags)
    }

    pub fn flags(&self) -> PathFlags {
        self.inner.read().flags
    }

    pub fn transitions(&self) -> StateTransitions {
        self.inner.read().transitions
    }

    pub fn is_active(&self) -> bool {
        self.flags().contains(PathFlags::ACTIVE)
    }

    pub fn is_non_congested(&self) -> bool {
        self.flags().contains(PathFlags::NON_CONGESTED)
    }

    pub fn is_non_lossy(&self) -> bool {
        self.flags().contains(PathFlags::NON_LOSSY)
    }

    pub fn is_in_trial(&self) -> bool {
        self.flags().contains(PathFlags::TRIAL)
    }

    pub fn set_active(&self) {
        self.update_flags(|flags, transitions, now| {
            flags.insert(PathFlags::ACTIVE);
            transitions.active_since = now;
            transitions.passive_since = 0;
        });
    }

    pub fn set_passive(&self) {
        self.update_flags(|flags, transitions, now| {
            flags.remove(PathFlags::ACTIVE);
            transitions.passive_since = now;
            transitions.active_since = 0;
        });
    }

    pub fn set_congested(&self) {
        self.update_flags(|flags, transitions, now| {
            flags.remove(PathFlags::NON_CONGESTED);
            transitions.congested_since = now;
        });
    }

    pub fn set_non_congested(&self) {
        self.update_flags(|flags, transitions, now| {
            flags.insert(PathFlags::NON_CONGESTED);
            transitions.non_congested_since = now;
        });
    }

    pub fn set_lossy(&self) {
        self.update_flags(|flags, transitions, now| {
            flags.remove(PathFlags::NON_LOSSY);
            transitions.lossy_since = now;
        });
    }

    pub fn set_non_lossy(&self) {
        self.update_flags(|flags, transitions, now| {
            flags.insert(PathFlags::NON_LOSSY);
            transitions.non_lossy_since = now;
        });
    }

    pub fn set_trial_begin(&self) {
        self.update_flags(|flags, transitions, now| {
            flags.insert(PathFlags::TRIAL);
            transitions.trial_started = now;
        });
    }

    pub fn set_trial_end(&self) {
        self.update_flags(|flags, transitions, now| {
            flags.remove(PathFlags::TRIAL);
            transitions.trial_ended = now;
        });
    }

    fn update_flags(&self, change: impl FnOnce(&mut PathFlags, &mut StateTransitions, u64)) {
        let now = self.time_source.now_nanos();
        let mut inner = self.inner.write();
        let before = PathState::from_flags(inner.flags);
        let PathInner {
            flags, transitions, ..
        } = &mut *inner;
        change(flags, transitions, now);
        let after = PathState::from_flags(inner.flags);
        if before != after {
            tracing::debug!(path_id = self.id, from = %before, to = %after, "Path state changed");
        }
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    /// Sets the pacing ceiling; 0 disables pacing.
    pub fn set_pacing(&self, max_bytes_per_second: u32) {
        let mut inner = self.inner.write();
        if inner.config.max_bytes_per_second != max_bytes_per_second {
            tracing::debug!(
                path_id = self.id,
                max_bytes_per_second,
                "Path pacing changed"
            );
        }
        inner.config.max_bytes_per_second = max_bytes_per_second;
    }

    pub fn max_bytes_per_second(&self) -> Option<u32> {
        let limit = self.inner.read().config.max_bytes_per_second;
        (limit > 0).then_some(limit)
    }

    /// Emits a probe after every `interval` normal packets; 0 disables probing.
    pub fn set_monitoring_interval(&self, interval: u32) {
        self.inner.write().config.monitoring_interval = interval;
    }

    pub fn set_monitor_payload_type(&self, payload_type: u8) {
        self.inner.write().config.monitor_payload_type = payload_type;
    }

    pub fn is_monitoring(&self) -> bool {
        self.inner.read().config.monitoring_interval > 0
    }

    pub fn set_sending_target(&self, target: i64) {
        self.inner.write().sending_target = target;
    }

    pub fn sending_target(&self) -> i64 {
        self.inner.read().sending_target
    }

    // ------------------------------------------------------------------
    // Send path
    // ------------------------------------------------------------------

    /// Stamps `packet` with the next subflow sequence number and transmits
    /// it, or queues it while the path is overused. Every Nth normal packet
    /// is followed by a probe when a monitoring interval is set.
    pub fn send(&self, packet: OutboundPacket) {
        let now = self.time_source.now_nanos();
        let mut inner = self.inner.write();
        let is_probe = packet.is_probe();
        let timestamp = packet.timestamp;
        let stamped = inner.stamp(self.id, packet);
        inner.submit(stamped, now, self.sender.as_ref());

        if is_probe {
            return;
        }
        inner.submitted_normal_packets += 1;
        let interval = inner.config.monitoring_interval as u64;
        if interval == 0 || inner.submitted_normal_packets % interval != 0 {
            return;
        }
        let probe = OutboundPacket::probe(
            inner.config.monitor_payload_type,
            timestamp,
            inner.config.probe_payload_size,
        );
        let stamped = inner.stamp(self.id, probe);
        inner.submit(stamped, now, self.sender.as_ref());
    }

    /// Evicts expired sent-byte samples and flushes whatever the pacing
    /// budget now allows. Returns whether the queue is empty afterwards.
    pub fn tick(&self) -> bool {
        let now = self.time_source.now_nanos();
        let mut inner = self.inner.write();
        inner.flush(now, self.sender.as_ref())
    }

    pub fn is_overused(&self) -> bool {
        self.inner.read().is_overused()
    }

    pub fn queued_packets(&self) -> usize {
        self.inner.read().queue.len()
    }

    /// Bytes sent over the last second, as of the last refresh.
    pub fn sent_bytes_in_1s(&self) -> u64 {
        self.inner.read().sent_bytes.sum()
    }

    pub fn sent_bytes_variance(&self) -> f64 {
        self.inner.read().sent_bytes.variance()
    }

    /// Consumes up to `amount` entries from the sent-octet ring, oldest
    /// first, and returns their sum in 8-byte units.
    pub fn sent_octet_sum_for(&self, amount: usize) -> u32 {
        let mut inner = self.inner.write();
        let take = amount.min(inner.sent_octets.len());
        inner.sent_octets.drain(..take).sum()
    }

    pub fn seq(&self) -> u16 {
        self.inner.read().seq
    }

    pub fn cycle_num(&self) -> u16 {
        self.inner.read().cycle_num
    }

    pub fn highest_sent_seq(&self) -> u16 {
        self.inner.read().highest_sent_seq
    }

    pub fn stats(&self) -> PathStats {
        let inner = self.inner.read();
        PathStats {
            id: self.id,
            state: PathState::from_flags(inner.flags),
            flags: inner.flags,
            transitions: inner.transitions,
            max_bytes_per_second: (inner.config.max_bytes_per_second > 0)
                .then_some(inner.config.max_bytes_per_second),
            sending_target: inner.sending_target,
            seq: inner.seq,
            cycle_num: inner.cycle_num,
            highest_sent_seq: inner.highest_sent_seq,
            total_sent_packets: inner.total_sent_packets,
            total_sent_normal_packets: inner.total_sent_normal_packets,
            total_sent_probe_packets: inner.total_sent_probe_packets,
            total_sent_payload_bytes: inner.total_sent_payload_bytes,
            total_sent_frames: inner.total_sent_frames,
            dropped_packets: inner.dropped_packets,
            queued_packets: inner.queue.len(),
            sent_bytes_in_1s: inner.sent_bytes.sum(),
            last_sent_at: inner.last_sent_at,
        }
    }
}

impl<T: TimeSource> std::fmt::Debug for Path<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Path")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

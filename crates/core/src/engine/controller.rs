use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::config::CoreConfig;
use crate::distributor::{DistributionRound, PathSelector, RateDistributor, UtilizationReport};
use crate::errors::{CongestionError, Result};
use crate::packets::{PacketArena, PacketHandle, PacketRecord};
use crate::path::{OutboundPacket, Path, PacketSender, PathState, PathStats, SubflowPacket};
use crate::report::{PathFeedback, ProcessedReport, ReceiverReport, ReceiverStats, ReportProcessor, ReportSummary, StateHint};
use crate::stats::Listener;
use crate::time::{RealTime, TimeSource};
use crate::tracker::{SendTracker, SendTrackerStats};

/// Counts every transmitted packet in the send tracker before handing it on.
///
/// Runs under the sending path's lock, so the tracker lock is always taken
/// after a path lock and never the other way round.
struct TrackingSender<T: TimeSource> {
    inner: Arc<dyn PacketSender>,
    tracker: Arc<Mutex<SendTracker<T>>>,
}

impl<T: TimeSource> PacketSender for TrackingSender<T> {
    fn send_packet(&self, packet: SubflowPacket) {
        self.tracker
            .lock()
            .on_packet_sent(packet.path_id, packet.subflow_seq, packet.packet.payload_size());
        self.inner.send_packet(packet);
    }
}

/// Commits a round's targets to the paths, then to the caller's selector.
struct PathCommitter<'p, 's, T: TimeSource> {
    paths: &'p BTreeMap<u8, Arc<Path<T>>>,
    pacing_headroom: Option<f64>,
    downstream: Option<&'s mut dyn PathSelector>,
    committed: usize,
}

impl<T: TimeSource> PathSelector for PathCommitter<'_, '_, T> {
    fn set_sending_target(&mut self, id: u8, target: i64) {
        if let Some(path) = self.paths.get(&id) {
            path.set_sending_target(target);
            path.set_not_new();
            if let Some(headroom) = self.pacing_headroom.filter(|_| target > 0) {
                let limit = (target as f64 * headroom).min(u32::MAX as f64) as u32;
                path.set_pacing(limit);
            }
            self.committed += 1;
        }
        if let Some(downstream) = self.downstream.as_deref_mut() {
            downstream.set_sending_target(id, target);
        }
    }

    fn commit_changes(&mut self) {
        tracing::debug!(paths = self.committed, "Sending targets committed");
        if let Some(downstream) = self.downstream.as_deref_mut() {
            downstream.commit_changes();
        }
    }
}

/// Receive side of the core: per-path receiver statistics and report delivery.
struct ReceiveSide<T: TimeSource> {
    stats: BTreeMap<u8, ReceiverStats<T>>,
    listeners: Vec<Listener<ReceiverReport>>,
    last_report_at: u64,
}

/// Snapshot of the whole core.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoreStats {
    pub ticks: u64,
    pub rounds: u64,
    pub paths: Vec<PathStats>,
    pub send: SendTrackerStats,
    pub live_packets: usize,
    pub stalled_packets: u64,
}

/// Owns every path together with the rate distributor, the send tracker, the
/// report processor and the packet arena, and drives them from [`tick`].
///
/// Lock order: distributor, then the path map, then individual paths, then
/// the tracker. No other pair of locks is ever held together.
///
/// [`tick`]: CongestionCore::tick
pub struct CongestionCore<T: TimeSource = RealTime> {
    config: CoreConfig,
    time_source: T,
    paths: RwLock<BTreeMap<u8, Arc<Path<T>>>>,
    distributor: Mutex<RateDistributor>,
    tracker: Arc<Mutex<SendTracker<T>>>,
    reports: Mutex<ReportProcessor<T>>,
    arena: Mutex<PacketArena>,
    receive: Mutex<ReceiveSide<T>>,
    ticks: AtomicU64,
}

impl CongestionCore<RealTime> {
    pub fn new(config: CoreConfig) -> Result<Self> {
        Self::new_with_time_source(config, RealTime::new())
    }
}

impl<T: TimeSource> CongestionCore<T> {
    pub fn new_with_time_source(config: CoreConfig, time_source: T) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            distributor: Mutex::new(RateDistributor::new(config.distributor.clone())),
            tracker: Arc::new(Mutex::new(SendTracker::new_with_time_source(time_source.clone()))),
            reports: Mutex::new(ReportProcessor::new_with_time_source(&config.receiver, time_source.clone())),
            arena: Mutex::new(PacketArena::new()),
            receive: Mutex::new(ReceiveSide {
                stats: BTreeMap::new(),
                listeners: Vec::new(),
                last_report_at: time_source.now_nanos(),
            }),
            paths: RwLock::new(BTreeMap::new()),
            ticks: AtomicU64::new(0),
            config,
            time_source,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Paths
    // ------------------------------------------------------------------

    /// Attaches a new path under rate control. Packets it emits go to
    /// `sender`.
    pub fn add_path(&self, id: u8, sender: Arc<dyn PacketSender>) -> Result<Arc<Path<T>>> {
        let mut distributor = self.distributor.lock();
        let mut paths = self.paths.write();
        if paths.contains_key(&id) {
            return Err(CongestionError::DuplicatePath(id));
        }
        let sender: Arc<dyn PacketSender> = Arc::new(TrackingSender {
            inner: sender,
            tracker: Arc::clone(&self.tracker),
        });
        let path = Arc::new(Path::new_with_time_source(
            id,
            self.config.path.clone(),
            sender,
            self.time_source.clone(),
        ));
        paths.insert(id, Arc::clone(&path));
        distributor.add_controlled(id);
        distributor.set_initial_target(id, 0);
        self.reports.lock().register_path(id);
        tracing::debug!(path_id = id, paths = paths.len(), "Path added");
        Ok(path)
    }

    /// Detaches a path. It is reset first so nothing it still queues is sent.
    pub fn remove_path(&self, id: u8) -> Result<()> {
        let mut distributor = self.distributor.lock();
        let path = self
            .paths
            .write()
            .remove(&id)
            .ok_or(CongestionError::UnknownPath(id))?;
        path.reset();
        distributor.remove_controlled(id);
        drop(distributor);

        self.tracker.lock().remove_path(id);
        self.reports.lock().remove_path(id);
        tracing::debug!(path_id = id, "Path removed");
        Ok(())
    }

    pub fn path(&self, id: u8) -> Result<Arc<Path<T>>> {
        self.paths
            .read()
            .get(&id)
            .cloned()
            .ok_or(CongestionError::UnknownPath(id))
    }

    pub fn path_ids(&self) -> Vec<u8> {
        self.paths.read().keys().copied().collect()
    }

    pub fn send(&self, id: u8, packet: OutboundPacket) -> Result<()> {
        self.path(id)?.send(packet);
        Ok(())
    }

    pub fn path_state(&self, id: u8) -> Result<PathState> {
        Ok(self.path(id)?.state())
    }

    pub fn sending_target(&self, id: u8) -> Result<i64> {
        Ok(self.path(id)?.sending_target())
    }

    /// Seeds the target a path starts from before its first round.
    pub fn set_initial_target(&self, id: u8, target: i64) -> Result<()> {
        let mut distributor = self.distributor.lock();
        let path = self.path(id)?;
        distributor.set_initial_target(id, target);
        path.set_sending_target(target);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Feedback
    // ------------------------------------------------------------------

    /// Folds a parsed report into the path's feedback and applies the loss
    /// hint to its state. Reports for unknown paths yield `None`.
    pub fn receive_report(&self, summary: &ReportSummary) -> Option<ProcessedReport> {
        let processed = self.reports.lock().process(summary)?;
        let Ok(path) = self.path(processed.path_id) else {
            return Some(processed);
        };
        match processed.hint {
            Some(StateHint::Lossy) => path.set_lossy(),
            Some(StateHint::NonLossy) => path.set_non_lossy(),
            None => {}
        }
        Some(processed)
    }

    pub fn receive_utilization(&self, id: u8, report: UtilizationReport) -> Result<()> {
        let mut distributor = self.distributor.lock();
        if !self.paths.read().contains_key(&id) {
            return Err(CongestionError::UnknownPath(id));
        }
        distributor.setup_report(id, report);
        Ok(())
    }

    pub fn feedback(&self, id: u8) -> Option<PathFeedback> {
        self.reports.lock().feedback(id).copied()
    }

    pub fn on_packet_acked(&self, path_id: u8, subflow_seq: u16) {
        self.tracker.lock().on_packet_acked(path_id, subflow_seq);
    }

    pub fn on_packet_lost(&self, path_id: u8, subflow_seq: u16) {
        self.tracker.lock().on_packet_lost(path_id, subflow_seq);
    }

    pub fn send_stats(&self, path_id: u8) -> Option<SendTrackerStats> {
        self.tracker.lock().stats(path_id)
    }

    // ------------------------------------------------------------------
    // Receive side
    // ------------------------------------------------------------------

    /// Records a packet that arrived on `path_id` now.
    pub fn on_packet_received(&self, path_id: u8, subflow_seq: u16, payload_size: usize, sent_at: u64) {
        let arrived_at = self.time_source.now_nanos();
        let mut receive = self.receive.lock();
        receive
            .stats
            .entry(path_id)
            .or_insert_with(|| {
                ReceiverStats::new_with_time_source(path_id, &self.config.receiver, self.time_source.clone())
            })
            .on_packet_received(subflow_seq, payload_size, sent_at, arrived_at);
    }

    pub fn on_packet_discarded(&self, path_id: u8, payload_size: usize) {
        if let Some(stats) = self.receive.lock().stats.get_mut(&path_id) {
            stats.on_packet_discarded(payload_size);
        }
    }

    /// Called with every receiver report the tick produces.
    pub fn on_receiver_report(&self, listener: Listener<ReceiverReport>) {
        self.receive.lock().listeners.push(listener);
    }

    /// Produces a report for every receiving path right away.
    pub fn produce_reports(&self) -> Vec<ReceiverReport> {
        let now = self.time_source.now_nanos();
        let mut receive = self.receive.lock();
        receive.last_report_at = now;
        let reports: Vec<ReceiverReport> = receive
            .stats
            .values_mut()
            .filter_map(|stats| stats.produce_report())
            .collect();
        for listener in receive.listeners.iter_mut() {
            for report in &reports {
                listener(report);
            }
        }
        reports
    }

    fn report_due(&self) -> bool {
        let now = self.time_source.now_nanos();
        let interval = self.config.receiver.report_interval().as_nanos() as u64;
        now.saturating_sub(self.receive.lock().last_report_at) >= interval
    }

    // ------------------------------------------------------------------
    // Packet lifetimes
    // ------------------------------------------------------------------

    pub fn register_packet(&self, abs_seq: u16, path_id: u8, subflow_seq: u16, payload_size: usize) -> PacketHandle {
        let now = self.time_source.now_nanos();
        self.arena
            .lock()
            .insert(abs_seq, path_id, subflow_seq, payload_size, now)
    }

    pub fn packet_forwarded(&self, handle: PacketHandle) -> Result<()> {
        let now = self.time_source.now_nanos();
        self.arena.lock().mark_forwarded(handle, now)
    }

    pub fn release_packet(&self, handle: PacketHandle) -> Result<()> {
        self.arena.lock().release(handle)
    }

    pub fn packet(&self, handle: PacketHandle) -> Option<PacketRecord> {
        self.arena.lock().get(handle).copied()
    }

    pub fn on_stalled_packet(&self, listener: Listener<PacketRecord>) {
        self.arena.lock().on_stalled(listener);
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// One control step: refresh and flush every path, refresh the tracker,
    /// run a distributor round and commit its targets, and produce receiver
    /// reports when they are due.
    pub fn tick(&self) -> Option<DistributionRound> {
        self.tick_inner(None)
    }

    /// As [`tick`](Self::tick), also forwarding the committed targets to
    /// `selector`.
    pub fn tick_with_selector(&self, selector: &mut dyn PathSelector) -> Option<DistributionRound> {
        self.tick_inner(Some(selector))
    }

    fn tick_inner(&self, downstream: Option<&mut dyn PathSelector>) -> Option<DistributionRound> {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        let round = {
            let mut distributor = self.distributor.lock();
            let paths = self.paths.read();
            let mut queued = 0;
            for path in paths.values() {
                if !path.tick() {
                    queued += path.queued_packets();
                }
            }
            self.tracker.lock().refresh();

            let mut committer = PathCommitter {
                paths: &paths,
                pacing_headroom: self
                    .config
                    .distributor
                    .pace_to_target
                    .then_some(self.config.distributor.pacing_headroom),
                downstream,
                committed: 0,
            };
            let round = distributor.tick(&mut committer);
            tracing::debug!(tick, paths = paths.len(), queued, round = round.is_some(), "Core tick");
            round
        };

        if self.report_due() {
            self.produce_reports();
        }
        round
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> CoreStats {
        let rounds = self.distributor.lock().rounds();
        let paths = self.paths.read().values().map(|path| path.stats()).collect();
        let send = self.tracker.lock().total();
        let arena = self.arena.lock();
        CoreStats {
            ticks: self.ticks(),
            rounds,
            paths,
            send,
            live_packets: arena.live_packets(),
            stalled_packets: arena.stalled_packets(),
        }
    }
}

impl<T: TimeSource> std::fmt::Debug for CongestionCore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CongestionCore")
            .field("paths", &self.path_ids())
            .field("ticks", &self.ticks())
            .finish()
    }
}

//! Generation-checked packet lifetimes.
//!
//! Packets are tracked in a fixed arena indexed by their 16-bit absolute
//! sequence number. Each slot carries a generation counter that increments
//! whenever the slot is reused, so a [`PacketHandle`] from a previous lap of
//! the sequence space is detected instead of silently aliasing a newer
//! packet.
//!
//! A packet is expected to be marked forwarded once it has gone through the
//! pipeline and released once it was acknowledged or dropped. A slot reused
//! while its occupant was forwarded but never released is a *stalled* packet
//! and is reported to the stalled listeners.

use crate::errors::{CongestionError, Result};
use crate::stats::Listener;

/// One slot per value of the 16-bit sequence space.
pub(crate) const ARENA_SLOTS: usize = 1 << 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketHandle {
    pub seq: u16,
    pub generation: u32,
}

/// Metadata stored for a tracked packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketRecord {
    pub seq: u16,
    pub generation: u32,
    pub path_id: u8,
    pub subflow_seq: u16,
    pub payload_size: usize,
    /// Nanoseconds on the owning core's clock.
    pub sent_at: u64,
    /// When the packet was marked forwarded.
    pub forwarded_at: Option<u64>,
    pub released: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct Slot {
    generation: u32,
    record: Option<PacketRecord>,
}

pub struct PacketArena {
    slots: Vec<Slot>,
    stalled_listeners: Vec<Listener<PacketRecord>>,
    stalled_packets: u64,
    live: usize,
}

impl Default for PacketArena {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketArena {
    pub fn new() -> Self {
        Self {
            slots: vec![Slot::default(); ARENA_SLOTS],
            stalled_listeners: Vec::new(),
            stalled_packets: 0,
            live: 0,
        }
    }

    pub fn on_stalled(&mut self, listener: Listener<PacketRecord>) {
        self.stalled_listeners.push(listener);
    }

    /// Starts tracking a packet in the slot of `seq`, retiring whatever the
    /// slot held before.
    pub fn insert(
        &mut self,
        seq: u16,
        path_id: u8,
        subflow_seq: u16,
        payload_size: usize,
        sent_at: u64,
    ) -> PacketHandle {
        let slot = &mut self.slots[seq as usize];
        let previous = slot.record.take();
        slot.generation = slot.generation.wrapping_add(1);
        let generation = slot.generation;
        slot.record = Some(PacketRecord {
            seq,
            generation,
            path_id,
            subflow_seq,
            payload_size,
            sent_at,
            forwarded_at: None,
            released: false,
        });

        match previous {
            Some(old) if !old.released => {
                if old.forwarded_at.is_some() {
                    self.stalled_packets += 1;
                    tracing::warn!(
                        seq,
                        generation = old.generation,
                        path_id = old.path_id,
                        subflow_seq = old.subflow_seq,
                        "Stalled packet: slot reused before release"
                    );
                    for listener in self.stalled_listeners.iter_mut() {
                        listener(&old);
                    }
                }
            }
            _ => self.live += 1,
        }
        PacketHandle { seq, generation }
    }

    pub fn get(&self, handle: PacketHandle) -> Option<&PacketRecord> {
        let slot = &self.slots[handle.seq as usize];
        if slot.generation != handle.generation {
            return None;
        }
        slot.record.as_ref()
    }

    /// Records that the packet went through the pipeline at `now`.
    pub fn mark_forwarded(&mut self, handle: PacketHandle, now: u64) -> Result<()> {
        let record = self.record_mut(handle)?;
        record.forwarded_at = Some(now);
        Ok(())
    }

    /// Ends the packet's lifetime (acknowledged or dropped). Releasing twice
    /// is a no-op.
    pub fn release(&mut self, handle: PacketHandle) -> Result<()> {
        let record = self.record_mut(handle)?;
        if record.released {
            return Ok(());
        }
        record.released = true;
        self.live = self.live.saturating_sub(1);
        Ok(())
    }

    /// Packets inserted and not yet released.
    pub fn live_packets(&self) -> usize {
        self.live
    }

    pub fn stalled_packets(&self) -> u64 {
        self.stalled_packets
    }

    fn record_mut(&mut self, handle: PacketHandle) -> Result<&mut PacketRecord> {
        let slot = &mut self.slots[handle.seq as usize];
        match slot.record.as_mut() {
            Some(record) if slot.generation == handle.generation => Ok(record),
            _ => Err(CongestionError::StalePacketHandle {
                seq: handle.seq,
                generation: handle.generation,
            }),
        }
    }
}

impl std::fmt::Debug for PacketArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketArena")
            .field("live", &self.live)
            .field("stalled_packets", &self.stalled_packets)
            .finish()
    }
}

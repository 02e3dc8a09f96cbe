//! Outbound packets and the sink they are handed to.

use bytes::Bytes;

use super::config::MAX_PROBE_PAYLOAD;

static PROBE_PAYLOAD: [u8; MAX_PROBE_PAYLOAD] = [0; MAX_PROBE_PAYLOAD];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// Media submitted by the pipeline.
    Normal,
    /// Synthetic packet emitted for bandwidth probing.
    Probe,
}

/// A media packet submitted to a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPacket {
    pub payload_type: u8,
    /// Media timestamp; a change marks the start of a new frame.
    pub timestamp: u32,
    pub payload: Bytes,
    pub kind: PacketKind,
}

impl OutboundPacket {
    pub fn new(payload_type: u8, timestamp: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            payload_type,
            timestamp,
            payload: payload.into(),
            kind: PacketKind::Normal,
        }
    }

    pub(crate) fn probe(payload_type: u8, timestamp: u32, size: usize) -> Self {
        Self {
            payload_type,
            timestamp,
            payload: Bytes::from_static(&PROBE_PAYLOAD[..size.min(MAX_PROBE_PAYLOAD)]),
            kind: PacketKind::Probe,
        }
    }

    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }

    pub fn is_probe(&self) -> bool {
        self.kind == PacketKind::Probe
    }
}

/// A packet stamped with its path id and subflow sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubflowPacket {
    pub path_id: u8,
    pub subflow_seq: u16,
    pub packet: OutboundPacket,
}

/// Sink for packets cleared for transmission.
///
/// Called while the path's lock is held, so implementations must not call
/// back into the same path.
pub trait PacketSender: Send + Sync {
    fn send_packet(&self, packet: SubflowPacket);
}

impl<F> PacketSender for F
where
    F: Fn(SubflowPacket) + Send + Sync,
{
    fn send_packet(&self, packet: SubflowPacket) {
        self(packet)
    }
}

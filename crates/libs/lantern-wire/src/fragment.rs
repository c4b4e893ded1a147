//! Fragment reassembly for oversized payloads.
//!
//! Fragments are correlated by `(sender_id, timestamp)` only — the wire
//! format carries no sequence number, so two concurrent fragmented
//! sends from one peer in the same millisecond collide, and a dropped
//! middle fragment yields a short payload when the end marker lands.
//! Both are inherent limits of the format; the reassembler guarantees
//! only that it never panics and never grows without bound.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::packet::{parse_frame, Frame, Packet, PacketType, WireError};
use crate::PEER_ID_SIZE;

/// Incomplete buffers idle longer than this are dropped.
pub const DEFAULT_BUFFER_TTL: Duration = Duration::from_secs(30);

/// Hard cap on concurrent reassemblies; the stalest buffer is evicted
/// to admit a new one.
pub const DEFAULT_MAX_BUFFERS: usize = 64;

type FragmentKey = ([u8; PEER_ID_SIZE], i64);

struct FragmentBuffer {
    data: Vec<u8>,
    last_touched: Instant,
}

/// Stateful decoder for inbound frames.
///
/// Non-fragment frames decode immediately. Fragment frames accumulate
/// per `(sender, timestamp)` until a `FragmentEnd` closes the sequence,
/// at which point the buffered payload is returned on a packet of type
/// `FragmentEnd`. Callers needing serialized access from several
/// threads wrap the reassembler in a mutex; see `lantern-session`.
pub struct Reassembler {
    buffers: HashMap<FragmentKey, FragmentBuffer>,
    buffer_ttl: Duration,
    max_buffers: usize,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reassembler {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_BUFFER_TTL, DEFAULT_MAX_BUFFERS)
    }

    pub fn with_limits(buffer_ttl: Duration, max_buffers: usize) -> Self {
        Self { buffers: HashMap::new(), buffer_ttl, max_buffers }
    }

    /// Decode one inbound frame.
    ///
    /// Returns `Ok(Some(packet))` for a complete packet, `Ok(None)`
    /// while awaiting further fragments, and an error for malformed
    /// data. Errors never disturb unrelated reassembly state.
    pub fn decode(&mut self, data: &[u8]) -> Result<Option<Packet>, WireError> {
        let frame = parse_frame(data)?;

        if !frame.packet_type.is_fragment() {
            return Ok(Some(packet_from_frame(frame, None)));
        }

        let key = (frame.sender_id, frame.timestamp);
        let now = Instant::now();

        if !self.buffers.contains_key(&key) && self.buffers.len() >= self.max_buffers {
            self.evict_stalest();
        }
        let buffer = self
            .buffers
            .entry(key)
            .or_insert_with(|| FragmentBuffer { data: Vec::new(), last_touched: now });
        buffer.data.extend_from_slice(&frame.payload);
        buffer.last_touched = now;

        if frame.packet_type == PacketType::FragmentEnd {
            let completed = self.buffers.remove(&key).map(|buffer| buffer.data);
            return Ok(Some(packet_from_frame(frame, completed)));
        }

        Ok(None)
    }

    /// Number of reassemblies currently in flight.
    pub fn pending(&self) -> usize {
        self.buffers.len()
    }

    /// Drop buffers idle past the configured TTL. Returns how many were
    /// evicted.
    pub fn evict_stale(&mut self) -> usize {
        match Instant::now().checked_sub(self.buffer_ttl) {
            Some(cutoff) => self.evict_older_than(cutoff),
            None => 0,
        }
    }

    /// Drop buffers last touched before `cutoff`.
    pub fn evict_older_than(&mut self, cutoff: Instant) -> usize {
        let before = self.buffers.len();
        self.buffers.retain(|_, buffer| buffer.last_touched >= cutoff);
        before - self.buffers.len()
    }

    fn evict_stalest(&mut self) {
        let stalest = self
            .buffers
            .iter()
            .min_by_key(|(_, buffer)| buffer.last_touched)
            .map(|(key, _)| *key);
        if let Some(key) = stalest {
            self.buffers.remove(&key);
        }
    }
}

fn packet_from_frame(frame: Frame, reassembled: Option<Vec<u8>>) -> Packet {
    let Frame { packet_type, sender_id, recipient_id, timestamp, ttl, payload, signature } =
        frame;
    Packet {
        version: crate::PROTOCOL_VERSION,
        packet_type,
        sender_id,
        recipient_id,
        timestamp,
        ttl,
        payload: reassembled.unwrap_or(payload),
        signature,
    }
}

#[cfg(test)]
mod tests {
    use super::Reassembler;
    use crate::packet::{Packet, PacketType};
    use crate::MAX_FRAGMENT_SIZE;
    use std::time::{Duration, Instant};

    fn fragmented_packet(payload_len: usize) -> Packet {
        let payload: Vec<u8> = (0..payload_len).map(|i| (i % 251) as u8).collect();
        Packet::new(
            PacketType::Message,
            *b"a1b2c3d4",
            None,
            1_700_000_000_000,
            5,
            payload,
        )
    }

    #[test]
    fn oversized_payload_fragments_and_reassembles() {
        let packet = fragmented_packet(5000);
        let frames = packet.encode();
        // Five 1000..1024-byte data chunks plus the end marker.
        assert_eq!(frames.len(), 6);

        let mut reassembler = Reassembler::new();
        for frame in &frames[..frames.len() - 1] {
            assert_eq!(reassembler.decode(frame).expect("decode"), None);
        }
        let decoded = reassembler
            .decode(&frames[frames.len() - 1])
            .expect("decode")
            .expect("complete");
        assert_eq!(decoded.packet_type, PacketType::FragmentEnd);
        assert_eq!(decoded.payload, packet.payload);
        assert_eq!(reassembler.pending(), 0);
    }

    #[test]
    fn fragment_chunks_respect_max_size() {
        let packet = fragmented_packet(5000);
        let frames = packet.encode();
        for frame in &frames {
            let payload_len = u16::from_be_bytes([frame[27], frame[28]]) as usize;
            assert!(payload_len <= MAX_FRAGMENT_SIZE);
        }
        // Last frame is the zero-length end marker.
        let end = frames.last().expect("end frame");
        assert_eq!(u16::from_be_bytes([end[27], end[28]]), 0);
        assert_eq!(end[1], PacketType::FragmentEnd as u8);
    }

    #[test]
    fn signature_rides_on_the_end_marker() {
        let mut packet = fragmented_packet(3000);
        packet.signature = Some([0x42; 64]);
        let frames = packet.encode();

        let mut reassembler = Reassembler::new();
        for frame in &frames[..frames.len() - 1] {
            assert_eq!(reassembler.decode(frame).expect("decode"), None);
        }
        let decoded = reassembler
            .decode(&frames[frames.len() - 1])
            .expect("decode")
            .expect("complete");
        assert_eq!(decoded.signature, Some([0x42; 64]));
        assert_eq!(decoded.payload, packet.payload);
    }

    #[test]
    fn dropped_middle_fragment_yields_short_payload() {
        let packet = fragmented_packet(5000);
        let frames = packet.encode();

        let mut reassembler = Reassembler::new();
        for (index, frame) in frames[..frames.len() - 1].iter().enumerate() {
            if index == 2 {
                continue; // lose one FragmentContinue
            }
            assert_eq!(reassembler.decode(frame).expect("decode"), None);
        }
        let decoded = reassembler
            .decode(&frames[frames.len() - 1])
            .expect("decode")
            .expect("complete");
        // The end marker still closes the buffer; the payload comes
        // back short, and integrity is the caller's problem.
        assert_eq!(decoded.payload.len(), packet.payload.len() - 1024);
        assert_ne!(decoded.payload, packet.payload);
    }

    #[test]
    fn interleaved_senders_do_not_collide() {
        let first = fragmented_packet(2500);
        let second = Packet { sender_id: *b"ffffffff", ..fragmented_packet(2500) };
        let first_frames = first.encode();
        let second_frames = second.encode();

        let mut reassembler = Reassembler::new();
        for (a, b) in first_frames.iter().zip(second_frames.iter()) {
            let _ = reassembler.decode(a).expect("decode");
            let last = reassembler.decode(b).expect("decode");
            if let Some(packet) = last {
                assert_eq!(packet.payload, second.payload);
            }
        }
    }

    #[test]
    fn stale_buffers_are_evicted() {
        let packet = fragmented_packet(3000);
        let frames = packet.encode();

        let mut reassembler = Reassembler::new();
        assert_eq!(reassembler.decode(&frames[0]).expect("decode"), None);
        assert_eq!(reassembler.pending(), 1);

        // A cutoff in the future ages out everything currently held.
        let evicted = reassembler.evict_older_than(Instant::now() + Duration::from_secs(1));
        assert_eq!(evicted, 1);
        assert_eq!(reassembler.pending(), 0);
    }

    #[test]
    fn capacity_cap_evicts_the_stalest_buffer() {
        let mut reassembler = Reassembler::with_limits(Duration::from_secs(30), 2);
        for (index, sender) in [b"aaaaaaaa", b"bbbbbbbb", b"cccccccc"].iter().enumerate() {
            let packet = Packet {
                sender_id: **sender,
                timestamp: 1_700_000_000_000 + index as i64,
                ..fragmented_packet(2500)
            };
            let frames = packet.encode();
            assert_eq!(reassembler.decode(&frames[0]).expect("decode"), None);
        }
        assert_eq!(reassembler.pending(), 2);
    }
}

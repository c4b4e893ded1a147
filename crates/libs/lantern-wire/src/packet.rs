//! Packet framing and fragmentation.
//!
//! A packet wraps an encoded message (or any raw payload) in the fixed
//! 29-byte header. Encoding consumes one TTL hop. Payloads over
//! [`MAX_FRAGMENT_SIZE`](crate::MAX_FRAGMENT_SIZE) are split into
//! bounded fragments closed by an explicit zero-length `FragmentEnd`
//! frame; the receiving side reassembles them with
//! [`Reassembler`](crate::fragment::Reassembler).

use crate::{
    BROADCAST_RECIPIENT, HEADER_SIZE, MAX_FRAGMENT_SIZE, PEER_ID_SIZE, PROTOCOL_VERSION,
    SIGNATURE_SIZE,
};

/// Errors from wire encode/decode operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("frame too short: {0} bytes (minimum {HEADER_SIZE})")]
    TooShort(usize),

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    #[error("unknown packet type: 0x{0:02x}")]
    UnknownPacketType(u8),

    #[error("truncated data: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("{field} is {len} bytes, over the length-prefix limit of {MAX_FIELD_SIZE}")]
    FieldTooLong { field: &'static str, len: usize },
}

/// Largest value a 2-byte length prefix can declare.
pub const MAX_FIELD_SIZE: usize = u16::MAX as usize;

/// Packet type byte.
///
/// `0x01-0x03` are reserved fragment markers; application types must
/// stay clear of that range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Message = 0x00,
    FragmentStart = 0x01,
    FragmentContinue = 0x02,
    FragmentEnd = 0x03,
    ChannelMessage = 0x04,
    DeliveryAck = 0x05,
    ReadReceipt = 0x06,
}

impl PacketType {
    pub fn from_byte(b: u8) -> Result<Self, WireError> {
        match b {
            0x00 => Ok(Self::Message),
            0x01 => Ok(Self::FragmentStart),
            0x02 => Ok(Self::FragmentContinue),
            0x03 => Ok(Self::FragmentEnd),
            0x04 => Ok(Self::ChannelMessage),
            0x05 => Ok(Self::DeliveryAck),
            0x06 => Ok(Self::ReadReceipt),
            _ => Err(WireError::UnknownPacketType(b)),
        }
    }

    pub fn is_fragment(&self) -> bool {
        matches!(self, Self::FragmentStart | Self::FragmentContinue | Self::FragmentEnd)
    }
}

/// A Lantern wire packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub version: u8,
    pub packet_type: PacketType,
    /// Self-asserted peer handle, zero-padded or truncated to 8 bytes.
    pub sender_id: [u8; PEER_ID_SIZE],
    /// All zeros means broadcast.
    pub recipient_id: [u8; PEER_ID_SIZE],
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Remaining hop budget. Zero after decode means do not relay.
    pub ttl: u8,
    pub payload: Vec<u8>,
    /// Optional detached 64-byte signature.
    pub signature: Option<[u8; SIGNATURE_SIZE]>,
}

impl Packet {
    pub fn new(
        packet_type: PacketType,
        sender_id: [u8; PEER_ID_SIZE],
        recipient_id: Option<[u8; PEER_ID_SIZE]>,
        timestamp: i64,
        ttl: u8,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            packet_type,
            sender_id,
            recipient_id: recipient_id.unwrap_or(BROADCAST_RECIPIENT),
            timestamp,
            ttl,
            payload,
            signature: None,
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.recipient_id == BROADCAST_RECIPIENT
    }

    /// Encode to one or more transport frames, consuming one TTL hop.
    ///
    /// TTL is clamped to at least 1 before the decrement, so the
    /// emitted value is the original minus one, never wrapping. A
    /// payload within [`MAX_FRAGMENT_SIZE`](crate::MAX_FRAGMENT_SIZE)
    /// produces a single frame of the packet's own type. Anything
    /// larger splits into `FragmentStart`/`FragmentContinue` chunks
    /// sharing this packet's sender, recipient, and timestamp, closed
    /// by a zero-length `FragmentEnd` frame that carries the signature
    /// when present.
    pub fn encode(&self) -> Vec<Vec<u8>> {
        let ttl = self.ttl.max(1) - 1;

        if self.payload.len() <= MAX_FRAGMENT_SIZE {
            return vec![self.frame(self.packet_type, ttl, &self.payload, self.signature)];
        }

        let mut frames = Vec::with_capacity(self.payload.len() / MAX_FRAGMENT_SIZE + 2);
        let mut fragment_type = PacketType::FragmentStart;
        for chunk in self.payload.chunks(MAX_FRAGMENT_SIZE) {
            frames.push(self.frame(fragment_type, ttl, chunk, None));
            fragment_type = PacketType::FragmentContinue;
        }
        frames.push(self.frame(PacketType::FragmentEnd, ttl, &[], self.signature));
        frames
    }

    fn frame(
        &self,
        packet_type: PacketType,
        ttl: u8,
        payload: &[u8],
        signature: Option<[u8; SIGNATURE_SIZE]>,
    ) -> Vec<u8> {
        let signature_len = signature.map_or(0, |_| SIGNATURE_SIZE);
        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len() + signature_len);
        buf.push(self.version);
        buf.push(packet_type as u8);
        buf.extend_from_slice(&self.sender_id);
        buf.extend_from_slice(&self.recipient_id);
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.push(ttl);
        buf.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        buf.extend_from_slice(payload);
        if let Some(signature) = signature {
            buf.extend_from_slice(&signature);
        }
        buf
    }
}

/// A single parsed frame, before fragment reassembly.
#[derive(Debug)]
pub(crate) struct Frame {
    pub packet_type: PacketType,
    pub sender_id: [u8; PEER_ID_SIZE],
    pub recipient_id: [u8; PEER_ID_SIZE],
    pub timestamp: i64,
    pub ttl: u8,
    pub payload: Vec<u8>,
    pub signature: Option<[u8; SIGNATURE_SIZE]>,
}

/// Parse one frame's header, payload, and optional trailing signature.
pub(crate) fn parse_frame(data: &[u8]) -> Result<Frame, WireError> {
    if data.len() < HEADER_SIZE {
        return Err(WireError::TooShort(data.len()));
    }

    let version = data[0];
    if version != PROTOCOL_VERSION {
        return Err(WireError::UnsupportedVersion(version));
    }
    let packet_type = PacketType::from_byte(data[1])?;

    let mut sender_id = [0u8; PEER_ID_SIZE];
    sender_id.copy_from_slice(&data[2..10]);
    let mut recipient_id = [0u8; PEER_ID_SIZE];
    recipient_id.copy_from_slice(&data[10..18]);

    let mut timestamp_bytes = [0u8; 8];
    timestamp_bytes.copy_from_slice(&data[18..26]);
    let timestamp = i64::from_be_bytes(timestamp_bytes);
    let ttl = data[26];
    let payload_len = u16::from_be_bytes([data[27], data[28]]) as usize;

    let payload_end = HEADER_SIZE + payload_len;
    if data.len() < payload_end {
        return Err(WireError::Truncated {
            needed: payload_len,
            available: data.len() - HEADER_SIZE,
        });
    }
    let payload = data[HEADER_SIZE..payload_end].to_vec();

    let signature = if data.len() - payload_end >= SIGNATURE_SIZE {
        let mut sig = [0u8; SIGNATURE_SIZE];
        sig.copy_from_slice(&data[payload_end..payload_end + SIGNATURE_SIZE]);
        Some(sig)
    } else {
        None
    };

    Ok(Frame { packet_type, sender_id, recipient_id, timestamp, ttl, payload, signature })
}

//! Delivery state machine and acknowledgment wire formats.

use std::collections::HashMap;

use lantern_wire::packet::MAX_FIELD_SIZE;
use lantern_wire::time::now_epoch_millis;
use lantern_wire::{DeliveryStatus, WireError};
use log::debug;
use rand_core::{OsRng, RngCore};

/// A delivery acknowledgment, sent back toward the original sender.
///
/// `hop_count` is the remaining relay distance when the ack was
/// produced; zero means the recipient itself acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryAck {
    pub id: String,
    pub message_id: String,
    pub recipient_id: String,
    pub nickname: String,
    pub hop_count: u8,
    pub timestamp: i64,
}

/// A read receipt from the peer that displayed the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadReceipt {
    pub message_id: String,
    pub reader_id: String,
    pub timestamp: i64,
}

impl DeliveryAck {
    /// Wire encoding: four length-prefixed strings (2-byte big-endian
    /// lengths), then `hop_count(1)` and `timestamp(8)`. A string too
    /// long for its prefix is an error, never a wrapped length.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut buf = Vec::new();
        put_string(&mut buf, "ack id", &self.id)?;
        put_string(&mut buf, "message id", &self.message_id)?;
        put_string(&mut buf, "recipient id", &self.recipient_id)?;
        put_string(&mut buf, "nickname", &self.nickname)?;
        buf.push(self.hop_count);
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        Ok(buf)
    }

    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        let mut pos = 0;
        let id = take_string(data, &mut pos)?;
        let message_id = take_string(data, &mut pos)?;
        let recipient_id = take_string(data, &mut pos)?;
        let nickname = take_string(data, &mut pos)?;
        let hop_count = take_byte(data, &mut pos)?;
        let timestamp = i64::from_be_bytes(take_array::<8>(data, &mut pos)?);
        Ok(Self { id, message_id, recipient_id, nickname, hop_count, timestamp })
    }
}

impl ReadReceipt {
    /// Wire encoding: two length-prefixed strings, then `timestamp(8)`.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut buf = Vec::new();
        put_string(&mut buf, "message id", &self.message_id)?;
        put_string(&mut buf, "reader id", &self.reader_id)?;
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        Ok(buf)
    }

    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        let mut pos = 0;
        let message_id = take_string(data, &mut pos)?;
        let reader_id = take_string(data, &mut pos)?;
        let timestamp = i64::from_be_bytes(take_array::<8>(data, &mut pos)?);
        Ok(Self { message_id, reader_id, timestamp })
    }
}

/// Tracks delivery state for messages this node sent.
///
/// Unknown message ids are never materialized: acks and receipts for
/// untracked messages are dropped, and [`status`](Self::status) reports
/// `Pending` for anything it has not seen.
#[derive(Default)]
pub struct DeliveryTracker {
    statuses: HashMap<String, DeliveryStatus>,
    acks: HashMap<String, Vec<DeliveryAck>>,
}

impl DeliveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin (or update) tracking of a message. Status never moves
    /// backward; a stale update is ignored.
    pub fn track_message(&mut self, message_id: &str, status: DeliveryStatus) {
        let entry = self.statuses.entry(message_id.to_string()).or_default();
        if status as u8 >= *entry as u8 {
            *entry = status;
        }
    }

    /// Same as [`track_message`](Self::track_message) but from the
    /// uppercase label spelling; unknown labels change nothing.
    pub fn track_message_label(&mut self, message_id: &str, label: &str) {
        if let Some(status) = DeliveryStatus::from_label(label) {
            self.track_message(message_id, status);
        }
    }

    /// Build an ack for a received message, with a fresh random id and
    /// the current time.
    pub fn generate_ack(
        &self,
        message_id: &str,
        recipient_id: &str,
        nickname: &str,
        hop_count: u8,
    ) -> DeliveryAck {
        let mut id_bytes = [0u8; 16];
        OsRng.fill_bytes(&mut id_bytes);
        DeliveryAck {
            id: hex::encode(id_bytes),
            message_id: message_id.to_string(),
            recipient_id: recipient_id.to_string(),
            nickname: nickname.to_string(),
            hop_count,
            timestamp: now_epoch_millis(),
        }
    }

    /// Record an inbound ack. Every ack for a tracked message is kept
    /// for observability, but only a terminal ack (`hop_count == 0`)
    /// advances the status to `Delivered`.
    pub fn process_ack(&mut self, ack: DeliveryAck) {
        if !self.statuses.contains_key(&ack.message_id) {
            debug!("dropping ack for untracked message {}", ack.message_id);
            return;
        }
        if ack.hop_count == 0 {
            self.track_message(&ack.message_id, DeliveryStatus::Delivered);
        }
        self.acks.entry(ack.message_id.clone()).or_default().push(ack);
    }

    /// Record a read receipt, advancing a tracked message to `Read`.
    pub fn process_read_receipt(&mut self, receipt: &ReadReceipt) {
        if !self.statuses.contains_key(&receipt.message_id) {
            debug!("dropping read receipt for untracked message {}", receipt.message_id);
            return;
        }
        self.track_message(&receipt.message_id, DeliveryStatus::Read);
    }

    /// Current status; `Pending` for anything untracked.
    pub fn status(&self, message_id: &str) -> DeliveryStatus {
        self.statuses.get(message_id).copied().unwrap_or_default()
    }

    /// All acks received for a message, in arrival order.
    pub fn acks(&self, message_id: &str) -> Vec<DeliveryAck> {
        self.acks.get(message_id).cloned().unwrap_or_default()
    }
}

fn put_string(buf: &mut Vec<u8>, field: &'static str, value: &str) -> Result<(), WireError> {
    let bytes = value.as_bytes();
    if bytes.len() > MAX_FIELD_SIZE {
        return Err(WireError::FieldTooLong { field, len: bytes.len() });
    }
    buf.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

fn take_bytes<'a>(data: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8], WireError> {
    let available = data.len() - *pos;
    if available < len {
        return Err(WireError::Truncated { needed: len, available });
    }
    let slice = &data[*pos..*pos + len];
    *pos += len;
    Ok(slice)
}

fn take_byte(data: &[u8], pos: &mut usize) -> Result<u8, WireError> {
    Ok(take_bytes(data, pos, 1)?[0])
}

fn take_array<const N: usize>(data: &[u8], pos: &mut usize) -> Result<[u8; N], WireError> {
    let mut out = [0u8; N];
    out.copy_from_slice(take_bytes(data, pos, N)?);
    Ok(out)
}

fn take_string(data: &[u8], pos: &mut usize) -> Result<String, WireError> {
    let len = u16::from_be_bytes(take_array::<2>(data, pos)?) as usize;
    let bytes = take_bytes(data, pos, len)?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

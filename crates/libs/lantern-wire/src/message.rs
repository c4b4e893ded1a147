//! Application message model and its binary envelope.
//!
//! The envelope deliberately carries only the fields a relaying peer
//! needs to render or forward a message: timestamp, three flags, the
//! recipient nickname, the sender peer id, and the padded content.
//! Everything else on [`Message`] (id, channel, mentions, encrypted
//! content, original sender) travels out of band in a higher-level
//! envelope and is left at its default by [`Message::decode`].

use crate::packet::{WireError, MAX_FIELD_SIZE};
use crate::padding;

/// Content is padded to this block boundary before length-prefixing.
const CONTENT_BLOCK_SIZE: usize = 256;

/// Fixed part of the envelope: timestamp(8) + flags(3) + three u16
/// length prefixes.
const ENVELOPE_MIN_SIZE: usize = 8 + 3 + 2;

/// Per-message delivery state, advanced by the delivery tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryStatus {
    #[default]
    Pending,
    Delivered,
    Read,
}

impl DeliveryStatus {
    /// Parse the uppercase wire/bridge spelling. Unknown strings are
    /// `None` so callers can ignore them without failing.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "PENDING" => Some(Self::Pending),
            "DELIVERED" => Some(Self::Delivered),
            "READ" => Some(Self::Read),
            _ => None,
        }
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Delivered => "DELIVERED",
            Self::Read => "READ",
        }
    }
}

/// A chat message as the application sees it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message {
    /// Opaque identifier, usually a UUID string.
    pub id: String,
    /// Display name of the sender.
    pub sender: String,
    /// Cleartext content. In transit for an encrypted message this is
    /// empty and `encrypted_content` carries the ciphertext.
    pub content: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Set when a peer forwards a message it did not originate.
    pub is_relay: bool,
    /// Display name of the originator when relayed.
    pub original_sender: Option<String>,
    pub is_private: bool,
    pub recipient_nickname: Option<String>,
    /// Self-asserted 8-byte peer handle, hex or ASCII.
    pub sender_peer_id: String,
    pub mentions: Vec<String>,
    /// Channel name (`#foo`) for channel-scoped messages.
    pub channel: Option<String>,
    pub encrypted_content: Option<Vec<u8>>,
    pub is_encrypted: bool,
    pub delivery_status: DeliveryStatus,
}

impl Message {
    /// Encode the envelope fields to wire bytes.
    ///
    /// Layout, all integers big-endian:
    ///
    /// ```text
    /// [timestamp:8][is_relay:1][is_private:1][is_encrypted:1]
    /// [nickname_len:2][nickname][peer_id_len:2][peer_id]
    /// [content_len:2][padded content]
    /// ```
    ///
    /// Content is padded to a 256-byte boundary first, so the length
    /// prefix never reveals the true content length.
    ///
    /// Any field whose byte length (after padding, for content) exceeds
    /// the 2-byte prefix is [`WireError::FieldTooLong`]; the prefix
    /// must never wrap.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let content_bytes = self.content.as_deref().unwrap_or_default().as_bytes();
        let padded_content = padding::pad(content_bytes, CONTENT_BLOCK_SIZE);
        check_field_len("content", padded_content.len())?;

        let nickname = self.recipient_nickname.as_deref().unwrap_or_default().as_bytes();
        check_field_len("recipient nickname", nickname.len())?;
        let peer_id = self.sender_peer_id.as_bytes();
        check_field_len("sender peer id", peer_id.len())?;

        let mut buf = Vec::with_capacity(
            ENVELOPE_MIN_SIZE + 4 + nickname.len() + peer_id.len() + padded_content.len(),
        );
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.push(u8::from(self.is_relay));
        buf.push(u8::from(self.is_private));
        buf.push(u8::from(self.is_encrypted));
        buf.extend_from_slice(&(nickname.len() as u16).to_be_bytes());
        buf.extend_from_slice(nickname);
        buf.extend_from_slice(&(peer_id.len() as u16).to_be_bytes());
        buf.extend_from_slice(peer_id);
        buf.extend_from_slice(&(padded_content.len() as u16).to_be_bytes());
        buf.extend_from_slice(&padded_content);
        Ok(buf)
    }

    /// Decode an envelope produced by [`Message::encode`].
    ///
    /// Every declared length is checked against the remaining buffer;
    /// a shortfall is [`WireError::Truncated`]. Fields outside the
    /// envelope come back as defaults.
    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        let mut reader = Reader::new(data);

        let timestamp = i64::from_be_bytes(reader.take_array::<8>()?);
        let is_relay = reader.take_byte()? == 1;
        let is_private = reader.take_byte()? == 1;
        let is_encrypted = reader.take_byte()? == 1;

        let nickname = reader.take_prefixed_string()?;
        let sender_peer_id = reader.take_prefixed_string()?.unwrap_or_default();

        let content_len = reader.take_u16()? as usize;
        if content_len == 0 {
            return Err(WireError::Truncated { needed: CONTENT_BLOCK_SIZE, available: 0 });
        }
        let padded_content = reader.take_bytes(content_len)?;
        let content = String::from_utf8_lossy(&padding::unpad(padded_content)).into_owned();

        Ok(Self {
            content: Some(content),
            timestamp,
            is_relay,
            is_private,
            recipient_nickname: nickname,
            sender_peer_id,
            is_encrypted,
            ..Self::default()
        })
    }
}

fn check_field_len(field: &'static str, len: usize) -> Result<(), WireError> {
    if len > MAX_FIELD_SIZE {
        return Err(WireError::FieldTooLong { field, len });
    }
    Ok(())
}

/// Positional reader over an envelope buffer. Every take checks the
/// remaining length so malformed input surfaces as an error, never a
/// slice panic.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take_bytes(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        let available = self.data.len() - self.pos;
        if available < len {
            return Err(WireError::Truncated { needed: len, available });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn take_byte(&mut self) -> Result<u8, WireError> {
        Ok(self.take_bytes(1)?[0])
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take_bytes(N)?);
        Ok(out)
    }

    fn take_u16(&mut self) -> Result<u16, WireError> {
        Ok(u16::from_be_bytes(self.take_array::<2>()?))
    }

    fn take_prefixed_string(&mut self) -> Result<Option<String>, WireError> {
        let len = self.take_u16()? as usize;
        if len == 0 {
            return Ok(None);
        }
        let bytes = self.take_bytes(len)?;
        Ok(Some(String::from_utf8_lossy(bytes).into_owned()))
    }
}

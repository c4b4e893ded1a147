//! Typed validation at the host-application boundary.
//!
//! The host app hands messages across as JSON. Rather than plucking
//! fields out of a loosely-typed map and defaulting whatever is
//! missing, the payload deserializes into a strict struct: absent or
//! mistyped required fields are a format error the host hears about.

use lantern_wire::{DeliveryStatus, Message};
use serde::Deserialize;

use crate::error::SessionError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BridgeMessage {
    id: String,
    sender: String,
    #[serde(default)]
    content: Option<String>,
    timestamp: i64,
    #[serde(default)]
    is_relay: bool,
    #[serde(default)]
    original_sender: Option<String>,
    #[serde(default)]
    is_private: bool,
    #[serde(default)]
    recipient_nickname: Option<String>,
    // The host spells the trailing abbreviation fully uppercased,
    // which camelCase renaming would miss.
    #[serde(rename = "senderPeerID")]
    sender_peer_id: String,
    #[serde(default)]
    mentions: Vec<String>,
    #[serde(default)]
    channel: Option<String>,
    /// Hex-encoded ciphertext.
    #[serde(default)]
    encrypted_content: Option<String>,
    #[serde(default)]
    is_encrypted: bool,
    #[serde(default)]
    delivery_status: Option<String>,
}

/// Parse a host-app message. `id`, `sender`, `timestamp`, and
/// `senderPeerID` are required; optional fields default.
pub fn parse_bridge_message(json: &str) -> Result<Message, SessionError> {
    let bridge: BridgeMessage =
        serde_json::from_str(json).map_err(|e| SessionError::Bridge(e.to_string()))?;

    let encrypted_content = match bridge.encrypted_content {
        Some(encoded) => Some(
            hex::decode(&encoded)
                .map_err(|e| SessionError::Bridge(format!("encryptedContent: {e}")))?,
        ),
        None => None,
    };

    Ok(Message {
        id: bridge.id,
        sender: bridge.sender,
        content: bridge.content,
        timestamp: bridge.timestamp,
        is_relay: bridge.is_relay,
        original_sender: bridge.original_sender,
        is_private: bridge.is_private,
        recipient_nickname: bridge.recipient_nickname,
        sender_peer_id: bridge.sender_peer_id,
        mentions: bridge.mentions,
        channel: bridge.channel,
        encrypted_content,
        is_encrypted: bridge.is_encrypted,
        delivery_status: bridge
            .delivery_status
            .as_deref()
            .and_then(DeliveryStatus::from_label)
            .unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::parse_bridge_message;
    use crate::error::SessionError;
    use lantern_wire::DeliveryStatus;

    #[test]
    fn full_message_parses() {
        // Channel names contain `"#`, so the raw string needs the
        // doubled delimiter.
        let json = r##"{
            "id": "6f2c9a1e",
            "sender": "alice",
            "content": "hello",
            "timestamp": 1700000000123,
            "isPrivate": true,
            "recipientNickname": "bob",
            "senderPeerID": "a1b2c3d4",
            "mentions": ["bob"],
            "channel": "#mesh",
            "deliveryStatus": "DELIVERED"
        }"##;
        let message = parse_bridge_message(json).expect("parse");
        assert_eq!(message.id, "6f2c9a1e");
        assert_eq!(message.sender_peer_id, "a1b2c3d4");
        assert_eq!(message.channel.as_deref(), Some("#mesh"));
        assert_eq!(message.delivery_status, DeliveryStatus::Delivered);
    }

    #[test]
    fn missing_required_field_is_a_format_error() {
        let json = r#"{"id": "1", "sender": "alice", "timestamp": 0}"#;
        assert!(matches!(parse_bridge_message(json), Err(SessionError::Bridge(_))));
    }

    #[test]
    fn mistyped_field_is_a_format_error() {
        let json = r#"{
            "id": "1", "sender": "alice", "timestamp": "yesterday",
            "senderPeerID": "a1b2c3d4"
        }"#;
        assert!(matches!(parse_bridge_message(json), Err(SessionError::Bridge(_))));
    }

    #[test]
    fn optional_fields_default() {
        let json = r#"{
            "id": "1", "sender": "alice", "timestamp": 5,
            "senderPeerID": "a1b2c3d4"
        }"#;
        let message = parse_bridge_message(json).expect("parse");
        assert!(!message.is_relay);
        assert!(message.mentions.is_empty());
        assert_eq!(message.delivery_status, DeliveryStatus::Pending);
    }

    #[test]
    fn peer_id_field_requires_the_host_spelling() {
        // The host capitalizes the ID abbreviation; plain camelCase is
        // not accepted.
        let json = r#"{
            "id": "1", "sender": "alice", "timestamp": 5,
            "senderPeerId": "a1b2c3d4"
        }"#;
        assert!(matches!(parse_bridge_message(json), Err(SessionError::Bridge(_))));
    }

    #[test]
    fn encrypted_content_decodes_from_hex() {
        let json = r#"{
            "id": "1", "sender": "alice", "timestamp": 5,
            "senderPeerID": "a1b2c3d4",
            "isEncrypted": true, "encryptedContent": "deadbeef"
        }"#;
        let message = parse_bridge_message(json).expect("parse");
        assert_eq!(message.encrypted_content, Some(vec![0xde, 0xad, 0xbe, 0xef]));
    }

    #[test]
    fn bad_hex_ciphertext_is_rejected() {
        let json = r#"{
            "id": "1", "sender": "alice", "timestamp": 5,
            "senderPeerID": "a1b2c3d4", "encryptedContent": "zzzz"
        }"#;
        assert!(matches!(parse_bridge_message(json), Err(SessionError::Bridge(_))));
    }
}

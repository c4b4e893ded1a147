//! # lantern-wire
//!
//! Binary wire formats for the Lantern mesh chat protocol.
//!
//! This crate implements the byte-exact formats every Lantern node must
//! agree on bit-for-bit: the content padding scheme, the application
//! message envelope, and the packet framing with fragmentation for
//! size-constrained broadcast transports. All multi-byte integers are
//! big-endian on the wire.
//!
//! ## Packet header (29 bytes)
//!
//! ```text
//! [version:1][type:1][sender_id:8][recipient_id:8][timestamp:8][ttl:1][payload_len:2]
//! ```
//!
//! followed by `payload_len` payload bytes and an optional trailing
//! 64-byte signature.
//!
//! ## Example
//!
//! ```rust
//! use lantern_wire::{Packet, PacketType, Reassembler, PROTOCOL_VERSION};
//!
//! let packet = Packet::new(PacketType::Message, *b"alice\0\0\0", None, 1_700_000_000_000, 5, b"hi".to_vec());
//! let frames = packet.encode();
//! let mut reassembler = Reassembler::new();
//! let decoded = reassembler.decode(&frames[0]).unwrap().unwrap();
//! assert_eq!(decoded.payload, b"hi");
//! assert_eq!(decoded.ttl, 4);
//! ```
//!
//! ## Crate Family
//!
//! This crate is part of the lantern-rs workspace:
//!
//! - **`lantern-wire`** (this crate) — wire formats and reassembly
//! - `lantern-channel` — channel membership and key commitments
//! - `lantern-delivery` — delivery acknowledgment tracking
//! - `lantern-session` — async session runtime over a transport

pub mod fragment;
pub mod message;
pub mod packet;
pub mod padding;
pub mod time;

pub use fragment::Reassembler;
pub use message::{DeliveryStatus, Message};
pub use packet::{Packet, PacketType, WireError};

/// Current wire protocol version. Decoders reject anything else.
pub const PROTOCOL_VERSION: u8 = 1;

/// Fixed packet header size in bytes.
pub const HEADER_SIZE: usize = 29;

/// Maximum payload carried by a single frame; larger payloads fragment.
pub const MAX_FRAGMENT_SIZE: usize = 1024;

/// Ed25519-style detached signature length.
pub const SIGNATURE_SIZE: usize = 64;

/// Fixed width of sender and recipient identifiers.
pub const PEER_ID_SIZE: usize = 8;

/// All-zero recipient meaning "deliver to every reachable peer".
pub const BROADCAST_RECIPIENT: [u8; PEER_ID_SIZE] = [0u8; PEER_ID_SIZE];

//! # lantern-delivery
//!
//! Delivery-acknowledgment tracking for Lantern messages.
//!
//! The tracker runs the per-message state machine
//! `PENDING → DELIVERED → READ` — forward only — and aggregates every
//! acknowledgment seen for a message, including relayed ones that do
//! not advance state. A Bloom-filter dedup set lets relay logic drop
//! packets it has already seen without storing every id.

pub mod dedup;
pub mod tracker;

pub use dedup::BloomFilter;
pub use tracker::{DeliveryAck, DeliveryTracker, ReadReceipt};

//! # lantern-channel
//!
//! Channel membership and the cryptographic commitment scheme for
//! password-protected Lantern channels.
//!
//! A channel key is derived from the human password with PBKDF2 and
//! committed to with SHA-256, so a peer can verify a candidate password
//! yields the right key without the key or password ever crossing the
//! network. Membership is process-local: each node tracks only which
//! channels it has joined.
//!
//! All failures — bad channel names, wrong passwords, non-creator
//! permission checks — come back as [`ChannelError`] values. Nothing in
//! this crate panics on untrusted input.

pub mod command;
pub mod keys;
pub mod keystore;
pub mod store;

pub use keys::{derive_channel_key, key_commitment, CHANNEL_KEY_SIZE};
pub use keystore::{InMemoryKeyStore, KeyStoreBackend};
pub use store::{ChannelError, ChannelStore};

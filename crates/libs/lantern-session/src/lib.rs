//! # lantern-session
//!
//! Async session runtime tying the Lantern codecs and stores to a byte
//! transport.
//!
//! The transport (BLE scanning, advertising, connections) lives outside
//! this workspace; it hands raw frames in and takes raw frames out. The
//! session owns the mutable protocol state — fragment reassembly,
//! channel membership, delivery tracking — behind mutexes so the
//! transport's delivery thread and the application's send path never
//! race. The deliberately slow channel-key derivation runs on the
//! blocking pool, off the packet paths.

pub mod bridge;
pub mod error;
pub mod session;
pub mod transport;

pub use bridge::parse_bridge_message;
pub use error::SessionError;
pub use session::{Session, SessionConfig, SessionEvent};
pub use transport::Transport;

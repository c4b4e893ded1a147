use lantern_channel::ChannelError;
use lantern_wire::WireError;

/// Session-layer failures. Codec errors on inbound frames are handled
/// internally (a malformed frame is routine on a broadcast medium) and
/// never surface through this type.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("transport send failed: {0}")]
    Transport(String),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("invalid bridge message: {0}")]
    Bridge(String),

    #[error("shared state lock poisoned")]
    Poisoned,

    #[error("background task failed: {0}")]
    Task(String),
}

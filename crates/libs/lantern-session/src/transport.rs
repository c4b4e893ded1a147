//! Seam to the external broadcast transport.

use crate::error::SessionError;

/// One-way frame sink implemented by the host transport layer.
///
/// The session knows nothing about discovery, connections, or retry;
/// it only asks for frames to be put on the air. Inbound bytes come
/// back through [`Session::handle_bytes`](crate::Session::handle_bytes)
/// on whatever thread the transport delivers on.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send_bytes(&self, frame: &[u8]) -> Result<(), SessionError>;
}

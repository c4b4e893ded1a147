//! The protocol session: shared state, send/receive paths, eviction.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use lantern_channel::{ChannelStore, KeyStoreBackend};
use lantern_delivery::{DeliveryAck, DeliveryTracker, ReadReceipt};
use lantern_wire::{
    DeliveryStatus, Message, Packet, PacketType, Reassembler, PEER_ID_SIZE,
};
use log::debug;

use crate::error::SessionError;
use crate::transport::Transport;

/// Tunables for a session. Defaults match the protocol's on-air
/// behavior: five-hop TTL, 30-second reassembly windows.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Hop budget stamped on outbound packets.
    pub default_ttl: u8,
    /// How long an incomplete reassembly may sit idle.
    pub reassembly_ttl: Duration,
    /// Concurrent reassembly cap.
    pub max_reassemblies: usize,
    /// Cadence of the background eviction sweep.
    pub eviction_period: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_ttl: 5,
            reassembly_ttl: Duration::from_secs(30),
            max_reassemblies: 64,
            eviction_period: Duration::from_secs(10),
        }
    }
}

/// A decoded inbound event, handed to the host application.
#[derive(Debug)]
pub enum SessionEvent {
    Message(Message),
    Ack(DeliveryAck),
    ReadReceipt(ReadReceipt),
}

/// One node's protocol session.
///
/// Owns the mutable protocol state behind mutexes: the transport's
/// delivery callback and the application's send path may run on
/// different threads. Codec calls themselves are pure and complete
/// without suspension; the only deliberately slow operation, channel
/// key derivation, is pushed to the blocking pool by
/// [`join_channel`](Self::join_channel) and
/// [`create_channel`](Self::create_channel).
pub struct Session<T, B: KeyStoreBackend> {
    transport: Arc<T>,
    local_peer_id: [u8; PEER_ID_SIZE],
    config: SessionConfig,
    reassembler: Arc<Mutex<Reassembler>>,
    channels: Arc<Mutex<ChannelStore<B>>>,
    tracker: Arc<Mutex<DeliveryTracker>>,
}

impl<T, B> Session<T, B>
where
    T: Transport,
    B: KeyStoreBackend + Send + 'static,
{
    pub fn new(transport: T, local_peer_id: [u8; PEER_ID_SIZE], keystore: B) -> Self {
        Self::with_config(transport, local_peer_id, keystore, SessionConfig::default())
    }

    pub fn with_config(
        transport: T,
        local_peer_id: [u8; PEER_ID_SIZE],
        keystore: B,
        config: SessionConfig,
    ) -> Self {
        let reassembler =
            Reassembler::with_limits(config.reassembly_ttl, config.max_reassemblies);
        Self {
            transport: Arc::new(transport),
            local_peer_id,
            config,
            reassembler: Arc::new(Mutex::new(reassembler)),
            channels: Arc::new(Mutex::new(ChannelStore::new(keystore))),
            tracker: Arc::new(Mutex::new(DeliveryTracker::new())),
        }
    }

    /// Encode and transmit a message. `None` recipient broadcasts.
    ///
    /// The message starts tracking as `Pending`; acknowledgments coming
    /// back through [`handle_bytes`](Self::handle_bytes) advance it.
    pub async fn send_message(
        &self,
        message: &Message,
        recipient: Option<[u8; PEER_ID_SIZE]>,
    ) -> Result<(), SessionError> {
        let packet_type = if message.channel.is_some() {
            PacketType::ChannelMessage
        } else {
            PacketType::Message
        };
        let packet = Packet::new(
            packet_type,
            self.local_peer_id,
            recipient,
            message.timestamp,
            self.config.default_ttl,
            message.encode()?,
        );

        if !message.id.is_empty() {
            lock(&self.tracker)?.track_message(&message.id, DeliveryStatus::Pending);
        }
        self.send_frames(packet).await
    }

    /// Transmit a delivery acknowledgment back into the mesh.
    pub async fn send_ack(&self, ack: &DeliveryAck) -> Result<(), SessionError> {
        let packet = Packet::new(
            PacketType::DeliveryAck,
            self.local_peer_id,
            None,
            ack.timestamp,
            self.config.default_ttl,
            ack.encode()?,
        );
        self.send_frames(packet).await
    }

    /// Transmit a read receipt back into the mesh.
    pub async fn send_read_receipt(&self, receipt: &ReadReceipt) -> Result<(), SessionError> {
        let packet = Packet::new(
            PacketType::ReadReceipt,
            self.local_peer_id,
            None,
            receipt.timestamp,
            self.config.default_ttl,
            receipt.encode()?,
        );
        self.send_frames(packet).await
    }

    /// Feed one raw inbound frame from the transport.
    ///
    /// Malformed frames are routine on a lossy broadcast medium: they
    /// are logged and swallowed, yielding `Ok(None)` exactly like a
    /// fragment still awaiting its siblings. `Err` is reserved for
    /// session-level faults, not bad peer data.
    pub fn handle_bytes(&self, data: &[u8]) -> Result<Option<SessionEvent>, SessionError> {
        let decoded = match lock(&self.reassembler)?.decode(data) {
            Ok(decoded) => decoded,
            Err(error) => {
                debug!("discarding malformed frame: {error}");
                return Ok(None);
            }
        };
        let Some(packet) = decoded else {
            return Ok(None);
        };

        match packet.packet_type {
            // A reassembled payload comes back on a FragmentEnd packet;
            // the wire format does not preserve the original type, so
            // completed reassemblies are treated as messages.
            PacketType::Message | PacketType::ChannelMessage | PacketType::FragmentEnd => {
                match Message::decode(&packet.payload) {
                    Ok(message) => {
                        lock(&self.channels)?.receive_message(&message);
                        Ok(Some(SessionEvent::Message(message)))
                    }
                    Err(error) => {
                        debug!("discarding undecodable message payload: {error}");
                        Ok(None)
                    }
                }
            }
            PacketType::DeliveryAck => match DeliveryAck::decode(&packet.payload) {
                Ok(ack) => {
                    lock(&self.tracker)?.process_ack(ack.clone());
                    Ok(Some(SessionEvent::Ack(ack)))
                }
                Err(error) => {
                    debug!("discarding undecodable ack: {error}");
                    Ok(None)
                }
            },
            PacketType::ReadReceipt => match ReadReceipt::decode(&packet.payload) {
                Ok(receipt) => {
                    lock(&self.tracker)?.process_read_receipt(&receipt);
                    Ok(Some(SessionEvent::ReadReceipt(receipt)))
                }
                Err(error) => {
                    debug!("discarding undecodable read receipt: {error}");
                    Ok(None)
                }
            },
            // The reassembler returns these as incomplete.
            PacketType::FragmentStart | PacketType::FragmentContinue => Ok(None),
        }
    }

    /// Create a channel. Key derivation for protected channels runs on
    /// the blocking pool.
    pub async fn create_channel(
        &self,
        name: &str,
        password: Option<String>,
        creator_id: &str,
    ) -> Result<(), SessionError> {
        let channels = Arc::clone(&self.channels);
        let name = name.to_string();
        let creator = creator_id.to_string();
        run_blocking(move || {
            let mut store = channels.lock().map_err(|_| SessionError::Poisoned)?;
            store.create_channel(&name, password.as_deref(), &creator)?;
            Ok(())
        })
        .await
    }

    /// Join a channel, deriving and verifying the key off the packet
    /// paths when a password is involved.
    pub async fn join_channel(
        &self,
        name: &str,
        password: Option<String>,
        peer_id: &str,
    ) -> Result<(), SessionError> {
        let channels = Arc::clone(&self.channels);
        let name = name.to_string();
        let peer = peer_id.to_string();
        run_blocking(move || {
            let mut store = channels.lock().map_err(|_| SessionError::Poisoned)?;
            store.join_channel(&name, password.as_deref(), &peer)?;
            Ok(())
        })
        .await
    }

    /// Run `f` with exclusive access to the channel store.
    pub fn with_channels<R>(
        &self,
        f: impl FnOnce(&mut ChannelStore<B>) -> R,
    ) -> Result<R, SessionError> {
        Ok(f(&mut *lock(&self.channels)?))
    }

    /// Run `f` with exclusive access to the delivery tracker.
    pub fn with_tracker<R>(
        &self,
        f: impl FnOnce(&mut DeliveryTracker) -> R,
    ) -> Result<R, SessionError> {
        Ok(f(&mut *lock(&self.tracker)?))
    }

    /// Reassemblies currently awaiting fragments.
    pub fn pending_reassemblies(&self) -> Result<usize, SessionError> {
        Ok(lock(&self.reassembler)?.pending())
    }

    /// Start the periodic sweep that drops reassemblies which never saw
    /// their end marker. The task runs until the handle is aborted.
    pub fn spawn_eviction(&self) -> tokio::task::JoinHandle<()> {
        let reassembler = Arc::clone(&self.reassembler);
        let period = self.config.eviction_period;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if let Ok(mut guard) = reassembler.lock() {
                    let evicted = guard.evict_stale();
                    if evicted > 0 {
                        debug!("evicted {evicted} stale reassembly buffers");
                    }
                }
            }
        })
    }

    async fn send_frames(&self, packet: Packet) -> Result<(), SessionError> {
        for frame in packet.encode() {
            self.transport.send_bytes(&frame).await?;
        }
        Ok(())
    }
}

fn lock<S>(mutex: &Mutex<S>) -> Result<MutexGuard<'_, S>, SessionError> {
    mutex.lock().map_err(|_| SessionError::Poisoned)
}

async fn run_blocking<F>(f: F) -> Result<(), SessionError>
where
    F: FnOnce() -> Result<(), SessionError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|error| SessionError::Task(error.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::{Session, SessionConfig, SessionEvent};
    use crate::error::SessionError;
    use crate::transport::Transport;
    use lantern_channel::InMemoryKeyStore;
    use lantern_wire::{DeliveryStatus, Message};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Captures outbound frames instead of putting them on the air.
    #[derive(Default)]
    struct MockTransport {
        frames: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait::async_trait]
    impl Transport for Arc<MockTransport> {
        async fn send_bytes(&self, frame: &[u8]) -> Result<(), SessionError> {
            self.frames
                .lock()
                .map_err(|_| SessionError::Poisoned)?
                .push(frame.to_vec());
            Ok(())
        }
    }

    fn session_pair() -> (
        Arc<MockTransport>,
        Session<Arc<MockTransport>, InMemoryKeyStore>,
        Session<Arc<MockTransport>, InMemoryKeyStore>,
    ) {
        let air = Arc::new(MockTransport::default());
        let sender = Session::new(Arc::clone(&air), *b"a1b2c3d4", InMemoryKeyStore::new());
        let receiver = Session::new(Arc::clone(&air), *b"e5f6a7b8", InMemoryKeyStore::new());
        (air, sender, receiver)
    }

    fn sample_message(content: &str) -> Message {
        Message {
            id: "m1".into(),
            sender: "alice".into(),
            content: Some(content.into()),
            timestamp: 1_700_000_000_000,
            sender_peer_id: "a1b2c3d4".into(),
            ..Message::default()
        }
    }

    fn captured_frames(air: &MockTransport) -> Vec<Vec<u8>> {
        air.frames.lock().expect("frames lock").clone()
    }

    #[tokio::test]
    async fn message_travels_sender_to_receiver() {
        let (air, sender, receiver) = session_pair();
        sender.send_message(&sample_message("hello mesh"), None).await.expect("send");

        let frames = captured_frames(&air);
        assert_eq!(frames.len(), 1);
        let event = receiver.handle_bytes(&frames[0]).expect("handle").expect("event");
        match event {
            SessionEvent::Message(message) => {
                assert_eq!(message.content.as_deref(), Some("hello mesh"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn oversized_message_fragments_on_the_air() {
        let (air, sender, receiver) = session_pair();
        sender
            .send_message(&sample_message(&"x".repeat(5000)), None)
            .await
            .expect("send");

        let frames = captured_frames(&air);
        assert!(frames.len() >= 6, "expected fragments, got {}", frames.len());

        let mut completed = None;
        for frame in &frames {
            if let Some(event) = receiver.handle_bytes(frame).expect("handle") {
                completed = Some(event);
            }
        }
        match completed.expect("reassembled event") {
            SessionEvent::Message(message) => {
                assert_eq!(message.content.as_deref(), Some("x".repeat(5000).as_str()));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn terminal_ack_marks_the_message_delivered() {
        let (air, sender, receiver) = session_pair();
        sender.send_message(&sample_message("hello"), None).await.expect("send");
        assert_eq!(
            sender.with_tracker(|t| t.status("m1")).expect("tracker"),
            DeliveryStatus::Pending
        );

        let ack = receiver
            .with_tracker(|t| t.generate_ack("m1", "e5f6a7b8", "bob", 0))
            .expect("tracker");
        let before = captured_frames(&air).len();
        receiver.send_ack(&ack).await.expect("send ack");

        let frames = captured_frames(&air);
        let event = sender.handle_bytes(&frames[before]).expect("handle").expect("event");
        assert!(matches!(event, SessionEvent::Ack(_)));
        assert_eq!(
            sender.with_tracker(|t| t.status("m1")).expect("tracker"),
            DeliveryStatus::Delivered
        );
    }

    #[tokio::test]
    async fn read_receipt_marks_the_message_read() {
        let (air, sender, receiver) = session_pair();
        sender.send_message(&sample_message("hello"), None).await.expect("send");

        let receipt = lantern_delivery::ReadReceipt {
            message_id: "m1".into(),
            reader_id: "e5f6a7b8".into(),
            timestamp: 1_700_000_000_500,
        };
        let before = captured_frames(&air).len();
        receiver.send_read_receipt(&receipt).await.expect("send receipt");

        let frames = captured_frames(&air);
        sender.handle_bytes(&frames[before]).expect("handle").expect("event");
        assert_eq!(
            sender.with_tracker(|t| t.status("m1")).expect("tracker"),
            DeliveryStatus::Read
        );
    }

    #[tokio::test]
    async fn malformed_frames_are_swallowed() {
        let (_, _, receiver) = session_pair();
        assert!(receiver.handle_bytes(&[0u8; 4]).expect("handle").is_none());
        let mut junk = vec![0u8; 64];
        junk[0] = 99; // bad version
        assert!(receiver.handle_bytes(&junk).expect("handle").is_none());
    }

    #[tokio::test]
    async fn channel_join_runs_off_the_async_path() {
        let (_, sender, _) = session_pair();
        sender
            .create_channel("#secure", Some("hunter2".into()), "a1b2c3d4")
            .await
            .expect("create");
        assert!(sender.with_channels(|c| c.is_member("#secure")).expect("channels"));

        let (_, other, _) = session_pair();
        other.join_channel("#open", None, "e5f6a7b8").await.expect("join");
        assert!(other.with_channels(|c| c.is_member("#open")).expect("channels"));
    }

    #[tokio::test]
    async fn eviction_task_drops_stalled_reassemblies() {
        let air = Arc::new(MockTransport::default());
        let config = SessionConfig {
            reassembly_ttl: Duration::from_millis(5),
            eviction_period: Duration::from_millis(10),
            ..SessionConfig::default()
        };
        let receiver = Session::with_config(
            Arc::clone(&air),
            *b"e5f6a7b8",
            InMemoryKeyStore::new(),
            config,
        );

        let sender = Session::new(Arc::clone(&air), *b"a1b2c3d4", InMemoryKeyStore::new());
        sender
            .send_message(&sample_message(&"x".repeat(5000)), None)
            .await
            .expect("send");
        let frames = captured_frames(&air);
        // Only the first fragment arrives; the rest are lost.
        assert!(receiver.handle_bytes(&frames[0]).expect("handle").is_none());
        assert_eq!(receiver.pending_reassemblies().expect("pending"), 1);

        let sweeper = receiver.spawn_eviction();
        tokio::time::sleep(Duration::from_millis(60)).await;
        sweeper.abort();
        assert_eq!(receiver.pending_reassemblies().expect("pending"), 0);
    }
}

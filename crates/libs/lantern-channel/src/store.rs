//! Channel membership and key state, owned by one store instance.

use std::collections::{HashMap, HashSet};

use lantern_wire::time::now_epoch_millis;
use lantern_wire::{DeliveryStatus, Message};
use log::{debug, warn};
use zeroize::Zeroizing;

use crate::keys::{derive_channel_key, key_commitment, CHANNEL_KEY_SIZE};
use crate::keystore::KeyStoreBackend;

/// Channel-layer failures. All recoverable; the caller decides whether
/// to log, retry, or surface to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("invalid channel name: {0:?}")]
    InvalidName(String),

    #[error("incorrect password for {0}")]
    WrongPassword(String),

    #[error("key commitment verification failed for {0}")]
    CommitmentMismatch(String),

    #[error("only the creator may modify {0}")]
    NotCreator(String),

    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    #[error("key storage backend failure")]
    KeyStore,
}

struct ChannelRecord {
    creator: String,
    password: Option<String>,
    key: Option<Zeroizing<[u8; CHANNEL_KEY_SIZE]>>,
    commitment: Option<[u8; 32]>,
}

impl ChannelRecord {
    fn is_protected(&self) -> bool {
        self.password.is_some()
    }
}

/// Process-local channel state: which channels this node has joined,
/// their keys and commitments, and the creator-gated password
/// operations. Derived keys are written through the injected
/// [`KeyStoreBackend`] under `channel_<name>`.
///
/// The store is plain mutable state; callers sharing it across threads
/// serialize access behind a mutex (see `lantern-session`).
pub struct ChannelStore<B: KeyStoreBackend> {
    records: HashMap<String, ChannelRecord>,
    joined: HashSet<String>,
    current_channel: Option<String>,
    system_messages: Vec<Message>,
    keystore: B,
}

impl<B: KeyStoreBackend> ChannelStore<B> {
    pub fn new(keystore: B) -> Self {
        Self {
            records: HashMap::new(),
            joined: HashSet::new(),
            current_channel: None,
            system_messages: Vec::new(),
            keystore,
        }
    }

    /// Create a channel, optionally password-protected. A no-op when
    /// this node already joined it.
    pub fn create_channel(
        &mut self,
        name: &str,
        password: Option<&str>,
        creator_id: &str,
    ) -> Result<(), ChannelError> {
        validate_channel_name(name)?;
        if self.joined.contains(name) {
            return Ok(());
        }

        let mut record = ChannelRecord {
            creator: creator_id.to_string(),
            password: None,
            key: None,
            commitment: None,
        };
        let protected = matches!(password, Some(p) if !p.is_empty());
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            self.install_key(&mut record, name, password)?;
        }
        self.records.insert(name.to_string(), record);
        self.joined.insert(name.to_string());
        self.current_channel = Some(name.to_string());

        if protected {
            self.push_system_message(format!("Channel {name} created with password protection."));
        } else {
            self.push_system_message(format!("Channel {name} created."));
        }
        Ok(())
    }

    /// Join a channel, presenting a password when it is protected.
    ///
    /// Membership is granted only when the password matches and the
    /// derived key verifies against the stored commitment; a failure
    /// leaves membership and key state untouched.
    pub fn join_channel(
        &mut self,
        name: &str,
        password: Option<&str>,
        peer_id: &str,
    ) -> Result<(), ChannelError> {
        validate_channel_name(name)?;
        if self.joined.contains(name) {
            self.current_channel = Some(name.to_string());
            return Ok(());
        }

        if let Some(record) = self.records.get(name) {
            if record.is_protected() {
                if record.password.as_deref() != password.filter(|p| !p.is_empty()) {
                    warn!("rejected join of {name}: wrong password");
                    return Err(ChannelError::WrongPassword(name.to_string()));
                }
                let candidate = derive_channel_key(
                    password.unwrap_or_default(),
                    name,
                );
                if !self.verify_commitment(name, candidate.as_ref()) {
                    warn!("rejected join of {name}: commitment mismatch");
                    return Err(ChannelError::CommitmentMismatch(name.to_string()));
                }
                self.keystore.store_key(candidate.as_ref(), &key_identifier(name))?;
                if let Some(record) = self.records.get_mut(name) {
                    record.key = Some(candidate);
                }
            }
        }

        self.joined.insert(name.to_string());
        self.current_channel = Some(name.to_string());
        self.push_system_message(format!("{peer_id} joined {name}"));
        Ok(())
    }

    /// Set or replace the channel password. Creator only.
    pub fn set_channel_password(
        &mut self,
        name: &str,
        password: &str,
        peer_id: &str,
    ) -> Result<(), ChannelError> {
        self.require_creator(name, peer_id)?;
        let mut record = self.records.remove(name).ok_or_else(|| {
            ChannelError::UnknownChannel(name.to_string())
        })?;
        let result = self.install_key(&mut record, name, password);
        self.records.insert(name.to_string(), record);
        result?;
        self.push_system_message(format!("Password set for {name}"));
        Ok(())
    }

    /// Drop password protection and forget the key. Creator only.
    pub fn remove_channel_password(
        &mut self,
        name: &str,
        peer_id: &str,
    ) -> Result<(), ChannelError> {
        self.require_creator(name, peer_id)?;
        if let Some(record) = self.records.get_mut(name) {
            record.password = None;
            record.key = None;
            record.commitment = None;
        }
        self.keystore.delete_key(&key_identifier(name))?;
        self.push_system_message(format!("Password removed from {name}"));
        Ok(())
    }

    /// Hand the creator role to another peer. Creator only.
    pub fn transfer_ownership(
        &mut self,
        name: &str,
        new_owner_id: &str,
        peer_id: &str,
    ) -> Result<(), ChannelError> {
        self.require_creator(name, peer_id)?;
        if let Some(record) = self.records.get_mut(name) {
            record.creator = new_owner_id.to_string();
        }
        self.push_system_message(format!("Ownership of {name} transferred to {new_owner_id}"));
        Ok(())
    }

    /// Route an inbound channel-scoped message. Messages for channels
    /// this node has not joined are dropped silently; encrypted
    /// messages are only acknowledged when the held key still verifies
    /// against the commitment.
    pub fn receive_message(&mut self, message: &Message) {
        let Some(channel) = message.channel.as_deref() else {
            return;
        };
        if !self.joined.contains(channel) {
            debug!("dropping message for unjoined channel {channel}");
            return;
        }

        if message.is_encrypted {
            let verified = self
                .records
                .get(channel)
                .and_then(|record| record.key.as_ref())
                .is_some_and(|key| self.verify_commitment(channel, key.as_ref()));
            if verified {
                self.push_system_message(format!("Received encrypted message in {channel}"));
            } else {
                self.push_system_message(format!("Unable to decrypt message in {channel}"));
            }
        } else {
            let content = message.content.as_deref().unwrap_or_default();
            self.push_system_message(format!("Received message in {channel}: {content}"));
        }
    }

    /// True when `key` hashes to the stored commitment for `name`.
    pub fn verify_commitment(&self, name: &str, key: &[u8]) -> bool {
        self.records
            .get(name)
            .and_then(|record| record.commitment)
            .is_some_and(|commitment| commitment == key_commitment(key))
    }

    pub fn is_member(&self, name: &str) -> bool {
        self.joined.contains(name)
    }

    pub fn is_protected(&self, name: &str) -> bool {
        self.records.get(name).is_some_and(ChannelRecord::is_protected)
    }

    /// The derived key held for a channel, when any.
    pub fn channel_key(&self, name: &str) -> Option<[u8; CHANNEL_KEY_SIZE]> {
        self.records.get(name).and_then(|record| record.key.as_deref().copied())
    }

    pub fn current_channel(&self) -> Option<&str> {
        self.current_channel.as_deref()
    }

    /// System-generated informational messages, oldest first.
    pub fn system_messages(&self) -> &[Message] {
        &self.system_messages
    }

    pub(crate) fn push_system_message(&mut self, content: String) {
        self.system_messages.push(Message {
            sender: "system".to_string(),
            sender_peer_id: "system".to_string(),
            content: Some(content),
            timestamp: now_epoch_millis(),
            delivery_status: DeliveryStatus::Delivered,
            ..Message::default()
        });
    }

    fn install_key(
        &mut self,
        record: &mut ChannelRecord,
        name: &str,
        password: &str,
    ) -> Result<(), ChannelError> {
        let key = derive_channel_key(password, name);
        self.keystore.store_key(key.as_ref(), &key_identifier(name))?;
        record.commitment = Some(key_commitment(key.as_ref()));
        record.password = Some(password.to_string());
        record.key = Some(key);
        Ok(())
    }

    fn require_creator(&self, name: &str, peer_id: &str) -> Result<(), ChannelError> {
        validate_channel_name(name)?;
        let record = self
            .records
            .get(name)
            .filter(|_| self.joined.contains(name))
            .ok_or_else(|| ChannelError::UnknownChannel(name.to_string()))?;
        if record.creator != peer_id {
            warn!("{peer_id} attempted a creator-only operation on {name}");
            return Err(ChannelError::NotCreator(name.to_string()));
        }
        Ok(())
    }
}

/// Keystore identifier for a channel's derived key.
fn key_identifier(name: &str) -> String {
    format!("channel_{name}")
}

/// Channel names match `^#[A-Za-z0-9-]+$`.
fn validate_channel_name(name: &str) -> Result<(), ChannelError> {
    let mut chars = name.chars();
    let valid = chars.next() == Some('#')
        && !name[1..].is_empty()
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ChannelError::InvalidName(name.to_string()))
    }
}

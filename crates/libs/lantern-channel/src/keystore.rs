//! Pluggable storage for derived channel keys.
//!
//! Platform key storage (Android Keystore, the iOS keychain) lives
//! outside this crate; the channel store only writes through this
//! trait. The in-memory backend covers tests and hosts without a
//! secure enclave.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::store::ChannelError;

pub trait KeyStoreBackend {
    fn store_key(&self, key: &[u8], identifier: &str) -> Result<(), ChannelError>;
    fn load_key(&self, identifier: &str) -> Result<Option<Vec<u8>>, ChannelError>;
    fn delete_key(&self, identifier: &str) -> Result<(), ChannelError>;
}

#[derive(Default)]
pub struct InMemoryKeyStore {
    keys: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStoreBackend for InMemoryKeyStore {
    fn store_key(&self, key: &[u8], identifier: &str) -> Result<(), ChannelError> {
        let mut keys = self.keys.write().map_err(|_| ChannelError::KeyStore)?;
        keys.insert(identifier.to_string(), key.to_vec());
        Ok(())
    }

    fn load_key(&self, identifier: &str) -> Result<Option<Vec<u8>>, ChannelError> {
        let keys = self.keys.read().map_err(|_| ChannelError::KeyStore)?;
        Ok(keys.get(identifier).cloned())
    }

    fn delete_key(&self, identifier: &str) -> Result<(), ChannelError> {
        let mut keys = self.keys.write().map_err(|_| ChannelError::KeyStore)?;
        keys.remove(identifier);
        Ok(())
    }
}

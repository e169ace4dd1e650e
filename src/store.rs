//! Storage for the caller's RSA private key.
//!
//! Platforms back [SecretStore] with their keychain. [MemorySecretStore] keeps
//! the key for the lifetime of the process and wipes it on drop.
use std::collections::HashMap;
use std::sync::Mutex;

use zeroize::Zeroizing;

/// Key material as handed to the crypto provider. Wiped when dropped.
pub type KeyMaterial = Zeroizing<Vec<u8>>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no key stored under {0}")]
    NotFound(String),
    #[error("secret store is unavailable: {0}")]
    Unavailable(String),
}

pub trait SecretStore: Send + Sync {
    /// Store `key` under `id`, replacing any previous value.
    fn store(&self, id: &str, key: &[u8]) -> Result<(), Error>;

    fn load(&self, id: &str) -> Result<KeyMaterial, Error>;

    fn remove(&self, id: &str) -> Result<(), Error>;
}

#[derive(Default)]
pub struct MemorySecretStore {
    keys: Mutex<HashMap<String, KeyMaterial>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn store(&self, id: &str, key: &[u8]) -> Result<(), Error> {
        self.keys
            .lock()
            .map_err(|e| Error::Unavailable(e.to_string()))?
            .insert(id.to_string(), Zeroizing::new(key.to_vec()));
        Ok(())
    }

    fn load(&self, id: &str) -> Result<KeyMaterial, Error> {
        self.keys
            .lock()
            .map_err(|e| Error::Unavailable(e.to_string()))?
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    fn remove(&self, id: &str) -> Result<(), Error> {
        self.keys
            .lock()
            .map_err(|e| Error::Unavailable(e.to_string()))?
            .remove(id);
        Ok(())
    }
}

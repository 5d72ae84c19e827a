//! In-memory credential storage implementation.

use async_trait::async_trait;
use parking_lot::RwLock;
use zeroize::Zeroizing;

use super::{CredentialStore, StoreError};

/// In-memory credential store for testing and development.
///
/// This store is not persistent; data is lost when the process exits.
pub struct MemoryStore {
    slot: RwLock<Option<Zeroizing<Vec<u8>>>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    /// Create a memory store already holding `bytes`.
    pub fn with_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            slot: RwLock::new(Some(Zeroizing::new(bytes.into()))),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("occupied", &self.slot.read().is_some())
            .finish()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn save(&self, bytes: &[u8]) -> Result<(), StoreError> {
        *self.slot.write() = Some(Zeroizing::new(bytes.to_vec()));
        Ok(())
    }

    async fn load(&self) -> Result<Option<Zeroizing<Vec<u8>>>, StoreError> {
        Ok(self.slot.read().clone())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.slot.write().take();
        Ok(())
    }
}

pub mod local;
pub mod memory;
pub mod provider;

pub use local::*;
pub use memory::*;
pub use provider::*;

use std::sync::Arc;

use crate::config::{BackendKind, StorageConfig};
use crate::crypto::Encryptor;

/// Storage manager holding the backend selected at startup
#[derive(Clone)]
pub struct StorageManager {
    backend: Arc<dyn StorageBackend>,
}

impl StorageManager {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Build the configured backend
    pub fn from_config(config: &StorageConfig, encryptor: Arc<Encryptor>) -> Self {
        let backend: Arc<dyn StorageBackend> = match config.backend {
            BackendKind::Local => Arc::new(LocalStorage::new(&config.local_path, encryptor)),
            BackendKind::Memory => Arc::new(MemoryStorage::new(encryptor)),
        };
        tracing::info!("Using {} storage backend", backend.storage_type());
        Self::new(backend)
    }

    pub fn backend(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }
}

//! Backend implementations for mirror storage

mod dynamodb;
mod local;

pub use dynamodb::DynamoDbStore;
pub use local::LocalStore;

use routemirror_core::store::{MemoryStore, MirrorStore, StoreError, StoreResult};

use crate::backend::BackendConfig;

/// Create a store from configuration
///
/// This function dispatches to the appropriate backend implementation
/// based on the backend_type in the configuration.
pub async fn create_backend(config: &BackendConfig) -> StoreResult<Box<dyn MirrorStore>> {
    match config.backend_type.as_str() {
        "dynamodb" => {
            let store = DynamoDbStore::from_config(config).await?;
            Ok(Box::new(store))
        }
        "local" => Ok(Box::new(LocalStore::from_config(config)?)),
        "memory" => Ok(Box::new(MemoryStore::new())),
        other => Err(StoreError::unsupported_backend(other)),
    }
}

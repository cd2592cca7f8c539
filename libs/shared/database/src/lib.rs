pub mod error;
pub mod memory;
pub mod store;
pub mod supabase;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryStore;
pub use store::{with_timeout, ClinicStore};
pub use supabase::{SupabaseClient, SupabaseStore};

use std::sync::Arc;

use shared_config::{StorageBackend, StorageConfig};
use tracing::info;

/// Builds the store selected by configuration.
pub fn build_store(config: &StorageConfig) -> StorageResult<Arc<dyn ClinicStore>> {
    match config.backend {
        StorageBackend::Memory => {
            info!("Using in-memory clinic store");
            Ok(Arc::new(InMemoryStore::new()))
        }
        StorageBackend::Supabase => {
            if !config.is_configured() {
                return Err(StorageError::Configuration(
                    "Supabase backend selected without SUPABASE_URL/SUPABASE_SERVICE_KEY".to_string(),
                ));
            }
            info!("Using Supabase clinic store at {}", config.supabase_url);
            let client = SupabaseClient::new(&config.supabase_url, &config.supabase_key, config.timeout_ms)?;
            Ok(Arc::new(SupabaseStore::new(client)))
        }
    }
}

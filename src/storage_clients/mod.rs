mod local;
mod s3;
mod storage_client;

use crate::config::BackendConfig;
use crate::error::StoreResult;
use std::sync::Arc;

pub use local::LocalClientStorage;
pub use s3::S3ClientStorage;
pub use storage_client::ClientStorage;

/// Builds the backend selected by the configuration.
pub async fn build_storage_client(backend: &BackendConfig) -> StoreResult<Arc<dyn ClientStorage>> {
    let client: Arc<dyn ClientStorage> = match backend {
        BackendConfig::S3(config) => Arc::new(S3ClientStorage::new(config).await?),
        BackendConfig::Local(config) => Arc::new(LocalClientStorage::open(config).await?),
    };

    Ok(client)
}

//! Shared fixtures for the integration tests.

#![allow(dead_code)]

mod scripted;

pub use scripted::{Script, ScriptedStorage};

use s3bridge::{LocalClientStorage, ObjectStoreClient, StoreConfig};
use std::sync::Arc;
use tempfile::TempDir;

pub const BUCKET: &str = "my-bucket";

/// A client over a fresh local root that already contains [`BUCKET`].
pub async fn local_client() -> (TempDir, ObjectStoreClient) {
    let root = TempDir::new().unwrap();
    let client = ObjectStoreClient::connect(StoreConfig::local(root.path()).with_concurrency(4))
        .await
        .unwrap();
    client.create_bucket(BUCKET).await.unwrap();
    (root, client)
}

/// A client over a [`ScriptedStorage`], returned alongside it so tests can
/// inspect the call count.
pub async fn scripted_client(script: Script) -> (TempDir, Arc<ScriptedStorage>, ObjectStoreClient) {
    let root = TempDir::new().unwrap();
    let local = LocalClientStorage::new(root.path());
    let storage = Arc::new(ScriptedStorage::new(local, script));
    let client = ObjectStoreClient::from_storage(storage.clone());
    client.create_bucket(BUCKET).await.unwrap();
    storage.reset_calls();
    (root, storage, client)
}

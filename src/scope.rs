use crate::client::ObjectStoreClient;
use crate::core::metadata::{ObjectInfo, Payload, PresignedRequest, PutOptions, PutReceipt};
use crate::core::uri::{S3Uri, folder_prefix, join_key};
use crate::core::validate::{validate_bucket, validate_prefix};
use crate::error::{StoreError, StoreResult};
use crate::listing::ObjectListing;
use bytes::Bytes;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWrite;

/// A fixed bucket and folder. Keys passed to its methods are relative to
/// the folder.
///
/// The scope never changes once built; [`child`](Self::child) returns a new
/// one for a sub-folder.
#[derive(Clone)]
pub struct ScopedStore {
    client: ObjectStoreClient,
    bucket: String,
    prefix: String,
}

impl ObjectStoreClient {
    /// A view rooted at `s3://bucket/folder/`.
    pub fn scoped(&self, root: S3Uri) -> StoreResult<ScopedStore> {
        validate_bucket(&root.bucket)?;
        let prefix = folder_prefix(&root.key);
        validate_prefix(&prefix)?;

        Ok(ScopedStore {
            client: self.clone(),
            bucket: root.bucket,
            prefix,
        })
    }
}

impl ScopedStore {
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn uri(&self) -> S3Uri {
        S3Uri::new(self.bucket.clone(), self.prefix.clone())
    }

    /// Full key for a path relative to the scope.
    pub fn key_for(&self, relative: &str) -> StoreResult<String> {
        if relative.trim_start_matches('/').is_empty() {
            return Err(StoreError::validation("relative key must not be empty"));
        }
        Ok(join_key(&self.prefix, relative))
    }

    pub fn child(&self, folder: &str) -> StoreResult<ScopedStore> {
        let key = self.key_for(folder)?;
        self.client.scoped(S3Uri::new(self.bucket.clone(), key))
    }

    pub async fn put(
        &self,
        relative: &str,
        payload: impl Into<Payload>,
        options: &PutOptions,
    ) -> StoreResult<PutReceipt> {
        let key = self.key_for(relative)?;
        self.client.put(&self.bucket, &key, payload, options).await
    }

    pub async fn get(&self, relative: &str) -> StoreResult<Bytes> {
        let key = self.key_for(relative)?;
        self.client.get(&self.bucket, &key).await
    }

    pub async fn download(&self, relative: &str, path: impl AsRef<Path>) -> StoreResult<u64> {
        let key = self.key_for(relative)?;
        self.client.download(&self.bucket, &key, path).await
    }

    pub async fn download_to<W>(&self, relative: &str, writer: &mut W) -> StoreResult<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let key = self.key_for(relative)?;
        self.client.download_to(&self.bucket, &key, writer).await
    }

    pub async fn head(&self, relative: &str) -> StoreResult<ObjectInfo> {
        let key = self.key_for(relative)?;
        self.client.head(&self.bucket, &key).await
    }

    pub async fn delete(&self, relative: &str) -> StoreResult<()> {
        let key = self.key_for(relative)?;
        self.client.delete(&self.bucket, &key).await
    }

    pub async fn exists(&self, relative: &str) -> StoreResult<bool> {
        let key = self.key_for(relative)?;
        self.client.exists(&self.bucket, &key).await
    }

    pub async fn presigned_url(
        &self,
        relative: &str,
        expires_in: Duration,
    ) -> StoreResult<PresignedRequest> {
        let key = self.key_for(relative)?;
        self.client
            .presigned_url(&self.bucket, &key, expires_in)
            .await
    }

    /// Everything inside the scope, recursively. Keys come back in full.
    pub fn list(&self) -> StoreResult<ObjectListing> {
        self.client.list(&self.bucket, &self.prefix)
    }
}

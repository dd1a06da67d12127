use crate::core::metadata::{
    ListPage, ObjectInfo, PageRequest, Payload, PresignMethod, PresignedRequest, PutOptions,
    PutReceipt,
};
use crate::error::StoreResult;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tokio::io::AsyncWrite;

/// One storage service, seen through the operations the facade needs.
///
/// Implementations map their native failures onto [`StoreError`]
/// (`NotFound` for a missing object must carry `Missing::Object`), do not
/// retry on their own, and may assume bucket, key and expiry arguments have
/// already been validated.
///
/// [`StoreError`]: crate::StoreError
#[async_trait]
pub trait ClientStorage: Send + Sync {
    /// Short backend name used in logs and `Unsupported` errors.
    fn name(&self) -> &'static str;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        payload: Payload,
        options: &PutOptions,
    ) -> StoreResult<PutReceipt>;

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Bytes>;

    /// Streams an object body into `sink` and returns the bytes written.
    ///
    /// Failures of the sink itself surface as `StoreError::Sink`, so callers
    /// can tell a full disk from a dropped connection. The sink is not
    /// flushed.
    async fn write_object(
        &self,
        bucket: &str,
        key: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> StoreResult<u64>;

    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectInfo>;

    /// Removing an absent key may either succeed or fail with `NotFound`.
    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()>;

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> StoreResult<PutReceipt>;

    async fn list_page(&self, request: PageRequest<'_>) -> StoreResult<ListPage>;

    async fn presign(
        &self,
        bucket: &str,
        key: &str,
        method: PresignMethod,
        expires_in: Duration,
    ) -> StoreResult<PresignedRequest>;

    async fn create_bucket(&self, bucket: &str) -> StoreResult<()>;

    async fn delete_bucket(&self, bucket: &str) -> StoreResult<()>;

    /// Succeeds if the bucket exists and is reachable.
    async fn head_bucket(&self, bucket: &str) -> StoreResult<()>;

    async fn list_buckets(&self) -> StoreResult<Vec<String>>;

    /// A browsable URL for the object, without checking that it exists.
    fn object_url(&self, bucket: &str, key: &str) -> String;
}

use async_trait::async_trait;
use bytes::Bytes;
use s3bridge::{
    ClientStorage, ListPage, LocalClientStorage, ObjectInfo, ObjectSummary, PageRequest, Payload,
    PresignMethod, PresignedRequest, PutOptions, PutReceipt, StoreError, StoreResult,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    /// Delegates every call to the local backend.
    PassThrough,
    /// Object calls fail as if the network dropped.
    Unavailable,
    /// Object calls are refused.
    Forbidden,
    /// Listing keeps handing back the same continuation token.
    StuckPagination,
    /// Object bodies break off halfway through.
    TruncatedBody,
}

/// A local backend that counts calls and misbehaves on request.
pub struct ScriptedStorage {
    inner: LocalClientStorage,
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedStorage {
    pub fn new(inner: LocalClientStorage, script: Script) -> Self {
        Self {
            inner,
            script,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }

    fn enter(&self) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script {
            Script::Unavailable => Err(StoreError::transfer("connection reset by peer")),
            Script::Forbidden => Err(StoreError::permission("AccessDenied")),
            Script::PassThrough | Script::StuckPagination | Script::TruncatedBody => Ok(()),
        }
    }
}

#[async_trait]
impl ClientStorage for ScriptedStorage {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        payload: Payload,
        options: &PutOptions,
    ) -> StoreResult<PutReceipt> {
        self.enter()?;
        self.inner.put_object(bucket, key, payload, options).await
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Bytes> {
        self.enter()?;
        self.inner.get_object(bucket, key).await
    }

    async fn write_object(
        &self,
        bucket: &str,
        key: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> StoreResult<u64> {
        self.enter()?;
        if self.script != Script::TruncatedBody {
            return self.inner.write_object(bucket, key, sink).await;
        }

        let body = self.inner.get_object(bucket, key).await?;
        sink.write_all(&body[..body.len() / 2])
            .await
            .map_err(|source| StoreError::Sink { source })?;
        Err(StoreError::transfer("connection closed mid-body"))
    }

    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectInfo> {
        self.enter()?;
        self.inner.head_object(bucket, key).await
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.enter()?;
        self.inner.delete_object(bucket, key).await
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> StoreResult<PutReceipt> {
        self.enter()?;
        self.inner
            .copy_object(src_bucket, src_key, dst_bucket, dst_key)
            .await
    }

    async fn list_page(&self, request: PageRequest<'_>) -> StoreResult<ListPage> {
        self.enter()?;
        if self.script == Script::StuckPagination {
            return Ok(ListPage {
                objects: vec![ObjectSummary {
                    key: format!("{}stuck.txt", request.prefix),
                    size: 1,
                    etag: None,
                    last_modified: None,
                }],
                common_prefixes: Vec::new(),
                next_token: Some("again".to_string()),
            });
        }
        self.inner.list_page(request).await
    }

    async fn presign(
        &self,
        bucket: &str,
        key: &str,
        method: PresignMethod,
        expires_in: Duration,
    ) -> StoreResult<PresignedRequest> {
        self.enter()?;
        Ok(PresignedRequest {
            url: format!("https://{}.example.test/{}?expires={}", bucket, key, expires_in.as_secs()),
            method: method.as_str().to_string(),
            expires_in,
        })
    }

    // Bucket administration is never scripted so fixtures can set up state.
    async fn create_bucket(&self, bucket: &str) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.create_bucket(bucket).await
    }

    async fn delete_bucket(&self, bucket: &str) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_bucket(bucket).await
    }

    async fn head_bucket(&self, bucket: &str) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.head_bucket(bucket).await
    }

    async fn list_buckets(&self) -> StoreResult<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list_buckets().await
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        self.inner.object_url(bucket, key)
    }
}

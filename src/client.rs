use crate::TRACING_TARGET;
use crate::config::{StoreConfig, TransferConfig};
use crate::core::filter::KeyFilter;
use crate::core::metadata::{
    DeleteMode, LinkStyle, ObjectInfo, ObjectSummary, Payload, PresignMethod, PresignedRequest,
    PutOptions, PutReceipt, WaitOptions,
};
use crate::core::staging::StagedFile;
use crate::core::uri::{S3Uri, folder_prefix, is_folder_key};
use crate::core::validate::{
    validate_bucket, validate_expiry, validate_object, validate_prefix,
};
use crate::error::{StoreError, StoreResult};
use crate::listing::{ListOptions, ObjectListing};
use crate::storage_clients::{ClientStorage, build_storage_client};
use bytes::Bytes;
use bytesize::ByteSize;
use futures::TryStreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};

const JSON_CONTENT_TYPE: &str = "application/json";
const FOLDER_DELIMITER: &str = "/";

/// The entry point: every object operation goes through here.
///
/// Cloning is cheap and clones share the same backend. Arguments are
/// validated before any backend call, and the facade never retries on its
/// own; retries are configured on the SDK (`S3Config::max_attempts`).
#[derive(Clone)]
pub struct ObjectStoreClient {
    storage: Arc<dyn ClientStorage>,
    transfer: TransferConfig,
}

impl ObjectStoreClient {
    /// Validates the configuration and builds the selected backend.
    pub async fn connect(config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;

        let storage = build_storage_client(&config.backend).await?;

        tracing::info!(
            target: TRACING_TARGET,
            backend = storage.name(),
            config = %config.describe(),
            "Object store client ready"
        );

        Ok(Self {
            storage,
            transfer: config.transfer,
        })
    }

    /// Wraps an existing backend, e.g. a custom [`ClientStorage`].
    pub fn from_storage(storage: Arc<dyn ClientStorage>) -> Self {
        Self {
            storage,
            transfer: TransferConfig::default(),
        }
    }

    pub fn with_transfer_config(mut self, transfer: TransferConfig) -> StoreResult<Self> {
        if transfer.concurrency == 0 {
            return Err(StoreError::config("transfer concurrency must be at least 1"));
        }
        self.transfer = transfer;
        Ok(self)
    }

    pub fn storage(&self) -> &Arc<dyn ClientStorage> {
        &self.storage
    }

    pub(crate) fn concurrency(&self) -> usize {
        self.transfer.concurrency
    }

    pub async fn put(
        &self,
        bucket: &str,
        key: &str,
        payload: impl Into<Payload>,
        options: &PutOptions,
    ) -> StoreResult<PutReceipt> {
        validate_object(bucket, key)?;
        let payload = payload.into();

        if let Payload::Bytes(bytes) = &payload {
            tracing::debug!(
                target: TRACING_TARGET,
                bucket,
                key,
                size = %ByteSize::b(bytes.len() as u64),
                "Uploading object"
            );
        }

        self.storage.put_object(bucket, key, payload, options).await
    }

    /// Uploads a local file. A missing or unreadable file fails with
    /// `LocalIo` before the backend is contacted.
    pub async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        path: impl AsRef<Path>,
        options: &PutOptions,
    ) -> StoreResult<PutReceipt> {
        validate_object(bucket, key)?;
        let path = path.as_ref();

        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| StoreError::local_io(path, e))?;
        if !meta.is_file() {
            return Err(StoreError::validation(format!(
                "'{}' is not a file",
                path.display()
            )));
        }

        tracing::debug!(
            target: TRACING_TARGET,
            bucket,
            key,
            path = %path.display(),
            size = %ByteSize::b(meta.len()),
            "Uploading file"
        );

        self.storage
            .put_object(bucket, key, Payload::file(path), options)
            .await
    }

    pub async fn get(&self, bucket: &str, key: &str) -> StoreResult<Bytes> {
        validate_object(bucket, key)?;
        tracing::debug!(target: TRACING_TARGET, bucket, key, "Fetching object");
        self.storage.get_object(bucket, key).await
    }

    /// Streams an object into `path`, creating parent directories, and
    /// returns the number of bytes written.
    ///
    /// The body is written to a temporary file next to `path` and renamed
    /// into place once complete, so a failed download never leaves a
    /// truncated file behind.
    pub async fn download(
        &self,
        bucket: &str,
        key: &str,
        path: impl AsRef<Path>,
    ) -> StoreResult<u64> {
        validate_object(bucket, key)?;
        let path = path.as_ref();

        let mut staged = StagedFile::create(path).await?;
        let result = self.storage.write_object(bucket, key, staged.file()).await;
        let written = match result {
            Ok(written) => written,
            Err(StoreError::Sink { source }) => {
                return Err(StoreError::local_io(staged.destination(), source));
            }
            Err(e) => return Err(e),
        };
        staged.commit().await?;

        tracing::debug!(
            target: TRACING_TARGET,
            bucket,
            key,
            path = %path.display(),
            size = %ByteSize::b(written),
            "Object downloaded"
        );

        Ok(written)
    }

    /// Streams an object into any async writer, such as an open file or an
    /// in-memory buffer, and returns the number of bytes written. The writer
    /// is flushed but not shut down.
    pub async fn download_to<W>(&self, bucket: &str, key: &str, writer: &mut W) -> StoreResult<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        validate_object(bucket, key)?;

        let written = self.storage.write_object(bucket, key, writer).await?;
        writer
            .flush()
            .await
            .map_err(|source| StoreError::Sink { source })?;

        tracing::debug!(
            target: TRACING_TARGET,
            bucket,
            key,
            size = %ByteSize::b(written),
            "Object streamed to writer"
        );

        Ok(written)
    }

    pub async fn head(&self, bucket: &str, key: &str) -> StoreResult<ObjectInfo> {
        validate_object(bucket, key)?;
        self.storage.head_object(bucket, key).await
    }

    /// Deletes an object. Deleting a key that does not exist succeeds.
    pub async fn delete(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.delete_with(bucket, key, DeleteMode::Idempotent).await
    }

    pub async fn delete_with(&self, bucket: &str, key: &str, mode: DeleteMode) -> StoreResult<()> {
        validate_object(bucket, key)?;

        if mode == DeleteMode::Strict {
            self.storage.head_object(bucket, key).await?;
        }

        match self.storage.delete_object(bucket, key).await {
            Ok(()) => {
                tracing::debug!(target: TRACING_TARGET, bucket, key, "Object deleted");
                Ok(())
            }
            Err(e) if mode == DeleteMode::Idempotent && e.is_missing_object() => {
                tracing::debug!(target: TRACING_TARGET, bucket, key, "Object already absent");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// `false` only when the backend confirms the object is absent. Any
    /// other failure is returned as is.
    pub async fn exists(&self, bucket: &str, key: &str) -> StoreResult<bool> {
        validate_object(bucket, key)?;

        match self.storage.head_object(bucket, key).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_missing_object() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> StoreResult<PutReceipt> {
        validate_object(src_bucket, src_key)?;
        validate_object(dst_bucket, dst_key)?;

        tracing::debug!(
            target: TRACING_TARGET,
            source = %S3Uri::new(src_bucket, src_key),
            destination = %S3Uri::new(dst_bucket, dst_key),
            "Copying object"
        );

        self.storage
            .copy_object(src_bucket, src_key, dst_bucket, dst_key)
            .await
    }

    /// A presigned GET URL for the object.
    pub async fn presigned_url(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> StoreResult<PresignedRequest> {
        self.presign(bucket, key, PresignMethod::Get, expires_in)
            .await
    }

    /// Presigns a GET or PUT request. The expiry must be positive and at
    /// most seven days.
    pub async fn presign(
        &self,
        bucket: &str,
        key: &str,
        method: PresignMethod,
        expires_in: Duration,
    ) -> StoreResult<PresignedRequest> {
        validate_object(bucket, key)?;
        validate_expiry(expires_in)?;

        tracing::debug!(
            target: TRACING_TARGET,
            bucket,
            key,
            method = method.as_str(),
            expires_in_secs = expires_in.as_secs(),
            "Presigning request"
        );

        self.storage.presign(bucket, key, method, expires_in).await
    }

    pub async fn read_json<T: DeserializeOwned>(&self, bucket: &str, key: &str) -> StoreResult<T> {
        let body = self.get(bucket, key).await?;

        serde_json::from_slice(&body).map_err(|source| StoreError::Codec {
            key: key.to_string(),
            source,
        })
    }

    pub async fn write_json<T: Serialize + ?Sized>(
        &self,
        bucket: &str,
        key: &str,
        value: &T,
    ) -> StoreResult<PutReceipt> {
        validate_object(bucket, key)?;

        let body = serde_json::to_vec(value).map_err(|source| StoreError::Codec {
            key: key.to_string(),
            source,
        })?;

        let options = PutOptions::default().with_content_type(JSON_CONTENT_TYPE);
        self.put(bucket, key, body, &options).await
    }

    pub async fn create_bucket(&self, bucket: &str) -> StoreResult<()> {
        validate_bucket(bucket)?;
        self.storage.create_bucket(bucket).await?;
        tracing::info!(target: TRACING_TARGET, bucket, "Bucket created");
        Ok(())
    }

    /// Deletes an empty bucket.
    pub async fn delete_bucket(&self, bucket: &str) -> StoreResult<()> {
        validate_bucket(bucket)?;
        self.storage.delete_bucket(bucket).await?;
        tracing::info!(target: TRACING_TARGET, bucket, "Bucket deleted");
        Ok(())
    }

    pub async fn bucket_exists(&self, bucket: &str) -> StoreResult<bool> {
        validate_bucket(bucket)?;

        match self.storage.head_bucket(bucket).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_missing_bucket() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn list_buckets(&self) -> StoreResult<Vec<String>> {
        self.storage.list_buckets().await
    }

    /// Polls until the bucket exists, failing with `NotFound` once the
    /// attempts run out.
    pub async fn wait_for_bucket(&self, bucket: &str, options: WaitOptions) -> StoreResult<()> {
        validate_bucket(bucket)?;
        if options.max_attempts == 0 {
            return Err(StoreError::validation("max_attempts must be at least 1"));
        }

        for attempt in 1..=options.max_attempts {
            if self.bucket_exists(bucket).await? {
                return Ok(());
            }

            tracing::debug!(
                target: TRACING_TARGET,
                bucket,
                attempt,
                max_attempts = options.max_attempts,
                "Bucket not there yet"
            );

            if attempt < options.max_attempts {
                tokio::time::sleep(options.delay).await;
            }
        }

        Err(StoreError::bucket_not_found(
            bucket,
            format!("still missing after {} attempts", options.max_attempts),
        ))
    }

    /// Every key under `prefix`, recursively.
    pub fn list(&self, bucket: &str, prefix: &str) -> StoreResult<ObjectListing> {
        self.list_with(bucket, prefix, ListOptions::default())
    }

    pub fn list_with(
        &self,
        bucket: &str,
        prefix: &str,
        options: ListOptions,
    ) -> StoreResult<ObjectListing> {
        validate_bucket(bucket)?;
        validate_prefix(prefix)?;
        options.validate()?;

        Ok(ObjectListing::new(
            Arc::clone(&self.storage),
            bucket,
            prefix,
            options,
        ))
    }

    fn folder_listing(&self, bucket: &str, folder: &str) -> StoreResult<ObjectListing> {
        let prefix = folder_prefix(folder);
        self.list_with(
            bucket,
            &prefix,
            ListOptions::default().with_delimiter(FOLDER_DELIMITER),
        )
    }

    /// `true` when at least one object, folder marker included, lives under
    /// `folder`. Only a single key is fetched.
    pub async fn folder_exists(&self, bucket: &str, folder: &str) -> StoreResult<bool> {
        if folder.is_empty() {
            return Err(StoreError::validation(
                "a folder name is required; use bucket_exists for the bucket itself",
            ));
        }

        let listing = self.list_with(
            bucket,
            &folder_prefix(folder),
            ListOptions::default().with_page_size(1),
        )?;

        let mut pages = listing.pages();
        Ok(match pages.try_next().await? {
            Some(page) => !page.objects.is_empty() || !page.common_prefixes.is_empty(),
            None => false,
        })
    }

    /// Objects directly inside `folder` whose keys pass the filter. Folder
    /// markers are skipped.
    pub async fn list_files(
        &self,
        bucket: &str,
        folder: &str,
        filter: &KeyFilter,
    ) -> StoreResult<Vec<String>> {
        let objects: Vec<ObjectSummary> = self
            .folder_listing(bucket, folder)?
            .objects()
            .try_collect()
            .await?;

        Ok(objects
            .into_iter()
            .map(|object| object.key)
            .filter(|key| !is_folder_key(key) && filter.matches(key))
            .collect())
    }

    /// Sub-folders (common prefixes, ending in `/`) directly inside `folder`.
    pub async fn list_folders(
        &self,
        bucket: &str,
        folder: &str,
        filter: &KeyFilter,
    ) -> StoreResult<Vec<String>> {
        let folders: Vec<String> = self
            .folder_listing(bucket, folder)?
            .common_prefixes()
            .try_collect()
            .await?;

        Ok(folders
            .into_iter()
            .filter(|name| filter.matches(name))
            .collect())
    }

    /// Files followed by sub-folders directly inside `folder`.
    pub async fn list_folder_contents(
        &self,
        bucket: &str,
        folder: &str,
        filter: &KeyFilter,
    ) -> StoreResult<Vec<String>> {
        let listing = self.folder_listing(bucket, folder)?;
        let marker = listing.prefix().to_string();

        let mut files = Vec::new();
        let mut folders = Vec::new();

        let mut pages = listing.pages();
        while let Some(page) = pages.try_next().await? {
            files.extend(page.objects.into_iter().map(|object| object.key));
            folders.extend(page.common_prefixes);
        }

        Ok(files
            .into_iter()
            .filter(|key| *key != marker)
            .chain(folders)
            .filter(|name| filter.matches(name))
            .collect())
    }

    /// A browsable URL for the object. Nothing is checked remotely.
    pub fn object_url(&self, bucket: &str, key: &str) -> StoreResult<String> {
        validate_object(bucket, key)?;
        Ok(self.storage.object_url(bucket, key))
    }

    /// Link to an existing object, either as `s3://` URI or as URL.
    pub async fn file_link(&self, bucket: &str, key: &str, style: LinkStyle) -> StoreResult<String> {
        self.head(bucket, key).await?;

        Ok(match style {
            LinkStyle::Uri => S3Uri::new(bucket, key).to_string(),
            LinkStyle::Url => self.storage.object_url(bucket, key),
        })
    }
}

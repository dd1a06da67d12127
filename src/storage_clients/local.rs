use crate::TRACING_TARGET;
use crate::config::LocalConfig;
use crate::core::metadata::{
    ListPage, ObjectInfo, ObjectSummary, PageRequest, Payload, PresignMethod, PresignedRequest,
    PutOptions, PutReceipt,
};
use crate::core::uri::is_folder_key;
use crate::error::{IoAccess, StoreError, StoreResult, Target, classify_io_error};
use crate::storage_clients::ClientStorage;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use walkdir::WalkDir;

const DEFAULT_PAGE_SIZE: usize = 1000;
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Buckets are directories under `root`, keys are paths relative to them.
pub struct LocalClientStorage {
    root: PathBuf,
}

struct LocalEntry {
    key: String,
    size: u64,
    modified: Option<SystemTime>,
}

enum ListEntry {
    Object(ObjectSummary),
    Prefix(String),
}

impl ListEntry {
    fn name(&self) -> &str {
        match self {
            ListEntry::Object(object) => &object.key,
            ListEntry::Prefix(prefix) => prefix,
        }
    }
}

impl LocalClientStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn open(config: &LocalConfig) -> StoreResult<Self> {
        let root = config.root.clone();

        if config.create_root {
            tokio::fs::create_dir_all(&root)
                .await
                .map_err(|e| StoreError::local_io(&root, e))?;
        } else if !tokio::fs::metadata(&root)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
        {
            return Err(StoreError::config(format!(
                "local root '{}' does not exist",
                root.display()
            )));
        }

        Ok(Self::new(root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_path(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }

    fn object_path(&self, bucket: &str, key: &str) -> StoreResult<PathBuf> {
        if is_folder_key(key) {
            return Err(StoreError::Unsupported {
                operation: "folder marker keys",
                backend: self.name(),
            });
        }

        let mut path = self.bucket_path(bucket);
        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
                return Err(StoreError::validation(format!(
                    "key '{}' cannot be mapped onto the local filesystem",
                    key
                )));
            }
            path.push(segment);
        }

        Ok(path)
    }

    async fn ensure_bucket(&self, bucket: &str) -> StoreResult<PathBuf> {
        let path = self.bucket_path(bucket);

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => Ok(path),
            Ok(_) => Err(StoreError::bucket_not_found(bucket, "not a directory")),
            Err(e) => Err(classify_io_error(e, Target::Bucket(bucket), IoAccess::Read)),
        }
    }

    async fn create_parent(path: &Path, target: Target<'_>) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| classify_io_error(e, target, IoAccess::Write))?;
        }
        Ok(())
    }

    /// Removes directories left empty by a delete, stopping at the bucket.
    async fn prune_empty_parents(bucket_dir: &Path, path: &Path) {
        let mut current = path.parent();

        while let Some(folder) = current {
            if folder == bucket_dir || !folder.starts_with(bucket_dir) {
                break;
            }
            if tokio::fs::remove_dir(folder).await.is_err() {
                break;
            }
            current = folder.parent();
        }
    }

    async fn walk_bucket(bucket_dir: PathBuf) -> StoreResult<Vec<LocalEntry>> {
        tokio::task::spawn_blocking(move || {
            let mut entries = Vec::new();

            for entry in WalkDir::new(&bucket_dir).min_depth(1) {
                let entry = entry.map_err(|e| StoreError::transfer(e.to_string()))?;
                if !entry.file_type().is_file() {
                    continue;
                }

                let Ok(relative) = entry.path().strip_prefix(&bucket_dir) else {
                    continue;
                };
                let meta = entry
                    .metadata()
                    .map_err(|e| StoreError::transfer(e.to_string()))?;

                entries.push(LocalEntry {
                    key: relative.to_string_lossy().replace('\\', "/"),
                    size: meta.len(),
                    modified: meta.modified().ok(),
                });
            }

            entries.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(entries)
        })
        .await
        .map_err(|e| StoreError::transfer(format!("listing task failed: {}", e)))?
    }
}

fn timestamp(time: Option<SystemTime>) -> Option<DateTime<Utc>> {
    time.map(DateTime::<Utc>::from)
}

/// Groups keys the way S3 does: with a delimiter, everything past the first
/// delimiter after the prefix collapses into one common prefix.
fn group_entries(
    entries: Vec<LocalEntry>,
    prefix: &str,
    delimiter: Option<&str>,
) -> Vec<ListEntry> {
    let mut grouped: Vec<ListEntry> = Vec::new();

    for entry in entries {
        if !entry.key.starts_with(prefix) {
            continue;
        }

        if let Some(delimiter) = delimiter.filter(|d| !d.is_empty()) {
            let rest = &entry.key[prefix.len()..];
            if let Some(index) = rest.find(delimiter) {
                let common = &entry.key[..prefix.len() + index + delimiter.len()];
                let already_listed = matches!(
                    grouped.last(),
                    Some(ListEntry::Prefix(last)) if last == common
                );
                if !already_listed {
                    grouped.push(ListEntry::Prefix(common.to_string()));
                }
                continue;
            }
        }

        grouped.push(ListEntry::Object(ObjectSummary {
            key: entry.key,
            size: entry.size,
            etag: None,
            last_modified: timestamp(entry.modified),
        }));
    }

    grouped
}

#[async_trait]
impl ClientStorage for LocalClientStorage {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        payload: Payload,
        _options: &PutOptions,
    ) -> StoreResult<PutReceipt> {
        self.ensure_bucket(bucket).await?;
        let path = self.object_path(bucket, key)?;
        let target = Target::Object { bucket, key };

        Self::create_parent(&path, target).await?;

        match payload {
            Payload::Bytes(bytes) => {
                tokio::fs::write(&path, &bytes)
                    .await
                    .map_err(|e| classify_io_error(e, target, IoAccess::Write))?;
            }
            Payload::File(source) => {
                tokio::fs::metadata(&source)
                    .await
                    .map_err(|e| StoreError::local_io(&source, e))?;
                tokio::fs::copy(&source, &path)
                    .await
                    .map_err(|e| classify_io_error(e, target, IoAccess::Write))?;
            }
        }

        tracing::debug!(target: TRACING_TARGET, bucket, key, path = %path.display(), "Local object written");

        Ok(PutReceipt::default())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Bytes> {
        self.ensure_bucket(bucket).await?;
        let path = self.object_path(bucket, key)?;

        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| classify_io_error(e, Target::Object { bucket, key }, IoAccess::Read))?;

        Ok(Bytes::from(data))
    }

    async fn write_object(
        &self,
        bucket: &str,
        key: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> StoreResult<u64> {
        self.head_object(bucket, key).await?;
        let path = self.object_path(bucket, key)?;
        let target = Target::Object { bucket, key };

        let mut source = tokio::fs::File::open(&path)
            .await
            .map_err(|e| classify_io_error(e, target, IoAccess::Read))?;

        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        let mut written = 0u64;
        loop {
            let read = source
                .read(&mut buffer)
                .await
                .map_err(|e| classify_io_error(e, target, IoAccess::Read))?;
            if read == 0 {
                break;
            }
            sink.write_all(&buffer[..read])
                .await
                .map_err(|source| StoreError::Sink { source })?;
            written += read as u64;
        }

        Ok(written)
    }

    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectInfo> {
        self.ensure_bucket(bucket).await?;
        let path = self.object_path(bucket, key)?;

        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| classify_io_error(e, Target::Object { bucket, key }, IoAccess::Read))?;

        if !meta.is_file() {
            return Err(StoreError::object_not_found(bucket, key, "path is a folder"));
        }

        Ok(ObjectInfo {
            key: key.to_string(),
            size: meta.len(),
            etag: None,
            last_modified: timestamp(meta.modified().ok()),
            content_type: None,
            metadata: Default::default(),
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        let bucket_dir = self.ensure_bucket(bucket).await?;
        let path = self.object_path(bucket, key)?;

        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| classify_io_error(e, Target::Object { bucket, key }, IoAccess::Read))?;

        Self::prune_empty_parents(&bucket_dir, &path).await;

        Ok(())
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> StoreResult<PutReceipt> {
        self.head_object(src_bucket, src_key).await?;
        self.ensure_bucket(dst_bucket).await?;

        let source = self.object_path(src_bucket, src_key)?;
        let destination = self.object_path(dst_bucket, dst_key)?;

        // fs::copy onto itself would truncate the file.
        if source == destination {
            return Ok(PutReceipt::default());
        }

        let target = Target::Object {
            bucket: dst_bucket,
            key: dst_key,
        };
        Self::create_parent(&destination, target).await?;
        tokio::fs::copy(&source, &destination)
            .await
            .map_err(|e| classify_io_error(e, target, IoAccess::Write))?;

        Ok(PutReceipt::default())
    }

    async fn list_page(&self, request: PageRequest<'_>) -> StoreResult<ListPage> {
        let bucket_dir = self.ensure_bucket(request.bucket).await?;
        let entries = Self::walk_bucket(bucket_dir).await?;
        let grouped = group_entries(entries, request.prefix, request.delimiter);

        let page_size = request
            .max_keys
            .map(|max| max as usize)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .max(1);

        let mut remaining = grouped
            .into_iter()
            .filter(|entry| match request.continuation_token {
                Some(token) => entry.name() > token,
                None => true,
            })
            .peekable();

        let mut page = ListPage::default();
        let mut last_name = None;

        for entry in remaining.by_ref().take(page_size) {
            last_name = Some(entry.name().to_string());
            match entry {
                ListEntry::Object(object) => page.objects.push(object),
                ListEntry::Prefix(prefix) => page.common_prefixes.push(prefix),
            }
        }

        if remaining.peek().is_some() {
            page.next_token = last_name;
        }

        Ok(page)
    }

    async fn presign(
        &self,
        _bucket: &str,
        _key: &str,
        _method: PresignMethod,
        _expires_in: Duration,
    ) -> StoreResult<PresignedRequest> {
        Err(StoreError::Unsupported {
            operation: "presigned URLs",
            backend: self.name(),
        })
    }

    async fn create_bucket(&self, bucket: &str) -> StoreResult<()> {
        let path = self.bucket_path(bucket);

        tokio::fs::create_dir(&path)
            .await
            .map_err(|e| classify_io_error(e, Target::Bucket(bucket), IoAccess::Write))?;

        tracing::debug!(target: TRACING_TARGET, bucket, path = %path.display(), "Local bucket created");

        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> StoreResult<()> {
        tokio::fs::remove_dir(self.bucket_path(bucket))
            .await
            .map_err(|e| classify_io_error(e, Target::Bucket(bucket), IoAccess::Write))
    }

    async fn head_bucket(&self, bucket: &str) -> StoreResult<()> {
        self.ensure_bucket(bucket).await.map(|_| ())
    }

    async fn list_buckets(&self) -> StoreResult<Vec<String>> {
        let mut dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| StoreError::local_io(&self.root, e))?;

        let mut buckets = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| StoreError::local_io(&self.root, e))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|file_type| file_type.is_dir())
                .unwrap_or(false);
            if is_dir {
                buckets.push(entry.file_name().to_string_lossy().to_string());
            }
        }

        buckets.sort();
        Ok(buckets)
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("file://{}", self.bucket_path(bucket).join(key).display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str) -> LocalEntry {
        LocalEntry {
            key: key.to_string(),
            size: 1,
            modified: None,
        }
    }

    fn names(entries: &[ListEntry]) -> Vec<&str> {
        entries.iter().map(ListEntry::name).collect()
    }

    #[test]
    fn delimiter_collapses_nested_keys() {
        let entries = vec![
            entry("a-b"),
            entry("a/x.txt"),
            entry("a/y/z.txt"),
            entry("b.txt"),
        ];

        let grouped = group_entries(entries, "", Some("/"));
        assert_eq!(names(&grouped), vec!["a-b", "a/", "b.txt"]);
    }

    #[test]
    fn prefix_without_delimiter_is_recursive() {
        let entries = vec![entry("a/x.txt"), entry("a/y/z.txt"), entry("b.txt")];

        let grouped = group_entries(entries, "a/", None);
        assert_eq!(names(&grouped), vec!["a/x.txt", "a/y/z.txt"]);
    }

    #[test]
    fn keys_that_escape_the_bucket_are_rejected() {
        let storage = LocalClientStorage::new("/srv/objects");
        assert!(storage.object_path("b", "../etc/passwd").is_err());
        assert!(storage.object_path("b", "a//b").is_err());
        assert!(storage.object_path("b", "folder/").is_err());
        assert_eq!(
            storage.object_path("b", "a/b.txt").unwrap(),
            PathBuf::from("/srv/objects/b/a/b.txt")
        );
    }
}

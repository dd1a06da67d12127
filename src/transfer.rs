//! Folder-level helpers built on the single-object operations.
//!
//! Every object is attempted even when some fail; failures are collected
//! and returned together as [`StoreError::Incomplete`]. At most
//! `TransferConfig::concurrency` backend calls run at once.

use crate::TRACING_TARGET;
use crate::client::ObjectStoreClient;
use crate::core::metadata::{ObjectSummary, Payload, PutOptions};
use crate::core::uri::{folder_prefix, is_folder_key};
use crate::core::validate::{validate_bucket, validate_prefix};
use crate::error::{StoreError, StoreResult};
use bytesize::ByteSize;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// What a folder operation moved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferSummary {
    pub objects: usize,
    pub bytes: u64,
}

impl fmt::Display for TransferSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} objects, {}", self.objects, ByteSize::b(self.bytes))
    }
}

type ObjectResult = Result<u64, (String, StoreError)>;

struct LocalFile {
    path: PathBuf,
    key: String,
    size: u64,
}

async fn collect_local_files(root: &Path, prefix: &str) -> StoreResult<Vec<LocalFile>> {
    let meta = tokio::fs::metadata(root)
        .await
        .map_err(|e| StoreError::local_io(root, e))?;
    if !meta.is_dir() {
        return Err(StoreError::validation(format!(
            "'{}' is not a directory",
            root.display()
        )));
    }

    let root = root.to_path_buf();
    let prefix = prefix.to_string();

    tokio::task::spawn_blocking(move || {
        let mut files = Vec::new();

        for entry in WalkDir::new(&root).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(&root).to_path_buf();
                StoreError::local_io(path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(&root) else {
                continue;
            };
            let size = entry
                .metadata()
                .map_err(|e| StoreError::local_io(entry.path(), e.into()))?
                .len();

            files.push(LocalFile {
                path: entry.path().to_path_buf(),
                key: format!("{}{}", prefix, relative.to_string_lossy().replace('\\', "/")),
                size,
            });
        }

        Ok(files)
    })
    .await
    .map_err(|e| StoreError::transfer(format!("folder walk failed: {}", e)))?
}

/// Maps the part of a key below the folder onto a relative path, refusing
/// anything that would land outside the destination directory.
fn safe_relative_path(relative: &str) -> Option<PathBuf> {
    if relative.is_empty() || relative.starts_with('/') || relative.contains('\\') {
        return None;
    }

    let path = PathBuf::from(relative);
    let is_plain = path
        .components()
        .all(|component| matches!(component, Component::Normal(_)));
    let has_empty_segment = relative.split('/').any(str::is_empty);

    if is_plain && !has_empty_segment {
        Some(path)
    } else {
        None
    }
}

async fn drain(
    operation: &'static str,
    total: usize,
    mut results: BoxStream<'_, ObjectResult>,
) -> StoreResult<TransferSummary> {
    let mut summary = TransferSummary::default();
    let mut failures = Vec::new();

    while let Some(result) = results.next().await {
        match result {
            Ok(bytes) => {
                summary.objects += 1;
                summary.bytes += bytes;
            }
            Err((key, e)) => {
                tracing::warn!(target: TRACING_TARGET, operation, key = %key, error = %e, "Object failed");
                failures.push((key, e));
            }
        }
    }

    if !failures.is_empty() {
        failures.sort_by(|a, b| a.0.cmp(&b.0));
        return Err(StoreError::Incomplete { total, failures });
    }

    tracing::info!(target: TRACING_TARGET, operation, summary = %summary, "Folder operation finished");

    Ok(summary)
}

impl ObjectStoreClient {
    async fn objects_under(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<ObjectSummary>> {
        self.list(bucket, prefix)?.collect_objects().await
    }

    /// Uploads every file below `local_dir` to `s3://bucket/prefix/`,
    /// keeping the relative layout.
    pub async fn upload_folder(
        &self,
        local_dir: impl AsRef<Path>,
        bucket: &str,
        prefix: &str,
    ) -> StoreResult<TransferSummary> {
        validate_bucket(bucket)?;
        let prefix = folder_prefix(prefix);
        validate_prefix(&prefix)?;

        let local_dir = local_dir.as_ref();
        let files = collect_local_files(local_dir, &prefix).await?;
        let total = files.len();

        tracing::info!(
            target: TRACING_TARGET,
            bucket,
            prefix = %prefix,
            source = %local_dir.display(),
            files = total,
            "Uploading folder"
        );

        let results = stream::iter(files.into_iter().map(|file| {
            let client = self.clone();
            let bucket = bucket.to_string();
            async move {
                client
                    .put(&bucket, &file.key, Payload::File(file.path), &PutOptions::default())
                    .await
                    .map(|_| file.size)
                    .map_err(|e| (file.key, e))
            }
        }))
        .buffer_unordered(self.concurrency())
        .boxed();

        drain("upload_folder", total, results).await
    }

    /// Downloads every object below `s3://bucket/prefix/` into `local_dir`.
    /// Keys that would resolve outside `local_dir` are reported as failures.
    pub async fn download_folder(
        &self,
        bucket: &str,
        prefix: &str,
        local_dir: impl AsRef<Path>,
    ) -> StoreResult<TransferSummary> {
        let prefix = folder_prefix(prefix);
        let objects = self.objects_under(bucket, &prefix).await?;
        let local_dir = local_dir.as_ref().to_path_buf();

        let objects: Vec<ObjectSummary> = objects
            .into_iter()
            .filter(|object| !is_folder_key(&object.key))
            .collect();
        let total = objects.len();

        tracing::info!(
            target: TRACING_TARGET,
            bucket,
            prefix = %prefix,
            destination = %local_dir.display(),
            objects = total,
            "Downloading folder"
        );

        let results = stream::iter(objects.into_iter().map(|object| {
            let client = self.clone();
            let bucket = bucket.to_string();
            let relative = object
                .key
                .strip_prefix(prefix.as_str())
                .and_then(safe_relative_path);
            let local_dir = local_dir.clone();
            async move {
                let Some(relative) = relative else {
                    let err = StoreError::validation(format!(
                        "key '{}' would be written outside '{}'",
                        object.key,
                        local_dir.display()
                    ));
                    return Err((object.key, err));
                };

                client
                    .download(&bucket, &object.key, local_dir.join(relative))
                    .await
                    .map_err(|e| (object.key, e))
            }
        }))
        .buffer_unordered(self.concurrency())
        .boxed();

        drain("download_folder", total, results).await
    }

    /// Server-side copy of every object below `src_prefix` to the same
    /// relative keys below `dst_prefix`.
    pub async fn copy_folder(
        &self,
        src_bucket: &str,
        src_prefix: &str,
        dst_bucket: &str,
        dst_prefix: &str,
    ) -> StoreResult<TransferSummary> {
        validate_bucket(dst_bucket)?;
        let src_prefix = folder_prefix(src_prefix);
        let dst_prefix = folder_prefix(dst_prefix);
        validate_prefix(&dst_prefix)?;

        let objects: Vec<ObjectSummary> = self
            .objects_under(src_bucket, &src_prefix)
            .await?
            .into_iter()
            .filter(|object| !is_folder_key(&object.key))
            .collect();
        let total = objects.len();

        tracing::info!(
            target: TRACING_TARGET,
            source = %format!("s3://{}/{}", src_bucket, src_prefix),
            destination = %format!("s3://{}/{}", dst_bucket, dst_prefix),
            objects = total,
            "Copying folder"
        );

        let results = stream::iter(objects.into_iter().map(|object| {
            let client = self.clone();
            let src_bucket = src_bucket.to_string();
            let dst_bucket = dst_bucket.to_string();
            let relative = object
                .key
                .strip_prefix(src_prefix.as_str())
                .unwrap_or(&object.key);
            let dst_key = format!("{}{}", dst_prefix, relative);
            async move {
                client
                    .copy(&src_bucket, &object.key, &dst_bucket, &dst_key)
                    .await
                    .map(|_| object.size)
                    .map_err(|e| (object.key, e))
            }
        }))
        .buffer_unordered(self.concurrency())
        .boxed();

        drain("copy_folder", total, results).await
    }

    /// Deletes every object below `s3://bucket/prefix/`, folder markers
    /// included. An empty prefix is refused.
    pub async fn delete_folder(&self, bucket: &str, prefix: &str) -> StoreResult<TransferSummary> {
        if prefix.is_empty() {
            return Err(StoreError::validation(
                "refusing to delete a whole bucket as a folder",
            ));
        }

        let prefix = folder_prefix(prefix);
        let objects = self.objects_under(bucket, &prefix).await?;
        let total = objects.len();

        tracing::info!(target: TRACING_TARGET, bucket, prefix = %prefix, objects = total, "Deleting folder");

        let results = stream::iter(objects.into_iter().map(|object| {
            let client = self.clone();
            let bucket = bucket.to_string();
            async move {
                client
                    .delete(&bucket, &object.key)
                    .await
                    .map(|_| object.size)
                    .map_err(|e| (object.key, e))
            }
        }))
        .buffer_unordered(self.concurrency())
        .boxed();

        drain("delete_folder", total, results).await
    }
}

//! Downloads land in a temporary sibling file and are renamed into place
//! only once the whole body has been written.

use crate::error::{StoreError, StoreResult};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

const STAGING_PREFIX: &str = ".s3bridge-";
const STAGING_SUFFIX: &str = ".part";

/// A partially written download. Dropping it without [`commit`] deletes the
/// temporary file and leaves `destination` untouched.
///
/// [`commit`]: StagedFile::commit
pub(crate) struct StagedFile {
    file: tokio::fs::File,
    temp: TempPath,
    destination: PathBuf,
}

impl StagedFile {
    pub(crate) async fn create(destination: &Path) -> StoreResult<Self> {
        let parent = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|e| StoreError::local_io(&parent, e))?;

        let staging_dir = parent.clone();
        let named = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(STAGING_PREFIX)
                .suffix(STAGING_SUFFIX)
                .tempfile_in(&staging_dir)
        })
        .await
        .map_err(|e| StoreError::transfer(format!("staging task failed: {}", e)))?
        .map_err(|e| StoreError::local_io(&parent, e))?;

        let (file, temp) = named.into_parts();

        Ok(Self {
            file: tokio::fs::File::from_std(file),
            temp,
            destination: destination.to_path_buf(),
        })
    }

    pub(crate) fn destination(&self) -> &Path {
        &self.destination
    }

    pub(crate) fn file(&mut self) -> &mut tokio::fs::File {
        &mut self.file
    }

    /// Flushes the temporary file and renames it over `destination`.
    pub(crate) async fn commit(self) -> StoreResult<()> {
        let Self {
            mut file,
            temp,
            destination,
        } = self;

        file.flush()
            .await
            .map_err(|e| StoreError::local_io(&destination, e))?;
        drop(file);

        temp.persist(&destination)
            .map_err(|e| StoreError::local_io(&destination, e.error))
    }
}

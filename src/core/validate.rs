use crate::error::{StoreError, StoreResult};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

pub(crate) const MAX_KEY_BYTES: usize = 1024;

/// The longest expiry S3 accepts for SigV4 presigned requests.
pub(crate) const MAX_PRESIGN_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

static BUCKET_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]$").expect("bucket pattern is valid")
});

pub(crate) fn validate_bucket(bucket: &str) -> StoreResult<()> {
    if bucket.is_empty() {
        return Err(StoreError::validation("bucket name must not be empty"));
    }

    if !BUCKET_PATTERN.is_match(bucket) || bucket.contains("..") {
        return Err(StoreError::validation(format!(
            "'{}' is not a valid bucket name",
            bucket
        )));
    }

    Ok(())
}

pub(crate) fn validate_key(key: &str) -> StoreResult<()> {
    if key.is_empty() {
        return Err(StoreError::validation("object key must not be empty"));
    }

    validate_prefix(key)
}

pub(crate) fn validate_prefix(prefix: &str) -> StoreResult<()> {
    if prefix.len() > MAX_KEY_BYTES {
        return Err(StoreError::validation(format!(
            "key is {} bytes long, the limit is {}",
            prefix.len(),
            MAX_KEY_BYTES
        )));
    }

    Ok(())
}

pub(crate) fn validate_object(bucket: &str, key: &str) -> StoreResult<()> {
    validate_bucket(bucket)?;
    validate_key(key)
}

pub(crate) fn validate_expiry(expiry: Duration) -> StoreResult<()> {
    if expiry.is_zero() {
        return Err(StoreError::validation("presign expiry must be positive"));
    }

    if expiry > MAX_PRESIGN_EXPIRY {
        return Err(StoreError::validation(format!(
            "presign expiry of {}s exceeds the 7 day limit",
            expiry.as_secs()
        )));
    }

    Ok(())
}

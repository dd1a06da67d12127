//! Error taxonomy shared by every backend and by the facade.

use std::fmt;
use std::path::PathBuf;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// The resource a [`StoreError::NotFound`] refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    Bucket(String),
    Object { bucket: String, key: String },
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::Bucket(bucket) => write!(f, "bucket '{}'", bucket),
            Missing::Object { bucket, key } => write!(f, "object 's3://{}/{}'", bucket, key),
        }
    }
}

/// Errors returned by store operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Malformed input, rejected before any backend call.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The referenced bucket or object does not exist.
    #[error("{missing} not found: {detail}")]
    NotFound { missing: Missing, detail: String },

    /// The backend refused the request.
    #[error("permission denied: {0}")]
    Permission(String),

    /// The request conflicts with the current state of a bucket.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Network or service failure. The caller may retry.
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// The backend cannot perform this operation.
    #[error("{operation} is not supported by the {backend} backend")]
    Unsupported {
        operation: &'static str,
        backend: &'static str,
    },

    /// Reading or writing a local source/destination file failed.
    #[error("local file '{}': {source}", .path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A caller-supplied writer rejected part of an object body.
    #[error("writing the object body failed: {source}")]
    Sink {
        #[source]
        source: std::io::Error,
    },

    /// An object body could not be encoded or decoded.
    #[error("failed to decode/encode JSON for '{key}': {source}")]
    Codec {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The client configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A multi-object operation finished with failures.
    #[error("{} of {total} objects failed (first: {})", .failures.len(), first_failure(.failures))]
    Incomplete {
        total: usize,
        failures: Vec<(String, StoreError)>,
    },
}

fn first_failure(failures: &[(String, StoreError)]) -> String {
    failures
        .first()
        .map(|(key, err)| format!("{}: {}", key, err))
        .unwrap_or_default()
}

/// Coarse classification of a [`StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Permission,
    Conflict,
    Transfer,
    Unsupported,
    LocalIo,
    Codec,
    Config,
    Incomplete,
}

impl StoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn transfer(msg: impl Into<String>) -> Self {
        Self::Transfer(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::Permission(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn bucket_not_found(bucket: &str, detail: impl Into<String>) -> Self {
        Self::NotFound {
            missing: Missing::Bucket(bucket.to_string()),
            detail: detail.into(),
        }
    }

    pub fn object_not_found(bucket: &str, key: &str, detail: impl Into<String>) -> Self {
        Self::NotFound {
            missing: Missing::Object {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            detail: detail.into(),
        }
    }

    pub fn local_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LocalIo {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Permission(_) => ErrorKind::Permission,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Transfer(_) => ErrorKind::Transfer,
            Self::Unsupported { .. } => ErrorKind::Unsupported,
            Self::LocalIo { .. } | Self::Sink { .. } => ErrorKind::LocalIo,
            Self::Codec { .. } => ErrorKind::Codec,
            Self::Config(_) => ErrorKind::Config,
            Self::Incomplete { .. } => ErrorKind::Incomplete,
        }
    }

    /// Only transport/service failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transfer
    }

    pub fn is_missing_object(&self) -> bool {
        matches!(
            self,
            Self::NotFound {
                missing: Missing::Object { .. },
                ..
            }
        )
    }

    pub fn is_missing_bucket(&self) -> bool {
        matches!(
            self,
            Self::NotFound {
                missing: Missing::Bucket(_),
                ..
            }
        )
    }
}

/// What a failed backend request was addressing.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Target<'a> {
    Service,
    Bucket(&'a str),
    Object { bucket: &'a str, key: &'a str },
}

impl Target<'_> {
    fn not_found(self, detail: String) -> StoreError {
        match self {
            Target::Object { bucket, key } => StoreError::object_not_found(bucket, key, detail),
            Target::Bucket(bucket) => StoreError::bucket_not_found(bucket, detail),
            Target::Service => StoreError::Transfer(detail),
        }
    }

    fn missing_bucket(self, detail: String) -> StoreError {
        match self {
            Target::Object { bucket, .. } | Target::Bucket(bucket) => {
                StoreError::bucket_not_found(bucket, detail)
            }
            Target::Service => StoreError::Transfer(detail),
        }
    }
}

/// Whether a filesystem call was looking a path up or creating it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IoAccess {
    /// Reads, metadata lookups and deletes.
    Read,
    /// Creating or overwriting a file or directory.
    Write,
}

/// Maps a filesystem error from the local backend onto the taxonomy.
///
/// A path that runs through a file, or names a directory, holds no object.
/// Lookups report that as missing; writes report it as a conflict with the
/// objects already stored there.
pub(crate) fn classify_io_error(
    err: std::io::Error,
    target: Target<'_>,
    access: IoAccess,
) -> StoreError {
    use std::io::ErrorKind as IoKind;

    let detail = err.to_string();
    match err.kind() {
        IoKind::NotFound => target.not_found(detail),
        IoKind::IsADirectory | IoKind::NotADirectory => match access {
            IoAccess::Read => target.not_found(detail),
            IoAccess::Write => StoreError::Conflict(detail),
        },
        IoKind::PermissionDenied => StoreError::Permission(detail),
        IoKind::AlreadyExists | IoKind::DirectoryNotEmpty => StoreError::Conflict(detail),
        _ => StoreError::Transfer(detail),
    }
}

const PERMISSION_CODES: &[&str] = &[
    "AccessDenied",
    "AllAccessDisabled",
    "ExpiredToken",
    "InvalidAccessKeyId",
    "InvalidToken",
    "SignatureDoesNotMatch",
    "AccountProblem",
];

const CONFLICT_CODES: &[&str] = &[
    "BucketAlreadyExists",
    "BucketAlreadyOwnedByYou",
    "BucketNotEmpty",
    "OperationAborted",
];

const VALIDATION_CODES: &[&str] = &[
    "InvalidBucketName",
    "KeyTooLongError",
    "InvalidArgument",
    "InvalidRequest",
    "InvalidObjectName",
];

/// Maps a service response (HTTP status plus optional error code) onto the
/// taxonomy. The code wins over the status when both are known.
pub(crate) fn classify_service_error(
    status: u16,
    code: Option<&str>,
    target: Target<'_>,
    detail: String,
) -> StoreError {
    match code {
        Some("NoSuchBucket") => return target.missing_bucket(detail),
        Some("NoSuchKey" | "NotFound" | "NoSuchVersion") => return target.not_found(detail),
        Some(code) if PERMISSION_CODES.contains(&code) => return StoreError::Permission(detail),
        Some(code) if CONFLICT_CODES.contains(&code) => return StoreError::Conflict(detail),
        Some(code) if VALIDATION_CODES.contains(&code) => return StoreError::Validation(detail),
        _ => {}
    }

    match status {
        404 => target.not_found(detail),
        401 | 403 => StoreError::Permission(detail),
        409 => StoreError::Conflict(detail),
        _ => StoreError::Transfer(detail),
    }
}

use crate::error::{StoreError, StoreResult};
use std::fmt;
use std::str::FromStr;

const SCHEME: &str = "s3://";

/// An `s3://{bucket}/{key}` link. Existence is never checked here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct S3Uri {
    pub bucket: String,
    pub key: String,
}

impl S3Uri {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Splits a link into bucket and key. Surrounding whitespace is ignored;
    /// the key may be empty (`s3://bucket` or `s3://bucket/`).
    pub fn parse(link: &str) -> StoreResult<Self> {
        let link = link.trim();
        let rest = link.strip_prefix(SCHEME).ok_or_else(|| {
            StoreError::validation(format!("'{}' is not a valid s3 link", link))
        })?;

        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));

        if bucket.is_empty() {
            return Err(StoreError::validation(format!(
                "'{}' does not name a bucket",
                link
            )));
        }

        Ok(Self::new(bucket, key))
    }

    pub fn is_folder(&self) -> bool {
        is_folder_key(&self.key)
    }
}

impl fmt::Display for S3Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", SCHEME, self.bucket, self.key)
    }
}

impl FromStr for S3Uri {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        S3Uri::parse(s)
    }
}

/// Keys ending in `/` stand for folders.
pub fn is_folder_key(key: &str) -> bool {
    key.ends_with('/')
}

/// Joins a folder prefix and a relative path with exactly one `/`.
pub(crate) fn join_key(prefix: &str, relative: &str) -> String {
    let relative = relative.trim_start_matches('/');
    if prefix.is_empty() {
        relative.to_string()
    } else if prefix.ends_with('/') {
        format!("{}{}", prefix, relative)
    } else {
        format!("{}/{}", prefix, relative)
    }
}

/// A prefix that only matches keys inside the folder.
pub(crate) fn folder_prefix(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{}/", prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bucket_and_key() {
        let uri = S3Uri::parse(" s3://test-bucket/sub-folder/inner_file.txt ").unwrap();
        assert_eq!(uri.bucket, "test-bucket");
        assert_eq!(uri.key, "sub-folder/inner_file.txt");
        assert!(!uri.is_folder());

        let folder: S3Uri = "s3://test-bucket/sub-folder/".parse().unwrap();
        assert!(folder.is_folder());
    }

    #[test]
    fn bucket_only_links_have_empty_keys() {
        assert_eq!(S3Uri::parse("s3://test-bucket").unwrap().key, "");
        assert_eq!(S3Uri::parse("s3://test-bucket/").unwrap().key, "");
    }

    #[test]
    fn rejects_links_without_scheme_or_bucket() {
        assert!(S3Uri::parse("badlink").is_err());
        assert!(S3Uri::parse("https://test-bucket/key").is_err());
        assert!(S3Uri::parse("s3:///key").is_err());
    }

    #[test]
    fn display_composes_the_link() {
        let uri = S3Uri::new("test-bucket", "example.json");
        assert_eq!(uri.to_string(), "s3://test-bucket/example.json");
        assert_eq!(S3Uri::parse(&uri.to_string()).unwrap(), uri);
    }

    #[test]
    fn joins_keys() {
        assert_eq!(join_key("", "a.txt"), "a.txt");
        assert_eq!(join_key("docs", "a.txt"), "docs/a.txt");
        assert_eq!(join_key("docs/", "/a.txt"), "docs/a.txt");
        assert_eq!(folder_prefix("docs"), "docs/");
        assert_eq!(folder_prefix(""), "");
    }
}

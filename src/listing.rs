use crate::TRACING_TARGET;
use crate::core::metadata::{ListPage, ObjectSummary, PageRequest};
use crate::error::{StoreError, StoreResult};
use crate::storage_clients::ClientStorage;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::sync::Arc;

/// Largest page a single listing request may ask for.
pub(crate) const MAX_PAGE_SIZE: u32 = 1000;

/// Tuning for [`ObjectStoreClient::list_with`](crate::ObjectStoreClient::list_with).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Groups keys past the first delimiter into common prefixes. Unset
    /// lists recursively.
    pub delimiter: Option<String>,
    /// Keys requested per page, `1..=1000`. Unset leaves it to the backend.
    pub page_size: Option<u32>,
}

impl ListOptions {
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub(crate) fn validate(&self) -> StoreResult<()> {
        if self.delimiter.as_deref() == Some("") {
            return Err(StoreError::validation("delimiter must not be empty"));
        }

        if let Some(page_size) = self.page_size {
            if page_size == 0 || page_size > MAX_PAGE_SIZE {
                return Err(StoreError::validation(format!(
                    "page size {} is outside 1..={}",
                    page_size, MAX_PAGE_SIZE
                )));
            }
        }

        Ok(())
    }
}

struct ListRequest {
    storage: Arc<dyn ClientStorage>,
    bucket: String,
    prefix: String,
    options: ListOptions,
}

impl ListRequest {
    async fn fetch(&self, token: Option<&str>) -> StoreResult<ListPage> {
        let page = self
            .storage
            .list_page(PageRequest {
                bucket: &self.bucket,
                prefix: &self.prefix,
                delimiter: self.options.delimiter.as_deref(),
                continuation_token: token,
                max_keys: self.options.page_size,
            })
            .await?;

        tracing::debug!(
            target: TRACING_TARGET,
            bucket = %self.bucket,
            prefix = %self.prefix,
            objects = page.objects.len(),
            prefixes = page.common_prefixes.len(),
            more = page.next_token.is_some(),
            "Listing page fetched"
        );

        Ok(page)
    }

    async fn next_page(
        &self,
        state: Option<Option<String>>,
    ) -> StoreResult<Option<(ListPage, Option<Option<String>>)>> {
        let Some(token) = state else {
            return Ok(None);
        };

        let page = self.fetch(token.as_deref()).await?;

        let next = match page.next_token.as_deref() {
            None => None,
            Some(next) if next.is_empty() || Some(next) == token.as_deref() => {
                return Err(StoreError::transfer(format!(
                    "listing of s3://{}/{} did not advance past continuation token '{}'",
                    self.bucket, self.prefix, next
                )));
            }
            Some(next) => Some(Some(next.to_string())),
        };

        Ok(Some((page, next)))
    }
}

/// A listing of the keys under a prefix.
///
/// Nothing is fetched until one of the streams is polled. Every call to
/// [`pages`](Self::pages), [`objects`](Self::objects) or [`keys`](Self::keys)
/// starts a fresh pass from the first page and follows continuation tokens
/// until the backend reports the end, so the same listing can be consumed
/// any number of times.
#[derive(Clone)]
pub struct ObjectListing {
    request: Arc<ListRequest>,
}

impl ObjectListing {
    pub(crate) fn new(
        storage: Arc<dyn ClientStorage>,
        bucket: &str,
        prefix: &str,
        options: ListOptions,
    ) -> Self {
        Self {
            request: Arc::new(ListRequest {
                storage,
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
                options,
            }),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.request.bucket
    }

    pub fn prefix(&self) -> &str {
        &self.request.prefix
    }

    pub fn pages(&self) -> BoxStream<'static, StoreResult<ListPage>> {
        let request = Arc::clone(&self.request);

        // State: the token for the next request, `None` once the last page is out.
        stream::try_unfold(Some(None::<String>), move |state| {
            let request = Arc::clone(&request);
            async move { request.next_page(state).await }
        })
        .boxed()
    }

    pub fn objects(&self) -> BoxStream<'static, StoreResult<ObjectSummary>> {
        self.pages()
            .map_ok(|page| stream::iter(page.objects.into_iter().map(Ok::<_, StoreError>)))
            .try_flatten()
            .boxed()
    }

    pub fn keys(&self) -> BoxStream<'static, StoreResult<String>> {
        self.objects().map_ok(|object| object.key).boxed()
    }

    /// Common prefixes, only produced when a delimiter is set.
    pub fn common_prefixes(&self) -> BoxStream<'static, StoreResult<String>> {
        self.pages()
            .map_ok(|page| stream::iter(page.common_prefixes.into_iter().map(Ok::<_, StoreError>)))
            .try_flatten()
            .boxed()
    }

    pub async fn collect_keys(&self) -> StoreResult<Vec<String>> {
        self.keys().try_collect().await
    }

    pub async fn collect_objects(&self) -> StoreResult<Vec<ObjectSummary>> {
        self.objects().try_collect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_bounds() {
        assert!(ListOptions::default().validate().is_ok());
        assert!(ListOptions::default().with_page_size(1).validate().is_ok());
        assert!(ListOptions::default().with_page_size(1000).validate().is_ok());
        assert!(ListOptions::default().with_page_size(0).validate().is_err());
        assert!(ListOptions::default().with_page_size(1001).validate().is_err());
    }

    #[test]
    fn empty_delimiter_is_rejected() {
        let options = ListOptions::default().with_delimiter("");
        assert!(options.validate().is_err());
    }
}

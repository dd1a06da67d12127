use crate::TRACING_TARGET;
use crate::config::{Credentials, S3Config};
use crate::core::metadata::{
    ListPage, ObjectInfo, ObjectSummary, PageRequest, Payload, PresignMethod, PresignedRequest,
    PutOptions, PutReceipt,
};
use crate::error::{Missing, StoreError, StoreResult, Target, classify_service_error};
use crate::storage_clients::ClientStorage;
use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_sdk_s3 as s3;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_types::region::Region;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};

const DEFAULT_REGION: &str = "us-east-1";
const CREDENTIALS_PROVIDER_NAME: &str = "s3bridge";

pub struct S3ClientStorage {
    client: s3::Client,
    region: String,
    endpoint: Option<String>,
    force_path_style: bool,
}

impl S3ClientStorage {
    pub async fn new(config: &S3Config) -> StoreResult<Self> {
        config.validate()?;

        let region = Region::new(config.region.clone());
        let credentials = credentials_provider(&config.credentials, &region).await;

        let mut shared_config = aws_config::SdkConfig::builder()
            .credentials_provider(credentials)
            .region(region);

        if !config.timeouts.is_empty() {
            let mut timeouts = TimeoutConfig::builder();
            timeouts.set_operation_timeout(config.timeouts.operation());
            timeouts.set_operation_attempt_timeout(config.timeouts.attempt());
            shared_config = shared_config.timeout_config(timeouts.build());
        }

        if let Some(max_attempts) = config.max_attempts {
            shared_config =
                shared_config.retry_config(RetryConfig::standard().with_max_attempts(max_attempts));
        }

        let shared_config = shared_config.build();

        let mut s3_config_builder =
            s3::config::Builder::from(&shared_config).force_path_style(config.force_path_style);
        if let Some(endpoint) = &config.endpoint_override {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = s3::Client::from_conf(s3_config_builder.build());

        tracing::info!(
            target: TRACING_TARGET,
            region = %config.region,
            endpoint = config.endpoint_override.as_deref().unwrap_or("default"),
            force_path_style = config.force_path_style,
            "S3 client initialized"
        );

        Ok(Self {
            client,
            region: config.region.clone(),
            endpoint: config.endpoint_override.clone(),
            force_path_style: config.force_path_style,
        })
    }

    /// Wraps an already configured SDK client.
    pub fn from_client(client: s3::Client) -> Self {
        let region = client
            .config()
            .region()
            .map(|region| region.to_string())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        Self {
            client,
            region,
            endpoint: None,
            force_path_style: false,
        }
    }

    pub fn client(&self) -> &s3::Client {
        &self.client
    }
}

async fn credentials_provider(credentials: &Credentials, region: &Region) -> SharedCredentialsProvider {
    match credentials {
        Credentials::Static {
            access_key_id,
            secret_access_key,
            session_token,
        } => SharedCredentialsProvider::new(aws_credential_types::Credentials::new(
            access_key_id,
            secret_access_key,
            session_token.clone(),
            None,
            CREDENTIALS_PROVIDER_NAME,
        )),
        Credentials::Profile { name } => SharedCredentialsProvider::new(
            aws_config::profile::ProfileFileCredentialsProvider::builder()
                .profile_name(name)
                .build(),
        ),
        Credentials::AssumeRole {
            role_arn,
            session_name,
        } => {
            let mut builder =
                aws_config::sts::AssumeRoleProvider::builder(role_arn).region(region.clone());
            if let Some(session_name) = session_name {
                builder = builder.session_name(session_name);
            }
            SharedCredentialsProvider::new(builder.build().await)
        }
        Credentials::Environment => SharedCredentialsProvider::new(
            aws_config::default_provider::credentials::DefaultCredentialsChain::builder()
                .region(region.clone())
                .build()
                .await,
        ),
    }
}

/// Turns an SDK failure into a [`StoreError`], keeping the full diagnostic
/// chain as the message.
fn classify<E>(err: SdkError<E>, target: Target<'_>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let detail = DisplayErrorContext(&err).to_string();

    match &err {
        SdkError::ServiceError(service) => classify_service_error(
            service.raw().status().as_u16(),
            service.err().code(),
            target,
            detail,
        ),
        SdkError::ConstructionFailure(_) => StoreError::Validation(detail),
        _ => StoreError::Transfer(detail),
    }
}

/// Percent-encodes each path segment, keeping the `/` separators.
fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn to_chrono(time: Option<&aws_sdk_s3::primitives::DateTime>) -> Option<DateTime<Utc>> {
    time.and_then(|time| DateTime::<Utc>::from_timestamp(time.secs(), time.subsec_nanos()))
}

fn non_negative(size: Option<i64>) -> u64 {
    size.unwrap_or(0).max(0) as u64
}

/// Copy failures are classified against the source. When the destination
/// bucket turns out to be the missing one, the error is re-pointed at it.
fn attribute_missing_bucket(
    err: StoreError,
    dst_bucket: &str,
    destination_missing: bool,
) -> StoreError {
    match err {
        StoreError::NotFound {
            missing: Missing::Bucket(_),
            detail,
        } if destination_missing => StoreError::bucket_not_found(dst_bucket, detail),
        other => other,
    }
}

#[async_trait]
impl ClientStorage for S3ClientStorage {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        payload: Payload,
        options: &PutOptions,
    ) -> StoreResult<PutReceipt> {
        let body = match payload {
            Payload::Bytes(bytes) => ByteStream::from(bytes),
            Payload::File(path) => ByteStream::from_path(&path)
                .await
                .map_err(|e| StoreError::local_io(&path, std::io::Error::other(e)))?,
        };

        let mut request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .set_content_type(options.content_type.clone())
            .set_cache_control(options.cache_control.clone())
            .set_content_disposition(options.content_disposition.clone());

        for (name, value) in &options.metadata {
            request = request.metadata(name, value);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| classify(e, Target::Object { bucket, key }))?;

        Ok(PutReceipt {
            etag: resp.e_tag().map(str::to_string),
            version_id: resp.version_id().map(str::to_string),
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Bytes> {
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(e, Target::Object { bucket, key }))?;

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| StoreError::transfer(format!("failed to read body of '{}': {}", key, e)))?;

        Ok(data.into_bytes())
    }

    async fn write_object(
        &self,
        bucket: &str,
        key: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> StoreResult<u64> {
        let mut resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(e, Target::Object { bucket, key }))?;

        let mut written = 0u64;
        while let Some(chunk) = resp.body.try_next().await.map_err(|e| {
            StoreError::transfer(format!("failed to read body of '{}': {}", key, e))
        })? {
            sink.write_all(&chunk)
                .await
                .map_err(|source| StoreError::Sink { source })?;
            written += chunk.len() as u64;
        }

        Ok(written)
    }

    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectInfo> {
        let resp = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(e, Target::Object { bucket, key }))?;

        Ok(ObjectInfo {
            key: key.to_string(),
            size: non_negative(resp.content_length()),
            etag: resp.e_tag().map(str::to_string),
            last_modified: to_chrono(resp.last_modified()),
            content_type: resp.content_type().map(str::to_string),
            metadata: resp
                .metadata()
                .map(|metadata| {
                    metadata
                        .iter()
                        .map(|(name, value)| (name.clone(), value.clone()))
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(e, Target::Object { bucket, key }))?;
        Ok(())
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> StoreResult<PutReceipt> {
        let resp = self
            .client
            .copy_object()
            .copy_source(format!("{}/{}", src_bucket, encode_key(src_key)))
            .bucket(dst_bucket)
            .key(dst_key)
            .send()
            .await;

        let resp = match resp {
            Ok(resp) => resp,
            Err(e) => {
                let err = classify(
                    e,
                    Target::Object {
                        bucket: src_bucket,
                        key: src_key,
                    },
                );
                if !err.is_missing_bucket() || src_bucket == dst_bucket {
                    return Err(err);
                }
                // NoSuchBucket does not say which side of the copy is missing.
                let destination_missing = matches!(
                    self.head_bucket(dst_bucket).await,
                    Err(ref head) if head.is_missing_bucket()
                );
                return Err(attribute_missing_bucket(err, dst_bucket, destination_missing));
            }
        };

        Ok(PutReceipt {
            etag: resp
                .copy_object_result()
                .and_then(|result| result.e_tag())
                .map(str::to_string),
            version_id: resp.version_id().map(str::to_string),
        })
    }

    async fn list_page(&self, request: PageRequest<'_>) -> StoreResult<ListPage> {
        let mut req = self.client.list_objects_v2().bucket(request.bucket);

        if !request.prefix.is_empty() {
            req = req.prefix(request.prefix);
        }

        if let Some(delimiter) = request.delimiter {
            req = req.delimiter(delimiter);
        }

        if let Some(token) = request.continuation_token {
            req = req.continuation_token(token);
        }

        if let Some(max_keys) = request.max_keys {
            req = req.max_keys(i32::try_from(max_keys).unwrap_or(i32::MAX));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| classify(e, Target::Bucket(request.bucket)))?;

        let objects = resp
            .contents()
            .iter()
            .filter_map(|object| {
                object.key().map(|key| ObjectSummary {
                    key: key.to_string(),
                    size: non_negative(object.size()),
                    etag: object.e_tag().map(str::to_string),
                    last_modified: to_chrono(object.last_modified()),
                })
            })
            .collect();

        let common_prefixes = resp
            .common_prefixes()
            .iter()
            .filter_map(|prefix| prefix.prefix().map(str::to_string))
            .collect();

        Ok(ListPage {
            objects,
            common_prefixes,
            next_token: resp.next_continuation_token().map(str::to_string),
        })
    }

    async fn presign(
        &self,
        bucket: &str,
        key: &str,
        method: PresignMethod,
        expires_in: Duration,
    ) -> StoreResult<PresignedRequest> {
        let presigning_config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StoreError::validation(format!("invalid presign expiry: {}", e)))?;
        let target = Target::Object { bucket, key };

        let presigned = match method {
            PresignMethod::Get => self
                .client
                .get_object()
                .bucket(bucket)
                .key(key)
                .presigned(presigning_config)
                .await
                .map_err(|e| classify(e, target))?,
            PresignMethod::Put => self
                .client
                .put_object()
                .bucket(bucket)
                .key(key)
                .presigned(presigning_config)
                .await
                .map_err(|e| classify(e, target))?,
        };

        Ok(PresignedRequest {
            url: presigned.uri().to_string(),
            method: presigned.method().to_string(),
            expires_in,
        })
    }

    async fn create_bucket(&self, bucket: &str) -> StoreResult<()> {
        let mut request = self.client.create_bucket().bucket(bucket);

        // us-east-1 rejects an explicit location constraint.
        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        request
            .send()
            .await
            .map_err(|e| classify(e, Target::Bucket(bucket)))?;
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> StoreResult<()> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| classify(e, Target::Bucket(bucket)))?;
        Ok(())
    }

    async fn head_bucket(&self, bucket: &str) -> StoreResult<()> {
        self.client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| classify(e, Target::Bucket(bucket)))?;
        Ok(())
    }

    async fn list_buckets(&self) -> StoreResult<Vec<String>> {
        let resp = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| classify(e, Target::Service))?;

        Ok(resp
            .buckets()
            .iter()
            .filter_map(|bucket| bucket.name().map(str::to_string))
            .collect())
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        let key = encode_key(key);

        match &self.endpoint {
            Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, key),
            None if self.force_path_style => {
                format!("https://s3.{}.amazonaws.com/{}/{}", self.region, bucket, key)
            }
            None => format!("https://{}.s3.{}.amazonaws.com/{}", bucket, self.region, key),
        }
    }
}

//! The concrete adapter over an S3-compatible service.
//!
//! [`S3ObjectStore`] wraps `aws-sdk-s3` with the SDK's own retries disabled;
//! every call goes through [`crate::retry::with_retries`] instead so the
//! backoff behavior is uniform and test-controllable. The SDK owns request
//! signing and HTTP transport.

use std::time::Duration;

use aws_credential_types::Credentials;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    Delete, ObjectIdentifier as AwsObjectIdentifier, ObjectLockMode, ObjectLockRetention,
    ObjectLockRetentionMode, StorageClass,
};
use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
use aws_smithy_types::error::display::DisplayErrorContext;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::StoreError;
use crate::retry::{RetryPolicy, with_retries};
use crate::store::ObjectStore;
use crate::types::{
    DeleteEntryError, DeleteMarkerInfo, DeleteResult, GetObjectResponse, ObjectIdentifier,
    ObjectMetadata, ObjectVersionInfo, PutBody, PutObjectResponse, PutRequest, Retention,
    RetentionMode, SHA256_METADATA_KEY, VersionListing,
};

/// Page size for version listings.
const LIST_PAGE_SIZE: i32 = 1000;

/// Per-request timeout applied to every SDK operation attempt.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Connection settings for one bucket on an S3-compatible endpoint.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Endpoint host, with optional port (no scheme).
    pub endpoint: String,
    /// Region name sent with signed requests.
    pub region: String,
    /// Bucket name.
    pub bucket: String,
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Storage class applied to uploads, when set.
    pub storage_class: Option<String>,
    /// Use plain HTTP. Test environments only.
    pub insecure: bool,
}

impl S3Config {
    /// The full endpoint URL, scheme derived from [`S3Config::insecure`].
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        let scheme = if self.insecure { "http" } else { "https" };
        format!("{scheme}://{}", self.endpoint)
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Object store adapter backed by `aws-sdk-s3`.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    storage_class: Option<String>,
    retry: RetryPolicy,
}

impl S3ObjectStore {
    /// Build an adapter from connection settings with the standard retry
    /// policy.
    #[must_use]
    pub fn new(config: &S3Config) -> Self {
        Self::with_retry_policy(config, RetryPolicy::standard())
    }

    /// Build an adapter with an explicit retry policy.
    #[must_use]
    pub fn with_retry_policy(config: &S3Config, retry: RetryPolicy) -> Self {
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "pickle",
        );

        let sdk_config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .endpoint_url(config.endpoint_url())
            .force_path_style(true)
            // Retries are handled by this crate's own wrapper.
            .retry_config(RetryConfig::disabled())
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_attempt_timeout(ATTEMPT_TIMEOUT)
                    .build(),
            )
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket.clone(),
            storage_class: config.storage_class.clone(),
            retry,
        }
    }

    async fn send_put(
        &self,
        request: &PutRequest,
        body: ByteStream,
    ) -> Result<PutObjectResponse, StoreError> {
        let mut op = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&request.key)
            .content_type("application/octet-stream")
            .content_length(request.content_length as i64)
            .body(body);

        if let Some(crc32c) = &request.crc32c {
            op = op.checksum_crc32_c(crc32c.clone());
        }
        if let Some(sha256) = &request.content_sha256 {
            op = op.metadata(SHA256_METADATA_KEY, sha256.clone());
        }
        if let Some(retention) = &request.retention {
            op = op
                .object_lock_mode(to_lock_mode(retention.mode))
                .object_lock_retain_until_date(to_aws_datetime(retention.retain_until));
        }
        if let Some(class) = &self.storage_class {
            op = op.storage_class(StorageClass::from(class.as_str()));
        }

        let output = op
            .send()
            .await
            .map_err(|err| classify("PutObject", &request.key, err))?;

        Ok(PutObjectResponse {
            version_id: output.version_id().unwrap_or_default().to_owned(),
        })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list_all_object_versions(&self, prefix: &str) -> Result<VersionListing, StoreError> {
        let mut listing = VersionListing::default();
        let mut key_marker: Option<String> = None;
        let mut version_id_marker: Option<String> = None;

        loop {
            let output = with_retries(&self.retry, || {
                let key_marker = key_marker.clone();
                let version_id_marker = version_id_marker.clone();
                async move {
                    self.client
                        .list_object_versions()
                        .bucket(&self.bucket)
                        .set_prefix((!prefix.is_empty()).then(|| prefix.to_owned()))
                        .set_key_marker(key_marker)
                        .set_version_id_marker(version_id_marker)
                        .max_keys(LIST_PAGE_SIZE)
                        .send()
                        .await
                        .map_err(|err| classify("ListObjectVersions", prefix, err))
                }
            })
            .await?;

            for version in output.versions() {
                listing.versions.push(ObjectVersionInfo {
                    key: version.key().unwrap_or_default().to_owned(),
                    version_id: version.version_id().unwrap_or_default().to_owned(),
                    is_latest: version.is_latest().unwrap_or_default(),
                    last_modified: version
                        .last_modified()
                        .and_then(from_aws_datetime)
                        .unwrap_or_default(),
                    size: version.size().unwrap_or_default().max(0) as u64,
                    storage_class: version.storage_class().map(|c| c.as_str().to_owned()),
                });
            }
            for marker in output.delete_markers() {
                listing.delete_markers.push(DeleteMarkerInfo {
                    key: marker.key().unwrap_or_default().to_owned(),
                    version_id: marker.version_id().unwrap_or_default().to_owned(),
                    is_latest: marker.is_latest().unwrap_or_default(),
                });
            }

            if !output.is_truncated().unwrap_or_default() {
                break;
            }
            key_marker = output.next_key_marker().map(ToOwned::to_owned);
            version_id_marker = output.next_version_id_marker().map(ToOwned::to_owned);
            if key_marker.is_none() && version_id_marker.is_none() {
                break;
            }
        }

        debug!(
            prefix,
            versions = listing.versions.len(),
            delete_markers = listing.delete_markers.len(),
            "listed object versions"
        );
        Ok(listing)
    }

    async fn put_object(
        &self,
        request: PutRequest,
        body: PutBody,
    ) -> Result<PutObjectResponse, StoreError> {
        let request = &request;
        match body {
            PutBody::Bytes(bytes) => {
                with_retries(&self.retry, move || {
                    let bytes = bytes.clone();
                    async move { self.send_put(request, ByteStream::from(bytes)).await }
                })
                .await
            }
            PutBody::File(path) => {
                with_retries(&self.retry, move || {
                    let path = path.clone();
                    async move {
                        let body = ByteStream::from_path(&path)
                            .await
                            .map_err(|err| StoreError::BodyIo(std::io::Error::other(err)))?;
                        self.send_put(request, body).await
                    }
                })
                .await
            }
            // A one-shot stream cannot be replayed; send a single attempt.
            PutBody::Stream(stream) => self.send_put(request, stream).await,
        }
    }

    async fn get_object(
        &self,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<GetObjectResponse, StoreError> {
        let output = with_retries(&self.retry, || async {
            self.client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .set_version_id(version_id.map(ToOwned::to_owned))
                .send()
                .await
                .map_err(|err| classify("GetObject", key, err))
        })
        .await?;

        let metadata = ObjectMetadata {
            key: key.to_owned(),
            version_id: output.version_id().unwrap_or_default().to_owned(),
            content_sha256: output
                .metadata()
                .and_then(|meta| meta.get(SHA256_METADATA_KEY))
                .cloned(),
            crc32c: output.checksum_crc32_c().map(ToOwned::to_owned),
            content_length: output.content_length().map(|len| len.max(0) as u64),
            retention: retention_from(
                output.object_lock_mode(),
                output.object_lock_retain_until_date(),
            ),
        };

        Ok(GetObjectResponse {
            body: output.body,
            metadata,
        })
    }

    async fn head_object(
        &self,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<ObjectMetadata, StoreError> {
        let output = with_retries(&self.retry, || async {
            self.client
                .head_object()
                .bucket(&self.bucket)
                .key(key)
                .set_version_id(version_id.map(ToOwned::to_owned))
                .send()
                .await
                .map_err(|err| classify("HeadObject", key, err))
        })
        .await?;

        Ok(ObjectMetadata {
            key: key.to_owned(),
            version_id: output.version_id().unwrap_or_default().to_owned(),
            content_sha256: output
                .metadata()
                .and_then(|meta| meta.get(SHA256_METADATA_KEY))
                .cloned(),
            crc32c: output.checksum_crc32_c().map(ToOwned::to_owned),
            content_length: output.content_length().map(|len| len.max(0) as u64),
            retention: retention_from(
                output.object_lock_mode(),
                output.object_lock_retain_until_date(),
            ),
        })
    }

    async fn delete_objects(
        &self,
        objects: Vec<ObjectIdentifier>,
    ) -> Result<DeleteResult, StoreError> {
        let identifiers = objects
            .iter()
            .map(|object| {
                AwsObjectIdentifier::builder()
                    .key(&object.key)
                    .set_version_id(object.version_id.clone())
                    .build()
                    .map_err(|err| StoreError::Decode {
                        context: "DeleteObjects",
                        message: err.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let output = with_retries(&self.retry, || {
            let identifiers = identifiers.clone();
            async move {
                let delete = Delete::builder()
                    .set_objects(Some(identifiers))
                    .quiet(false)
                    .build()
                    .map_err(|err| StoreError::Decode {
                        context: "DeleteObjects",
                        message: err.to_string(),
                    })?;
                self.client
                    .delete_objects()
                    .bucket(&self.bucket)
                    .delete(delete)
                    .send()
                    .await
                    .map_err(|err| classify("DeleteObjects", "", err))
            }
        })
        .await?;

        let mut result = DeleteResult::default();
        for deleted in output.deleted() {
            result.deleted.push(ObjectIdentifier {
                key: deleted.key().unwrap_or_default().to_owned(),
                version_id: deleted.version_id().map(ToOwned::to_owned),
            });
        }
        for err in output.errors() {
            result.errors.push(DeleteEntryError {
                key: err.key().unwrap_or_default().to_owned(),
                version_id: err.version_id().map(ToOwned::to_owned),
                code: err.code().unwrap_or_default().to_owned(),
                message: err.message().unwrap_or_default().to_owned(),
            });
        }
        Ok(result)
    }

    async fn put_object_retention(
        &self,
        key: &str,
        version_id: &str,
        retention: &Retention,
    ) -> Result<(), StoreError> {
        with_retries(&self.retry, || async {
            let retention = ObjectLockRetention::builder()
                .mode(to_retention_mode(retention.mode))
                .retain_until_date(to_aws_datetime(retention.retain_until))
                .build();
            self.client
                .put_object_retention()
                .bucket(&self.bucket)
                .key(key)
                .version_id(version_id)
                .retention(retention)
                .send()
                .await
                .map(|_| ())
                .map_err(|err| classify("PutObjectRetention", key, err))
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

fn classify<E>(
    operation: &'static str,
    key: &str,
    err: SdkError<E, HttpResponse>,
) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match &err {
        SdkError::ServiceError(context) => {
            let status = context.raw().status().as_u16();
            let code = err.code().unwrap_or_default().to_owned();
            let message = err.message().unwrap_or_default().to_owned();
            if status == 404 || code == "NoSuchKey" || code == "NotFound" {
                StoreError::NotFound {
                    key: key.to_owned(),
                }
            } else {
                StoreError::Service {
                    operation,
                    status,
                    message: format!("{code}: {message}"),
                }
            }
        }
        SdkError::ConstructionFailure(_) => StoreError::Decode {
            context: operation,
            message: DisplayErrorContext(&err).to_string(),
        },
        _ => StoreError::Network {
            operation,
            message: DisplayErrorContext(&err).to_string(),
        },
    }
}

fn to_lock_mode(mode: RetentionMode) -> ObjectLockMode {
    match mode {
        RetentionMode::Governance => ObjectLockMode::Governance,
        RetentionMode::Compliance => ObjectLockMode::Compliance,
    }
}

fn to_retention_mode(mode: RetentionMode) -> ObjectLockRetentionMode {
    match mode {
        RetentionMode::Governance => ObjectLockRetentionMode::Governance,
        RetentionMode::Compliance => ObjectLockRetentionMode::Compliance,
    }
}

fn to_aws_datetime(dt: DateTime<Utc>) -> aws_smithy_types::DateTime {
    aws_smithy_types::DateTime::from_millis(dt.timestamp_millis())
}

fn from_aws_datetime(dt: &aws_smithy_types::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(dt.to_millis().ok()?)
}

fn retention_from(
    mode: Option<&ObjectLockMode>,
    retain_until: Option<&aws_smithy_types::DateTime>,
) -> Option<Retention> {
    let mode = match mode? {
        ObjectLockMode::Governance => RetentionMode::Governance,
        ObjectLockMode::Compliance => RetentionMode::Compliance,
        _ => return None,
    };
    Some(Retention {
        mode,
        retain_until: from_aws_datetime(retain_until?)?,
    })
}

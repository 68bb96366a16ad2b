//! Storage collaborator contract

use async_trait::async_trait;
use bucketgate_core::BackendError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

/// Streamed object payload
pub type ObjectBody = BoxStream<'static, Result<Bytes, std::io::Error>>;

/// Response headers describing an object.
///
/// Every field is optional; the gateway only emits what the backend returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectHeaders {
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub content_length: Option<i64>,
    pub content_range: Option<String>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub expires: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Result of a GET
pub struct GetObjectOutput {
    pub headers: ObjectHeaders,
    pub body: ObjectBody,
}

/// Current state of an object, as reported by HEAD
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub content_length: Option<i64>,
    pub content_type: Option<String>,
}

/// Result of a PUT
#[derive(Debug, Clone, Default)]
pub struct PutObjectOutput {
    pub etag: Option<String>,
}

/// Parameters of a single list page request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjectsRequest {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    pub max_keys: Option<i32>,
    pub continuation_token: Option<String>,
    pub start_after: Option<String>,
}

/// One page of a bucket listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectSummary>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}

/// Summary of an object in a listing
#[derive(Debug, Clone)]
pub struct ObjectSummary {
    pub key: String,
    pub etag: Option<String>,
    pub size: i64,
    pub last_modified: Option<DateTime<Utc>>,
    pub storage_class: Option<String>,
}

/// Identifiers of a freshly created multipart upload
#[derive(Debug, Clone)]
pub struct CreateMultipartOutput {
    pub key: String,
    pub upload_id: String,
}

/// Completed part for multipart upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: i32,
    pub etag: String,
}

/// Result of completing a multipart upload
#[derive(Debug, Clone, Default)]
pub struct CompleteMultipartOutput {
    pub key: Option<String>,
    pub etag: Option<String>,
    pub location: Option<String>,
}

/// Parameters of a ListMultipartUploads call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListUploadsRequest {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    pub max_uploads: Option<i32>,
}

/// One page of in-progress multipart uploads
#[derive(Debug, Clone, Default)]
pub struct UploadsPage {
    pub uploads: Vec<UploadSummary>,
    pub is_truncated: bool,
    pub key_marker: Option<String>,
    pub upload_id_marker: Option<String>,
    pub next_key_marker: Option<String>,
    pub next_upload_id_marker: Option<String>,
}

/// Information about a multipart upload (for listing)
#[derive(Debug, Clone)]
pub struct UploadSummary {
    pub key: String,
    pub upload_id: String,
    pub initiated: Option<DateTime<Utc>>,
}

/// Static website settings of the backend bucket
#[derive(Debug, Clone, Default)]
pub struct WebsiteConfig {
    pub index_suffix: Option<String>,
}

/// Object storage the gateway forwards to.
///
/// Each implementation is bound to a single bucket. Retries, credentials and
/// timeouts are the implementation's business.
#[async_trait]
pub trait ObjectBackend: Send + Sync {
    /// Name of the bucket this backend serves
    fn bucket(&self) -> &str;

    /// Get an object, optionally a byte range of it
    async fn get_object(
        &self,
        key: &str,
        range: Option<&str>,
    ) -> Result<GetObjectOutput, BackendError>;

    /// Fetch object metadata without the payload
    async fn head_object(&self, key: &str) -> Result<ObjectMetadata, BackendError>;

    /// Put an object
    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<PutObjectOutput, BackendError>;

    /// Delete an object
    async fn delete_object(&self, key: &str) -> Result<(), BackendError>;

    /// Fetch a single page of objects
    async fn list_objects(&self, request: ListObjectsRequest) -> Result<ListPage, BackendError>;

    /// Create a multipart upload
    async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<CreateMultipartOutput, BackendError>;

    /// Upload a part, returning its ETag
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<Option<String>, BackendError>;

    /// Complete a multipart upload
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<CompleteMultipartOutput, BackendError>;

    /// Abort a multipart upload
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str)
        -> Result<(), BackendError>;

    /// List in-progress multipart uploads
    async fn list_multipart_uploads(
        &self,
        request: ListUploadsRequest,
    ) -> Result<UploadsPage, BackendError>;

    /// Fetch the bucket's static website configuration
    async fn website_config(&self) -> Result<WebsiteConfig, BackendError>;
}

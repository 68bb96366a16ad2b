//! Backend talking to a real S3-compatible service through aws-sdk-s3

use super::traits::*;
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{BehaviorVersion, Credentials, Region},
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    primitives::{ByteStream, DateTime as SmithyDateTime},
    types::{CompletedMultipartUpload, CompletedPart as SdkCompletedPart},
    Client, Config,
};
use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
use bucketgate_core::{BackendError, Site};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use tracing::{debug, info};

/// Backend bound to one bucket of one remote service
#[derive(Clone, Debug)]
pub struct SdkBackend {
    client: Client,
    bucket: String,
}

impl SdkBackend {
    /// Build a client from a site's credentials, region and endpoint
    pub fn from_site(site: &Site) -> Self {
        let credentials = Credentials::new(
            site.aws_key.clone(),
            site.aws_secret.clone(),
            None,
            None,
            "bucketgate-site",
        );

        let mut builder = Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(site.aws_region.clone()))
            .behavior_version(BehaviorVersion::latest());

        if let Some(endpoint) = site.aws_endpoint.as_deref().filter(|e| !e.is_empty()) {
            let normalized = normalize_wasabi_endpoint(endpoint, &site.aws_region);
            if normalized != endpoint {
                info!(
                    from = %endpoint,
                    to = %normalized,
                    region = %site.aws_region,
                    "Normalized backend endpoint"
                );
            }
            builder = builder.endpoint_url(normalized).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: site.aws_bucket.clone(),
        }
    }
}

/// Rewrite a generic Wasabi endpoint into its region-specific form.
///
/// Wasabi only accepts signatures against `s3.<region>.wasabisys.com`. Any
/// endpoint that already mentions the region, or is not Wasabi, is returned
/// unchanged.
pub fn normalize_wasabi_endpoint(endpoint: &str, region: &str) -> String {
    if endpoint.contains(region) || !endpoint.contains("wasabisys.com") {
        return endpoint.to_string();
    }
    if endpoint.contains("s3.wasabisys.com") {
        return endpoint.replacen("s3.wasabisys.com", &format!("s3.{region}.wasabisys.com"), 1);
    }
    endpoint.to_string()
}

/// Map an SDK failure onto the gateway's backend error.
///
/// A response status is kept whenever the service actually answered.
fn backend_error<E>(err: SdkError<E, HttpResponse>) -> BackendError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match err.raw_response().map(|r| r.status().as_u16()) {
        Some(status) => BackendError::Service {
            code: err.code().map(str::to_string),
            status: Some(status),
            message: err
                .message()
                .map_or_else(|| DisplayErrorContext(&err).to_string(), str::to_string),
        },
        None => BackendError::Transport(DisplayErrorContext(&err).to_string()),
    }
}

fn to_chrono(dt: &SmithyDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

/// Turn the SDK body into the gateway's streamed payload
fn into_body(body: ByteStream) -> ObjectBody {
    stream::unfold(body, |mut body| async move {
        body.next()
            .await
            .map(|chunk| (chunk.map_err(std::io::Error::other), body))
    })
    .boxed()
}

#[async_trait]
impl ObjectBackend for SdkBackend {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn get_object(
        &self,
        key: &str,
        range: Option<&str>,
    ) -> Result<GetObjectOutput, BackendError> {
        debug!(bucket = %self.bucket, key = %key, range = ?range, "GetObject");
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .set_range(range.map(str::to_string))
            .send()
            .await
            .map_err(backend_error)?;

        let headers = ObjectHeaders {
            cache_control: output.cache_control().map(str::to_string),
            content_disposition: output.content_disposition().map(str::to_string),
            content_encoding: output.content_encoding().map(str::to_string),
            content_language: output.content_language().map(str::to_string),
            content_length: output.content_length(),
            content_range: output.content_range().map(str::to_string),
            content_type: output.content_type().map(str::to_string),
            etag: output.e_tag().map(str::to_string),
            expires: output.expires_string().map(str::to_string),
            last_modified: output.last_modified().and_then(to_chrono),
        };

        Ok(GetObjectOutput {
            headers,
            body: into_body(output.body),
        })
    }

    async fn head_object(&self, key: &str) -> Result<ObjectMetadata, BackendError> {
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(backend_error)?;

        Ok(ObjectMetadata {
            etag: output.e_tag().map(str::to_string),
            last_modified: output.last_modified().and_then(to_chrono),
            content_length: output.content_length(),
            content_type: output.content_type().map(str::to_string),
        })
    }

    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<PutObjectOutput, BackendError> {
        debug!(bucket = %self.bucket, key = %key, size = data.len(), "PutObject");
        let output = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(backend_error)?;

        Ok(PutObjectOutput {
            etag: output.e_tag().map(str::to_string),
        })
    }

    async fn delete_object(&self, key: &str) -> Result<(), BackendError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(backend_error)?;
        Ok(())
    }

    async fn list_objects(&self, request: ListObjectsRequest) -> Result<ListPage, BackendError> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .set_prefix(request.prefix)
            .set_delimiter(request.delimiter)
            .set_max_keys(request.max_keys)
            .set_continuation_token(request.continuation_token)
            .set_start_after(request.start_after)
            .send()
            .await
            .map_err(backend_error)?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|obj| {
                Some(ObjectSummary {
                    key: obj.key()?.to_string(),
                    etag: obj.e_tag().map(str::to_string),
                    size: obj.size().unwrap_or(0),
                    last_modified: obj.last_modified().and_then(to_chrono),
                    storage_class: obj.storage_class().map(|c| c.as_str().to_string()),
                })
            })
            .collect();

        let common_prefixes = output
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(str::to_string))
            .collect();

        Ok(ListPage {
            objects,
            common_prefixes,
            is_truncated: output.is_truncated().unwrap_or(false),
            next_continuation_token: output.next_continuation_token().map(str::to_string),
        })
    }

    async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<CreateMultipartOutput, BackendError> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(backend_error)?;

        let upload_id = output
            .upload_id()
            .ok_or_else(|| BackendError::Transport("backend returned no UploadId".into()))?;

        Ok(CreateMultipartOutput {
            key: output.key().unwrap_or(key).to_string(),
            upload_id: upload_id.to_string(),
        })
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<Option<String>, BackendError> {
        debug!(key = %key, upload_id = %upload_id, part_number, size = data.len(), "UploadPart");
        let output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(backend_error)?;

        Ok(output.e_tag().map(str::to_string))
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<CompleteMultipartOutput, BackendError> {
        let parts = parts
            .into_iter()
            .map(|p| {
                SdkCompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(p.etag)
                    .build()
            })
            .collect();
        let upload = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(upload)
            .send()
            .await
            .map_err(backend_error)?;

        Ok(CompleteMultipartOutput {
            key: output.key().map(str::to_string),
            etag: output.e_tag().map(str::to_string),
            location: output.location().map(str::to_string),
        })
    }

    async fn abort_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
    ) -> Result<(), BackendError> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(backend_error)?;
        Ok(())
    }

    async fn list_multipart_uploads(
        &self,
        request: ListUploadsRequest,
    ) -> Result<UploadsPage, BackendError> {
        let output = self
            .client
            .list_multipart_uploads()
            .bucket(&self.bucket)
            .set_prefix(request.prefix)
            .set_delimiter(request.delimiter)
            .set_max_uploads(request.max_uploads)
            .send()
            .await
            .map_err(backend_error)?;

        let uploads = output
            .uploads()
            .iter()
            .filter_map(|u| {
                Some(UploadSummary {
                    key: u.key()?.to_string(),
                    upload_id: u.upload_id()?.to_string(),
                    initiated: u.initiated().and_then(to_chrono),
                })
            })
            .collect();

        Ok(UploadsPage {
            uploads,
            is_truncated: output.is_truncated().unwrap_or(false),
            key_marker: output.key_marker().map(str::to_string),
            upload_id_marker: output.upload_id_marker().map(str::to_string),
            next_key_marker: output.next_key_marker().map(str::to_string),
            next_upload_id_marker: output.next_upload_id_marker().map(str::to_string),
        })
    }

    async fn website_config(&self) -> Result<WebsiteConfig, BackendError> {
        let output = self
            .client
            .get_bucket_website()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(backend_error)?;

        Ok(WebsiteConfig {
            index_suffix: output.index_document().map(|d| d.suffix().to_string()),
        })
    }
}

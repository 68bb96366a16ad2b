//! In-memory single-bucket backend

use super::traits::*;
use async_trait::async_trait;
use bucketgate_core::BackendError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::{future, stream, StreamExt};
use md5::{Digest, Md5};
use std::collections::HashMap;
use uuid::Uuid;

/// In-memory stored object
struct StoredObject {
    data: Bytes,
    etag: String,
    content_type: String,
    last_modified: DateTime<Utc>,
}

/// In-progress multipart upload
struct PendingUpload {
    key: String,
    content_type: String,
    parts: HashMap<i32, StoredPart>,
    initiated: DateTime<Utc>,
}

/// Uploaded part
struct StoredPart {
    data: Bytes,
    etag: String,
}

/// Backend keeping one bucket's objects and uploads in memory.
///
/// Failures carry the status a real S3 service would answer with, so the
/// gateway's error mapping sees the same shapes either way.
pub struct MemoryBackend {
    bucket: String,
    objects: DashMap<String, StoredObject>,
    uploads: DashMap<String, PendingUpload>,
    index_suffix: Option<String>,
}

impl MemoryBackend {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: DashMap::new(),
            uploads: DashMap::new(),
            index_suffix: None,
        }
    }

    /// Serve a website configuration with this index document suffix
    #[must_use]
    pub fn with_index_document(mut self, suffix: impl Into<String>) -> Self {
        self.index_suffix = Some(suffix.into());
        self
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn compute_etag(data: &[u8]) -> String {
        let mut hasher = Md5::new();
        hasher.update(data);
        format!("\"{}\"", hex::encode(hasher.finalize()))
    }

    fn no_such_key(key: &str) -> BackendError {
        BackendError::service("NoSuchKey", format!("The specified key does not exist: {key}"))
            .with_status(404)
    }

    fn no_such_upload(upload_id: &str) -> BackendError {
        BackendError::service(
            "NoSuchUpload",
            format!("The specified upload does not exist: {upload_id}"),
        )
        .with_status(404)
    }
}

/// Resolve a `bytes=` range against an object of `len` bytes.
///
/// Returns inclusive `(start, end)` offsets, or `None` when the range cannot
/// be satisfied.
fn resolve_range(spec: &str, len: usize) -> Option<(usize, usize)> {
    let spec = spec.trim().strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    if len == 0 {
        return None;
    }
    let last = len - 1;

    match (start.trim(), end.trim()) {
        ("", suffix) => {
            let n: usize = suffix.parse().ok()?;
            if n == 0 {
                return None;
            }
            Some((len.saturating_sub(n), last))
        }
        (start, "") => {
            let start: usize = start.parse().ok()?;
            (start <= last).then_some((start, last))
        }
        (start, end) => {
            let start: usize = start.parse().ok()?;
            let end: usize = end.parse().ok()?;
            (start <= end && start <= last).then_some((start, end.min(last)))
        }
    }
}

fn trim_quotes(etag: &str) -> &str {
    etag.trim_matches('"')
}

#[async_trait]
impl ObjectBackend for MemoryBackend {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn get_object(
        &self,
        key: &str,
        range: Option<&str>,
    ) -> Result<GetObjectOutput, BackendError> {
        let obj = self.objects.get(key).ok_or_else(|| Self::no_such_key(key))?;
        let total = obj.data.len();

        let (data, content_range) = match range {
            Some(spec) => {
                let (start, end) = resolve_range(spec, total).ok_or_else(|| {
                    BackendError::service(
                        "InvalidRange",
                        "The requested range is not satisfiable",
                    )
                    .with_status(416)
                })?;
                (
                    obj.data.slice(start..=end),
                    Some(format!("bytes {start}-{end}/{total}")),
                )
            }
            None => (obj.data.clone(), None),
        };

        let headers = ObjectHeaders {
            content_length: Some(data.len() as i64),
            content_range,
            content_type: Some(obj.content_type.clone()),
            etag: Some(obj.etag.clone()),
            last_modified: Some(obj.last_modified),
            ..ObjectHeaders::default()
        };

        Ok(GetObjectOutput {
            headers,
            body: stream::once(future::ready(Ok(data))).boxed(),
        })
    }

    async fn head_object(&self, key: &str) -> Result<ObjectMetadata, BackendError> {
        let obj = self.objects.get(key).ok_or_else(|| Self::no_such_key(key))?;
        Ok(ObjectMetadata {
            etag: Some(obj.etag.clone()),
            last_modified: Some(obj.last_modified),
            content_length: Some(obj.data.len() as i64),
            content_type: Some(obj.content_type.clone()),
        })
    }

    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<PutObjectOutput, BackendError> {
        let etag = Self::compute_etag(&data);

        self.objects.insert(
            key.to_string(),
            StoredObject {
                data,
                etag: etag.clone(),
                content_type: content_type.to_string(),
                last_modified: Utc::now(),
            },
        );

        Ok(PutObjectOutput { etag: Some(etag) })
    }

    async fn delete_object(&self, key: &str) -> Result<(), BackendError> {
        // Deleting a missing key succeeds, as on S3
        self.objects.remove(key);
        Ok(())
    }

    async fn list_objects(&self, request: ListObjectsRequest) -> Result<ListPage, BackendError> {
        let prefix = request.prefix.as_deref().unwrap_or("");
        let delimiter = request.delimiter.as_deref().filter(|d| !d.is_empty());
        let max_keys = usize::try_from(request.max_keys.unwrap_or(1000)).unwrap_or(0);

        // The continuation token is the last key or common prefix handed out
        let resume_after = match (&request.continuation_token, &request.start_after) {
            (Some(token), _) => Some(token.clone()),
            (None, Some(start)) => Some(start.clone()),
            (None, None) => None,
        };

        let mut keys: Vec<String> = self
            .objects
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|key| key.starts_with(prefix))
            .collect();
        keys.sort();

        let mut page = ListPage::default();
        let mut emitted = 0usize;
        let mut last_emitted: Option<String> = None;

        for key in keys {
            if let Some(after) = &resume_after {
                let inside_rolled_prefix =
                    delimiter.is_some_and(|d| after.ends_with(d) && key.starts_with(after.as_str()));
                if key.as_str() <= after.as_str() || inside_rolled_prefix {
                    continue;
                }
            }

            let rolled = delimiter.and_then(|d| {
                let rest = &key[prefix.len()..];
                rest.find(d)
                    .map(|pos| format!("{prefix}{}", &rest[..pos + d.len()]))
            });

            if let Some(common) = &rolled {
                if page.common_prefixes.last() == Some(common) {
                    continue;
                }
            }

            if emitted == max_keys {
                page.is_truncated = true;
                page.next_continuation_token = last_emitted;
                break;
            }
            emitted += 1;

            match rolled {
                Some(common) => {
                    last_emitted = Some(common.clone());
                    page.common_prefixes.push(common);
                }
                None => {
                    let Some(obj) = self.objects.get(&key) else {
                        continue;
                    };
                    page.objects.push(ObjectSummary {
                        key: key.clone(),
                        etag: Some(obj.etag.clone()),
                        size: obj.data.len() as i64,
                        last_modified: Some(obj.last_modified),
                        storage_class: Some("STANDARD".to_string()),
                    });
                    last_emitted = Some(key);
                }
            }
        }

        Ok(page)
    }

    async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<CreateMultipartOutput, BackendError> {
        let upload_id = Uuid::new_v4().to_string();

        self.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                key: key.to_string(),
                content_type: content_type.to_string(),
                parts: HashMap::new(),
                initiated: Utc::now(),
            },
        );

        Ok(CreateMultipartOutput {
            key: key.to_string(),
            upload_id,
        })
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<Option<String>, BackendError> {
        if !(1..=10_000).contains(&part_number) {
            return Err(BackendError::service(
                "InvalidArgument",
                "Part number must be an integer between 1 and 10000, inclusive",
            )
            .with_status(400));
        }

        let mut upload = self
            .uploads
            .get_mut(upload_id)
            .filter(|u| u.key == key)
            .ok_or_else(|| Self::no_such_upload(upload_id))?;

        let etag = Self::compute_etag(&data);
        upload.parts.insert(
            part_number,
            StoredPart {
                data,
                etag: etag.clone(),
            },
        );

        Ok(Some(etag))
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<CompleteMultipartOutput, BackendError> {
        if parts.is_empty() {
            return Err(BackendError::service(
                "MalformedXML",
                "You must specify at least one part",
            )
            .with_status(400));
        }
        if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            return Err(BackendError::service(
                "InvalidPartOrder",
                "The list of parts was not in ascending order",
            )
            .with_status(400));
        }

        let (combined, etag) = {
            let upload = self
                .uploads
                .get(upload_id)
                .filter(|u| u.key == key)
                .ok_or_else(|| Self::no_such_upload(upload_id))?;

            // Multipart ETag: MD5(concat(MD5(part1), MD5(part2), ...))-N
            let mut combined = Vec::new();
            let mut digests = Vec::new();
            for completed in &parts {
                let part = upload
                    .parts
                    .get(&completed.part_number)
                    .filter(|p| trim_quotes(&p.etag) == trim_quotes(&completed.etag))
                    .ok_or_else(|| {
                        BackendError::service(
                            "InvalidPart",
                            format!("Part {} could not be found", completed.part_number),
                        )
                        .with_status(400)
                    })?;
                combined.extend_from_slice(&part.data);
                digests.extend_from_slice(&Md5::digest(&part.data));
            }
            let etag = format!(
                "\"{}-{}\"",
                hex::encode(Md5::digest(&digests)),
                parts.len()
            );
            (combined, etag)
        };

        let Some((_, upload)) = self.uploads.remove(upload_id) else {
            return Err(Self::no_such_upload(upload_id));
        };

        self.objects.insert(
            key.to_string(),
            StoredObject {
                data: Bytes::from(combined),
                etag: etag.clone(),
                content_type: upload.content_type,
                last_modified: Utc::now(),
            },
        );

        Ok(CompleteMultipartOutput {
            key: Some(key.to_string()),
            etag: Some(etag),
            location: Some(format!("/{}/{key}", self.bucket)),
        })
    }

    async fn abort_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
    ) -> Result<(), BackendError> {
        self.uploads
            .remove_if(upload_id, |_, u| u.key == key)
            .map(|_| ())
            .ok_or_else(|| Self::no_such_upload(upload_id))
    }

    async fn list_multipart_uploads(
        &self,
        request: ListUploadsRequest,
    ) -> Result<UploadsPage, BackendError> {
        let prefix = request.prefix.as_deref().unwrap_or("");
        let max_uploads = usize::try_from(request.max_uploads.unwrap_or(1000)).unwrap_or(0);

        let mut uploads: Vec<UploadSummary> = self
            .uploads
            .iter()
            .filter(|entry| entry.value().key.starts_with(prefix))
            .map(|entry| UploadSummary {
                key: entry.value().key.clone(),
                upload_id: entry.key().clone(),
                initiated: Some(entry.value().initiated),
            })
            .collect();
        uploads.sort_by(|a, b| (&a.key, a.initiated).cmp(&(&b.key, b.initiated)));

        let is_truncated = uploads.len() > max_uploads;
        uploads.truncate(max_uploads);

        let (next_key_marker, next_upload_id_marker) = match uploads.last() {
            Some(last) if is_truncated => (Some(last.key.clone()), Some(last.upload_id.clone())),
            _ => (None, None),
        };

        Ok(UploadsPage {
            uploads,
            is_truncated,
            key_marker: None,
            upload_id_marker: None,
            next_key_marker,
            next_upload_id_marker,
        })
    }

    async fn website_config(&self) -> Result<WebsiteConfig, BackendError> {
        match &self.index_suffix {
            Some(suffix) => Ok(WebsiteConfig {
                index_suffix: Some(suffix.clone()),
            }),
            None => Err(BackendError::service(
                "NoSuchWebsiteConfiguration",
                "The specified bucket does not have a website configuration",
            )
            .with_status(404)),
        }
    }
}

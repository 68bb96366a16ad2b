//! Per-site object request handling

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;

use crate::backend::{ObjectBackend, ObjectHeaders};
use crate::conditional::check_conditional_write;
use crate::error::GatewayError;
use crate::listing::list_objects;
use crate::multipart::{
    abort_multipart_upload, complete_multipart_upload, create_multipart_upload,
    list_multipart_uploads, upload_part,
};
use crate::routing::{derive_key, Operation, QueryParams};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Shared state for one site's object handlers
pub struct S3State {
    pub backend: Arc<dyn ObjectBackend>,
    /// Key prefix joined in front of every derived key
    pub key_prefix: Option<String>,
}

impl S3State {
    pub fn new(backend: Arc<dyn ObjectBackend>, key_prefix: Option<&str>) -> Self {
        Self {
            backend,
            key_prefix: key_prefix
                .map(|p| p.trim_matches('/').to_string())
                .filter(|p| !p.is_empty()),
        }
    }

    fn key_for(&self, uri: &Uri) -> String {
        derive_key(uri.path(), self.backend.bucket(), self.key_prefix.as_deref())
    }
}

/// Router serving every path of a site through [`handle_request`]
pub fn router(state: Arc<S3State>) -> Router {
    Router::new().fallback(handle_request).with_state(state)
}

/// Classify and run a single object request
pub async fn handle_request(
    State(state): State<Arc<S3State>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let query = QueryParams::parse(uri.query());
    let Some(operation) = Operation::classify(&method, &query) else {
        return GatewayError::MethodNotAllowed.into_response();
    };

    let key = state.key_for(&uri);
    debug!(operation = operation.as_str(), key = %key, "Object request");

    let result = match operation {
        Operation::ListObjects => list_objects(&state, &query).await,
        Operation::CreateMultipartUpload => create_multipart_upload(&state, &key, &headers).await,
        Operation::ListMultipartUploads => list_multipart_uploads(&state, &query).await,
        Operation::CompleteMultipartUpload => {
            let upload_id = query.non_empty("uploadId").unwrap_or_default();
            complete_multipart_upload(&state, &key, upload_id, body).await
        }
        Operation::AbortMultipartUpload => {
            let upload_id = query.non_empty("uploadId").unwrap_or_default();
            abort_multipart_upload(&state, &key, upload_id).await
        }
        Operation::UploadPart => upload_part(&state, &key, &query, body).await,
        Operation::GetObject => get_object(&state, &key, &headers, false).await,
        Operation::HeadObject => get_object(&state, &key, &headers, true).await,
        Operation::PutObject => put_object(&state, &key, &headers, body).await,
        Operation::DeleteObject => delete_object(&state, &key).await,
    };

    result.unwrap_or_else(IntoResponse::into_response)
}

// === Object Operations ===

/// GET and HEAD share the backend GET; HEAD drops the body
async fn get_object(
    state: &S3State,
    key: &str,
    headers: &HeaderMap,
    head_only: bool,
) -> Result<Response, GatewayError> {
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());

    let output = state.backend.get_object(key, range).await?;

    let status = if output.headers.content_range.is_some() {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };

    let body = if head_only {
        Body::empty()
    } else {
        Body::from_stream(output.body)
    };

    let mut response = (status, body).into_response();
    copy_object_headers(&output.headers, response.headers_mut());
    Ok(response)
}

async fn put_object(
    state: &S3State,
    key: &str,
    headers: &HeaderMap,
    body: Body,
) -> Result<Response, GatewayError> {
    check_conditional_write(state.backend.as_ref(), key, headers).await?;

    let data = read_body(body).await?;
    let content_type = request_content_type(headers);
    let output = state.backend.put_object(key, data, &content_type).await?;

    let mut response = StatusCode::OK.into_response();
    if let Some(value) = output.etag.and_then(|e| HeaderValue::from_str(&e).ok()) {
        response.headers_mut().insert(header::ETAG, value);
    }
    Ok(response)
}

async fn delete_object(state: &S3State, key: &str) -> Result<Response, GatewayError> {
    state.backend.delete_object(key).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

// === Helper Functions ===

/// Copy the metadata headers the backend returned, skipping absent ones
fn copy_object_headers(object: &ObjectHeaders, headers: &mut HeaderMap) {
    let last_modified = object
        .last_modified
        .map(|t| t.format("%a, %d %b %Y %H:%M:%S GMT").to_string());
    let content_length = object.content_length.map(|n| n.to_string());

    let pairs: [(HeaderName, Option<&String>); 10] = [
        (header::CACHE_CONTROL, object.cache_control.as_ref()),
        (header::CONTENT_DISPOSITION, object.content_disposition.as_ref()),
        (header::CONTENT_ENCODING, object.content_encoding.as_ref()),
        (header::CONTENT_LANGUAGE, object.content_language.as_ref()),
        (header::CONTENT_LENGTH, content_length.as_ref()),
        (header::CONTENT_RANGE, object.content_range.as_ref()),
        (header::CONTENT_TYPE, object.content_type.as_ref()),
        (header::ETAG, object.etag.as_ref()),
        (header::EXPIRES, object.expires.as_ref()),
        (header::LAST_MODIFIED, last_modified.as_ref()),
    ];

    for (name, value) in pairs {
        if let Some(value) = value.and_then(|v| HeaderValue::from_str(v).ok()) {
            headers.insert(name, value);
        }
    }
}

/// Content type of an upload, defaulting to `application/octet-stream`
pub(crate) fn request_content_type(headers: &HeaderMap) -> String {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

pub(crate) async fn read_body(body: Body) -> Result<Bytes, GatewayError> {
    to_bytes(body, usize::MAX)
        .await
        .map_err(|e| GatewayError::bad_request(format!("failed to read request body: {e}")))
}

pub(crate) fn xml_response(body: String) -> Response {
    ([(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

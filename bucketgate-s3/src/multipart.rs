//! Multipart upload operations
//!
//! Upload state lives entirely in the backend; these handlers only forward
//! identifiers and render the XML results.

use crate::backend::ListUploadsRequest;
use crate::error::GatewayError;
use crate::handlers::{read_body, request_content_type, xml_response, S3State};
use crate::routing::QueryParams;
use crate::xml::{
    format_complete_multipart_upload, format_initiate_multipart_upload,
    format_list_multipart_uploads, parse_complete_multipart_upload, UploadsEcho,
};
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::debug;

pub async fn create_multipart_upload(
    state: &S3State,
    key: &str,
    headers: &HeaderMap,
) -> Result<Response, GatewayError> {
    let content_type = request_content_type(headers);
    let created = state
        .backend
        .create_multipart_upload(key, &content_type)
        .await?;

    debug!(key = %created.key, upload_id = %created.upload_id, "Created multipart upload");
    Ok(xml_response(format_initiate_multipart_upload(
        state.backend.bucket(),
        &created.key,
        &created.upload_id,
    )))
}

/// Parse `partNumber`; only positive integers are accepted
fn part_number(query: &QueryParams) -> Result<i32, GatewayError> {
    query
        .get("partNumber")
        .and_then(|v| v.trim().parse::<i32>().ok())
        .filter(|n| *n > 0)
        .ok_or_else(|| GatewayError::bad_request("partNumber must be a positive integer"))
}

pub async fn upload_part(
    state: &S3State,
    key: &str,
    query: &QueryParams,
    body: Body,
) -> Result<Response, GatewayError> {
    let part_number = part_number(query)?;
    let upload_id = query.non_empty("uploadId").unwrap_or_default();
    let data = read_body(body).await?;

    let etag = state
        .backend
        .upload_part(key, upload_id, part_number, data)
        .await?;

    let mut response = StatusCode::OK.into_response();
    if let Some(value) = etag.and_then(|e| HeaderValue::from_str(&e).ok()) {
        response.headers_mut().insert(header::ETAG, value);
    }
    Ok(response)
}

pub async fn complete_multipart_upload(
    state: &S3State,
    key: &str,
    upload_id: &str,
    body: Body,
) -> Result<Response, GatewayError> {
    let data = read_body(body).await?;
    let parts = parse_complete_multipart_upload(&data)?;
    debug!(key = %key, upload_id = %upload_id, parts = parts.len(), "Completing multipart upload");

    let bucket = state.backend.bucket();
    let completed = state
        .backend
        .complete_multipart_upload(key, upload_id, parts)
        .await?;

    let final_key = completed.key.as_deref().unwrap_or(key);
    let location = completed
        .location
        .clone()
        .unwrap_or_else(|| format!("/{bucket}/{final_key}"));

    Ok(xml_response(format_complete_multipart_upload(
        &location,
        bucket,
        final_key,
        completed.etag.as_deref().unwrap_or_default(),
    )))
}

pub async fn abort_multipart_upload(
    state: &S3State,
    key: &str,
    upload_id: &str,
) -> Result<Response, GatewayError> {
    state.backend.abort_multipart_upload(key, upload_id).await?;
    debug!(key = %key, upload_id = %upload_id, "Aborted multipart upload");
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn list_multipart_uploads(
    state: &S3State,
    query: &QueryParams,
) -> Result<Response, GatewayError> {
    let echo = UploadsEcho {
        prefix: query.non_empty("prefix"),
        delimiter: query.non_empty("delimiter"),
        max_uploads: query.page_size("max-uploads"),
    };

    let page = state
        .backend
        .list_multipart_uploads(ListUploadsRequest {
            prefix: echo.prefix.map(str::to_string),
            delimiter: echo.delimiter.map(str::to_string),
            max_uploads: Some(echo.max_uploads),
        })
        .await?;

    Ok(xml_response(format_list_multipart_uploads(
        state.backend.bucket(),
        &echo,
        &page,
    )))
}

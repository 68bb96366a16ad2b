//! XML bodies for listing and multipart responses

use crate::backend::{CompletedPart, ListPage, UploadsPage};
use crate::error::GatewayError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
const S3_NAMESPACE: &str = "http://s3.amazonaws.com/doc/2006-03-01/";

/// Request parameters echoed back in a `ListBucketResult`
#[derive(Debug, Clone, Default)]
pub struct ListEcho<'a> {
    pub prefix: Option<&'a str>,
    pub delimiter: Option<&'a str>,
    pub start_after: Option<&'a str>,
    pub continuation_token: Option<&'a str>,
    pub max_keys: i32,
}

/// Request parameters echoed back in a `ListMultipartUploadsResult`
#[derive(Debug, Clone, Default)]
pub struct UploadsEcho<'a> {
    pub prefix: Option<&'a str>,
    pub delimiter: Option<&'a str>,
    pub max_uploads: i32,
}

fn timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// ETags in XML bodies are written without their quotes
fn unquoted(etag: &str) -> &str {
    etag.trim_matches('"')
}

/// `<Name>value</Name>` at the given depth
fn element(depth: usize, name: &str, value: &str) -> String {
    format!("{}<{name}>{}</{name}>", "  ".repeat(depth), xml_escape(value))
}

fn optional(lines: &mut Vec<String>, depth: usize, name: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        lines.push(element(depth, name, value));
    }
}

fn document(root: &str, lines: Vec<String>) -> String {
    format!(
        "{XML_DECLARATION}\n<{root} xmlns=\"{S3_NAMESPACE}\">\n{}\n</{root}>",
        lines.join("\n")
    )
}

/// Format ListObjectsV2 response
pub fn format_list_objects(bucket: &str, echo: &ListEcho<'_>, page: &ListPage) -> String {
    let mut lines = vec![element(1, "Name", bucket)];
    optional(&mut lines, 1, "Prefix", echo.prefix);
    optional(&mut lines, 1, "StartAfter", echo.start_after);
    optional(&mut lines, 1, "ContinuationToken", echo.continuation_token);
    optional(
        &mut lines,
        1,
        "NextContinuationToken",
        page.next_continuation_token.as_deref(),
    );
    lines.push(element(1, "MaxKeys", &echo.max_keys.to_string()));
    optional(&mut lines, 1, "Delimiter", echo.delimiter);
    lines.push(element(1, "IsTruncated", &page.is_truncated.to_string()));

    for obj in &page.objects {
        lines.push("  <Contents>".to_string());
        lines.push(element(2, "Key", &obj.key));
        if let Some(modified) = &obj.last_modified {
            lines.push(element(2, "LastModified", &timestamp(modified)));
        }
        if let Some(etag) = &obj.etag {
            lines.push(element(2, "ETag", unquoted(etag)));
        }
        lines.push(element(2, "Size", &obj.size.to_string()));
        lines.push(element(
            2,
            "StorageClass",
            obj.storage_class.as_deref().unwrap_or_default(),
        ));
        lines.push("  </Contents>".to_string());
    }

    for prefix in &page.common_prefixes {
        lines.push(format!(
            "  <CommonPrefixes>\n{}\n  </CommonPrefixes>",
            element(2, "Prefix", prefix)
        ));
    }

    document("ListBucketResult", lines)
}

/// Format CreateMultipartUpload response
pub fn format_initiate_multipart_upload(bucket: &str, key: &str, upload_id: &str) -> String {
    document(
        "InitiateMultipartUploadResult",
        vec![
            element(1, "Bucket", bucket),
            element(1, "Key", key),
            element(1, "UploadId", upload_id),
        ],
    )
}

/// Format CompleteMultipartUpload response
pub fn format_complete_multipart_upload(
    location: &str,
    bucket: &str,
    key: &str,
    etag: &str,
) -> String {
    document(
        "CompleteMultipartUploadResult",
        vec![
            element(1, "Location", location),
            element(1, "Bucket", bucket),
            element(1, "Key", key),
            element(1, "ETag", unquoted(etag)),
        ],
    )
}

/// Format ListMultipartUploads response
pub fn format_list_multipart_uploads(
    bucket: &str,
    echo: &UploadsEcho<'_>,
    page: &UploadsPage,
) -> String {
    let mut lines = vec![element(1, "Bucket", bucket)];
    optional(&mut lines, 1, "KeyMarker", page.key_marker.as_deref());
    optional(&mut lines, 1, "UploadIdMarker", page.upload_id_marker.as_deref());
    optional(&mut lines, 1, "NextKeyMarker", page.next_key_marker.as_deref());
    optional(
        &mut lines,
        1,
        "NextUploadIdMarker",
        page.next_upload_id_marker.as_deref(),
    );
    optional(&mut lines, 1, "Prefix", echo.prefix);
    optional(&mut lines, 1, "Delimiter", echo.delimiter);
    lines.push(element(1, "MaxUploads", &echo.max_uploads.to_string()));
    lines.push(element(1, "IsTruncated", &page.is_truncated.to_string()));

    for upload in &page.uploads {
        lines.push("  <Upload>".to_string());
        lines.push(element(2, "Key", &upload.key));
        lines.push(element(2, "UploadId", &upload.upload_id));
        if let Some(initiated) = &upload.initiated {
            lines.push(element(2, "Initiated", &timestamp(initiated)));
        }
        lines.push("  </Upload>".to_string());
    }

    document("ListMultipartUploadsResult", lines)
}

#[derive(Debug, Deserialize)]
struct CompleteMultipartUpload {
    #[serde(rename = "Part", default)]
    parts: Vec<PartEntry>,
}

#[derive(Debug, Deserialize)]
struct PartEntry {
    #[serde(rename = "PartNumber")]
    part_number: i32,
    #[serde(rename = "ETag")]
    etag: String,
}

/// Parse a `CompleteMultipartUpload` request body into its part list
pub fn parse_complete_multipart_upload(body: &[u8]) -> Result<Vec<CompletedPart>, GatewayError> {
    let text = std::str::from_utf8(body)
        .map_err(|_| GatewayError::bad_request("request body is not valid UTF-8"))?;
    let request: CompleteMultipartUpload = quick_xml::de::from_str(text)
        .map_err(|e| GatewayError::bad_request(format!("malformed XML: {e}")))?;

    Ok(request
        .parts
        .into_iter()
        .map(|p| CompletedPart {
            part_number: p.part_number,
            etag: p.etag.trim().to_string(),
        })
        .collect())
}

/// XML escape special characters
fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

//! Precondition checks for conditional Put Object

use crate::backend::{ObjectBackend, ObjectMetadata};
use crate::error::GatewayError;
use axum::http::{header, HeaderMap};
use std::time::SystemTime;
use tracing::debug;

/// Precondition headers carried by a write request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WritePreconditions {
    pub if_match: Option<String>,
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<String>,
    pub if_unmodified_since: Option<String>,
}

fn header_value(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn unquote(etag: &str) -> &str {
    etag.trim_matches('"')
}

/// Seconds since the epoch of an HTTP date, `None` when malformed
fn http_date_secs(value: &str) -> Option<i64> {
    let parsed = httpdate::parse_http_date(value).ok()?;
    let secs = parsed.duration_since(SystemTime::UNIX_EPOCH).ok()?.as_secs();
    i64::try_from(secs).ok()
}

impl WritePreconditions {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            if_match: header_value(headers, header::IF_MATCH),
            if_none_match: header_value(headers, header::IF_NONE_MATCH),
            if_modified_since: header_value(headers, header::IF_MODIFIED_SINCE),
            if_unmodified_since: header_value(headers, header::IF_UNMODIFIED_SINCE),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.if_match.is_none()
            && self.if_none_match.is_none()
            && self.if_modified_since.is_none()
            && self.if_unmodified_since.is_none()
    }

    /// Check the preconditions against the object's current state.
    ///
    /// `current` is `None` when the object does not exist. Conditions are
    /// checked in header order and the first failure wins. A date that does
    /// not parse never blocks the write.
    pub fn evaluate(&self, current: Option<&ObjectMetadata>) -> Result<(), GatewayError> {
        let current_etag = current.and_then(|m| m.etag.as_deref()).map(unquote);
        let last_modified = current.and_then(|m| m.last_modified).map(|t| t.timestamp());

        if let Some(expected) = &self.if_match {
            if current.is_none() || current_etag != Some(unquote(expected)) {
                return Err(GatewayError::PreconditionFailed);
            }
        }

        if let Some(expected) = &self.if_none_match {
            if current.is_some()
                && (expected == "*" || current_etag == Some(unquote(expected)))
            {
                return Err(GatewayError::PreconditionFailed);
            }
        }

        if let Some(since) = &self.if_modified_since {
            if current.is_none() {
                return Err(GatewayError::PreconditionFailed);
            }
            if let (Some(since), Some(modified)) = (http_date_secs(since), last_modified) {
                if modified <= since {
                    return Err(GatewayError::PreconditionFailed);
                }
            }
        }

        if let Some(since) = &self.if_unmodified_since {
            if let (Some(since), Some(modified)) = (http_date_secs(since), last_modified) {
                if modified > since {
                    return Err(GatewayError::PreconditionFailed);
                }
            }
        }

        Ok(())
    }
}

/// Evaluate a write's preconditions against the backend.
///
/// The backend is only consulted when at least one precondition header is
/// present; any HEAD failure counts as the object being absent.
pub async fn check_conditional_write(
    backend: &dyn ObjectBackend,
    key: &str,
    headers: &HeaderMap,
) -> Result<(), GatewayError> {
    let preconditions = WritePreconditions::from_headers(headers);
    if preconditions.is_empty() {
        return Ok(());
    }

    let current = match backend.head_object(key).await {
        Ok(meta) => Some(meta),
        Err(e) => {
            debug!(key = %key, error = %e, "HEAD before conditional write found no object");
            None
        }
    };

    let outcome = preconditions.evaluate(current.as_ref());
    if outcome.is_err() {
        debug!(key = %key, ?preconditions, "Write precondition failed");
    }
    outcome
}

//! HTTP Basic authentication gate

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine};
use bucketgate_core::User;
use std::collections::HashMap;
use std::sync::Arc;
use subtle::{Choice, ConstantTimeEq};
use thiserror::Error;
use tracing::debug;

/// Why a request failed basic authentication
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BasicAuthError {
    #[error("Missing authorization header")]
    MissingAuthHeader,

    #[error("Invalid authorization header format")]
    InvalidAuthFormat,

    #[error("Invalid credentials")]
    InvalidCredentials,
}

/// Compared against when the user is unknown so both paths do the same work
const UNKNOWN_USER_PASSWORD: &str = "bucketgate-unknown-user-placeholder";

/// Name to password lookup built once per site
#[derive(Debug, Clone, Default)]
pub struct UserTable {
    users: Arc<HashMap<String, String>>,
}

impl UserTable {
    /// Later entries with the same name replace earlier ones.
    pub fn new(users: &[User]) -> Self {
        let users = users
            .iter()
            .map(|u| (u.name.clone(), u.password.clone()))
            .collect();
        Self {
            users: Arc::new(users),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Check an `Authorization` header value against the table
    pub fn verify(&self, authorization: Option<&HeaderValue>) -> Result<(), BasicAuthError> {
        let value = authorization.ok_or(BasicAuthError::MissingAuthHeader)?;
        let (name, password) = parse_basic_credentials(value)?;

        // Unknown users and wrong passwords are indistinguishable to the caller
        let (expected, known) = match self.users.get(&name) {
            Some(expected) => (expected.as_str(), Choice::from(1)),
            None => (UNKNOWN_USER_PASSWORD, Choice::from(0)),
        };
        if bool::from(expected.as_bytes().ct_eq(password.as_bytes()) & known) {
            Ok(())
        } else {
            Err(BasicAuthError::InvalidCredentials)
        }
    }
}

/// Decode `Basic base64(name:password)`
pub fn parse_basic_credentials(value: &HeaderValue) -> Result<(String, String), BasicAuthError> {
    let value = value
        .to_str()
        .map_err(|_| BasicAuthError::InvalidAuthFormat)?;
    let (scheme, encoded) = value
        .split_once(' ')
        .ok_or(BasicAuthError::InvalidAuthFormat)?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return Err(BasicAuthError::InvalidAuthFormat);
    }

    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|_| BasicAuthError::InvalidAuthFormat)?;
    let decoded = String::from_utf8(decoded).map_err(|_| BasicAuthError::InvalidAuthFormat)?;
    let (name, password) = decoded
        .split_once(':')
        .ok_or(BasicAuthError::InvalidAuthFormat)?;

    Ok((name.to_string(), password.to_string()))
}

/// State for [`require_basic_auth`]
#[derive(Debug, Clone)]
pub struct BasicAuthState {
    pub users: UserTable,
    /// Honor `X-Forwarded-Host` when picking the realm
    pub proxied: bool,
}

/// axum middleware rejecting requests without valid credentials
pub async fn require_basic_auth(
    State(state): State<BasicAuthState>,
    request: Request,
    next: Next,
) -> Response {
    match state.users.verify(request.headers().get(header::AUTHORIZATION)) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            debug!(error = %e, path = %request.uri().path(), "basic auth rejected");
            let realm = realm_host(request.headers(), request.uri(), state.proxied);
            challenge(&realm)
        }
    }
}

/// 401 response asking the client for credentials
pub fn challenge(realm: &str) -> Response {
    let mut response = StatusCode::UNAUTHORIZED.into_response();
    if let Ok(value) = HeaderValue::from_str(&format!("Basic realm=\"{realm}\"")) {
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, value);
    }
    response
}

fn realm_host(headers: &HeaderMap, uri: &axum::http::Uri, proxied: bool) -> String {
    let forwarded = proxied
        .then(|| headers.get("x-forwarded-host"))
        .flatten();
    forwarded
        .or_else(|| headers.get(header::HOST))
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| uri.authority().map(|a| a.as_str().to_string()))
        .unwrap_or_default()
}

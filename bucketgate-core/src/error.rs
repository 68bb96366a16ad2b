//! Backend error types and their HTTP status mapping

use http::StatusCode;
use thiserror::Error;

/// Backend error codes the gateway gives a dedicated status to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Not found family
    NoSuchBucket,
    NoSuchKey,

    // Credential family
    AccessDenied,
    InvalidAccessKeyId,
    SignatureDoesNotMatch,
}

impl ErrorCode {
    /// Recognize a backend-reported code string
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "NoSuchBucket" => Some(Self::NoSuchBucket),
            "NoSuchKey" => Some(Self::NoSuchKey),
            "AccessDenied" => Some(Self::AccessDenied),
            "InvalidAccessKeyId" => Some(Self::InvalidAccessKeyId),
            "SignatureDoesNotMatch" => Some(Self::SignatureDoesNotMatch),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoSuchBucket => "NoSuchBucket",
            Self::NoSuchKey => "NoSuchKey",
            Self::AccessDenied => "AccessDenied",
            Self::InvalidAccessKeyId => "InvalidAccessKeyId",
            Self::SignatureDoesNotMatch => "SignatureDoesNotMatch",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::NoSuchBucket | Self::NoSuchKey => StatusCode::NOT_FOUND,
            Self::AccessDenied | Self::InvalidAccessKeyId | Self::SignatureDoesNotMatch => {
                StatusCode::FORBIDDEN
            }
        }
    }
}

/// Failure reported by the storage collaborator
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend answered with an error document.
    ///
    /// `status` is the HTTP status of the backend response when the transport
    /// saw one; `code` is the backend's error code (`NoSuchKey`, ...).
    #[error("{}: {message}", code.as_deref().unwrap_or("Error"))]
    Service {
        code: Option<String>,
        status: Option<u16>,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The request never produced a backend response (connect, timeout, ...)
    #[error("{0}")]
    Transport(String),
}

impl BackendError {
    pub fn service(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            code: Some(code.into()),
            status: None,
            message: message.into(),
        }
    }

    /// Attach the HTTP status the backend answered with
    pub fn with_status(self, status: u16) -> Self {
        match self {
            Self::Service { code, message, .. } => Self::Service {
                code,
                status: Some(status),
                message,
            },
            other => other,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Service { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// HTTP status the gateway answers with for this failure.
    ///
    /// A status carried by the backend response wins so that signature and
    /// credential failures surface with their original code.
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Service {
                status: Some(status),
                ..
            } => StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Self::Service {
                code: Some(code), ..
            } => ErrorCode::parse(code)
                .map_or(StatusCode::INTERNAL_SERVER_ERROR, |c| c.http_status()),
            Self::Service { code: None, .. } | Self::Io(_) | Self::Transport(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

//! API error taxonomy and the uniform error envelope.
//!
//! Every failure maps to `{error: kind, message, details?}` with a status
//! from the fixed table below. No endpoint ever returns 200 with an
//! embedded error; internal details never leak (audit rows hold the full
//! context).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use thiserror::Error;

use kredo_protocol::{DocumentError, ProtocolError, VerifyError};
use kredo_store::StoreError;

/// API-level failures, each carrying its envelope kind and status.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed shape, expired timestamps, unknown domain/skill. 422.
    #[error("{0}")]
    Validation(String),

    /// Bad key/signature format or signature mismatch. 400.
    #[error("{0}")]
    SignatureInvalid(String),

    /// Unknown id or pubkey in a strict lookup. 404.
    #[error("{0}")]
    NotFound(String),

    /// Duplicate id, ownership conflict, state-machine violation. 409.
    #[error("{0}")]
    Conflict(String),

    /// The signer lacks the role required for this transition. 403.
    #[error("{0}")]
    Permission(String),

    /// Too many writes in the window. 429.
    #[error("rate limited")]
    RateLimited {
        /// Seconds until the window admits another request.
        retry_after_seconds: u64,
    },

    /// Behavioral warning with insufficient evidence. 422.
    #[error("{0}")]
    EvidenceInsufficient(String),

    /// Anything unexpected. 500; the message is not sent to the client.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// The envelope `error` kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::SignatureInvalid(_) => "signature_invalid",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::Permission(_) => "permission_error",
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::EvidenceInsufficient(_) => "evidence_insufficient",
            ApiError::Internal(_) => "server_error",
        }
    }

    /// The HTTP status for this kind.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::EvidenceInsufficient(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::SignatureInvalid(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Permission(_) => StatusCode::FORBIDDEN,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Internal failures get a fixed string.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }

    /// Structured details for the envelope, when the kind carries any.
    #[must_use]
    pub fn details(&self) -> Option<Value> {
        match self {
            ApiError::RateLimited { retry_after_seconds } => {
                Some(json!({ "retry_after_seconds": retry_after_seconds }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            tracing::error!(detail, "internal error");
        }
        let mut body = json!({
            "error": self.kind(),
            "message": self.public_message(),
        });
        if let Some(details) = self.details() {
            body["details"] = details;
        }
        let mut response = (self.status(), Json(body)).into_response();
        if let ApiError::RateLimited { retry_after_seconds } = self {
            if let Ok(value) = retry_after_seconds.to_string().parse() {
                response.headers_mut().insert("retry-after", value);
            }
        }
        response
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateAttestation(id) => {
                ApiError::Conflict(format!("attestation id already exists: {id}"))
            }
            StoreError::NotFound { kind, id } => ApiError::NotFound(format!("{kind} not found: {id}")),
            StoreError::PermissionDenied(msg) => ApiError::Permission(msg),
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            StoreError::InvalidInput(msg) | StoreError::Taxonomy(msg) => ApiError::Validation(msg),
            StoreError::Database(e) => ApiError::Internal(e.to_string()),
            StoreError::CorruptDocument(e) => ApiError::Internal(e),
        }
    }
}

impl From<VerifyError> for ApiError {
    fn from(err: VerifyError) -> Self {
        ApiError::SignatureInvalid(format!("{err} ({})", err.reason()))
    }
}

impl From<DocumentError> for ApiError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::MissingSignature => ApiError::SignatureInvalid(err.to_string()),
            other => ApiError::Validation(other.to_string()),
        }
    }
}

impl From<ProtocolError> for ApiError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Document(e) => e.into(),
            ProtocolError::Verify(e) => e.into(),
            ProtocolError::NotRepresentable(e) => ApiError::Validation(e),
        }
    }
}

/// Result alias for handlers.
pub type ApiResult<T> = Result<T, ApiError>;

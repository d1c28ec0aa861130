use axum::{
    extract::rejection::{FormRejection, JsonRejection, QueryRejection},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::db::StoreError;
use crate::policy::DenyReason;

/// Why a caller could not be identified. Every variant answers 401; the
/// variants exist so logs can tell a forged token from an expired one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("malformed token")]
    MalformedToken,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token expired")]
    ExpiredToken,

    #[error("token subject does not match any user")]
    UnknownSubject,

    #[error("incorrect email or password")]
    BadCredentials,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Unauthenticated(#[from] AuthError),

    #[error("{0}")]
    Forbidden(DenyReason),

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("{0}")]
    Validation(String),

    /// A body or query string the extractors could not decode. Keeps the
    /// extractor's own status (400, 415 or 422).
    #[error("{detail}")]
    Rejected { status: StatusCode, detail: String },

    #[error("internal error: {0}")]
    Internal(String),
}

macro_rules! impl_from_rejection {
    ($($rejection:ty),*) => {
        $(impl From<$rejection> for ApiError {
            fn from(rejection: $rejection) -> Self {
                ApiError::Rejected {
                    status: rejection.status(),
                    detail: rejection.body_text(),
                }
            }
        })*
    };
}

impl_from_rejection!(JsonRejection, FormRejection, QueryRejection);

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail(_) => ApiError::DuplicateEmail,
            StoreError::Backend(msg) => ApiError::Internal(msg),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::DuplicateEmail | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Rejected { status, .. } => *status,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            ApiError::Unauthenticated(AuthError::BadCredentials) => "Incorrect email or password".to_string(),
            ApiError::Unauthenticated(_) => "Invalid authentication credentials".to_string(),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };

        let mut response = (status, Json(json!({ "detail": detail }))).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

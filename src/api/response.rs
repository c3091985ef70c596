//! JSON envelopes and error mapping for the HTTP surface.

use crate::error::{FetchError, ScanError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use tracing::error;

/// `{ "success": true, "data": ... }`
#[derive(Debug, Serialize)]
pub struct ApiSuccess<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiSuccess<T> {
    pub fn data(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
        })
    }
}

impl ApiSuccess<()> {
    /// Success without a payload.
    pub fn empty() -> Json<Self> {
        Json(Self {
            success: true,
            data: None,
        })
    }
}

/// `{ "success": false, "error": ..., "kind": ..., "retryable": ... }`
#[derive(Debug, Serialize)]
pub struct ApiFailure {
    pub success: bool,
    pub error: String,
    pub kind: &'static str,
    pub retryable: bool,
}

/// A [`ScanError`] rendered as a typed HTTP response.
#[derive(Debug)]
pub struct ApiError(pub ScanError);

impl From<ScanError> for ApiError {
    fn from(e: ScanError) -> Self {
        Self(e)
    }
}

/// HTTP status for each failure kind.
pub fn status_for(e: &ScanError) -> StatusCode {
    match e {
        ScanError::Validation(_) => StatusCode::BAD_REQUEST,
        ScanError::Fetch(FetchError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
        ScanError::Fetch(_) => StatusCode::BAD_GATEWAY,
        ScanError::InsufficientData => StatusCode::UNPROCESSABLE_ENTITY,
        ScanError::ScanTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        ScanError::NotFound(_) => StatusCode::NOT_FOUND,
        ScanError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!(kind = self.0.kind(), error = %self.0, "Request failed");
        }

        let error = match self.0 {
            ScanError::NotFound(_) => "not found".to_string(),
            ref other => other.to_string(),
        };

        let body = ApiFailure {
            success: false,
            error,
            kind: self.0.kind(),
            retryable: self.0.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}

//! API data models

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};

use crate::{AnalyzerError, UnreadableReason};

/// Body of every non-success response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Health check payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub decoder: String,
    pub detector: String,
    pub frame_skip: u32,
    pub timestamp: String,
}

/// An error ready to be sent to the client
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<AnalyzerError> for ApiError {
    fn from(err: AnalyzerError) -> Self {
        let status = match &err {
            AnalyzerError::MissingUpload(_) => StatusCode::BAD_REQUEST,
            AnalyzerError::SourceUnreadable { reason: UnreadableReason::Undecodable, .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AnalyzerError::SourceUnreadable { reason: UnreadableReason::NotFound, .. }
            | AnalyzerError::InvalidPolicy(_)
            | AnalyzerError::DecodeFault(_)
            | AnalyzerError::CleanupFault { .. }
            | AnalyzerError::Config(_)
            | AnalyzerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        Self::new(err.status(), err.body_text())
    }
}

impl From<axum::extract::multipart::MultipartRejection> for ApiError {
    fn from(rejection: axum::extract::multipart::MultipartRejection) -> Self {
        Self::new(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_status_mapping() {
        let missing: ApiError = AnalyzerError::MissingUpload("No video file selected".to_string()).into();
        assert_eq!(missing.status, StatusCode::BAD_REQUEST);
        assert_eq!(missing.message, "No video file selected");

        let corrupt: ApiError = AnalyzerError::SourceUnreadable {
            path: PathBuf::from("/tmp/upload_x.mp4"),
            reason: UnreadableReason::Undecodable,
            detail: "no video stream found".to_string(),
        }
        .into();
        assert_eq!(corrupt.status, StatusCode::UNPROCESSABLE_ENTITY);

        let vanished: ApiError = AnalyzerError::SourceUnreadable {
            path: PathBuf::from("/tmp/upload_x.mp4"),
            reason: UnreadableReason::NotFound,
            detail: "no such file".to_string(),
        }
        .into();
        assert_eq!(vanished.status, StatusCode::INTERNAL_SERVER_ERROR);

        let policy: ApiError = AnalyzerError::InvalidPolicy("frame_skip must be a positive integer".to_string()).into();
        assert_eq!(policy.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}

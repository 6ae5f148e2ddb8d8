// error.rs
use std::time::Duration;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),
    #[error("No device selected")]
    NoDeviceSelected,
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Unsupported command: {0}")]
    UnsupportedCommand(String),
    #[error("{action} command timed out after {}s", .timeout.as_secs_f64())]
    Timeout {
        action: &'static str,
        timeout: Duration,
    },
    /// The device tool ran but reported a failure. Carries its diagnostic text verbatim.
    #[error("{0}")]
    ExternalFailure(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::DeviceNotFound(_) => "not_found",
            AppError::NoDeviceSelected => "no_device_selected",
            AppError::InvalidUrl(_) => "invalid_url",
            AppError::InvalidParameter(_) => "invalid_parameter",
            AppError::UnsupportedCommand(_) => "unsupported_command",
            AppError::Timeout { .. } => "timeout",
            AppError::ExternalFailure(_) => "external_failure",
            AppError::Validation(_) => "validation",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::DeviceNotFound(_) => StatusCode::NOT_FOUND,
            AppError::NoDeviceSelected => StatusCode::CONFLICT,
            AppError::InvalidUrl(_)
            | AppError::InvalidParameter(_)
            | AppError::UnsupportedCommand(_) => StatusCode::BAD_REQUEST,
            AppError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::ExternalFailure(_) => StatusCode::BAD_GATEWAY,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(ref err) = self {
            tracing::error!(error = ?err, "Request failed");
        }
        let body = ErrorBody {
            error: self.kind().to_string(),
            message: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

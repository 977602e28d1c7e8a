//! Fixed JSON envelopes returned by every endpoint.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorCode};

/// `{"status":"success","data":...}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse<T> {
    pub status: String,
    pub data: T,
}

impl<T> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            status: "success".to_string(),
            data,
        }
    }
}

/// `{"status":"error","error":{"code":...,"message":...}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        Self {
            status: "error".to_string(),
            error: ErrorDetail {
                code: err.code(),
                message: err.message().to_string(),
            },
        }
    }
}

//! Error types for the ADT and pharmacy core
//!
//! Domain errors are recoverable at the caller; the HTTP layer maps each one to
//! a status code and a structured JSON body. Persistence failures are kept
//! apart as `Database` / `Internal` and never leak details to clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::NaiveDate;
use serde::Serialize;

use crate::models::BedStatus;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Bed {bed_id} is not available (status: {status})")]
    BedUnavailable { bed_id: i64, status: BedStatus },

    #[error("Batch {batch_number} expired on {expiry_date}")]
    ExpiredBatch {
        batch_number: String,
        expiry_date: NaiveDate,
    },

    #[error(
        "Insufficient stock for medication {medication_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        medication_id: i64,
        requested: i32,
        available: i64,
    },

    #[error(
        "No single batch of medication {medication_id} holds {requested} units (largest batch: {largest_batch})"
    )]
    NoSingleBatchCovers {
        medication_id: i64,
        requested: i32,
        largest_batch: i32,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Error::NotFound { entity, id }
    }

    /// Stable machine-readable code, also used in the JSON error body.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "NOT_FOUND",
            Error::BedUnavailable { .. } => "BED_UNAVAILABLE",
            Error::ExpiredBatch { .. } => "EXPIRED_BATCH",
            Error::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Error::NoSingleBatchCovers { .. } => "NO_SINGLE_BATCH_COVERS",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::InvalidState(_) => "INVALID_STATE",
            Error::Conflict(_) => "CONFLICT",
            Error::Database(_) => "STORAGE_ERROR",
            Error::Internal(_) => "INTERNAL",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::ExpiredBatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::BedUnavailable { .. }
            | Error::InsufficientStock { .. }
            | Error::NoSingleBatchCovers { .. }
            | Error::InvalidState(_)
            | Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Database(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Error::Validation(errors.to_string())
    }
}

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            Error::Database(e) => {
                tracing::error!(error = %e, "Storage failure while handling request");
                "A storage error occurred".to_string()
            }
            Error::Internal(detail) => {
                tracing::error!(detail = %detail, "Internal error while handling request");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

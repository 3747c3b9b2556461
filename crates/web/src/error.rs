//! HTTP mapping for guacpool errors

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    extract::{Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::WithRejection;
use guacpool_common::Error;
use tracing::error;

/// Handler error: a domain error rendered as a JSON response
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub Error);

pub type ApiResult<T> = Result<T, ApiError>;

/// Extractors whose rejections render as 400 `{"error": ...}` bodies
pub type ApiJson<T> = WithRejection<Json<T>, ApiError>;
pub type ApiPath<T> = WithRejection<Path<T>, ApiError>;
pub type ApiQuery<T> = WithRejection<Query<T>, ApiError>;

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(Error::validation(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError(Error::validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(Error::validation(rejection.body_text()))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::AddressConflict { .. }
            | Error::AlreadyExists { .. }
            | Error::GroupInUse { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self.0 {
            Error::AddressConflict { address } => serde_json::json!({
                "error": self.0.to_string(),
                "address": address,
            }),
            e if e.is_client_error() => serde_json::json!({ "error": e.to_string() }),
            e => {
                error!("request failed: {}", e);
                serde_json::json!({ "error": "Internal server error" })
            }
        };

        (status, Json(body)).into_response()
    }
}

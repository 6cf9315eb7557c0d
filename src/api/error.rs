use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::engine::PipelineError;

#[derive(Debug)]
pub enum AppError {
    InternalServerError(String),
    BadRequest(String),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let body = Json(ErrorResponse {
            message: error_message,
        });

        (status, body).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::InvalidParams(_) | PipelineError::RemoteResource { .. } => {
                AppError::BadRequest(err.to_string())
            }
            PipelineError::Generation(_) => AppError::InternalServerError(err.to_string()),
        }
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use shop_order::OrderError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Authentication(String),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Order(err) => match err {
                OrderError::NotFound(_) => StatusCode::NOT_FOUND,
                OrderError::Unprocessable(_) | OrderError::InvalidTransition { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                OrderError::Validation(_) => StatusCode::BAD_REQUEST,
                OrderError::Forbidden(_) => StatusCode::FORBIDDEN,
                OrderError::Remote(_) => StatusCode::BAD_GATEWAY,
                OrderError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Label used for the creation failure counter.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Authentication(_) => "authentication",
            AppError::Order(err) => match err {
                OrderError::NotFound(_) => "not_found",
                OrderError::Unprocessable(_) => "unprocessable",
                OrderError::InvalidTransition { .. } => "invalid_transition",
                OrderError::Validation(_) => "validation",
                OrderError::Forbidden(_) => "forbidden",
                OrderError::Remote(_) => "remote",
                OrderError::Storage(_) => "storage",
            },
            AppError::Anyhow(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = if status.is_server_error() {
            tracing::error!("Request failed with {}: {}", status, self);
            match status {
                StatusCode::BAD_GATEWAY => "Upstream service unavailable".to_string(),
                _ => "Internal Server Error".to_string(),
            }
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

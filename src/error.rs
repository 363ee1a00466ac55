use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors, detected synchronously and returned without side effects
    #[error("staging or delivery already active for `{0}`")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("staging order {0} has not completed successfully")]
    NotReady(i64),

    #[error("invalid request: {0}")]
    BadRequest(String),

    // External process could not be started at all
    #[error("could not launch external program: {0}")]
    Launch(String),

    // Transient failure reaching the delivery system; persisted state untouched
    #[error("could not poll delivery system: {0}")]
    Poll(String),

    // A status transition was refused by the store (the record already moved on)
    #[error("illegal status transition for order {0}")]
    IllegalTransition(i64),

    // Internal errors
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!("Generating response for AppError: {:?}", self);

        let status_code = match &self {
            Self::Conflict(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::NotReady(_) => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Poll(_) => StatusCode::BAD_GATEWAY,
            Self::Launch(_)
            | Self::IllegalTransition(_)
            | Self::Sqlx(_)
            | Self::Migration(_)
            | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = json!({ "error": self.to_string() });
        (status_code, Json(body)).into_response()
    }
}

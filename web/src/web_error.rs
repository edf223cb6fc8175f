use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

/// Aggregates every leaf error type the HTTP surface touches, the way the
/// core's own per-crate errors aggregate into one type at each boundary.
#[derive(Debug, Error)]
pub enum WebError {
    #[error(transparent)]
    Conn(#[from] connection::ConnError),

    #[error(transparent)]
    Recover(#[from] recover::RecoverError),

    #[error(transparent)]
    Store(#[from] common::err::StoreError),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl ResponseError for WebError {
    fn error_response(&self) -> HttpResponse {
        match self {
            WebError::Recover(recover::RecoverError::NotEmpty) => {
                HttpResponse::Conflict().json(serde_json::json!({ "error": self.to_string() }))
            }
            WebError::Recover(recover::RecoverError::AlreadyRecovering) => {
                HttpResponse::Conflict().json(serde_json::json!({ "error": self.to_string() }))
            }
            _ => HttpResponse::InternalServerError()
                .json(serde_json::json!({ "error": self.to_string() })),
        }
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Every failure a handler can surface to a client.
#[derive(Debug, Error)]
pub enum AppError {
    /// Request body or query failed validation; `details` lists every violation.
    #[error("Validation failed")]
    Validation(Vec<String>),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// A path identifier that is not a well-formed id.
    #[error("Invalid {0} ID")]
    MalformedId(&'static str),

    /// Catch-all for store and library failures. `context` is the client-facing
    /// summary, the source message is passed through as `message`.
    #[error("{context}")]
    Internal {
        context: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl AppError {
    pub fn internal<E>(context: &'static str, err: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self::Internal {
            context,
            source: err.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) | Self::MalformedId(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Validation(details) => json!({
                "error": self.to_string(),
                "details": details,
            }),
            Self::Internal { context, source } => {
                error!(error = %source, "{}", context);
                json!({
                    "error": context,
                    "message": source.to_string(),
                })
            }
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hq_common::QueueError;
use serde::Serialize;
use tracing::error;

/// Error body returned by every endpoint
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Vec<String>>,
}

/// HTTP rendering of a [`QueueError`]
#[derive(Debug)]
pub struct ApiError(pub QueueError);

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        Self(e)
    }
}

pub fn status_for(e: &QueueError) -> StatusCode {
    match e {
        QueueError::Unauthorized => StatusCode::FORBIDDEN,
        QueueError::NotFound { .. } => StatusCode::NOT_FOUND,
        QueueError::BadFormat { .. } | QueueError::UnknownType(_) | QueueError::UnknownSubject(_) => {
            StatusCode::BAD_REQUEST
        }
        QueueError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        QueueError::Transport(_) | QueueError::UpstreamRejected { .. } => StatusCode::BAD_GATEWAY,
        QueueError::Database(_) | QueueError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }

        let body = match self.0 {
            QueueError::BadFormat { detail } => ErrorBody {
                code: status.as_u16(),
                message: "bad format".to_string(),
                detail: Some(detail),
            },
            other => ErrorBody {
                code: status.as_u16(),
                message: other.to_string(),
                detail: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

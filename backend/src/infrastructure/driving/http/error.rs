use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use shared::ErrorBody;
use tracing::error;

use crate::domain::errors::BridgeError;

impl BridgeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidOffer(_) => StatusCode::BAD_REQUEST,
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::SessionLimitReached { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::NegotiationFailed(_)
            | Self::SourceUnavailable { .. }
            | Self::TransportFailure(_)
            | Self::InvalidLocator(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        let body = ErrorBody {
            error: self.to_string(),
            code: Some(self.code().to_string()),
        };
        (status, Json(body)).into_response()
    }
}

//! Error taxonomy for the HTTP surface.
//!
//! Three classes cover every endpoint: bad client input (400), missing
//! records (404), and collaborator failures (502). Collaborator error chains
//! are logged but never included in the response body.
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{service} request failed")]
    Upstream {
        service: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError::NotFound(msg.into())
    }

    pub fn upstream(service: &'static str, source: anyhow::Error) -> Self {
        ApiError::Upstream { service, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Upstream { service, source } = &self {
            error!(service, err = ?source, "collaborator call failed");
        }
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn status_codes() {
        assert_eq!(
            ApiError::bad_request("missing field").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::not_found("no such user").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::upstream("vision", anyhow!("boom")).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn upstream_message_hides_detail() {
        let err = ApiError::upstream("wordpress", anyhow!("401 unauthorized: secret"));
        assert_eq!(err.to_string(), "wordpress request failed");
    }
}

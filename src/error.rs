// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Fixed catalog of client-facing failures.
///
/// Each kind renders the same status, code and message on every occurrence;
/// only the correlation id and the internal cause vary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    StatusCheck,
    CantView,
    PermissionsLookup,
    StoreQuery,
    InvalidParameters,
}

impl ErrorKind {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::StatusCheck => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::CantView => StatusCode::FORBIDDEN,
            ErrorKind::PermissionsLookup => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::StoreQuery => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::InvalidParameters => StatusCode::BAD_REQUEST,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::StatusCheck => "data_status_check",
            ErrorKind::CantView => "data_cant_view",
            ErrorKind::PermissionsLookup => "data_perms_error",
            ErrorKind::StoreQuery => "data_store_error",
            ErrorKind::InvalidParameters => "invalid_parameters",
        }
    }

    /// Client-safe message
    pub fn message(&self) -> &'static str {
        match self {
            ErrorKind::StatusCheck => "checking of the status endpoint showed an error",
            ErrorKind::CantView => "user is not authorized to view data",
            ErrorKind::PermissionsLookup => "error finding permissions for user",
            ErrorKind::StoreQuery => "error running query",
            ErrorKind::InvalidParameters => "one or more parameters are invalid",
        }
    }
}

/// One reported failure: a catalog entry plus a fresh correlation id.
///
/// The internal cause is written to the server log and never serialized.
#[derive(Debug)]
pub struct ApiError {
    kind: ErrorKind,
    id: Uuid,
    cause: Option<String>,
    elapsed: Duration,
}

/// Wire shape of the error envelope
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: u16,
    pub id: String,
    pub code: &'static str,
    pub message: &'static str,
}

impl ApiError {
    pub fn new(kind: ErrorKind, started_at: Instant) -> Self {
        Self {
            kind,
            id: Uuid::new_v4(),
            cause: None,
            elapsed: started_at.elapsed(),
        }
    }

    pub fn with_cause(mut self, cause: impl std::fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cause(&self) -> Option<&str> {
        self.cause.as_deref()
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            status: self.kind.status().as_u16(),
            id: self.id.to_string(),
            code: self.kind.code(),
            message: self.kind.message(),
        }
    }

    fn log(&self) {
        tracing::error!(
            "[{}] {} failed after [{:.5}]secs: {} (cause: {})",
            self.id,
            self.kind.code(),
            self.elapsed.as_secs_f64(),
            self.kind.message(),
            self.cause.as_deref().unwrap_or("none")
        );
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind.code(), self.kind.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        self.log();
        (self.kind.status(), Json(self.to_body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_statuses_match_codes() {
        assert_eq!(ErrorKind::CantView.status(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorKind::CantView.code(), "data_cant_view");
        assert_eq!(ErrorKind::StatusCheck.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ErrorKind::InvalidParameters.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorKind::StoreQuery.code(), "data_store_error");
    }

    #[test]
    fn each_occurrence_gets_a_fresh_id() {
        let started = Instant::now();
        let a = ApiError::new(ErrorKind::StoreQuery, started);
        let b = ApiError::new(ErrorKind::StoreQuery, started);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn cause_is_never_serialized() {
        let err = ApiError::new(ErrorKind::StoreQuery, Instant::now())
            .with_cause("connection refused to 10.0.0.7:5432");
        assert_eq!(err.cause(), Some("connection refused to 10.0.0.7:5432"));

        let body = serde_json::to_value(err.to_body()).unwrap();
        assert_eq!(body["status"], 500);
        assert_eq!(body["code"], "data_store_error");
        assert_eq!(body["message"], "error running query");
        assert_eq!(body["id"], err.id().to_string());
        assert!(!body.to_string().contains("10.0.0.7"));
        assert_eq!(body.as_object().unwrap().len(), 4);
    }
}

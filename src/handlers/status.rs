use std::time::Instant;

use axum::extract::State;

use crate::error::{ApiError, ErrorKind};
use crate::state::AppState;

/// GET /status - store liveness
pub async fn status(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    let started = Instant::now();
    state
        .store
        .ping()
        .await
        .map_err(|e| ApiError::new(ErrorKind::StatusCheck, started).with_cause(e))?;
    Ok("OK\n")
}

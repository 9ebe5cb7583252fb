use std::time::Instant;

use axum::extract::rejection::PathRejection;
use axum::extract::{Path, RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};

use crate::access::{self, AccessDecision};
use crate::api::JsonArrayStream;
use crate::auth::RESTRICTED_TOKEN_PARAM;
use crate::error::{ApiError, ErrorKind};
use crate::filter::{self, FilterRequest, QueryParams};
use crate::state::AppState;

/// GET /:user_id - stream the user's device data as a JSON array
///
/// Everything that can fail with a client-visible error happens before the
/// body starts: authentication, authorization, parameter parsing, group
/// lookup, enrichment and the first read of the query.
pub async fn device_data(
    State(state): State<AppState>,
    user_id: Result<Path<String>, PathRejection>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let Path(user_id) = user_id.map_err(|e| ApiError::new(ErrorKind::InvalidParameters, started).with_cause(e))?;
    let params = QueryParams::parse(raw_query.as_deref());

    let restricted_tokens = params.all(RESTRICTED_TOKEN_PARAM);
    let token = state.authenticator.authenticate(&headers, &uri, &restricted_tokens).await;

    match access::authorize(token.as_ref(), &user_id, state.sharing.as_ref()).await {
        AccessDecision::Granted(reason) => {
            tracing::debug!("Access to {} granted ({:?})", user_id, reason);
        }
        AccessDecision::Denied(reason) => {
            return Err(ApiError::new(ErrorKind::CantView, started).with_cause(format!("{:?}", reason)));
        }
    }

    let request = FilterRequest::parse(&user_id, &params)
        .map_err(|e| ApiError::new(ErrorKind::InvalidParameters, started).with_cause(e))?;

    let group_id = match state.metadata.uploads_group_id(&user_id).await {
        Ok(Some(group_id)) => group_id,
        Ok(None) => {
            return Err(ApiError::new(ErrorKind::PermissionsLookup, started)
                .with_cause(format!("no uploads group for user {}", user_id)))
        }
        Err(e) => return Err(ApiError::new(ErrorKind::PermissionsLookup, started).with_cause(e)),
    };

    let filter = filter::resolve(request, state.store.as_ref())
        .await
        .map_err(|e| ApiError::new(ErrorKind::StoreQuery, started).with_cause(e))?;

    let cursor = state
        .store
        .get_device_data(&group_id, &filter)
        .await
        .map_err(|e| ApiError::new(ErrorKind::StoreQuery, started).with_cause(e))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        JsonArrayStream::new(cursor, started).into_body(),
    )
        .into_response())
}

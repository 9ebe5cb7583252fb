use std::sync::Arc;

use axum::http::{HeaderMap, Uri};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::services::{IdentityService, RestrictedTokenService};

/// Header carrying a session token issued by the identity service
pub const SESSION_TOKEN_HEADER: &str = "x-tidepool-session-token";

/// Query parameter carrying a restricted token id
pub const RESTRICTED_TOKEN_PARAM: &str = "restricted_token";

/// Caller identity resolved for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenData {
    pub user_id: String,
    pub is_server: bool,
}

/// A scoped credential bound to one user and, optionally, a set of paths
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestrictedToken {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub paths: Option<Vec<String>>,
    pub expiration_time: DateTime<Utc>,
}

impl RestrictedToken {
    pub fn authenticates(&self, uri: &Uri) -> bool {
        self.authenticates_at(uri, Utc::now())
    }

    /// Valid while unexpired; when paths are set the request path must equal
    /// one of them or sit beneath it.
    pub fn authenticates_at(&self, uri: &Uri, now: DateTime<Utc>) -> bool {
        if now >= self.expiration_time {
            return false;
        }

        match &self.paths {
            None => true,
            Some(paths) => {
                let request_path = uri.path();
                paths.iter().any(|allowed| {
                    let allowed = allowed.trim_end_matches('/');
                    request_path == allowed
                        || request_path
                            .strip_prefix(allowed)
                            .is_some_and(|rest| rest.starts_with('/'))
                })
            }
        }
    }
}

/// Resolves who is calling, from a session token or a restricted token.
///
/// Every failure mode collapses to `None`; the caller decides what a missing
/// identity means.
#[derive(Clone)]
pub struct Authenticator {
    identity: Arc<dyn IdentityService>,
    restricted: Arc<dyn RestrictedTokenService>,
}

impl Authenticator {
    pub fn new(identity: Arc<dyn IdentityService>, restricted: Arc<dyn RestrictedTokenService>) -> Self {
        Self { identity, restricted }
    }

    pub async fn authenticate(&self, headers: &HeaderMap, uri: &Uri, restricted_tokens: &[&str]) -> Option<TokenData> {
        if let Some(token) = session_token(headers) {
            return match self.identity.check_token(token).await {
                Ok(token_data) => token_data,
                Err(e) => {
                    tracing::warn!("Session token validation failed: {}", e);
                    None
                }
            };
        }

        // Only a single restricted token is honoured
        if let [token_id] = restricted_tokens {
            return self.authenticate_restricted(token_id, uri).await;
        }

        None
    }

    async fn authenticate_restricted(&self, token_id: &str, uri: &Uri) -> Option<TokenData> {
        let token = match self.restricted.get_restricted_token(token_id).await {
            Ok(Some(token)) => token,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Restricted token lookup failed: {}", e);
                return None;
            }
        };

        if !token.authenticates(uri) {
            tracing::debug!("Restricted token {} does not authenticate {}", token.id, uri.path());
            return None;
        }

        Some(TokenData {
            user_id: token.user_id,
            is_server: false,
        })
    }
}

fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

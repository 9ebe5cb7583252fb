//! Clients for the services this API depends on but does not own.
//!
//! Each collaborator is a trait so handlers can be driven by in-memory fakes;
//! the HTTP implementations live in the submodules.

pub mod identity;
pub mod metadata;
pub mod restricted;
pub mod sharing;

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use url::Url;

use crate::auth::{RestrictedToken, TokenData};

pub use identity::IdentityClient;
pub use metadata::MetadataClient;
pub use restricted::RestrictedTokenClient;
pub use sharing::SharingClient;

/// Permission grants a user holds in a group, keyed by permission name
pub type Permissions = HashMap<String, serde_json::Value>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{service} request timed out")]
    Timeout { service: &'static str },

    #[error("{service} HTTP error: {source}")]
    Http {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} returned status {status}")]
    BadStatus { service: &'static str, status: StatusCode },

    #[error("{service} returned an invalid response: {reason}")]
    InvalidResponse { service: &'static str, reason: String },

    #[error("invalid {service} URL: {url}")]
    InvalidUrl { service: &'static str, url: String },

    #[error("server credentials are not configured")]
    MissingServerSecret,
}

impl ClientError {
    pub(crate) fn transport(service: &'static str) -> impl FnOnce(reqwest::Error) -> ClientError {
        move |source| {
            if source.is_timeout() {
                ClientError::Timeout { service }
            } else {
                ClientError::Http { service, source }
            }
        }
    }

    pub(crate) fn invalid_response(service: &'static str) -> impl FnOnce(reqwest::Error) -> ClientError {
        move |source| ClientError::InvalidResponse {
            service,
            reason: source.to_string(),
        }
    }
}

/// Validates session tokens
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// `Ok(None)` when the token is unknown or expired
    async fn check_token(&self, token: &str) -> Result<Option<TokenData>, ClientError>;
}

/// Source of the token this service presents to its collaborators
#[async_trait]
pub trait ServerTokenProvider: Send + Sync {
    async fn server_token(&self) -> Result<String, ClientError>;
}

#[async_trait]
pub trait RestrictedTokenService: Send + Sync {
    async fn get_restricted_token(&self, id: &str) -> Result<Option<RestrictedToken>, ClientError>;
}

/// Answers which permissions a user holds in another user's group
#[async_trait]
pub trait SharingService: Send + Sync {
    async fn user_in_group(&self, user_id: &str, group_id: &str) -> Result<Permissions, ClientError>;
}

/// Resolves the group a user's uploaded data is stored under
#[async_trait]
pub trait MetadataService: Send + Sync {
    async fn uploads_group_id(&self, user_id: &str) -> Result<Option<String>, ClientError>;
}

pub(crate) fn parse_base_url(service: &'static str, raw: &str) -> Result<Url, ClientError> {
    Url::parse(raw).map_err(|_| ClientError::InvalidUrl {
        service,
        url: raw.to_string(),
    })
}

/// Append percent-encoded path segments to a base URL
pub(crate) fn endpoint(service: &'static str, base: &Url, segments: &[&str]) -> Result<Url, ClientError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ClientError::InvalidUrl {
            service,
            url: base.to_string(),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

pub(crate) fn http_client(service: &'static str, timeout: std::time::Duration) -> Result<reqwest::Client, ClientError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|source| ClientError::Http { service, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_encoded_segments() {
        let base = parse_base_url("sharing", "http://gatekeeper:9123/").unwrap();
        let url = endpoint("sharing", &base, &["access", "group a", "user/b"]).unwrap();
        assert_eq!(url.as_str(), "http://gatekeeper:9123/access/group%20a/user%2Fb");
    }

    #[test]
    fn endpoint_keeps_base_path_prefix() {
        let base = parse_base_url("metadata", "http://api.local/metadata").unwrap();
        let url = endpoint("metadata", &base, &["u1", "private", "uploads"]).unwrap();
        assert_eq!(url.as_str(), "http://api.local/metadata/u1/private/uploads");
    }

    #[test]
    fn invalid_base_url_is_reported() {
        let err = parse_base_url("identity", "not a url").unwrap_err();
        assert!(matches!(err, ClientError::InvalidUrl { service: "identity", .. }));
    }
}

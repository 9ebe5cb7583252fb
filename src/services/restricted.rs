use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use url::Url;

use super::{endpoint, http_client, parse_base_url, ClientError, RestrictedTokenService, ServerTokenProvider};
use crate::auth::{RestrictedToken, SESSION_TOKEN_HEADER};
use crate::config::ClientsConfig;

const SERVICE: &str = "auth";

/// HTTP client for restricted token lookups
pub struct RestrictedTokenClient {
    base_url: Url,
    http: reqwest::Client,
    tokens: Arc<dyn ServerTokenProvider>,
}

impl RestrictedTokenClient {
    pub fn new(config: &ClientsConfig, tokens: Arc<dyn ServerTokenProvider>) -> Result<Self, ClientError> {
        Ok(Self {
            base_url: parse_base_url(SERVICE, &config.auth_url)?,
            http: http_client(SERVICE, config.timeout())?,
            tokens,
        })
    }
}

#[async_trait]
impl RestrictedTokenService for RestrictedTokenClient {
    async fn get_restricted_token(&self, id: &str) -> Result<Option<RestrictedToken>, ClientError> {
        let server_token = self.tokens.server_token().await?;
        let url = endpoint(SERVICE, &self.base_url, &["v1", "restricted_tokens", id])?;

        let response = self
            .http
            .get(url)
            .header(SESSION_TOKEN_HEADER, server_token)
            .send()
            .await
            .map_err(ClientError::transport(SERVICE))?;

        match response.status() {
            status if status.is_success() => {
                let token = response.json().await.map_err(ClientError::invalid_response(SERVICE))?;
                Ok(Some(token))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(ClientError::BadStatus { service: SERVICE, status }),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::auth::RestrictedToken;

    #[test]
    fn restricted_token_wire_format() {
        let token: RestrictedToken = serde_json::from_str(
            r#"{"id":"rt1","userId":"u1","paths":["/u1"],"expirationTime":"2030-01-01T00:00:00Z","createdTime":"2020-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(token.user_id, "u1");
        assert_eq!(token.paths, Some(vec!["/u1".to_string()]));
    }
}

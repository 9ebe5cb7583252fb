use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use url::Url;

use super::{endpoint, http_client, parse_base_url, ClientError, Permissions, ServerTokenProvider, SharingService};
use crate::auth::SESSION_TOKEN_HEADER;
use crate::config::ClientsConfig;

const SERVICE: &str = "sharing";

/// HTTP client for the group permission service
pub struct SharingClient {
    base_url: Url,
    http: reqwest::Client,
    tokens: Arc<dyn ServerTokenProvider>,
}

impl SharingClient {
    pub fn new(config: &ClientsConfig, tokens: Arc<dyn ServerTokenProvider>) -> Result<Self, ClientError> {
        Ok(Self {
            base_url: parse_base_url(SERVICE, &config.sharing_url)?,
            http: http_client(SERVICE, config.timeout())?,
            tokens,
        })
    }
}

#[async_trait]
impl SharingService for SharingClient {
    async fn user_in_group(&self, user_id: &str, group_id: &str) -> Result<Permissions, ClientError> {
        let server_token = self.tokens.server_token().await?;
        let url = endpoint(SERVICE, &self.base_url, &["access", group_id, user_id])?;

        let response = self
            .http
            .get(url)
            .header(SESSION_TOKEN_HEADER, server_token)
            .send()
            .await
            .map_err(ClientError::transport(SERVICE))?;

        match response.status() {
            status if status.is_success() => response.json().await.map_err(ClientError::invalid_response(SERVICE)),
            // No sharing relationship
            StatusCode::NOT_FOUND => Ok(Permissions::new()),
            status => Err(ClientError::BadStatus { service: SERVICE, status }),
        }
    }
}

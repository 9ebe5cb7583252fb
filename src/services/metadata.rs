use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use super::{endpoint, http_client, parse_base_url, ClientError, MetadataService, ServerTokenProvider};
use crate::auth::SESSION_TOKEN_HEADER;
use crate::config::ClientsConfig;

const SERVICE: &str = "metadata";
const UPLOADS_PAIR: &str = "uploads";

/// A private id/value pair stored against a user
#[derive(Debug, Deserialize)]
struct PrivatePair {
    id: String,
}

/// HTTP client for the user metadata service
pub struct MetadataClient {
    base_url: Url,
    http: reqwest::Client,
    tokens: Arc<dyn ServerTokenProvider>,
}

impl MetadataClient {
    pub fn new(config: &ClientsConfig, tokens: Arc<dyn ServerTokenProvider>) -> Result<Self, ClientError> {
        Ok(Self {
            base_url: parse_base_url(SERVICE, &config.metadata_url)?,
            http: http_client(SERVICE, config.timeout())?,
            tokens,
        })
    }
}

#[async_trait]
impl MetadataService for MetadataClient {
    async fn uploads_group_id(&self, user_id: &str) -> Result<Option<String>, ClientError> {
        let server_token = self.tokens.server_token().await?;
        let url = endpoint(SERVICE, &self.base_url, &[user_id, "private", UPLOADS_PAIR])?;

        let response = self
            .http
            .get(url)
            .header(SESSION_TOKEN_HEADER, server_token)
            .send()
            .await
            .map_err(ClientError::transport(SERVICE))?;

        match response.status() {
            status if status.is_success() => {
                let pair: PrivatePair = response.json().await.map_err(ClientError::invalid_response(SERVICE))?;
                Ok(Some(pair.id).filter(|id| !id.is_empty()))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(ClientError::BadStatus { service: SERVICE, status }),
        }
    }
}

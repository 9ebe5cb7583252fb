use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::RwLock;
use url::Url;

use super::{endpoint, http_client, parse_base_url, ClientError, IdentityService, ServerTokenProvider};
use crate::auth::{TokenData, SESSION_TOKEN_HEADER};
use crate::config::ClientsConfig;

const SERVICE: &str = "identity";
const SERVER_NAME_HEADER: &str = "x-tidepool-server-name";
const SERVER_SECRET_HEADER: &str = "x-tidepool-server-secret";

/// Server tokens are re-issued well before the identity service expires them
const SERVER_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    userid: String,
    #[serde(default)]
    isserver: bool,
}

struct CachedToken {
    token: String,
    issued_at: Instant,
}

/// HTTP client for the identity service.
///
/// Also logs this service in as a server and caches the resulting token for
/// the other collaborator clients.
pub struct IdentityClient {
    base_url: Url,
    http: reqwest::Client,
    server_name: String,
    server_secret: String,
    server_token: RwLock<Option<CachedToken>>,
}

impl IdentityClient {
    pub fn new(config: &ClientsConfig) -> Result<Self, ClientError> {
        Ok(Self {
            base_url: parse_base_url(SERVICE, &config.identity_url)?,
            http: http_client(SERVICE, config.timeout())?,
            server_name: config.server_name.clone(),
            server_secret: config.server_secret.clone(),
            server_token: RwLock::new(None),
        })
    }

    async fn login(&self) -> Result<String, ClientError> {
        if self.server_secret.is_empty() {
            return Err(ClientError::MissingServerSecret);
        }

        let url = endpoint(SERVICE, &self.base_url, &["serverlogin"])?;
        let response = self
            .http
            .post(url)
            .header(SERVER_NAME_HEADER, &self.server_name)
            .header(SERVER_SECRET_HEADER, &self.server_secret)
            .send()
            .await
            .map_err(ClientError::transport(SERVICE))?;

        if !response.status().is_success() {
            return Err(ClientError::BadStatus {
                service: SERVICE,
                status: response.status(),
            });
        }

        response
            .headers()
            .get(SESSION_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ClientError::InvalidResponse {
                service: SERVICE,
                reason: "server login response carried no token".to_string(),
            })
    }
}

#[async_trait]
impl ServerTokenProvider for IdentityClient {
    async fn server_token(&self) -> Result<String, ClientError> {
        {
            let cached = self.server_token.read().await;
            if let Some(cached) = cached.as_ref() {
                if cached.issued_at.elapsed() < SERVER_TOKEN_TTL {
                    return Ok(cached.token.clone());
                }
            }
        }

        let mut cached = self.server_token.write().await;
        // Another request may have refreshed while we waited for the lock
        if let Some(existing) = cached.as_ref() {
            if existing.issued_at.elapsed() < SERVER_TOKEN_TTL {
                return Ok(existing.token.clone());
            }
        }

        let token = self.login().await?;
        tracing::info!("Obtained server token from identity service");
        *cached = Some(CachedToken {
            token: token.clone(),
            issued_at: Instant::now(),
        });
        Ok(token)
    }
}

#[async_trait]
impl IdentityService for IdentityClient {
    async fn check_token(&self, token: &str) -> Result<Option<TokenData>, ClientError> {
        let server_token = self.server_token().await?;
        let url = endpoint(SERVICE, &self.base_url, &["token", token])?;

        let response = self
            .http
            .get(url)
            .header(SESSION_TOKEN_HEADER, server_token)
            .send()
            .await
            .map_err(ClientError::transport(SERVICE))?;

        match response.status() {
            status if status.is_success() => {
                let body: TokenResponse = response.json().await.map_err(ClientError::invalid_response(SERVICE))?;
                Ok(Some(TokenData {
                    user_id: body.userid,
                    is_server: body.isserver,
                }))
            }
            StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND => Ok(None),
            status => Err(ClientError::BadStatus { service: SERVICE, status }),
        }
    }
}

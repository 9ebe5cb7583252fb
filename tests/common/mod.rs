#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use device_data_api::auth::{Authenticator, RestrictedToken, SESSION_TOKEN_HEADER};
use device_data_api::config::ApiConfig;
use device_data_api::state::AppState;
use device_data_api::testing::{FakeIdentity, FakeMetadata, FakeRestrictedTokens, FakeSharing, FakeStore};

/// Collaborating services for one test app
#[derive(Default)]
pub struct Services {
    pub identity: FakeIdentity,
    pub restricted: FakeRestrictedTokens,
    pub sharing: FakeSharing,
    pub metadata: FakeMetadata,
}

impl Services {
    pub fn session(mut self, token: &str, user_id: &str, is_server: bool) -> Self {
        self.identity = self.identity.user(token, user_id, is_server);
        self
    }

    pub fn restricted(mut self, token: RestrictedToken) -> Self {
        self.restricted = self.restricted.token(token);
        self
    }

    pub fn grant(mut self, user_id: &str, group_id: &str, perms: Value) -> Self {
        self.sharing = self.sharing.grant(user_id, group_id, perms);
        self
    }

    fn into_state(self, store: Arc<FakeStore>) -> AppState {
        AppState::new(
            Authenticator::new(Arc::new(self.identity), Arc::new(self.restricted)),
            Arc::new(self.sharing),
            Arc::new(self.metadata),
            store,
        )
    }
}

pub fn router(services: Services, store: Arc<FakeStore>) -> Router {
    device_data_api::app(services.into_state(store))
}

pub fn router_with_config(services: Services, store: Arc<FakeStore>, api: &ApiConfig) -> Router {
    device_data_api::app_with_config(services.into_state(store), api)
}

pub struct TestResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or_else(|e| panic!("invalid JSON body {:?}: {}", self.text(), e))
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> Result<TestResponse> {
    let response = app.clone().oneshot(request).await?;

    let status = response.status();
    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let content_type = header("content-type");
    let content_encoding = header("content-encoding");
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(TestResponse {
        status,
        content_type,
        content_encoding,
        body: bytes.to_vec(),
    })
}

pub async fn get(app: &Router, uri: &str, session: Option<&str>) -> Result<TestResponse> {
    let mut request = Request::builder().uri(uri);
    if let Some(token) = session {
        request = request.header(SESSION_TOKEN_HEADER, token);
    }
    send(app, request.body(Body::empty())?).await
}

pub fn assert_error(response: &TestResponse, status: StatusCode, code: &str) {
    assert_eq!(response.status, status, "unexpected status, body: {}", response.text());
    let body = response.json();
    assert_eq!(body["status"], status.as_u16(), "status field mismatch: {}", body);
    assert_eq!(body["code"], code, "code mismatch: {}", body);
    assert!(body["message"].is_string(), "missing message: {}", body);
    assert!(body["id"].as_str().is_some_and(|id| !id.is_empty()), "missing id: {}", body);
}

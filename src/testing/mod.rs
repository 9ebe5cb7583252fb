//! In-memory stand-ins for the store and the collaborating services.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use serde_json::Value;

use crate::auth::{RestrictedToken, TokenData};
use crate::database::cursor::DocumentStream;
use crate::database::{DeviceDataStore, ResultCursor, StoreError};
use crate::filter::{DexcomDataSource, Filter};
use crate::services::{
    ClientError, IdentityService, MetadataService, Permissions, RestrictedTokenService, SharingService,
};

fn unavailable(service: &'static str) -> ClientError {
    ClientError::InvalidResponse {
        service,
        reason: "unavailable".to_string(),
    }
}

/// Counts how many times the resources behind a cursor were released
#[derive(Clone, Default)]
pub struct ReleaseProbe {
    releases: Arc<AtomicUsize>,
}

struct ReleaseGuard(Arc<AtomicUsize>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl ReleaseProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn cursor(&self, documents: Vec<Value>) -> ResultCursor {
        self.wrap(stream::iter(documents.into_iter().map(Ok)).boxed())
    }

    /// The guard lives inside the stream, so it drops exactly when the
    /// stream does
    pub fn wrap(&self, documents: DocumentStream) -> ResultCursor {
        let guard = ReleaseGuard(self.releases.clone());
        ResultCursor::new(
            documents
                .map(move |item| {
                    let _held = &guard;
                    item
                })
                .boxed(),
        )
    }
}

#[derive(Default)]
pub struct FakeIdentity {
    sessions: HashMap<String, TokenData>,
}

impl FakeIdentity {
    pub fn with_user(token: &str, user_id: &str, is_server: bool) -> Self {
        Self::default().user(token, user_id, is_server)
    }

    pub fn user(mut self, token: &str, user_id: &str, is_server: bool) -> Self {
        self.sessions.insert(
            token.to_string(),
            TokenData {
                user_id: user_id.to_string(),
                is_server,
            },
        );
        self
    }
}

#[async_trait]
impl IdentityService for FakeIdentity {
    async fn check_token(&self, token: &str) -> Result<Option<TokenData>, ClientError> {
        Ok(self.sessions.get(token).cloned())
    }
}

#[derive(Default)]
pub struct FakeRestrictedTokens {
    tokens: HashMap<String, RestrictedToken>,
    fail: bool,
}

impl FakeRestrictedTokens {
    pub fn with_token(token: RestrictedToken) -> Self {
        Self::default().token(token)
    }

    pub fn token(mut self, token: RestrictedToken) -> Self {
        self.tokens.insert(token.id.clone(), token);
        self
    }

    pub fn failing() -> Self {
        Self {
            tokens: HashMap::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl RestrictedTokenService for FakeRestrictedTokens {
    async fn get_restricted_token(&self, id: &str) -> Result<Option<RestrictedToken>, ClientError> {
        if self.fail {
            return Err(unavailable("auth"));
        }
        Ok(self.tokens.get(id).cloned())
    }
}

#[derive(Default)]
pub struct FakeSharing {
    grants: HashMap<(String, String), Permissions>,
    fail: bool,
    lookups: AtomicUsize,
}

impl FakeSharing {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn grant(mut self, user_id: &str, group_id: &str, perms: Value) -> Self {
        let perms: Permissions = serde_json::from_value(perms).unwrap_or_default();
        self.grants.insert((user_id.to_string(), group_id.to_string()), perms);
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SharingService for FakeSharing {
    async fn user_in_group(&self, user_id: &str, group_id: &str) -> Result<Permissions, ClientError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(unavailable("sharing"));
        }
        Ok(self
            .grants
            .get(&(user_id.to_string(), group_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

/// Uploads group lookup; every user's group is `group-<user id>`
#[derive(Default)]
pub struct FakeMetadata {
    fail: bool,
}

impl FakeMetadata {
    pub fn failing() -> Self {
        Self { fail: true }
    }
}

#[async_trait]
impl MetadataService for FakeMetadata {
    async fn uploads_group_id(&self, user_id: &str) -> Result<Option<String>, ClientError> {
        if self.fail {
            return Err(unavailable("metadata"));
        }
        Ok(Some(format!("group-{}", user_id)))
    }
}

/// Store with canned lookup answers that records which lookups ran and the
/// last device data query
#[derive(Default)]
pub struct FakeStore {
    medtronic_direct: bool,
    dexcom_source: Option<DexcomDataSource>,
    medtronic_loop: bool,
    upload_ids: Vec<String>,
    groups: HashMap<String, Vec<Value>>,
    fail_on: Option<&'static str>,
    calls: Mutex<Vec<&'static str>>,
    executed: Mutex<Option<(String, Filter)>>,
}

impl FakeStore {
    pub fn with_medtronic_direct(mut self, has_direct: bool) -> Self {
        self.medtronic_direct = has_direct;
        self
    }

    pub fn with_dexcom_source(mut self, source: DexcomDataSource) -> Self {
        self.dexcom_source = Some(source);
        self
    }

    pub fn with_medtronic_loop(mut self, has_loop_data: bool) -> Self {
        self.medtronic_loop = has_loop_data;
        self
    }

    pub fn with_upload_ids(mut self, ids: &[&str]) -> Self {
        self.upload_ids = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn with_documents(mut self, group_id: &str, documents: Vec<Value>) -> Self {
        self.groups.insert(group_id.to_string(), documents);
        self
    }

    /// Make the named store operation fail
    pub fn failing_on(mut self, operation: &'static str) -> Self {
        self.fail_on = Some(operation);
        self
    }

    pub fn called(&self, lookup: &str) -> bool {
        self.calls
            .lock()
            .map(|calls| calls.iter().any(|call| *call == lookup))
            .unwrap_or(false)
    }

    /// Group and filter of the last device data query
    pub fn executed(&self) -> Option<(String, Filter)> {
        self.executed.lock().ok().and_then(|executed| executed.clone())
    }

    fn record(&self, lookup: &'static str) -> Result<(), StoreError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(lookup);
        }
        if self.fail_on == Some(lookup) {
            return Err(StoreError::QueryError(format!("{} failed", lookup)));
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceDataStore for FakeStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.record("ping")
    }

    async fn has_medtronic_direct_data(&self, _user_id: &str) -> Result<bool, StoreError> {
        self.record("has_medtronic_direct_data")?;
        Ok(self.medtronic_direct)
    }

    async fn get_dexcom_data_source(&self, _user_id: &str) -> Result<Option<DexcomDataSource>, StoreError> {
        self.record("get_dexcom_data_source")?;
        Ok(self.dexcom_source.clone())
    }

    async fn has_medtronic_loop_data_after(&self, _user_id: &str, _date: NaiveDate) -> Result<bool, StoreError> {
        self.record("has_medtronic_loop_data_after")?;
        Ok(self.medtronic_loop)
    }

    async fn get_loopable_medtronic_direct_upload_ids_after(
        &self,
        _user_id: &str,
        _date: NaiveDate,
    ) -> Result<Vec<String>, StoreError> {
        self.record("get_loopable_medtronic_direct_upload_ids_after")?;
        Ok(self.upload_ids.clone())
    }

    async fn get_device_data(&self, group_id: &str, filter: &Filter) -> Result<ResultCursor, StoreError> {
        self.record("get_device_data")?;
        if let Ok(mut executed) = self.executed.lock() {
            *executed = Some((group_id.to_string(), filter.clone()));
        }
        let documents = self.groups.get(group_id).cloned().unwrap_or_default();
        Ok(ResultCursor::from_documents(documents))
    }
}

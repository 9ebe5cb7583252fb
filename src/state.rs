use std::sync::Arc;

use crate::auth::Authenticator;
use crate::database::DeviceDataStore;
use crate::services::{MetadataService, SharingService};

/// Collaborators shared by every request
#[derive(Clone)]
pub struct AppState {
    pub authenticator: Authenticator,
    pub sharing: Arc<dyn SharingService>,
    pub metadata: Arc<dyn MetadataService>,
    pub store: Arc<dyn DeviceDataStore>,
}

impl AppState {
    pub fn new(
        authenticator: Authenticator,
        sharing: Arc<dyn SharingService>,
        metadata: Arc<dyn MetadataService>,
        store: Arc<dyn DeviceDataStore>,
    ) -> Self {
        Self {
            authenticator,
            sharing,
            metadata,
            store,
        }
    }
}

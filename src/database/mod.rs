pub mod cursor;
pub mod postgres;
pub mod query;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::filter::{DexcomDataSource, Filter};

pub use cursor::ResultCursor;
pub use postgres::PostgresStore;

/// Errors from the device data store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Read access to the device data collection.
///
/// Lookups other than `get_device_data` back the filter resolver's
/// device-source rules and are keyed by the user the data belongs to.
#[async_trait]
pub trait DeviceDataStore: Send + Sync {
    /// Liveness probe
    async fn ping(&self) -> Result<(), StoreError>;

    /// Whether the user has any upload that came straight from Medtronic software
    async fn has_medtronic_direct_data(&self, user_id: &str) -> Result<bool, StoreError>;

    async fn get_dexcom_data_source(&self, user_id: &str) -> Result<Option<DexcomDataSource>, StoreError>;

    /// Whether the user has loop-reported Medtronic data on or after `date`
    async fn has_medtronic_loop_data_after(&self, user_id: &str, date: NaiveDate) -> Result<bool, StoreError>;

    async fn get_loopable_medtronic_direct_upload_ids_after(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<String>, StoreError>;

    /// Run the main query. Failures that happen before the first document is
    /// available are returned here rather than through the cursor.
    async fn get_device_data(&self, group_id: &str, filter: &Filter) -> Result<ResultCursor, StoreError>;
}

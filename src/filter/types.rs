use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

/// The data source a user designated as primary for Dexcom readings.
///
/// Records from the data sets it owns are kept; other `cbg` records inside
/// its time window are treated as duplicates.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DexcomDataSource {
    pub data_set_ids: Vec<String>,
    pub earliest_data_time: DateTime<Utc>,
    pub latest_data_time: DateTime<Utc>,
}

/// A fully described device data query for one user
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub user_id: String,
    pub types: BTreeSet<String>,
    pub sub_types: BTreeSet<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub carelink: bool,
    pub dexcom: bool,
    pub dexcom_data_source: Option<DexcomDataSource>,
    pub medtronic: bool,
    pub medtronic_date: Option<NaiveDate>,
    pub medtronic_upload_ids: BTreeSet<String>,
}

impl Filter {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }
}

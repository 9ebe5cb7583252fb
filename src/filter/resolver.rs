use chrono::NaiveDate;

use super::params::FilterRequest;
use super::types::Filter;
use crate::database::{DeviceDataStore, StoreError};

/// Medtronic direct uploads from this date on may have been loop-integrated
pub const MEDTRONIC_LOOP_BOUNDARY: NaiveDate = match NaiveDate::from_ymd_opt(2017, 9, 1) {
    Some(date) => date,
    None => panic!("2017-09-01 is a valid date"),
};

pub fn medtronic_loop_boundary() -> NaiveDate {
    MEDTRONIC_LOOP_BOUNDARY
}

/// Enrich a parsed request with the device-source rules that depend on what
/// the user has on record.
///
/// The carelink, dexcom and loop-data lookups are independent and run
/// together; the upload-id lookup depends on the loop-data answer and runs
/// after. Any failed lookup fails the whole resolution.
pub async fn resolve(request: FilterRequest, store: &dyn DeviceDataStore) -> Result<Filter, StoreError> {
    let FilterRequest {
        mut filter,
        carelink,
        dexcom,
        medtronic,
    } = request;

    let user_id = filter.user_id.clone();
    let boundary = medtronic_loop_boundary();

    let carelink_lookup = async {
        match carelink {
            Some(explicit) => Ok(explicit),
            // Without direct uploads, carelink data is the user's only history
            None => store.has_medtronic_direct_data(&user_id).await.map(|has_direct| !has_direct),
        }
    };
    let dexcom_lookup = async {
        if dexcom == Some(true) {
            Ok(None)
        } else {
            store.get_dexcom_data_source(&user_id).await
        }
    };
    let medtronic_lookup = async {
        match medtronic {
            Some(explicit) => Ok(explicit),
            None => store
                .has_medtronic_loop_data_after(&user_id, boundary)
                .await
                .map(|has_loop_data| !has_loop_data),
        }
    };

    let (carelink, dexcom_data_source, medtronic) =
        futures::try_join!(carelink_lookup, dexcom_lookup, medtronic_lookup)?;

    filter.carelink = carelink;
    filter.dexcom = dexcom.unwrap_or(false);
    filter.dexcom_data_source = dexcom_data_source;
    filter.medtronic = medtronic;

    if !filter.medtronic {
        let upload_ids = store
            .get_loopable_medtronic_direct_upload_ids_after(&user_id, boundary)
            .await?;
        filter.medtronic_date = Some(boundary);
        filter.medtronic_upload_ids = upload_ids.into_iter().collect();
    }

    tracing::debug!(
        "Resolved filter for {}: carelink={} dexcom={} (source: {}) medtronic={} ({} upload ids)",
        filter.user_id,
        filter.carelink,
        filter.dexcom,
        filter.dexcom_data_source.is_some(),
        filter.medtronic,
        filter.medtronic_upload_ids.len()
    );

    Ok(filter)
}

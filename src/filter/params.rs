use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use super::error::ParamError;
use super::types::Filter;

pub const TYPE_PARAM: &str = "type";
pub const SUBTYPE_PARAM: &str = "subtype";
pub const START_DATE_PARAM: &str = "startDate";
pub const END_DATE_PARAM: &str = "endDate";
pub const CARELINK_PARAM: &str = "carelink";
pub const DEXCOM_PARAM: &str = "dexcom";
pub const MEDTRONIC_PARAM: &str = "medtronic";

/// Decoded query string, keeping repeated keys in order
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn parse(raw: Option<&str>) -> Self {
        let pairs = raw
            .map(|query| url::form_urlencoded::parse(query.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        Self { pairs }
    }

    /// First non-empty value for `key`
    pub fn first(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.as_str())
    }

    pub fn all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

/// Parsed request before enrichment.
///
/// The device flags stay optional here: whether the caller stated them
/// decides which store lookups the resolver performs.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterRequest {
    pub filter: Filter,
    pub carelink: Option<bool>,
    pub dexcom: Option<bool>,
    pub medtronic: Option<bool>,
}

impl FilterRequest {
    pub fn parse(user_id: &str, params: &QueryParams) -> Result<Self, ParamError> {
        if user_id.trim().is_empty() {
            return Err(ParamError::MissingUserId);
        }

        let mut filter = Filter::for_user(user_id);
        filter.types = parse_set(params.first(TYPE_PARAM));
        filter.sub_types = parse_set(params.first(SUBTYPE_PARAM));
        filter.start_date = parse_date(START_DATE_PARAM, params.first(START_DATE_PARAM))?;
        filter.end_date = parse_date(END_DATE_PARAM, params.first(END_DATE_PARAM))?;

        Ok(Self {
            filter,
            carelink: parse_flag(CARELINK_PARAM, params.first(CARELINK_PARAM))?,
            dexcom: parse_flag(DEXCOM_PARAM, params.first(DEXCOM_PARAM))?,
            medtronic: parse_flag(MEDTRONIC_PARAM, params.first(MEDTRONIC_PARAM))?,
        })
    }
}

fn parse_set(raw: Option<&str>) -> BTreeSet<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}

fn parse_date(param: &'static str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>, ParamError> {
    raw.map(|value| {
        DateTime::parse_from_rfc3339(value)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(|_| ParamError::InvalidDate {
                param,
                value: value.to_string(),
            })
    })
    .transpose()
}

fn parse_flag(param: &'static str, raw: Option<&str>) -> Result<Option<bool>, ParamError> {
    raw.map(|value| match value.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ParamError::InvalidFlag {
            param,
            value: value.to_string(),
        }),
    })
    .transpose()
}

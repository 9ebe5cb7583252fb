//! SQL for the device data tables.
//!
//! Documents live in a single JSONB column; fields are addressed with `->>`.
//! Field names are fixed in this module, all caller data is bound.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

use crate::filter::Filter;

pub const DEVICE_DATA_TABLE: &str = "device_data";
pub const DATA_SOURCES_TABLE: &str = "data_sources";

const MEDTRONIC: &str = "Medtronic";

/// Pump models whose direct uploads can also arrive through a loop app
const LOOPABLE_MEDTRONIC_MODELS: [&str; 6] = ["523", "523K", "554", "723", "723K", "754"];

/// Record types a loop app reports for a Medtronic pump
const LOOP_DUPLICATED_TYPES: [&str; 3] = ["basal", "bolus", "cbg"];

#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    Text(String),
    TextList(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct SqlResult {
    pub query: String,
    pub params: Vec<QueryParam>,
}

/// Accumulates WHERE conditions and their numbered parameters
#[derive(Debug, Default)]
struct Conditions {
    clauses: Vec<String>,
    params: Vec<QueryParam>,
}

impl Conditions {
    fn param(&mut self, value: QueryParam) -> String {
        self.params.push(value);
        format!("${}", self.params.len())
    }

    fn text(&mut self, value: impl Into<String>) -> String {
        self.param(QueryParam::Text(value.into()))
    }

    /// Bind an RFC 3339 string and compare it as an instant
    fn time(&mut self, value: &DateTime<Utc>) -> String {
        format!("{}::timestamptz", self.text(format_time(value)))
    }

    fn date(&mut self, value: &NaiveDate) -> String {
        format!("{}::timestamptz", self.text(format_date(value)))
    }

    fn list<I, S>(&mut self, values: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.param(QueryParam::TextList(values.into_iter().map(Into::into).collect()))
    }

    fn push(&mut self, clause: String) {
        self.clauses.push(clause);
    }

    fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            "1=1".to_string()
        } else {
            self.clauses.join(" AND ")
        }
    }

    fn finish(self, select: &str, table: &str, suffix: &str) -> SqlResult {
        let query = [
            format!("SELECT {}", select),
            format!("FROM \"{}\"", table),
            format!("WHERE {}", self.where_clause()),
            suffix.to_string(),
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

        SqlResult {
            query,
            params: self.params,
        }
    }
}

fn field(name: &str) -> String {
    format!("data->>'{}'", name)
}

/// Document time as an instant, so `...05Z` and `...05.000Z` compare equal
fn time_field() -> String {
    format!("({})::timestamptz", field("time"))
}

fn is_active() -> String {
    format!("{} = 'true'", field("_active"))
}

/// Bounds are rendered as RFC 3339 with millisecond precision and cast on the
/// server, so stored precision does not affect comparisons
pub fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn format_date(date: &NaiveDate) -> String {
    format!("{}T00:00:00.000Z", date.format("%Y-%m-%d"))
}

/// Main query: every document in the ownership group that survives the filter
pub fn device_data_query(group_id: &str, filter: &Filter) -> SqlResult {
    let mut c = Conditions::default();

    let group = c.text(group_id);
    c.push(format!(
        "({} = {group} OR ({} = {group} AND {}))",
        field("groupId"),
        field("_groupId"),
        is_active()
    ));

    if !filter.types.is_empty() {
        let types = c.list(filter.types.iter().cloned());
        c.push(format!("{} = ANY({})", field("type"), types));
    }
    if !filter.sub_types.is_empty() {
        let sub_types = c.list(filter.sub_types.iter().cloned());
        c.push(format!("{} = ANY({})", field("subType"), sub_types));
    }
    if let Some(start) = &filter.start_date {
        let start = c.time(start);
        c.push(format!("{} >= {}", time_field(), start));
    }
    if let Some(end) = &filter.end_date {
        let end = c.time(end);
        c.push(format!("{} <= {}", time_field(), end));
    }

    if !filter.carelink {
        c.push(format!("{} IS DISTINCT FROM 'carelink'", field("source")));
    }

    if !filter.dexcom {
        if let Some(source) = &filter.dexcom_data_source {
            let data_sets = c.list(source.data_set_ids.iter().cloned());
            let earliest = c.time(&source.earliest_data_time);
            let latest = c.time(&source.latest_data_time);
            c.push(format!(
                "({} IS DISTINCT FROM 'cbg' OR {} = ANY({}) OR {} < {} OR {} > {})",
                field("type"),
                field("uploadId"),
                data_sets,
                time_field(),
                earliest,
                time_field(),
                latest
            ));
        }
    }

    if !filter.medtronic && !filter.medtronic_upload_ids.is_empty() {
        if let Some(date) = &filter.medtronic_date {
            let boundary = c.date(date);
            let types = c.list(LOOP_DUPLICATED_TYPES);
            let uploads = c.list(filter.medtronic_upload_ids.iter().cloned());
            c.push(format!(
                "({} < {} OR COALESCE({}, '') <> ALL({}) OR COALESCE({}, '') <> ALL({}))",
                time_field(),
                boundary,
                field("type"),
                types,
                field("uploadId"),
                uploads
            ));
        }
    }

    c.finish("data", DEVICE_DATA_TABLE, "")
}

pub fn medtronic_direct_data_query(user_id: &str) -> SqlResult {
    let mut c = Conditions::default();
    let user = c.text(user_id);
    c.push(format!("{} = {}", field("_userId"), user));
    c.push(is_active());
    c.push(format!("{} = 'upload'", field("type")));
    c.push(format!("{} = 'closed'", field("_state")));
    c.push("NOT (data ? 'deletedTime')".to_string());
    let manufacturer = c.text(MEDTRONIC);
    c.push(format!("data->'deviceManufacturers' ? {}", manufacturer));
    c.finish("1", DEVICE_DATA_TABLE, "LIMIT 1")
}

pub fn dexcom_data_source_query(user_id: &str) -> SqlResult {
    let mut c = Conditions::default();
    let user = c.text(user_id);
    c.push(format!("{} = {}", field("userId"), user));
    c.push(format!("{} = 'oauth'", field("providerType")));
    c.push(format!("{} = 'dexcom'", field("providerName")));
    c.push("jsonb_typeof(data->'dataSetIds') = 'array'".to_string());
    c.push("data->'dataSetIds' <> '[]'::jsonb".to_string());
    c.push("data ? 'earliestDataTime'".to_string());
    c.push("data ? 'latestDataTime'".to_string());
    c.finish("data", DATA_SOURCES_TABLE, "LIMIT 1")
}

pub fn medtronic_loop_data_query(user_id: &str, date: &NaiveDate) -> SqlResult {
    let mut c = Conditions::default();
    let user = c.text(user_id);
    c.push(format!("{} = {}", field("_userId"), user));
    c.push(is_active());
    let since = c.date(date);
    c.push(format!("{} >= {}", time_field(), since));
    let manufacturer = c.text(MEDTRONIC);
    c.push(format!("data#>>'{{origin,payload,device,manufacturer}}' = {}", manufacturer));
    c.finish("1", DEVICE_DATA_TABLE, "LIMIT 1")
}

pub fn loopable_medtronic_upload_ids_query(user_id: &str, date: &NaiveDate) -> SqlResult {
    let mut c = Conditions::default();
    let user = c.text(user_id);
    c.push(format!("{} = {}", field("_userId"), user));
    c.push(is_active());
    c.push(format!("{} = 'upload'", field("type")));
    let since = c.date(date);
    c.push(format!("{} >= {}", time_field(), since));
    let manufacturer = c.text(MEDTRONIC);
    c.push(format!("data->'deviceManufacturers' ? {}", manufacturer));
    let models = c.list(LOOPABLE_MEDTRONIC_MODELS);
    c.push(format!("{} = ANY({})", field("deviceModel"), models));
    c.push(format!("{} IS NOT NULL", field("uploadId")));
    c.finish(&format!("DISTINCT {}", field("uploadId")), DEVICE_DATA_TABLE, "")
}

/// Wrap a `SELECT 1 ... LIMIT 1` lookup as a boolean
pub fn exists(lookup: SqlResult) -> SqlResult {
    SqlResult {
        query: format!("SELECT EXISTS ({})", lookup.query),
        params: lookup.params,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::DexcomDataSource;
    use chrono::TimeZone;

    fn texts(params: &[QueryParam]) -> Vec<String> {
        params
            .iter()
            .map(|p| match p {
                QueryParam::Text(s) => s.clone(),
                QueryParam::TextList(v) => v.join("|"),
            })
            .collect()
    }

    #[test]
    fn minimal_query_is_group_scoped() {
        let mut filter = Filter::for_user("u1");
        filter.carelink = true;
        filter.dexcom = true;
        filter.medtronic = true;

        let sql = device_data_query("g1", &filter);
        assert_eq!(
            sql.query,
            "SELECT data FROM \"device_data\" WHERE (data->>'groupId' = $1 OR (data->>'_groupId' = $1 AND data->>'_active' = 'true'))"
        );
        assert_eq!(sql.params, vec![QueryParam::Text("g1".to_string())]);
    }

    #[test]
    fn types_and_dates_are_bound() {
        let mut filter = Filter::for_user("u1");
        filter.types = ["smbg", "cbg"].into_iter().map(String::from).collect();
        filter.start_date = Some(Utc.with_ymd_and_hms(2016, 1, 2, 3, 4, 5).unwrap());
        filter.end_date = Some(Utc.with_ymd_and_hms(2016, 2, 2, 3, 4, 5).unwrap());
        filter.carelink = true;
        filter.dexcom = true;
        filter.medtronic = true;

        let sql = device_data_query("g1", &filter);
        assert!(sql.query.contains("data->>'type' = ANY($2)"));
        assert!(sql.query.contains("(data->>'time')::timestamptz >= $3::timestamptz"));
        assert!(sql.query.contains("(data->>'time')::timestamptz <= $4::timestamptz"));
        assert!(!sql.query.contains("subType"));
        assert_eq!(
            texts(&sql.params),
            vec!["g1", "cbg|smbg", "2016-01-02T03:04:05.000Z", "2016-02-02T03:04:05.000Z"]
        );
    }

    #[test]
    fn carelink_excluded_unless_requested() {
        let filter = Filter::for_user("u1");
        let sql = device_data_query("g1", &filter);
        assert!(sql.query.contains("data->>'source' IS DISTINCT FROM 'carelink'"));
    }

    #[test]
    fn dexcom_source_deduplicates_cbg() {
        let mut filter = Filter::for_user("u1");
        filter.carelink = true;
        filter.medtronic = true;
        filter.dexcom_data_source = Some(DexcomDataSource {
            data_set_ids: vec!["ds1".to_string()],
            earliest_data_time: Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap(),
            latest_data_time: Utc.with_ymd_and_hms(2019, 6, 1, 0, 0, 0).unwrap(),
        });

        let sql = device_data_query("g1", &filter);
        assert!(sql.query.contains(
            "(data->>'type' IS DISTINCT FROM 'cbg' OR data->>'uploadId' = ANY($2) OR (data->>'time')::timestamptz < $3::timestamptz OR (data->>'time')::timestamptz > $4::timestamptz)"
        ));

        filter.dexcom = true;
        let sql = device_data_query("g1", &filter);
        assert!(!sql.query.contains("'cbg'"));
    }

    #[test]
    fn medtronic_uploads_deduplicate_loop_types() {
        let mut filter = Filter::for_user("u1");
        filter.carelink = true;
        filter.dexcom = true;
        filter.medtronic_date = NaiveDate::from_ymd_opt(2017, 9, 1);
        filter.medtronic_upload_ids = ["up1".to_string()].into_iter().collect();

        let sql = device_data_query("g1", &filter);
        assert!(sql.query.contains(
            "((data->>'time')::timestamptz < $2::timestamptz OR COALESCE(data->>'type', '') <> ALL($3) OR COALESCE(data->>'uploadId', '') <> ALL($4))"
        ));
        let params = texts(&sql.params);
        assert_eq!(params[1..], ["2017-09-01T00:00:00.000Z", "basal|bolus|cbg", "up1"]);
    }

    #[test]
    fn medtronic_clause_needs_upload_ids() {
        let mut filter = Filter::for_user("u1");
        filter.carelink = true;
        filter.dexcom = true;
        filter.medtronic_date = NaiveDate::from_ymd_opt(2017, 9, 1);

        let sql = device_data_query("g1", &filter);
        assert_eq!(sql.params.len(), 1);
    }

    #[test]
    fn lookups_bind_the_user() {
        let date = NaiveDate::from_ymd_opt(2017, 9, 1).unwrap();
        for sql in [
            exists(medtronic_direct_data_query("u1")),
            dexcom_data_source_query("u1"),
            exists(medtronic_loop_data_query("u1", &date)),
            loopable_medtronic_upload_ids_query("u1", &date),
        ] {
            assert_eq!(sql.params[0], QueryParam::Text("u1".to_string()));
            assert!(!sql.query.contains("u1"));
        }
    }

    #[test]
    fn exists_wraps_lookup() {
        let sql = exists(medtronic_direct_data_query("u1"));
        assert!(sql.query.starts_with("SELECT EXISTS (SELECT 1 FROM \"device_data\" WHERE "));
        assert!(sql.query.ends_with("LIMIT 1)"));
    }

    #[test]
    fn loop_data_reads_nested_manufacturer() {
        let date = NaiveDate::from_ymd_opt(2017, 9, 1).unwrap();
        let sql = medtronic_loop_data_query("u1", &date);
        assert!(sql.query.contains("(data->>'time')::timestamptz >= $2::timestamptz"));
        assert!(sql.query.contains("data#>>'{origin,payload,device,manufacturer}' = $3"));
        assert_eq!(sql.params[1], QueryParam::Text("2017-09-01T00:00:00.000Z".to_string()));
    }

    #[test]
    fn end_date_is_inclusive_regardless_of_stored_precision() {
        let mut filter = Filter::for_user("u1");
        filter.end_date = Some(Utc.with_ymd_and_hms(2016, 2, 2, 3, 4, 5).unwrap());
        filter.carelink = true;
        filter.dexcom = true;
        filter.medtronic = true;

        let sql = device_data_query("g1", &filter);
        // Both sides are instants; a stored "2016-02-02T03:04:05Z" is not
        // compared as text against the millisecond bound
        assert!(!sql.query.contains("data->>'time' <="));
        assert!(sql.query.contains("(data->>'time')::timestamptz <= $2::timestamptz"));
        assert_eq!(sql.params[1], QueryParam::Text("2016-02-02T03:04:05.000Z".to_string()));
    }
}

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::query::QueryScalar;
use sqlx::{PgPool, Postgres};
use tracing::info;

use super::cursor::{DocumentStream, ResultCursor};
use super::query::{self, QueryParam, SqlResult};
use super::{DeviceDataStore, StoreError};
use crate::config::DatabaseConfig;
use crate::filter::{DexcomDataSource, Filter};

/// Device data store backed by PostgreSQL JSONB documents
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    slow_query_threshold: Option<Duration>,
}

impl PostgresStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect(&config.url)
            .await?;

        info!("Created device data pool ({} max connections)", config.max_connections);

        let slow_query_threshold = config
            .enable_slow_query_warning
            .then(|| Duration::from_millis(config.slow_query_threshold_ms));
        Ok(Self {
            pool,
            slow_query_threshold,
        })
    }

    /// Index the ownership fields the main query filters on.
    /// Failure is logged and otherwise ignored.
    pub async fn ensure_indexes(&self) {
        let statement = format!(
            "CREATE INDEX IF NOT EXISTS device_data_group_idx ON \"{}\" ((data->>'groupId'), (data->>'_groupId'))",
            query::DEVICE_DATA_TABLE
        );
        if let Err(e) = sqlx::query(&statement).execute(&self.pool).await {
            tracing::warn!("Could not ensure device data index: {}", e);
        }
    }

    async fn exists(&self, lookup: SqlResult) -> Result<bool, StoreError> {
        let sql = query::exists(lookup);
        let found = bind_params(sqlx::query_scalar::<_, bool>(&sql.query), &sql.params)
            .fetch_one(&self.pool)
            .await?;
        Ok(found)
    }

    fn warn_if_slow(&self, what: &str, started: Instant) {
        if let Some(threshold) = self.slow_query_threshold {
            let elapsed = started.elapsed();
            if elapsed > threshold {
                tracing::warn!("Slow {} query took [{:.5}]secs", what, elapsed.as_secs_f64());
            }
        }
    }
}

#[async_trait]
impl DeviceDataStore for PostgresStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn has_medtronic_direct_data(&self, user_id: &str) -> Result<bool, StoreError> {
        let started = Instant::now();
        let found = self.exists(query::medtronic_direct_data_query(user_id)).await?;
        self.warn_if_slow("medtronic direct data", started);
        Ok(found)
    }

    async fn get_dexcom_data_source(&self, user_id: &str) -> Result<Option<DexcomDataSource>, StoreError> {
        let started = Instant::now();
        let sql = query::dexcom_data_source_query(user_id);
        let row = bind_params(sqlx::query_scalar::<_, Value>(&sql.query), &sql.params)
            .fetch_optional(&self.pool)
            .await?;
        self.warn_if_slow("dexcom data source", started);

        row.map(|data| serde_json::from_value(data).map_err(|e| StoreError::Decode(format!("dexcom data source: {}", e))))
            .transpose()
    }

    async fn has_medtronic_loop_data_after(&self, user_id: &str, date: NaiveDate) -> Result<bool, StoreError> {
        let started = Instant::now();
        let found = self.exists(query::medtronic_loop_data_query(user_id, &date)).await?;
        self.warn_if_slow("medtronic loop data", started);
        Ok(found)
    }

    async fn get_loopable_medtronic_direct_upload_ids_after(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<String>, StoreError> {
        let started = Instant::now();
        let sql = query::loopable_medtronic_upload_ids_query(user_id, &date);
        let ids = bind_params(sqlx::query_scalar::<_, String>(&sql.query), &sql.params)
            .fetch_all(&self.pool)
            .await?;
        self.warn_if_slow("loopable medtronic uploads", started);
        Ok(ids)
    }

    async fn get_device_data(&self, group_id: &str, filter: &Filter) -> Result<ResultCursor, StoreError> {
        let sql = query::device_data_query(group_id, filter);
        tracing::debug!("device data query [{}] with {} params", sql.query, sql.params.len());

        let started = Instant::now();
        let mut documents: DocumentStream = stream_documents(self.pool.clone(), sql).boxed();

        // Pull the first row so that connection and query errors are
        // reported before the response is committed
        let first = match documents.next().await {
            Some(Err(e)) => return Err(e),
            first => first,
        };
        info!("device data query returned first result after [{:.5}]secs", started.elapsed().as_secs_f64());
        self.warn_if_slow("device data", started);

        Ok(ResultCursor::new(stream::iter(first).chain(documents).boxed()))
    }
}

/// The stream owns its pooled connection; dropping it returns the connection
fn stream_documents(pool: PgPool, sql: SqlResult) -> impl Stream<Item = Result<Value, StoreError>> + Send + 'static {
    async_stream::try_stream! {
        let mut conn = pool.acquire().await?;
        let mut rows = bind_params(sqlx::query_scalar::<_, Value>(&sql.query), &sql.params).fetch(&mut *conn);
        while let Some(document) = rows.try_next().await? {
            yield document;
        }
    }
}

fn bind_params<'q, O>(
    mut q: QueryScalar<'q, Postgres, O, PgArguments>,
    params: &[QueryParam],
) -> QueryScalar<'q, Postgres, O, PgArguments> {
    for param in params {
        q = match param {
            QueryParam::Text(value) => q.bind(value.clone()),
            QueryParam::TextList(values) => q.bind(values.clone()),
        };
    }
    q
}

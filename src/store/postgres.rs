//! PostgreSQL backend over an `sqlx` connection pool

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow, Postgres};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::Row;
use tokio::sync::mpsc;
use tracing::debug;

use super::backend::{Backend, DocumentStream, Page, PreparedFilter, WriteMode};
use super::config::StoreConfig;
use super::errors::{StoreError, StoreResult};
use super::record::DocumentKey;
use super::sql::{Arg, Statement, Table};
use crate::observability::Event;
use crate::query::Value;

/// Rows buffered ahead of a list consumer
const SCAN_BUFFER: usize = 64;

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Collection table in PostgreSQL
#[derive(Debug, Clone)]
pub struct PgBackend {
    pool: PgPool,
    table: Table,
}

impl PgBackend {
    /// Open a pool and, when configured, bootstrap the schema
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.connection_string)
            .await?;

        let backend = Self::with_pool(pool, Table::from_config(config)?);
        if config.bootstrap_schema {
            backend.ensure_schema().await?;
        }
        Ok(backend)
    }

    pub fn with_pool(pool: PgPool, table: Table) -> Self {
        Self { pool, table }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Create schema, table and indexes if missing
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        for ddl in self.table.bootstrap() {
            sqlx::query(&ddl).execute(&self.pool).await?;
        }
        debug!(event = Event::SchemaBootstrapped.as_str(), table = %self.table.qualified());
        Ok(())
    }

    async fn execute(&self, stmt: Statement) -> StoreResult<u64> {
        debug!(sql = %stmt.sql, params = stmt.args.len());
        let result = bind_all(sqlx::query(&stmt.sql), &stmt.args)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn fetch_one(&self, stmt: Statement) -> StoreResult<PgRow> {
        debug!(sql = %stmt.sql, params = stmt.args.len());
        Ok(bind_all(sqlx::query(&stmt.sql), &stmt.args)
            .fetch_one(&self.pool)
            .await?)
    }
}

#[async_trait]
impl Backend for PgBackend {
    async fn write(
        &self,
        key: &DocumentKey,
        value: serde_json::Value,
        expires: Option<DateTime<Utc>>,
        mode: WriteMode,
    ) -> StoreResult<bool> {
        let stmt = match mode {
            WriteMode::Create => self.table.create(key, value, expires),
            WriteMode::Update => self.table.update(key, value, expires),
            WriteMode::Upsert => self.table.upsert(key, value, expires),
        };
        match self.execute(stmt).await {
            Ok(rows) => Ok(rows > 0),
            // a concurrent create won the race for the key
            Err(StoreError::Backend(sqlx::Error::Database(e)))
                if mode == WriteMode::Create && e.is_unique_violation() =>
            {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, key: &DocumentKey) -> StoreResult<bool> {
        Ok(self.execute(self.table.delete(key)).await? > 0)
    }

    async fn delete_matching(&self, partition: &str, filter: Option<PreparedFilter<'_>>) -> StoreResult<u64> {
        self.execute(self.table.delete_matching(partition, filter.map(|f| f.compiled)))
            .await
    }

    async fn delete_expired(&self, partition: &str) -> StoreResult<u64> {
        self.execute(self.table.delete_expired(partition)).await
    }

    async fn fetch(&self, key: &DocumentKey) -> StoreResult<Option<serde_json::Value>> {
        let stmt = self.table.get(key);
        debug!(sql = %stmt.sql, params = stmt.args.len());
        let row = bind_all(sqlx::query(&stmt.sql), &stmt.args)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode_value).transpose()
    }

    async fn exists(&self, key: &DocumentKey) -> StoreResult<bool> {
        let row = self.fetch_one(self.table.exists(key)).await?;
        Ok(row.try_get::<bool, _>(0)?)
    }

    async fn count(&self, partition: &str, filter: Option<PreparedFilter<'_>>) -> StoreResult<u64> {
        let row = self
            .fetch_one(self.table.count(partition, filter.map(|f| f.compiled)))
            .await?;
        let n: i64 = row.try_get(0)?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    fn scan<'a>(&'a self, partition: &str, filter: Option<PreparedFilter<'_>>, page: Page) -> DocumentStream<'a> {
        let stmt = self.table.list(partition, filter.map(|f| f.compiled), page);
        let pending = ScanState::Pending(stmt, self.pool.clone());

        // The reader starts on first poll, inside whatever runtime drives the stream
        stream::unfold(pending, |state| async move {
            let mut rx = match state {
                ScanState::Pending(stmt, pool) => spawn_reader(stmt, pool),
                ScanState::Reading(rx) => rx,
            };
            rx.recv().await.map(|item| (item, ScanState::Reading(rx)))
        })
        .boxed()
    }
}

enum ScanState {
    Pending(Statement, PgPool),
    Reading(mpsc::Receiver<StoreResult<serde_json::Value>>),
}

/// Pull rows on a task so the stream does not borrow the SQL text
fn spawn_reader(stmt: Statement, pool: PgPool) -> mpsc::Receiver<StoreResult<serde_json::Value>> {
    let (tx, rx) = mpsc::channel(SCAN_BUFFER);
    tokio::spawn(async move {
        debug!(sql = %stmt.sql, params = stmt.args.len());
        let mut rows = bind_all(sqlx::query(&stmt.sql), &stmt.args).fetch(&pool);
        while let Some(row) = rows.next().await {
            let item = row.map_err(StoreError::from).and_then(|r| decode_value(&r));
            let failed = item.is_err();
            if tx.send(item).await.is_err() || failed {
                break;
            }
        }
    });
    rx
}

fn decode_value(row: &PgRow) -> StoreResult<serde_json::Value> {
    let Json(value) = row.try_get::<Json<serde_json::Value>, _>(0)?;
    Ok(value)
}

fn bind_all<'q>(query: PgQuery<'q>, args: &[Arg]) -> PgQuery<'q> {
    args.iter().fold(query, bind_arg)
}

fn bind_arg<'q>(query: PgQuery<'q>, arg: &Arg) -> PgQuery<'q> {
    match arg {
        Arg::Text(s) => query.bind(s.clone()),
        Arg::Json(v) => query.bind(Json(v.clone())),
        Arg::Expires(at) => query.bind(*at),
        Arg::BigInt(n) => query.bind(*n),
        Arg::Bound(value) => bind_value(query, value),
    }
}

/// Bind a filter parameter with the Rust type matching its `$n::type` cast
fn bind_value<'q>(query: PgQuery<'q>, value: &Value) -> PgQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Int16(v) => query.bind(*v),
        Value::Int32(v) => query.bind(*v),
        Value::Int64(v) => query.bind(*v),
        Value::Float32(v) => query.bind(*v),
        Value::Float64(v) => query.bind(*v),
        Value::Decimal(d) => query.bind(*d),
        Value::Text(s) => query.bind(s.clone()),
        Value::Timestamp(t) => query.bind(*t),
        Value::Guid(g) => query.bind(*g),
    }
}

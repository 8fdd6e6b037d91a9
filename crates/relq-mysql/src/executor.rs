//! Record executor backed by a MySQL pool.

use async_trait::async_trait;
use relq_core::sql::{count_statement, records_statement, Statement, COUNT_COLUMN};
use relq_core::{Record, RecordExecutor, RecordOptions, Relation, RelqError, Result};
use relq_shared::{PerfTimer, QueryMetrics, RecordsConfig, QUERY_DURATION};
use serde_json::Value;
use sqlx::mysql::MySqlArguments;
use sqlx::query::Query;
use sqlx::{MySql, Pool, Row};
use tracing::{debug, instrument};

use crate::decode::decode_row;

/// Runs relations against MySQL, capping every fetch at the configured limit.
#[derive(Clone)]
pub struct MySqlRecordExecutor {
    pool: Pool<MySql>,
    records: RecordsConfig,
}

impl MySqlRecordExecutor {
    pub fn new(pool: Pool<MySql>, records: RecordsConfig) -> Self {
        Self { pool, records }
    }

    /// The options actually sent to the database: the limit defaulted and capped.
    pub fn effective_options(&self, options: &RecordOptions) -> RecordOptions {
        RecordOptions {
            limit: Some(self.records.effective_limit(options.limit)),
            ..options.clone()
        }
    }
}

fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &Value,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(u) = n.as_u64() {
                query.bind(u)
            } else {
                query.bind(n.as_f64())
            }
        }
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(sqlx::types::Json(other.clone())),
    }
}

fn prepare(statement: &Statement) -> Query<'_, MySql, MySqlArguments> {
    statement
        .binds
        .iter()
        .fold(sqlx::query(&statement.sql), bind_value)
}

#[async_trait]
impl RecordExecutor for MySqlRecordExecutor {
    #[instrument(skip_all, fields(relation = %relation.name()))]
    async fn select_rows(&self, relation: &Relation, options: &RecordOptions) -> Result<Vec<Record>> {
        let options = self.effective_options(options);
        let statement = records_statement(relation, &options)?;
        debug!(sql = %statement.sql, binds = statement.binds.len(), "selecting rows");

        let timer = PerfTimer::new(QUERY_DURATION).with_label("kind", "rows");
        let rows = prepare(&statement).fetch_all(&self.pool).await.map_err(|e| {
            QueryMetrics::query_failed("rows");
            RelqError::Database(format!("Failed to fetch rows: {}", e))
        })?;

        let records = rows
            .iter()
            .map(decode_row)
            .collect::<anyhow::Result<Vec<_>>>()
            .map_err(|e| RelqError::Database(format!("Failed to decode row: {}", e)))?;
        QueryMetrics::rows_fetched(records.len(), timer.finish());
        Ok(records)
    }

    #[instrument(skip_all, fields(relation = %relation.name()))]
    async fn select_count(&self, relation: &Relation, options: &RecordOptions) -> Result<u64> {
        let statement = count_statement(relation, options)?;
        debug!(sql = %statement.sql, "counting rows");

        let timer = PerfTimer::new(QUERY_DURATION).with_label("kind", "count");
        let row = prepare(&statement).fetch_one(&self.pool).await.map_err(|e| {
            QueryMetrics::query_failed("count");
            RelqError::Database(format!("Failed to count rows: {}", e))
        })?;
        let count: i64 = row
            .try_get(COUNT_COLUMN)
            .map_err(|e| RelqError::Database(format!("Failed to read count: {}", e)))?;

        QueryMetrics::count_fetched(timer.finish());
        Ok(count.max(0) as u64)
    }
}

//! Contract for running relations against a database.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::sql::{RecordOptions, Relation};

/// One fetched row, keyed by output alias in output order.
pub type Record = Map<String, Value>;

/// Runs a relation's SQL and returns its rows or row count.
///
/// Implementations own connections, timeouts and retries. When
/// `options.order_by` is empty rows must come back in the default ordering
/// produced by [`crate::sql::records_statement`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordExecutor: Send + Sync {
    async fn select_rows(&self, relation: &Relation, options: &RecordOptions) -> Result<Vec<Record>>;

    async fn select_count(&self, relation: &Relation, options: &RecordOptions) -> Result<u64>;
}

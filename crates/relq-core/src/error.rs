//! Error types for relq core

use thiserror::Error;

use crate::column::{AttNum, TableId};

#[derive(Error, Debug)]
pub enum RelqError {
    #[error("Invalid initial column: {0}")]
    InvalidInitialColumn(String),

    #[error("Table {table_id} not found in schema metadata")]
    TableNotFound { table_id: TableId },

    #[error("Column with attnum {attnum} not found in table {table_id}")]
    ColumnNotFound { table_id: TableId, attnum: AttNum },

    #[error("Column `{column}` not found in relation `{relation}`")]
    ColumnNameNotFound { relation: String, column: String },

    #[error("Alias `{alias}` is not available at step {step}")]
    UnknownAlias { alias: String, step: usize },

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    #[error("Invalid transformation: {0}")]
    InvalidTransformation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, RelqError>;

impl From<anyhow::Error> for RelqError {
    fn from(err: anyhow::Error) -> Self {
        RelqError::Internal(err.to_string())
    }
}

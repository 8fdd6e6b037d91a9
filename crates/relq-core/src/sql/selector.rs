use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::helpers::quote_ident;
use crate::error::{RelqError, Result};

/// A column optionally qualified by the table/relation alias it is read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnPath {
    source: Option<Arc<str>>,
    column: Arc<str>,
}

impl ColumnPath {
    pub fn new(column: &str) -> Self {
        Self {
            source: None,
            column: Arc::from(column),
        }
    }

    pub fn qualified(source: &str, column: &str) -> Self {
        Self {
            source: Some(Arc::from(source)),
            column: Arc::from(column),
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn to_sql(&self) -> Result<String> {
        let col = quote_ident(&self.column)?;
        match &self.source {
            Some(src) => Ok(format!("{}.{col}", quote_ident(src)?)),
            None => Ok(col),
        }
    }
}

impl std::fmt::Display for ColumnPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.to_sql().map_err(|_| std::fmt::Error).and_then(|s| f.write_str(&s))
    }
}

/// Aggregate applied to a selected column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    Count,
    CountDistinct,
    Sum,
    Min,
    Max,
    Avg,
    /// All values of the group collected into a JSON array.
    List,
}

impl AggregateFunction {
    fn wrap(&self, expr: &str) -> String {
        match self {
            AggregateFunction::Count => format!("COUNT({expr})"),
            AggregateFunction::CountDistinct => format!("COUNT(DISTINCT {expr})"),
            AggregateFunction::Sum => format!("SUM({expr})"),
            AggregateFunction::Min => format!("MIN({expr})"),
            AggregateFunction::Max => format!("MAX({expr})"),
            AggregateFunction::Avg => format!("AVG({expr})"),
            AggregateFunction::List => format!("JSON_ARRAYAGG({expr})"),
        }
    }

    /// Result type given the aggregated column's type.
    pub fn result_type(&self, input_type: &str) -> String {
        match self {
            AggregateFunction::Count | AggregateFunction::CountDistinct => "bigint".to_string(),
            AggregateFunction::Sum | AggregateFunction::Avg => "decimal".to_string(),
            AggregateFunction::Min | AggregateFunction::Max => input_type.to_string(),
            AggregateFunction::List => "json".to_string(),
        }
    }

    /// Whether the result can be NULL for a non-empty group.
    pub fn result_nullable(&self, input_nullable: bool) -> bool {
        match self {
            AggregateFunction::Count | AggregateFunction::CountDistinct => false,
            AggregateFunction::List => false,
            _ => input_nullable,
        }
    }
}

/// One entry of a SELECT list.
#[derive(Clone, PartialEq)]
pub struct Selector {
    source: Option<Arc<str>>,
    column: Arc<str>,
    alias: Option<Arc<str>>,
    aggregate: Option<AggregateFunction>,
}

impl Selector {
    pub fn new(column: &str) -> Self {
        Selector {
            source: None,
            column: Arc::from(column),
            alias: None,
            aggregate: None,
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn aggregate(&self) -> Option<AggregateFunction> {
        self.aggregate
    }

    /// Name of the column this selector produces.
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.column)
    }

    pub fn set_source(mut self, source: &str) -> Self {
        self.source = Some(Arc::from(source));
        self
    }

    pub fn set_alias(mut self, alias: &str) -> Self {
        self.alias = Some(Arc::from(alias));
        self
    }

    pub fn set_aggregate(mut self, function: AggregateFunction) -> Self {
        self.aggregate = Some(function);
        self
    }

    pub fn to_sql(&self) -> Result<String> {
        let expr = if &*self.column == "*" {
            match &self.source {
                Some(src) => format!("{}.*", quote_ident(src)?),
                None => "*".to_string(),
            }
        } else {
            let col = quote_ident(&self.column)?;
            match &self.source {
                Some(src) => format!("{}.{col}", quote_ident(src)?),
                None => col,
            }
        };

        let expr = match self.aggregate {
            Some(AggregateFunction::Count) if &*self.column == "*" => {
                if self.source.is_some() {
                    return Err(RelqError::InvalidIdentifier(
                        "COUNT(*) cannot be qualified".into(),
                    ));
                }
                "COUNT(*)".to_string()
            }
            Some(f) => {
                if &*self.column == "*" {
                    return Err(RelqError::InvalidIdentifier(format!(
                        "cannot apply {f:?} to a wildcard"
                    )));
                }
                f.wrap(&expr)
            }
            None => expr,
        };

        match &self.alias {
            Some(_) if &*self.column == "*" && self.aggregate.is_none() => Err(
                RelqError::InvalidIdentifier("cannot alias a wildcard selector (`*` or `src.*`)".into()),
            ),
            Some(alias) => Ok(format!("{expr} AS {}", quote_ident(alias)?)),
            None => Ok(expr),
        }
    }
}

impl std::fmt::Debug for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selector")
            .field("source", &self.source.as_deref())
            .field("column", &self.column)
            .field("alias", &self.alias.as_deref())
            .field("aggregate", &self.aggregate)
            .finish()
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.to_sql().map_err(|_| std::fmt::Error).and_then(|s| f.write_str(&s))
    }
}

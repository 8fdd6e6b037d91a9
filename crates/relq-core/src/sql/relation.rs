//! Named, composable sub-relations.
//!
//! A [`Relation`] is a chain of common table expressions; the last one is the
//! relation's head and every further step reads from it by name instead of
//! re-expanding its definition.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::helpers::quote_ident;
use super::select::{Select, SelectExt, Source};
use super::selector::{ColumnPath, Selector};
use crate::error::{RelqError, Result};

/// Labeled column of a relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationColumn {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

impl RelationColumn {
    /// Same column under a different name.
    pub fn renamed(&self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub name: Arc<str>,
    pub select: Select,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    prefix: Arc<str>,
    ctes: Arc<Vec<Cte>>,
    columns: Arc<Vec<RelationColumn>>,
    /// Logical row order `(column, ascending)` carried to later steps.
    ordering: Arc<Vec<(String, bool)>>,
}

impl Relation {
    /// Wrap `select` as the first sub-relation, named `{prefix}_0`.
    pub fn new(prefix: &str, select: Select, columns: Vec<RelationColumn>) -> Self {
        let cte = Cte {
            name: Arc::from(format!("{prefix}_0")),
            select,
        };
        Self {
            prefix: Arc::from(prefix),
            ctes: Arc::new(vec![cte]),
            columns: Arc::new(columns),
            ordering: Default::default(),
        }
    }

    /// Name of the head sub-relation.
    pub fn name(&self) -> &str {
        // `new` always seeds one CTE and `derive` only appends.
        self.ctes.last().map(|c| &*c.name).unwrap_or(&self.prefix)
    }

    pub fn ctes(&self) -> &[Cte] {
        &self.ctes
    }

    /// The head's SELECT statement.
    pub fn head(&self) -> Option<&Select> {
        self.ctes.last().map(|c| &c.select)
    }

    pub fn columns(&self) -> &[RelationColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&RelationColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Like [`Relation::column`] but failing with the relation's name.
    pub fn require_column(&self, name: &str) -> Result<&RelationColumn> {
        self.column(name).ok_or_else(|| RelqError::ColumnNameNotFound {
            relation: self.name().to_string(),
            column: name.to_string(),
        })
    }

    pub fn ordering(&self) -> &[(String, bool)] {
        &self.ordering
    }

    /// Same relation with a different logical row order.
    pub fn with_ordering(mut self, ordering: Vec<(String, bool)>) -> Self {
        self.ordering = Arc::new(ordering);
        self
    }

    /// `SELECT head.c1, head.c2, ... FROM head`, ready to be refined.
    pub fn scan(&self) -> Result<Select> {
        let name = self.name();
        Ok(Select::new(Source::relation(name)).select(
            self.columns
                .iter()
                .map(|c| Selector::new(&c.name).set_source(name)),
        ))
    }

    /// [`Relation::scan`] re-applying the logical ordering, for steps whose
    /// result depends on row order (limit, offset).
    pub fn scan_ordered(&self) -> Result<Select> {
        let name = self.name();
        Ok(self
            .ordering
            .iter()
            .fold(self.scan()?, |select, (col, asc)| {
                select.order_by(ColumnPath::qualified(name, col), *asc)
            }))
    }

    /// Append `select` as a new head named `{prefix}_{n}`. The logical
    /// ordering survives for the columns that are still present.
    pub fn derive(&self, select: Select, columns: Vec<RelationColumn>) -> Self {
        let mut ctes = (*self.ctes).clone();
        ctes.push(Cte {
            name: Arc::from(format!("{}_{}", self.prefix, ctes.len())),
            select,
        });
        let ordering = self
            .ordering
            .iter()
            .filter(|(col, _)| columns.iter().any(|c| &c.name == col))
            .cloned()
            .collect();
        Self {
            prefix: Arc::clone(&self.prefix),
            ctes: Arc::new(ctes),
            columns: Arc::new(columns),
            ordering: Arc::new(ordering),
        }
    }

    /// `WITH ... <outer>`; binds are collected in textual order.
    pub fn render(&self, outer: &Select) -> Result<(String, Vec<Value>)> {
        let mut binds = Vec::new();
        let mut defs = Vec::with_capacity(self.ctes.len());
        for cte in self.ctes.iter() {
            let body = cte.select.to_sql(&mut binds)?;
            defs.push(format!("{} AS ({body})", quote_ident(&cte.name)?));
        }
        let tail = outer.to_sql(&mut binds)?;
        Ok((format!("WITH {} {tail}", defs.join(", ")), binds))
    }

    /// The whole relation as a standalone statement.
    pub fn to_sql(&self) -> Result<(String, Vec<Value>)> {
        self.render(&self.scan()?)
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_sql() {
            Ok((sql, _)) => write!(f, "{sql}"),
            Err(e) => write!(f, "<error: {e}>"),
        }
    }
}

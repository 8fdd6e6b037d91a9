//! Physical column references and the initial columns a query exposes.

use serde::{Deserialize, Serialize};

use crate::error::{RelqError, Result};

/// Schema-level identifier of a table.
pub type TableId = u64;

/// 1-based position of a column inside its table.
pub type AttNum = u32;

/// A physical column: `(table, attnum)`.
///
/// Serialized as a two-element array, e.g. `[10, 3]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(TableId, AttNum)", into = "(TableId, AttNum)")]
pub struct ColumnRef {
    pub table_id: TableId,
    pub attnum: AttNum,
}

impl ColumnRef {
    pub fn new(table_id: TableId, attnum: AttNum) -> Self {
        Self { table_id, attnum }
    }
}

impl From<(TableId, AttNum)> for ColumnRef {
    fn from((table_id, attnum): (TableId, AttNum)) -> Self {
        Self { table_id, attnum }
    }
}

impl From<ColumnRef> for (TableId, AttNum) {
    fn from(c: ColumnRef) -> Self {
        (c.table_id, c.attnum)
    }
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.table_id, self.attnum)
    }
}

/// One hop of a join path: the column we join from and the column we join to.
///
/// Serialized as `[[source_table, source_attnum], [target_table, target_attnum]]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(ColumnRef, ColumnRef)", into = "(ColumnRef, ColumnRef)")]
pub struct JoinEdge {
    pub source: ColumnRef,
    pub target: ColumnRef,
}

impl JoinEdge {
    pub fn new(source: impl Into<ColumnRef>, target: impl Into<ColumnRef>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Table reached by following this edge.
    pub fn target_table(&self) -> TableId {
        self.target.table_id
    }
}

impl From<(ColumnRef, ColumnRef)> for JoinEdge {
    fn from((source, target): (ColumnRef, ColumnRef)) -> Self {
        Self { source, target }
    }
}

impl From<JoinEdge> for (ColumnRef, ColumnRef) {
    fn from(e: JoinEdge) -> Self {
        (e.source, e.target)
    }
}

impl std::fmt::Display for JoinEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.source, self.target)
    }
}

/// A physical column exposed by a query under `alias`, optionally reached
/// from the base table by following `join_path`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "InitialColumnDef")]
pub struct InitialColumn {
    table_id: TableId,
    attnum: AttNum,
    alias: String,
    join_path: Vec<JoinEdge>,
}

impl InitialColumn {
    /// A column on the base table itself. Fails when `alias` is blank.
    pub fn new(table_id: TableId, attnum: AttNum, alias: impl Into<String>) -> Result<Self> {
        Self::with_join_path(table_id, attnum, alias, Vec::new())
    }

    pub fn with_join_path(
        table_id: TableId,
        attnum: AttNum,
        alias: impl Into<String>,
        join_path: Vec<JoinEdge>,
    ) -> Result<Self> {
        let alias = alias.into();
        if alias.trim().is_empty() {
            return Err(RelqError::InvalidInitialColumn(format!(
                "alias for column {table_id}.{attnum} must not be blank"
            )));
        }
        Ok(Self {
            table_id,
            attnum,
            alias,
            join_path,
        })
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn attnum(&self) -> AttNum {
        self.attnum
    }

    pub fn column_ref(&self) -> ColumnRef {
        ColumnRef::new(self.table_id, self.attnum)
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn join_path(&self) -> &[JoinEdge] {
        &self.join_path
    }

    /// A base column lives on the query's base table (no joins needed).
    pub fn is_base_column(&self) -> bool {
        self.join_path.is_empty()
    }
}

#[derive(Deserialize)]
struct InitialColumnDef {
    table_id: TableId,
    attnum: AttNum,
    alias: String,
    #[serde(default)]
    join_path: Vec<JoinEdge>,
}

impl TryFrom<InitialColumnDef> for InitialColumn {
    type Error = RelqError;

    fn try_from(def: InitialColumnDef) -> Result<Self> {
        InitialColumn::with_join_path(def.table_id, def.attnum, def.alias, def.join_path)
    }
}

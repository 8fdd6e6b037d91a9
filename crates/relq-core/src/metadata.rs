//! Schema metadata: what we know about physical tables and where it comes from.
//!
//! A [`TableReflector`] is the source of truth (a live database, a snapshot, a
//! fixture). A [`Metadata`] handle memoizes reflected tables so every lookup
//! performed while building one relation sees the same schema state. After a
//! schema-altering operation callers must switch to [`Metadata::fresh`]; a
//! handle never notices schema changes on its own.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::column::{AttNum, ColumnRef, JoinEdge, TableId};
use crate::error::{RelqError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub attnum: AttNum,
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
}

/// `attnum` of the owning table references `referenced`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub attnum: AttNum,
    pub referenced: ColumnRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub id: TableId,
    #[serde(default)]
    pub schema: Option<String>,
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableDescriptor {
    pub fn column(&self, attnum: AttNum) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.attnum == attnum)
    }

    pub fn column_by_name(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary_key(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.primary_key)
    }
}

/// Source of table definitions.
///
/// Implementations must be idempotent per `table_id` for as long as the
/// underlying schema does not change.
pub trait TableReflector: Send + Sync {
    fn reflect_table(&self, table_id: TableId) -> Result<TableDescriptor>;

    /// Every table this reflector knows about. Used to discover incoming
    /// foreign keys; reflectors that cannot enumerate return an empty list.
    fn table_ids(&self) -> Vec<TableId> {
        Vec::new()
    }
}

/// In-memory reflector over a fixed set of tables.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(from = "Vec<TableDescriptor>", into = "Vec<TableDescriptor>")]
pub struct StaticCatalog {
    tables: BTreeMap<TableId, TableDescriptor>,
    reflections: AtomicUsize,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: TableDescriptor) -> Self {
        self.tables.insert(table.id, table);
        self
    }

    /// Number of `reflect_table` calls served so far.
    pub fn reflection_count(&self) -> usize {
        self.reflections.load(Ordering::Relaxed)
    }
}

impl Clone for StaticCatalog {
    fn clone(&self) -> Self {
        Self {
            tables: self.tables.clone(),
            reflections: AtomicUsize::new(0),
        }
    }
}

impl From<Vec<TableDescriptor>> for StaticCatalog {
    fn from(tables: Vec<TableDescriptor>) -> Self {
        Self {
            tables: tables.into_iter().map(|t| (t.id, t)).collect(),
            reflections: AtomicUsize::new(0),
        }
    }
}

impl From<StaticCatalog> for Vec<TableDescriptor> {
    fn from(catalog: StaticCatalog) -> Self {
        catalog.tables.into_values().collect()
    }
}

impl TableReflector for StaticCatalog {
    fn reflect_table(&self, table_id: TableId) -> Result<TableDescriptor> {
        self.reflections.fetch_add(1, Ordering::Relaxed);
        self.tables
            .get(&table_id)
            .cloned()
            .ok_or(RelqError::TableNotFound { table_id })
    }

    fn table_ids(&self) -> Vec<TableId> {
        self.tables.keys().copied().collect()
    }
}

/// Shared, memoizing handle over a [`TableReflector`].
///
/// Clones share the same cache.
#[derive(Clone)]
pub struct Metadata {
    reflector: Arc<dyn TableReflector>,
    tables: Arc<DashMap<TableId, Arc<TableDescriptor>>>,
}

impl Metadata {
    pub fn new(reflector: Arc<dyn TableReflector>) -> Self {
        Self {
            reflector,
            tables: Arc::new(DashMap::new()),
        }
    }

    /// A new handle over the same reflector with an empty cache.
    pub fn fresh(&self) -> Self {
        Self::new(Arc::clone(&self.reflector))
    }

    /// Reflect `table_id`, reusing an already registered definition.
    pub fn reflect_table(&self, table_id: TableId) -> Result<Arc<TableDescriptor>> {
        if let Some(table) = self.tables.get(&table_id) {
            return Ok(Arc::clone(table.value()));
        }
        debug!(table_id, "reflecting table");
        let table = Arc::new(self.reflector.reflect_table(table_id)?);
        Ok(Arc::clone(
            self.tables.entry(table_id).or_insert(table).value(),
        ))
    }

    pub fn is_reflected(&self, table_id: TableId) -> bool {
        self.tables.contains_key(&table_id)
    }

    pub fn column(&self, table_id: TableId, attnum: AttNum) -> Result<ColumnDescriptor> {
        self.reflect_table(table_id)?
            .column(attnum)
            .cloned()
            .ok_or(RelqError::ColumnNotFound { table_id, attnum })
    }

    pub fn column_name(&self, table_id: TableId, attnum: AttNum) -> Result<String> {
        self.column(table_id, attnum).map(|c| c.name)
    }

    /// Edges that can extend a join path out of `table_id`: its own foreign
    /// keys, then foreign keys of other tables that point at it.
    pub fn joinable_edges(&self, table_id: TableId) -> Result<Vec<JoinEdge>> {
        let table = self.reflect_table(table_id)?;
        let mut edges: Vec<JoinEdge> = table
            .foreign_keys
            .iter()
            .map(|fk| JoinEdge::new((table_id, fk.attnum), fk.referenced))
            .collect();

        for other_id in self.reflector.table_ids() {
            let other = self.reflect_table(other_id)?;
            for fk in other.foreign_keys.iter().filter(|fk| fk.referenced.table_id == table_id) {
                edges.push(JoinEdge::new(fk.referenced, (other_id, fk.attnum)));
            }
        }
        Ok(edges)
    }
}

impl std::fmt::Debug for Metadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<TableId> = self.tables.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        f.debug_struct("Metadata").field("tables", &ids).finish()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn column(attnum: AttNum, name: &str, data_type: &str) -> ColumnDescriptor {
        ColumnDescriptor {
            attnum,
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable: attnum != 1,
            primary_key: attnum == 1,
        }
    }

    /// `T`(10): id, name, city_id -> cities(20).id, country_id -> countries(30).id
    /// `cities`(20): id, country_id -> countries(30).id, ..., city_name at attnum 5
    /// `countries`(30): id, name
    pub fn catalog() -> StaticCatalog {
        StaticCatalog::new()
            .with_table(TableDescriptor {
                id: 10,
                schema: Some("app".to_string()),
                name: "T".to_string(),
                columns: vec![
                    column(1, "id", "int"),
                    column(2, "name", "varchar"),
                    column(3, "city_id", "int"),
                    column(4, "country_id", "int"),
                ],
                foreign_keys: vec![
                    ForeignKey { attnum: 3, referenced: ColumnRef::new(20, 1) },
                    ForeignKey { attnum: 4, referenced: ColumnRef::new(30, 1) },
                ],
            })
            .with_table(TableDescriptor {
                id: 20,
                schema: Some("app".to_string()),
                name: "cities".to_string(),
                columns: vec![
                    column(1, "id", "int"),
                    column(2, "country_id", "int"),
                    column(3, "population", "bigint"),
                    column(4, "founded", "date"),
                    column(5, "city_name", "varchar"),
                ],
                foreign_keys: vec![ForeignKey { attnum: 2, referenced: ColumnRef::new(30, 1) }],
            })
            .with_table(TableDescriptor {
                id: 30,
                schema: Some("app".to_string()),
                name: "countries".to_string(),
                columns: vec![column(1, "id", "int"), column(2, "name", "varchar")],
                foreign_keys: vec![],
            })
    }

    pub fn metadata() -> Metadata {
        Metadata::new(Arc::new(catalog()))
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn column_name_resolution_is_idempotent() {
        let catalog = Arc::new(catalog());
        let metadata = Metadata::new(catalog.clone());

        let first = metadata.column_name(10, 2).unwrap();
        let second = metadata.column_name(10, 2).unwrap();
        assert_eq!(first, "name");
        assert_eq!(first, second);
        assert_eq!(catalog.reflection_count(), 1);
    }

    #[test]
    fn fresh_handle_reflects_again() {
        let catalog = Arc::new(catalog());
        let metadata = Metadata::new(catalog.clone());
        metadata.reflect_table(10).unwrap();
        assert!(metadata.is_reflected(10));

        let fresh = metadata.fresh();
        assert!(!fresh.is_reflected(10));
        fresh.reflect_table(10).unwrap();
        assert_eq!(catalog.reflection_count(), 2);
    }

    #[test]
    fn clones_share_the_cache() {
        let metadata = metadata();
        let clone = metadata.clone();
        metadata.reflect_table(20).unwrap();
        assert!(clone.is_reflected(20));
    }

    #[test]
    fn missing_table_and_column_are_errors() {
        let metadata = metadata();
        assert!(matches!(
            metadata.reflect_table(99),
            Err(RelqError::TableNotFound { table_id: 99 })
        ));
        assert!(matches!(
            metadata.column_name(10, 42),
            Err(RelqError::ColumnNotFound { table_id: 10, attnum: 42 })
        ));
    }

    #[test]
    fn joinable_edges_cover_both_directions() {
        let metadata = metadata();

        let from_t = metadata.joinable_edges(10).unwrap();
        assert_eq!(
            from_t,
            vec![
                JoinEdge::new((10, 3), (20, 1)),
                JoinEdge::new((10, 4), (30, 1)),
            ]
        );

        let from_countries = metadata.joinable_edges(30).unwrap();
        assert!(from_countries.contains(&JoinEdge::new((30, 1), (10, 4))));
        assert!(from_countries.contains(&JoinEdge::new((30, 1), (20, 2))));
        assert_eq!(from_countries.len(), 2);
    }

    #[test]
    fn static_catalog_deserializes_from_table_list() {
        let catalog: StaticCatalog = serde_json::from_str(
            r#"[{"id": 7, "name": "things", "columns": [
                {"attnum": 1, "name": "id", "data_type": "int", "primary_key": true}
            ]}]"#,
        )
        .unwrap();
        let table = catalog.reflect_table(7).unwrap();
        assert_eq!(table.primary_key().count(), 1);
        assert_eq!(table.column_by_name("id").map(|c| c.attnum), Some(1));
    }
}

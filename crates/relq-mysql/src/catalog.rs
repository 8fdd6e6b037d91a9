//! Schema reflection from `information_schema`.
//!
//! InnoDB's `TABLE_ID` identifies a table and `ORDINAL_POSITION` a column
//! within it, so a `(table_id, attnum)` pair stays stable for as long as the
//! table is not rebuilt.
//!
//! Only tables `INNODB_TABLES` lists under their plain `schema/table` name
//! are reflected. Other engines, and names InnoDB stores encoded (e.g.
//! `my@002dtable` for `my-table`), have no id here; [`MySqlSchemaSnapshot::load`]
//! logs a warning for each such table.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use relq_core::{
    ColumnDescriptor, ColumnRef, ForeignKey, RelqError, Result, StaticCatalog, TableDescriptor,
    TableId, TableReflector,
};
use relq_shared::QueryMetrics;
use sqlx::{MySql, Pool, Row};
use tracing::{info, instrument, warn};

const COLUMNS_QUERY: &str = "\
SELECT CAST(t.TABLE_ID AS UNSIGNED) AS table_id, \
       CAST(c.TABLE_NAME AS CHAR) AS table_name, \
       CAST(c.COLUMN_NAME AS CHAR) AS column_name, \
       CAST(c.ORDINAL_POSITION AS UNSIGNED) AS attnum, \
       CAST(c.DATA_TYPE AS CHAR) AS data_type, \
       CAST(c.IS_NULLABLE AS CHAR) AS is_nullable, \
       CAST(c.COLUMN_KEY AS CHAR) AS column_key \
FROM information_schema.COLUMNS c \
JOIN information_schema.INNODB_TABLES t ON t.NAME = CONCAT(c.TABLE_SCHEMA, '/', c.TABLE_NAME) \
WHERE c.TABLE_SCHEMA = ? \
ORDER BY t.TABLE_ID, c.ORDINAL_POSITION";

const TABLES_QUERY: &str = "\
SELECT CAST(TABLE_NAME AS CHAR) AS table_name \
FROM information_schema.TABLES \
WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'";

const FOREIGN_KEYS_QUERY: &str = "\
SELECT CAST(k.TABLE_NAME AS CHAR) AS table_name, \
       CAST(k.COLUMN_NAME AS CHAR) AS column_name, \
       CAST(k.REFERENCED_TABLE_NAME AS CHAR) AS referenced_table, \
       CAST(k.REFERENCED_COLUMN_NAME AS CHAR) AS referenced_column \
FROM information_schema.KEY_COLUMN_USAGE k \
WHERE k.TABLE_SCHEMA = ? \
  AND k.REFERENCED_TABLE_SCHEMA = k.TABLE_SCHEMA \
  AND k.REFERENCED_TABLE_NAME IS NOT NULL";

/// One row of [`COLUMNS_QUERY`].
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRow {
    pub table_id: TableId,
    pub table_name: String,
    pub column_name: String,
    pub attnum: u32,
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

/// One row of [`FOREIGN_KEYS_QUERY`].
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyRow {
    pub table_name: String,
    pub column_name: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

/// Point-in-time copy of one schema's table definitions.
///
/// Loading is async and happens once; reflection afterwards is served from
/// memory. Reload after DDL, together with a fresh `Metadata` handle.
#[derive(Debug, Clone)]
pub struct MySqlSchemaSnapshot {
    schema: String,
    catalog: StaticCatalog,
}

impl MySqlSchemaSnapshot {
    #[instrument(skip(pool))]
    pub async fn load(pool: &Pool<MySql>, schema: &str) -> Result<Self> {
        let started = Instant::now();

        let columns = sqlx::query(COLUMNS_QUERY)
            .bind(schema)
            .fetch_all(pool)
            .await
            .map_err(|e| RelqError::Database(format!("Failed to read columns: {}", e)))?
            .iter()
            .map(|row| -> std::result::Result<ColumnRow, sqlx::Error> {
                Ok(ColumnRow {
                    table_id: row.try_get::<u64, _>("table_id")?,
                    table_name: row.try_get("table_name")?,
                    column_name: row.try_get("column_name")?,
                    attnum: u32::try_from(row.try_get::<u64, _>("attnum")?)
                        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
                    data_type: row.try_get("data_type")?,
                    nullable: row.try_get::<String, _>("is_nullable")? == "YES",
                    primary_key: row.try_get::<String, _>("column_key")? == "PRI",
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| RelqError::Database(format!("Failed to decode columns: {}", e)))?;

        let foreign_keys = sqlx::query(FOREIGN_KEYS_QUERY)
            .bind(schema)
            .fetch_all(pool)
            .await
            .map_err(|e| RelqError::Database(format!("Failed to read foreign keys: {}", e)))?
            .iter()
            .map(|row| -> std::result::Result<ForeignKeyRow, sqlx::Error> {
                Ok(ForeignKeyRow {
                    table_name: row.try_get("table_name")?,
                    column_name: row.try_get("column_name")?,
                    referenced_table: row.try_get("referenced_table")?,
                    referenced_column: row.try_get("referenced_column")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| RelqError::Database(format!("Failed to decode foreign keys: {}", e)))?;

        let base_tables = sqlx::query(TABLES_QUERY)
            .bind(schema)
            .fetch_all(pool)
            .await
            .map_err(|e| RelqError::Database(format!("Failed to read tables: {}", e)))?
            .iter()
            .map(|row| row.try_get::<String, _>("table_name"))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| RelqError::Database(format!("Failed to decode tables: {}", e)))?;

        let snapshot = Self::from_rows(schema, columns, foreign_keys);
        for table in snapshot.missing_tables(&base_tables) {
            warn!(
                schema,
                table = %table,
                "table has no InnoDB id and is left out of the snapshot"
            );
        }
        let tables = snapshot.catalog.table_ids().len();
        QueryMetrics::tables_reflected(tables, started.elapsed());
        info!(schema, tables, "schema snapshot loaded");
        Ok(snapshot)
    }

    /// Assemble table descriptors from raw `information_schema` rows.
    ///
    /// Foreign keys whose columns cannot be matched are skipped.
    pub fn from_rows(schema: &str, columns: Vec<ColumnRow>, foreign_keys: Vec<ForeignKeyRow>) -> Self {
        let mut tables: BTreeMap<TableId, TableDescriptor> = BTreeMap::new();
        for row in columns {
            tables
                .entry(row.table_id)
                .or_insert_with(|| TableDescriptor {
                    id: row.table_id,
                    schema: Some(schema.to_string()),
                    name: row.table_name.clone(),
                    columns: Vec::new(),
                    foreign_keys: Vec::new(),
                })
                .columns
                .push(ColumnDescriptor {
                    attnum: row.attnum,
                    name: row.column_name,
                    data_type: row.data_type,
                    nullable: row.nullable,
                    primary_key: row.primary_key,
                });
        }

        let by_name: HashMap<String, TableId> =
            tables.values().map(|t| (t.name.clone(), t.id)).collect();
        let locate = |tables: &BTreeMap<TableId, TableDescriptor>, table: &str, column: &str| {
            let id = *by_name.get(table)?;
            let attnum = tables.get(&id)?.column_by_name(column)?.attnum;
            Some(ColumnRef::new(id, attnum))
        };

        for fk in foreign_keys {
            let source = locate(&tables, &fk.table_name, &fk.column_name);
            let target = locate(&tables, &fk.referenced_table, &fk.referenced_column);
            match (source, target) {
                (Some(source), Some(referenced)) => {
                    if let Some(table) = tables.get_mut(&source.table_id) {
                        table.foreign_keys.push(ForeignKey {
                            attnum: source.attnum,
                            referenced,
                        });
                    }
                }
                _ => warn!(
                    table = %fk.table_name,
                    column = %fk.column_name,
                    "skipping unresolvable foreign key"
                ),
            }
        }

        Self {
            schema: schema.to_string(),
            catalog: StaticCatalog::from(tables.into_values().collect::<Vec<_>>()),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Names in `base_tables` the snapshot has no descriptor for.
    pub fn missing_tables<'a>(&self, base_tables: &'a [String]) -> Vec<&'a str> {
        base_tables
            .iter()
            .map(String::as_str)
            .filter(|name| self.table_id(name).is_none())
            .collect()
    }

    /// Id of the table called `name`, if the schema has one.
    pub fn table_id(&self, name: &str) -> Option<TableId> {
        self.catalog
            .table_ids()
            .into_iter()
            .find(|id| matches!(self.catalog.reflect_table(*id), Ok(t) if t.name == name))
    }
}

impl TableReflector for MySqlSchemaSnapshot {
    fn reflect_table(&self, table_id: TableId) -> Result<TableDescriptor> {
        self.catalog.reflect_table(table_id)
    }

    fn table_ids(&self) -> Vec<TableId> {
        self.catalog.table_ids()
    }
}

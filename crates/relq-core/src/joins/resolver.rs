use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, trace};

use super::helpers::{join_alias, same_table};
use crate::column::{ColumnRef, JoinEdge, TableId};
use crate::error::{RelqError, Result};
use crate::metadata::{Metadata, TableDescriptor};
use crate::sql::{ColumnPath, Condition, Join, JoinKind, Select, Source};

/// One appearance of a physical table in the FROM graph.
#[derive(Debug, Clone, PartialEq)]
pub struct TableInstance {
    pub table: Arc<TableDescriptor>,
    pub alias: Arc<str>,
}

impl TableInstance {
    pub fn source(&self) -> Source {
        Source::table(self.table.schema.as_deref(), &self.table.name, &self.alias)
    }

    /// `alias.column` for the column at `attnum`, checked against this table.
    fn column_path(&self, metadata: &Metadata, col: ColumnRef) -> Result<ColumnPath> {
        let name = metadata.column_name(col.table_id, col.attnum)?;
        if self.table.column_by_name(&name).is_none() {
            return Err(RelqError::ColumnNameNotFound {
                relation: self.alias.to_string(),
                column: name,
            });
        }
        Ok(ColumnPath::qualified(&self.alias, &name))
    }
}

/// Builds the join graph reachable from a base table.
///
/// Every join-path prefix resolves to exactly one table instance for the
/// lifetime of the resolver, so columns sharing a prefix share its joins.
pub struct JoinPathResolver<'m> {
    metadata: &'m Metadata,
    base: TableInstance,
    instances: HashMap<Vec<JoinEdge>, TableInstance>,
    seen_joins: HashSet<(ColumnPath, ColumnPath)>,
    used_aliases: HashSet<Arc<str>>,
    joins: Vec<Join>,
}

impl<'m> JoinPathResolver<'m> {
    pub fn new(metadata: &'m Metadata, base_table_id: TableId) -> Result<Self> {
        let table = metadata.reflect_table(base_table_id)?;
        let base = TableInstance {
            alias: Arc::from(table.name.as_str()),
            table,
        };
        let mut instances = HashMap::new();
        instances.insert(Vec::new(), base.clone());
        Ok(Self {
            metadata,
            used_aliases: HashSet::from([Arc::clone(&base.alias)]),
            base,
            instances,
            seen_joins: HashSet::new(),
            joins: Vec::new(),
        })
    }

    pub fn base(&self) -> &TableInstance {
        &self.base
    }

    /// Joins emitted so far, in emission order.
    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    /// Walk `path` edge by edge and return the instance its last edge reaches
    /// (the base table for an empty path), joining whatever is missing.
    pub fn resolve(&mut self, path: &[JoinEdge]) -> Result<TableInstance> {
        let mut right = self.base.clone();

        for (i, edge) in path.iter().copied().enumerate() {
            let left = self.instances.get(&path[..i]).cloned().ok_or_else(|| {
                RelqError::Internal(format!(
                    "join path prefix of length {i} resolved before its parent"
                ))
            })?;

            let prefix = path[..=i].to_vec();
            right = match self.instances.get(&prefix) {
                Some(existing) => existing.clone(),
                None => {
                    let instance = self.new_instance(edge.target_table())?;
                    trace!(alias = %instance.alias, edge = %edge, "new table instance");
                    self.instances.insert(prefix, instance.clone());
                    instance
                }
            };

            if !same_table(&left, edge.source) || !same_table(&right, edge.target) {
                return Err(RelqError::InvalidInitialColumn(format!(
                    "join edge {edge} does not connect `{}` to `{}`",
                    left.alias, right.alias
                )));
            }

            let left_col = left.column_path(self.metadata, edge.source)?;
            let right_col = right.column_path(self.metadata, edge.target)?;
            let key = (left_col.clone(), right_col.clone());
            if self.seen_joins.contains(&key) {
                debug!(left = %left_col, right = %right_col, "join already emitted");
                continue;
            }
            debug!(left = %left_col, right = %right_col, "emitting outer join");
            self.seen_joins.insert(key);
            self.joins.push(Join {
                kind: JoinKind::LeftOuter,
                table: right.source(),
                on: vec![Condition::columns_eq(left_col, right_col)],
            });
        }

        Ok(right)
    }

    /// `SELECT * FROM base LEFT OUTER JOIN ...` with everything resolved so far.
    pub fn into_select(self) -> Select {
        self.joins
            .into_iter()
            .fold(Select::new(self.base.source()), |select, join| {
                select.with_join(join)
            })
    }

    fn new_instance(&mut self, table_id: TableId) -> Result<TableInstance> {
        let table = self.metadata.reflect_table(table_id)?;
        let mut n = self.used_aliases.len();
        let alias: Arc<str> = loop {
            let candidate = join_alias(&table.name, n);
            if !self.used_aliases.contains(candidate.as_str()) {
                break Arc::from(candidate);
            }
            n += 1;
        };
        self.used_aliases.insert(Arc::clone(&alias));
        Ok(TableInstance { table, alias })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::fixtures::metadata;

    fn city_edge() -> JoinEdge {
        JoinEdge::new((10, 3), (20, 1))
    }

    fn country_via_city() -> JoinEdge {
        JoinEdge::new((20, 2), (30, 1))
    }

    #[test]
    fn empty_path_is_the_base_table() -> Result<()> {
        let metadata = metadata();
        let mut resolver = JoinPathResolver::new(&metadata, 10)?;
        let instance = resolver.resolve(&[])?;
        assert_eq!(&*instance.alias, "T");
        assert!(resolver.joins().is_empty());
        Ok(())
    }

    #[test]
    fn shared_prefix_reuses_instance_and_join() -> Result<()> {
        let metadata = metadata();
        let mut resolver = JoinPathResolver::new(&metadata, 10)?;

        let a = resolver.resolve(&[city_edge()])?;
        let b = resolver.resolve(&[city_edge()])?;
        assert_eq!(a, b);
        assert_eq!(resolver.joins().len(), 1);

        // longer path through the same prefix adds exactly one join
        let c = resolver.resolve(&[city_edge(), country_via_city()])?;
        assert_eq!(c.table.name, "countries");
        assert_eq!(resolver.joins().len(), 2);
        Ok(())
    }

    #[test]
    fn distinct_paths_to_the_same_table_get_distinct_aliases() -> Result<()> {
        let metadata = metadata();
        let mut resolver = JoinPathResolver::new(&metadata, 10)?;

        let direct = resolver.resolve(&[JoinEdge::new((10, 4), (30, 1))])?;
        let via_city = resolver.resolve(&[city_edge(), country_via_city()])?;
        assert_eq!(direct.table.id, via_city.table.id);
        assert_ne!(direct.alias, via_city.alias);
        assert_eq!(resolver.joins().len(), 3);
        Ok(())
    }

    #[test]
    fn renders_left_outer_joins() -> Result<()> {
        let metadata = metadata();
        let mut resolver = JoinPathResolver::new(&metadata, 10)?;
        resolver.resolve(&[city_edge()])?;
        assert_eq!(
            resolver.into_select().to_string(),
            "SELECT * FROM `app`.`T` AS `T` \
             LEFT OUTER JOIN `app`.`cities` AS `cities_1` ON `T`.`city_id` = `cities_1`.`id`"
        );
        Ok(())
    }

    #[test]
    fn disconnected_edge_is_rejected() -> Result<()> {
        let metadata = metadata();
        let mut resolver = JoinPathResolver::new(&metadata, 10)?;
        // starts from `cities` although the path starts at the base table
        let res = resolver.resolve(&[country_via_city()]);
        assert!(matches!(res, Err(RelqError::InvalidInitialColumn(_))));
        Ok(())
    }

    #[test]
    fn unknown_target_table_propagates_reflection_error() -> Result<()> {
        let metadata = metadata();
        let mut resolver = JoinPathResolver::new(&metadata, 10)?;
        let res = resolver.resolve(&[JoinEdge::new((10, 3), (99, 1))]);
        assert!(matches!(res, Err(RelqError::TableNotFound { table_id: 99 })));
        Ok(())
    }
}

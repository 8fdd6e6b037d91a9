use tracing::{debug, instrument};

use super::resolver::JoinPathResolver;
use crate::column::{InitialColumn, TableId};
use crate::error::{RelqError, Result};
use crate::metadata::Metadata;
use crate::sql::{Relation, RelationColumn, SelectExt, Selector};

/// Build the zero-transformation relation of a query: the base table joined
/// along every initial column's path, projecting each physical column under
/// its alias, wrapped as sub-relation `{name}_0`.
#[instrument(skip(initial_columns, metadata), fields(columns = initial_columns.len()))]
pub fn build_initial_relation(
    base_table_id: TableId,
    initial_columns: &[InitialColumn],
    metadata: &Metadata,
    name: &str,
) -> Result<Relation> {
    let mut resolver = JoinPathResolver::new(metadata, base_table_id)?;
    let mut selectors = Vec::with_capacity(initial_columns.len());
    let mut columns = Vec::with_capacity(initial_columns.len());

    for col in initial_columns {
        let instance = resolver.resolve(col.join_path())?;
        if instance.table.id != col.table_id() {
            return Err(RelqError::InvalidInitialColumn(format!(
                "`{}` refers to table {} but its join path ends at `{}` ({})",
                col.alias(),
                col.table_id(),
                instance.alias,
                instance.table.id
            )));
        }
        let physical = metadata.column(col.table_id(), col.attnum())?;

        selectors.push(
            Selector::new(&physical.name)
                .set_source(&instance.alias)
                .set_alias(col.alias()),
        );
        columns.push(RelationColumn {
            name: col.alias().to_string(),
            data_type: physical.data_type,
            // outer joins can always miss
            nullable: physical.nullable || !col.is_base_column(),
        });
    }

    debug!(joins = resolver.joins().len(), "initial relation resolved");
    let select = resolver.into_select().select(selectors);
    Ok(Relation::new(name, select, columns))
}

use crate::column::ColumnRef;

use super::resolver::TableInstance;

/// Alias of the `n`th joined instance of `table`.
pub fn join_alias(table: &str, n: usize) -> String {
    format!("{table}_{n}")
}

pub fn same_table(instance: &TableInstance, col: ColumnRef) -> bool {
    instance.table.id == col.table_id
}

//! Statements an executor runs against a relation.

use serde_json::Value;

use super::condition::Condition;
use super::relation::Relation;
use super::select::{Select, SelectExt, Source};
use super::selector::{AggregateFunction, ColumnPath, Selector};
use crate::error::Result;

/// Output column name of [`count_statement`].
pub const COUNT_COLUMN: &str = "count";

/// Temporary refinements applied on top of a relation when fetching.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordOptions {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// `(alias, ascending)`; empty means the default ordering.
    pub order_by: Vec<(String, bool)>,
    /// Conditions over relation aliases, combined with AND.
    pub filters: Vec<Condition>,
}

impl RecordOptions {
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_order(mut self, alias: impl Into<String>, ascending: bool) -> Self {
        self.order_by.push((alias.into(), ascending));
        self
    }

    pub fn with_filter(mut self, condition: Condition) -> Self {
        self.filters.push(condition);
        self
    }
}

/// Rendered SQL plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub binds: Vec<Value>,
}

fn filtered(relation: &Relation, select: Select, options: &RecordOptions) -> Result<Select> {
    let name = relation.name();
    for c in &options.filters {
        relation.require_column(c.left().column())?;
    }
    Ok(select.filter(options.filters.iter().map(|c| c.requalify(name))))
}

/// Rows of `relation`. Without an explicit ordering rows follow the
/// relation's own ordering, then every remaining output column ascending in
/// output order, so paging is stable.
pub fn records_statement(relation: &Relation, options: &RecordOptions) -> Result<Statement> {
    let name = relation.name();
    let mut select = filtered(relation, relation.scan()?, options)?;

    if options.order_by.is_empty() {
        let ordering = relation.ordering();
        for (col, asc) in ordering {
            select = select.order_by(ColumnPath::qualified(name, col), *asc);
        }
        for col in relation.columns() {
            if !ordering.iter().any(|(o, _)| o == &col.name) {
                select = select.order_by(ColumnPath::qualified(name, &col.name), true);
            }
        }
    } else {
        for (alias, asc) in &options.order_by {
            relation.require_column(alias)?;
            select = select.order_by(ColumnPath::qualified(name, alias), *asc);
        }
    }

    if let Some(limit) = options.limit {
        select = select.limit(limit);
    }
    if let Some(offset) = options.offset {
        select = select.offset(offset);
    }

    let (sql, binds) = relation.render(&select)?;
    Ok(Statement { sql, binds })
}

/// Number of rows of `relation` matching the options' filters; paging and
/// ordering are ignored.
pub fn count_statement(relation: &Relation, options: &RecordOptions) -> Result<Statement> {
    let select = Select::new(Source::relation(relation.name())).select([Selector::new("*")
        .set_aggregate(AggregateFunction::Count)
        .set_alias(COUNT_COLUMN)]);
    let select = filtered(relation, select, options)?;
    let (sql, binds) = relation.render(&select)?;
    Ok(Statement { sql, binds })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelqError;
    use crate::sql::relation::RelationColumn;
    use serde_json::json;

    fn relation() -> Relation {
        let select = Select::new(Source::table(None, "T", "T"))
            .select([
                Selector::new("id").set_source("T").set_alias("id_out"),
                Selector::new("name").set_source("T").set_alias("name_out"),
            ]);
        let cols = ["id_out", "name_out"]
            .iter()
            .map(|n| RelationColumn {
                name: n.to_string(),
                data_type: "int".into(),
                nullable: true,
            })
            .collect();
        Relation::new("q", select, cols)
    }

    #[test]
    fn default_order_uses_all_columns() -> Result<()> {
        let stmt = records_statement(&relation(), &RecordOptions::default())?;
        assert!(stmt
            .sql
            .ends_with("FROM `q_0` ORDER BY `q_0`.`id_out` ASC, `q_0`.`name_out` ASC"));
        assert!(stmt.binds.is_empty());
        Ok(())
    }

    #[test]
    fn default_order_starts_with_relation_ordering() -> Result<()> {
        let rel = relation().with_ordering(vec![("name_out".to_string(), false)]);
        let stmt = records_statement(&rel, &RecordOptions::default())?;
        assert!(stmt
            .sql
            .ends_with("ORDER BY `q_0`.`name_out` DESC, `q_0`.`id_out` ASC"));
        Ok(())
    }

    #[test]
    fn explicit_order_filters_and_paging() -> Result<()> {
        let options = RecordOptions::default()
            .with_order("name_out", false)
            .with_filter(Condition::compare(ColumnPath::new("name_out"), "like", json!("a%"))?)
            .with_limit(10)
            .with_offset(5);
        let stmt = records_statement(&relation(), &options)?;
        assert!(stmt.sql.ends_with(
            "FROM `q_0` WHERE `q_0`.`name_out` LIKE ? ORDER BY `q_0`.`name_out` DESC LIMIT ? OFFSET ?"
        ));
        assert_eq!(stmt.binds, vec![json!("a%"), json!(10), json!(5)]);
        Ok(())
    }

    #[test]
    fn unknown_aliases_are_rejected() {
        let options = RecordOptions::default().with_order("missing", true);
        assert!(matches!(
            records_statement(&relation(), &options),
            Err(RelqError::ColumnNameNotFound { .. })
        ));
    }

    #[test]
    fn count_ignores_paging() -> Result<()> {
        let options = RecordOptions::default().with_limit(1);
        let stmt = count_statement(&relation(), &options)?;
        assert!(stmt.sql.ends_with("SELECT COUNT(*) AS `count` FROM `q_0`"));
        assert!(stmt.binds.is_empty());
        Ok(())
    }
}

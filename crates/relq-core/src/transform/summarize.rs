use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::{Transform, UniqueConstraintMapping};
use crate::error::{RelqError, Result};
use crate::sql::{
    AggregateFunction, ColumnPath, Relation, RelationColumn, Select, SelectExt, Selector, Source,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grouping {
    pub input_alias: String,
    pub output_alias: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregation {
    pub input_alias: String,
    pub output_alias: String,
    pub function: AggregateFunction,
}

/// Groups rows by the grouping aliases and aggregates the rest.
///
/// Grouping outputs keep a one-to-one link to their input alias; aggregate
/// outputs have none.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Summarize {
    pub grouping: Vec<Grouping>,
    #[serde(default)]
    pub aggregations: Vec<Aggregation>,
}

impl Summarize {
    pub fn group(mut self, input_alias: &str, output_alias: &str) -> Self {
        self.grouping.push(Grouping {
            input_alias: input_alias.to_string(),
            output_alias: output_alias.to_string(),
        });
        self
    }

    pub fn aggregate(
        mut self,
        input_alias: &str,
        output_alias: &str,
        function: AggregateFunction,
    ) -> Self {
        self.aggregations.push(Aggregation {
            input_alias: input_alias.to_string(),
            output_alias: output_alias.to_string(),
            function,
        });
        self
    }

    fn validate(&self) -> Result<()> {
        if self.grouping.is_empty() {
            return Err(RelqError::InvalidTransformation(
                "summarize needs at least one grouping column".into(),
            ));
        }
        let mut seen = HashSet::new();
        let outputs = self
            .grouping
            .iter()
            .map(|g| &g.output_alias)
            .chain(self.aggregations.iter().map(|a| &a.output_alias));
        for out in outputs {
            if !seen.insert(out) {
                return Err(RelqError::InvalidTransformation(format!(
                    "summarize output alias `{out}` is used twice"
                )));
            }
        }
        Ok(())
    }
}

impl Transform for Summarize {
    fn apply(&self, relation: &Relation) -> Result<Relation> {
        self.validate()?;
        let name = relation.name();
        let mut selectors = Vec::with_capacity(self.grouping.len() + self.aggregations.len());
        let mut columns = Vec::with_capacity(selectors.capacity());

        for g in &self.grouping {
            let input = relation.require_column(&g.input_alias)?;
            selectors.push(
                Selector::new(&g.input_alias)
                    .set_source(name)
                    .set_alias(&g.output_alias),
            );
            columns.push(input.renamed(&g.output_alias));
        }
        for a in &self.aggregations {
            let input = relation.require_column(&a.input_alias)?;
            selectors.push(
                Selector::new(&a.input_alias)
                    .set_source(name)
                    .set_alias(&a.output_alias)
                    .set_aggregate(a.function),
            );
            columns.push(RelationColumn {
                name: a.output_alias.clone(),
                data_type: a.function.result_type(&input.data_type),
                nullable: a.function.result_nullable(input.nullable),
            });
        }

        let select = Select::new(Source::relation(name))
            .select(selectors)
            .group_by(
                self.grouping
                    .iter()
                    .map(|g| ColumnPath::qualified(name, &g.input_alias)),
            );
        // Input ordering names input aliases; it means nothing after grouping.
        Ok(relation.derive(select, columns).with_ordering(Vec::new()))
    }

    fn output_aliases(&self, _input_aliases: &[String]) -> Vec<String> {
        self.grouping
            .iter()
            .map(|g| g.output_alias.clone())
            .chain(self.aggregations.iter().map(|a| a.output_alias.clone()))
            .collect()
    }

    fn unique_constraint_mappings(&self, _input_aliases: &[String]) -> Vec<UniqueConstraintMapping> {
        self.grouping
            .iter()
            .map(|g| UniqueConstraintMapping::derived(&g.output_alias, &g.input_alias))
            .chain(
                self.aggregations
                    .iter()
                    .map(|a| UniqueConstraintMapping::unbacked(&a.output_alias)),
            )
            .collect()
    }

    fn output_to_input_alias_map(&self) -> HashMap<String, String> {
        self.grouping
            .iter()
            .map(|g| (g.output_alias.clone(), g.input_alias.clone()))
            .chain(
                self.aggregations
                    .iter()
                    .map(|a| (a.output_alias.clone(), a.input_alias.clone())),
            )
            .collect()
    }
}

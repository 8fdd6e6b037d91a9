use serde::{Deserialize, Serialize};

use super::{Transform, UniqueConstraintMapping};
use crate::error::{RelqError, Result};
use crate::sql::{Relation, Select, SelectExt, Selector, Source};

/// Drops aliases from the output; the remaining ones keep their order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HideColumns {
    pub aliases: Vec<String>,
}

impl HideColumns {
    pub fn new<I, S>(aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            aliases: aliases.into_iter().map(Into::into).collect(),
        }
    }

    fn hides(&self, alias: &str) -> bool {
        self.aliases.iter().any(|a| a == alias)
    }
}

impl Transform for HideColumns {
    fn apply(&self, relation: &Relation) -> Result<Relation> {
        for alias in &self.aliases {
            relation.require_column(alias)?;
        }
        let kept: Vec<_> = relation
            .columns()
            .iter()
            .filter(|c| !self.hides(&c.name))
            .cloned()
            .collect();
        if kept.is_empty() {
            return Err(RelqError::InvalidTransformation(
                "cannot hide every column of a relation".into(),
            ));
        }

        let name = relation.name();
        let select = Select::new(Source::relation(name))
            .select(kept.iter().map(|c| Selector::new(&c.name).set_source(name)));
        Ok(relation.derive(select, kept))
    }

    fn output_aliases(&self, input_aliases: &[String]) -> Vec<String> {
        input_aliases
            .iter()
            .filter(|a| !self.hides(a))
            .cloned()
            .collect()
    }

    fn unique_constraint_mappings(&self, input_aliases: &[String]) -> Vec<UniqueConstraintMapping> {
        self.output_aliases(input_aliases)
            .iter()
            .map(|a| UniqueConstraintMapping::identity(a))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::fixtures::relation;

    #[test]
    fn projects_remaining_columns() -> Result<()> {
        let rel = HideColumns::new(["name_out", "population"]).apply(&relation())?;
        assert_eq!(rel.column_names(), vec!["id_out", "city_out"]);
        assert_eq!(
            rel.head().unwrap().to_string(),
            "SELECT `q_0`.`id_out`, `q_0`.`city_out` FROM `q_0`"
        );
        Ok(())
    }

    #[test]
    fn hidden_aliases_leave_the_alias_set() {
        let step = HideColumns::new(["b"]);
        let input = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(step.output_aliases(&input), vec!["a", "c"]);
        let mapped: Vec<_> = step
            .unique_constraint_mappings(&input)
            .into_iter()
            .map(|m| m.output_alias)
            .collect();
        assert_eq!(mapped, vec!["a", "c"]);
    }

    #[test]
    fn hiding_everything_or_unknown_fails() {
        let all = HideColumns::new(relation().column_names());
        assert!(matches!(
            all.apply(&relation()),
            Err(RelqError::InvalidTransformation(_))
        ));
        assert!(matches!(
            HideColumns::new(["ghost"]).apply(&relation()),
            Err(RelqError::ColumnNameNotFound { .. })
        ));
    }
}

//! Transformation steps applied on top of a query's initial relation.
//!
//! Every step reads the previous step's relation by name and produces a new
//! head sub-relation. Besides the SQL, a step declares how its output aliases
//! relate to its input aliases, which is what provenance tracing walks.

mod chain;
mod filter;
mod hide;
mod order;
mod paging;
mod summarize;

use std::collections::HashMap;
use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::sql::Relation;

pub use chain::TransformChain;
pub use filter::{Filter, FilterCondition};
pub use hide::HideColumns;
pub use order::{Order, SortKey};
pub use paging::{Limit, Offset};
pub use summarize::{Aggregation, Grouping, Summarize};

/// Which input alias an output alias corresponds to one-to-one, if any.
///
/// `input_alias == None` means the output is not tied to a single source row
/// (aggregates), so it has no provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueConstraintMapping {
    pub output_alias: String,
    pub input_alias: Option<String>,
}

impl UniqueConstraintMapping {
    pub fn identity(alias: &str) -> Self {
        Self {
            output_alias: alias.to_string(),
            input_alias: Some(alias.to_string()),
        }
    }

    pub fn derived(output_alias: &str, input_alias: &str) -> Self {
        Self {
            output_alias: output_alias.to_string(),
            input_alias: Some(input_alias.to_string()),
        }
    }

    pub fn unbacked(output_alias: &str) -> Self {
        Self {
            output_alias: output_alias.to_string(),
            input_alias: None,
        }
    }
}

/// A relational operator in a transformation chain.
///
/// Only [`Transform::apply`] touches SQL; the alias methods must be answerable
/// from the input aliases alone, without building anything.
pub trait Transform: Debug + Send + Sync {
    fn apply(&self, relation: &Relation) -> Result<Relation>;

    fn output_aliases(&self, input_aliases: &[String]) -> Vec<String> {
        input_aliases.to_vec()
    }

    fn unique_constraint_mappings(&self, input_aliases: &[String]) -> Vec<UniqueConstraintMapping> {
        input_aliases
            .iter()
            .map(|a| UniqueConstraintMapping::identity(a))
            .collect()
    }

    /// Output alias -> input alias for every alias this step renames or derives.
    fn output_to_input_alias_map(&self) -> HashMap<String, String> {
        HashMap::new()
    }
}

/// The built-in steps, as they appear in serialized query definitions:
/// `{"type": "limit", "spec": {"count": 10}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "spec", rename_all = "snake_case")]
pub enum Transformation {
    Filter(Filter),
    Order(Order),
    Limit(Limit),
    Offset(Offset),
    HideColumns(HideColumns),
    Summarize(Summarize),
}

impl Transformation {
    fn step(&self) -> &dyn Transform {
        match self {
            Transformation::Filter(t) => t,
            Transformation::Order(t) => t,
            Transformation::Limit(t) => t,
            Transformation::Offset(t) => t,
            Transformation::HideColumns(t) => t,
            Transformation::Summarize(t) => t,
        }
    }
}

impl Transform for Transformation {
    fn apply(&self, relation: &Relation) -> Result<Relation> {
        self.step().apply(relation)
    }

    fn output_aliases(&self, input_aliases: &[String]) -> Vec<String> {
        self.step().output_aliases(input_aliases)
    }

    fn unique_constraint_mappings(&self, input_aliases: &[String]) -> Vec<UniqueConstraintMapping> {
        self.step().unique_constraint_mappings(input_aliases)
    }

    fn output_to_input_alias_map(&self) -> HashMap<String, String> {
        self.step().output_to_input_alias_map()
    }
}

macro_rules! impl_from_step {
    ($($variant:ident),*) => {
        $(impl From<$variant> for Transformation {
            fn from(step: $variant) -> Self {
                Transformation::$variant(step)
            }
        })*
    };
}

impl_from_step!(Filter, Order, Limit, Offset, HideColumns, Summarize);

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::sql::{Relation, RelationColumn, Select, SelectExt, Selector, Source};

    /// `q_0` with `id_out`, `name_out`, `city_out`, `population` over `T`.
    pub fn relation() -> Relation {
        let select = Select::new(Source::table(None, "T", "T"))
            .select(
                [
                    ("id", "id_out"),
                    ("name", "name_out"),
                    ("city", "city_out"),
                    ("population", "population"),
                ]
                .iter()
                .map(|(column, alias)| Selector::new(column).set_source("T").set_alias(alias)),
            );
        let cols = [
            ("id_out", "int", false),
            ("name_out", "varchar", true),
            ("city_out", "varchar", true),
            ("population", "int", true),
        ]
        .iter()
        .map(|(name, ty, nullable)| RelationColumn {
            name: name.to_string(),
            data_type: ty.to_string(),
            nullable: *nullable,
        })
        .collect();
        Relation::new("q", select, cols)
    }

    pub fn aliases(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }
}

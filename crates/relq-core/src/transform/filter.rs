use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Transform;
use crate::error::{RelqError, Result};
use crate::sql::{ColumnPath, Condition, Relation, SelectExt};

fn default_op() -> String {
    "=".to_string()
}

/// `alias <op> value`; a `null` value with `=`/`!=` becomes `IS [NOT] NULL`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub alias: String,
    #[serde(default = "default_op")]
    pub op: String,
    #[serde(default)]
    pub value: Value,
}

impl FilterCondition {
    pub fn new(alias: &str, op: &str, value: impl Into<Value>) -> Self {
        Self {
            alias: alias.to_string(),
            op: op.to_string(),
            value: value.into(),
        }
    }
}

/// Keeps the rows matching every condition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Filter {
    pub conditions: Vec<FilterCondition>,
}

impl Filter {
    pub fn new(conditions: Vec<FilterCondition>) -> Self {
        Self { conditions }
    }

    pub fn with(mut self, alias: &str, op: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(FilterCondition::new(alias, op, value));
        self
    }
}

impl Transform for Filter {
    fn apply(&self, relation: &Relation) -> Result<Relation> {
        if self.conditions.is_empty() {
            return Err(RelqError::InvalidTransformation(
                "filter needs at least one condition".into(),
            ));
        }
        let name = relation.name();
        let conditions = self
            .conditions
            .iter()
            .map(|c| {
                relation.require_column(&c.alias)?;
                Condition::compare(ColumnPath::qualified(name, &c.alias), &c.op, c.value.clone())
            })
            .collect::<Result<Vec<_>>>()?;

        let select = relation.scan()?.filter(conditions);
        Ok(relation.derive(select, relation.columns().to_vec()))
    }
}

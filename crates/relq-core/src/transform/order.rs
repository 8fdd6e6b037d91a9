use serde::{Deserialize, Serialize};

use super::Transform;
use crate::error::{RelqError, Result};
use crate::sql::{ColumnPath, Relation, SelectExt};

fn ascending() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub alias: String,
    #[serde(default = "ascending")]
    pub ascending: bool,
}

/// Sorts rows. The order is carried by the relation so later limit/offset
/// steps and record fetching page over it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Order {
    pub keys: Vec<SortKey>,
}

impl Order {
    pub fn by(mut self, alias: &str, ascending: bool) -> Self {
        self.keys.push(SortKey {
            alias: alias.to_string(),
            ascending,
        });
        self
    }
}

impl Transform for Order {
    fn apply(&self, relation: &Relation) -> Result<Relation> {
        if self.keys.is_empty() {
            return Err(RelqError::InvalidTransformation(
                "order needs at least one sort key".into(),
            ));
        }
        let name = relation.name();
        let mut select = relation.scan()?;
        for key in &self.keys {
            relation.require_column(&key.alias)?;
            select = select.order_by(ColumnPath::qualified(name, &key.alias), key.ascending);
        }
        let ordering = self
            .keys
            .iter()
            .map(|k| (k.alias.clone(), k.ascending))
            .collect();
        Ok(relation
            .derive(select, relation.columns().to_vec())
            .with_ordering(ordering))
    }
}

use serde::{Deserialize, Serialize};

use super::Transform;
use crate::error::Result;
use crate::sql::{Relation, SelectExt};

/// Keeps the first `count` rows of the current ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limit {
    pub count: u64,
}

/// Skips the first `count` rows of the current ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offset {
    pub count: u64,
}

impl Transform for Limit {
    fn apply(&self, relation: &Relation) -> Result<Relation> {
        let select = relation.scan_ordered()?.limit(self.count);
        Ok(relation.derive(select, relation.columns().to_vec()))
    }
}

impl Transform for Offset {
    fn apply(&self, relation: &Relation) -> Result<Relation> {
        let select = relation.scan_ordered()?.offset(self.count);
        Ok(relation.derive(select, relation.columns().to_vec()))
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{instrument, trace};

use super::{Transform, UniqueConstraintMapping};
use crate::error::{RelqError, Result};
use crate::sql::Relation;

/// Ordered transformation steps.
///
/// Steps are referred to by index: "step `n`" is the state after the first
/// `n` steps have been applied, so step 0 is the initial relation. Indexes
/// past the end are clamped to the chain length.
#[derive(Debug, Clone, Default)]
pub struct TransformChain {
    steps: Vec<Arc<dyn Transform>>,
}

impl TransformChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_step(mut self, step: Arc<dyn Transform>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(&self) -> &[Arc<dyn Transform>] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The first `n` steps.
    pub fn prefix(&self, n: usize) -> Self {
        Self {
            steps: self.steps.iter().take(n).cloned().collect(),
        }
    }

    /// Fold every step over `relation`, in order.
    #[instrument(skip_all, fields(steps = self.steps.len()))]
    pub fn apply_all(&self, relation: Relation) -> Result<Relation> {
        self.steps
            .iter()
            .enumerate()
            .try_fold(relation, |rel, (step, t)| {
                t.apply(&rel).map_err(|e| match e {
                    RelqError::ColumnNameNotFound { column, .. } => {
                        RelqError::UnknownAlias { alias: column, step }
                    }
                    other => other,
                })
            })
    }

    /// Aliases visible to step `step`, derived from the steps' declared
    /// outputs without building anything.
    pub fn input_aliases_before(&self, initial: &[String], step: usize) -> Vec<String> {
        self.steps
            .iter()
            .take(step)
            .fold(initial.to_vec(), |aliases, t| t.output_aliases(&aliases))
    }

    /// Walk `alias`, as seen after `step` steps, back to the initial alias it
    /// uniquely derives from. `None` as soon as a step declares the alias has
    /// no unique source.
    pub fn trace_alias(&self, initial: &[String], step: usize, alias: &str) -> Option<String> {
        let mut aliases = initial.to_vec();
        let mut mappings: Vec<Vec<UniqueConstraintMapping>> = Vec::new();
        for t in self.steps.iter().take(step) {
            mappings.push(t.unique_constraint_mappings(&aliases));
            aliases = t.output_aliases(&aliases);
        }

        let mut current = alias.to_string();
        for (ix, step_mappings) in mappings.iter().enumerate().rev() {
            // Aliases a step does not mention pass through it untouched.
            let Some(mapping) = step_mappings.iter().find(|m| m.output_alias == current) else {
                continue;
            };
            match &mapping.input_alias {
                Some(input) => {
                    trace!(step = ix, from = %current, to = %input, "alias hop");
                    current = input.clone();
                }
                None => {
                    trace!(step = ix, alias = %current, "alias has no unique source");
                    return None;
                }
            }
        }
        Some(current)
    }

    /// Every step's output -> input map merged left to right; on collision
    /// the later step wins.
    pub fn output_to_input_alias_map(&self) -> HashMap<String, String> {
        self.steps.iter().fold(HashMap::new(), |mut acc, t| {
            acc.extend(t.output_to_input_alias_map());
            acc
        })
    }
}

impl FromIterator<Arc<dyn Transform>> for TransformChain {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Transform>>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}

//! Core of relq: composable relational queries over a reflected schema that
//! keep track of where every output column comes from.

pub mod column;
pub mod error;
pub mod executor;
pub mod joins;
pub mod metadata;
pub mod query;
pub mod sql;
pub mod transform;

pub use column::*;
pub use error::*;
pub use executor::*;
pub use joins::build_initial_relation;
pub use metadata::*;
pub use query::*;
pub use sql::{RecordOptions, Relation, RelationColumn};
pub use transform::{Transform, TransformChain, Transformation, UniqueConstraintMapping};

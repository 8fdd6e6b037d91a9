mod condition;
mod helpers;
mod records;
mod relation;
mod select;
mod selector;

pub use condition::{Condition, Operand};
pub use records::{count_statement, records_statement, RecordOptions, Statement, COUNT_COLUMN};
pub use relation::{Cte, Relation, RelationColumn};
pub use select::{Join, JoinKind, OrderTerm, Select, SelectExt, Source};
pub use selector::{AggregateFunction, ColumnPath, Selector};

mod builder;
mod helpers;
mod resolver;

pub use builder::build_initial_relation;
pub use resolver::{JoinPathResolver, TableInstance};

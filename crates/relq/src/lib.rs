//! `relq`: convenience façade that re-exports `relq-core` and the MySQL backend.

#![deny(missing_docs)]

/// Re-export **everything** from relq-core at the crate root, so users can `use relq::*;`.
#[doc(inline)]
pub use relq_core::*;

/// Also expose relq-core as a nested module if you like `relq::core::...` paths.
pub use relq_core as core;

/// MySQL schema reflection and record execution.
pub use relq_mysql as mysql;

/// Configuration, observability and retry helpers shared by the binaries.
pub use relq_shared as shared;

pub mod cli;

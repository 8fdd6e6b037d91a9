//! MySQL backend for relq: schema reflection, pooled connections and a
//! [`RecordExecutor`](relq_core::RecordExecutor) that runs built relations.

pub mod catalog;
pub mod connection;
pub mod decode;
pub mod executor;

pub use catalog::*;
pub use connection::*;
pub use decode::{decode_row, decode_value};
pub use executor::*;

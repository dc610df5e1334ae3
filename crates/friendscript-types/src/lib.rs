//! Pure data types for Friendscript: script values, scalar coercion, and the
//! command schema descriptors modules publish.
//!
//! This crate is a leaf dependency with no parser, no evaluator and no I/O, so
//! hosts that only exchange values with scripts don't pull in the kernel.

pub mod coerce;
pub mod schema;
pub mod value;

pub use coerce::{parse_duration, CoerceError};
pub use schema::{CommandSchema, ParamShape};
pub use value::{Object, Value};

//! Abstract syntax tree for Friendscript programs.
//!
//! The parser produces these nodes; the evaluator consumes them. Nodes carry
//! byte spans into [`Program::source`] so failures can quote the offending text.

mod types;

pub use types::*;

//! friendscript-kernel: the Friendscript engine.
//!
//! This crate provides:
//!
//! - **Lexer**: Tokenizes Friendscript source using logos
//! - **Parser**: Recursive descent from tokens to the AST
//! - **AST**: Blocks, statements, conditions, loops, commands, expressions
//! - **Interpreter**: Scopes, operators, flow-control signals and the
//!   [`Environment`] evaluator
//! - **Dispatch**: Binding script arguments onto typed host handlers
//! - **Modules**: The bundled `core`, `assert`, `parse`, `url` and `file` modules
//! - **I/O**: Pluggable path resolvers and timeout-bounded source reads
//!
//! ```no_run
//! use friendscript_kernel::Environment;
//!
//! let mut env = Environment::default();
//! let scope = env.evaluate_source("$x = 1 + 2", None).into_result()?;
//! assert_eq!(scope.get("x"), Some(friendscript_kernel::Value::Int(3)));
//! # Ok::<(), friendscript_kernel::EvalError>(())
//! ```

pub mod ast;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod interpreter;
pub mod io;
pub mod lexer;
pub mod modules;
pub mod parser;

pub use config::{ConfigError, EnvironmentConfig};
pub use dispatch::{CommandSet, DispatchError, Module, Options};
pub use error::EvalError;
pub use interpreter::{Completion, Context, ContextState, Environment, ObserverId, Scope};
pub use io::{PathIo, WriteMode};
pub use parser::{parse, ParseError};

// Value types, so hosts need only one dependency.
pub use friendscript_types::{CommandSchema, Object, ParamShape, Value};

//! Modules bundled with the kernel.
//!
//! Each is an ordinary [`CommandSet`](crate::dispatch::CommandSet): the
//! evaluator sees them only through the [`Module`](crate::dispatch::Module)
//! trait, exactly like host modules.

pub mod assert;
pub mod base;
pub mod file;
pub mod parse;
pub mod url;

use crate::interpreter::Environment;

/// Register every bundled module with `env`.
///
/// The core commands go under the empty prefix so scripts call them bare
/// (`put`, `log`); the rest keep their names as prefixes.
pub fn register_builtins(env: &mut Environment) {
    let scheme = env.config().default_url_scheme.clone();
    let path_io = env.path_io();

    env.register_module("", base::module());
    env.register_module("assert", assert::module());
    env.register_module("parse", parse::module());
    env.register_module("url", url::module(scheme));
    env.register_module("file", file::module(path_io));
}

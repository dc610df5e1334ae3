//! Errors surfaced by evaluation.

use std::time::Duration;

use thiserror::Error;

use crate::dispatch::DispatchError;
use crate::parser::ParseError;

/// Everything that can stop a program.
///
/// A failed evaluation still hands back the scope it reached, see
/// [`crate::Completion`].
#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("cannot locate module '{0}'")]
    ModuleNotFound(String),

    #[error("{command} failed at `{snippet}`: {source}")]
    Command {
        command: String,
        snippet: String,
        source: DispatchError,
    },

    #[error("invalid flow control statement")]
    InvalidFlowControl,

    #[error("the '{0}' directive is not implemented")]
    NotImplemented(&'static str),

    #[error("event handler '{0}' is not supported by this environment")]
    EventHandlersUnsupported(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    #[error("invalid regular expression: {0}")]
    Regex(#[from] regex::Error),

    #[error("invalid loop: {0}")]
    InvalidLoop(String),

    #[error("timed out after {0:?} reading script source")]
    ReadTimeout(Duration),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl EvalError {
    /// The dispatch error behind a failed command, if that is what this is.
    pub fn dispatch_error(&self) -> Option<&DispatchError> {
        match self {
            EvalError::Command { source, .. } => Some(source),
            _ => None,
        }
    }
}

//! Command dispatch: binding script arguments onto typed host handlers.
//!
//! Every command call reaches a handler with at most two inputs: the leading
//! positional value (`first`) and the keyword options object (`rest`). The
//! handler's Rust signature decides how those inputs are bound.
//!
//! ```text
//! module::name <first> {rest}
//!        │
//!        ▼
//! Module::lookup(name) ──▶ RegisteredCommand
//!                                │
//!                   FromArg per parameter (first, rest)
//!                                │
//!                          handler(a, b) ──▶ IntoCommandResult ──▶ Value
//! ```
//!
//! Handlers are plain functions or closures taking zero, one or two
//! [`FromArg`] parameters and returning `Result<T: Serialize, E>`.

use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::time::Duration;

use indexmap::IndexMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use friendscript_types::coerce::{self, CoerceError};
use friendscript_types::{CommandSchema, Object, ParamShape, Value};

/// Result of invoking a command handler.
pub type CommandResult = Result<Value, DispatchError>;

/// Why a command could not produce a value.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("cannot bind argument {position} of '{command}': {reason}")]
    Binding {
        command: String,
        position: usize,
        reason: BindingError,
    },

    #[error("'{command}' returned a value that cannot be represented: {reason}")]
    MalformedResult { command: String, reason: String },

    #[error(transparent)]
    Failed(anyhow::Error),
}

/// An input could not be bound to a parameter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindingError {
    #[error("a mapping cannot populate a {0} parameter")]
    UnexpectedMap(ParamShape),

    #[error(transparent)]
    Coerce(#[from] CoerceError),

    #[error("cannot populate {record}: {reason}")]
    Record { record: &'static str, reason: String },
}

/// A type a handler parameter may be declared as.
pub trait FromArg: Sized {
    /// Shape published in the command's schema.
    fn shape() -> ParamShape;

    /// Bind an input. `None` means the call supplied nothing for this
    /// position and should produce the zero value.
    fn from_arg(input: Option<Value>) -> Result<Self, BindingError>;
}

fn scalar<T>(
    input: Option<Value>,
    zero: T,
    shape: ParamShape,
    convert: impl FnOnce(&Value) -> Result<T, CoerceError>,
) -> Result<T, BindingError> {
    match input {
        None | Some(Value::Null) => Ok(zero),
        Some(Value::Object(_)) => Err(BindingError::UnexpectedMap(shape)),
        Some(value) => Ok(convert(&value)?),
    }
}

impl FromArg for Value {
    fn shape() -> ParamShape {
        ParamShape::Any
    }

    fn from_arg(input: Option<Value>) -> Result<Self, BindingError> {
        Ok(input.unwrap_or_default())
    }
}

impl FromArg for String {
    fn shape() -> ParamShape {
        ParamShape::String
    }

    fn from_arg(input: Option<Value>) -> Result<Self, BindingError> {
        scalar(input, String::new(), Self::shape(), coerce::to_string)
    }
}

impl FromArg for i64 {
    fn shape() -> ParamShape {
        ParamShape::Int
    }

    fn from_arg(input: Option<Value>) -> Result<Self, BindingError> {
        scalar(input, 0, Self::shape(), coerce::to_i64)
    }
}

impl FromArg for f64 {
    fn shape() -> ParamShape {
        ParamShape::Float
    }

    fn from_arg(input: Option<Value>) -> Result<Self, BindingError> {
        scalar(input, 0.0, Self::shape(), coerce::to_f64)
    }
}

impl FromArg for bool {
    fn shape() -> ParamShape {
        ParamShape::Bool
    }

    fn from_arg(input: Option<Value>) -> Result<Self, BindingError> {
        scalar(input, false, Self::shape(), coerce::to_bool)
    }
}

impl FromArg for Duration {
    fn shape() -> ParamShape {
        ParamShape::Duration
    }

    fn from_arg(input: Option<Value>) -> Result<Self, BindingError> {
        scalar(input, Duration::ZERO, Self::shape(), coerce::to_duration)
    }
}

impl<T: FromArg> FromArg for Option<T> {
    fn shape() -> ParamShape {
        ParamShape::Optional(Box::new(T::shape()))
    }

    fn from_arg(input: Option<Value>) -> Result<Self, BindingError> {
        match input {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::from_arg(Some(value)).map(Some),
        }
    }
}

impl<T: FromArg> FromArg for Vec<T> {
    fn shape() -> ParamShape {
        ParamShape::Array(Box::new(T::shape()))
    }

    fn from_arg(input: Option<Value>) -> Result<Self, BindingError> {
        match input {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items.into_iter().map(|item| T::from_arg(Some(item))).collect(),
            Some(Value::Object(_)) => Err(BindingError::UnexpectedMap(Self::shape())),
            Some(single) => Ok(vec![T::from_arg(Some(single))?]),
        }
    }
}

impl FromArg for Object {
    fn shape() -> ParamShape {
        ParamShape::Object
    }

    fn from_arg(input: Option<Value>) -> Result<Self, BindingError> {
        match input {
            None | Some(Value::Null) => Ok(IndexMap::new()),
            Some(Value::Object(map)) => Ok(map),
            Some(other) => Err(BindingError::Coerce(CoerceError::Mismatch {
                expected: "object",
                got: other.type_name(),
            })),
        }
    }
}

/// An option record populated field by field from the keyword map.
///
/// `T` should carry `#[serde(default)]` so that fields the script leaves out
/// keep the values from `T::default()`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options<T>(pub T);

impl<T> Options<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Options<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

fn record_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

impl<T: DeserializeOwned + Default> FromArg for Options<T> {
    fn shape() -> ParamShape {
        ParamShape::Record(record_name::<T>())
    }

    fn from_arg(input: Option<Value>) -> Result<Self, BindingError> {
        match input {
            None | Some(Value::Null) => Ok(Options(T::default())),
            Some(Value::Object(map)) => serde_json::from_value(Value::Object(map).to_json())
                .map(Options)
                .map_err(|e| BindingError::Record {
                    record: record_name::<T>(),
                    reason: e.to_string(),
                }),
            Some(other) => Err(BindingError::Coerce(CoerceError::Mismatch {
                expected: "object",
                got: other.type_name(),
            })),
        }
    }
}

/// Converts a handler's return value into a command result.
pub trait IntoCommandResult {
    fn into_command_result(self, command: &str) -> CommandResult;
}

impl<T, E> IntoCommandResult for Result<T, E>
where
    T: Serialize,
    E: Into<anyhow::Error>,
{
    fn into_command_result(self, command: &str) -> CommandResult {
        let value = self.map_err(|e| DispatchError::Failed(e.into()))?;
        serde_json::to_value(&value)
            .map(Value::from)
            .map_err(|e| DispatchError::MalformedResult {
                command: command.to_string(),
                reason: e.to_string(),
            })
    }
}

fn bind<T: FromArg>(command: &str, position: usize, input: Option<Value>) -> Result<T, DispatchError> {
    T::from_arg(input).map_err(|reason| DispatchError::Binding {
        command: command.to_string(),
        position,
        reason,
    })
}

/// A function that can serve as a command.
///
/// Implemented for `Fn()`, `Fn(A)` and `Fn(A, B)` where every parameter is
/// [`FromArg`] and the return type is [`IntoCommandResult`]. `Args` only
/// disambiguates the arities.
pub trait Handler<Args>: Send + Sync + 'static {
    fn params() -> Vec<ParamShape>;
    fn call(&self, command: &str, first: Option<Value>, rest: Option<Value>) -> CommandResult;
}

impl<F, R> Handler<()> for F
where
    F: Fn() -> R + Send + Sync + 'static,
    R: IntoCommandResult,
{
    fn params() -> Vec<ParamShape> {
        Vec::new()
    }

    fn call(&self, command: &str, _first: Option<Value>, _rest: Option<Value>) -> CommandResult {
        self().into_command_result(command)
    }
}

impl<F, A, R> Handler<(A,)> for F
where
    F: Fn(A) -> R + Send + Sync + 'static,
    A: FromArg,
    R: IntoCommandResult,
{
    fn params() -> Vec<ParamShape> {
        vec![A::shape()]
    }

    fn call(&self, command: &str, first: Option<Value>, _rest: Option<Value>) -> CommandResult {
        let a = bind::<A>(command, 0, first)?;
        self(a).into_command_result(command)
    }
}

impl<F, A, B, R> Handler<(A, B)> for F
where
    F: Fn(A, B) -> R + Send + Sync + 'static,
    A: FromArg,
    B: FromArg,
    R: IntoCommandResult,
{
    fn params() -> Vec<ParamShape> {
        vec![A::shape(), B::shape()]
    }

    fn call(&self, command: &str, first: Option<Value>, rest: Option<Value>) -> CommandResult {
        let a = bind::<A>(command, 0, first)?;
        let b = bind::<B>(command, 1, rest)?;
        self(a, b).into_command_result(command)
    }
}

trait ErasedHandler: Send + Sync {
    fn params(&self) -> Vec<ParamShape>;
    fn call(&self, command: &str, first: Option<Value>, rest: Option<Value>) -> CommandResult;
}

struct Erased<H, Args> {
    handler: H,
    _args: PhantomData<fn() -> Args>,
}

impl<H, Args> ErasedHandler for Erased<H, Args>
where
    H: Handler<Args>,
    Args: 'static,
{
    fn params(&self) -> Vec<ParamShape> {
        H::params()
    }

    fn call(&self, command: &str, first: Option<Value>, rest: Option<Value>) -> CommandResult {
        self.handler.call(command, first, rest)
    }
}

/// A command registered in a [`CommandSet`].
pub struct RegisteredCommand {
    name: String,
    description: String,
    handler: Box<dyn ErasedHandler>,
}

impl RegisteredCommand {
    /// Name as registered (script spelling).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn params(&self) -> Vec<ParamShape> {
        self.handler.params()
    }

    /// Bind the inputs and run the handler. `display_name` is used in errors.
    pub fn invoke(&self, display_name: &str, first: Option<Value>, rest: Option<Value>) -> CommandResult {
        self.handler.call(display_name, first, rest)
    }
}

impl fmt::Debug for RegisteredCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredCommand")
            .field("name", &self.name)
            .field("params", &self.params())
            .finish()
    }
}

/// A unit of host functionality addressable from scripts as `prefix::command`.
pub trait Module: Send + Sync {
    /// The prefix this module is conventionally registered under.
    fn name(&self) -> &str;

    /// Find a command. Implementations should accept any spelling that
    /// [`normalize_command_name`] folds to the same key.
    fn lookup(&self, command: &str) -> Option<&RegisteredCommand>;

    /// Script spelling of a command in this module, for messages.
    fn format_name(&self, command: &str) -> String {
        if self.name().is_empty() {
            command.to_string()
        } else {
            format!("{}::{}", self.name(), command)
        }
    }

    /// Schemas for every command, in registration order.
    fn schemas(&self) -> Vec<CommandSchema>;
}

/// Fold a command name for lookup: lowercase, `_` and `-` removed.
///
/// `is_numeric`, `isNumeric` and `is-numeric` all name the same command.
pub fn normalize_command_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// A lookup table of handlers: the usual way to build a [`Module`].
pub struct CommandSet {
    name: String,
    commands: IndexMap<String, RegisteredCommand>,
}

impl CommandSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            commands: IndexMap::new(),
        }
    }

    /// Register a handler, builder style.
    pub fn command<H, Args>(mut self, name: &str, description: &str, handler: H) -> Self
    where
        H: Handler<Args>,
        Args: 'static,
    {
        self.register(name, description, handler);
        self
    }

    /// Register a handler. A later registration under an equivalent name
    /// replaces the earlier one.
    pub fn register<H, Args>(&mut self, name: &str, description: &str, handler: H)
    where
        H: Handler<Args>,
        Args: 'static,
    {
        let command = RegisteredCommand {
            name: name.to_string(),
            description: description.to_string(),
            handler: Box::new(Erased {
                handler,
                _args: PhantomData,
            }),
        };
        self.commands.insert(normalize_command_name(name), command);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Module for CommandSet {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, command: &str) -> Option<&RegisteredCommand> {
        self.commands.get(&normalize_command_name(command))
    }

    fn schemas(&self) -> Vec<CommandSchema> {
        self.commands
            .values()
            .map(|command| {
                CommandSchema::new(self.name.clone(), command.name.clone(), command.params())
                    .with_description(command.description.clone())
            })
            .collect()
    }
}

impl fmt::Debug for CommandSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSet")
            .field("name", &self.name)
            .field("commands", &self.commands.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Invoke `command` on `module` with the evaluated inputs.
pub fn dispatch(
    module: &dyn Module,
    command: &str,
    first: Option<Value>,
    rest: Option<Value>,
) -> CommandResult {
    let qualified = module.format_name(command);
    let registered = module
        .lookup(command)
        .ok_or_else(|| DispatchError::UnknownCommand(qualified.clone()))?;
    tracing::trace!(command = %qualified, "dispatching");
    registered.invoke(&qualified, first, rest)
}

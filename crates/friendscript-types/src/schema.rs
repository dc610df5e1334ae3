//! Command schema descriptors.
//!
//! Every command a module registers publishes the shapes of its parameters.
//! The shapes are derived from the handler's Rust signature at registration
//! time and are used for help output and binding error messages.

use std::fmt;

/// The declared shape of one command parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamShape {
    /// Accepts any value unchanged.
    Any,
    Bool,
    Int,
    Float,
    String,
    Duration,
    Array(Box<ParamShape>),
    /// A plain mapping, bound as-is.
    Object,
    /// An option record populated field by field from a mapping.
    Record(&'static str),
    Optional(Box<ParamShape>),
}

impl ParamShape {
    /// Whether a mapping input may populate this parameter.
    pub fn accepts_map(&self) -> bool {
        match self {
            ParamShape::Any | ParamShape::Object | ParamShape::Record(_) => true,
            ParamShape::Optional(inner) => inner.accepts_map(),
            _ => false,
        }
    }
}

impl fmt::Display for ParamShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamShape::Any => write!(f, "any"),
            ParamShape::Bool => write!(f, "bool"),
            ParamShape::Int => write!(f, "int"),
            ParamShape::Float => write!(f, "float"),
            ParamShape::String => write!(f, "string"),
            ParamShape::Duration => write!(f, "duration"),
            ParamShape::Array(inner) => write!(f, "[{inner}]"),
            ParamShape::Object => write!(f, "object"),
            ParamShape::Record(name) => write!(f, "{{{name}}}"),
            ParamShape::Optional(inner) => write!(f, "{inner}?"),
        }
    }
}

/// Schema describing one registered command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSchema {
    /// Module prefix the command was registered under (empty for the default module).
    pub module: String,
    /// Command name as registered, in script spelling (`is_numeric`).
    pub name: String,
    /// Parameter shapes in binding order: positional first, then options.
    pub params: Vec<ParamShape>,
    /// One-line summary for help output.
    pub description: String,
}

impl CommandSchema {
    /// Create a schema.
    pub fn new(module: impl Into<String>, name: impl Into<String>, params: Vec<ParamShape>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            params,
            description: String::new(),
        }
    }

    /// Attach a help summary.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// The script spelling of the command: `module::name` or bare `name`.
    pub fn qualified_name(&self) -> String {
        if self.module.is_empty() {
            self.name.clone()
        } else {
            format!("{}::{}", self.module, self.name)
        }
    }
}

impl fmt::Display for CommandSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified_name())?;
        for param in &self.params {
            write!(f, " <{param}>")?;
        }
        Ok(())
    }
}

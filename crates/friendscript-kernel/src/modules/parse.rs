//! parse: turn text into structured values.

use anyhow::{bail, Context};
use serde::Deserialize;

use friendscript_types::Value;

use crate::dispatch::{CommandSet, Options};

/// `split` options.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SplitOptions {
    /// Separator between fields.
    pub on: String,
    /// Strip whitespace around each field.
    pub trim: bool,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            on: ",".to_string(),
            trim: true,
        }
    }
}

pub fn module() -> CommandSet {
    CommandSet::new("parse")
        .command("scalar", "Auto-type a string into a number, bool or null", scalar)
        .command("json", "Decode a JSON document", json)
        .command("is_numeric", "Whether the value is or spells a number", is_numeric)
        .command("split", "Split text on a separator", split)
}

fn scalar(value: Value) -> anyhow::Result<Value> {
    Ok(match value {
        Value::String(s) => Value::String(s.trim().to_string()).normalize(),
        other => other.normalize(),
    })
}

fn json(text: String) -> anyhow::Result<Value> {
    let parsed: serde_json::Value = serde_json::from_str(&text).context("parse::json: invalid document")?;
    Ok(Value::from(parsed))
}

fn is_numeric(value: Value) -> anyhow::Result<bool> {
    let value = scalar(value)?;
    Ok(matches!(value, Value::Int(_) | Value::Float(_)))
}

fn split(text: String, options: Options<SplitOptions>) -> anyhow::Result<Vec<String>> {
    let SplitOptions { on, trim } = options.into_inner();
    if on.is_empty() {
        bail!("parse::split: the separator cannot be empty");
    }
    if text.is_empty() {
        return Ok(Vec::new());
    }
    Ok(text
        .split(on.as_str())
        .map(|field| if trim { field.trim().to_string() } else { field.to_string() })
        .collect())
}

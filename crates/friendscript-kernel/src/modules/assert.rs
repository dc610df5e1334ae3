//! assert: fail the program unless a condition holds.

use serde::Deserialize;
use thiserror::Error;

use friendscript_types::Value;

use crate::ast::Comparator;
use crate::dispatch::{CommandSet, Options};
use crate::interpreter::ops;

/// Raised by every assertion command.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("assertion failed: {0}")]
pub struct AssertionFailed(pub String);

/// Options shared by the comparing assertions.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Expectation {
    pub expected: Value,
    /// Replaces the generated failure message.
    pub message: Option<String>,
}

/// Options for `exists` and `empty`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MessageOptions {
    pub message: Option<String>,
}

pub fn module() -> CommandSet {
    CommandSet::new("assert")
        .command("exists", "Fail if the value is null", exists)
        .command("empty", "Fail unless the value is null or empty", empty)
        .command("equal", "Fail unless the value equals 'expected'", equal)
        .command("not_equal", "Fail if the value equals 'expected'", not_equal)
        .command("contains", "Fail unless the value contains 'expected'", contains)
}

fn check(ok: bool, custom: Option<String>, generated: impl FnOnce() -> String) -> Result<(), AssertionFailed> {
    if ok {
        Ok(())
    } else {
        Err(AssertionFailed(custom.unwrap_or_else(generated)))
    }
}

fn exists(value: Value, options: Options<MessageOptions>) -> Result<(), AssertionFailed> {
    check(!value.is_null(), options.into_inner().message, || "value is null".into())
}

fn empty(value: Value, options: Options<MessageOptions>) -> Result<(), AssertionFailed> {
    check(value.is_empty(), options.into_inner().message, || format!("{value} is not empty"))
}

fn equal(value: Value, options: Options<Expectation>) -> Result<(), AssertionFailed> {
    let Expectation { expected, message } = options.into_inner();
    check(ops::values_equal(&value, &expected), message, || {
        format!("expected {expected}, got {value}")
    })
}

fn not_equal(value: Value, options: Options<Expectation>) -> Result<(), AssertionFailed> {
    let Expectation { expected, message } = options.into_inner();
    check(!ops::values_equal(&value, &expected), message, || {
        format!("{value} should differ from {expected}")
    })
}

fn contains(value: Value, options: Options<Expectation>) -> anyhow::Result<()> {
    let Expectation { expected, message } = options.into_inner();
    let found = ops::compare(Comparator::In, &expected, &value)?;
    check(found, message, || format!("{value} does not contain {expected}"))?;
    Ok(())
}

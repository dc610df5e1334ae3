//! core: commands available without a prefix.

use std::time::Duration;

use anyhow::bail;
use serde::Deserialize;

use friendscript_types::{Object, Value};

use crate::dispatch::{CommandSet, Options};

/// `env` options.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EnvOptions {
    /// Returned when the variable is not set.
    pub fallback: Value,
}

pub fn module() -> CommandSet {
    CommandSet::new("")
        .command("put", "Return a value, or the options object when no value is given", put)
        .command("log", "Write a message to the log", log)
        .command("env", "Read a process environment variable", env)
        .command("len", "Length of a string, array or object", len)
        .command("sleep", "Pause evaluation", sleep)
}

fn put(value: Value, options: Object) -> anyhow::Result<Value> {
    Ok(if value.is_null() {
        Value::Object(options)
    } else {
        value
    })
}

fn log(message: Value) -> anyhow::Result<()> {
    tracing::info!(target: "friendscript::script", "{}", message.as_text());
    Ok(())
}

fn env(name: String, options: Options<EnvOptions>) -> anyhow::Result<Value> {
    if name.is_empty() {
        bail!("env: a variable name is required");
    }
    Ok(match std::env::var(&name) {
        Ok(value) => Value::String(value),
        Err(_) => options.into_inner().fallback,
    })
}

fn len(value: Value) -> anyhow::Result<i64> {
    let length = match &value {
        Value::Null => 0,
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        other => bail!("len: {} has no length", other.type_name()),
    };
    Ok(i64::try_from(length)?)
}

fn sleep(duration: Duration) -> anyhow::Result<()> {
    tracing::debug!(?duration, "sleeping");
    std::thread::sleep(duration);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{dispatch, Module};

    fn call(command: &str, first: Option<Value>, rest: Option<Value>) -> Value {
        dispatch(&module(), command, first, rest).expect("command succeeds")
    }

    #[test]
    fn put_prefers_the_positional_value() {
        assert_eq!(call("put", Some(Value::Int(3)), None), Value::Int(3));
        let mut options = Object::new();
        options.insert("a".into(), Value::Int(1));
        assert_eq!(
            call("put", None, Some(Value::Object(options.clone()))),
            Value::Object(options)
        );
    }

    #[test]
    fn len_counts_characters_and_items() {
        assert_eq!(call("len", Some(Value::from("héllo")), None), Value::Int(5));
        assert_eq!(
            call("len", Some(Value::Array(vec![Value::Null, Value::Null])), None),
            Value::Int(2)
        );
        assert_eq!(call("len", None, None), Value::Int(0));
        assert!(dispatch(&module(), "len", Some(Value::Bool(true)), None).is_err());
    }

    #[test]
    fn env_falls_back() {
        let mut options = Object::new();
        options.insert("fallback".into(), Value::from("none"));
        let value = call(
            "env",
            Some(Value::from("FRIENDSCRIPT_TEST_SURELY_UNSET_VARIABLE")),
            Some(Value::Object(options)),
        );
        assert_eq!(value, Value::from("none"));
    }

    #[test]
    fn sleep_accepts_duration_strings() {
        assert_eq!(call("sleep", Some(Value::from("1ms")), None), Value::Null);
    }

    #[test]
    fn registered_under_the_empty_prefix() {
        let module = module();
        assert_eq!(module.format_name("put"), "put");
        assert_eq!(module.schemas().len(), 5);
    }
}

//! file: read and write through the environment's path resolvers.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;

use friendscript_types::Value;

use crate::dispatch::{CommandSet, Options};
use crate::io::{PathIo, WriteMode};

/// `write` options.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    /// Content to write. Strings are written as-is, anything else as JSON.
    pub value: Value,
    /// Add to the end of the file instead of replacing it.
    pub append: bool,
}

pub fn module(io: Arc<PathIo>) -> CommandSet {
    let reader = io.clone();
    let writer = io.clone();
    CommandSet::new("file")
        .command("read", "Read a file as text", move |path: String| -> anyhow::Result<String> {
            reader
                .read_to_string(Path::new(&path))
                .with_context(|| format!("file::read: cannot read '{path}'"))
        })
        .command(
            "write",
            "Write a value to a file",
            move |path: String, options: Options<WriteOptions>| write(&writer, &path, options.into_inner()),
        )
        .command("exists", "Whether a file can be opened", move |path: String| -> anyhow::Result<bool> {
            Ok(io.exists(Path::new(&path)))
        })
}

fn write(io: &PathIo, path: &str, options: WriteOptions) -> anyhow::Result<i64> {
    let mode = if options.append {
        WriteMode::Append
    } else {
        WriteMode::Truncate
    };
    let content = options.value.as_text();
    let mut sink = io
        .open_write(Path::new(path), mode)
        .with_context(|| format!("file::write: cannot open '{path}'"))?;
    sink.write_all(content.as_bytes())
        .and_then(|()| sink.flush())
        .with_context(|| format!("file::write: cannot write '{path}'"))?;
    tracing::debug!(path, bytes = content.len(), ?mode, "wrote file");
    Ok(i64::try_from(content.len())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::dispatch;
    use friendscript_types::Object;

    fn write_options(value: &str, append: bool) -> Option<Value> {
        let mut options = Object::new();
        options.insert("value".into(), Value::from(value));
        options.insert("append".into(), Value::Bool(append));
        Some(Value::Object(options))
    }

    #[test]
    fn write_then_read_in_working_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let module = module(Arc::new(PathIo::new(Some(dir.path().to_path_buf()))));
        let path = Some(Value::from("notes.txt"));

        assert_eq!(dispatch(&module, "exists", path.clone(), None).expect("exists"), Value::Bool(false));
        let written = dispatch(&module, "write", path.clone(), write_options("one", false)).expect("write");
        assert_eq!(written, Value::Int(3));
        dispatch(&module, "write", path.clone(), write_options(" two", true)).expect("append");

        assert_eq!(dispatch(&module, "read", path.clone(), None).expect("read"), Value::from("one two"));
        assert_eq!(dispatch(&module, "exists", path, None).expect("exists"), Value::Bool(true));
    }

    #[test]
    fn reading_a_missing_file_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let module = module(Arc::new(PathIo::new(Some(dir.path().to_path_buf()))));
        assert!(dispatch(&module, "read", Some(Value::from("absent.txt")), None).is_err());
    }
}

//! Embedding tests: modules, observers, path resolvers and configuration as
//! a host application sees them.

use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;

use friendscript_kernel::dispatch::RegisteredCommand;
use friendscript_kernel::io::{Reader, Writer};
use friendscript_kernel::{
    CommandSchema, CommandSet, ContextState, Environment, EnvironmentConfig, EvalError, Module, Object,
    Options, Scope, Value, WriteMode,
};
use friendscript_types::coerce::deserialize_duration;

fn isolated() -> Environment {
    Environment::new(EnvironmentConfig::isolated())
}

// ============================================================================
// Modules
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(default)]
struct FetchOptions {
    #[serde(deserialize_with = "deserialize_duration")]
    timeout: Duration,
    retries: i64,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retries: 1,
        }
    }
}

fn fetcher() -> CommandSet {
    CommandSet::new("net").command(
        "fetch",
        "Pretend to fetch a URL",
        |url: String, options: Options<FetchOptions>| -> anyhow::Result<Value> {
            let mut out = Object::new();
            out.insert("url".into(), Value::from(url));
            out.insert("timeout_ms".into(), Value::Int(options.timeout.as_millis() as i64));
            out.insert("retries".into(), Value::Int(options.retries));
            Ok(Value::Object(out))
        },
    )
}

#[test]
fn option_records_keep_defaults_for_missing_keys() {
    let mut env = isolated();
    env.register_module("net", fetcher());

    let scope = env
        .evaluate_source(
            "net::fetch \"https://a\" -> $plain\nnet::fetch \"https://b\" {\n timeout: \"5s\"\n} -> $quick",
            None,
        )
        .into_result()
        .expect("evaluate");

    assert_eq!(scope.get("plain.timeout_ms"), Some(Value::Int(30_000)));
    assert_eq!(scope.get("quick.timeout_ms"), Some(Value::Int(5_000)));
    assert_eq!(scope.get("quick.retries"), Some(Value::Int(1)));
    assert_eq!(scope.get("quick.url"), Some(Value::from("https://b")));
}

/// Answers to a second prefix by delegating to a command set.
struct Aliased {
    name: String,
    inner: CommandSet,
}

impl Module for Aliased {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, command: &str) -> Option<&RegisteredCommand> {
        self.inner.lookup(command)
    }

    fn schemas(&self) -> Vec<CommandSchema> {
        self.inner.schemas()
    }
}

#[test]
fn custom_module_implementations_are_dispatched() {
    let mut env = isolated();
    env.register_module(
        "web",
        Aliased {
            name: "web".into(),
            inner: fetcher(),
        },
    );

    let scope = env
        .evaluate_source("web::fetch \"https://c\" -> $r", None)
        .into_result()
        .expect("evaluate");
    assert_eq!(scope.get("r.url"), Some(Value::from("https://c")));
}

#[test]
fn failed_command_reports_its_module_spelling() {
    let mut env = isolated();
    env.register_module(
        "web",
        Aliased {
            name: "web".into(),
            inner: fetcher(),
        },
    );

    let error = env.evaluate_source("web::missing", None).error.expect("should fail");
    assert!(error.to_string().contains("unknown command 'web::missing'"), "{error}");
}

#[test]
fn isolated_environments_start_without_modules() {
    let mut env = isolated();
    assert!(env.modules().is_empty());

    let error = env.evaluate_source("put 1", None).error.expect("should fail");
    assert!(matches!(error, EvalError::ModuleNotFound(ref prefix) if prefix.is_empty()));
}

#[test]
fn default_environment_bundles_modules() {
    let env = Environment::default();
    assert_eq!(env.modules(), vec!["", "assert", "file", "parse", "url"]);

    let commands = env.commands();
    assert!(commands.iter().any(|schema| schema.module == "assert" && schema.name == "equal"));
    assert!(commands.iter().any(|schema| schema.module.is_empty() && schema.name == "put"));
}

#[test]
fn modules_can_be_replaced_and_removed() {
    let mut env = isolated();
    assert!(env.register_module("net", fetcher()).is_none());
    assert!(env.register_module("net", fetcher()).is_some());
    assert_eq!(env.commands().len(), 1);

    assert!(env.unregister_module("net").is_some());
    assert!(env.module("net").is_none());
}

// ============================================================================
// Observers and the evaluation lock
// ============================================================================

fn failing() -> CommandSet {
    CommandSet::new("svc").command("fail", "Always fails", || -> anyhow::Result<Value> {
        anyhow::bail!("boom")
    })
}

#[test]
fn observers_see_commands_start_and_end() {
    let mut env = Environment::default();
    env.register_module("svc", failing());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    env.subscribe(move |context| {
        sink.lock().push((context.label.clone(), context.state, context.elapsed.is_some()));
    });

    let completion = env.evaluate_source("put 1 -> $a\nsvc::fail", None);
    assert!(completion.error.is_some());
    assert_eq!(completion.scope.get("a"), Some(Value::Int(1)));

    let seen = seen.lock();
    assert_eq!(
        *seen,
        vec![
            ("put".to_string(), ContextState::Running, false),
            ("put".to_string(), ContextState::Finished, true),
            ("svc::fail".to_string(), ContextState::Running, false),
            ("svc::fail".to_string(), ContextState::Failed, true),
        ]
    );
}

#[test]
fn unsubscribed_observers_stop_receiving() {
    let mut env = Environment::default();
    let count = Arc::new(Mutex::new(0usize));
    let counter = count.clone();
    let id = env.subscribe(move |_| *counter.lock() += 1);

    env.evaluate_source("put 1", None).into_result().expect("first run");
    assert_eq!(*count.lock(), 2);

    assert!(env.unsubscribe(id));
    assert!(!env.unsubscribe(id));
    env.evaluate_source("put 1", None).into_result().expect("second run");
    assert_eq!(*count.lock(), 2);
}

#[test]
fn evaluation_lock_is_held_while_commands_run() {
    let mut env = isolated();
    let lock = env.evaluation_lock();
    let probe = lock.clone();
    env.register_module(
        "probe",
        CommandSet::new("probe").command("held", "Whether the lock is taken", move || -> anyhow::Result<bool> {
            Ok(probe.is_locked())
        }),
    );

    let scope = env
        .evaluate_source("probe::held -> $held", None)
        .into_result()
        .expect("evaluate");
    assert_eq!(scope.get("held"), Some(Value::Bool(true)));
    assert!(!lock.is_locked());
}

// ============================================================================
// Sources and path resolvers
// ============================================================================

#[test]
fn evaluate_path_uses_registered_readers() {
    let mut env = Environment::default();
    env.register_path_reader(|path| {
        (path == Path::new("mem:/answer.fs"))
            .then(|| Ok(Box::new(Cursor::new(b"$x = 41 + 1".to_vec())) as Reader))
    });

    let scope = env.evaluate_path("mem:/answer.fs", None).into_result().expect("evaluate");
    assert_eq!(scope.get("x"), Some(Value::Int(42)));
}

#[test]
fn evaluate_path_reads_from_the_working_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("script.fs"), "$greeting = \"hi\"").expect("write script");
    let mut env = Environment::new(EnvironmentConfig::default().with_working_dir(dir.path().to_path_buf()));

    let scope = env.evaluate_path("script.fs", None).into_result().expect("evaluate");
    assert_eq!(scope.get("greeting"), Some(Value::from("hi")));

    let error = env.evaluate_path("missing.fs", None).error.expect("should fail");
    assert!(matches!(error, EvalError::Io(_)));
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn file_writes_go_through_registered_writers() {
    let mut env = Environment::default();
    let buffer = SharedBuffer::default();
    let modes = Arc::new(Mutex::new(Vec::new()));
    let (sink, seen_modes) = (buffer.clone(), modes.clone());
    env.register_path_writer(move |path, mode| {
        if path != Path::new("mem:/log") {
            return None;
        }
        seen_modes.lock().push(mode);
        Some(Ok(Box::new(sink.clone()) as Writer))
    });

    env.evaluate_source(
        "file::write \"mem:/log\" { value: \"a\" }\nfile::write \"mem:/log\" { value: [1, 2], append: true }",
        None,
    )
    .into_result()
    .expect("evaluate");

    assert_eq!(String::from_utf8_lossy(&buffer.0.lock()), "a[1,2]");
    assert_eq!(*modes.lock(), vec![WriteMode::Truncate, WriteMode::Append]);
}

#[test]
fn file_module_round_trips_in_the_working_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut env = Environment::new(EnvironmentConfig::default().with_working_dir(dir.path().to_path_buf()));

    let scope = env
        .evaluate_source(
            "file::write \"out.txt\" { value: \"hello\" } -> $bytes\nfile::read \"out.txt\" -> $text\nfile::exists \"nope.txt\" -> $there",
            None,
        )
        .into_result()
        .expect("evaluate");

    assert_eq!(scope.get("bytes"), Some(Value::Int(5)));
    assert_eq!(scope.get("text"), Some(Value::from("hello")));
    assert_eq!(scope.get("there"), Some(Value::Bool(false)));
    assert_eq!(std::fs::read_to_string(dir.path().join("out.txt")).expect("read back"), "hello");
}

struct Stalled;

impl Read for Stalled {
    fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
        std::thread::sleep(Duration::from_secs(2));
        Ok(0)
    }
}

#[test]
fn slow_readers_time_out() {
    let mut env = Environment::new(EnvironmentConfig::default().with_read_timeout(Duration::from_millis(50)));
    let completion = env.evaluate_reader(Stalled, None);
    assert!(matches!(completion.error, Some(EvalError::ReadTimeout(timeout)) if timeout == Duration::from_millis(50)));
}

#[test]
fn readers_within_the_timeout_are_evaluated() {
    let mut env = Environment::default();
    let scope = env
        .evaluate_reader(Cursor::new("$n = 2 * 21"), None)
        .into_result()
        .expect("evaluate");
    assert_eq!(scope.get("n"), Some(Value::Int(42)));
}

#[test]
fn readers_can_be_evaluated_from_async_code() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime");
    let completion = runtime.block_on(async { Environment::default().evaluate_reader(Cursor::new("$x = 1"), None) });
    let scope = completion.into_result().expect("evaluate");
    assert_eq!(scope.get("x"), Some(Value::Int(1)));
}

// ============================================================================
// Scopes at the boundary
// ============================================================================

#[test]
fn host_scope_seeds_the_program() {
    let mut values = Object::new();
    values.insert("x".into(), Value::Int(21));
    let mut env = Environment::default();

    let scope = env
        .evaluate_source("$y = $x * 2", Some(Scope::with_values(values)))
        .into_result()
        .expect("evaluate");
    assert_eq!(scope.get("x"), Some(Value::Int(21)));
    assert_eq!(scope.get("y"), Some(Value::Int(42)));
}

#[test]
fn parse_failures_hand_back_the_host_scope() {
    let mut values = Object::new();
    values.insert("kept".into(), Value::Bool(true));
    let mut env = Environment::default();

    let completion = env.evaluate_source("if {", Some(Scope::with_values(values)));
    assert!(matches!(completion.error, Some(EvalError::Parse(_))));
    assert_eq!(completion.scope.get("kept"), Some(Value::Bool(true)));
}

#[test]
fn scopes_serialize_as_their_visible_variables() {
    let mut env = Environment::default();
    let scope = env
        .evaluate_source("$a = 1\n$b = [true, \"x\"]\n$c = {d: null}", None)
        .into_result()
        .expect("evaluate");

    let json = serde_json::to_value(&scope).expect("serialize");
    assert_eq!(json, serde_json::json!({"a": 1, "b": [true, "x"], "c": {"d": null}}));
}

#[test]
fn config_from_lookup_reaches_the_url_module() {
    let config = EnvironmentConfig::from_lookup(|var| match var {
        "FRIENDSCRIPT_URL_SCHEME" => Some("http://".to_string()),
        _ => None,
    })
    .expect("config");
    let mut env = Environment::new(config);

    let scope = env
        .evaluate_source("url::parse \"example.com/x\" -> $u", None)
        .into_result()
        .expect("evaluate");
    assert_eq!(scope.get("u.scheme"), Some(Value::from("http")));
}

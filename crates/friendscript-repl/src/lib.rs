//! friendscript REPL: an interactive front end to the Friendscript kernel.
//!
//! The REPL handles:
//! - Meta-commands: `/help`, `/quit`, `/ast`, `/scope`, `/modules`, `/commands`, `/reset`
//! - Program evaluation, with variables carried from one entry to the next
//! - Multi-line entry while braces are open
//! - Command history via rustyline

use std::path::PathBuf;

use anyhow::{Context, Result};
use rustyline::Editor;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;

use friendscript_kernel::{Environment, EnvironmentConfig, Object, Scope};
use friendscript_types::Value;

/// What the caller should do after a line was processed.
#[derive(Debug, PartialEq)]
pub enum Reply {
    /// Keep going, printing the output if there is any.
    Continue(Option<String>),
    /// Leave the REPL.
    Exit,
}

/// REPL state: the environment plus the scope built up so far.
pub struct Repl {
    env: Environment,
    scope: Scope,
    show_ast: bool,
}

impl Repl {
    /// A REPL over an environment with the bundled modules.
    pub fn new() -> Self {
        Self::with_config(EnvironmentConfig::named("repl"))
    }

    pub fn with_config(config: EnvironmentConfig) -> Self {
        Self {
            env: Environment::new(config),
            scope: Scope::new(),
            show_ast: false,
        }
    }

    pub fn environment(&mut self) -> &mut Environment {
        &mut self.env
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Process one complete entry (possibly several lines of source).
    pub fn process_line(&mut self, line: &str) -> Reply {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Reply::Continue(None);
        }

        if trimmed.starts_with('/') {
            return self.handle_meta_command(trimmed);
        }
        if let Some(reply) = self.try_bare_meta_command(trimmed) {
            return reply;
        }

        if self.show_ast {
            return Reply::Continue(Some(match friendscript_kernel::parse(trimmed) {
                Ok(program) => format!("{:#?}", program.blocks),
                Err(e) => format!("Parse error: {e}"),
            }));
        }

        let before = self.scope.snapshot();
        let completion = self.env.evaluate_source(trimmed, Some(std::mem::take(&mut self.scope)));
        self.scope = completion.scope;

        let changes = format_changes(&before, &self.scope.snapshot());
        match (completion.error, changes) {
            (None, changes) => Reply::Continue(changes),
            (Some(e), None) => Reply::Continue(Some(format!("Error: {e}"))),
            (Some(e), Some(changes)) => Reply::Continue(Some(format!("{changes}\nError: {e}"))),
        }
    }

    fn handle_meta_command(&mut self, cmd: &str) -> Reply {
        let command = cmd.split_whitespace().next().unwrap_or("");

        match command {
            "/quit" | "/q" | "/exit" => Reply::Exit,
            "/help" | "/h" | "/?" => Reply::Continue(Some(HELP_TEXT.to_string())),
            "/ast" => {
                self.show_ast = !self.show_ast;
                Reply::Continue(Some(format!("AST mode: {}", if self.show_ast { "ON" } else { "OFF" })))
            }
            "/scope" | "/vars" => {
                let vars = self.scope.snapshot();
                if vars.is_empty() {
                    return Reply::Continue(Some("(no variables set)".to_string()));
                }
                let mut output = String::from("Variables:\n");
                for (name, value) in &vars {
                    output.push_str(&format!("  ${name} = {}\n", format_value(value)));
                }
                Reply::Continue(Some(output.trim_end().to_string()))
            }
            "/json" => Reply::Continue(Some(
                serde_json::to_string_pretty(&self.scope).unwrap_or_else(|e| format!("Error: {e}")),
            )),
            "/modules" => {
                let prefixes: Vec<String> = self
                    .env
                    .modules()
                    .into_iter()
                    .map(|prefix| if prefix.is_empty() { "(default)".to_string() } else { prefix.to_string() })
                    .collect();
                Reply::Continue(Some(format!("Modules: {}", prefixes.join(", "))))
            }
            "/commands" => {
                let lines: Vec<String> = self
                    .env
                    .commands()
                    .iter()
                    .map(|schema| format!("  {schema:<40} {}", schema.description))
                    .collect();
                Reply::Continue(Some(lines.join("\n")))
            }
            "/reset" => {
                self.scope = Scope::new();
                Reply::Continue(Some("Scope reset (variables cleared)".to_string()))
            }
            _ => Reply::Continue(Some(format!(
                "Unknown command: {command}\nType /help or help for available commands."
            ))),
        }
    }

    /// `help` and `quit` work without the slash.
    fn try_bare_meta_command(&mut self, cmd: &str) -> Option<Reply> {
        match cmd {
            "quit" | "exit" => Some(self.handle_meta_command("/quit")),
            "help" => Some(self.handle_meta_command("/help")),
            _ => None,
        }
    }
}

impl Default for Repl {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `source` leaves a `{` or `[` open, meaning the entry continues on
/// the next line. Brackets inside quotes and comments are ignored.
pub fn is_incomplete(source: &str) -> bool {
    let mut depth: i64 = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut comment = false;

    for c in source.chars() {
        if comment {
            comment = c != '\n';
            continue;
        }
        if let Some(open) = quote {
            match c {
                _ if escaped => escaped = false,
                '\\' if open == '"' => escaped = true,
                _ if c == open => quote = None,
                _ => {}
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '#' => comment = true,
            '{' | '[' => depth += 1,
            '}' | ']' => depth -= 1,
            _ => {}
        }
    }
    depth > 0
}

/// Render a value the way it would be written in a script.
fn format_value(value: &Value) -> String {
    value.to_json().to_string()
}

/// One `$name = value` line per variable that is new or changed.
fn format_changes(before: &Object, after: &Object) -> Option<String> {
    let lines: Vec<String> = after
        .iter()
        .filter(|(name, value)| before.get(*name) != Some(*value))
        .map(|(name, value)| format!("${name} = {}", format_value(value)))
        .collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
}

const HELP_TEXT: &str = r#"friendscript REPL

Meta Commands (use with or without /):
  help, /help, /?   Show this help
  quit, /quit, /q   Exit the REPL

Slash-only commands:
  /ast              Toggle AST display mode
  /scope, /vars     Show all variables
  /json             Show all variables as JSON
  /modules          List registered module prefixes
  /commands         List every command with its parameters
  /reset            Clear all variables

Language:
  $x = 1 + 2                 Assign (also += -= *= /= and << to append)
  $a, $b = [1, 2]            Destructure
  "Hello {name}"             Interpolate; 'raw' strings are left alone
  if $x > 2 { ... } else { ... }
  loop $item in $list { ... }
  loop count 3 { ... }       $index holds the iteration number
  break / continue [N]

Commands:
  put {a: 1} -> $obj         Default module
  parse::json '{"a": 1}' -> $doc
  url::parse "example.com/path" -> $url
  assert::equal $x { expected: 3 }

Entries with open braces continue on the next line.
"#;

/// Save REPL history to disk.
fn save_history(rl: &mut Editor<(), DefaultHistory>, history_path: &Option<PathBuf>) {
    if let Some(path) = history_path {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("Failed to create history directory: {}", e);
            }
        }
        if let Err(e) = rl.save_history(path) {
            tracing::warn!("Failed to save history: {}", e);
        }
    }
}

/// Run the REPL.
pub fn run(config: EnvironmentConfig) -> Result<()> {
    println!("friendscript v{}", env!("CARGO_PKG_VERSION"));
    println!("Type /help for commands, /quit to exit.");

    let mut rl: Editor<(), DefaultHistory> = Editor::new().context("Failed to create editor")?;

    let history_path = directories::BaseDirs::new().map(|b| b.data_dir().join("friendscript").join("history.txt"));
    if let Some(path) = &history_path {
        if let Err(e) = rl.load_history(path) {
            // A missing file is expected on first run.
            let is_not_found =
                matches!(&e, ReadlineError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound);
            if !is_not_found {
                tracing::warn!("Failed to load history: {}", e);
            }
        }
    }

    let mut repl = Repl::with_config(config);
    let mut pending = String::new();
    println!();

    loop {
        let prompt = if pending.is_empty() { "fs> " } else { "..> " };

        match rl.readline(prompt) {
            Ok(line) => {
                if !pending.is_empty() {
                    pending.push('\n');
                }
                pending.push_str(&line);
                if is_incomplete(&pending) {
                    continue;
                }

                let entry = std::mem::take(&mut pending);
                if let Err(e) = rl.add_history_entry(entry.as_str()) {
                    tracing::warn!("Failed to add history entry: {}", e);
                }

                match repl.process_line(&entry) {
                    Reply::Continue(Some(output)) => println!("{output}"),
                    Reply::Continue(None) => {}
                    Reply::Exit => break,
                }
            }
            Err(ReadlineError::Interrupted) => {
                pending.clear();
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {err}");
                break;
            }
        }
    }

    save_history(&mut rl, &history_path);
    Ok(())
}

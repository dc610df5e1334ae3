//! friendscript CLI entry point.
//!
//! Usage:
//!   friendscript                     # Interactive REPL
//!   friendscript -c <source>         # Evaluate source and exit
//!   friendscript script.fs           # Run a script
//!   friendscript --json script.fs    # Run a script, print the final scope as JSON

use std::env;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use friendscript_kernel::{Completion, Environment, EnvironmentConfig};

fn main() -> ExitCode {
    // Respects RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let mut args: Vec<String> = env::args().skip(1).collect();
    let json = match args.iter().position(|arg| arg == "--json") {
        Some(index) => {
            args.remove(index);
            true
        }
        None => false,
    };

    match args.first().map(|s| s.as_str()) {
        None => {
            friendscript_repl::run(config()?)?;
            Ok(ExitCode::SUCCESS)
        }

        Some("--help" | "-h") => {
            print_help();
            Ok(ExitCode::SUCCESS)
        }

        Some("--version" | "-V") => {
            println!("friendscript {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }

        Some("-c") => {
            let source = args.get(1).context("-c requires a source argument")?;
            let mut env = Environment::new(config()?);
            Ok(report(env.evaluate_source(source, None), json))
        }

        Some(path) if !path.starts_with('-') => run_script(path, json),

        Some(unknown) => {
            eprintln!("Unknown option: {unknown}");
            eprintln!("Run 'friendscript --help' for usage.");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn config() -> Result<EnvironmentConfig> {
    EnvironmentConfig::from_env().context("Invalid environment configuration")
}

fn print_help() {
    println!(
        r#"friendscript v{}

Usage:
  friendscript                   Interactive REPL
  friendscript -c <source>       Evaluate source and exit
  friendscript <script.fs>       Run a script file

Options:
  -c <source>                    Evaluate a source string and exit
  --json                         Print the final scope as JSON
  -h, --help                     Show this help
  -V, --version                  Show version

Environment:
  FRIENDSCRIPT_URL_SCHEME        Scheme for addresses without one (default: https)
  FRIENDSCRIPT_READ_TIMEOUT      Limit on reading script sources (default: 5s)
  RUST_LOG                       Log filter, e.g. friendscript=debug
"#,
        env!("CARGO_PKG_VERSION")
    );
}

/// Run a script file, resolving relative paths against the current directory.
fn run_script(path: &str, json: bool) -> Result<ExitCode> {
    let config = config()?;
    let cwd = env::current_dir().context("Failed to read the current directory")?;
    let mut env = Environment::new(config.with_name(path).with_working_dir(cwd));

    if !env.path_io().exists(Path::new(path)) {
        anyhow::bail!("Failed to read script: {path}");
    }
    Ok(report(env.evaluate_path(path, None), json))
}

/// Print the outcome and pick the exit code.
fn report(completion: Completion, json: bool) -> ExitCode {
    if json {
        match serde_json::to_string_pretty(&completion.scope) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("Error: cannot serialize scope: {e}"),
        }
    }

    match completion.error {
        None => ExitCode::SUCCESS,
        Some(error) => {
            eprintln!("Error: {error}");
            ExitCode::FAILURE
        }
    }
}

//! Drives the REPL line by line, the way an interactive session would.

use friendscript_repl::{Reply, Repl};
use friendscript_types::Value;

fn output(reply: Reply) -> String {
    match reply {
        Reply::Continue(Some(text)) => text,
        other => panic!("expected output, got {other:?}"),
    }
}

#[test]
fn variables_carry_between_entries() {
    let mut repl = Repl::new();
    assert_eq!(output(repl.process_line("$x = 20")), "$x = 20");
    assert_eq!(output(repl.process_line("$y = $x + 1")), "$y = 21");
    assert_eq!(repl.scope().get("y"), Some(Value::Int(21)));
}

#[test]
fn commands_without_assignments_print_nothing() {
    let mut repl = Repl::new();
    assert_eq!(repl.process_line("put 1"), Reply::Continue(None));
    assert_eq!(repl.process_line("   "), Reply::Continue(None));
}

#[test]
fn errors_keep_the_session_alive() {
    let mut repl = Repl::new();
    repl.process_line("$kept = true");

    let text = output(repl.process_line("nosuch::command"));
    assert!(text.starts_with("Error: cannot locate module 'nosuch'"), "{text}");

    let text = output(repl.process_line("if {"));
    assert!(text.starts_with("Error:"), "{text}");
    assert_eq!(repl.scope().get("kept"), Some(Value::Bool(true)));
}

#[test]
fn multi_line_entries_evaluate_whole() {
    let mut repl = Repl::new();
    let text = output(repl.process_line("$sum = 0\nloop count 4 {\n  $sum += $index\n}"));
    assert_eq!(text, "$sum = 6");
}

#[test]
fn scope_and_reset_meta_commands() {
    let mut repl = Repl::new();
    assert_eq!(output(repl.process_line("/scope")), "(no variables set)");

    repl.process_line("$name = \"fs\"");
    assert_eq!(output(repl.process_line("/vars")), "Variables:\n  $name = \"fs\"");

    assert!(output(repl.process_line("/reset")).contains("cleared"));
    assert_eq!(repl.scope().get("name"), None);
}

#[test]
fn lists_modules_and_commands() {
    let mut repl = Repl::new();
    assert_eq!(
        output(repl.process_line("/modules")),
        "Modules: (default), assert, file, parse, url"
    );
    let commands = output(repl.process_line("/commands"));
    assert!(commands.contains("url::join"), "{commands}");
}

#[test]
fn ast_mode_parses_without_running() {
    let mut repl = Repl::new();
    assert_eq!(output(repl.process_line("/ast")), "AST mode: ON");
    assert!(output(repl.process_line("$x = 1")).contains("Assignment"));
    assert_eq!(repl.scope().get("x"), None);
    assert_eq!(output(repl.process_line("/ast")), "AST mode: OFF");
}

#[test]
fn quit_in_either_spelling() {
    let mut repl = Repl::new();
    assert_eq!(repl.process_line("/quit"), Reply::Exit);
    assert_eq!(repl.process_line("quit"), Reply::Exit);
    assert!(output(repl.process_line("help")).contains("/scope"));
    assert!(output(repl.process_line("/nope")).starts_with("Unknown command: /nope"));
}

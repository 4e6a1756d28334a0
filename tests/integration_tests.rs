//! End-to-end tests for the hicloud console
//!
//! These tests drive the real registry and handlers through the dispatch loop:
//! - scripted operator input (commands and confirmation answers)
//! - a `MockTransport` standing in for the cloud API
//! - tab completion against the same session
//!
//! Run with: cargo test --test integration_tests

use hicloud_api::{Method, MockTransport};
use hicloud_cli::{App, Startup};
use hicloud_console::{Project, ScriptedInput};
use serde_json::json;
use std::rc::Rc;

// ============================================================================
// Harness
// ============================================================================

fn token_startup() -> Startup {
    Startup::resolve(None, None, Some("test-token")).expect("startup")
}

fn servers_mock() -> Rc<MockTransport> {
    Rc::new(
        MockTransport::new()
            .with(
                Method::Get,
                "servers",
                json!({ "servers": [
                    { "id": 42, "name": "web-1", "status": "running" },
                    { "id": 43, "name": "db-1", "status": "off" }
                ]}),
            )
            .with(Method::Get, "servers/42", json!({ "server": { "id": 42, "name": "web-1", "status": "running" } }))
            .with(Method::Get, "servers/43", json!({ "server": { "id": 43, "name": "db-1", "status": "off" } })),
    )
}

struct Session {
    app: App,
    output: String,
    prompts: Vec<String>,
}

/// Run `lines` through a fresh console, then end of input.
fn drive(startup: &Startup, mock: &Rc<MockTransport>, lines: &[&str]) -> Session {
    colored::control::set_override(false);
    let app = App::new(startup, mock.clone(), false).expect("app");
    let mut console = app.console(ScriptedInput::new(lines.iter().copied()), Vec::new());
    console.run().expect("console run");
    let output = String::from_utf8(console.output().clone()).expect("utf8");
    let prompts = console.input().prompts().to_vec();
    drop(console);
    Session { app, output, prompts }
}

fn candidates(app: &App, buffer: &str) -> Vec<String> {
    app.completion_engine()
        .complete(buffer, buffer.len())
        .candidates
        .into_iter()
        .map(|c| c.text)
        .collect()
}

// ============================================================================
// Confirmation
// ============================================================================

#[test]
fn test_declined_delete_makes_no_remote_writes() {
    let mock = servers_mock();
    let s = drive(&token_startup(), &mock, &["vm delete 42", "n"]);
    assert!(s.output.contains("Operation cancelled"), "{}", s.output);
    assert!(s.prompts.iter().any(|p| p.contains("Delete VM 42?")));
    assert_eq!(mock.write_calls(), 0);
}

#[test]
fn test_confirmed_delete_calls_the_api_once() {
    let mock = servers_mock();
    let s = drive(&token_startup(), &mock, &["vm delete 42", "y"]);
    assert!(s.output.contains("VM 42 deleted"), "{}", s.output);
    assert_eq!(mock.calls_to(Method::Delete, "servers/42"), 1);
}

#[test]
fn test_literal_confirmation_rejects_plain_yes() {
    let mock = servers_mock();
    let s = drive(&token_startup(), &mock, &["batch delete 42,43", "yes"]);
    assert!(s.prompts.iter().any(|p| p.contains("Type 'delete' to confirm")));
    assert!(s.output.contains("Operation cancelled"));
    assert_eq!(mock.write_calls(), 0);

    let s = drive(&token_startup(), &mock, &["batch delete 42,43", "delete"]);
    assert!(s.output.contains("2 succeeded, 0 failed"), "{}", s.output);
    assert_eq!(mock.calls_to(Method::Delete, "servers/42"), 1);
    assert_eq!(mock.calls_to(Method::Delete, "servers/43"), 1);
}

#[test]
fn test_end_of_input_during_confirmation_declines() {
    let mock = servers_mock();
    let s = drive(&token_startup(), &mock, &["vm delete 42"]);
    assert!(s.output.contains("Operation cancelled"));
    assert_eq!(mock.write_calls(), 0);
}

// ============================================================================
// Dispatch
// ============================================================================

#[test]
fn test_wrong_arity_prints_usage_without_remote_calls() {
    let mock = servers_mock();
    let s = drive(&token_startup(), &mock, &["vm info", "vm info 1 2"]);
    assert_eq!(s.output.matches("usage: vm info <id>").count(), 2, "{}", s.output);
    assert!(mock.calls().is_empty());
}

#[test]
fn test_unknown_command_suggests_but_never_dispatches() {
    let mock = servers_mock();
    let s = drive(&token_startup(), &mock, &["volum list"]);
    assert!(s.output.contains("Unknown command: volum"));
    assert!(s.output.contains("Did you mean `volume`?"));
    assert!(mock.calls().is_empty());
}

#[test]
fn test_alias_dispatches_like_the_command() {
    let mock = servers_mock();
    let s = drive(&token_startup(), &mock, &["server list"]);
    assert!(s.output.contains("web-1"), "{}", s.output);
    assert!(s.output.contains("db-1"));
}

#[test]
fn test_batch_accepts_comma_separated_ids() {
    let mock = servers_mock();
    let s = drive(&token_startup(), &mock, &["batch start 42,43,abc", "y"]);
    assert!(s.output.contains("Invalid server ID: abc"), "{}", s.output);
    assert!(s.output.contains("already running"));
    assert!(s.output.contains("1 succeeded, 0 failed"));
    assert_eq!(mock.calls_to(Method::Post, "servers/43/actions/poweron"), 1);
    assert_eq!(mock.calls_to(Method::Post, "servers/42/actions/poweron"), 0);
}

#[test]
fn test_malformed_destructive_arguments_are_rejected_before_confirmation() {
    let mock = servers_mock();
    let s = drive(
        &token_startup(),
        &mock,
        &["snapshot delete all", "y", "batch start abc", "y", "vm delete web", "y"],
    );
    assert!(s.output.contains("usage: snapshot delete all <vm>"), "{}", s.output);
    assert!(s.output.contains("No valid server IDs given (invalid: abc)"));
    assert!(s.output.contains("Invalid VM ID: web"));
    assert!(!s.output.contains("usage: usage:"));
    assert!(!s.prompts.iter().any(|p| p.contains("[y/N]")), "{:?}", s.prompts);
    assert_eq!(mock.write_calls(), 0);
}

#[test]
fn test_remote_failure_keeps_the_console_running() {
    let mock = servers_mock();
    mock.fail(Method::Get, "volumes", 500, "internal error");
    let s = drive(&token_startup(), &mock, &["volume list", "vm list"]);
    assert!(s.output.contains("internal error"), "{}", s.output);
    assert!(s.output.contains("web-1"));
}

// ============================================================================
// History
// ============================================================================

#[test]
fn test_history_keeps_every_line_in_order() {
    let mock = servers_mock();
    let s = drive(&token_startup(), &mock, &["vm list", "bogus", "vm info", "history"]);
    let history: Vec<String> = s.app.session.borrow().history.iter().map(str::to_string).collect();
    assert_eq!(history, vec!["vm list", "bogus", "vm info", "history"]);
    assert!(s.output.contains("Command History:"));
    assert!(s.output.contains("   2  bogus"));
}

#[test]
fn test_history_clear_is_itself_recorded() {
    let mock = servers_mock();
    let s = drive(&token_startup(), &mock, &["vm list", "history clear"]);
    let history: Vec<String> = s.app.session.borrow().history.iter().map(str::to_string).collect();
    assert_eq!(history, vec!["history clear"]);
}

#[test]
fn test_exit_stops_reading() {
    let mock = servers_mock();
    let s = drive(&token_startup(), &mock, &["exit", "vm list"]);
    assert!(mock.calls().is_empty());
    assert_eq!(s.app.session.borrow().history.len(), 1);
}

// ============================================================================
// Completion
// ============================================================================

#[test]
fn test_iso_completion_offers_subcommands_without_lookups() {
    let mock = servers_mock();
    let app = App::new(&token_startup(), mock.clone(), false).expect("app");
    assert_eq!(candidates(&app, "iso "), vec!["list", "info", "attach", "detach"]);
    assert_eq!(candidates(&app, "iso a"), vec!["attach"]);
    assert!(mock.calls().is_empty());
}

#[test]
fn test_argument_completion_never_writes_and_uses_the_cache() {
    let mock = servers_mock();
    let app = App::new(&token_startup(), mock.clone(), false).expect("app");
    assert_eq!(candidates(&app, "vm delete "), vec!["42", "43"]);
    assert_eq!(candidates(&app, "vm delete 4"), vec!["42", "43"]);
    assert_eq!(mock.calls_to(Method::Get, "servers"), 1);
    assert_eq!(mock.write_calls(), 0);
}

#[test]
fn test_completion_never_writes_for_any_subcommand() {
    let mock = servers_mock();
    let app = App::new(&token_startup(), mock.clone(), false).expect("app");
    let mut buffers = Vec::new();
    for node in app.registry.commands() {
        for sub in &node.subcommands {
            let head = if sub.is_bare() {
                format!("{} ", node.name)
            } else {
                format!("{} {} ", node.name, sub.name)
            };
            for filled in 0..=2 {
                buffers.push(format!("{head}{}", "1 ".repeat(filled)));
            }
        }
    }
    assert!(buffers.len() > 100);
    for buffer in &buffers {
        candidates(&app, buffer);
        assert_eq!(mock.write_calls(), 0, "completing {buffer:?}");
    }
}

#[test]
fn test_failed_lookup_yields_no_candidates() {
    let mock = servers_mock();
    mock.set_offline(true);
    let app = App::new(&token_startup(), mock.clone(), false).expect("app");
    assert!(candidates(&app, "vm info ").is_empty());
    assert_eq!(mock.write_calls(), 0);
}

// ============================================================================
// Projects
// ============================================================================

#[test]
fn test_project_switch_swaps_token_and_clears_cache() {
    let startup = Startup {
        projects: vec![
            (Project::new("default", "Default"), "token-a".to_string()),
            (Project::new("prod", "Production"), "token-b".to_string()),
        ],
        active: "default".to_string(),
        ..token_startup()
    };
    let mock = servers_mock();
    let app = App::new(&startup, mock.clone(), false).expect("app");
    assert_eq!(mock.token(), "token-a");
    assert_eq!(candidates(&app, "vm info "), vec!["42", "43"]);

    let mut console = app.console(ScriptedInput::new(["project switch 2"]), Vec::new());
    console.run().expect("run");
    drop(console);

    assert_eq!(app.session.borrow().active_project().key, "prod");
    assert_eq!(mock.token(), "token-b");
    candidates(&app, "vm info ");
    assert_eq!(mock.calls_to(Method::Get, "servers"), 2);
}

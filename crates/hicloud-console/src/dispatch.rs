//! The read-resolve-execute loop.
//!
//! ```text
//!   PROMPT ──line──▶ EXECUTING ──▶ PROMPT
//!     │                  │
//!     └──eof──▶ EXIT ◀───┘ (exit / quit / q)
//! ```
//!
//! The two blocking reads (the command line and confirmation answers) share one
//! [`LineSource`]. Nothing raised by a handler or a lookup ends the loop.

use crate::confirm::ConfirmationGate;
use crate::handler::{ErrorKind, ExecContext, Outcome, Render, Table};
use crate::input::{InputEvent, LineSource};
use crate::registry::{Builtin, CommandNode, Confirmation, Registry, Resolution, SubcommandSpec, Target};
use crate::render::{render, render_outcome, CANCELLED};
use crate::session::SessionState;
use crate::tokenizer::tokenize;
use anyhow::Result;
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

pub const DEFAULT_PROMPT: &str = "hicloud> ";

const CLEAR_SCREEN: &str = "\x1B[2J\x1B[1;1H";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleState {
    Prompt,
    Executing(String),
    Exit,
}

pub struct Console<L: LineSource, W: Write> {
    registry: Rc<Registry>,
    session: Rc<RefCell<SessionState>>,
    input: L,
    out: W,
    prompt: String,
    banner: Option<String>,
}

impl<L: LineSource, W: Write> Console<L, W> {
    pub fn new(registry: Rc<Registry>, session: Rc<RefCell<SessionState>>, input: L, out: W) -> Self {
        Self {
            registry,
            session,
            input,
            out,
            prompt: DEFAULT_PROMPT.to_string(),
            banner: None,
        }
    }

    /// Shown at startup and after `clear`.
    pub fn with_banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = Some(banner.into());
        self
    }

    pub fn input(&self) -> &L {
        &self.input
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn session(&self) -> &Rc<RefCell<SessionState>> {
        &self.session
    }

    /// Run until `exit` or end of input, then persist history. History is
    /// saved even when reading input fails.
    pub fn run(&mut self) -> Result<()> {
        let result = self.drive();
        if let Err(e) = self.session.borrow().history.save() {
            tracing::warn!("could not save command history: {e}");
        }
        result
    }

    fn drive(&mut self) -> Result<()> {
        if let Some(banner) = &self.banner {
            writeln!(self.out, "{banner}")?;
        }

        let mut state = ConsoleState::Prompt;
        loop {
            state = match state {
                ConsoleState::Prompt => self.read()?,
                ConsoleState::Executing(line) => self.execute_line(&line),
                ConsoleState::Exit => break,
            };
        }
        self.out.flush()?;
        Ok(())
    }

    fn read(&mut self) -> Result<ConsoleState> {
        self.out.flush()?;
        Ok(match self.input.read_line(&self.prompt)? {
            InputEvent::Line(line) if line.trim().is_empty() => ConsoleState::Prompt,
            InputEvent::Line(line) => ConsoleState::Executing(line),
            InputEvent::Interrupted => {
                self.say(CANCELLED);
                ConsoleState::Prompt
            }
            InputEvent::Eof => {
                writeln!(self.out)?;
                ConsoleState::Exit
            }
        })
    }

    /// Execute one submitted line and record it, whatever the outcome.
    pub fn execute_line(&mut self, line: &str) -> ConsoleState {
        let next = self.dispatch(line);
        self.session.borrow_mut().history.push(line);
        self.input.add_history(line);
        next
    }

    fn dispatch(&mut self, line: &str) -> ConsoleState {
        let parsed = tokenize(line);
        if parsed.is_empty() {
            return ConsoleState::Prompt;
        }

        let registry = Rc::clone(&self.registry);
        match registry.resolve(&parsed) {
            Resolution::NoSuchCommand { name } => {
                tracing::debug!(%name, "no such command");
                self.say(&format!("Unknown command: {name}"));
                if let Some(suggestion) = registry.suggest(&name) {
                    self.say(&format!("Did you mean `{suggestion}`?"));
                }
                self.say("Type 'help' for available commands.");
                ConsoleState::Prompt
            }
            Resolution::NoSuchSubcommand { command, given, .. } => {
                if let Some(given) = given {
                    self.say(&format!("Unknown {} subcommand: {given}", command.name));
                }
                self.say(&command.missing_subcommand_hint());
                ConsoleState::Prompt
            }
            Resolution::Resolved {
                command,
                target,
                subcommand,
                args,
            } => {
                if !subcommand.accepts(args.len()) {
                    self.say(&format!("usage: {}", subcommand.usage));
                    return ConsoleState::Prompt;
                }
                match target {
                    Target::Builtin(builtin) => self.builtin(&registry, builtin, subcommand, &args),
                    Target::Handler(id) => {
                        self.run_handler(&registry, id, command, subcommand, &args);
                        ConsoleState::Prompt
                    }
                }
            }
        }
    }

    fn run_handler(
        &mut self,
        registry: &Registry,
        id: usize,
        command: &CommandNode,
        subcommand: &SubcommandSpec,
        args: &[String],
    ) {
        let Some(handler) = registry.handler(id) else {
            self.show(&Outcome::failure(
                ErrorKind::Internal,
                format!("no handler registered for `{}`", command.name),
            ));
            return;
        };

        if let Err(rejected) = handler.check(&subcommand.name, args) {
            tracing::debug!(command = %command.name, subcommand = %subcommand.name, "rejected before dispatch");
            self.show(&rejected);
            return;
        }

        if subcommand.is_destructive() {
            let prompt = handler
                .confirm_prompt(&subcommand.name, args)
                .unwrap_or_else(|| generic_prompt(command, subcommand, args));
            let mut gate = ConfirmationGate::new(&mut self.input, &mut self.out);
            let confirmed = match &subcommand.confirmation {
                Confirmation::Literal(word) => gate.confirm_literal(&prompt, word),
                _ => gate.confirm(&prompt),
            };
            if !confirmed {
                tracing::debug!(command = %command.name, subcommand = %subcommand.name, "declined");
                self.say(CANCELLED);
                return;
            }
        }

        tracing::debug!(command = %command.name, subcommand = %subcommand.name, ?args, "dispatch");
        let outcome = {
            let mut session = self.session.borrow_mut();
            let mut ctx = ExecContext {
                session: &mut *session,
                gate: ConfirmationGate::new(&mut self.input, &mut self.out),
            };
            handler.execute(&mut ctx, &subcommand.name, args)
        };
        if let Outcome::Failure { kind, message } = &outcome {
            tracing::debug!(kind = kind.label(), %message, "command failed");
        }
        self.show(&outcome);
    }

    fn builtin(
        &mut self,
        registry: &Registry,
        builtin: Builtin,
        subcommand: &SubcommandSpec,
        args: &[String],
    ) -> ConsoleState {
        match builtin {
            Builtin::Help => {
                let outcome = match args.first() {
                    Some(name) => command_help(registry, name),
                    None => Outcome::Success(overview(registry)),
                };
                self.show(&outcome);
            }
            Builtin::History if subcommand.name == "clear" => {
                self.session.borrow_mut().history.clear();
                self.say("Command history cleared");
            }
            Builtin::History => {
                let listing = {
                    let session = self.session.borrow();
                    if session.history.is_empty() {
                        Render::message("No command history")
                    } else {
                        let mut text = String::from("Command History:");
                        for (i, line) in session.history.iter().enumerate() {
                            text.push_str(&format!("\n{:4}  {line}", i + 1));
                        }
                        Render::Message(text)
                    }
                };
                self.show(&Outcome::Success(listing));
            }
            Builtin::Clear => {
                let _ = write!(self.out, "{CLEAR_SCREEN}");
                if let Some(banner) = self.banner.clone() {
                    self.say(&banner);
                }
            }
            Builtin::Exit => return ConsoleState::Exit,
        }
        ConsoleState::Prompt
    }

    fn show(&mut self, outcome: &Outcome) {
        if let Err(e) = render_outcome(&mut self.out, outcome) {
            tracing::warn!("failed to write output: {e}");
        }
    }

    fn say(&mut self, text: &str) {
        if let Err(e) = render(&mut self.out, &Render::message(text)) {
            tracing::warn!("failed to write output: {e}");
        }
    }
}

fn generic_prompt(command: &CommandNode, subcommand: &SubcommandSpec, args: &[String]) -> String {
    let mut target = command.name.clone();
    if !args.is_empty() {
        target.push(' ');
        target.push_str(&args.join(" "));
    }
    format!("Are you sure you want to {} {target}?", subcommand.name)
}

fn overview(registry: &Registry) -> Render {
    let mut table = Table::new(["Command", "Aliases", "Description"]).titled("Available Commands");
    for c in registry.commands() {
        table.row([c.name.clone(), c.aliases.join(", "), c.summary.clone()]);
    }
    Render::Sequence(vec![
        Render::Table(table),
        Render::message("Type 'help <command>' for its subcommands."),
    ])
}

fn command_help(registry: &Registry, name: &str) -> Outcome {
    let Some(node) = registry.command(name) else {
        return Outcome::failure(ErrorKind::NotFound, format!("Unknown command: {name}"));
    };
    let mut table = Table::new(["Subcommand", "Usage", "Description"])
        .titled(format!("{} - {}", node.name, node.summary));
    for s in &node.subcommands {
        let marker = if s.is_destructive() { " (confirms)" } else { "" };
        table.row([
            s.name.clone(),
            s.usage.clone(),
            format!("{}{marker}", s.summary),
        ]);
    }
    Outcome::Success(Render::Table(table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::ScriptedInput;
    use crate::registry::RegistryBuilder;
    use crate::session::{History, Project};
    use std::cell::Cell;

    /// Counts executions; `delete` is destructive, `rebuild` wants a word.
    struct Counting {
        calls: Rc<Cell<usize>>,
    }

    impl crate::handler::ResourceHandler for Counting {
        fn describe(&self) -> CommandNode {
            CommandNode::new("vm", "Servers")
                .alias("server")
                .sub(SubcommandSpec::new("list", "vm list"))
                .sub(SubcommandSpec::new("move", "vm move <id> <location>").exactly(2))
                .sub(SubcommandSpec::new("delete", "vm delete <id>").exactly(1).destructive())
                .sub(
                    SubcommandSpec::new("rebuild", "vm rebuild <id>")
                        .exactly(1)
                        .literal("rebuild"),
                )
                .sub(SubcommandSpec::new("fail", "vm fail"))
        }

        fn execute(&self, _ctx: &mut ExecContext<'_>, sub: &str, args: &[String]) -> Outcome {
            self.calls.set(self.calls.get() + 1);
            match sub {
                "fail" => Outcome::failure(ErrorKind::Remote, "server exploded"),
                _ => Outcome::message(format!("{sub} {}", args.join(" "))),
            }
        }

        fn check(&self, sub: &str, args: &[String]) -> Result<(), Outcome> {
            match (sub, args) {
                ("delete", [id]) if id.parse::<u64>().is_err() => Err(Outcome::failure(
                    ErrorKind::InvalidArgument,
                    format!("Invalid VM ID: {id}"),
                )),
                _ => Ok(()),
            }
        }

        fn confirm_prompt(&self, sub: &str, args: &[String]) -> Option<String> {
            (sub == "delete").then(|| format!("Delete VM {}?", args[0]))
        }
    }

    /// Yields its lines, then fails like a closed terminal.
    struct Broken {
        lines: Vec<String>,
    }

    impl LineSource for Broken {
        fn read_line(&mut self, _prompt: &str) -> Result<InputEvent> {
            if self.lines.is_empty() {
                anyhow::bail!("terminal went away");
            }
            Ok(InputEvent::Line(self.lines.remove(0)))
        }
    }

    fn console(lines: &[&str]) -> (Console<ScriptedInput, Vec<u8>>, Rc<Cell<usize>>) {
        colored::control::set_override(false);
        let calls = Rc::new(Cell::new(0));
        let registry = RegistryBuilder::new()
            .handler(Counting { calls: calls.clone() })
            .build()
            .expect("registry");
        let session = Rc::new(RefCell::new(SessionState::single(Project::new("default", "default"))));
        let console = Console::new(
            Rc::new(registry),
            session,
            ScriptedInput::new(lines.iter().copied()),
            Vec::new(),
        );
        (console, calls)
    }

    fn output(c: &Console<ScriptedInput, Vec<u8>>) -> String {
        String::from_utf8_lossy(c.output()).into_owned()
    }

    fn history(c: &Console<ScriptedInput, Vec<u8>>) -> Vec<String> {
        c.session().borrow().history.iter().map(str::to_string).collect()
    }

    #[test]
    fn runs_handler_and_renders_outcome() {
        let (mut c, calls) = console(&["vm list"]);
        c.run().expect("run");
        assert_eq!(calls.get(), 1);
        assert!(output(&c).contains("list"));
    }

    #[test]
    fn declined_confirmation_never_reaches_the_handler() {
        let (mut c, calls) = console(&["vm delete 42", "n"]);
        c.run().expect("run");
        assert_eq!(calls.get(), 0);
        assert!(output(&c).contains(CANCELLED));
        assert_eq!(c.input().prompts()[1], "Delete VM 42? [y/N]: ");
    }

    #[test]
    fn accepted_confirmation_runs_the_handler() {
        let (mut c, calls) = console(&["vm delete 42", "yes"]);
        c.run().expect("run");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn literal_confirmation_rejects_plain_yes() {
        let (mut c, calls) = console(&["vm rebuild 3", "y", "vm rebuild 3", "rebuild"]);
        c.run().expect("run");
        assert_eq!(calls.get(), 1);
        assert!(c.input().prompts()[1].contains("Type 'rebuild' to confirm"));
    }

    #[test]
    fn rejected_arguments_skip_the_prompt() {
        let (mut c, calls) = console(&["vm delete web", "y", "vm delete 7", "n"]);
        c.run().expect("run");
        assert_eq!(calls.get(), 0);
        assert!(output(&c).contains("invalid argument: Invalid VM ID: web"));
        let prompts = c.input().prompts();
        assert!(!prompts.iter().any(|p| p.contains("Delete VM web")));
        assert!(prompts.iter().any(|p| p == "Delete VM 7? [y/N]: "));
        // "y" was read as a command line, not as an answer.
        assert_eq!(history(&c), vec!["vm delete web", "y", "vm delete 7"]);
    }

    #[test]
    fn history_is_saved_when_input_fails() {
        colored::control::set_override(false);
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("history");
        let registry = RegistryBuilder::new()
            .handler(Counting { calls: Rc::new(Cell::new(0)) })
            .build()
            .expect("registry");
        let mut state = SessionState::single(Project::new("p", "p"));
        state.history = History::load(&path, None).expect("load");
        let input = Broken {
            lines: vec!["vm list".into(), "history".into()],
        };
        let mut c = Console::new(Rc::new(registry), Rc::new(RefCell::new(state)), input, Vec::new());
        assert!(c.run().is_err());
        let saved = std::fs::read_to_string(&path).expect("history file");
        assert_eq!(saved, "vm list\nhistory\n");
    }

    #[test]
    fn wrong_arity_shows_usage_and_skips_gate_and_handler() {
        let (mut c, calls) = console(&["vm move 1", "vm delete"]);
        c.run().expect("run");
        assert_eq!(calls.get(), 0);
        let out = output(&c);
        assert!(out.contains("usage: vm move <id> <location>"));
        assert!(out.contains("usage: vm delete <id>"));
        // Only the three command prompts (two lines and the final EOF).
        assert_eq!(c.input().prompts().len(), 3);
    }

    #[test]
    fn history_records_every_line_in_order() {
        let (mut c, _) = console(&["vm list", "bogus", "vm fail", "vm delete 1", "n", "vm"]);
        c.run().expect("run");
        assert_eq!(history(&c), vec!["vm list", "bogus", "vm fail", "vm delete 1", "vm"]);
        assert_eq!(c.input().recalled().len(), 5);
    }

    #[test]
    fn unknown_command_suggests_a_close_name() {
        let (mut c, calls) = console(&["hepl"]);
        c.run().expect("run");
        let out = output(&c);
        assert!(out.contains("Unknown command: hepl"));
        assert!(out.contains("Did you mean `help`?"));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn missing_and_unknown_subcommands_render_hints() {
        let (mut c, _) = console(&["vm", "vm frobnicate"]);
        c.run().expect("run");
        let out = output(&c);
        assert!(out.contains("Missing `vm` subcommand. Use 'vm list|move|delete|rebuild|fail'"));
        assert!(out.contains("Unknown vm subcommand: frobnicate"));
    }

    #[test]
    fn handler_failure_keeps_the_loop_alive() {
        let (mut c, calls) = console(&["vm fail", "vm list"]);
        c.run().expect("run");
        assert_eq!(calls.get(), 2);
        assert!(output(&c).contains("remote error: server exploded"));
    }

    #[test]
    fn exit_aliases_stop_the_loop() {
        for word in ["exit", "quit", "q"] {
            let (mut c, calls) = console(&[word, "vm list"]);
            c.run().expect("run");
            assert_eq!(calls.get(), 0, "{word}");
            assert_eq!(c.input().remaining(), 1);
        }
    }

    #[test]
    fn blank_lines_and_interrupts_return_to_prompt() {
        colored::control::set_override(false);
        let calls = Rc::new(Cell::new(0));
        let registry = RegistryBuilder::new()
            .handler(Counting { calls: calls.clone() })
            .build()
            .expect("registry");
        let session = Rc::new(RefCell::new(SessionState::single(Project::new("p", "p"))));
        let input = ScriptedInput::from_events([
            InputEvent::Line("   ".into()),
            InputEvent::Interrupted,
            InputEvent::Line("vm list".into()),
        ]);
        let mut c = Console::new(Rc::new(registry), session, input, Vec::new());
        c.run().expect("run");
        assert_eq!(calls.get(), 1);
        assert!(output(&c).contains(CANCELLED));
        assert_eq!(history(&c), vec!["vm list"]);
    }

    #[test]
    fn history_clear_is_recorded_after_clearing() {
        let (mut c, _) = console(&["vm list", "history clear", "history"]);
        c.run().expect("run");
        let out = output(&c);
        assert!(out.contains("Command history cleared"));
        assert!(out.contains("   1  history clear"));
        assert_eq!(history(&c), vec!["history clear", "history"]);
    }

    #[test]
    fn help_lists_commands_and_subcommands() {
        let (mut c, _) = console(&["help", "help vm", "help nope"]);
        c.run().expect("run");
        let out = output(&c);
        assert!(out.contains("Available Commands"));
        assert!(out.contains("server"));
        assert!(out.contains("vm delete <id>"));
        assert!(out.contains("Unknown command: nope"));
    }

    #[test]
    fn clear_reprints_the_banner() {
        let (c, _) = console(&["clear"]);
        let mut c = c.with_banner("hicloud console");
        c.run().expect("run");
        let out = output(&c);
        assert_eq!(out.matches("hicloud console").count(), 2);
        assert!(out.contains(CLEAR_SCREEN));
    }
}

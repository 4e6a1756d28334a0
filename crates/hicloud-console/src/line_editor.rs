//! rustyline adapter: line editing, history recall, tab completion and hints.

use crate::completion::CompletionEngine;
use crate::input::{InputEvent, LineSource};
use anyhow::{anyhow, Result};
use colored::Colorize;
use rustyline::completion::Pair;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use std::borrow::Cow;

/// Dimmed guidance after the cursor. Never accepted into the buffer.
pub struct UsageHint(String);

impl rustyline::hint::Hint for UsageHint {
    fn display(&self) -> &str {
        &self.0
    }

    fn completion(&self) -> Option<&str> {
        None
    }
}

pub struct ConsoleHelper {
    engine: CompletionEngine,
}

impl ConsoleHelper {
    pub fn new(engine: CompletionEngine) -> Self {
        Self { engine }
    }
}

impl rustyline::Helper for ConsoleHelper {}

impl rustyline::validate::Validator for ConsoleHelper {}

impl rustyline::highlight::Highlighter for ConsoleHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Owned(hint.dimmed().to_string())
    }
}

impl rustyline::hint::Hinter for ConsoleHelper {
    type Hint = UsageHint;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<UsageHint> {
        if pos < line.len() {
            return None;
        }
        self.engine.hint(line, pos).map(|h| UsageHint(format!("  {h}")))
    }
}

impl rustyline::completion::Completer for ConsoleHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let completion = self.engine.complete(line, pos);
        let pairs = completion
            .candidates
            .into_iter()
            .map(|c| Pair {
                display: c.display,
                replacement: if c.is_terminal {
                    format!("{} ", c.text)
                } else {
                    c.text
                },
            })
            .collect();
        Ok((completion.start, pairs))
    }
}

pub struct RustylineSource {
    editor: Editor<ConsoleHelper, DefaultHistory>,
}

impl RustylineSource {
    pub fn new(engine: CompletionEngine) -> Result<Self> {
        let mut editor: Editor<ConsoleHelper, DefaultHistory> =
            Editor::new().map_err(|e| anyhow!("failed to init rustyline: {e}"))?;
        editor.set_helper(Some(ConsoleHelper::new(engine)));
        Ok(Self { editor })
    }

    /// Seed up-arrow recall, e.g. from a loaded history file.
    pub fn preload<'a>(&mut self, lines: impl IntoIterator<Item = &'a str>) {
        for line in lines {
            self.add_history(line);
        }
    }
}

impl LineSource for RustylineSource {
    fn read_line(&mut self, prompt: &str) -> Result<InputEvent> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(InputEvent::Line(line)),
            Err(ReadlineError::Interrupted) => Ok(InputEvent::Interrupted),
            Err(ReadlineError::Eof) => Ok(InputEvent::Eof),
            Err(e) => Err(anyhow!("readline error: {e}")),
        }
    }

    fn add_history(&mut self, line: &str) {
        if let Err(e) = self.editor.add_history_entry(line) {
            tracing::warn!("failed to record history: {e}");
        }
    }
}

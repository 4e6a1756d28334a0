//! Operator input.
//!
//! Both blocking reads of the console (the command line and confirmation
//! answers) go through a [`LineSource`] so tests can script them.

use anyhow::Result;
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Line(String),
    /// The read was aborted (Ctrl-C).
    Interrupted,
    Eof,
}

pub trait LineSource {
    fn read_line(&mut self, prompt: &str) -> Result<InputEvent>;

    /// Offer a submitted line to the editor's recall buffer.
    fn add_history(&mut self, _line: &str) {}
}

/// Plain stdin reader used when line editing is unavailable.
pub struct StdinSource {
    stdin: io::Stdin,
}

impl StdinSource {
    pub fn new() -> Self {
        Self { stdin: io::stdin() }
    }
}

impl Default for StdinSource {
    fn default() -> Self {
        Self::new()
    }
}

impl LineSource for StdinSource {
    fn read_line(&mut self, prompt: &str) -> Result<InputEvent> {
        print!("{prompt}");
        io::stdout().flush()?;

        let mut line = String::new();
        if self.stdin.lock().read_line(&mut line)? == 0 {
            return Ok(InputEvent::Eof);
        }
        Ok(InputEvent::Line(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

/// Replays a fixed list of events, then reports end of input.
#[derive(Debug, Default)]
pub struct ScriptedInput {
    events: VecDeque<InputEvent>,
    prompts: Vec<String>,
    recalled: Vec<String>,
}

impl ScriptedInput {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            events: lines.into_iter().map(|l| InputEvent::Line(l.into())).collect(),
            ..Self::default()
        }
    }

    pub fn from_events(events: impl IntoIterator<Item = InputEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Every prompt that was shown, in order.
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    pub fn recalled(&self) -> &[String] {
        &self.recalled
    }

    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

impl LineSource for ScriptedInput {
    fn read_line(&mut self, prompt: &str) -> Result<InputEvent> {
        self.prompts.push(prompt.to_string());
        Ok(self.events.pop_front().unwrap_or(InputEvent::Eof))
    }

    fn add_history(&mut self, line: &str) {
        self.recalled.push(line.to_string());
    }
}

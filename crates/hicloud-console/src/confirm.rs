//! Confirm-before-destroy.
//!
//! Every destructive path asks through a [`ConfirmationGate`]. Anything other
//! than an explicit yes (or the exact literal word, for the strong variant) is
//! a decline, and so is an interrupted or closed input.

use crate::input::{InputEvent, LineSource};
use std::io::Write;

pub struct ConfirmationGate<'a> {
    input: &'a mut dyn LineSource,
    out: &'a mut dyn Write,
}

pub fn is_affirmative(answer: &str) -> bool {
    let answer = answer.trim();
    answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes")
}

impl<'a> ConfirmationGate<'a> {
    pub fn new(input: &'a mut dyn LineSource, out: &'a mut dyn Write) -> Self {
        Self { input, out }
    }

    /// Ask `prompt [y/N]`.
    pub fn confirm(&mut self, prompt: &str) -> bool {
        match self.ask(&format!("{prompt} [y/N]: ")) {
            Some(answer) => is_affirmative(&answer),
            None => false,
        }
    }

    /// Require the operator to type `expected` exactly.
    pub fn confirm_literal(&mut self, prompt: &str, expected: &str) -> bool {
        match self.ask(&format!("{prompt}\nType '{expected}' to confirm: ")) {
            Some(answer) => answer.trim() == expected,
            None => false,
        }
    }

    fn ask(&mut self, prompt: &str) -> Option<String> {
        if let Err(e) = self.out.flush() {
            tracing::warn!("failed to flush before prompt: {e}");
        }
        match self.input.read_line(prompt) {
            Ok(InputEvent::Line(answer)) => Some(answer),
            Ok(InputEvent::Interrupted) | Ok(InputEvent::Eof) => {
                // Leave the cursor on a fresh line after ^C / ^D.
                let _ = writeln!(self.out);
                None
            }
            Err(e) => {
                tracing::warn!("confirmation read failed: {e}");
                None
            }
        }
    }
}

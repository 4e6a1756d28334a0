//! Context-aware tab completion.
//!
//! The buffer up to the cursor is classified into one of three stages:
//!
//! - `COMMAND`: the first word; candidates are command names.
//! - `SUBCOMMAND`: the second word of a command that has named subcommands.
//! - `ARGUMENT`: everything after; candidates come from the owning handler's
//!   `complete()`, which may consult the session id cache or the API.
//!
//! Completion never raises: an unknown command, a busy session or a failed
//! lookup all degrade to "no candidates".

use crate::handler::{Candidate, LookupError};
use crate::registry::{Builtin, CommandNode, Registry, SubcommandSpec, Target};
use crate::session::SessionState;
use crate::tokenizer::split_tokens;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Command,
    Subcommand,
    Argument,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionContext {
    pub stage: Stage,
    /// Positional index among the subcommand's arguments (ARGUMENT only).
    pub arg_index: usize,
    /// The partial word under the cursor.
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub context: CompletionContext,
    /// Byte offset where the replacement starts.
    pub start: usize,
    pub candidates: Vec<Candidate>,
    /// Guidance to show next to the prompt, if any.
    pub hint: Option<String>,
}

/// Where the cursor sits, before any candidate lookup.
struct Located {
    context: CompletionContext,
    start: usize,
    /// Completed words before the one under the cursor.
    words: Vec<String>,
}

enum Scope<'r> {
    Commands,
    Subcommands(&'r CommandNode),
    Arguments {
        command: &'r CommandNode,
        target: Target,
        subcommand: &'r SubcommandSpec,
        args: Vec<String>,
    },
    Nothing(String),
}

pub struct CompletionEngine {
    registry: Rc<Registry>,
    session: Rc<RefCell<SessionState>>,
}

impl CompletionEngine {
    pub fn new(registry: Rc<Registry>, session: Rc<RefCell<SessionState>>) -> Self {
        Self { registry, session }
    }

    pub fn complete(&self, buffer: &str, cursor: usize) -> Completion {
        let located = locate(buffer, cursor);
        let prefix = located.context.prefix.clone();
        let mut context = located.context;

        let (candidates, hint) = match self.scope(&located.words) {
            Scope::Commands => (
                self.registry
                    .commands()
                    .filter(|c| c.name.starts_with(&prefix))
                    .map(|c| Candidate::word(c.name.as_str()))
                    .collect(),
                None,
            ),
            Scope::Subcommands(node) => {
                context.stage = Stage::Subcommand;
                let candidates = node
                    .subcommand_names()
                    .into_iter()
                    .filter(|s| s.starts_with(&prefix))
                    .map(Candidate::word)
                    .collect();
                let hint = if prefix.is_empty() { subcommand_hint(node) } else { None };
                (candidates, hint)
            }
            Scope::Arguments {
                command,
                target,
                subcommand,
                args,
            } => {
                context.stage = Stage::Argument;
                context.arg_index = args.len();
                let within_arity = subcommand.max_args.map_or(true, |max| args.len() < max);
                let candidates = if within_arity {
                    self.argument_candidates(command, target, subcommand, &args)
                        .into_iter()
                        .filter(|c| c.text.starts_with(&prefix))
                        .collect()
                } else {
                    Vec::new()
                };
                (candidates, Some(format!("usage: {}", subcommand.usage)))
            }
            Scope::Nothing(hint) => (Vec::new(), Some(hint)),
        };

        tracing::debug!(
            stage = ?context.stage,
            prefix = %context.prefix,
            candidates = candidates.len(),
            "completion"
        );

        Completion {
            context,
            start: located.start,
            candidates,
            hint,
        }
    }

    /// Static guidance for the buffer; never performs a lookup.
    pub fn hint(&self, buffer: &str, cursor: usize) -> Option<String> {
        let located = locate(buffer, cursor);
        if !located.context.prefix.is_empty() {
            return None;
        }
        match self.scope(&located.words) {
            Scope::Commands => None,
            Scope::Subcommands(node) => subcommand_hint(node),
            Scope::Arguments { subcommand, args, .. } => {
                if subcommand.max_args.is_some_and(|max| args.len() >= max) {
                    None
                } else {
                    Some(format!("usage: {}", subcommand.usage))
                }
            }
            Scope::Nothing(hint) => Some(hint),
        }
    }

    fn scope(&self, words: &[String]) -> Scope<'_> {
        let Some(first) = words.first() else {
            return Scope::Commands;
        };
        let command = match self.resolve_command(first) {
            Ok(c) => c,
            Err(hint) => return Scope::Nothing(hint),
        };
        let Some(target) = self.registry.target_of(&command.name) else {
            return Scope::Nothing(format!("Unknown command `{first}`"));
        };

        // Bare-only commands take their arguments straight after the name.
        if command.subcommand_names().is_empty() {
            return match command.default_subcommand() {
                Some(subcommand) => Scope::Arguments {
                    command,
                    target,
                    subcommand,
                    args: words[1..].to_vec(),
                },
                None => Scope::Nothing(command.missing_subcommand_hint()),
            };
        }

        let Some(sub_word) = words.get(1) else {
            return Scope::Subcommands(command);
        };
        match resolve_subcommand(command, sub_word) {
            Some(subcommand) => Scope::Arguments {
                command,
                target,
                subcommand,
                args: words[2..].to_vec(),
            },
            None => Scope::Nothing(format!(
                "Unknown `{}` subcommand `{sub_word}`. Use '{} {}'",
                command.name,
                command.name,
                command.subcommand_names().join("|")
            )),
        }
    }

    /// Exact name or alias first, then a unique prefix of a primary name.
    fn resolve_command(&self, word: &str) -> Result<&CommandNode, String> {
        if let Some(c) = self.registry.command(word) {
            return Ok(c);
        }
        let matches: Vec<&CommandNode> = self
            .registry
            .commands()
            .filter(|c| c.name.starts_with(word))
            .collect();
        match matches.as_slice() {
            [only] => Ok(*only),
            [] => Err(format!("Unknown command `{word}`")),
            many => Err(format!(
                "Ambiguous command `{word}`: {}",
                many.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", ")
            )),
        }
    }

    fn argument_candidates(
        &self,
        command: &CommandNode,
        target: Target,
        subcommand: &SubcommandSpec,
        args: &[String],
    ) -> Vec<Candidate> {
        let arg_index = args.len();
        match target {
            Target::Builtin(Builtin::Help) if arg_index == 0 => self
                .registry
                .commands()
                .map(|c| Candidate::word(c.name.as_str()))
                .collect(),
            Target::Builtin(_) => Vec::new(),
            Target::Handler(id) => {
                let Some(handler) = self.registry.handler(id) else {
                    return Vec::new();
                };
                let result = match self.session.try_borrow_mut() {
                    Ok(mut session) => {
                        handler.complete(&mut session.id_cache, &subcommand.name, arg_index, args)
                    }
                    Err(_) => Err(LookupError::Busy),
                };
                match result {
                    Ok(candidates) => candidates,
                    Err(e) => {
                        tracing::debug!(command = %command.name, "completion lookup failed: {e}");
                        Vec::new()
                    }
                }
            }
        }
    }
}

fn resolve_subcommand<'n>(command: &'n CommandNode, word: &str) -> Option<&'n SubcommandSpec> {
    if let Some(s) = command.subcommand(word) {
        return Some(s);
    }
    let mut matches = command
        .subcommands
        .iter()
        .filter(|s| !s.is_bare() && s.name.starts_with(word));
    match (matches.next(), matches.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}

fn locate(buffer: &str, cursor: usize) -> Located {
    let mut cursor = cursor.min(buffer.len());
    while !buffer.is_char_boundary(cursor) {
        cursor -= 1;
    }
    let head = &buffer[..cursor];
    let tokens = split_tokens(head);

    let at_fresh_word = match tokens.last() {
        None => true,
        Some(last) => !last.unterminated && last.end < head.len(),
    };

    let (words, prefix, start) = if at_fresh_word {
        (
            tokens.into_iter().map(|t| t.text).collect::<Vec<_>>(),
            String::new(),
            cursor,
        )
    } else {
        let mut words: Vec<String> = tokens.iter().map(|t| t.text.clone()).collect();
        let start = tokens.last().map_or(cursor, |t| t.start);
        let prefix = words.pop().unwrap_or_default();
        (words, prefix, start)
    };

    let stage = if words.is_empty() {
        Stage::Command
    } else if words.len() == 1 {
        Stage::Subcommand
    } else {
        Stage::Argument
    };

    Located {
        context: CompletionContext {
            stage,
            arg_index: words.len().saturating_sub(1),
            prefix,
        },
        start,
        words,
    }
}

/// Commands that run without a subcommand have nothing missing.
fn subcommand_hint(node: &CommandNode) -> Option<String> {
    match node.default_subcommand() {
        Some(_) => None,
        None => Some(node.missing_subcommand_hint()),
    }
}

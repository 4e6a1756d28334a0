//! The command tree.
//!
//! Built once from the registered handlers plus the console's own built-ins and
//! never mutated afterwards. Lookup at dispatch time is exact (name or alias);
//! prefix matching only happens in the completion engine.

use crate::handler::ResourceHandler;
use crate::tokenizer::ParsedInput;
use std::collections::HashSet;

pub type HandlerId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Help,
    History,
    Clear,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Builtin(Builtin),
    Handler(HandlerId),
}

/// How a subcommand is guarded before it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    None,
    /// `[y/N]` question.
    YesNo,
    /// The operator must type this word.
    Literal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubcommandSpec {
    /// Empty for a command's bare form (`help`, `exit`).
    pub name: String,
    pub min_args: usize,
    /// `None` is unbounded.
    pub max_args: Option<usize>,
    pub usage: String,
    pub summary: String,
    pub confirmation: Confirmation,
}

impl SubcommandSpec {
    pub fn new(name: impl Into<String>, usage: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_args: 0,
            max_args: Some(0),
            usage: usage.into(),
            summary: String::new(),
            confirmation: Confirmation::None,
        }
    }

    /// The unnamed form of a command.
    pub fn bare(usage: impl Into<String>) -> Self {
        Self::new("", usage)
    }

    pub fn args(mut self, min: usize, max: Option<usize>) -> Self {
        self.min_args = min;
        self.max_args = max;
        self
    }

    pub fn exactly(self, n: usize) -> Self {
        self.args(n, Some(n))
    }

    pub fn summary(mut self, text: impl Into<String>) -> Self {
        self.summary = text.into();
        self
    }

    pub fn destructive(mut self) -> Self {
        self.confirmation = Confirmation::YesNo;
        self
    }

    pub fn literal(mut self, word: impl Into<String>) -> Self {
        self.confirmation = Confirmation::Literal(word.into());
        self
    }

    pub fn is_destructive(&self) -> bool {
        self.confirmation != Confirmation::None
    }

    pub fn is_bare(&self) -> bool {
        self.name.is_empty()
    }

    pub fn accepts(&self, n: usize) -> bool {
        n >= self.min_args && self.max_args.map_or(true, |max| n <= max)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandNode {
    pub name: String,
    pub summary: String,
    pub aliases: Vec<String>,
    /// Registration order is display and completion order.
    pub subcommands: Vec<SubcommandSpec>,
    /// Used when no subcommand is given. Implied when there is exactly one.
    pub default: Option<String>,
}

impl CommandNode {
    pub fn new(name: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            summary: summary.into(),
            aliases: Vec::new(),
            subcommands: Vec::new(),
            default: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn sub(mut self, spec: SubcommandSpec) -> Self {
        self.subcommands.push(spec);
        self
    }

    pub fn default_sub(mut self, name: impl Into<String>) -> Self {
        self.default = Some(name.into());
        self
    }

    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|a| a == name)
    }

    pub fn subcommand(&self, name: &str) -> Option<&SubcommandSpec> {
        self.subcommands.iter().find(|s| !s.is_bare() && s.name == name)
    }

    /// Named subcommands in registration order.
    pub fn subcommand_names(&self) -> Vec<&str> {
        self.subcommands
            .iter()
            .filter(|s| !s.is_bare())
            .map(|s| s.name.as_str())
            .collect()
    }

    pub fn default_subcommand(&self) -> Option<&SubcommandSpec> {
        match &self.default {
            Some(name) => self.subcommands.iter().find(|s| &s.name == name),
            None if self.subcommands.len() == 1 => self.subcommands.first(),
            None => None,
        }
    }

    /// `Missing `vm` subcommand. Use 'vm list|info|…'`.
    pub fn missing_subcommand_hint(&self) -> String {
        format!(
            "Missing `{}` subcommand. Use '{} {}'",
            self.name,
            self.name,
            self.subcommand_names().join("|")
        )
    }
}

#[derive(Debug)]
pub enum Resolution<'r> {
    NoSuchCommand {
        name: String,
    },
    NoSuchSubcommand {
        command: &'r CommandNode,
        given: Option<String>,
        valid: Vec<String>,
    },
    Resolved {
        command: &'r CommandNode,
        target: Target,
        subcommand: &'r SubcommandSpec,
        args: Vec<String>,
    },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no command handlers registered")]
    NoHandlers,
    #[error("command `{0}` registered twice")]
    DuplicateCommand(String),
    #[error("command `{command}` declares subcommand `{subcommand}` twice")]
    DuplicateSubcommand { command: String, subcommand: String },
    #[error("command `{command}` has unknown default subcommand `{default}`")]
    UnknownDefault { command: String, default: String },
    #[error("`{command} {subcommand}`: min_args {min} exceeds max_args {max}")]
    BadArity {
        command: String,
        subcommand: String,
        min: usize,
        max: usize,
    },
    #[error("command `{0}` declares no subcommands")]
    Empty(String),
}

struct Entry {
    node: CommandNode,
    target: Target,
}

pub struct Registry {
    entries: Vec<Entry>,
    handlers: Vec<Box<dyn ResourceHandler>>,
}

#[derive(Default)]
pub struct RegistryBuilder {
    handlers: Vec<Box<dyn ResourceHandler>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler<H: ResourceHandler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn boxed(mut self, handler: Box<dyn ResourceHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn build(self) -> Result<Registry, RegistryError> {
        if self.handlers.is_empty() {
            return Err(RegistryError::NoHandlers);
        }

        let mut entries: Vec<Entry> = self
            .handlers
            .iter()
            .enumerate()
            .map(|(id, h)| Entry {
                node: h.describe(),
                target: Target::Handler(id),
            })
            .collect();
        entries.extend(builtin_nodes().into_iter().map(|(node, b)| Entry {
            node,
            target: Target::Builtin(b),
        }));

        let mut names = HashSet::new();
        for entry in &entries {
            validate_node(&entry.node)?;
            for name in std::iter::once(&entry.node.name).chain(&entry.node.aliases) {
                if !names.insert(name.clone()) {
                    return Err(RegistryError::DuplicateCommand(name.clone()));
                }
            }
        }

        tracing::debug!(commands = entries.len(), "command registry built");
        Ok(Registry {
            entries,
            handlers: self.handlers,
        })
    }
}

fn validate_node(node: &CommandNode) -> Result<(), RegistryError> {
    if node.subcommands.is_empty() {
        return Err(RegistryError::Empty(node.name.clone()));
    }
    let mut seen = HashSet::new();
    for sub in &node.subcommands {
        if !seen.insert(sub.name.as_str()) {
            return Err(RegistryError::DuplicateSubcommand {
                command: node.name.clone(),
                subcommand: sub.name.clone(),
            });
        }
        if let Some(max) = sub.max_args {
            if sub.min_args > max {
                return Err(RegistryError::BadArity {
                    command: node.name.clone(),
                    subcommand: sub.name.clone(),
                    min: sub.min_args,
                    max,
                });
            }
        }
    }
    if let Some(default) = &node.default {
        if !node.subcommands.iter().any(|s| &s.name == default) {
            return Err(RegistryError::UnknownDefault {
                command: node.name.clone(),
                default: default.clone(),
            });
        }
    }
    Ok(())
}

fn builtin_nodes() -> Vec<(CommandNode, Builtin)> {
    vec![
        (
            CommandNode::new("help", "Show available commands or the subcommands of one")
                .sub(SubcommandSpec::bare("help [command]").args(0, Some(1))),
            Builtin::Help,
        ),
        (
            CommandNode::new("history", "Show or clear the command history")
                .sub(SubcommandSpec::bare("history").summary("Show command history"))
                .sub(SubcommandSpec::new("clear", "history clear").summary("Clear command history"))
                .default_sub(""),
            Builtin::History,
        ),
        (
            CommandNode::new("clear", "Clear the screen")
                .alias("reset")
                .sub(SubcommandSpec::bare("clear")),
            Builtin::Clear,
        ),
        (
            CommandNode::new("exit", "Leave the console")
                .alias("quit")
                .alias("q")
                .sub(SubcommandSpec::bare("exit")),
            Builtin::Exit,
        ),
    ]
}

impl Registry {
    pub fn resolve(&self, parsed: &ParsedInput) -> Resolution<'_> {
        let Some(name) = parsed.command.as_deref() else {
            return Resolution::NoSuchCommand {
                name: String::new(),
            };
        };
        let Some(entry) = self.entries.iter().find(|e| e.node.answers_to(name)) else {
            return Resolution::NoSuchCommand {
                name: name.to_string(),
            };
        };
        let node = &entry.node;
        let no_such = |given: Option<&str>| Resolution::NoSuchSubcommand {
            command: node,
            given: given.map(str::to_string),
            valid: node.subcommand_names().into_iter().map(str::to_string).collect(),
        };

        match parsed.subcommand.as_deref() {
            Some(sub_name) => {
                if let Some(sub) = node.subcommand(sub_name) {
                    return Resolution::Resolved {
                        command: node,
                        target: entry.target,
                        subcommand: sub,
                        args: parsed.args.clone(),
                    };
                }
                // Not a subcommand: maybe the first argument of the default.
                match node.default_subcommand() {
                    Some(default) if default.accepts(parsed.args.len() + 1) => {
                        let mut args = Vec::with_capacity(parsed.args.len() + 1);
                        args.push(sub_name.to_string());
                        args.extend(parsed.args.iter().cloned());
                        Resolution::Resolved {
                            command: node,
                            target: entry.target,
                            subcommand: default,
                            args,
                        }
                    }
                    _ => no_such(Some(sub_name)),
                }
            }
            None => match node.default_subcommand() {
                Some(default) => Resolution::Resolved {
                    command: node,
                    target: entry.target,
                    subcommand: default,
                    args: Vec::new(),
                },
                None => no_such(None),
            },
        }
    }

    /// Exact lookup by name or alias.
    pub fn command(&self, name: &str) -> Option<&CommandNode> {
        self.entries
            .iter()
            .find(|e| e.node.answers_to(name))
            .map(|e| &e.node)
    }

    pub fn target_of(&self, name: &str) -> Option<Target> {
        self.entries
            .iter()
            .find(|e| e.node.answers_to(name))
            .map(|e| e.target)
    }

    /// All commands in registration order.
    pub fn commands(&self) -> impl Iterator<Item = &CommandNode> {
        self.entries.iter().map(|e| &e.node)
    }

    pub fn command_names(&self) -> Vec<&str> {
        self.commands().map(|c| c.name.as_str()).collect()
    }

    pub fn handler(&self, id: HandlerId) -> Option<&dyn ResourceHandler> {
        self.handlers.get(id).map(|h| h.as_ref())
    }

    /// The closest command name by Jaro-Winkler similarity, if close enough.
    pub fn suggest(&self, name: &str) -> Option<&str> {
        self.commands()
            .flat_map(|c| std::iter::once(&c.name).chain(&c.aliases))
            .map(|candidate| (candidate, strsim::jaro_winkler(name, candidate)))
            .filter(|(_, score)| *score >= 0.8)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(candidate, _)| candidate.as_str())
    }
}

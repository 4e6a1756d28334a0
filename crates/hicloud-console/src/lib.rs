//! # hicloud-console
//!
//! Dispatch and completion engine for an interactive cloud-resource console.
//!
//! - [`tokenizer`]: splits a line into command, subcommand and arguments.
//! - [`registry`]: the static command tree built from the registered handlers.
//! - [`completion`]: context-aware tab completion with cached id lookups.
//! - [`confirm`]: the confirm-before-destroy gate.
//! - [`session`]: active project, history and the id cache.
//! - [`dispatch`]: the PROMPT / EXECUTING / EXIT loop.
//!
//! Resource handlers live outside this crate and plug in through
//! [`ResourceHandler`].

pub mod completion;
pub mod confirm;
pub mod dispatch;
pub mod handler;
pub mod input;
#[cfg(feature = "repl-rustyline")]
pub mod line_editor;
pub mod registry;
pub mod render;
pub mod session;
pub mod tokenizer;

pub use completion::{Completion, CompletionContext, CompletionEngine, Stage};
pub use confirm::{is_affirmative, ConfirmationGate};
pub use dispatch::{Console, ConsoleState, DEFAULT_PROMPT};
pub use handler::{
    Candidate, Details, ErrorKind, ExecContext, LookupError, Outcome, Render, ResourceHandler,
    Table,
};
pub use input::{InputEvent, LineSource, ScriptedInput, StdinSource};
#[cfg(feature = "repl-rustyline")]
pub use line_editor::{ConsoleHelper, RustylineSource};
pub use registry::{
    Builtin, CommandNode, Confirmation, Registry, RegistryBuilder, RegistryError, Resolution,
    SubcommandSpec, Target,
};
pub use render::{render, render_outcome};
pub use session::{
    History, IdCache, IdEntry, Project, ResourceKind, SessionError, SessionState,
    DEFAULT_HISTORY_MAX_LINES,
};
pub use tokenizer::{split_tokens, tokenize, ParsedInput, Token};

//! The seam between the console core and the per-resource command handlers.

use crate::confirm::ConfirmationGate;
use crate::registry::CommandNode;
use crate::session::{IdCache, SessionState};

/// Why a handler invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Wrong argument count or shape; rendered as a hint.
    Usage,
    InvalidArgument,
    NotFound,
    /// The remote call failed.
    Remote,
    Internal,
}

impl ErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Usage => "usage",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::NotFound => "not found",
            ErrorKind::Remote => "remote error",
            ErrorKind::Internal => "internal error",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub title: Option<String>,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            title: None,
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        self.rows.push(cells.into_iter().map(|c| c.to_string()).collect());
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Key/value listing for a single resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Details {
    pub title: String,
    pub fields: Vec<(String, String)>,
}

impl Details {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.fields.push((key.into(), value.to_string()));
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl ToString) {
        self.fields.push((key.into(), value.to_string()));
    }
}

/// Renderable result data. Formatting lives in [`crate::render`].
#[derive(Debug, Clone, PartialEq)]
pub enum Render {
    Empty,
    Message(String),
    Table(Table),
    Details(Details),
    Sequence(Vec<Render>),
}

impl Render {
    pub fn message(text: impl Into<String>) -> Self {
        Render::Message(text.into())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Render),
    Failure { kind: ErrorKind, message: String },
    /// A confirmation inside the handler was declined.
    Cancelled,
}

impl Outcome {
    pub fn message(text: impl Into<String>) -> Self {
        Outcome::Success(Render::message(text))
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Outcome::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

impl From<Render> for Outcome {
    fn from(render: Render) -> Self {
        Outcome::Success(render)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Inserted into the buffer.
    pub text: String,
    /// Shown in the candidate listing.
    pub display: String,
    /// Selecting it completes the current word.
    pub is_terminal: bool,
}

impl Candidate {
    pub fn word(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            display: text.clone(),
            text,
            is_terminal: true,
        }
    }

    /// An id shown together with a human label: `42  (web-1)`.
    pub fn labelled(id: impl Into<String>, label: &str) -> Self {
        let text = id.into();
        let display = if label.is_empty() {
            text.clone()
        } else {
            format!("{text}  ({label})")
        };
        Self {
            text,
            display,
            is_terminal: true,
        }
    }
}

/// A completion-time lookup could not be served.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LookupError {
    #[error("lookup unavailable: {0}")]
    Unavailable(String),
    #[error("session state is busy")]
    Busy,
}

/// What a handler may touch while executing.
pub struct ExecContext<'a> {
    pub session: &'a mut SessionState,
    pub gate: ConfirmationGate<'a>,
}

/// One resource kind's commands.
///
/// `describe` is called once while the registry is built. `complete` must be
/// read-only with respect to remote state.
pub trait ResourceHandler {
    fn describe(&self) -> CommandNode;

    fn execute(&self, ctx: &mut ExecContext<'_>, subcommand: &str, args: &[String]) -> Outcome;

    /// Candidates for positional argument `arg_index` of `subcommand`;
    /// `args` holds the arguments already typed before it.
    fn complete(
        &self,
        _cache: &mut IdCache,
        _subcommand: &str,
        _arg_index: usize,
        _args: &[String],
    ) -> Result<Vec<Candidate>, LookupError> {
        Ok(Vec::new())
    }

    /// Rejects argument shapes the handler cannot act on. Runs before the
    /// confirmation gate; an `Err` is shown and nothing else happens.
    fn check(&self, _subcommand: &str, _args: &[String]) -> Result<(), Outcome> {
        Ok(())
    }

    /// Prompt text for a destructive subcommand; `None` uses a generic one.
    fn confirm_prompt(&self, _subcommand: &str, _args: &[String]) -> Option<String> {
        None
    }
}

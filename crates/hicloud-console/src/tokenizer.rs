//! Line splitting.
//!
//! Whitespace separates tokens. A token that *starts* with `"` runs to the next
//! `"` and the quotes are dropped; an unterminated quote swallows the rest of
//! the line. Quotes anywhere else are ordinary characters and there is no
//! escape processing.

/// One token plus its byte span in the source line.
///
/// For quoted tokens the span covers the quotes, so `start..end` is what a
/// completion must replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub quoted: bool,
    /// Opened with `"` but never closed.
    pub unterminated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedInput {
    pub command: Option<String>,
    pub subcommand: Option<String>,
    pub args: Vec<String>,
    /// The line ends in whitespace after at least one token.
    pub raw_trailing_space: bool,
    pub unterminated_quote: bool,
}

impl ParsedInput {
    pub fn is_empty(&self) -> bool {
        self.command.is_none()
    }

    pub fn token_count(&self) -> usize {
        usize::from(self.command.is_some()) + usize::from(self.subcommand.is_some()) + self.args.len()
    }
}

/// Split `line` into spanned tokens. Never fails.
pub fn split_tokens(line: &str) -> Vec<Token> {
    let mut out = Vec::new();
    let mut chars = line.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '"' {
            chars.next();
            let body_start = start + 1;
            let mut close = None;
            for (i, ch) in chars.by_ref() {
                if ch == '"' {
                    close = Some(i);
                    break;
                }
            }
            match close {
                Some(i) => out.push(Token {
                    text: line[body_start..i].to_string(),
                    start,
                    end: i + 1,
                    quoted: true,
                    unterminated: false,
                }),
                None => out.push(Token {
                    text: line[body_start..].to_string(),
                    start,
                    end: line.len(),
                    quoted: true,
                    unterminated: true,
                }),
            }
            continue;
        }

        let mut end = line.len();
        while let Some(&(i, ch)) = chars.peek() {
            if ch.is_whitespace() {
                end = i;
                break;
            }
            chars.next();
        }
        out.push(Token {
            text: line[start..end].to_string(),
            start,
            end,
            quoted: false,
            unterminated: false,
        });
    }

    out
}

pub fn tokenize(line: &str) -> ParsedInput {
    let tokens = split_tokens(line);
    let unterminated_quote = tokens.last().is_some_and(|t| t.unterminated);
    let raw_trailing_space = !tokens.is_empty()
        && !unterminated_quote
        && line.chars().next_back().is_some_and(char::is_whitespace);

    let mut iter = tokens.into_iter().map(|t| t.text);
    ParsedInput {
        command: iter.next(),
        subcommand: iter.next(),
        args: iter.collect(),
        raw_trailing_space,
        unterminated_quote,
    }
}

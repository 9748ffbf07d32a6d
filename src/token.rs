//! Tokens, delimiters and token trees.

use std::fmt;
use std::ops::Range;

use crate::error::{MacroError, Result};

/// A position in the source text (line and column, both 1-indexed).
///
/// Synthetic tokens built in code carry the default position `0:0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, PartialOrd, Ord)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Name,
    Number,
    String,
    Op,
    /// `(`, `[`, `{`, or the start of an f-string
    Open,
    /// `)`, `]`, `}`, or the end of an f-string
    Close,
    Indent,
    Dedent,
    Newline,
    /// `$`, reserved for pattern syntax
    Dollar,
}

/// A lexical token.
///
/// Equality compares kind and text only; the position is metadata for error
/// reporting and never affects matching.
#[derive(Debug, Clone, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub position: Position,
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.text == other.text
    }
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, position: Position) -> Self {
        Self {
            kind,
            text: text.into(),
            position,
        }
    }

    pub fn name(text: impl Into<String>) -> Self {
        Self::new(TokenKind::Name, text, Position::default())
    }

    pub fn number(text: impl Into<String>) -> Self {
        Self::new(TokenKind::Number, text, Position::default())
    }

    pub fn string(text: impl Into<String>) -> Self {
        Self::new(TokenKind::String, text, Position::default())
    }

    pub fn op(text: impl Into<String>) -> Self {
        Self::new(TokenKind::Op, text, Position::default())
    }

    pub fn open(text: impl Into<String>) -> Self {
        Self::new(TokenKind::Open, text, Position::default())
    }

    pub fn close(text: impl Into<String>) -> Self {
        Self::new(TokenKind::Close, text, Position::default())
    }

    pub fn indent() -> Self {
        Self::new(TokenKind::Indent, "", Position::default())
    }

    pub fn dedent() -> Self {
        Self::new(TokenKind::Dedent, "", Position::default())
    }

    pub fn newline() -> Self {
        Self::new(TokenKind::Newline, "\n", Position::default())
    }

    pub fn dollar() -> Self {
        Self::new(TokenKind::Dollar, "$", Position::default())
    }

    /// The same token, relocated to `position`.
    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn is_op(&self, text: &str) -> bool {
        self.kind == TokenKind::Op && self.text == text
    }

    pub fn is_name(&self, text: &str) -> bool {
        self.kind == TokenKind::Name && self.text == text
    }

    /// True for any token that opens or closes a delimiter pair.
    pub fn is_delimiter(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Open | TokenKind::Close | TokenKind::Indent | TokenKind::Dedent
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Indent => f.write_str("<indent>"),
            TokenKind::Dedent => f.write_str("<dedent>"),
            TokenKind::Newline => f.write_str("<newline>"),
            _ => f.write_str(&self.text),
        }
    }
}

/// Delimiter categories that must stay balanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delimiter {
    Paren,
    Bracket,
    Brace,
    Indent,
    /// A string literal with embedded expressions
    FString,
}

impl Delimiter {
    /// The delimiter opened by `token`, if it is an opener.
    pub fn opened_by(token: &Token) -> Option<Self> {
        match token.kind {
            TokenKind::Open => Some(match token.text.as_str() {
                "(" => Self::Paren,
                "[" => Self::Bracket,
                "{" => Self::Brace,
                _ => Self::FString,
            }),
            TokenKind::Indent => Some(Self::Indent),
            _ => None,
        }
    }

    /// The delimiter closed by `token`, if it is a closer.
    pub fn closed_by(token: &Token) -> Option<Self> {
        match token.kind {
            TokenKind::Close => Some(match token.text.as_str() {
                ")" => Self::Paren,
                "]" => Self::Bracket,
                "}" => Self::Brace,
                _ => Self::FString,
            }),
            TokenKind::Dedent => Some(Self::Indent),
            _ => None,
        }
    }
}

/// Pairs every opener of a token stream with its closer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimiterIndex {
    partner: Vec<Option<usize>>,
}

impl DelimiterIndex {
    /// Builds the index in one pass with a stack.
    ///
    /// Fails if a closer has no matching opener, closes a different category
    /// than the innermost open delimiter, or the stream ends with open
    /// delimiters.
    pub fn build(tokens: &[Token]) -> Result<Self> {
        let mut partner = vec![None; tokens.len()];
        let mut stack: Vec<(Delimiter, usize)> = Vec::new();

        for (index, token) in tokens.iter().enumerate() {
            if let Some(delimiter) = Delimiter::opened_by(token) {
                stack.push((delimiter, index));
            } else if let Some(delimiter) = Delimiter::closed_by(token) {
                match stack.pop() {
                    Some((open, open_index)) if open == delimiter => {
                        partner[open_index] = Some(index);
                        partner[index] = Some(open_index);
                    }
                    Some((_, open_index)) => {
                        return Err(MacroError::ImbalancedDelimiter {
                            message: format!(
                                "`{token}` does not close `{}` opened at {}",
                                tokens[open_index], tokens[open_index].position
                            ),
                            position: token.position,
                        });
                    }
                    None => {
                        return Err(MacroError::ImbalancedDelimiter {
                            message: format!("unexpected `{token}`"),
                            position: token.position,
                        });
                    }
                }
            }
        }

        if let Some((_, index)) = stack.pop() {
            return Err(MacroError::ImbalancedDelimiter {
                message: format!("`{}` is never closed", tokens[index]),
                position: tokens[index].position,
            });
        }

        Ok(Self { partner })
    }

    /// The index of the token paired with the delimiter at `index`.
    pub fn partner(&self, index: usize) -> Option<usize> {
        self.partner.get(index).copied().flatten()
    }
}

/// Returns the span of the token tree starting at `start`: a single
/// non-delimiter token, or an opener through its matching closer.
pub fn token_tree(tokens: &[Token], start: usize) -> Result<Range<usize>> {
    let Some(first) = tokens.get(start) else {
        return Err(MacroError::ImbalancedDelimiter {
            message: "expected a token tree, found end of input".to_string(),
            position: tokens.last().map(|t| t.position).unwrap_or_default(),
        });
    };

    if Delimiter::closed_by(first).is_some() {
        return Err(MacroError::ImbalancedDelimiter {
            message: format!("unexpected `{first}`"),
            position: first.position,
        });
    }
    if Delimiter::opened_by(first).is_none() {
        return Ok(start..start + 1);
    }

    let mut stack = Vec::new();
    for (index, token) in tokens.iter().enumerate().skip(start) {
        if let Some(delimiter) = Delimiter::opened_by(token) {
            stack.push(delimiter);
        } else if let Some(delimiter) = Delimiter::closed_by(token) {
            if stack.pop() != Some(delimiter) {
                return Err(MacroError::ImbalancedDelimiter {
                    message: format!("unexpected `{token}`"),
                    position: token.position,
                });
            }
            if stack.is_empty() {
                return Ok(start..index + 1);
            }
        }
    }

    Err(MacroError::ImbalancedDelimiter {
        message: format!("`{first}` is never closed"),
        position: first.position,
    })
}

/// Renders tokens back into source text.
///
/// Tokens are separated by single spaces; `Newline`, `Indent` and `Dedent`
/// restore line breaks and four-space indentation.
pub fn render(tokens: &[Token]) -> String {
    let mut out = String::new();
    let mut level = 0usize;
    let mut line_start = true;

    for token in tokens {
        match token.kind {
            TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent => {
                match token.kind {
                    TokenKind::Indent => level += 1,
                    TokenKind::Dedent => level = level.saturating_sub(1),
                    _ => {}
                }
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
                line_start = true;
            }
            _ => {
                if line_start {
                    out.push_str(&"    ".repeat(level));
                } else {
                    out.push(' ');
                }
                out.push_str(&token.text);
                line_start = false;
            }
        }
    }
    out
}

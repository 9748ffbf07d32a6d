//! A small tokenizer for Python-like source.
//!
//! Expansion itself works on token streams produced elsewhere; this lexer
//! exists so declarations and inputs can be written as text. Streams are
//! simplified for matching: comments and non-logical line breaks are dropped,
//! a `Newline` directly before an `Indent`/`Dedent` is omitted, and so is the
//! final `Newline` of the input.

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::error::{MacroError, Result};
use crate::token::{Position, Token, TokenKind};

#[derive(Parser)]
#[grammar = "lexer.pest"]
struct SourceParser;

/// Tokenize `source`.
pub fn lex(source: &str) -> Result<Vec<Token>> {
    let mut pairs = SourceParser::parse(Rule::file, source).map_err(lex_error)?;
    let Some(file) = pairs.next() else {
        return Ok(Vec::new());
    };

    let mut lines = LineTracker::default();
    for pair in file.into_inner() {
        lines.feed(pair)?;
    }
    Ok(simplify(lines.finish()))
}

fn lex_error(err: pest::error::Error<Rule>) -> MacroError {
    let (line, column) = match err.line_col {
        pest::error::LineColLocation::Pos(pos) => pos,
        pest::error::LineColLocation::Span(start, _) => start,
    };
    MacroError::Lex {
        message: err.variant.message().into_owned(),
        position: Position::new(line as u32, column as u32),
    }
}

fn position_of(pair: &Pair<Rule>) -> Position {
    let (line, column) = pair.line_col();
    Position::new(line as u32, column as u32)
}

/// Turns raw lexemes into logical lines with explicit indentation tokens.
struct LineTracker {
    tokens: Vec<Token>,
    indents: Vec<usize>,
    /// Bracket nesting; line breaks inside brackets are not logical.
    depth: usize,
    at_line_start: bool,
    leading_width: usize,
    line_has_tokens: bool,
    last_position: Position,
}

impl Default for LineTracker {
    fn default() -> Self {
        Self {
            tokens: Vec::new(),
            indents: vec![0],
            depth: 0,
            at_line_start: true,
            leading_width: 0,
            line_has_tokens: false,
            last_position: Position::new(1, 1),
        }
    }
}

impl LineTracker {
    fn feed(&mut self, pair: Pair<Rule>) -> Result<()> {
        let position = position_of(&pair);
        self.last_position = position;

        let kind = match pair.as_rule() {
            Rule::line_break => {
                if self.depth == 0 {
                    if self.line_has_tokens {
                        self.tokens
                            .push(Token::new(TokenKind::Newline, "\n", position));
                        self.line_has_tokens = false;
                    }
                    self.at_line_start = true;
                    self.leading_width = 0;
                }
                return Ok(());
            }
            Rule::blank => {
                if self.at_line_start {
                    self.leading_width = indentation_width(pair.as_str());
                }
                return Ok(());
            }
            Rule::comment | Rule::continuation | Rule::EOI => return Ok(()),
            Rule::string => TokenKind::String,
            Rule::number => TokenKind::Number,
            Rule::name => TokenKind::Name,
            Rule::open => TokenKind::Open,
            Rule::close => TokenKind::Close,
            Rule::dollar => TokenKind::Dollar,
            Rule::operator => TokenKind::Op,
            _ => return Ok(()),
        };

        if self.at_line_start {
            self.indent_to(self.leading_width, position)?;
            self.at_line_start = false;
        }
        match kind {
            TokenKind::Open => self.depth += 1,
            TokenKind::Close => self.depth = self.depth.saturating_sub(1),
            _ => {}
        }
        self.line_has_tokens = true;
        self.tokens.push(Token::new(kind, pair.as_str(), position));
        Ok(())
    }

    fn indent_to(&mut self, width: usize, position: Position) -> Result<()> {
        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            self.indents.push(width);
            self.tokens.push(Token::new(TokenKind::Indent, "", position));
            return Ok(());
        }

        while width < self.indents.last().copied().unwrap_or(0) {
            self.indents.pop();
            self.tokens.push(Token::new(TokenKind::Dedent, "", position));
        }
        if width != self.indents.last().copied().unwrap_or(0) {
            return Err(MacroError::Lex {
                message: "unindent does not match any outer indentation level".to_string(),
                position,
            });
        }
        Ok(())
    }

    fn finish(mut self) -> Vec<Token> {
        let position = self.last_position;
        if self.line_has_tokens {
            self.tokens
                .push(Token::new(TokenKind::Newline, "\n", position));
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.tokens.push(Token::new(TokenKind::Dedent, "", position));
        }
        self.tokens
    }
}

/// Tabs advance to the next multiple of eight columns.
fn indentation_width(blank: &str) -> usize {
    blank.chars().fold(0, |width, c| match c {
        '\t' => (width / 8 + 1) * 8,
        '\x0C' => 0,
        _ => width + 1,
    })
}

fn simplify(tokens: Vec<Token>) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter().peekable();

    while let Some(token) = iter.next() {
        if token.kind == TokenKind::Newline {
            match iter.peek() {
                None => continue,
                Some(next) if matches!(next.kind, TokenKind::Indent | TokenKind::Dedent) => {
                    continue;
                }
                Some(_) => {}
            }
        }
        out.push(token);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    fn texts(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn test_lex_simple_expression() {
        let tokens = lex("x = foo!(1, 'a')").unwrap();
        assert_eq!(
            texts(&tokens),
            vec!["x", "=", "foo", "!", "(", "1", ",", "'a'", ")"]
        );
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Name,
                TokenKind::Op,
                TokenKind::Name,
                TokenKind::Op,
                TokenKind::Open,
                TokenKind::Number,
                TokenKind::Op,
                TokenKind::String,
                TokenKind::Close,
            ]
        );
    }

    #[test]
    fn test_lex_positions() {
        let tokens = lex("a\nbc d").unwrap();
        assert_eq!(tokens[2].position, Position::new(2, 1));
        assert_eq!(tokens[3].position, Position::new(2, 4));
    }

    #[test]
    fn test_lex_indentation_block() {
        let source = "if x:\n    a\n    b\nc\n";
        let tokens = lex(source).unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Name,
                TokenKind::Name,
                TokenKind::Op,
                TokenKind::Indent,
                TokenKind::Name,
                TokenKind::Newline,
                TokenKind::Name,
                TokenKind::Dedent,
                TokenKind::Name,
            ]
        );
    }

    #[test]
    fn test_lex_closes_open_blocks_at_end() {
        let tokens = lex("def f():\n    pass").unwrap();
        assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Dedent));
        assert_eq!(
            tokens.iter().filter(|t| t.kind == TokenKind::Newline).count(),
            0
        );
    }

    #[test]
    fn test_lex_joins_lines_inside_brackets() {
        let tokens = lex("f(a,\n      b)\n").unwrap();
        assert_eq!(texts(&tokens), vec!["f", "(", "a", ",", "b", ")"]);
    }

    #[test]
    fn test_lex_drops_comments_and_blank_lines() {
        let tokens = lex("a  # note\n\n# whole line\nb").unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![TokenKind::Name, TokenKind::Newline, TokenKind::Name]
        );
    }

    #[test]
    fn test_lex_pattern_syntax() {
        let tokens = lex("$($x:tt),* $^ $[!;]").unwrap();
        assert_eq!(
            texts(&tokens),
            vec![
                "$", "(", "$", "x", ":", "tt", ")", ",", "*", "$", "^", "$", "[", "!", ";", "]"
            ]
        );
        assert_eq!(tokens[0].kind, TokenKind::Dollar);
    }

    #[test]
    fn test_lex_strings_and_numbers() {
        let tokens = lex("rb'\\x00' f\"{x}\" '''a\nb''' 0x_ff 1.5e3 2j .5").unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::String,
                TokenKind::String,
                TokenKind::String,
                TokenKind::Number,
                TokenKind::Number,
                TokenKind::Number,
                TokenKind::Number,
            ]
        );
    }

    #[test]
    fn test_lex_rejects_inconsistent_dedent() {
        let err = lex("if x:\n        a\n    b\n").unwrap_err();
        assert!(matches!(err, MacroError::Lex { .. }));
    }

    #[test]
    fn test_lex_rejects_unknown_character() {
        assert!(matches!(lex("a ` b"), Err(MacroError::Lex { .. })));
    }
}

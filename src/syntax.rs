//! Parsing pattern syntax and `macro_rules!` declarations.
//!
//! The surface syntax is recognized by the matching engine itself: every
//! construct below is a small bootstrap pattern built directly from
//! [`MatcherNode`]s and tried with [`match_at`].

use std::sync::LazyLock;

use crate::bindings::{Binding, Bindings, flatten, leaves, single};
use crate::error::{MacroError, Result};
use crate::matcher::{match_at, match_full};
use crate::pattern::{
    CaptureKind, MatcherNode, Quantifier, Rule, SpecialToken, TranscriberNode,
};
use crate::token::{Position, Token, TokenKind};

use CaptureKind::{Name, Null, TokenTree};
use MatcherNode as M;
use Quantifier::{OneOrMore, ZeroOrMore, ZeroOrOne};

fn lit(token: Token) -> MatcherNode {
    M::literal(token)
}

fn dollar() -> MatcherNode {
    M::Special(SpecialToken::Dollar)
}

/// `$($name:tt)*`
fn trees(name: &str) -> MatcherNode {
    M::repeat(vec![M::capture(name, TokenTree)], None, ZeroOrMore)
}

/// `$ $name:name : $kind:name`
static CAPTURE: LazyLock<Vec<MatcherNode>> = LazyLock::new(|| {
    vec![
        dollar(),
        M::capture("name", Name),
        lit(Token::op(":")),
        M::capture("kind", Name),
    ]
});

/// `$ ( $($body:tt)* ) $($($$ $escape:null)? $[!*] $[!+] $[!?] $sep:token)? $mode:token`
static REPEATER: LazyLock<Vec<MatcherNode>> = LazyLock::new(|| {
    let not_op = |op: &str| M::not(vec![lit(Token::op(op))]);
    vec![
        dollar(),
        lit(Token::open("(")),
        trees("body"),
        lit(Token::close(")")),
        M::repeat(
            vec![
                M::repeat(vec![dollar(), M::capture("escape", Null)], None, ZeroOrOne),
                not_op("*"),
                not_op("+"),
                not_op("?"),
                M::capture("sep", CaptureKind::Token),
            ],
            None,
            ZeroOrOne,
        ),
        M::capture("mode", CaptureKind::Token),
    ]
});

/// `$ [ $($body:tt)* ]`
static GROUP: LazyLock<Vec<MatcherNode>> = LazyLock::new(|| {
    vec![
        dollar(),
        lit(Token::open("[")),
        trees("body"),
        lit(Token::close("]")),
    ]
});

/// `$( ( $($variant:tt)* ) )|+`
static VARIANTS: LazyLock<Vec<MatcherNode>> = LazyLock::new(|| {
    vec![M::repeat(
        vec![
            lit(Token::open("(")),
            trees("variant"),
            lit(Token::close(")")),
        ],
        Some(Token::op("|")),
        OneOrMore,
    )]
});

/// `$ $name:name`
static SUBSTITUTION: LazyLock<Vec<MatcherNode>> =
    LazyLock::new(|| vec![dollar(), M::capture("name", Name)]);

/// `$ $symbol:token`
static SPECIAL: LazyLock<Vec<MatcherNode>> =
    LazyLock::new(|| vec![dollar(), M::capture("symbol", CaptureKind::Token)]);

/// `$( [ $($matcher:tt)* ] : $[ ( $($^)? $> $($transcriber:tt)* $< ) | ( $($[!$^] $transcriber:tt)* $($^)? ) ] )+`
static RULES: LazyLock<Vec<MatcherNode>> = LazyLock::new(|| {
    let newline = || M::Special(SpecialToken::Newline);
    let block = vec![
        M::repeat(vec![newline()], None, ZeroOrOne),
        M::Special(SpecialToken::Indent),
        trees("transcriber"),
        M::Special(SpecialToken::Dedent),
    ];
    let line = vec![
        M::repeat(
            vec![
                M::not(vec![newline()]),
                M::capture("transcriber", TokenTree),
            ],
            None,
            ZeroOrMore,
        ),
        M::repeat(vec![newline()], None, ZeroOrOne),
    ];
    vec![M::repeat(
        vec![
            lit(Token::open("[")),
            trees("matcher"),
            lit(Token::close("]")),
            lit(Token::op(":")),
            M::union(vec![block, line]),
        ],
        None,
        OneOrMore,
    )]
});

/// `macro_rules <op> $name:name : $($^)? $> $($rules:tt)* $<`
fn declaration_pattern(operator: &str) -> Vec<MatcherNode> {
    vec![
        lit(Token::name("macro_rules")),
        lit(Token::op(operator)),
        M::capture("name", Name),
        lit(Token::op(":")),
        M::repeat(vec![M::Special(SpecialToken::Newline)], None, ZeroOrOne),
        M::Special(SpecialToken::Indent),
        trees("rules"),
        M::Special(SpecialToken::Dedent),
    ]
}

fn unexpected_dollar(tokens: &[Token], pos: usize) -> MacroError {
    let position = tokens[pos].position;
    match tokens.get(pos + 1) {
        Some(next) => MacroError::syntax(format!("unexpected `{next}` after `$`"), position),
        None => MacroError::syntax("stray `$` at end of pattern", position),
    }
}

/// Separator and quantifier of a matched repeater.
fn repeater_suffix(bindings: &Bindings, position: Position) -> Result<(Option<Token>, Quantifier)> {
    let mut escaped = Vec::new();
    if let Some(escape) = bindings.get("escape") {
        leaves(escape, &mut escaped);
    }

    let separator = match flatten(bindings.get("sep")).into_iter().next() {
        None => None,
        Some(token) if escaped.is_empty() => {
            if token.is_delimiter() {
                return Err(MacroError::syntax(
                    format!("`{token}` cannot be used as a separator"),
                    token.position,
                ));
            }
            Some(token)
        }
        Some(token) => match SpecialToken::from_symbol(&token) {
            Some(special) => Some(special.token().at(token.position)),
            None => {
                return Err(MacroError::syntax(
                    format!("`${token}` is not a valid separator"),
                    token.position,
                ));
            }
        },
    };

    let mode = single(bindings, "mode");
    let quantifier = mode
        .as_ref()
        .filter(|token| token.kind == TokenKind::Op)
        .and_then(|token| Quantifier::from_op(&token.text))
        .ok_or_else(|| {
            let found = mode.as_ref().map_or_else(|| "nothing".to_string(), |t| format!("`{t}`"));
            MacroError::syntax(
                format!("expected repetition mode `*`, `+` or `?`, found {found}"),
                position,
            )
        })?;

    Ok((separator, quantifier))
}

/// Parse the tokens between a rule's brackets.
pub fn parse_matcher(tokens: &[Token]) -> Result<Vec<MatcherNode>> {
    let mut nodes = Vec::new();
    let mut pos = 0;

    while let Some(token) = tokens.get(pos) {
        if token.kind != TokenKind::Dollar {
            nodes.push(MatcherNode::Literal(token.clone()));
            pos += 1;
            continue;
        }
        let position = token.position;

        let (node, end) = if let Some(m) = match_at(&CAPTURE, tokens, pos) {
            let kind_token =
                single(&m.bindings, "kind").ok_or_else(|| unexpected_dollar(tokens, pos))?;
            let kind = CaptureKind::from_name(&kind_token.text).ok_or_else(|| {
                MacroError::syntax(
                    format!("unknown capture kind `{kind_token}`"),
                    kind_token.position,
                )
            })?;
            let name = single(&m.bindings, "name").map(|t| t.text).unwrap_or_default();
            (
                MatcherNode::Capture {
                    name,
                    kind,
                    position,
                },
                m.end,
            )
        } else if let Some(m) = match_at(&REPEATER, tokens, pos) {
            let (separator, quantifier) = repeater_suffix(&m.bindings, position)?;
            let inner = parse_matcher(&flatten(m.bindings.get("body")))?;
            (
                MatcherNode::Repeater {
                    inner,
                    separator,
                    quantifier,
                },
                m.end,
            )
        } else if let Some(m) = match_at(&GROUP, tokens, pos) {
            (parse_group(&flatten(m.bindings.get("body")), position)?, m.end)
        } else if let Some(special) = special_at(tokens, pos) {
            (MatcherNode::Special(special), pos + 2)
        } else {
            return Err(unexpected_dollar(tokens, pos));
        };

        nodes.push(node);
        pos = end;
    }
    Ok(nodes)
}

/// The body of `$[...]`: a negative lookahead if it starts with `!`,
/// otherwise a union of parenthesized variants.
fn parse_group(body: &[Token], position: Position) -> Result<MatcherNode> {
    if let Some((first, rest)) = body.split_first()
        && first.is_op("!")
    {
        return Ok(MatcherNode::NegativeLookahead(parse_matcher(rest)?));
    }

    let bindings = match_full(&VARIANTS, body).ok_or_else(|| {
        MacroError::syntax("expected `$[!...]` or `$[(...) | (...)]`", position)
    })?;
    let variants = match bindings.get("variant") {
        Some(Binding::Seq(variants)) => variants
            .iter()
            .map(|variant| parse_matcher(&flatten(Some(variant))))
            .collect::<Result<Vec<_>>>()?,
        _ => Vec::new(),
    };
    Ok(MatcherNode::Union { variants, position })
}

fn special_at(tokens: &[Token], pos: usize) -> Option<SpecialToken> {
    let m = match_at(&SPECIAL, tokens, pos)?;
    SpecialToken::from_symbol(&single(&m.bindings, "symbol")?)
}

/// Parse a rule's transcriber.
pub fn parse_transcriber(tokens: &[Token]) -> Result<Vec<TranscriberNode>> {
    let mut nodes = Vec::new();
    let mut pos = 0;

    while let Some(token) = tokens.get(pos) {
        if token.kind != TokenKind::Dollar {
            nodes.push(TranscriberNode::Literal(token.clone()));
            pos += 1;
            continue;
        }
        let position = token.position;

        let (node, end) = if let Some(m) = match_at(&REPEATER, tokens, pos) {
            let (separator, _) = repeater_suffix(&m.bindings, position)?;
            let inner = parse_transcriber(&flatten(m.bindings.get("body")))?;
            (TranscriberNode::Repeater { inner, separator }, m.end)
        } else if let Some(m) = match_at(&SUBSTITUTION, tokens, pos) {
            let name = single(&m.bindings, "name").map(|t| t.text).unwrap_or_default();
            (TranscriberNode::Substitution { name, position }, m.end)
        } else if let Some(special) = special_at(tokens, pos) {
            (TranscriberNode::Special(special), pos + 2)
        } else if match_at(&GROUP, tokens, pos).is_some() {
            return Err(MacroError::syntax(
                "unions and lookaheads are only allowed in matchers",
                position,
            ));
        } else {
            return Err(unexpected_dollar(tokens, pos));
        };

        nodes.push(node);
        pos = end;
    }
    Ok(nodes)
}

/// Parse and validate one matcher/transcriber pair.
pub fn parse_rule(matcher: &[Token], transcriber: &[Token]) -> Result<Rule> {
    Rule::new(parse_matcher(matcher)?, parse_transcriber(transcriber)?)
}

/// A parsed `macro_rules!` block.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: String,
    pub rules: Vec<Rule>,
    /// Index one past the declaration's last token
    pub end: usize,
}

/// Recognizes a declaration starting at `start`.
///
/// Returns `Ok(None)` unless the tokens begin with `macro_rules` followed by
/// `operator`. Once that prefix is seen, anything but a well-formed
/// declaration is an error.
pub fn parse_declaration(
    tokens: &[Token],
    start: usize,
    operator: &str,
) -> Result<Option<Declaration>> {
    let (Some(keyword), Some(op)) = (tokens.get(start), tokens.get(start + 1)) else {
        return Ok(None);
    };
    if !keyword.is_name("macro_rules") || !op.is_op(operator) {
        return Ok(None);
    }

    let m = match_at(&declaration_pattern(operator), tokens, start).ok_or_else(|| {
        MacroError::syntax(
            format!("expected `macro_rules{operator} name:` followed by an indented block of rules"),
            keyword.position,
        )
    })?;
    let name = single(&m.bindings, "name").map(|t| t.text).unwrap_or_default();

    let body = flatten(m.bindings.get("rules"));
    let rules = match_full(&RULES, &body).ok_or_else(|| {
        MacroError::syntax(
            format!("malformed rules in `macro_rules{operator} {name}`; expected `[matcher]: transcriber`"),
            body.first().map_or(keyword.position, |t| t.position),
        )
    })?;

    let (Some(Binding::Seq(matchers)), Some(Binding::Seq(transcribers))) =
        (rules.get("matcher"), rules.get("transcriber"))
    else {
        return Ok(Some(Declaration {
            name,
            rules: Vec::new(),
            end: m.end,
        }));
    };

    let rules = matchers
        .iter()
        .zip(transcribers)
        .map(|(matcher, transcriber)| {
            parse_rule(&flatten(Some(matcher)), &flatten(Some(transcriber)))
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!(name = %name, rules = rules.len(), "parsed macro_rules declaration");
    Ok(Some(Declaration {
        name,
        rules,
        end: m.end,
    }))
}

//! Compiled matcher and transcriber patterns.

use rustc_hash::FxHashMap;

use crate::error::{MacroError, Result};
use crate::token::{Position, Token, TokenKind};

/// What a capture variable accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureKind {
    /// Any single token that is not a delimiter
    Token,
    Name,
    Op,
    Number,
    String,
    /// One token tree
    TokenTree,
    /// Consumes nothing; only records that the capture was reached
    Null,
}

impl CaptureKind {
    /// Parses the kind written after `$name:`.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "token" => Self::Token,
            "name" => Self::Name,
            "op" => Self::Op,
            "number" => Self::Number,
            "string" => Self::String,
            "tt" => Self::TokenTree,
            "null" | "empty" => Self::Null,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantifier {
    /// `?`
    ZeroOrOne,
    /// `*`
    ZeroOrMore,
    /// `+`
    OneOrMore,
}

impl Quantifier {
    pub fn from_op(op: &str) -> Option<Self> {
        Some(match op {
            "?" => Self::ZeroOrOne,
            "*" => Self::ZeroOrMore,
            "+" => Self::OneOrMore,
            _ => return None,
        })
    }

    pub fn min(self) -> usize {
        match self {
            Self::OneOrMore => 1,
            Self::ZeroOrOne | Self::ZeroOrMore => 0,
        }
    }

    pub fn max(self) -> Option<usize> {
        match self {
            Self::ZeroOrOne => Some(1),
            Self::ZeroOrMore | Self::OneOrMore => None,
        }
    }
}

/// Synthetic tokens spelled `$$`, `$>`, `$<` and `$^`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialToken {
    Dollar,
    Indent,
    Dedent,
    Newline,
}

impl SpecialToken {
    /// Parses the symbol following an escaping `$`.
    pub fn from_symbol(token: &Token) -> Option<Self> {
        match (token.kind, token.text.as_str()) {
            (TokenKind::Dollar, _) => Some(Self::Dollar),
            (TokenKind::Op, ">") => Some(Self::Indent),
            (TokenKind::Op, "<") => Some(Self::Dedent),
            (TokenKind::Op, "^") => Some(Self::Newline),
            _ => None,
        }
    }

    pub fn token(self) -> Token {
        match self {
            Self::Dollar => Token::dollar(),
            Self::Indent => Token::indent(),
            Self::Dedent => Token::dedent(),
            Self::Newline => Token::newline(),
        }
    }

    pub fn matches(self, token: &Token) -> bool {
        let kind = match self {
            Self::Dollar => TokenKind::Dollar,
            Self::Indent => TokenKind::Indent,
            Self::Dedent => TokenKind::Dedent,
            Self::Newline => TokenKind::Newline,
        };
        token.kind == kind
    }
}

/// Matcher-side pattern node.
#[derive(Debug, Clone, PartialEq)]
pub enum MatcherNode {
    /// Matches one token equal to this one
    Literal(Token),
    /// `$name:kind`
    Capture {
        name: String,
        kind: CaptureKind,
        position: Position,
    },
    /// `$( ... ) sep? q`
    Repeater {
        inner: Vec<MatcherNode>,
        separator: Option<Token>,
        quantifier: Quantifier,
    },
    /// `$[ (...) | (...) ]`, first matching variant wins
    Union {
        variants: Vec<Vec<MatcherNode>>,
        position: Position,
    },
    /// `$[! ... ]`, zero-width
    NegativeLookahead(Vec<MatcherNode>),
    Special(SpecialToken),
}

impl MatcherNode {
    pub fn literal(token: Token) -> Self {
        Self::Literal(token)
    }

    pub fn capture(name: impl Into<String>, kind: CaptureKind) -> Self {
        Self::Capture {
            name: name.into(),
            kind,
            position: Position::default(),
        }
    }

    pub fn repeat(inner: Vec<Self>, separator: Option<Token>, quantifier: Quantifier) -> Self {
        Self::Repeater {
            inner,
            separator,
            quantifier,
        }
    }

    pub fn union(variants: Vec<Vec<Self>>) -> Self {
        Self::Union {
            variants,
            position: Position::default(),
        }
    }

    pub fn not(inner: Vec<Self>) -> Self {
        Self::NegativeLookahead(inner)
    }
}

/// Transcriber-side pattern node.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriberNode {
    Literal(Token),
    /// `$name`
    Substitution { name: String, position: Position },
    /// `$( ... ) sep? q`; the count comes from the captures inside
    Repeater {
        inner: Vec<TranscriberNode>,
        separator: Option<Token>,
    },
    Special(SpecialToken),
}

impl TranscriberNode {
    pub fn literal(token: Token) -> Self {
        Self::Literal(token)
    }

    pub fn substitute(name: impl Into<String>) -> Self {
        Self::Substitution {
            name: name.into(),
            position: Position::default(),
        }
    }

    pub fn repeat(inner: Vec<Self>, separator: Option<Token>) -> Self {
        Self::Repeater { inner, separator }
    }
}

/// A capture declared by a matcher, with its repetition depth relative to
/// the sequence it was collected from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CaptureDecl {
    pub name: String,
    pub depth: usize,
}

/// Collects the captures a sequence binds. Union variants are assumed
/// consistent, so only the first is inspected; lookaheads never bind.
pub(crate) fn declared_captures(nodes: &[MatcherNode]) -> Vec<CaptureDecl> {
    fn walk(nodes: &[MatcherNode], depth: usize, out: &mut Vec<CaptureDecl>) {
        for node in nodes {
            match node {
                MatcherNode::Capture { name, .. } => out.push(CaptureDecl {
                    name: name.clone(),
                    depth,
                }),
                MatcherNode::Repeater { inner, .. } => walk(inner, depth + 1, out),
                MatcherNode::Union { variants, .. } => {
                    if let Some(first) = variants.first() {
                        walk(first, depth, out);
                    }
                }
                MatcherNode::Literal(_)
                | MatcherNode::NegativeLookahead(_)
                | MatcherNode::Special(_) => {}
            }
        }
    }

    let mut out = Vec::new();
    walk(nodes, 0, &mut out);
    out
}

/// Capture name to declared repetition depth.
type DepthMap = FxHashMap<String, usize>;

fn check_matcher(nodes: &[MatcherNode], depth: usize, seen: &mut DepthMap) -> Result<()> {
    for node in nodes {
        match node {
            MatcherNode::Capture { name, position, .. } => {
                if seen.insert(name.clone(), depth).is_some() {
                    return Err(MacroError::DuplicateCapture {
                        name: name.clone(),
                        position: *position,
                    });
                }
            }
            MatcherNode::Repeater { inner, .. } => check_matcher(inner, depth + 1, seen)?,
            MatcherNode::Union { variants, position } => {
                let mut first: Option<DepthMap> = None;
                for variant in variants {
                    let mut bound = DepthMap::default();
                    check_matcher(variant, depth, &mut bound)?;
                    match &first {
                        Some(expected) if *expected != bound => {
                            return Err(MacroError::UnionCaptureMismatch {
                                position: *position,
                            });
                        }
                        Some(_) => {}
                        None => first = Some(bound),
                    }
                }
                for (name, depth) in first.unwrap_or_default() {
                    if seen.insert(name.clone(), depth).is_some() {
                        return Err(MacroError::DuplicateCapture {
                            name,
                            position: *position,
                        });
                    }
                }
            }
            MatcherNode::NegativeLookahead(inner) => {
                check_matcher(inner, depth, &mut DepthMap::default())?;
            }
            MatcherNode::Literal(_) | MatcherNode::Special(_) => {}
        }
    }
    Ok(())
}

fn check_transcriber(nodes: &[TranscriberNode], depth: usize, declared: &DepthMap) -> Result<()> {
    for node in nodes {
        match node {
            TranscriberNode::Substitution { name, position } => match declared.get(name) {
                None => {
                    return Err(MacroError::UnknownCapture {
                        name: name.clone(),
                        position: *position,
                    });
                }
                Some(&declared_depth) if declared_depth > depth => {
                    return Err(MacroError::CaptureDepth {
                        name: name.clone(),
                        declared: declared_depth,
                        used: depth,
                        position: *position,
                    });
                }
                Some(_) => {}
            },
            TranscriberNode::Repeater { inner, .. } => {
                check_transcriber(inner, depth + 1, declared)?;
            }
            TranscriberNode::Literal(_) | TranscriberNode::Special(_) => {}
        }
    }
    Ok(())
}

/// One matcher/transcriber pair, validated on construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    matcher: Vec<MatcherNode>,
    transcriber: Vec<TranscriberNode>,
}

impl Rule {
    /// Validates capture names and depths before the rule can be used.
    ///
    /// # Errors
    ///
    /// - a capture name is declared twice
    /// - union variants bind different captures
    /// - a substitution names a capture the matcher never binds
    /// - a capture is substituted at a shallower depth than it repeats at
    ///
    /// Substituting at a deeper depth is allowed; the value repeats in every
    /// iteration.
    pub fn new(matcher: Vec<MatcherNode>, transcriber: Vec<TranscriberNode>) -> Result<Self> {
        let mut declared = DepthMap::default();
        check_matcher(&matcher, 0, &mut declared)?;
        check_transcriber(&transcriber, 0, &declared)?;
        Ok(Self {
            matcher,
            transcriber,
        })
    }

    pub fn matcher(&self) -> &[MatcherNode] {
        &self.matcher
    }

    pub fn transcriber(&self) -> &[TranscriberNode] {
        &self.transcriber
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use super::CaptureKind::TokenTree;

    #[test]
    fn test_rule_accepts_consistent_depths() {
        let matcher = vec![MatcherNode::repeat(
            vec![
                MatcherNode::capture("key", TokenTree),
                MatcherNode::literal(Token::op(":")),
                MatcherNode::capture("val", TokenTree),
            ],
            Some(Token::op(",")),
            Quantifier::ZeroOrMore,
        )];
        let transcriber = vec![TranscriberNode::repeat(
            vec![
                TranscriberNode::substitute("key"),
                TranscriberNode::substitute("val"),
            ],
            None,
        )];
        assert!(Rule::new(matcher, transcriber).is_ok());
    }

    #[test]
    fn test_rule_rejects_duplicate_capture() {
        let matcher = vec![
            MatcherNode::capture("x", TokenTree),
            MatcherNode::repeat(
                vec![MatcherNode::capture("x", TokenTree)],
                None,
                Quantifier::ZeroOrMore,
            ),
        ];
        let err = Rule::new(matcher, vec![]).unwrap_err();
        assert!(matches!(err, MacroError::DuplicateCapture { ref name, .. } if name == "x"));
        assert!(err.is_declaration_error());
    }

    #[test]
    fn test_rule_rejects_union_mismatch() {
        let matcher = vec![MatcherNode::union(vec![
            vec![MatcherNode::capture("a", TokenTree)],
            vec![MatcherNode::capture("b", TokenTree)],
        ])];
        assert!(matches!(
            Rule::new(matcher, vec![]),
            Err(MacroError::UnionCaptureMismatch { .. })
        ));

        let matcher = vec![MatcherNode::union(vec![
            vec![MatcherNode::capture("a", TokenTree)],
            vec![MatcherNode::repeat(
                vec![MatcherNode::capture("a", TokenTree)],
                None,
                Quantifier::ZeroOrOne,
            )],
        ])];
        assert!(matches!(
            Rule::new(matcher, vec![]),
            Err(MacroError::UnionCaptureMismatch { .. })
        ));
    }

    #[test]
    fn test_union_variants_may_differ_in_kind() {
        let matcher = vec![MatcherNode::union(vec![
            vec![MatcherNode::capture("a", CaptureKind::Name)],
            vec![
                MatcherNode::literal(Token::op("-")),
                MatcherNode::capture("a", CaptureKind::Number),
            ],
        ])];
        let rule = Rule::new(matcher, vec![TranscriberNode::substitute("a")]);
        assert!(rule.is_ok());
    }

    #[test]
    fn test_rule_rejects_unknown_substitution() {
        let matcher = vec![MatcherNode::capture("a", TokenTree)];
        let err = Rule::new(matcher, vec![TranscriberNode::substitute("b")]).unwrap_err();
        assert!(matches!(err, MacroError::UnknownCapture { ref name, .. } if name == "b"));
    }

    #[test]
    fn test_rule_rejects_still_repeating_substitution() {
        let matcher = vec![MatcherNode::repeat(
            vec![MatcherNode::capture("a", TokenTree)],
            None,
            Quantifier::ZeroOrMore,
        )];
        let err = Rule::new(matcher, vec![TranscriberNode::substitute("a")]).unwrap_err();
        assert_eq!(
            err,
            MacroError::CaptureDepth {
                name: "a".to_string(),
                declared: 1,
                used: 0,
                position: Position::default(),
            }
        );
    }

    #[test]
    fn test_shallow_capture_may_be_used_inside_repeater() {
        let matcher = vec![
            MatcherNode::capture("sep", CaptureKind::Op),
            MatcherNode::repeat(
                vec![MatcherNode::capture("item", TokenTree)],
                None,
                Quantifier::ZeroOrMore,
            ),
        ];
        let transcriber = vec![TranscriberNode::repeat(
            vec![
                TranscriberNode::substitute("item"),
                TranscriberNode::substitute("sep"),
            ],
            None,
        )];
        assert!(Rule::new(matcher, transcriber).is_ok());
    }

    #[test]
    fn test_declared_captures_reports_relative_depth() {
        let nodes = vec![
            MatcherNode::capture("a", TokenTree),
            MatcherNode::repeat(
                vec![MatcherNode::repeat(
                    vec![MatcherNode::capture("b", TokenTree)],
                    None,
                    Quantifier::ZeroOrMore,
                )],
                None,
                Quantifier::ZeroOrMore,
            ),
            MatcherNode::not(vec![MatcherNode::capture("ignored", TokenTree)]),
        ];
        let decls = declared_captures(&nodes);
        assert_eq!(
            decls,
            vec![
                CaptureDecl {
                    name: "a".to_string(),
                    depth: 0
                },
                CaptureDecl {
                    name: "b".to_string(),
                    depth: 2
                },
            ]
        );
    }
}

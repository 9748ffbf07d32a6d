//! Matching compiled patterns against token slices.
//!
//! Matching is recursive descent with local backtracking: a failed node
//! leaves the position where it was, repeaters are greedy and stop at the
//! first repetition (or separator) that fails, and unions commit to the first
//! variant that matches. Nothing backtracks into an earlier sibling once it
//! has matched.

use crate::bindings::{Binding, Bindings};
use crate::pattern::{CaptureKind, MatcherNode, Quantifier, declared_captures};
use crate::token::{Token, TokenKind, token_tree};

/// A successful match: the bindings and the index one past the last
/// consumed token.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub bindings: Bindings,
    pub end: usize,
}

/// Match `pattern` against `tokens` starting at `start`. Trailing tokens are
/// left unconsumed.
pub fn match_at(pattern: &[MatcherNode], tokens: &[Token], start: usize) -> Option<Match> {
    let mut bindings = Bindings::default();
    let end = match_seq(pattern, tokens, start, &mut bindings)?;
    Some(Match { bindings, end })
}

/// Match `pattern` against the whole of `tokens`.
pub fn match_full(pattern: &[MatcherNode], tokens: &[Token]) -> Option<Bindings> {
    match_at(pattern, tokens, 0)
        .filter(|m| m.end == tokens.len())
        .map(|m| m.bindings)
}

fn match_seq(
    nodes: &[MatcherNode],
    tokens: &[Token],
    mut pos: usize,
    bindings: &mut Bindings,
) -> Option<usize> {
    for node in nodes {
        pos = match_node(node, tokens, pos, bindings)?;
    }
    Some(pos)
}

fn match_node(
    node: &MatcherNode,
    tokens: &[Token],
    pos: usize,
    bindings: &mut Bindings,
) -> Option<usize> {
    match node {
        MatcherNode::Literal(literal) => (tokens.get(pos)? == literal).then_some(pos + 1),
        MatcherNode::Special(special) => special.matches(tokens.get(pos)?).then_some(pos + 1),
        MatcherNode::Capture { name, kind, .. } => {
            let end = match_capture(*kind, tokens, pos)?;
            bindings.insert(name.clone(), Binding::Tree(tokens[pos..end].to_vec()));
            Some(end)
        }
        MatcherNode::Repeater {
            inner,
            separator,
            quantifier,
        } => match_repeater(
            inner,
            separator.as_ref(),
            *quantifier,
            tokens,
            pos,
            bindings,
        ),
        MatcherNode::Union { variants, .. } => variants.iter().find_map(|variant| {
            let mut bound = Bindings::default();
            let end = match_seq(variant, tokens, pos, &mut bound)?;
            bindings.extend(bound);
            Some(end)
        }),
        MatcherNode::NegativeLookahead(inner) => {
            let mut scratch = Bindings::default();
            match_seq(inner, tokens, pos, &mut scratch)
                .is_none()
                .then_some(pos)
        }
    }
}

/// Returns the end of the tokens a capture of `kind` consumes at `pos`.
fn match_capture(kind: CaptureKind, tokens: &[Token], pos: usize) -> Option<usize> {
    match kind {
        CaptureKind::Null => return Some(pos),
        CaptureKind::TokenTree => return token_tree(tokens, pos).ok().map(|span| span.end),
        _ => {}
    }

    let token = tokens.get(pos)?;
    if token.is_delimiter() {
        return None;
    }
    let accepted = match kind {
        CaptureKind::Name => token.kind == TokenKind::Name,
        CaptureKind::Op => token.kind == TokenKind::Op,
        CaptureKind::Number => token.kind == TokenKind::Number,
        CaptureKind::String => token.kind == TokenKind::String,
        _ => true,
    };
    accepted.then_some(pos + 1)
}

fn match_repeater(
    inner: &[MatcherNode],
    separator: Option<&Token>,
    quantifier: Quantifier,
    tokens: &[Token],
    start: usize,
    bindings: &mut Bindings,
) -> Option<usize> {
    let mut pos = start;
    let mut repetitions: Vec<Bindings> = Vec::new();

    loop {
        if quantifier
            .max()
            .is_some_and(|max| repetitions.len() >= max)
        {
            break;
        }

        // The separator is only consumed together with the repetition after it.
        let mut cursor = pos;
        if let Some(separator) = separator.filter(|_| !repetitions.is_empty()) {
            if tokens.get(cursor) != Some(separator) {
                break;
            }
            cursor += 1;
        }

        let mut bound = Bindings::default();
        let Some(end) = match_seq(inner, tokens, cursor, &mut bound) else {
            break;
        };
        repetitions.push(bound);
        if end == pos {
            // a zero-width repetition would repeat forever
            break;
        }
        pos = end;
    }

    if repetitions.len() < quantifier.min() {
        return None;
    }

    for decl in declared_captures(inner) {
        let items = repetitions
            .iter_mut()
            .map(|bound| {
                bound
                    .remove(&decl.name)
                    .unwrap_or_else(|| Binding::empty(decl.depth))
            })
            .collect();
        bindings.insert(decl.name, Binding::Seq(items));
    }
    Some(pos)
}

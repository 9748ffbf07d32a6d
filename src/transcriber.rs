//! Expanding transcriber patterns with bindings.

use crate::bindings::{Binding, Bindings};
use crate::error::{MacroError, Result};
use crate::pattern::TranscriberNode;
use crate::token::{Position, Token};

/// Expands `pattern` left to right, depth first.
///
/// # Errors
///
/// - `UnknownCapture` if a substitution has no binding
/// - `CaptureDepth` if a substitution is still repeating where it is used
/// - `RepetitionCountMismatch` if a repeater's captures disagree on their
///   count, or none of them repeats at the repeater's depth
pub fn transcribe(pattern: &[TranscriberNode], bindings: &Bindings) -> Result<Vec<Token>> {
    let mut out = Vec::new();
    let mut path = Vec::new();
    transcribe_seq(pattern, bindings, &mut path, &mut out)?;
    Ok(out)
}

fn transcribe_seq(
    nodes: &[TranscriberNode],
    bindings: &Bindings,
    path: &mut Vec<usize>,
    out: &mut Vec<Token>,
) -> Result<()> {
    for node in nodes {
        match node {
            TranscriberNode::Literal(token) => out.push(token.clone()),
            TranscriberNode::Special(special) => out.push(special.token()),
            TranscriberNode::Substitution { name, position } => {
                match lookup(bindings, name, *position)?.at_path(path) {
                    Some(Binding::Tree(tokens)) => out.extend(tokens.iter().cloned()),
                    Some(repeating @ Binding::Seq(_)) => {
                        return Err(MacroError::CaptureDepth {
                            name: name.clone(),
                            declared: path.len() + repeating.depth(),
                            used: path.len(),
                            position: *position,
                        });
                    }
                    None => {
                        return Err(MacroError::RepetitionCountMismatch {
                            message: format!("`${name}` has no value for this repetition"),
                            position: *position,
                        });
                    }
                }
            }
            TranscriberNode::Repeater { inner, separator } => {
                let count = repetition_count(inner, bindings, path)?;
                for index in 0..count {
                    if index > 0 {
                        out.extend(separator.iter().cloned());
                    }
                    path.push(index);
                    transcribe_seq(inner, bindings, path, out)?;
                    path.pop();
                }
            }
        }
    }
    Ok(())
}

fn lookup<'b>(bindings: &'b Bindings, name: &str, position: Position) -> Result<&'b Binding> {
    bindings
        .get(name)
        .ok_or_else(|| MacroError::UnknownCapture {
            name: name.to_string(),
            position,
        })
}

/// Every substitution inside `nodes`, nested repeaters included.
fn substitutions<'n>(nodes: &'n [TranscriberNode], out: &mut Vec<(&'n str, Position)>) {
    for node in nodes {
        match node {
            TranscriberNode::Substitution { name, position } => out.push((name, *position)),
            TranscriberNode::Repeater { inner, .. } => substitutions(inner, out),
            TranscriberNode::Literal(_) | TranscriberNode::Special(_) => {}
        }
    }
}

/// The iteration count of a repeater at `path`: the common length of every
/// capture inside it that is still a sequence there.
fn repetition_count(
    inner: &[TranscriberNode],
    bindings: &Bindings,
    path: &[usize],
) -> Result<usize> {
    let mut names = Vec::new();
    substitutions(inner, &mut names);

    let mut count: Option<(usize, &str)> = None;
    for &(name, position) in &names {
        let Some(found) = lookup(bindings, name, position)?
            .at_path(path)
            .and_then(Binding::repetitions)
        else {
            continue;
        };
        match count {
            Some((expected, first)) if expected != found => {
                return Err(MacroError::RepetitionCountMismatch {
                    message: format!(
                        "`${first}` repeats {expected} times but `${name}` repeats {found} times"
                    ),
                    position,
                });
            }
            Some(_) => {}
            None => count = Some((found, name)),
        }
    }

    count
        .map(|(count, _)| count)
        .ok_or_else(|| MacroError::RepetitionCountMismatch {
            message: "no capture variable repeats at this depth".to_string(),
            position: names.first().map(|&(_, position)| position).unwrap_or_default(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::matcher::match_full;
    use crate::pattern::{CaptureKind, MatcherNode, Quantifier, SpecialToken};
    use crate::token::render;
    use pretty_assertions::assert_eq;

    fn tree(text: &str) -> Binding {
        Binding::Tree(lex(text).unwrap())
    }

    fn seq(items: Vec<Binding>) -> Binding {
        Binding::Seq(items)
    }

    fn bindings(entries: Vec<(&str, Binding)>) -> Bindings {
        entries
            .into_iter()
            .map(|(name, binding)| (name.to_string(), binding))
            .collect()
    }

    fn comma_list() -> Vec<TranscriberNode> {
        vec![TranscriberNode::repeat(
            vec![TranscriberNode::substitute("x")],
            Some(Token::op(",")),
        )]
    }

    #[test]
    fn test_separator_count_is_one_less_than_repetitions() {
        for (count, expected) in [(0, ""), (1, "a"), (3, "a , a , a")] {
            let b = bindings(vec![("x", seq(vec![tree("a"); count]))]);
            let out = transcribe(&comma_list(), &b).unwrap();
            assert_eq!(render(&out), expected);
            assert_eq!(
                out.iter().filter(|t| t.is_op(",")).count(),
                count.saturating_sub(1)
            );
        }
    }

    #[test]
    fn test_dict_literal_from_key_value_pairs() {
        let matcher = vec![
            MatcherNode::repeat(
                vec![
                    MatcherNode::capture("key", CaptureKind::TokenTree),
                    MatcherNode::literal(Token::op(":")),
                    MatcherNode::capture("val", CaptureKind::TokenTree),
                ],
                Some(Token::op(",")),
                Quantifier::ZeroOrMore,
            ),
            MatcherNode::repeat(
                vec![MatcherNode::literal(Token::op(","))],
                None,
                Quantifier::ZeroOrOne,
            ),
        ];
        let transcriber = vec![
            TranscriberNode::literal(Token::open("{")),
            TranscriberNode::repeat(
                vec![
                    TranscriberNode::substitute("key"),
                    TranscriberNode::literal(Token::op(":")),
                    TranscriberNode::substitute("val"),
                ],
                Some(Token::op(",")),
            ),
            TranscriberNode::literal(Token::close("}")),
        ];

        let input = lex("'a': 1, 'b': 2,").unwrap();
        let b = match_full(&matcher, &input).unwrap();
        assert_eq!(b["key"].repetitions(), Some(2));
        assert_eq!(b["val"].repetitions(), Some(2));

        let out = transcribe(&transcriber, &b).unwrap();
        assert_eq!(out, lex("{'a': 1, 'b': 2}").unwrap());
    }

    #[test]
    fn test_null_captures_count_repetitions() {
        // $($counter 1 +)* 0
        let transcriber = vec![
            TranscriberNode::repeat(
                vec![
                    TranscriberNode::substitute("counter"),
                    TranscriberNode::literal(Token::number("1")),
                    TranscriberNode::literal(Token::op("+")),
                ],
                None,
            ),
            TranscriberNode::literal(Token::number("0")),
        ];
        let b = bindings(vec![("counter", seq(vec![Binding::empty(0); 3]))]);
        let out = transcribe(&transcriber, &b).unwrap();
        assert_eq!(render(&out), "1 + 1 + 1 + 0");
    }

    #[test]
    fn test_nested_repeater_counts_from_deeper_capture() {
        // $($($line)*)$^*
        let transcriber = vec![TranscriberNode::repeat(
            vec![TranscriberNode::repeat(
                vec![TranscriberNode::substitute("line")],
                None,
            )],
            Some(SpecialToken::Newline.token()),
        )];
        let b = bindings(vec![(
            "line",
            seq(vec![
                seq(vec![tree("a"), tree("b")]),
                seq(vec![tree("c"), tree("d")]),
            ]),
        )]);
        let out = transcribe(&transcriber, &b).unwrap();
        assert_eq!(render(&out), "a b\nc d");
    }

    #[test]
    fn test_outer_capture_repeats_inside_repeater() {
        let transcriber = vec![TranscriberNode::repeat(
            vec![
                TranscriberNode::substitute("item"),
                TranscriberNode::substitute("suffix"),
            ],
            None,
        )];
        let b = bindings(vec![
            ("item", seq(vec![tree("a"), tree("b")])),
            ("suffix", tree("!")),
        ]);
        assert_eq!(render(&transcribe(&transcriber, &b).unwrap()), "a ! b !");
    }

    #[test]
    fn test_mismatched_counts_fail() {
        let transcriber = vec![TranscriberNode::repeat(
            vec![
                TranscriberNode::substitute("a"),
                TranscriberNode::substitute("b"),
            ],
            None,
        )];
        let b = bindings(vec![
            ("a", seq(vec![tree("x"), tree("y")])),
            ("b", seq(vec![tree("z")])),
        ]);
        assert!(matches!(
            transcribe(&transcriber, &b),
            Err(MacroError::RepetitionCountMismatch { .. })
        ));
    }

    #[test]
    fn test_repeater_without_repeating_capture_fails() {
        let transcriber = vec![TranscriberNode::repeat(
            vec![
                TranscriberNode::literal(Token::name("x")),
                TranscriberNode::substitute("a"),
            ],
            None,
        )];
        let b = bindings(vec![("a", tree("y"))]);
        assert!(matches!(
            transcribe(&transcriber, &b),
            Err(MacroError::RepetitionCountMismatch { .. })
        ));
    }

    #[test]
    fn test_unknown_capture_fails() {
        let err = transcribe(&[TranscriberNode::substitute("nope")], &Bindings::default())
            .unwrap_err();
        assert!(matches!(err, MacroError::UnknownCapture { ref name, .. } if name == "nope"));
    }

    #[test]
    fn test_still_repeating_capture_fails() {
        let b = bindings(vec![("a", seq(vec![tree("x")]))]);
        let err = transcribe(&[TranscriberNode::substitute("a")], &b).unwrap_err();
        assert!(matches!(
            err,
            MacroError::CaptureDepth {
                declared: 1,
                used: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_transcription_is_deterministic() {
        let b = bindings(vec![("x", seq(vec![tree("a"), tree("(b c)")]))]);
        let first = transcribe(&comma_list(), &b).unwrap();
        let second = transcribe(&comma_list(), &b).unwrap();
        assert_eq!(render(&first), render(&second));
        assert_eq!(render(&first), "a , ( b c )");
    }
}

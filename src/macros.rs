//! Macro capabilities and the macros built directly on them.

use std::fmt;
use std::sync::Arc;

use crate::error::{MacroError, Result};
use crate::matcher::{match_at, match_full};
use crate::pattern::Rule;
use crate::registry::MacroRegistry;
use crate::token::{Token, render};
use crate::transcriber::transcribe;

/// Transforms a whole token sequence.
pub trait Macro: fmt::Debug + Send + Sync {
    /// Returns the replacement for `tokens`, or `None` if the macro does not
    /// accept them (or leaves them unchanged).
    fn try_expand(&self, tokens: &[Token], registry: &mut MacroRegistry)
    -> Result<Option<Vec<Token>>>;
}

/// Replacement for a prefix of a token sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixExpansion {
    /// Number of leading tokens replaced
    pub consumed: usize,
    pub replacement: Vec<Token>,
}

/// Transforms the beginning of a token sequence.
pub trait PartialMatchMacro: fmt::Debug + Send + Sync {
    fn try_expand_prefix(
        &self,
        tokens: &[Token],
        registry: &mut MacroRegistry,
    ) -> Result<Option<PrefixExpansion>>;

    /// True if the hook may only fire at the start of a logical line.
    fn line_start_only(&self) -> bool {
        false
    }
}

/// A module-level macro: receives its parameters and the rest of the unit.
pub trait ParameterizedMacro: fmt::Debug + Send + Sync {
    /// Returns the new rest of the unit, or `None` to keep it unchanged.
    fn apply(
        &self,
        parameters: &[Token],
        tokens: &[Token],
        registry: &mut MacroRegistry,
    ) -> Result<Option<Vec<Token>>>;
}

/// A macro defined by `macro_rules!`: ordered rules, first match wins.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroRules {
    name: String,
    rules: Vec<Rule>,
}

impl MacroRules {
    pub fn new(name: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self {
            name: name.into(),
            rules,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

impl Macro for MacroRules {
    fn try_expand(
        &self,
        tokens: &[Token],
        _registry: &mut MacroRegistry,
    ) -> Result<Option<Vec<Token>>> {
        for (index, rule) in self.rules.iter().enumerate() {
            let Some(bindings) = match_full(rule.matcher(), tokens) else {
                tracing::trace!(name = %self.name, rule = index, "rule did not match");
                continue;
            };
            tracing::trace!(name = %self.name, rule = index, "rule matched");
            return transcribe(rule.transcriber(), &bindings).map(Some);
        }
        Ok(None)
    }
}

impl PartialMatchMacro for MacroRules {
    /// Like [`Macro::try_expand`], but a rule may leave trailing tokens.
    fn try_expand_prefix(
        &self,
        tokens: &[Token],
        _registry: &mut MacroRegistry,
    ) -> Result<Option<PrefixExpansion>> {
        for rule in &self.rules {
            if let Some(m) = match_at(rule.matcher(), tokens, 0) {
                return Ok(Some(PrefixExpansion {
                    consumed: m.end,
                    replacement: transcribe(rule.transcriber(), &m.bindings)?,
                }));
            }
        }
        Ok(None)
    }
}

/// Re-applies a macro until it stops changing its input.
#[derive(Debug, Clone)]
pub struct LoopingMacro {
    inner: Arc<dyn Macro>,
    limit: usize,
}

impl LoopingMacro {
    pub fn new(inner: Arc<dyn Macro>, limit: usize) -> Self {
        Self { inner, limit }
    }
}

impl Macro for LoopingMacro {
    fn try_expand(
        &self,
        tokens: &[Token],
        registry: &mut MacroRegistry,
    ) -> Result<Option<Vec<Token>>> {
        let mut current = tokens.to_vec();
        let mut rounds = 0;

        while let Some(next) = self.inner.try_expand(&current, registry)? {
            if next == current {
                break;
            }
            rounds += 1;
            if rounds > self.limit {
                return Err(MacroError::RecursionLimit {
                    limit: self.limit,
                    position: current.first().map(|t| t.position).unwrap_or_default(),
                });
            }
            current = next;
        }

        Ok((rounds > 0).then_some(current))
    }
}

/// Applies each macro in turn, feeding it the previous one's output.
#[derive(Debug, Clone, Default)]
pub struct MultiMacro {
    macros: Vec<Arc<dyn Macro>>,
}

impl MultiMacro {
    pub fn new(macros: Vec<Arc<dyn Macro>>) -> Self {
        Self { macros }
    }
}

impl Macro for MultiMacro {
    fn try_expand(
        &self,
        tokens: &[Token],
        registry: &mut MacroRegistry,
    ) -> Result<Option<Vec<Token>>> {
        let mut current: Option<Vec<Token>> = None;
        for mac in &self.macros {
            let input = current.as_deref().unwrap_or(tokens);
            if let Some(output) = mac.try_expand(input, registry)? {
                current = Some(output);
            }
        }
        Ok(current)
    }
}

/// `stringify!(...)`: one string literal holding the rendered argument.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringifyMacro;

impl Macro for StringifyMacro {
    fn try_expand(
        &self,
        tokens: &[Token],
        _registry: &mut MacroRegistry,
    ) -> Result<Option<Vec<Token>>> {
        let text = match tokens {
            // A lone token is quoted as is, without render's spacing.
            [token] => token.text.clone(),
            _ => render(tokens),
        };
        let position = tokens.first().map(|t| t.position).unwrap_or_default();
        Ok(Some(vec![Token::string(quote(&text)).at(position)]))
    }
}

/// `debug!(...)`: logs the rendered argument and expands to nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugMacro;

impl Macro for DebugMacro {
    fn try_expand(
        &self,
        tokens: &[Token],
        _registry: &mut MacroRegistry,
    ) -> Result<Option<Vec<Token>>> {
        tracing::info!(target: "ttmacro::debug", "{}", render(tokens));
        Ok(Some(Vec::new()))
    }
}

/// Quotes `text` as a string literal, preferring single quotes.
fn quote(text: &str) -> String {
    let delimiter = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(text.len() + 2);
    out.push(delimiter);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == delimiter => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(delimiter);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::syntax::parse_rule;
    use pretty_assertions::assert_eq;

    fn rules(name: &str, rules: &[(&str, &str)]) -> MacroRules {
        let rules = rules
            .iter()
            .map(|(matcher, transcriber)| {
                parse_rule(&lex(matcher).unwrap(), &lex(transcriber).unwrap()).unwrap()
            })
            .collect();
        MacroRules::new(name, rules)
    }

    fn expand(mac: &dyn Macro, source: &str) -> Result<Option<String>> {
        let mut registry = MacroRegistry::new();
        Ok(mac
            .try_expand(&lex(source).unwrap(), &mut registry)?
            .map(|tokens| render(&tokens)))
    }

    #[test]
    fn test_rules_are_tried_in_order() {
        let mac = rules("pick", &[("$x:name", "name"), ("$x:tt", "tree"), ("", "empty")]);
        assert_eq!(expand(&mac, "a").unwrap().as_deref(), Some("name"));
        assert_eq!(expand(&mac, "(a)").unwrap().as_deref(), Some("tree"));
        assert_eq!(expand(&mac, "").unwrap().as_deref(), Some("empty"));
        assert_eq!(expand(&mac, "a b").unwrap(), None);
    }

    #[test]
    fn test_full_match_is_required() {
        let mac = rules("one", &[("$x:tt", "$x")]);
        assert_eq!(expand(&mac, "a b").unwrap(), None);

        let mut registry = MacroRegistry::new();
        let prefix = mac
            .try_expand_prefix(&lex("a b").unwrap(), &mut registry)
            .unwrap()
            .unwrap();
        assert_eq!(prefix.consumed, 1);
        assert_eq!(render(&prefix.replacement), "a");
    }

    #[test]
    fn test_multi_macro_pipes_outputs() {
        let first: Arc<dyn Macro> = Arc::new(rules("first", &[("a", "b")]));
        let second: Arc<dyn Macro> = Arc::new(rules("second", &[("b", "c")]));
        let multi = MultiMacro::new(vec![first, second]);
        assert_eq!(expand(&multi, "a").unwrap().as_deref(), Some("c"));
        assert_eq!(expand(&multi, "b").unwrap().as_deref(), Some("c"));
        assert_eq!(expand(&multi, "z").unwrap(), None);
    }

    #[test]
    fn test_looping_macro_runs_to_fixpoint() {
        let shrink: Arc<dyn Macro> = Arc::new(rules("shrink", &[("$x:tt $($rest:tt)+", "$($rest)*")]));
        let looping = LoopingMacro::new(shrink.clone(), 10);
        assert_eq!(expand(&looping, "a b c d").unwrap().as_deref(), Some("d"));
        assert_eq!(expand(&looping, "d").unwrap(), None);

        let tight = LoopingMacro::new(shrink, 2);
        assert!(matches!(
            expand(&tight, "a b c d e"),
            Err(MacroError::RecursionLimit { limit: 2, .. })
        ));
    }

    #[test]
    fn test_stringify() {
        assert_eq!(
            expand(&StringifyMacro, "a + (b)").unwrap().as_deref(),
            Some("'a + ( b )'")
        );
        assert_eq!(
            expand(&StringifyMacro, "'x'").unwrap().as_deref(),
            Some("\"'x'\"")
        );
        assert_eq!(expand(&StringifyMacro, "").unwrap().as_deref(), Some("''"));
    }

    #[test]
    fn test_debug_expands_to_nothing() {
        assert_eq!(expand(&DebugMacro, "a b").unwrap().as_deref(), Some(""));
    }
}

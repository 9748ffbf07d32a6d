use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::config::ExpanderConfig;
use crate::error::{MacroError, Result};
use crate::hooks::{
    DeclarationParser, DecoratorInvokerMacro, ImporterMacro, ModuleInvokerMacro, SourceLoader,
};
use crate::lexer::lex;
use crate::macros::{Macro, MultiMacro, ParameterizedMacro, PartialMatchMacro, PrefixExpansion};
use crate::registry::MacroRegistry;
use crate::token::{DelimiterIndex, Token, TokenKind, render, token_tree};

/// Function-style invocations: `name!(...)`, `name![...]`, `name!{...}`, and
/// the block form `name!:` followed by an indented block.
///
/// The macro receives the interior of the delimited tree. A block-form
/// expansion is followed by a newline.
#[derive(Debug, Clone)]
pub struct FunctionInvokerMacro {
    operator: String,
}

impl FunctionInvokerMacro {
    pub fn new(operator: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
        }
    }
}

impl PartialMatchMacro for FunctionInvokerMacro {
    fn try_expand_prefix(
        &self,
        tokens: &[Token],
        registry: &mut MacroRegistry,
    ) -> Result<Option<PrefixExpansion>> {
        let [name, op, next, ..] = tokens else {
            return Ok(None);
        };
        if name.kind != TokenKind::Name || !op.is_op(&self.operator) {
            return Ok(None);
        }

        let (span, block) = match next.kind {
            TokenKind::Open if matches!(next.text.as_str(), "(" | "[" | "{") => {
                (token_tree(tokens, 2)?, false)
            }
            TokenKind::Op
                if next.text == ":"
                    && tokens.get(3).is_some_and(|t| t.kind == TokenKind::Indent) =>
            {
                (token_tree(tokens, 3)?, true)
            }
            _ => return Ok(None),
        };
        let argument = &tokens[span.start + 1..span.end - 1];

        let mac = registry.get(&name.text).ok_or_else(|| MacroError::MacroNotFound {
            name: name.text.clone(),
            position: name.position,
        })?;
        tracing::debug!(name = %name.text, position = %name.position, block, "invoking macro");

        let mut replacement =
            mac.try_expand(argument, registry)?
                .ok_or_else(|| MacroError::UnmatchedInvocation {
                    name: name.text.clone(),
                    argument: render(argument),
                    position: name.position,
                })?;
        if block {
            replacement.push(Token::newline().at(name.position));
        }

        Ok(Some(PrefixExpansion {
            consumed: span.end,
            replacement,
        }))
    }
}

/// Scans a stream left to right, splicing in whatever the first matching
/// hook produces and rescanning from just before the splice.
///
/// Every splice counts against `limit`; exceeding it is a
/// [`MacroError::RecursionLimit`].
#[derive(Debug, Clone)]
pub struct ScanningMacro {
    hooks: Vec<Arc<dyn PartialMatchMacro>>,
    limit: usize,
}

impl ScanningMacro {
    pub fn new(hooks: Vec<Arc<dyn PartialMatchMacro>>, limit: usize) -> Self {
        Self { hooks, limit }
    }
}

impl Macro for ScanningMacro {
    fn try_expand(
        &self,
        tokens: &[Token],
        registry: &mut MacroRegistry,
    ) -> Result<Option<Vec<Token>>> {
        let mut tokens = tokens.to_vec();
        let mut splices = 0;
        let mut pos = 0;

        'scan: while pos < tokens.len() {
            let line_start = pos == 0
                || matches!(
                    tokens[pos - 1].kind,
                    TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent
                );
            for hook in &self.hooks {
                if hook.line_start_only() && !line_start {
                    continue;
                }
                let Some(expansion) = hook.try_expand_prefix(&tokens[pos..], registry)? else {
                    continue;
                };

                splices += 1;
                if splices > self.limit {
                    return Err(MacroError::RecursionLimit {
                        limit: self.limit,
                        position: tokens[pos].position,
                    });
                }
                DelimiterIndex::build(&expansion.replacement)?;

                let end = (pos + expansion.consumed).min(tokens.len());
                tracing::trace!(
                    at = %tokens[pos].position,
                    consumed = expansion.consumed,
                    produced = expansion.replacement.len(),
                    "splice"
                );
                tokens.splice(pos..end, expansion.replacement);

                // The splice may complete an invocation that starts one token earlier.
                pos = pos.saturating_sub(1);
                continue 'scan;
            }
            pos += 1;
        }

        Ok((splices > 0).then_some(tokens))
    }
}

/// Macro expander for whole source units.
pub struct Expander {
    registry: MacroRegistry,
    config: ExpanderConfig,
    module_macros: FxHashMap<String, Arc<dyn ParameterizedMacro>>,
}

impl Expander {
    pub fn new(registry: MacroRegistry) -> Self {
        Self::with_config(registry, ExpanderConfig::default())
    }

    pub fn with_config(registry: MacroRegistry, config: ExpanderConfig) -> Self {
        Self {
            registry,
            config,
            module_macros: FxHashMap::default(),
        }
    }

    /// Enables `![import(a.b)]`, loading modules through `loader`.
    pub fn with_loader(mut self, loader: Arc<dyn SourceLoader>) -> Self {
        let importer = ImporterMacro::new(
            loader,
            self.config.invocation_operator.clone(),
            self.config.recursion_limit,
        );
        self.register_module_macro("import", Arc::new(importer));
        self
    }

    pub fn register_module_macro(
        &mut self,
        name: impl Into<String>,
        mac: Arc<dyn ParameterizedMacro>,
    ) {
        self.module_macros.insert(name.into(), mac);
    }

    pub fn config(&self) -> &ExpanderConfig {
        &self.config
    }

    pub fn registry(&self) -> &MacroRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut MacroRegistry {
        &mut self.registry
    }

    pub fn into_registry(self) -> MacroRegistry {
        self.registry
    }

    /// Module-level macros first, then the scanning pass.
    fn pipeline(&self) -> MultiMacro {
        let operator = self.config.invocation_operator.as_str();

        let mut module = ModuleInvokerMacro::new(operator);
        for (name, mac) in &self.module_macros {
            module.register(name.clone(), mac.clone());
        }

        let hooks: Vec<Arc<dyn PartialMatchMacro>> = vec![
            Arc::new(DeclarationParser::new(operator)),
            Arc::new(DecoratorInvokerMacro::new(operator)),
            Arc::new(FunctionInvokerMacro::new(operator)),
        ];
        let scanner = ScanningMacro::new(hooks, self.config.recursion_limit);

        MultiMacro::new(vec![Arc::new(module), Arc::new(scanner)])
    }

    /// Expand all macros in `tokens` (main entry point).
    ///
    /// Declarations land in the registry's current scope and stay there.
    #[tracing::instrument(level = "debug", skip_all, fields(tokens = tokens.len()))]
    pub fn expand(&mut self, tokens: &[Token]) -> Result<Vec<Token>> {
        DelimiterIndex::build(tokens)?;
        let expanded = self.pipeline().try_expand(tokens, &mut self.registry)?;
        tracing::debug!(changed = expanded.is_some(), "expanded");
        Ok(expanded.unwrap_or_else(|| tokens.to_vec()))
    }

    /// Expand one source unit in a fresh scope, discarded afterwards.
    pub fn expand_unit(&mut self, tokens: &[Token]) -> Result<Vec<Token>> {
        self.registry.push_scope();
        let result = self.expand(tokens);
        self.registry.pop_scope();
        result
    }

    /// Tokenize and expand `source` as one unit.
    pub fn expand_source(&mut self, source: &str) -> Result<Vec<Token>> {
        self.expand_unit(&lex(source)?)
    }
}

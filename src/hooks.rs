//! Syntax hooks: declarations, decorators, module-level macros and imports.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use rustc_hash::FxHashMap;

use crate::bindings::{flatten, single};
use crate::error::{MacroError, Result};
use crate::lexer::lex;
use crate::macros::{
    Macro, MacroRules, MultiMacro, ParameterizedMacro, PartialMatchMacro, PrefixExpansion,
};
use crate::matcher::{match_at, match_full};
use crate::pattern::{CaptureKind, MatcherNode, Quantifier, SpecialToken};
use crate::processor::ScanningMacro;
use crate::registry::MacroRegistry;
use crate::syntax::parse_declaration;
use crate::token::{Position, Token, TokenKind, render, token_tree};

/// Recognizes `macro_rules!` declarations, defines them in the current
/// scope and removes them from the stream.
#[derive(Debug, Clone)]
pub struct DeclarationParser {
    operator: String,
}

impl DeclarationParser {
    pub fn new(operator: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
        }
    }
}

impl PartialMatchMacro for DeclarationParser {
    fn try_expand_prefix(
        &self,
        tokens: &[Token],
        registry: &mut MacroRegistry,
    ) -> Result<Option<PrefixExpansion>> {
        let Some(declaration) = parse_declaration(tokens, 0, &self.operator)? else {
            return Ok(None);
        };
        let name = declaration.name.clone();
        registry.define(name, Arc::new(MacroRules::new(declaration.name, declaration.rules)));
        Ok(Some(PrefixExpansion {
            consumed: declaration.end,
            replacement: Vec::new(),
        }))
    }
}

/// `@name!` or `@name!(params)` on its own line, applied to the item below.
///
/// The item is the next logical line, or a line and the indented block that
/// follows it; stacked decorator lines are part of the item. The macro
/// receives the `(params)` group, if any, followed by the item.
#[derive(Debug, Clone)]
pub struct DecoratorInvokerMacro {
    operator: String,
}

impl DecoratorInvokerMacro {
    pub fn new(operator: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
        }
    }
}

impl PartialMatchMacro for DecoratorInvokerMacro {
    fn try_expand_prefix(
        &self,
        tokens: &[Token],
        registry: &mut MacroRegistry,
    ) -> Result<Option<PrefixExpansion>> {
        let [at, name, op, ..] = tokens else {
            return Ok(None);
        };
        if !at.is_op("@") || name.kind != TokenKind::Name || !op.is_op(&self.operator) {
            return Ok(None);
        }

        let mut argument = Vec::new();
        let mut pos = 3;
        if tokens
            .get(pos)
            .is_some_and(|t| t.kind == TokenKind::Open && t.text == "(")
        {
            let span = token_tree(tokens, pos)?;
            argument.extend_from_slice(&tokens[span.clone()]);
            pos = span.end;
        }
        if !tokens
            .get(pos)
            .is_some_and(|t| t.kind == TokenKind::Newline)
        {
            return Ok(None);
        }
        pos += 1;

        let end = decorated_item_end(tokens, pos)?;
        if end == pos {
            return Err(MacroError::syntax(
                format!("decorator `@{}{}` is not followed by an item", name.text, self.operator),
                at.position,
            ));
        }
        argument.extend_from_slice(&tokens[pos..end]);

        let mac = registry.get(&name.text).ok_or_else(|| MacroError::MacroNotFound {
            name: name.text.clone(),
            position: name.position,
        })?;
        tracing::debug!(name = %name.text, position = %at.position, "invoking decorator macro");
        let mut replacement = mac.try_expand(&argument, registry)?.ok_or_else(|| {
            MacroError::UnmatchedInvocation {
                name: name.text.clone(),
                argument: render(&argument),
                position: name.position,
            }
        })?;
        // An item ending in a block carries no newline of its own.
        let ends_block = tokens[end - 1].kind == TokenKind::Dedent;
        let ends_line = replacement
            .last()
            .is_some_and(|t| matches!(t.kind, TokenKind::Newline | TokenKind::Dedent));
        if ends_block && !ends_line {
            replacement.push(Token::newline());
        }

        Ok(Some(PrefixExpansion {
            consumed: end,
            replacement,
        }))
    }

    fn line_start_only(&self) -> bool {
        true
    }
}

fn decorated_item_end(tokens: &[Token], start: usize) -> Result<usize> {
    let mut pos = start;
    let mut line_start = start;
    while let Some(token) = tokens.get(pos) {
        match token.kind {
            TokenKind::Newline if tokens[line_start].is_op("@") => {
                pos += 1;
                line_start = pos;
            }
            TokenKind::Newline | TokenKind::Dedent | TokenKind::Close => return Ok(pos),
            TokenKind::Indent => return Ok(token_tree(tokens, pos)?.end),
            TokenKind::Open => pos = token_tree(tokens, pos)?.end,
            _ => pos += 1,
        }
    }
    Ok(pos)
}

/// `! [ $name:name $( ( $($parameters:tt)* ) )? ] $($^)?`
fn module_invocation_pattern(operator: &str) -> Vec<MatcherNode> {
    use MatcherNode as M;
    vec![
        M::literal(Token::op(operator)),
        M::literal(Token::open("[")),
        M::capture("name", CaptureKind::Name),
        M::repeat(
            vec![
                M::literal(Token::open("(")),
                M::repeat(
                    vec![M::capture("parameters", CaptureKind::TokenTree)],
                    None,
                    Quantifier::ZeroOrMore,
                ),
                M::literal(Token::close(")")),
            ],
            None,
            Quantifier::ZeroOrOne,
        ),
        M::literal(Token::close("]")),
        M::repeat(
            vec![M::Special(SpecialToken::Newline)],
            None,
            Quantifier::ZeroOrOne,
        ),
    ]
}

/// Runs the module-level macros invoked at the top of a unit.
///
/// Invocations must come before any other code, after an optional docstring
/// line. Each one is removed and its macro is handed the rest of the unit.
#[derive(Debug, Clone)]
pub struct ModuleInvokerMacro {
    pattern: Vec<MatcherNode>,
    macros: FxHashMap<String, Arc<dyn ParameterizedMacro>>,
}

impl ModuleInvokerMacro {
    pub fn new(operator: &str) -> Self {
        Self {
            pattern: module_invocation_pattern(operator),
            macros: FxHashMap::default(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, mac: Arc<dyn ParameterizedMacro>) {
        self.macros.insert(name.into(), mac);
    }
}

impl Macro for ModuleInvokerMacro {
    fn try_expand(
        &self,
        tokens: &[Token],
        registry: &mut MacroRegistry,
    ) -> Result<Option<Vec<Token>>> {
        let (docstring, body) = match tokens {
            [doc, newline, ..]
                if doc.kind == TokenKind::String && newline.kind == TokenKind::Newline =>
            {
                tokens.split_at(2)
            }
            _ => (&[][..], tokens),
        };

        let mut current: Option<Vec<Token>> = None;
        loop {
            let input = current.as_deref().unwrap_or(body);
            let Some(m) = match_at(&self.pattern, input, 0) else {
                break;
            };
            let Some(name) = single(&m.bindings, "name") else {
                break;
            };
            let parameters = flatten(m.bindings.get("parameters"));
            let mac = self
                .macros
                .get(&name.text)
                .ok_or_else(|| MacroError::MacroNotFound {
                    name: name.text.clone(),
                    position: name.position,
                })?;

            tracing::debug!(name = %name.text, parameters = %render(&parameters), "invoking module-level macro");
            let rest = &input[m.end..];
            let next = mac
                .apply(&parameters, rest, registry)?
                .unwrap_or_else(|| rest.to_vec());
            current = Some(next);
        }

        Ok(current.map(|rest| docstring.iter().cloned().chain(rest).collect()))
    }
}

/// Supplies module sources to [`ImporterMacro`].
pub trait SourceLoader: fmt::Debug + Send + Sync {
    /// The source text of the dotted module path `module`.
    fn load(&self, module: &str) -> io::Result<String>;
}

/// Modules held in memory, keyed by dotted path.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    modules: FxHashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, module: impl Into<String>, source: impl Into<String>) -> Self {
        self.modules.insert(module.into(), source.into());
        self
    }
}

impl SourceLoader for MemoryLoader {
    fn load(&self, module: &str) -> io::Result<String> {
        self.modules.get(module).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no module named `{module}`"))
        })
    }
}

/// Modules on disk: `a.b` is `<root>/a/b.<extension>`.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
    extension: String,
}

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extension: "py".to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn path_of(&self, module: &str) -> PathBuf {
        let mut path = self.root.clone();
        path.extend(module.split('.'));
        path.set_extension(&self.extension);
        path
    }
}

impl SourceLoader for DirectoryLoader {
    fn load(&self, module: &str) -> io::Result<String> {
        std::fs::read_to_string(self.path_of(module))
    }
}

/// `$($_:name).+`
static MODULE_PATH: LazyLock<Vec<MatcherNode>> = LazyLock::new(|| {
    vec![MatcherNode::repeat(
        vec![MatcherNode::capture("_", CaptureKind::Name)],
        Some(Token::op(".")),
        Quantifier::OneOrMore,
    )]
});

/// The module-level `import` macro: `![import(a.b)]`.
///
/// Scrapes the `macro_rules!` declarations of the named module, and of the
/// modules it imports in turn, into the current scope. The rest of the unit
/// is left unchanged.
#[derive(Debug, Clone)]
pub struct ImporterMacro {
    loader: Arc<dyn SourceLoader>,
    operator: String,
    limit: usize,
}

impl ImporterMacro {
    pub fn new(loader: Arc<dyn SourceLoader>, operator: impl Into<String>, limit: usize) -> Self {
        Self {
            loader,
            operator: operator.into(),
            limit,
        }
    }

    fn scrape(&self, module: &str, position: Position, registry: &mut MacroRegistry) -> Result<()> {
        let source = self.loader.load(module).map_err(|err| MacroError::Import {
            module: module.to_string(),
            message: err.to_string(),
            position,
        })?;
        let tokens = lex(&source)?;

        let mut invoker = ModuleInvokerMacro::new(&self.operator);
        invoker.register("import", Arc::new(self.clone()));
        let scanner = ScanningMacro::new(
            vec![Arc::new(DeclarationParser::new(self.operator.clone()))],
            self.limit,
        );
        MultiMacro::new(vec![Arc::new(invoker), Arc::new(scanner)]).try_expand(&tokens, registry)?;

        tracing::debug!(module, "imported macros");
        Ok(())
    }
}

impl ParameterizedMacro for ImporterMacro {
    fn apply(
        &self,
        parameters: &[Token],
        _tokens: &[Token],
        registry: &mut MacroRegistry,
    ) -> Result<Option<Vec<Token>>> {
        let position = parameters.first().map(|t| t.position).unwrap_or_default();
        if match_full(&MODULE_PATH, parameters).is_none() {
            return Err(MacroError::Import {
                module: render(parameters),
                message: "expected a dotted module path".to_string(),
                position,
            });
        }

        let module: String = parameters.iter().map(|t| t.text.as_str()).collect();
        if !registry.begin_import(&module) {
            return Err(MacroError::Import {
                module,
                message: "import cycle".to_string(),
                position,
            });
        }
        let result = self.scrape(&module, position, registry);
        registry.end_import();
        result.map(|()| None)
    }
}

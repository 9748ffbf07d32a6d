//! Named macros, scoped per source unit.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::{MacroError, Result};
use crate::lexer::lex;
use crate::macros::{DebugMacro, Macro, StringifyMacro};
use crate::processor::Expander;
use crate::token::Position;

/// Shared handle to a registered macro.
pub type MacroRef = Arc<dyn Macro>;

type Scope = FxHashMap<String, MacroRef>;

/// Macros exported for use by every unit.
///
/// Built once with [`ExportTable::builder`] before any unit that uses it is
/// expanded, and read-only from then on.
#[derive(Debug, Default)]
pub struct ExportTable {
    macros: Scope,
}

impl ExportTable {
    pub fn builder() -> ExportTableBuilder {
        ExportTableBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&MacroRef> {
        self.macros.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct ExportTableBuilder {
    macros: Scope,
}

impl ExportTableBuilder {
    /// Export `mac` under `name`, replacing any earlier export.
    pub fn export(mut self, name: impl Into<String>, mac: impl Macro + 'static) -> Self {
        self.macros.insert(name.into(), Arc::new(mac));
        self
    }

    pub fn export_shared(mut self, name: impl Into<String>, mac: MacroRef) -> Self {
        self.macros.insert(name.into(), mac);
        self
    }

    /// Export every `macro_rules!` declaration in `source`.
    pub fn load(mut self, source: &str) -> Result<Self> {
        let mut registry = MacroRegistry::new();
        registry.load(source)?;
        self.macros.extend(registry.take_scope());
        Ok(self)
    }

    pub fn build(self) -> Arc<ExportTable> {
        Arc::new(ExportTable {
            macros: self.macros,
        })
    }
}

/// Registry of macro definitions.
///
/// Scopes nest: lookup walks from the innermost scope outwards and falls back
/// to the shared export table. The outermost scope holds the builtins
/// `stringify` and `debug`.
#[derive(Debug, Clone)]
pub struct MacroRegistry {
    scopes: Vec<Scope>,
    exports: Arc<ExportTable>,
    /// Modules currently being imported, outermost first
    importing: Vec<String>,
}

impl Default for MacroRegistry {
    fn default() -> Self {
        Self::with_exports(Arc::default())
    }
}

impl MacroRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exports(exports: Arc<ExportTable>) -> Self {
        let mut builtins = Scope::default();
        builtins.insert("stringify".to_string(), Arc::new(StringifyMacro) as MacroRef);
        builtins.insert("debug".to_string(), Arc::new(DebugMacro) as MacroRef);
        Self {
            scopes: vec![builtins, Scope::default()],
            exports,
            importing: Vec::new(),
        }
    }

    /// Load macro definitions from source text.
    /// Expands the source; declarations populate the current scope as a side effect.
    pub fn load(&mut self, source: &str) -> Result<()> {
        let tokens = lex(source)?;
        let mut expander = Expander::new(std::mem::take(self));
        let result = expander.expand(&tokens);
        *self = expander.into_registry();
        result.map(drop)
    }

    /// Load macro definitions from a file
    pub fn load_file(&mut self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|err| MacroError::Import {
            module: path.display().to_string(),
            message: err.to_string(),
            position: Position::default(),
        })?;
        self.load(&source)
    }

    /// Register a macro in the current scope.
    pub fn define(&mut self, name: impl Into<String>, mac: MacroRef) {
        let name = name.into();
        tracing::debug!(name = %name, depth = self.scopes.len(), "defining macro");
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, mac);
        }
    }

    /// Resolve `name`, innermost scope first.
    pub fn get(&self, name: &str) -> Option<MacroRef> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .or_else(|| self.exports.get(name))
            .cloned()
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn exports(&self) -> &Arc<ExportTable> {
        &self.exports
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Discard the innermost scope and everything defined in it. The builtin
    /// scope is never popped.
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Number of scopes, builtins included.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Empties the current scope, returning its definitions.
    fn take_scope(&mut self) -> Scope {
        self.scopes.last_mut().map(std::mem::take).unwrap_or_default()
    }

    /// Marks `module` as being imported; false if it already is.
    pub(crate) fn begin_import(&mut self, module: &str) -> bool {
        if self.importing.iter().any(|m| m == module) {
            return false;
        }
        self.importing.push(module.to_string());
        true
    }

    pub(crate) fn end_import(&mut self) {
        self.importing.pop();
    }
}

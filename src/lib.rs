//! Token-tree macros for Python-like source.
//!
//! Macros are declared in the source itself with `macro_rules!` and invoked
//! as `name!(...)`, `name!:` followed by an indented block, `@name!` above an
//! item, or `![name(...)]` at the top of a unit. An [`Expander`] scans a token
//! stream, splices in each expansion and rescans until nothing is left to
//! expand.
//!
//! ```
//! use ttmacro::{Expander, MacroRegistry, render};
//!
//! let source = "\
//! macro_rules! square:
//!     [$x:tt]: $x * $x
//!
//! y = square!(3)";
//! let tokens = Expander::new(MacroRegistry::new()).expand_source(source)?;
//! assert_eq!(render(&tokens), "y = 3 * 3");
//! # Ok::<(), ttmacro::MacroError>(())
//! ```

pub mod bindings;
pub mod config;
pub mod error;
pub mod hooks;
pub mod lexer;
pub mod macros;
pub mod matcher;
pub mod pattern;
pub mod processor;
pub mod registry;
pub mod syntax;
pub mod token;
pub mod transcriber;

pub use bindings::{Binding, Bindings};
pub use config::ExpanderConfig;
pub use error::{MacroError, Result};
pub use hooks::{DirectoryLoader, MemoryLoader, SourceLoader};
pub use lexer::lex;
pub use macros::{Macro, MacroRules, ParameterizedMacro, PartialMatchMacro, PrefixExpansion};
pub use processor::Expander;
pub use registry::{ExportTable, MacroRef, MacroRegistry};
pub use token::{Position, Token, TokenKind, render};

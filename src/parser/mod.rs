//! Resilient source parsing.
//!
//! This module provides:
//! - `ParserService`: parses one Python file and never fails on its content
//! - `SyntaxTree`: a tree tagged with the engine that produced it
//! - a tree-sitter concrete engine (feature `tree-sitter`) and a built-in
//!   outline engine used as the fallback

use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use tracing::debug;
#[cfg(feature = "tree-sitter")]
use tracing::warn;

use crate::config::{ParserConfig, SyntaxErrorPolicy};
use crate::error::ParserInitError;

pub mod outline;

#[cfg(feature = "tree-sitter")]
pub mod treesitter;

pub use outline::{Module, SyntaxError};

/// The engine that produced a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineTag {
    ConcreteSyntaxTree,
    AbstractSyntaxTree,
}

impl EngineTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineTag::ConcreteSyntaxTree => "concrete_syntax_tree",
            EngineTag::AbstractSyntaxTree => "abstract_syntax_tree",
        }
    }
}

/// Kind of a named element in the outline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Class,
    Import,
}

/// A named code element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Symbol {
    /// Function or class name, or the imported module.
    pub name: String,
    pub kind: SymbolKind,
    /// First line, 1-indexed. Decorators are included.
    pub line: usize,
    pub end_line: usize,
}

impl Symbol {
    pub fn new(name: &str, kind: SymbolKind, line: usize, end_line: usize) -> Self {
        Self {
            name: name.to_string(),
            kind,
            line,
            end_line,
        }
    }
}

/// What the pipeline keeps of a concrete syntax tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcreteTree {
    pub root_kind: String,
    pub node_count: usize,
    pub symbols: Vec<Symbol>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxTree {
    Concrete(ConcreteTree),
    Abstract(Module),
}

impl SyntaxTree {
    pub fn engine(&self) -> EngineTag {
        match self {
            SyntaxTree::Concrete(_) => EngineTag::ConcreteSyntaxTree,
            SyntaxTree::Abstract(_) => EngineTag::AbstractSyntaxTree,
        }
    }

    pub fn symbols(&self) -> Vec<Symbol> {
        match self {
            SyntaxTree::Concrete(tree) => tree.symbols.clone(),
            SyntaxTree::Abstract(module) => module.symbols(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            SyntaxTree::Concrete(tree) => tree.symbols.is_empty(),
            SyntaxTree::Abstract(module) => module.is_empty(),
        }
    }
}

/// The result of parsing one file.
#[derive(Debug, Clone)]
pub struct ParsedSource {
    /// Source text, lossily decoded.
    pub text: String,
    pub tree: SyntaxTree,
    /// Set when both engines rejected the source; `tree` is then an empty module.
    pub syntax_error: Option<SyntaxError>,
}

impl ParsedSource {
    pub fn engine(&self) -> EngineTag {
        self.tree.engine()
    }

    /// Newline count plus one, so a trailing newline opens a final empty line.
    pub fn line_count(&self) -> usize {
        self.text.matches('\n').count() + 1
    }
}

/// Availability of the concrete engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineStatus {
    Available,
    Absent(String),
}

/// Parses Python source with the concrete engine when available and the
/// built-in outline engine otherwise.
///
/// Built once per analyzer and shared by reference.
pub struct ParserService {
    #[cfg(feature = "tree-sitter")]
    concrete: Option<treesitter::ConcreteEngine>,
    status: EngineStatus,
    syntax_errors: SyntaxErrorPolicy,
}

impl ParserService {
    /// Build the service. Fails only when the concrete engine is compiled in,
    /// enabled, and its grammar or query cannot be loaded.
    pub fn new(config: &ParserConfig) -> Result<Self, ParserInitError> {
        #[cfg(feature = "tree-sitter")]
        {
            if config.concrete_engine {
                let engine = treesitter::ConcreteEngine::new()?;
                debug!("concrete syntax tree engine loaded");
                return Ok(Self {
                    concrete: Some(engine),
                    status: EngineStatus::Available,
                    syntax_errors: config.syntax_errors,
                });
            }
        }

        let reason = if cfg!(feature = "tree-sitter") {
            "disabled by configuration"
        } else {
            "not compiled in"
        };
        debug!(reason, "concrete syntax tree engine absent");

        Ok(Self {
            #[cfg(feature = "tree-sitter")]
            concrete: None,
            status: EngineStatus::Absent(reason.to_string()),
            syntax_errors: config.syntax_errors,
        })
    }

    /// A service that only uses the built-in engine.
    pub fn builtin_only(syntax_errors: SyntaxErrorPolicy) -> Self {
        Self {
            #[cfg(feature = "tree-sitter")]
            concrete: None,
            status: EngineStatus::Absent("disabled by configuration".to_string()),
            syntax_errors,
        }
    }

    pub fn engine_status(&self) -> &EngineStatus {
        &self.status
    }

    pub fn syntax_error_policy(&self) -> SyntaxErrorPolicy {
        self.syntax_errors
    }

    /// Parse source bytes. Never fails: unparseable source yields an empty
    /// abstract tree with `syntax_error` set.
    pub fn parse_source(&self, source: &[u8]) -> ParsedSource {
        let text = String::from_utf8_lossy(source).into_owned();

        if let Some(tree) = self.parse_concrete(source) {
            return ParsedSource {
                text,
                tree: SyntaxTree::Concrete(tree),
                syntax_error: None,
            };
        }

        let (module, syntax_error) =
            match catch_unwind(AssertUnwindSafe(|| outline::parse_module(source))) {
                Ok(Ok(module)) => (module, None),
                Ok(Err(err)) => (Module::empty(), Some(err)),
                Err(_) => (
                    Module::empty(),
                    Some(SyntaxError {
                        message: "internal parser error".to_string(),
                        line: 1,
                    }),
                ),
            };

        ParsedSource {
            text,
            tree: SyntaxTree::Abstract(module),
            syntax_error,
        }
    }

    #[cfg(feature = "tree-sitter")]
    fn parse_concrete(&self, source: &[u8]) -> Option<ConcreteTree> {
        let engine = self.concrete.as_ref()?;
        match catch_unwind(AssertUnwindSafe(|| engine.parse(source))) {
            Ok(Ok(tree)) => Some(tree),
            Ok(Err(reason)) => {
                debug!(%reason, "concrete parse failed, using built-in engine");
                None
            }
            Err(_) => {
                warn!("concrete engine panicked, using built-in engine");
                None
            }
        }
    }

    #[cfg(not(feature = "tree-sitter"))]
    fn parse_concrete(&self, _source: &[u8]) -> Option<ConcreteTree> {
        None
    }

    /// Read and parse a file. Only the read can fail.
    pub fn parse_file(&self, path: &Path) -> std::io::Result<ParsedSource> {
        let bytes = std::fs::read(path)?;
        Ok(self.parse_source(&bytes))
    }
}

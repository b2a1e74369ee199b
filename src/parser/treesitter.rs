//! Tree-sitter based concrete engine for Python.
//!
//! The grammar and the outline query are loaded once, when the engine is
//! built. A fresh [`TsParser`] is created per parse so the engine can be
//! shared across worker threads.

use streaming_iterator::StreamingIterator;
use tree_sitter::{Language, Node, Parser as TsParser, Query, QueryCursor};

use super::{ConcreteTree, Symbol, SymbolKind};
use crate::error::ParserInitError;

/// Tree-sitter query for the outline of a Python module.
///
/// Captures:
/// - `func_name`: names of function definitions
/// - `class_name`: names of class definitions
/// - `import`: whole import statements
const OUTLINE_QUERY: &str = r#"
(function_definition name: (identifier) @func_name)
(class_definition name: (identifier) @class_name)
(import_statement) @import
(import_from_statement) @import
"#;

/// Concrete syntax tree engine.
pub struct ConcreteEngine {
    language: Language,
    query: Query,
}

impl ConcreteEngine {
    /// Load the Python grammar and compile the outline query.
    pub fn new() -> Result<Self, ParserInitError> {
        let language: Language = tree_sitter_python::LANGUAGE.into();

        let mut probe = TsParser::new();
        probe
            .set_language(&language)
            .map_err(|e| ParserInitError::Grammar(e.to_string()))?;

        let query = Query::new(&language, OUTLINE_QUERY)
            .map_err(|e| ParserInitError::Query(e.to_string()))?;

        Ok(Self { language, query })
    }

    /// Parse `source`. A tree containing error or missing nodes is rejected.
    pub fn parse(&self, source: &[u8]) -> Result<ConcreteTree, String> {
        let mut parser = TsParser::new();
        parser
            .set_language(&self.language)
            .map_err(|e| e.to_string())?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| "parser returned no tree".to_string())?;

        let root = tree.root_node();
        if root.has_error() {
            return Err(format!(
                "syntax error near line {}",
                first_error_line(root).unwrap_or(1)
            ));
        }

        Ok(ConcreteTree {
            root_kind: root.kind().to_string(),
            node_count: root.descendant_count(),
            symbols: self.symbols(root, source),
        })
    }

    fn symbols(&self, root: Node, source: &[u8]) -> Vec<Symbol> {
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&self.query, root, source);
        let mut symbols = Vec::new();

        while let Some(m) = matches.next() {
            for capture in m.captures {
                let capture_name = self.query.capture_names()[capture.index as usize];
                let node = capture.node;

                let symbol = match capture_name {
                    "func_name" | "class_name" => {
                        let name = node.utf8_text(source).unwrap_or("");
                        let kind = if capture_name == "func_name" {
                            SymbolKind::Function
                        } else {
                            SymbolKind::Class
                        };
                        let definition = node.parent().map(outer_definition).unwrap_or(node);
                        Symbol::new(
                            name,
                            kind,
                            definition.start_position().row + 1,
                            definition.end_position().row + 1,
                        )
                    }
                    "import" => {
                        let name = import_module(node)
                            .and_then(|n| n.utf8_text(source).ok())
                            .unwrap_or("");
                        Symbol::new(
                            name,
                            SymbolKind::Import,
                            node.start_position().row + 1,
                            node.end_position().row + 1,
                        )
                    }
                    _ => continue,
                };

                if !symbol.name.is_empty() {
                    symbols.push(symbol);
                }
            }
        }

        symbols
    }
}

/// A decorated definition spans its decorators.
fn outer_definition(node: Node) -> Node {
    match node.parent() {
        Some(parent) if parent.kind() == "decorated_definition" => parent,
        _ => node,
    }
}

fn import_module(node: Node) -> Option<Node> {
    if let Some(module) = node.child_by_field_name("module_name") {
        return Some(module);
    }
    let first = node.named_child(0)?;
    if first.kind() == "aliased_import" {
        first.child_by_field_name("name")
    } else {
        Some(first)
    }
}

/// Line of the first error or missing node, found by walking down the
/// children that contain errors. Iterative: nesting depth is bounded only by
/// the source size.
fn first_error_line(node: Node) -> Option<usize> {
    let mut cursor = node.walk();
    loop {
        let current = cursor.node();
        if current.is_error() || current.is_missing() {
            return Some(current.start_position().row + 1);
        }
        if !current.has_error() || !cursor.goto_first_child() {
            return None;
        }
        while !cursor.node().has_error() {
            if !cursor.goto_next_sibling() {
                return None;
            }
        }
    }
}

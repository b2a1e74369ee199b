//! Built-in outline parser for Python source.
//!
//! Produces an abstract syntax tree that keeps only the structure the
//! pipeline cares about: imports, decorated `def`/`class` blocks and the
//! nesting of compound statements. It is always compiled in and is the
//! fallback whenever the concrete engine is absent or rejects a file.
//!
//! Syntax checking is deliberately shallow but strict about the errors that
//! break block structure:
//! - invalid UTF-8 and NUL bytes
//! - unterminated string literals
//! - unbalanced brackets
//! - unexpected indent / inconsistent dedent / missing indented block
//! - malformed `def`, `class`, `from ... import` and decorator lines

use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

use super::{Symbol, SymbolKind};

lazy_static! {
    static ref DEF_HEADER: Regex =
        Regex::new(r"^(async\s+)?def\s+([^\W\d]\w*)\s*\(").unwrap();
    static ref CLASS_HEADER: Regex =
        Regex::new(r"^class\s+([^\W\d]\w*)\s*(?:\((.*)\))?\s*:").unwrap();
    static ref FROM_IMPORT: Regex = Regex::new(r"^from\s+(\S+)\s+import\s+(.+)$").unwrap();
}

/// Tab stops used when measuring indentation.
const TAB_WIDTH: usize = 8;

/// Deepest block nesting accepted, as in CPython's tokenizer.
const MAX_INDENT_LEVELS: usize = 100;

/// A syntax error reported by the outline parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    /// 1-indexed line the error was detected on.
    pub line: usize,
}

impl SyntaxError {
    fn new(message: impl Into<String>, line: usize) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (line {})", self.message, self.line)
    }
}

impl std::error::Error for SyntaxError {}

/// Root of the outline tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Module {
    pub body: Vec<Stmt>,
}

impl Module {
    /// The empty module substituted for unparseable source.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Functions, classes and imports in source order, including nested ones.
    pub fn symbols(&self) -> Vec<Symbol> {
        let mut out = Vec::new();
        collect_symbols(&self.body, &mut out);
        out
    }
}

fn collect_symbols(body: &[Stmt], out: &mut Vec<Symbol>) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::Import { names } => {
                if let Some(first) = names.first() {
                    out.push(Symbol::new(first, SymbolKind::Import, stmt.line, stmt.end_line));
                }
            }
            StmtKind::ImportFrom { module, .. } => {
                out.push(Symbol::new(module, SymbolKind::Import, stmt.line, stmt.end_line));
            }
            StmtKind::FunctionDef { name, body, .. } => {
                out.push(Symbol::new(name, SymbolKind::Function, stmt.line, stmt.end_line));
                collect_symbols(body, out);
            }
            StmtKind::ClassDef { name, body, .. } => {
                out.push(Symbol::new(name, SymbolKind::Class, stmt.line, stmt.end_line));
                collect_symbols(body, out);
            }
            StmtKind::Compound { body, .. } => collect_symbols(body, out),
            StmtKind::Other => {}
        }
    }
}

/// A statement with its line span (1-indexed, inclusive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: usize,
    pub end_line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StmtKind {
    /// `import a.b as c, d`
    Import { names: Vec<String> },
    /// `from a import b, c`
    ImportFrom { module: String, names: Vec<String> },
    FunctionDef {
        name: String,
        is_async: bool,
        decorators: Vec<String>,
        body: Vec<Stmt>,
    },
    ClassDef {
        name: String,
        bases: Vec<String>,
        decorators: Vec<String>,
        body: Vec<Stmt>,
    },
    /// Any other statement that opens a block (`if`, `for`, `with`, ...).
    Compound { keyword: String, body: Vec<Stmt> },
    Other,
}

/// Parse Python source into an outline.
pub fn parse_module(source: &[u8]) -> Result<Module, SyntaxError> {
    let text = std::str::from_utf8(source).map_err(|e| {
        let line = source[..e.valid_up_to()].iter().filter(|&&b| b == b'\n').count() + 1;
        SyntaxError::new(
            format!("invalid utf-8 sequence at byte {}", e.valid_up_to()),
            line,
        )
    })?;

    if let Some(pos) = text.find('\0') {
        let line = text[..pos].matches('\n').count() + 1;
        return Err(SyntaxError::new(
            "source code cannot contain null bytes",
            line,
        ));
    }

    let lines = logical_lines(text)?;
    let mut pos = 0;
    let mut enclosing = Vec::new();
    let body = parse_block(&lines, &mut pos, 0, &mut enclosing)?;
    Ok(Module { body })
}

/// One logical line: physical lines joined across brackets, strings and
/// backslash continuations, with comments removed.
#[derive(Debug)]
struct LogicalLine {
    indent: usize,
    text: String,
    line: usize,
    end_line: usize,
}

#[derive(Debug, Clone, Copy)]
struct OpenString {
    quote: char,
    triple: bool,
    line: usize,
}

fn measure_indent(prefix: &str) -> usize {
    let mut width = 0;
    for c in prefix.chars() {
        match c {
            '\t' => width = (width / TAB_WIDTH + 1) * TAB_WIDTH,
            ' ' => width += 1,
            _ => {}
        }
    }
    width
}

fn logical_lines(text: &str) -> Result<Vec<LogicalLine>, SyntaxError> {
    let mut out = Vec::new();
    let mut current: Option<LogicalLine> = None;
    let mut brackets: Vec<(char, usize)> = Vec::new();
    let mut string: Option<OpenString> = None;
    let mut last_line = 1;

    for (idx, raw) in text.split('\n').enumerate() {
        let line_no = idx + 1;
        last_line = line_no;
        let raw = raw.strip_suffix('\r').unwrap_or(raw);

        let segment = match current {
            Some(_) => raw,
            None => {
                let stripped = raw.trim_start_matches([' ', '\t', '\x0c']);
                if stripped.is_empty() || stripped.starts_with('#') {
                    continue;
                }
                let indent = measure_indent(&raw[..raw.len() - stripped.len()]);
                current = Some(LogicalLine {
                    indent,
                    text: String::new(),
                    line: line_no,
                    end_line: line_no,
                });
                stripped
            }
        };

        let logical = match current.as_mut() {
            Some(l) => l,
            None => continue,
        };
        logical.end_line = line_no;

        let continued = scan_segment(segment, line_no, logical, &mut brackets, &mut string)?;

        if string.is_some() || !brackets.is_empty() || continued {
            logical.text.push(' ');
            continue;
        }

        if let Some(mut done) = current.take() {
            let trimmed = done.text.trim_end().len();
            done.text.truncate(trimmed);
            out.push(done);
        }
    }

    if let Some(open) = string {
        let message = if open.triple {
            "unterminated triple-quoted string literal"
        } else {
            "unterminated string literal"
        };
        return Err(SyntaxError::new(message, open.line));
    }
    if let Some((open, line)) = brackets.last() {
        return Err(SyntaxError::new(format!("'{}' was never closed", open), *line));
    }
    if current.is_some() {
        return Err(SyntaxError::new("unexpected EOF while parsing", last_line));
    }

    Ok(out)
}

/// Scan one physical segment into `logical`. Returns true when the segment
/// ends in a backslash continuation outside of any string.
fn scan_segment(
    segment: &str,
    line_no: usize,
    logical: &mut LogicalLine,
    brackets: &mut Vec<(char, usize)>,
    string: &mut Option<OpenString>,
) -> Result<bool, SyntaxError> {
    let chars: Vec<char> = segment.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if let Some(open) = *string {
            if c == '\\' {
                logical.text.push(c);
                if let Some(&next) = chars.get(i + 1) {
                    logical.text.push(next);
                }
                i += 2;
                continue;
            }
            if c == open.quote {
                if !open.triple {
                    *string = None;
                } else if chars.get(i + 1) == Some(&open.quote)
                    && chars.get(i + 2) == Some(&open.quote)
                {
                    logical.text.push(c);
                    logical.text.push(c);
                    i += 2;
                    *string = None;
                }
            }
            logical.text.push(c);
            i += 1;
            continue;
        }

        match c {
            '#' => break,
            '\'' | '"' => {
                let triple = chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c);
                *string = Some(OpenString {
                    quote: c,
                    triple,
                    line: line_no,
                });
                if triple {
                    logical.text.push(c);
                    logical.text.push(c);
                    i += 2;
                }
            }
            '(' | '[' | '{' => brackets.push((c, line_no)),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match brackets.pop() {
                    Some((open, _)) if open == expected => {}
                    Some((open, _)) => {
                        return Err(SyntaxError::new(
                            format!(
                                "closing parenthesis '{}' does not match opening parenthesis '{}'",
                                c, open
                            ),
                            line_no,
                        ))
                    }
                    None => {
                        return Err(SyntaxError::new(format!("unmatched '{}'", c), line_no))
                    }
                }
            }
            '\\' if i + 1 == chars.len() => return Ok(true),
            _ => {}
        }

        logical.text.push(c);
        i += 1;
    }

    // A single-quoted string may only cross a line break via a trailing backslash.
    if let Some(open) = *string {
        if !open.triple && !segment.ends_with('\\') {
            return Err(SyntaxError::new("unterminated string literal", open.line));
        }
    }

    Ok(false)
}

fn first_word(text: &str) -> &str {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .next()
        .unwrap_or("")
}

fn parse_block(
    lines: &[LogicalLine],
    pos: &mut usize,
    indent: usize,
    enclosing: &mut Vec<usize>,
) -> Result<Vec<Stmt>, SyntaxError> {
    let mut body = Vec::new();
    let mut decorators: Vec<(String, usize)> = Vec::new();

    while *pos < lines.len() {
        let line = &lines[*pos];

        if line.indent < indent {
            if !enclosing.contains(&line.indent) {
                return Err(SyntaxError::new(
                    "unindent does not match any outer indentation level",
                    line.line,
                ));
            }
            break;
        }
        if line.indent > indent {
            return Err(SyntaxError::new("unexpected indent", line.line));
        }

        *pos += 1;
        let text = line.text.as_str();

        if let Some(decorator) = text.strip_prefix('@') {
            let decorator = decorator.trim();
            if decorator.is_empty() {
                return Err(SyntaxError::new("invalid syntax", line.line));
            }
            decorators.push((decorator.to_string(), line.line));
            continue;
        }

        let opens_block = text.ends_with(':');
        let child = if opens_block {
            match lines.get(*pos) {
                Some(next) if next.indent > indent => {
                    if enclosing.len() >= MAX_INDENT_LEVELS {
                        return Err(SyntaxError::new(
                            "too many levels of indentation",
                            next.line,
                        ));
                    }
                    enclosing.push(indent);
                    let child = parse_block(lines, pos, next.indent, enclosing);
                    enclosing.pop();
                    child?
                }
                _ => {
                    return Err(SyntaxError::new(
                        format!("expected an indented block after line {}", line.line),
                        line.end_line,
                    ))
                }
            }
        } else {
            Vec::new()
        };

        let end_line = child.last().map(|s| s.end_line).unwrap_or(line.end_line);
        let start_line = decorators.first().map(|(_, l)| *l).unwrap_or(line.line);
        let pending: Vec<String> = decorators.drain(..).map(|(d, _)| d).collect();

        let kind = parse_statement(text, line.line, pending, child)?;
        body.push(Stmt {
            kind,
            line: start_line,
            end_line,
        });
    }

    if let Some((_, line)) = decorators.first() {
        return Err(SyntaxError::new("decorator without a definition", *line));
    }

    Ok(body)
}

fn parse_statement(
    text: &str,
    line: usize,
    decorators: Vec<String>,
    body: Vec<Stmt>,
) -> Result<StmtKind, SyntaxError> {
    let keyword = first_word(text);
    let is_def = keyword == "def" || (keyword == "async" && text[5..].trim_start().starts_with("def"));

    if is_def {
        let caps = DEF_HEADER
            .captures(text)
            .ok_or_else(|| SyntaxError::new("invalid function definition", line))?;
        if !text.contains(':') {
            return Err(SyntaxError::new("expected ':'", line));
        }
        return Ok(StmtKind::FunctionDef {
            name: caps[2].to_string(),
            is_async: caps.get(1).is_some(),
            decorators,
            body,
        });
    }

    if keyword == "class" {
        let caps = CLASS_HEADER
            .captures(text)
            .ok_or_else(|| SyntaxError::new("invalid class definition", line))?;
        let bases = caps
            .get(2)
            .map(|m| split_names(m.as_str()))
            .unwrap_or_default();
        return Ok(StmtKind::ClassDef {
            name: caps[1].to_string(),
            bases,
            decorators,
            body,
        });
    }

    if !decorators.is_empty() {
        return Err(SyntaxError::new("decorator without a definition", line));
    }

    match keyword {
        "import" => {
            let names: Vec<String> = split_names(&text["import".len()..])
                .into_iter()
                .map(|n| strip_alias(&n))
                .collect();
            if names.is_empty() {
                return Err(SyntaxError::new("invalid syntax", line));
            }
            Ok(StmtKind::Import { names })
        }
        "from" => {
            let caps = FROM_IMPORT
                .captures(text)
                .ok_or_else(|| SyntaxError::new("invalid syntax", line))?;
            let names = split_names(caps[2].trim_matches(|c| c == '(' || c == ')' || c == ' '))
                .into_iter()
                .map(|n| strip_alias(&n))
                .collect();
            Ok(StmtKind::ImportFrom {
                module: caps[1].to_string(),
                names,
            })
        }
        _ if !body.is_empty() => Ok(StmtKind::Compound {
            keyword: keyword.to_string(),
            body,
        }),
        _ => Ok(StmtKind::Other),
    }
}

fn split_names(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_alias(name: &str) -> String {
    name.split_whitespace().next().unwrap_or("").to_string()
}

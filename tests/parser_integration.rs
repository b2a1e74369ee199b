//! Parser service behaviour on fixture files and arbitrary bytes.

mod common;

use common::sample_repo;
use repolens::config::{ParserConfig, SyntaxErrorPolicy};
use repolens::parser::{EngineStatus, ParsedSource, SymbolKind};
use repolens::{EngineTag, ParserService, SyntaxTree};

fn service() -> ParserService {
    ParserService::new(&ParserConfig::default()).expect("parser should initialize")
}

#[test]
fn test_engine_status_matches_features() {
    let parser = service();
    #[cfg(feature = "tree-sitter")]
    assert_eq!(parser.engine_status(), &EngineStatus::Available);
    #[cfg(not(feature = "tree-sitter"))]
    assert!(matches!(parser.engine_status(), EngineStatus::Absent(_)));

    let builtin = ParserService::builtin_only(SyntaxErrorPolicy::Ignore);
    assert!(matches!(builtin.engine_status(), EngineStatus::Absent(_)));
}

#[test]
fn test_fixture_models_symbols() {
    let parsed = service()
        .parse_file(&sample_repo().join("backend/models.py"))
        .unwrap();

    assert!(parsed.syntax_error.is_none());
    let symbols = parsed.tree.symbols();
    let class = symbols
        .iter()
        .find(|s| s.kind == SymbolKind::Class)
        .expect("class symbol");
    assert_eq!(class.name, "Item");
    assert_eq!(class.line, 9);
    assert!(symbols
        .iter()
        .any(|s| s.kind == SymbolKind::Function && s.name == "__repr__"));
    assert_eq!(
        symbols
            .iter()
            .filter(|s| s.kind == SymbolKind::Import)
            .count(),
        2
    );
}

#[test]
fn test_fixture_broken_falls_back() {
    let parsed = service()
        .parse_file(&sample_repo().join("backend/broken.py"))
        .unwrap();

    assert_eq!(parsed.engine(), EngineTag::AbstractSyntaxTree);
    assert!(parsed.tree.is_empty());
    assert!(parsed.syntax_error.is_some());
    assert!(matches!(parsed.tree, SyntaxTree::Abstract(_)));
    assert!(parsed.text.contains("load_settings"));
}

#[test]
fn test_builtin_and_default_agree_on_valid_source() {
    let source = std::fs::read(sample_repo().join("backend/main.py")).unwrap();
    let builtin = ParserService::builtin_only(SyntaxErrorPolicy::Ignore).parse_source(&source);
    let default = service().parse_source(&source);

    let names = |tree: &SyntaxTree| -> Vec<String> {
        tree.symbols()
            .into_iter()
            .filter(|s| s.kind == SymbolKind::Function)
            .map(|s| s.name)
            .collect()
    };
    assert_eq!(names(&builtin.tree), vec!["read_item", "create_item"]);
    assert_eq!(names(&builtin.tree), names(&default.tree));
}

/// xorshift, so the inputs are reproducible without an RNG dependency.
fn next(state: &mut u64) -> u64 {
    *state ^= *state << 13;
    *state ^= *state >> 7;
    *state ^= *state << 17;
    *state
}

#[test]
fn test_arbitrary_bytes_always_yield_a_tree() {
    let parser = service();
    let mut state = 0x9E37_79B9_7F4A_7C15u64;
    let fragments: &[&[u8]] = &[
        b"def ", b"class ", b"(", b")", b":", b"\n", b"    ", b"\t", b"'", b"\"\"\"", b"\\",
        b"import ", b"from ", b"@", b"#", b"[", b"]", b"{", b"}", b"\r\n", b"x", b"\xff",
        b"\x00", b"lambda", b"async ", b"=",
    ];

    for _ in 0..500 {
        let len = (next(&mut state) % 64) as usize;
        let mut input = Vec::new();
        for _ in 0..len {
            let pick = next(&mut state);
            if pick % 4 == 0 {
                input.push((pick >> 8) as u8);
            } else {
                input.extend_from_slice(fragments[(pick as usize >> 3) % fragments.len()]);
            }
        }

        let parsed = parser.parse_source(&input);
        match parsed.engine() {
            EngineTag::ConcreteSyntaxTree => assert!(parsed.syntax_error.is_none()),
            EngineTag::AbstractSyntaxTree => {
                if parsed.syntax_error.is_some() {
                    assert!(parsed.tree.is_empty());
                }
            }
        }
        assert!(parsed.line_count() >= 1);
    }
}

fn assert_tree_invariants(parsed: &ParsedSource) {
    match parsed.engine() {
        EngineTag::ConcreteSyntaxTree => assert!(parsed.syntax_error.is_none()),
        EngineTag::AbstractSyntaxTree => {
            if parsed.syntax_error.is_some() {
                assert!(parsed.tree.is_empty());
            }
        }
    }
    assert!(parsed.line_count() >= 1);
}

/// Nested brackets and blocks, optionally with a stray token at the
/// deepest point.
fn nested_inputs(depth: usize) -> Vec<Vec<u8>> {
    let wrap = |open: &str, inner: &str, close: &str| {
        format!("x = {}{}{}\n", open.repeat(depth), inner, close.repeat(depth)).into_bytes()
    };
    let mut ifs = String::new();
    for level in 0..depth.min(300) {
        ifs.push_str(&" ".repeat(level));
        ifs.push_str("if x:\n");
    }
    ifs.push_str(&" ".repeat(depth.min(300)));
    ifs.push_str("pass\n");

    vec![
        wrap("(", "1", ")"),
        wrap("(", "1 +", ")"),
        wrap("[", "1", "]"),
        wrap("{", "1:", "}"),
        wrap("[(", "*", ")]"),
        format!("x = {}\n", "(".repeat(depth)).into_bytes(),
        ifs.into_bytes(),
    ]
}

#[test]
fn test_deeply_nested_sources_yield_a_tree() {
    let parsers = [service(), ParserService::builtin_only(SyntaxErrorPolicy::Record)];
    for depth in [1, 99, 100, 101, 5_000, 50_000] {
        for input in nested_inputs(depth) {
            for parser in &parsers {
                assert_tree_invariants(&parser.parse_source(&input));
            }
        }
    }
}

#[test]
fn test_nested_parens_with_one_error_fall_back() {
    let depth = 200_000;
    let source = format!(
        "x = 1\ny = {}1{}\n",
        "(".repeat(depth),
        ")".repeat(depth - 1)
    );

    let parsed = service().parse_source(source.as_bytes());
    assert_eq!(parsed.engine(), EngineTag::AbstractSyntaxTree);
    assert!(parsed.syntax_error.is_some());
    assert!(parsed.tree.is_empty());
    assert_eq!(parsed.line_count(), 3);
}

#[test]
fn test_inputs_near_file_size_limit() {
    let limit = repolens::Config::default().max_file_bytes as usize;
    let parsers = [service(), ParserService::builtin_only(SyntaxErrorPolicy::Ignore)];

    let mut lines = String::new();
    let mut i = 0;
    while lines.len() < limit - 64 {
        lines.push_str(&format!("def f{}(a, b):\n    return a + b\n", i));
        i += 1;
    }
    let mut random = Vec::with_capacity(limit);
    let mut state = 0xD1B5_4A32_D192_ED03u64;
    while random.len() < limit - 1 {
        random.push(next(&mut state) as u8);
    }
    let parens = format!("x = {}", "(".repeat(limit - 8)).into_bytes();

    for input in [lines.into_bytes(), random, parens] {
        assert!(input.len() <= limit);
        for parser in &parsers {
            assert_tree_invariants(&parser.parse_source(&input));
        }
    }
}

//! Parser edge cases: rejected syntax, invalid targets, structural limits
//! and error recovery.

use scriptbox_lexer::Lexer;
use scriptbox_parser::{ParseResult, Parser, MAX_BLOCK_DEPTH, MAX_EXPR_DEPTH, MAX_TREE_DEPTH};
use scriptbox_types::ast::*;
use scriptbox_types::{ErrorCode, SourceFile};

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

fn parse(source: &str) -> ParseResult {
    let sf = SourceFile::new("<snippet>", source);
    let lex = Lexer::new(&sf).lex();
    let mut result = Parser::new(lex.tokens, &sf).parse();
    let mut errors = lex.errors;
    errors.extend(result.errors);
    result.errors = errors;
    result
}

fn error_codes(source: &str) -> Vec<ErrorCode> {
    parse(source).errors.errors.iter().map(|e| e.code).collect()
}

fn first_error(source: &str) -> (ErrorCode, String) {
    let result = parse(source);
    let err = result
        .errors
        .errors
        .first()
        .unwrap_or_else(|| panic!("expected an error for {source:?}"));
    (err.code, err.message.clone())
}

// ═══════════════════════════════════════════════════════════════════════
// 1. Unsupported syntax
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_reserved_statements_are_rejected() {
    for source in ["class A:\n    pass\n", "global x\n", "del x\n", "with f:\n    pass\n"] {
        let (code, _) = first_error(source);
        assert_eq!(code, ErrorCode::UNSUPPORTED_SYNTAX, "for {source:?}");
    }
}

#[test]
fn test_reserved_statement_body_is_skipped() {
    // One error for `class`, none for its indented body.
    assert_eq!(
        error_codes("class A:\n    x = 1\n    y = 2\nz = 3\n"),
        vec![ErrorCode::UNSUPPORTED_SYNTAX]
    );
}

#[test]
fn test_unsupported_forms() {
    let cases = [
        "from math import *",
        "from . import x",
        "f(*args)",
        "{**a}",
        "{1, 2}",
        "def f(*args):\n    pass\n",
        "for x in y:\n    pass\nelse:\n    pass\n",
        "try:\n    pass\nexcept (A, B):\n    pass\n",
        "raise A from B",
        "x: int",
    ];
    for source in cases {
        let (code, message) = first_error(source);
        assert_eq!(code, ErrorCode::UNSUPPORTED_SYNTAX, "{source:?}: {message}");
    }
}

// ═══════════════════════════════════════════════════════════════════════
// 2. Assignment targets
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_invalid_assignment_targets() {
    for source in ["1 = x", "f() = 1", "a + b = 1", "obj.attr = 1", "x, y += 1"] {
        let (code, _) = first_error(source);
        assert_eq!(code, ErrorCode::INVALID_ASSIGNMENT_TARGET, "for {source:?}");
    }
}

#[test]
fn test_attribute_assignment_has_suggestion() {
    let result = parse("obj.attr = 1");
    assert!(result.errors.errors[0].suggestion.is_some());
}

// ═══════════════════════════════════════════════════════════════════════
// 3. Malformed input
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_missing_colon() {
    let (code, message) = first_error("if x\n    y = 1\n");
    assert_eq!(code, ErrorCode::UNEXPECTED_TOKEN);
    assert!(message.contains("':'"), "{message}");
}

#[test]
fn test_missing_indented_block() {
    let (code, message) = first_error("if x:\ny = 1\n");
    assert_eq!(code, ErrorCode::INCONSISTENT_INDENTATION);
    assert!(message.contains("indented block"));
}

#[test]
fn test_unexpected_indent_at_top_level() {
    assert_eq!(
        error_codes("x = 1\n    y = 2\n"),
        vec![ErrorCode::INCONSISTENT_INDENTATION]
    );
}

#[test]
fn test_unclosed_bracket() {
    let (code, _) = first_error("x = [1, 2\n");
    assert_eq!(code, ErrorCode::UNEXPECTED_TOKEN);
}

#[test]
fn test_try_without_handlers() {
    let (code, message) = first_error("try:\n    pass\nx = 1\n");
    assert_eq!(code, ErrorCode::UNEXPECTED_TOKEN);
    assert!(message.contains("except"));
}

#[test]
fn test_non_default_parameter_after_default() {
    let (_, message) = first_error("def f(a=1, b):\n    pass\n");
    assert!(message.contains("default"));
}

#[test]
fn test_positional_after_keyword_argument() {
    let (_, message) = first_error("f(a=1, 2)");
    assert!(message.contains("positional argument follows keyword"));
}

#[test]
fn test_two_statements_on_one_line() {
    let (code, message) = first_error("x = 1 y = 2");
    assert_eq!(code, ErrorCode::UNEXPECTED_TOKEN);
    assert!(message.contains("expected newline"));
}

#[test]
fn test_fstring_field_errors_point_into_snippet() {
    let result = parse("a = 1\nmsg = f'value: {a +}'\n");
    let err = &result.errors.errors[0];
    assert_eq!(err.code, ErrorCode::UNEXPECTED_TOKEN);
    assert_eq!(err.span.start_line, 2);
    assert_eq!(err.source_line, "msg = f'value: {a +}'");
}

// ═══════════════════════════════════════════════════════════════════════
// 4. Structural limits
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_expression_depth_limit() {
    let depth = MAX_EXPR_DEPTH as usize + 5;
    let source = format!("x = {}1{}", "(".repeat(depth), ")".repeat(depth));
    assert!(error_codes(&source).contains(&ErrorCode::STRUCTURAL_LIMIT_EXCEEDED));
}

#[test]
fn test_expression_depth_within_limit() {
    let source = format!("x = {}1{}", "(".repeat(20), ")".repeat(20));
    assert!(error_codes(&source).is_empty());
}

#[test]
fn test_unary_chain_is_bounded() {
    let source = format!("x = {}1", "not ".repeat(MAX_EXPR_DEPTH as usize + 5));
    assert!(error_codes(&source).contains(&ErrorCode::STRUCTURAL_LIMIT_EXCEEDED));
}

#[test]
fn test_long_operator_chain_is_bounded() {
    let source = format!("x = 1{}", " + 1".repeat(5000));
    assert_eq!(
        first_error(&source).0,
        ErrorCode::STRUCTURAL_LIMIT_EXCEEDED
    );
    let source = format!("x = a{}", " or b".repeat(MAX_TREE_DEPTH as usize));
    assert!(error_codes(&source).contains(&ErrorCode::STRUCTURAL_LIMIT_EXCEEDED));
}

#[test]
fn test_postfix_chain_is_bounded() {
    let source = format!("x = f{}", "(1)".repeat(MAX_TREE_DEPTH as usize + 1));
    assert!(error_codes(&source).contains(&ErrorCode::STRUCTURAL_LIMIT_EXCEEDED));
    let source = format!("x = d{}", "[0]".repeat(MAX_TREE_DEPTH as usize + 1));
    assert!(error_codes(&source).contains(&ErrorCode::STRUCTURAL_LIMIT_EXCEEDED));
}

#[test]
fn test_chains_inside_brackets_share_the_budget() {
    // Each chain fits on its own; a group opened mid-chain inherits its links.
    let chain = format!("1{}", " * 2".repeat(100));
    assert!(error_codes(&format!("x = {chain}")).is_empty());
    assert!(error_codes(&format!("x = ({chain}) + ({chain}) + ({chain})")).is_empty());
    let nested = format!("x = {}1{}", format!("{chain} * (").repeat(3), ")".repeat(3));
    assert!(error_codes(&nested).contains(&ErrorCode::STRUCTURAL_LIMIT_EXCEEDED));
}

#[test]
fn test_moderate_chains_parse() {
    let source = format!("total = 0{}", " + n".repeat(200));
    assert!(error_codes(&source).is_empty());
    let source = "x = obj.items()[0].name.upper().strip()";
    assert!(error_codes(source).is_empty());
}

#[test]
fn test_block_depth_limit() {
    let mut source = String::new();
    for level in 0..(MAX_BLOCK_DEPTH as usize + 2) {
        source.push_str(&" ".repeat(level));
        source.push_str("if x:\n");
    }
    source.push_str(&" ".repeat(MAX_BLOCK_DEPTH as usize + 2));
    source.push_str("pass\n");
    assert!(error_codes(&source).contains(&ErrorCode::STRUCTURAL_LIMIT_EXCEEDED));
}

// ═══════════════════════════════════════════════════════════════════════
// 5. Error recovery
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_recovery_keeps_following_statements() {
    let result = parse("a = 1\nb = = 2\nc = 3\n");
    assert_eq!(result.errors.total_errors, 1);
    let program = result.program.expect("program");
    let names: Vec<&str> = program
        .body
        .iter()
        .filter_map(|s| match &s.kind {
            StmtKind::Assign { targets, .. } => targets[0].names().first().copied(),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec!["a", "c"]);
}

#[test]
fn test_recovery_inside_block() {
    let result = parse("if x:\n    a = )\n    b = 2\nc = 3\n");
    assert_eq!(result.errors.total_errors, 1);
    let program = result.program.expect("program");
    assert_eq!(program.body.len(), 2);
}

#[test]
fn test_error_count_is_capped() {
    let source = "x = )\n".repeat(40);
    let result = parse(&source);
    assert!(result.errors.errors.len() <= scriptbox_types::MAX_ERRORS);
}

#[test]
fn test_empty_program_parses_to_empty_body() {
    let result = parse("\n\n# only a comment\n");
    assert!(!result.errors.has_errors());
    assert!(result.program.expect("program").body.is_empty());
}

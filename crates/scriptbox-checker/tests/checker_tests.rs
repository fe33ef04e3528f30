//! Checker tests: normalisation, structural checks and permission policy.

use scriptbox_checker::{fingerprint, parse, CheckError};
use scriptbox_types::ast::StmtKind;
use scriptbox_types::{ErrorCategory, ErrorCode, Permission};

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

fn rejection(source: &str, permission: Permission) -> CheckError {
    match parse(source, permission) {
        Ok(_) => panic!("expected {source:?} to be rejected under {permission}"),
        Err(err) => err,
    }
}

fn policy_codes(source: &str, permission: Permission) -> Vec<ErrorCode> {
    match rejection(source, permission) {
        CheckError::Policy(errors) => errors.errors.iter().map(|e| e.code).collect(),
        other => panic!("expected a policy rejection, got {other}"),
    }
}

fn syntax_codes(source: &str) -> Vec<ErrorCode> {
    match rejection(source, Permission::ALL) {
        CheckError::Syntax(errors) => errors.errors.iter().map(|e| e.code).collect(),
        other => panic!("expected a syntax rejection, got {other}"),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// 1. Accepted snippets
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_accepts_basic_snippet() {
    let parsed = parse("a = 1\nb = a + 2\nb", Permission::BASIC).expect("accepted");
    assert_eq!(parsed.program.body.len(), 3);
    assert_eq!(parsed.source, "a = 1\nb = a + 2\nb");
}

#[test]
fn test_accepts_everything_under_all() {
    let source = "\
import math
def f(x, y=2):
    if x > y:
        return [i * 2 for i in range(x)]
    return None
try:
    r = f(3)
except ValueError as e:
    r = None
assert r is not None
";
    assert!(parse(source, Permission::ALL).is_ok());
}

#[test]
fn test_markdown_fence_is_stripped() {
    let parsed = parse("```python\nx = 1\n```", Permission::BASIC).expect("accepted");
    assert_eq!(parsed.source, "x = 1");
    assert!(matches!(parsed.program.body[0].kind, StmtKind::Assign { .. }));
}

#[test]
fn test_indented_snippet_is_dedented() {
    let parsed = parse("    x = 1\n    x\n", Permission::BASIC).expect("accepted");
    assert_eq!(parsed.source, "x = 1\nx");
}

#[test]
fn test_fingerprint_is_sha256_of_normalised_text() {
    let a = parse("x = 1\r\n", Permission::ALL).expect("accepted");
    let b = parse("  x = 1", Permission::ALL).expect("accepted");
    assert_eq!(a.fingerprint, b.fingerprint);
    assert_eq!(a.fingerprint, fingerprint("x = 1"));
    assert_eq!(a.fingerprint.len(), 64);
    assert_eq!(
        fingerprint(""),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

// ═══════════════════════════════════════════════════════════════════════
// 2. Syntax rejections
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_malformed_snippet_is_syntax_error() {
    let err = rejection("x = (1 +", Permission::ALL);
    assert!(matches!(err, CheckError::Syntax(_)));
    assert!(err
        .errors()
        .errors
        .iter()
        .all(|e| e.category == ErrorCategory::Syntax));
}

#[test]
fn test_empty_snippet() {
    assert_eq!(syntax_codes("   \n# nothing here\n"), vec![ErrorCode::EMPTY_PROGRAM]);
    assert_eq!(syntax_codes(""), vec![ErrorCode::EMPTY_PROGRAM]);
}

#[test]
fn test_return_outside_function() {
    assert_eq!(syntax_codes("return 1"), vec![ErrorCode::MISPLACED_CONTROL_FLOW]);
}

#[test]
fn test_break_and_continue_outside_loop() {
    assert_eq!(syntax_codes("break"), vec![ErrorCode::MISPLACED_CONTROL_FLOW]);
    assert_eq!(
        syntax_codes("if True:\n    continue\n"),
        vec![ErrorCode::MISPLACED_CONTROL_FLOW]
    );
}

#[test]
fn test_break_inside_def_inside_loop_is_misplaced() {
    let source = "for i in range(3):\n    def f():\n        break\n";
    assert_eq!(syntax_codes(source), vec![ErrorCode::MISPLACED_CONTROL_FLOW]);
}

#[test]
fn test_control_flow_in_place_is_accepted() {
    let source = "def f(xs):\n    for x in xs:\n        if x:\n            break\n        continue\n    return 1\n";
    assert!(parse(source, Permission::ALL).is_ok());
}

#[test]
fn test_syntax_reported_before_policy() {
    // Would also violate policy, but only the syntax error is reported.
    let err = rejection("import os\nx = = 1", Permission::BASIC);
    assert!(matches!(err, CheckError::Syntax(_)));
}

// ═══════════════════════════════════════════════════════════════════════
// 3. Permission policy
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_basic_is_required() {
    assert_eq!(
        policy_codes("x = 1", Permission::NONE),
        vec![ErrorCode::CONSTRUCT_NOT_PERMITTED]
    );
}

#[test]
fn test_construct_families_need_their_flag() {
    let cases: &[(&str, Permission)] = &[
        ("if x:\n    y = 1\n", Permission::CONDITION),
        ("y = 1 if x else 2", Permission::CONDITION),
        ("for i in x:\n    pass\n", Permission::LOOP),
        ("while x:\n    pass\n", Permission::LOOP),
        ("y = [i for i in x]", Permission::LOOP),
        ("y = {k: 1 for k in x}", Permission::LOOP),
        ("y = sum(i for i in x)", Permission::LOOP),
        ("try:\n    pass\nexcept:\n    pass\n", Permission::EXCEPTION),
        ("raise ValueError('no')", Permission::EXCEPTION),
        ("assert x", Permission::EXCEPTION),
        ("def f():\n    pass\n", Permission::FUNCTION_DEFINITION),
        ("f = lambda a: a", Permission::FUNCTION_DEFINITION),
        ("import math", Permission::IMPORT),
        ("from math import sqrt", Permission::IMPORT),
    ];
    for (source, flag) in cases {
        let denied = Permission::ALL - *flag;
        assert_eq!(
            policy_codes(source, denied),
            vec![ErrorCode::CONSTRUCT_NOT_PERMITTED],
            "{source:?} without {flag}"
        );
        assert!(parse(source, Permission::BASIC | *flag).is_ok(), "{source:?}");
    }
}

#[test]
fn test_each_violation_is_reported() {
    let source = "import math\nfor i in x:\n    y = [j for j in i]\n";
    assert_eq!(policy_codes(source, Permission::BASIC).len(), 3);
}

#[test]
fn test_policy_error_names_missing_flag() {
    let err = rejection("while True:\n    pass\n", Permission::BASIC);
    let first = &err.errors().errors[0];
    assert!(first.message.contains("LOOP"), "{}", first.message);
    assert_eq!(first.category, ErrorCategory::Policy);
    assert!(first
        .suggestion
        .as_deref()
        .is_some_and(|s| s.contains("Permission::LOOP")));
    assert_eq!(first.span.start_line, 1);
    assert_eq!(first.source_line, "while True:");
}

#[test]
fn test_forbidden_names_always_rejected() {
    for source in [
        "exec('x = 1')",
        "y = eval",
        "open('/etc/passwd')",
        "__import__('os')",
        "f = getattr",
        "from os import open",
    ] {
        assert!(
            policy_codes(source, Permission::ALL).contains(&ErrorCode::FORBIDDEN_NAME),
            "{source:?}"
        );
    }
}

#[test]
fn test_forbidden_name_inside_nested_code() {
    let source = "def f():\n    return [compile(s) for s in xs]\n";
    assert!(policy_codes(source, Permission::ALL).contains(&ErrorCode::FORBIDDEN_NAME));
    let source = "msg = f'{input()}'";
    assert!(policy_codes(source, Permission::ALL).contains(&ErrorCode::FORBIDDEN_NAME));
}

#[test]
fn test_dunder_attribute_rejected() {
    assert_eq!(
        policy_codes("x = ().__class__.__bases__", Permission::ALL),
        vec![ErrorCode::FORBIDDEN_ATTRIBUTE, ErrorCode::FORBIDDEN_ATTRIBUTE]
    );
}

#[test]
fn test_plain_attribute_allowed() {
    assert!(parse("x = 'a,b'.split(',')", Permission::BASIC).is_ok());
}

#[test]
fn test_scoped_permission_does_not_leak_into_explicit_argument() {
    let _guard = scriptbox_types::permission::scoped(Permission::BASIC);
    assert!(parse("import math", Permission::ALL).is_ok());
}

// ═══════════════════════════════════════════════════════════════════════
// 4. Serialisation
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_check_error_serializes_with_diagnostics() {
    let err = rejection("import math", Permission::BASIC);
    let json = serde_json::to_value(&err).unwrap();
    let first = &json["Policy"]["errors"][0];
    assert_eq!(first["code"], 400);
    assert_eq!(first["category"], "policy");
    assert_eq!(first["line"], 1);

    let back: CheckError = serde_json::from_value(json).unwrap();
    assert_eq!(back, err);
}

#[test]
fn test_display_lists_errors() {
    let err = rejection("import math", Permission::BASIC);
    let text = err.to_string();
    assert!(text.starts_with("permission denied:"), "{text}");
    assert!(text.contains("E400"), "{text}");
    assert!(text.contains("import math"), "{text}");
}

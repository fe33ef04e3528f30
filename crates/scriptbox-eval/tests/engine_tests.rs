//! Engine tests: result capture, ambient context, permissions and faults.

use scriptbox_checker::CheckError;
use scriptbox_eval::{
    context, run, Bindings, Engine, EngineConfig, RunError, RuntimeError, Value, RESULT_KEY,
};
use scriptbox_types::{permission, ErrorCode, Permission};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn bindings(pairs: &[(&str, Value)]) -> Bindings {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn ok(source: &str) -> Bindings {
    init_logs();
    match run(source, None, Bindings::new()) {
        Ok(bindings) => bindings,
        Err(err) => panic!("{source:?} failed:\n{err}"),
    }
}

fn fault(source: &str) -> RuntimeError {
    match run(source, None, Bindings::new()) {
        Err(RunError::Evaluation(fault)) => fault.cause,
        other => panic!("expected {source:?} to fault, got {other:?}"),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Result capture
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_trailing_expression_is_the_result() {
    assert_eq!(
        ok("a = 1\na + 2"),
        bindings(&[("a", Value::Int(1)), (RESULT_KEY, Value::Int(3))])
    );
}

#[test]
fn test_single_assignment() {
    assert_eq!(
        ok("x = 5"),
        bindings(&[("x", Value::Int(5)), (RESULT_KEY, Value::Int(5))])
    );
}

#[test]
fn test_chained_assignment_binds_every_target() {
    let result = ok("x = y = 2 * 3");
    assert_eq!(result["x"], Value::Int(6));
    assert_eq!(result["y"], Value::Int(6));
    assert_eq!(result[RESULT_KEY], Value::Int(6));
}

#[test]
fn test_trailing_subscript_and_tuple_assignment() {
    let result = ok("d = {}\nd['k'] = 7");
    assert_eq!(result[RESULT_KEY], Value::Int(7));
    assert_eq!(
        result["d"],
        Value::Dict([(scriptbox_eval::Key::Str("k".into()), Value::Int(7))].into_iter().collect())
    );

    let result = ok("a, b = 1, 2");
    assert_eq!(result["a"], Value::Int(1));
    assert_eq!(result["b"], Value::Int(2));
    assert_eq!(
        result[RESULT_KEY],
        Value::Tuple(vec![Value::Int(1), Value::Int(2)])
    );
}

#[test]
fn test_trailing_augmented_assignment_reports_updated_value() {
    let result = ok("total = 10\ntotal += 5");
    assert_eq!(result["total"], Value::Int(15));
    assert_eq!(result[RESULT_KEY], Value::Int(15));
}

#[test]
fn test_effect_only_program_uses_last_introduced_local() {
    let result = ok("items = []\nfor i in range(3):\n    items.append(i * i)");
    assert_eq!(result["i"], Value::Int(2));
    // `i` was introduced after `items`.
    assert_eq!(result[RESULT_KEY], Value::Int(2));

    let result = ok("def double(n):\n    return n * 2");
    assert!(matches!(result[RESULT_KEY], Value::Function(_)));
}

#[test]
fn test_effect_only_without_locals_is_none() {
    let result = ok("if 1 > 2:\n    x = 1");
    assert_eq!(result, bindings(&[(RESULT_KEY, Value::None)]));
}

#[test]
fn test_markdown_fenced_snippet_runs() {
    let result = ok("Here you go:\n```python\nvalue = 40\nvalue + 2\n```\n");
    assert_eq!(result[RESULT_KEY], Value::Int(42));
}

#[test]
fn test_print_is_captured_not_written() {
    let execution = Engine::default()
        .execute("print('a', 1, sep='-')\nprint('b', end='!')", None, Bindings::new())
        .unwrap();
    assert_eq!(execution.stdout, "a-1\nb!");
    assert_eq!(execution.result(), &Value::None);
    assert_eq!(execution.fingerprint.len(), 64);
}

// ══════════════════════════════════════════════════════════════════════════════
// Ambient names
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_extra_bindings_are_visible_but_not_returned() {
    let extra = bindings(&[("rate", Value::Float(0.5)), ("unused", Value::Int(1))]);
    let result = run("cost = 10 * rate", None, extra).unwrap();
    assert_eq!(
        result,
        bindings(&[("cost", Value::Float(5.0)), (RESULT_KEY, Value::Float(5.0))])
    );
}

#[test]
fn test_precedence_context_then_extra_then_locals() {
    let _outer = context::push(bindings(&[("a", Value::Int(1)), ("b", Value::Int(1))]));
    let _inner = context::push(bindings(&[("b", Value::Int(2)), ("c", Value::Int(2))]));
    let extra = bindings(&[("c", Value::Int(3))]);
    let result = run("(a, b, c)", None, extra).unwrap();
    assert_eq!(
        result[RESULT_KEY],
        Value::Tuple(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
    );

    let result = run("len = 4\nlen", None, Bindings::new()).unwrap();
    assert_eq!(result[RESULT_KEY], Value::Int(4));
}

#[test]
fn test_context_scope_restores_after_run() {
    let depth = context::depth();
    context::scope(bindings(&[("n", Value::Int(9))]), |_| {
        assert_eq!(run("n * 2", None, Bindings::new()).unwrap()[RESULT_KEY], Value::Int(18));
    });
    assert_eq!(context::depth(), depth);
    assert!(matches!(fault("n"), RuntimeError::Name(_)));
}

#[test]
fn test_mutating_ambient_container_does_not_leak() {
    let extra = bindings(&[("xs", Value::List(vec![Value::Int(1)]))]);
    let caller_copy = extra.clone();
    let result = run("xs.append(2)\nlen(xs)", None, extra).unwrap();
    assert_eq!(result[RESULT_KEY], Value::Int(2));
    assert!(!result.contains_key("xs"));
    assert_eq!(caller_copy["xs"], Value::List(vec![Value::Int(1)]));
}

#[test]
fn test_native_functions_from_context() {
    let shout = Value::native("shout", |args: &[Value]| {
        Ok(Value::str(args[0].to_str().to_uppercase()))
    });
    let result = run("shout('hi') + '!'", None, bindings(&[("shout", shout)])).unwrap();
    assert_eq!(result[RESULT_KEY], Value::str("HI!"));
}

// ══════════════════════════════════════════════════════════════════════════════
// Permissions
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_rejections_propagate_unchanged() {
    let err = run("for i in range(3):\n    pass", Some(Permission::BASIC), Bindings::new())
        .unwrap_err();
    let RunError::Rejected(CheckError::Policy(errors)) = err else {
        panic!("expected a policy rejection, got {err:?}");
    };
    assert_eq!(errors.errors[0].code, ErrorCode::CONSTRUCT_NOT_PERMITTED);

    let err = run("x = (", None, Bindings::new()).unwrap_err();
    assert!(matches!(err, RunError::Rejected(CheckError::Syntax(_))));
}

#[test]
fn test_scoped_permission_is_used_when_none_given() {
    let _guard = permission::scoped(Permission::BASIC);
    let err = run("import math", None, Bindings::new()).unwrap_err();
    assert!(matches!(err, RunError::Rejected(CheckError::Policy(_))));
    let ok = run(
        "import math\nmath.floor(2.5)",
        Some(Permission::BASIC | Permission::IMPORT),
        Bindings::new(),
    )
    .unwrap();
    assert_eq!(ok[RESULT_KEY], Value::Int(2));
}

// ══════════════════════════════════════════════════════════════════════════════
// Faults
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_fault_carries_source_cause_and_line() {
    let err = run("a = 1\nb = 0\na / b", None, Bindings::new()).unwrap_err();
    let RunError::Evaluation(fault) = err else {
        panic!("expected an evaluation fault");
    };
    assert_eq!(fault.source, "a = 1\nb = 0\na / b");
    assert_eq!(fault.cause, RuntimeError::ZeroDivision("division by zero".into()));
    assert_eq!(fault.line, Some(3));
    let shown = fault.to_string();
    assert!(shown.starts_with("line 3: ZeroDivisionError: division by zero"));
    assert!(shown.contains("3 | a / b"));
}

#[test]
fn test_fault_line_points_inside_function() {
    let source = "def f(x):\n    y = x + 1\n    return y / 0\nf(1)";
    let RunError::Evaluation(fault) = run(source, None, Bindings::new()).unwrap_err() else {
        panic!("expected an evaluation fault");
    };
    assert_eq!(fault.line, Some(3));
}

#[test]
fn test_run_error_round_trips_through_json() {
    let err = run("undefined_name", None, Bindings::new()).unwrap_err();
    let json = serde_json::to_string(&err).unwrap();
    let back: RunError = serde_json::from_str(&json).unwrap();
    assert_eq!(back, err);
    assert_eq!(back.cause().map(RuntimeError::kind), Some("NameError"));
}

#[test]
fn test_gas_limit_stops_runaway_loop() {
    let engine = Engine::new(EngineConfig {
        gas_limit: Some(10_000),
        ..EngineConfig::default()
    });
    let err = engine
        .run("n = 0\nwhile True:\n    n += 1", None, Bindings::new())
        .unwrap_err();
    assert_eq!(err.cause(), Some(&RuntimeError::GasExhausted(10_000)));
}

#[test]
fn test_gas_exhaustion_cannot_be_caught() {
    let engine = Engine::new(EngineConfig {
        gas_limit: Some(500),
        ..EngineConfig::default()
    });
    let source = "try:\n    while True:\n        pass\nexcept Exception:\n    caught = True";
    let err = engine.run(source, None, Bindings::new()).unwrap_err();
    assert!(matches!(err.cause(), Some(RuntimeError::GasExhausted(_))));
}

#[test]
fn test_recursion_limit_is_a_fault_on_a_default_thread() {
    let handle = std::thread::spawn(|| fault("def f(n):\n    return f(n + 1)\nf(0)"));
    let cause = handle.join().unwrap();
    assert_eq!(
        cause,
        RuntimeError::RecursionLimit("maximum recursion depth exceeded".into())
    );

    // Recursion inside a deeply nested expression stays on the engine's stack.
    let source = format!(
        "def g(n):\n    if n == 0:\n        return 0\n    return {}g(n - 1){}\ng(150)",
        "(1 + ".repeat(40),
        ")".repeat(40)
    );
    let result = std::thread::spawn(move || run(&source, None, Bindings::new()))
        .join()
        .unwrap()
        .unwrap();
    assert_eq!(result[RESULT_KEY], Value::Int(6000));
}

#[test]
fn test_long_operator_chain_is_rejected_not_overflowed() {
    let source = format!("x = 1{}", " + 1".repeat(5000));
    let err = std::thread::spawn(move || run(&source, None, Bindings::new()))
        .join()
        .unwrap()
        .unwrap_err();
    let RunError::Rejected(CheckError::Syntax(errors)) = err else {
        panic!("expected a syntax rejection, got {err:?}");
    };
    assert_eq!(errors.errors[0].code, ErrorCode::STRUCTURAL_LIMIT_EXCEEDED);

    let source = format!("x = 0{}", " + 1".repeat(200));
    assert_eq!(ok(&source)["x"], Value::Int(200));
}

#[test]
fn test_uncaught_raise_keeps_kind_and_message() {
    assert_eq!(
        fault("raise ValueError('bad input')"),
        RuntimeError::Value("bad input".into())
    );
    assert_eq!(
        fault("raise NotImplementedError('later')"),
        RuntimeError::Raised {
            kind: "NotImplementedError".into(),
            message: "later".into()
        }
    );
    assert_eq!(
        fault("assert 1 == 2, 'math broke'"),
        RuntimeError::Assertion("math broke".into())
    );
}

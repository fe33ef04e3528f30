//! Isolation tests: value fidelity, fault fidelity, deadlines and cleanup.

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use scriptbox_checker::CheckError;
use scriptbox_eval::{context, run, Bindings, Dict, Key, RunError, RuntimeError, Value, RESULT_KEY};
use scriptbox_sandbox::{isolate, isolated_run, IsolateError, Isolation, IsolationConfig};
use scriptbox_types::Permission;
use std::time::{Duration, Instant};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

const GENEROUS: Option<Duration> = Some(Duration::from_secs(10));

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn bindings(pairs: &[(&str, Value)]) -> Bindings {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn spin_forever() -> ! {
    loop {
        std::thread::sleep(Duration::from_millis(5));
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Generic tasks
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_value_comes_back_unchanged() {
    init_logs();
    let value = isolate(
        || Ok::<_, String>((vec![1, 2, 3], "done".to_string())),
        GENEROUS,
    );
    assert_eq!(value, Ok((vec![1, 2, 3], "done".to_string())));
}

#[test]
fn test_task_error_is_raised_not_returned() {
    let raised = isolate(|| Err::<i32, String>("nope".into()), GENEROUS);
    assert_eq!(raised, Err(IsolateError::Raised("nope".into())));

    // An error-shaped value is still a value.
    let returned = isolate(|| Ok::<Result<i32, String>, String>(Err("nope".into())), GENEROUS);
    assert_eq!(returned, Ok(Err("nope".into())));
}

#[test]
fn test_panic_is_reported_with_message() {
    let result = isolate(|| -> Result<i32, String> { panic!("kaboom") }, GENEROUS);
    assert_eq!(result, Err(IsolateError::Panicked("kaboom".into())));
}

#[test]
fn test_worker_exit_without_message_is_a_crash() {
    let result = isolate(
        || -> Result<i32, String> { unsafe { libc::_exit(3) } },
        GENEROUS,
    );
    assert_eq!(result, Err(IsolateError::WorkerCrashed("exit status 3".into())));
}

#[test]
fn test_worker_changes_stay_in_the_worker() {
    let mut counter = 1;
    let seen = isolate(
        || {
            counter += 41;
            Ok::<_, String>(counter)
        },
        GENEROUS,
    );
    assert_eq!(seen, Ok(42));
    assert_eq!(counter, 1);
}

#[test]
fn test_no_timeout_waits_for_completion() {
    let result = isolate(
        || {
            std::thread::sleep(Duration::from_millis(150));
            Ok::<_, String>(7)
        },
        None,
    );
    assert_eq!(result, Ok(7));
}

#[test]
fn test_large_message_is_drained() {
    let big = "x".repeat(1 << 20);
    let expected = big.clone();
    let result = isolate(move || Ok::<_, String>(big), GENEROUS);
    assert_eq!(result.map(|s| s.len()), Ok(expected.len()));
}

// ══════════════════════════════════════════════════════════════════════════════
// Deadlines
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_timeout_kills_within_bounded_overhead() {
    init_logs();
    let timeout = Duration::from_millis(200);
    let started = Instant::now();
    let result = isolate(|| -> Result<i32, String> { spin_forever() }, Some(timeout));
    let elapsed = started.elapsed();

    assert_eq!(result, Err(IsolateError::Timeout(timeout)));
    assert!(elapsed >= timeout);
    assert!(elapsed < timeout + Duration::from_secs(2), "took {elapsed:?}");
}

#[test]
fn test_timed_out_worker_is_reaped() {
    let pid_file = tempfile::NamedTempFile::new().unwrap();
    let path = pid_file.path().to_path_buf();
    let result = isolate(
        move || -> Result<i32, String> {
            std::fs::write(&path, std::process::id().to_string()).map_err(|e| e.to_string())?;
            spin_forever()
        },
        Some(Duration::from_millis(300)),
    );
    assert!(result.unwrap_err().is_timeout());

    let pid: i32 = std::fs::read_to_string(pid_file.path())
        .unwrap()
        .parse()
        .unwrap();
    assert_ne!(pid, std::process::id() as i32);
    assert_eq!(kill(Pid::from_raw(pid), None), Err(Errno::ESRCH));
}

#[test]
fn test_sub_millisecond_timeout_is_reported_as_given() {
    let timeout = Duration::from_micros(900);
    let result = isolate(
        || {
            std::thread::sleep(Duration::from_millis(200));
            Ok::<_, String>(1)
        },
        Some(timeout),
    );
    assert_eq!(result, Err(IsolateError::Timeout(timeout)));
}

#[test]
fn test_configured_isolation() {
    let config: IsolationConfig =
        serde_json::from_str(r#"{"timeout_ms": 100, "poll_interval_ms": 2}"#).unwrap();
    let isolation = Isolation::new(config);
    let result = isolation.call(|| -> Result<i32, String> { spin_forever() });
    assert_eq!(result, Err(IsolateError::Timeout(Duration::from_millis(100))));
    assert_eq!(isolation.call(|| Ok::<_, String>(5)), Ok(5));
}

#[test]
fn test_concurrent_isolates_are_independent() {
    let handles: Vec<_> = (0..4)
        .map(|i| {
            std::thread::spawn(move || {
                if i % 2 == 0 {
                    isolate(move || Ok::<_, String>(i * 10), GENEROUS)
                } else {
                    isolate(|| -> Result<i32, String> { spin_forever() }, Some(Duration::from_millis(150)))
                }
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results[0], Ok(0));
    assert_eq!(results[2], Ok(20));
    assert!(results[1].as_ref().unwrap_err().is_timeout());
    assert!(results[3].as_ref().unwrap_err().is_timeout());
}

// ══════════════════════════════════════════════════════════════════════════════
// Snippets
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_isolated_run_matches_direct_run() {
    init_logs();
    let source = "rows = [{'n': i} for i in range(3)]\ntotal = sum([r['n'] for r in rows])\ntotal * 1.5";
    let direct = run(source, None, Bindings::new()).unwrap();
    let isolated = isolated_run(source, None, GENEROUS, Bindings::new()).unwrap();
    assert_eq!(isolated, direct);
    assert_eq!(isolated[RESULT_KEY], Value::Float(4.5));
}

#[test]
fn test_every_data_value_crosses_the_channel() {
    let dict: Dict = [
        (Key::Str("k".into()), Value::Int(1)),
        (Key::Tuple(vec![Key::Int(1), Key::None]), Value::Bool(false)),
    ]
    .into_iter()
    .collect();
    let sent = bindings(&[
        ("none", Value::None),
        ("bool", Value::Bool(true)),
        ("int", Value::Int(-7)),
        ("float", Value::Float(2.5)),
        ("inf", Value::Float(f64::NEG_INFINITY)),
        ("str", Value::str("héllo")),
        ("list", Value::List(vec![Value::Int(1), Value::str("a")])),
        ("tuple", Value::Tuple(vec![Value::None])),
        ("dict", Value::Dict(dict)),
        (
            "exc",
            Value::Exception {
                kind: "ValueError".into(),
                message: "bad".into(),
            },
        ),
    ]);
    let expected = sent.clone();
    let received = isolate(move || Ok::<_, String>(sent), GENEROUS).unwrap();
    assert_eq!(received, expected);
    let keys: Vec<&str> = received.keys().map(String::as_str).collect();
    assert_eq!(keys, expected.keys().map(String::as_str).collect::<Vec<_>>());
}

#[test]
fn test_non_finite_results_cross_the_channel() {
    let direct = run("import math
math.inf", None, Bindings::new()).unwrap();
    let isolated = isolated_run("import math
math.inf", None, GENEROUS, Bindings::new()).unwrap();
    assert_eq!(isolated, direct);
    assert_eq!(isolated[RESULT_KEY], Value::Float(f64::INFINITY));

    let result = isolated_run("x = float('nan')", None, GENEROUS, Bindings::new()).unwrap();
    assert!(matches!(result["x"], Value::Float(f) if f.is_nan()));
}

#[test]
fn test_division_by_zero_is_a_fault_not_a_timeout() {
    let err = isolated_run("a = 1\na / 0", None, GENEROUS, Bindings::new()).unwrap_err();
    let IsolateError::Raised(RunError::Evaluation(fault)) = err else {
        panic!("expected an evaluation fault, got {err:?}");
    };
    assert_eq!(fault.cause, RuntimeError::ZeroDivision("division by zero".into()));
    assert_eq!(fault.line, Some(2));
    assert_eq!(fault.source, "a = 1\na / 0");
}

#[test]
fn test_rejection_crosses_the_channel() {
    let err = isolated_run(
        "import math",
        Some(Permission::BASIC),
        GENEROUS,
        Bindings::new(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        IsolateError::Raised(RunError::Rejected(CheckError::Policy(_)))
    ));
}

#[test]
fn test_runaway_snippet_times_out() {
    let timeout = Duration::from_millis(250);
    let err = isolated_run("n = 0\nwhile True:\n    n += 1", None, Some(timeout), Bindings::new())
        .unwrap_err();
    assert_eq!(err, IsolateError::Timeout(timeout));
}

#[test]
fn test_callable_result_cannot_cross() {
    let err = isolated_run("def f():\n    return 1", None, GENEROUS, Bindings::new()).unwrap_err();
    assert!(matches!(err, IsolateError::Serialization(_)), "got {err:?}");
}

#[test]
fn test_worker_sees_callers_context_and_bindings() {
    let _guard = context::push(bindings(&[("base", Value::Int(100))]));
    let extra = bindings(&[("step", Value::Int(5))]);
    let result = isolated_run("base + step", None, GENEROUS, extra).unwrap();
    assert_eq!(result, bindings(&[(RESULT_KEY, Value::Int(105))]));
}

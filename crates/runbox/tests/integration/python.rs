//! Python jobs against a real interpreter

use std::time::{Duration, Instant};

use runbox::{Config, ExecutionRequest, Language, Runner, TIMEOUT_MESSAGE, TestCase};

use crate::{fixture_source, request};

fn runner() -> Runner {
    Runner::new(Config::for_language(Language::Python))
}

fn function_call(source: &str, entry_point: &str, tests: Vec<TestCase>) -> ExecutionRequest {
    ExecutionRequest {
        entry_point: Some(entry_point.to_owned()),
        ..request(fixture_source(source), tests)
    }
}

#[tokio::test]
async fn stdin_echo() {
    let result = runner()
        .execute(&request(
            fixture_source("echo.py"),
            vec![
                TestCase::new("hello", "hello\n", "hello"),
                TestCase::new("mismatch", "hello\n", "goodbye"),
            ],
        ))
        .await
        .unwrap();

    assert!(result.results[0].passed);
    assert!(!result.results[1].passed);
    assert_eq!(result.results[1].actual.as_deref(), Some("hello"));
    assert_eq!(result.results[1].error, None);
}

#[tokio::test]
async fn function_call_spreads_arguments() {
    let result = runner()
        .execute(&function_call(
            "add.py",
            "add",
            vec![
                TestCase::new("small", "[2, 3]", "5"),
                TestCase::new("negative", "[-1, 1]", "0"),
            ],
        ))
        .await
        .unwrap();

    assert!(result.all_passed(), "{result:?}");
}

#[tokio::test]
async fn module_level_stdin_read_keeps_arguments() {
    let code = "import sys\nbanner = sys.stdin.read()\n\ndef add(a, b):\n    return a + b\n";
    let request = ExecutionRequest {
        entry_point: Some("add".to_owned()),
        ..request(code, vec![TestCase::new("sum", "[2, 3]", "5")])
    };

    let result = runner().execute(&request).await.unwrap();

    assert!(result.all_passed(), "{result:?}");
}

#[tokio::test]
async fn return_values_are_printed() {
    let result = runner()
        .execute(&function_call(
            "structures.py",
            "pair",
            vec![TestCase::new("list", "3", "[3, 6]")],
        ))
        .await
        .unwrap();
    assert!(result.all_passed(), "{result:?}");

    let result = runner()
        .execute(&function_call(
            "structures.py",
            "nothing",
            vec![TestCase::new("none", "1", "None")],
        ))
        .await
        .unwrap();
    assert!(result.all_passed(), "{result:?}");
}

#[tokio::test]
async fn invalid_json_input_fails_only_that_test() {
    let result = runner()
        .execute(&function_call(
            "add.py",
            "add",
            vec![
                TestCase::new("broken", "not json", "5"),
                TestCase::new("fine", "[2, 3]", "5"),
            ],
        ))
        .await
        .unwrap();

    let broken = &result.results[0];
    assert!(!broken.passed);
    assert!(
        broken
            .error
            .as_deref()
            .unwrap()
            .starts_with("invalid JSON input")
    );
    assert!(result.results[1].passed);
}

#[tokio::test]
async fn uncaught_exception_reports_traceback() {
    let result = runner()
        .execute(&request(
            fixture_source("crash.py"),
            vec![TestCase::new("crash", "", "")],
        ))
        .await
        .unwrap();

    let crash = &result.results[0];
    assert!(!crash.passed);
    let error = crash.error.as_deref().unwrap();
    assert!(error.contains("Traceback"), "{error}");
    assert!(error.contains("ValueError: boom"), "{error}");
}

#[tokio::test]
async fn memory_limit_raises_memory_error() {
    let result = runner()
        .execute(&request(
            fixture_source("memory_hog.py"),
            vec![TestCase::new("hog", "", "536870912")],
        ))
        .await
        .unwrap();

    let hog = &result.results[0];
    assert!(!hog.passed);
    assert!(hog.error.as_deref().unwrap().contains("MemoryError"));
}

#[tokio::test]
async fn infinite_loop_times_out() {
    let request = ExecutionRequest {
        timeout_ms: Some(1000),
        ..request(
            fixture_source("infinite_loop.py"),
            vec![
                TestCase::new("loops", "loop", "done"),
                TestCase::new("returns", "stop", "done"),
            ],
        )
    };

    let start = Instant::now();
    let result = runner().execute(&request).await.unwrap();

    assert!(start.elapsed() < Duration::from_secs(10));
    assert_eq!(result.results[0].error.as_deref(), Some(TIMEOUT_MESSAGE));
    assert!(result.results[1].passed);
}

#[tokio::test]
async fn spawned_children_do_not_hold_the_test() {
    let start = Instant::now();
    let result = runner()
        .execute(&request(
            fixture_source("fork_sleeper.py"),
            vec![TestCase::new("fork", "", "spawned")],
        ))
        .await
        .unwrap();

    assert!(result.all_passed(), "{result:?}");
    assert!(start.elapsed() < Duration::from_secs(10));
}

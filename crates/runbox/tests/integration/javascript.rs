//! JavaScript jobs against a real Node.js runtime

use runbox::{Config, ExecutionRequest, Language, Runner, TestCase};

use crate::{fixture_source, request};

fn runner() -> Runner {
    Runner::new(Config::for_language(Language::JavaScript))
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
            fixture_source("echo.js"),
            vec![TestCase::new("hello", "hello world\n", "hello world")],
        ))
        .await
        .unwrap();

    assert!(result.all_passed(), "{result:?}");
}

#[tokio::test]
async fn function_call_spreads_arguments() {
    let result = runner()
        .execute(&function_call(
            "add.js",
            "add",
            vec![TestCase::new("sum", "[2, 3]", "5")],
        ))
        .await
        .unwrap();

    assert!(result.all_passed(), "{result:?}");
}

#[tokio::test]
async fn module_level_stdin_read_keeps_arguments() {
    let code = "const banner = require('fs').readFileSync(0, 'utf8');\nfunction add(a, b) { return a + b; }\n";
    let request = ExecutionRequest {
        entry_point: Some("add".to_owned()),
        ..request(code, vec![TestCase::new("sum", "[2, 3]", "5")])
    };

    let result = runner().execute(&request).await.unwrap();

    assert!(result.all_passed(), "{result:?}");
}

#[tokio::test]
async fn objects_are_printed_as_json() {
    let result = runner()
        .execute(&function_call(
            "structures.js",
            "pair",
            vec![TestCase::new("array", "3", "[3,6]")],
        ))
        .await
        .unwrap();
    assert!(result.all_passed(), "{result:?}");

    let result = runner()
        .execute(&function_call(
            "structures.js",
            "greet",
            vec![TestCase::new("string", "\"bob\"", "hi bob")],
        ))
        .await
        .unwrap();
    assert!(result.all_passed(), "{result:?}");
}

#[tokio::test]
async fn uncaught_exception_reports_stderr() {
    let result = runner()
        .execute(&request(
            fixture_source("crash.js"),
            vec![TestCase::new("crash", "", "")],
        ))
        .await
        .unwrap();

    let crash = &result.results[0];
    assert!(!crash.passed);
    let error = crash.error.as_deref().unwrap();
    assert!(error.contains("Error: boom"), "{error}");
}

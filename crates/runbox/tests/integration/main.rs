//! Integration tests for runbox
//!
//! Most tests drive the runner with `sh` standing in for the compiler and the
//! interpreter, so they run on any Unix host. Tests for the real toolchains
//! need python3, g++ and node installed:
//!    cargo test -p runbox --features integration-tests

use std::fs;
use std::path::Path;

use runbox::config::{CompileConfig, Config, Language, RunConfig, Toolchain};
use runbox::{ExecutionRequest, TestCase};

mod config_loading;
#[cfg(feature = "integration-tests")]
mod javascript;
#[cfg(feature = "integration-tests")]
mod python;
mod resource_limits;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Helper to get fixture file content
pub(crate) fn fixture_source(name: &str) -> String {
    let path = format!("{FIXTURES_PATH}/sources/{name}");
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}

/// A C++ worker whose "compiler" is a shell script
///
/// The script fails with a diagnostic when the source contains
/// `SYNTAX_ERROR`, otherwise copies the source to the output and appends a
/// line to `compile_log`. The "binary" is then run by `sh`.
pub(crate) fn shell_config(compile_log: &Path) -> Config {
    let script = format!(
        "if grep -q SYNTAX_ERROR \"$0\"; then echo \"$0:1: error: bad syntax\" >&2; exit 1; fi; \
         echo compiled >> '{}'; cp \"$0\" \"$1\"",
        compile_log.display()
    );

    let mut config = Config::for_language(Language::Cpp);
    config.toolchains.insert(
        "cpp".to_owned(),
        Toolchain {
            source_name: "main.sh".to_owned(),
            compile: Some(CompileConfig {
                command: vec![
                    "sh".to_owned(),
                    "-c".to_owned(),
                    script,
                    "{source}".to_owned(),
                    "{output}".to_owned(),
                ],
                output_name: "main".to_owned(),
                env: Default::default(),
                limits: None,
            }),
            run: RunConfig {
                command: vec!["sh".to_owned(), "{binary}".to_owned()],
                env: Default::default(),
                path: runbox::config::DEFAULT_SANDBOX_PATH.to_owned(),
                memory_rlimit: Default::default(),
                limits: None,
            },
        },
    );
    config
}

/// Build a stdin-mode request
pub(crate) fn request(code: impl Into<String>, tests: Vec<TestCase>) -> ExecutionRequest {
    ExecutionRequest {
        code: code.into(),
        test_cases: tests,
        ..Default::default()
    }
}

//! Configuration file loading

use std::path::PathBuf;

use runbox::config::MemoryRlimit;
use runbox::{Config, ConfigError, Language};

use crate::FIXTURES_PATH;

fn config_fixture(name: &str) -> PathBuf {
    PathBuf::from(format!("{FIXTURES_PATH}/configs/{name}"))
}

#[test]
fn full_config_overrides_every_section() {
    let config = Config::from_file(config_fixture("valid_full.toml")).unwrap();

    assert_eq!(config.language, Language::Cpp);
    assert_eq!(
        config.scratch_root,
        Some(PathBuf::from("/var/tmp/runbox-test"))
    );
    assert_eq!(config.server.bind, "127.0.0.1:5001");
    assert_eq!(config.server.max_body_bytes, 1024 * 1024);

    assert_eq!(config.default_limits.timeout_ms, Some(2000));
    assert_eq!(config.default_limits.memory_limit, Some(256));
    assert_eq!(config.max_limits.timeout_ms, Some(10000));
    assert_eq!(config.max_limits.memory_limit, Some(512));

    assert_eq!(config.concurrency.per_job, 2);
    assert_eq!(config.concurrency.max_processes, 4);

    let cpp = config.toolchain();
    assert_eq!(cpp.source_name, "main.cpp");
    let compile = cpp.compile.unwrap();
    assert_eq!(compile.command[0], "clang++");
    assert_eq!(compile.output_name, "main");
    assert_eq!(compile.limits.unwrap().timeout_ms, Some(60000));

    let python = &config.toolchains["python"];
    assert_eq!(python.run.command, ["pypy3", "{source}"]);
    assert_eq!(python.run.memory_rlimit, MemoryRlimit::Data);
}

#[test]
fn minimal_config_keeps_builtin_defaults() {
    let config = Config::from_file(config_fixture("valid_minimal.toml")).unwrap();

    assert_eq!(config.language, Language::JavaScript);
    assert_eq!(config.server.bind, "0.0.0.0:5000");
    assert_eq!(config.default_limits.timeout_ms, Some(5000));
    assert_eq!(config.default_limits.memory_limit, Some(128));
    assert_eq!(config.max_limits.timeout_ms, Some(30000));
    assert!(config.toolchains.is_empty());

    let toolchain = config.toolchain();
    assert!(!toolchain.is_compiled());
    assert_eq!(toolchain.run.memory_rlimit, MemoryRlimit::Data);
}

#[test]
fn empty_run_command_is_invalid() {
    let result = Config::from_file(config_fixture("invalid_empty_run_command.toml"));
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn toolchain_for_unknown_language_is_rejected() {
    let result = Config::from_file(config_fixture("invalid_unknown_toolchain.toml"));
    match result {
        Err(ConfigError::UnknownLanguage(name)) => assert_eq!(name, "react"),
        other => panic!("expected UnknownLanguage, got {other:?}"),
    }
}

#[test]
fn defaults_above_maxima_are_invalid() {
    let result = Config::from_file(config_fixture("invalid_limits.toml"));
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn output_name_outside_scratch_is_invalid() {
    let result = Config::from_file(config_fixture("invalid_output_name.toml"));
    match result {
        Err(ConfigError::Invalid(message)) => assert!(message.contains("../solution")),
        other => panic!("expected Invalid, got {other:?}"),
    }
}

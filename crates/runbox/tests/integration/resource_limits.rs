//! Resource limits as seen by the submitted program

use std::time::{Duration, Instant};

use runbox::config::DEFAULT_SANDBOX_PATH;
use runbox::{ExecutionRequest, Runner, TestCase};

use crate::{request, shell_config};

#[tokio::test]
async fn captured_output_is_capped() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = shell_config(&dir.path().join("compile.log"));
    config.default_limits.max_output = Some(1);
    let runner = Runner::new(config);

    let result = runner
        .execute(&request(
            "head -c 10000 /dev/zero | tr '\\0' a\n",
            vec![TestCase::new("flood", "", "")],
        ))
        .await
        .unwrap();

    assert_eq!(result.results[0].actual.as_ref().unwrap().len(), 1024);
}

#[tokio::test]
async fn file_writes_are_capped() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = shell_config(&dir.path().join("compile.log"));
    config.default_limits.max_output = Some(1);
    let runner = Runner::new(config);

    // head dies of SIGXFSZ, the shell carries on
    let result = runner
        .execute(&request(
            "head -c 4096 /dev/zero > big.bin\nwc -c < big.bin\n",
            vec![TestCase::new("write", "", "1024")],
        ))
        .await
        .unwrap();

    assert!(result.results[0].passed, "{:?}", result.results[0]);
}

#[tokio::test]
async fn cpu_limit_kills_busy_loop() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Runner::new(shell_config(&dir.path().join("compile.log")));

    let request = ExecutionRequest {
        cpu_limit_seconds: Some(1),
        timeout_ms: Some(20_000),
        ..request("while :; do :; done\n", vec![TestCase::new("spin", "", "")])
    };

    let start = Instant::now();
    let result = runner.execute(&request).await.unwrap();

    assert!(start.elapsed() < Duration::from_secs(10));
    let expected = format!("Exit code: -{}", libc::SIGXCPU);
    assert_eq!(result.results[0].error.as_deref(), Some(expected.as_str()));
}

#[tokio::test]
async fn open_file_limit_applies() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = shell_config(&dir.path().join("compile.log"));
    config.default_limits.max_open_files = Some(16);
    let runner = Runner::new(config);

    let result = runner
        .execute(&request("ulimit -n\n", vec![TestCase::new("nofile", "", "16")]))
        .await
        .unwrap();

    assert!(result.results[0].passed, "{:?}", result.results[0]);
}

#[tokio::test]
async fn environment_is_cleared() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = shell_config(&dir.path().join("compile.log"));
    config
        .toolchains
        .get_mut("cpp")
        .unwrap()
        .run
        .env
        .insert("GREETING".to_owned(), "hi".to_owned());
    let runner = Runner::new(config);

    let result = runner
        .execute(&request(
            "echo \"${HOME:-unset}\"\necho \"$PATH\"\necho \"$GREETING\"\n",
            vec![TestCase::new(
                "env",
                "",
                format!("unset\n{DEFAULT_SANDBOX_PATH}\nhi"),
            )],
        ))
        .await
        .unwrap();

    assert!(result.results[0].passed, "{:?}", result.results[0]);
}

#[tokio::test]
async fn background_children_do_not_outlive_test() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("late");
    let runner = Runner::new(shell_config(&dir.path().join("compile.log")));

    let code = format!(
        "(sleep 0.5; echo late > '{}') &\necho started\n",
        marker.display()
    );
    let result = runner
        .execute(&request(code, vec![TestCase::new("fork", "", "started")]))
        .await
        .unwrap();
    assert!(result.results[0].passed);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!marker.exists());
}

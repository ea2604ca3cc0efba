//! Full lifecycle against the fake kernel running as a child process.

use std::time::{Duration, Instant};

use kernelbridge::{BridgeConfig, Kernel, KernelError, Session};
use kernelbridge_config::KernelConfig;
use kernelbridge_supervisor::{KernelStatus, KernelSupervisor};

const FAKE_KERNEL: &str = env!("CARGO_BIN_EXE_kernelbridge-fake-kernel");

fn config(extra_args: &[&str]) -> BridgeConfig {
    let mut command = vec![
        FAKE_KERNEL.to_string(),
        "-f".to_string(),
        "{connection_file}".to_string(),
    ];
    command.extend(extra_args.iter().map(ToString::to_string));

    let mut config = BridgeConfig::default();
    config.kernel = KernelConfig {
        name: "fake".to_string(),
        command: Some(command),
        startup_timeout_ms: 10_000,
        shutdown_grace_ms: 500,
        ..KernelConfig::default()
    };
    config.execution.timeout_ms = 5_000;
    config
}

#[tokio::test]
async fn test_start_execute_shutdown() {
    let mut kernel = Kernel::new(config(&[]));
    kernel.start(None).await.unwrap();
    assert!(kernel.session().unwrap().pid().is_some());

    kernel.source_exec(&["int x = 42;"]).await.unwrap();
    assert_eq!(kernel.get_value("x").await.unwrap(), "42");
    kernel.assert("x == 42", None).await.unwrap();

    kernel.shutdown().await.unwrap();
    kernel.shutdown().await.unwrap();
    assert!(!kernel.is_running());
}

#[tokio::test]
async fn test_start_twice_is_already_running() {
    let mut kernel = Kernel::new(config(&[]));
    kernel.start(None).await.unwrap();

    let err = kernel.start(None).await.unwrap_err();
    assert!(matches!(err, KernelError::AlreadyRunning));
    assert_eq!(err.to_string(), "kernel is already running");

    kernel.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_restart_gives_a_fresh_interpreter() {
    let mut kernel = Kernel::new(config(&[]));
    kernel.start(None).await.unwrap();
    kernel.source_exec(&["int x = 1;"]).await.unwrap();
    kernel.shutdown().await.unwrap();

    kernel.start(None).await.unwrap();
    let err = kernel.get_value("x").await.unwrap_err();
    assert!(matches!(err, KernelError::Compile(_)), "got {err:?}");
    kernel.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stubborn_kernel_is_killed_after_grace() {
    let session = Session::start(&config(&["--stubborn"]), None, &[]).await.unwrap();

    let started = Instant::now();
    session.shutdown().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_kernel_exiting_during_startup() {
    let mut config = config(&[]);
    config.kernel.command = Some(vec![
        FAKE_KERNEL.to_string(),
        "-f".to_string(),
        "/nonexistent/connection.json".to_string(),
    ]);

    let started = Instant::now();
    let err = Session::start(&config, None, &[]).await.err().unwrap();
    assert!(matches!(err, KernelError::Startup(_)), "got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_supervisor_stop_removes_connection_file() {
    let supervisor = KernelSupervisor::new(config(&[]).kernel);
    let mut process = supervisor.launch(None).unwrap();
    let file = process.connection_file().unwrap().to_path_buf();
    assert!(file.exists());
    assert!(process.is_alive());

    process.stop(Duration::from_millis(100)).await.unwrap();
    assert_eq!(process.status(), KernelStatus::Stopped);
    assert!(!file.exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_killed_kernel_fails_fast_with_channel_closed() {
    let mut config = config(&[]);
    config.execution.timeout_ms = 10_000;
    let mut kernel = Kernel::new(config);
    kernel.start(None).await.unwrap();
    kernel.source_exec(&["int x = 1;"]).await.unwrap();

    let pid = kernel.session().unwrap().pid().unwrap();
    let status = std::process::Command::new("kill")
        .args(["-9", &pid.to_string()])
        .status()
        .unwrap();
    assert!(status.success());

    let started = Instant::now();
    let err = kernel.source_exec(&["int y = 2;"]).await.unwrap_err();
    assert!(matches!(err, KernelError::ChannelClosed), "got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(5));

    assert!(kernel.is_running());
    kernel.shutdown().await.unwrap();
    assert!(!kernel.is_running());
}

#[tokio::test]
async fn test_bad_classification_pattern_fails_start() {
    let mut config = config(&[]);
    config.classification.compile_error = "(unclosed".to_string();

    let mut kernel = Kernel::new(config);
    let err = kernel.start(None).await.unwrap_err();
    assert!(matches!(err, KernelError::Startup(ref m) if m.contains("invalid classification pattern")), "got {err:?}");
    assert!(!kernel.is_running());
}

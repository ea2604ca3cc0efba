//! Keyword behaviour against the scripted fake kernel.

use std::time::Duration;

use kernelbridge::{BridgeConfig, Kernel, KernelError, KernelLibrary};
use kernelbridge_test_harness::{FakeKernel, Reply, ToyCpp};

fn config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.execution.timeout_ms = 5_000;
    config.kernel.startup_timeout_ms = 10_000;
    config.kernel.shutdown_grace_ms = 1_000;
    config
}

async fn attached(kernel: &FakeKernel, config: BridgeConfig) -> Kernel {
    let mut bridge = Kernel::new(config);
    bridge.attach(&kernel.connection_info()).await.unwrap();
    bridge
}

#[tokio::test]
async fn test_prelude_configures_the_interpreter() {
    let fake = FakeKernel::start(ToyCpp::new().into_handler()).await.unwrap();
    let mut config = config();
    config.execution.include_paths = vec![std::env::temp_dir()];
    let _bridge = attached(&fake, config).await;

    let executed = fake.executed();
    assert_eq!(
        executed.first().map(String::as_str),
        Some(r#"%config Interpreter.flags += ["-stdlib=libc++"]"#)
    );
    assert!(executed.iter().any(|c| c.starts_with("%config Interpreter.flags += [\"-I")));
    assert!(executed.iter().any(|c| c == "#include <iostream>"));
    assert!(executed.last().unwrap().starts_with("std::string kernelbridge_demangle("));
}

#[tokio::test]
async fn test_declarations_persist_across_calls() {
    let fake = FakeKernel::start(ToyCpp::new().into_handler()).await.unwrap();
    let mut bridge = attached(&fake, config()).await;

    bridge.source_exec(&["int x = 42;"]).await.unwrap();
    assert_eq!(bridge.source_exec(&["std::cout << x;"]).await.unwrap(), "42");
    assert_eq!(bridge.get_value("x").await.unwrap(), "42");
}

#[tokio::test]
async fn test_source_exec_returns_output_without_trailing_newline() {
    let fake = FakeKernel::start(ToyCpp::new().into_handler()).await.unwrap();
    let mut bridge = attached(&fake, config()).await;

    let out = bridge
        .source_exec(&[r#"std::cout << "Hello from Robot!" << std::endl;"#])
        .await
        .unwrap();
    assert_eq!(out, "Hello from Robot!");
}

#[tokio::test]
async fn test_source_exec_joins_parts_with_newlines() {
    let fake = FakeKernel::start(|_: &str| Reply::ok()).await.unwrap();
    let mut bridge = attached(&fake, config()).await;

    bridge.source_exec(&["int a = 1;", "int b = 2;"]).await.unwrap();
    assert_eq!(fake.executed().last().unwrap(), "int a = 1;\nint b = 2;");
}

#[tokio::test]
async fn test_assert_true_and_false() {
    let fake = FakeKernel::start(ToyCpp::new().into_handler()).await.unwrap();
    let mut bridge = attached(&fake, config()).await;

    bridge.assert("1 == 1", None).await.unwrap();

    let err = bridge.assert("1 == 0", None).await.unwrap_err();
    assert!(matches!(err, KernelError::AssertionFailed { ref expression, .. } if expression == "1 == 0"));
    assert!(err.to_string().contains("Assertion Failed"));
}

#[tokio::test]
async fn test_malformed_assert_is_not_an_assertion_failure() {
    let fake = FakeKernel::start(ToyCpp::new().into_handler()).await.unwrap();
    let mut bridge = attached(&fake, config()).await;

    let err = bridge.assert("1 ==", None).await.unwrap_err();
    assert!(matches!(err, KernelError::Compile(_)), "got {err:?}");
}

#[tokio::test]
async fn test_other_runtime_fault_during_assert() {
    let fake = FakeKernel::start(|code: &str| {
        if code.starts_with("if (!(") {
            Reply::ok().error("Standard Exception: ", "std::bad_alloc")
        } else {
            Reply::ok()
        }
    })
    .await
    .unwrap();
    let mut bridge = attached(&fake, config()).await;

    let err = bridge.assert("allocate()", None).await.unwrap_err();
    assert!(matches!(err, KernelError::Runtime(_)), "got {err:?}");
}

#[tokio::test]
async fn test_type_introspection() {
    let fake = FakeKernel::start(ToyCpp::new().into_handler()).await.unwrap();
    let mut bridge = attached(&fake, config()).await;

    assert_eq!(bridge.typeid("42").await.unwrap(), "i");
    let name = bridge.typename(r#"std::string("foo")"#).await.unwrap();
    assert!(name.contains("string"), "got {name}");
}

#[tokio::test]
async fn test_attach_twice_is_already_running() {
    let fake = FakeKernel::start(ToyCpp::new().into_handler()).await.unwrap();
    let mut bridge = attached(&fake, config()).await;

    let err = bridge.attach(&fake.connection_info()).await.unwrap_err();
    assert!(matches!(err, KernelError::AlreadyRunning));
    let err = bridge.start(None).await.unwrap_err();
    assert!(matches!(err, KernelError::AlreadyRunning));
}

#[tokio::test]
async fn test_shutdown_twice_and_use_after_shutdown() {
    let fake = FakeKernel::start(ToyCpp::new().into_handler()).await.unwrap();
    let mut bridge = attached(&fake, config()).await;

    bridge.shutdown().await.unwrap();
    bridge.shutdown().await.unwrap();
    assert!(fake.shutdown_requested());

    let err = bridge.source_exec(&["int x = 1;"]).await.unwrap_err();
    assert!(matches!(err, KernelError::NotRunning));
}

#[tokio::test]
async fn test_timeout_leaves_session_usable() {
    let fake = FakeKernel::start(
        ToyCpp::new()
            .with_hang(Duration::from_millis(1_200))
            .into_handler(),
    )
    .await
    .unwrap();
    let mut config = config();
    config.execution.timeout_ms = 800;
    let mut bridge = attached(&fake, config).await;

    let err = bridge.source_exec(&["while (true) {}"]).await.unwrap_err();
    assert!(matches!(err, KernelError::ExecutionTimeout(_)), "got {err:?}");

    bridge.source_exec(&["int y = 7;"]).await.unwrap();
    assert_eq!(bridge.get_value("y").await.unwrap(), "7");
}

#[tokio::test]
async fn test_source_include_resolves_against_include_paths() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("widget.hpp"), "int widget = 3;\n").unwrap();

    let fake = FakeKernel::start(ToyCpp::new().into_handler()).await.unwrap();
    let mut bridge = attached(&fake, config()).await;

    bridge.add_include_path(&[dir.path()]).await.unwrap();
    bridge.source_include(&["widget.hpp"]).await.unwrap();

    let expected = format!("#include \"{}\"", dir.path().join("widget.hpp").display());
    assert_eq!(fake.executed().last(), Some(&expected));

    let err = bridge.source_include(&["missing.hpp"]).await.unwrap_err();
    assert!(matches!(err, KernelError::Compile(_)), "got {err:?}");
}

#[tokio::test]
async fn test_call_function_and_load_library_fragments() {
    let fake = FakeKernel::start(|_: &str| Reply::ok().stdout("3\n")).await.unwrap();
    let mut bridge = attached(&fake, config()).await;

    let out = bridge
        .call_function("add", &["1".to_string(), "2".to_string()])
        .await
        .unwrap();
    assert_eq!(out, "3");
    assert_eq!(fake.executed().last().unwrap(), "std::cout << add(1, 2);");

    bridge.load_shared_library(&["libwidget.so"]).await.unwrap();
    assert_eq!(fake.executed().last().unwrap(), "%load_library libwidget.so");
}

#[test]
fn test_blocking_library_keywords() {
    let host = tokio::runtime::Runtime::new().unwrap();
    let fake = host
        .block_on(FakeKernel::start(ToyCpp::new().into_handler()))
        .unwrap();

    let mut library = KernelLibrary::new(config()).unwrap();
    library.attach(&fake.connection_info()).unwrap();

    let run = |library: &mut KernelLibrary, name: &str, args: &[&str]| {
        let args: Vec<String> = args.iter().map(ToString::to_string).collect();
        library.run_keyword(name, &args)
    };

    run(&mut library, "Source Parse", &["int answer = 42;"]).unwrap();
    assert_eq!(
        run(&mut library, "Source Exec", &["std::cout << answer;"]).unwrap().as_deref(),
        Some("42")
    );
    run(&mut library, "assert_", &["answer == 42"]).unwrap();
    let err = run(&mut library, "Assert", &["answer == 0"]).unwrap_err();
    assert_eq!(err.to_string(), "C++ Assertion Failed: answer == 0");
    assert_eq!(
        run(&mut library, "typeid", &["answer"]).unwrap().as_deref(),
        Some("i")
    );

    run(&mut library, "Shutdown Kernel", &[]).unwrap();
    run(&mut library, "Shutdown Kernel", &[]).unwrap();
    drop(library);
    drop(fake);
}

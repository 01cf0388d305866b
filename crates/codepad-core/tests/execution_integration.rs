use codepad_core::config::{CodepadConfig, WorkspaceConfig};
use codepad_core::executor::NOTHING_TO_EXECUTE;
use codepad_core::{
    CodeExecutor, CodePad, CodepadError, DependencyInstallRequest, Ecosystem, ExecutionStatus,
    Phase, Session,
};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::{tempdir, TempDir};
use tokio_util::sync::CancellationToken;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// Helper to create a fake executable script
fn create_fake_executable(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut file = fs::File::create(path).unwrap();
    writeln!(file, "#!/bin/sh").unwrap();
    writeln!(file, "{}", content).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).unwrap();
    }
}

fn has_tools(tools: &[&str]) -> bool {
    let missing: Vec<_> = tools.iter().filter(|t| which::which(t).is_err()).collect();
    if !missing.is_empty() {
        eprintln!("skipping: {:?} not on PATH", missing);
        return false;
    }
    true
}

/// Config whose tool lookups point at scripts planted in a scratch directory.
struct FakeToolchain {
    bin: TempDir,
    workspaces: TempDir,
    config: CodepadConfig,
}

impl FakeToolchain {
    fn new() -> Self {
        let bin = tempdir().unwrap();
        let workspaces = tempdir().unwrap();
        let config = CodepadConfig {
            workspace: WorkspaceConfig {
                parent_dir: Some(workspaces.path().to_path_buf()),
                init_manifest: true,
            },
            ..Default::default()
        };
        Self {
            bin,
            workspaces,
            config,
        }
    }

    fn tool(mut self, name: &str, script: &str) -> Self {
        let path = self.bin.path().join(name);
        create_fake_executable(&path, script);
        self.config.toolchains.insert(name.to_string(), path);
        self
    }

    fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.execution.timeout_secs = secs;
        self
    }

    fn codepad(&self) -> CodePad {
        CodePad::from_config(&self.config)
    }

    fn workspace_parent(&self) -> PathBuf {
        self.workspaces.path().to_path_buf()
    }
}

#[tokio::test]
async fn test_python_hello_world() {
    init_logging();
    if !has_tools(&["python3"]) {
        return;
    }
    let pad = CodePad::from_config(&CodepadConfig::default());

    let result = pad.execute_code("python", "print(\"hi\")").await.unwrap();
    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.stdout, "hi\n");
    assert_eq!(result.exit_code, Some(0));
}

#[tokio::test]
async fn test_java_public_class_compiles_and_runs() {
    init_logging();
    if !has_tools(&["javac", "java"]) {
        return;
    }
    let pad = CodePad::from_config(&CodepadConfig::default());
    let source = r#"
public class Foo {
    public static void main(String[] args) {
        System.out.println("x");
    }
}
"#;

    let result = pad.execute_code("java", source).await.unwrap();
    assert_eq!(result.status, ExecutionStatus::Success, "{}", result.output());
    assert_eq!(result.output(), "x\n");
}

#[tokio::test]
async fn test_java_syntax_error_stops_at_compile() {
    init_logging();
    if !has_tools(&["javac", "java"]) {
        return;
    }
    let pad = CodePad::from_config(&CodepadConfig::default());

    let result = pad
        .execute_code("java", "public class Broken { void f() { int x = } }")
        .await
        .unwrap();
    assert_eq!(result.status, ExecutionStatus::CompileError);
    assert_eq!(result.phase, Some(Phase::Compile));
    assert!(!result.stderr.is_empty());
    assert!(result.output().starts_with("Compilation Error:\n"));
}

#[tokio::test]
async fn test_java_without_public_class_is_rejected() {
    init_logging();
    let toolchain = FakeToolchain::new()
        .tool("javac", "echo invoked >&2; exit 99")
        .tool("java", "echo invoked >&2; exit 99");
    let pad = toolchain.codepad();

    let err = pad
        .execute_code("java", "class Hidden { public static void main(String[] a) {} }")
        .await
        .unwrap_err();
    assert!(matches!(err, CodepadError::EntryPointNotFound { .. }));
}

#[cfg(unix)]
#[tokio::test]
async fn test_compiled_language_passes_entry_point_to_run_step() {
    init_logging();
    let toolchain = FakeToolchain::new()
        .tool("javac", "exit 0")
        .tool("java", "echo \"ran $3 from $(basename \"$2\")\"");
    let pad = toolchain.codepad();

    let result = pad
        .execute_code("java", "public class Greeter {}")
        .await
        .unwrap();
    assert!(result.is_success(), "{}", result.output());
    assert!(result.stdout.starts_with("ran Greeter from codepad-run-"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_fake_compiler_failure_skips_run() {
    init_logging();
    let toolchain = FakeToolchain::new()
        .tool("javac", "echo \"$(basename \"$5\"):1: error: ';' expected\" >&2; exit 1")
        .tool("java", "echo should-not-run");
    let pad = toolchain.codepad();

    let result = pad.execute_code("java", "public class Foo {").await.unwrap();
    assert_eq!(result.status, ExecutionStatus::CompileError);
    assert_eq!(result.stderr, "Foo.java:1: error: ';' expected\n");
    assert!(!result.stdout.contains("should-not-run"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_run_exceeding_timeout_is_killed() {
    init_logging();
    let toolchain = FakeToolchain::new().tool("python3", "sleep 30").timeout_secs(1);
    let pad = toolchain.codepad();

    let started = Instant::now();
    let result = pad.execute_code("python", "while True: pass").await.unwrap();
    assert_eq!(result.status, ExecutionStatus::Timeout);
    assert_eq!(result.phase, Some(Phase::Run));
    assert!(result.output().starts_with("Timeout Error (run phase)"));
    assert!(started.elapsed() < Duration::from_secs(15));
}

#[tokio::test]
async fn test_blank_source_reports_nothing_to_execute() {
    init_logging();
    let pad = CodePad::from_config(&CodepadConfig::default());
    for language in ["python", "javascript", "java"] {
        let result = pad.execute_code(language, "\n \t").await.unwrap();
        assert_eq!(result.output(), NOTHING_TO_EXECUTE);
    }
}

#[tokio::test]
async fn test_unknown_language() {
    let pad = CodePad::from_config(&CodepadConfig::default());
    let err = pad.execute_code("fortran", "PRINT *, 'hi'").await.unwrap_err();
    assert!(matches!(err, CodepadError::UnsupportedLanguage(ref id) if id == "fortran"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_rejecting_installer_reports_failure() {
    init_logging();
    let toolchain = FakeToolchain::new()
        .tool("python3", "echo \"ERROR: Could not find a version that satisfies the requirement\" >&2; exit 1");
    let pad = toolchain.codepad();
    let mut session = Session::new();

    let result = pad
        .install(
            &mut session,
            &DependencyInstallRequest::new(Ecosystem::Pip, "definitely-not-a-package"),
        )
        .await
        .unwrap();
    assert!(!result.success);
    assert!(result
        .message
        .contains("Could not find a version that satisfies the requirement"));

    let workspace = session.workspace().unwrap();
    assert!(workspace.root().starts_with(toolchain.workspace_parent()));
    assert!(workspace.installed_packages().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_cancelled_install_fails_and_leaves_no_workspace() {
    init_logging();
    let toolchain = FakeToolchain::new().tool("python3", "sleep 30");
    let pad = toolchain.codepad();
    let mut session = Session::new();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let result = pad
        .install_with_cancel(
            &mut session,
            &DependencyInstallRequest::new(Ecosystem::Pip, "requests"),
            &cancel,
        )
        .await
        .unwrap();
    assert!(!result.success);
    assert!(result.message.contains("cancelled"), "{}", result.message);
    assert!(started.elapsed() < Duration::from_secs(10));

    let root = session.workspace().unwrap().root().to_path_buf();
    assert!(!session.workspace().unwrap().is_installed(Ecosystem::Pip, "requests"));
    drop(session);
    assert!(!root.exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_installed_packages_are_visible_to_later_runs() {
    init_logging();
    let toolchain = FakeToolchain::new()
        .tool("npm", "mkdir -p \"$5/node_modules/$6\" && echo installed")
        .tool("node", "printf '%s' \"$NODE_PATH\"");
    let pad = toolchain.codepad();
    let mut session = Session::new();

    let installed = pad
        .install(
            &mut session,
            &DependencyInstallRequest::new(Ecosystem::Npm, "left-pad"),
        )
        .await
        .unwrap();
    assert!(installed.success, "{}", installed.message);

    let root = session.workspace().unwrap().root().to_path_buf();
    assert!(root.join("node_modules/left-pad").is_dir());
    assert!(root.join("package.json").is_file());

    let result = pad
        .execute(&mut session, "javascript", "require('left-pad')")
        .await
        .unwrap();
    let last = std::env::split_paths(&result.stdout).last().unwrap();
    assert_eq!(last, root.join("node_modules"));

    drop(session);
    assert!(!root.exists());
}

//! Dependency installation into the session workspace.
//!
//! Packages are installed with the ecosystem's own installer, targeting the
//! workspace root so later executions can import them through the language's
//! search-path variable. Failures are reported as [`InstallResult`] values.

use crate::process::{Invocation, ProcessFailure, ProcessOutput, ProcessRunner};
use crate::toolchain::{SearchPath, ToolResolver};
use crate::workspace::Workspace;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Browser-automation bundle: the package, then its browser binaries.
pub const BUNDLE_PACKAGE: &str = "playwright";
pub const BUNDLE_BROWSER: &str = "chromium";
pub const BROWSERS_DIR: &str = "ms-playwright";

const MAX_PACKAGE_NAME_LEN: usize = 214;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Pip,
    Npm,
}

impl Ecosystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ecosystem::Pip => "pip",
            Ecosystem::Npm => "npm",
        }
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Ecosystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pip" | "python" | "pypi" => Ok(Ecosystem::Pip),
            "npm" | "node" | "javascript" => Ok(Ecosystem::Npm),
            other => Err(format!("Unknown ecosystem '{}', expected pip or npm", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyInstallRequest {
    pub ecosystem: Ecosystem,
    pub package_name: String,
}

impl DependencyInstallRequest {
    pub fn new(ecosystem: Ecosystem, package_name: impl Into<String>) -> Self {
        Self {
            ecosystem,
            package_name: package_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallResult {
    pub success: bool,
    pub message: String,
}

impl InstallResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Outcome of both bundle steps; neither is rolled back when the other fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleResult {
    pub package: InstallResult,
    pub assets: InstallResult,
}

impl BundleResult {
    pub fn success(&self) -> bool {
        self.package.success && self.assets.success
    }
}

/// Package names become a single argv entry, but a leading `-` would still be
/// read as an option by the installer.
pub fn validate_package_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Package name must not be empty".to_string());
    }
    if name.len() > MAX_PACKAGE_NAME_LEN {
        return Err(format!(
            "Package name is longer than {} characters",
            MAX_PACKAGE_NAME_LEN
        ));
    }
    if name.starts_with('-') {
        return Err(format!("Package name '{}' must not start with '-'", name));
    }
    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(format!(
            "Package name '{}' must not contain whitespace or control characters",
            name.escape_debug()
        ));
    }
    Ok(())
}

pub struct DependencyInstaller {
    runner: Arc<dyn ProcessRunner>,
    tools: ToolResolver,
    python_tool: String,
    npm_tool: String,
    timeout: Duration,
}

impl DependencyInstaller {
    pub fn new(runner: Arc<dyn ProcessRunner>, tools: ToolResolver, timeout: Duration) -> Self {
        Self {
            runner,
            tools,
            python_tool: "python3".to_string(),
            npm_tool: "npm".to_string(),
            timeout,
        }
    }

    pub fn with_python_tool(mut self, tool: impl Into<String>) -> Self {
        self.python_tool = tool.into();
        self
    }

    pub fn with_npm_tool(mut self, tool: impl Into<String>) -> Self {
        self.npm_tool = tool.into();
        self
    }

    pub async fn install(
        &self,
        request: &DependencyInstallRequest,
        workspace: &mut Workspace,
    ) -> InstallResult {
        self.install_with_cancel(request, workspace, &CancellationToken::new())
            .await
    }

    pub async fn install_with_cancel(
        &self,
        request: &DependencyInstallRequest,
        workspace: &mut Workspace,
        cancel: &CancellationToken,
    ) -> InstallResult {
        let package = request.package_name.trim();
        if let Err(reason) = validate_package_name(package) {
            log::warn!("Rejected install request: {}", reason);
            return InstallResult::failed(reason);
        }

        if cancel.is_cancelled() {
            return InstallResult::failed(format!(
                "Failed to install {} via {}: {}",
                package,
                request.ecosystem,
                ProcessFailure::Cancelled
            ));
        }

        let invocation = self.package_invocation(request.ecosystem, package, workspace);
        log::info!(
            "Installing {} package '{}' into {}",
            request.ecosystem,
            package,
            workspace.root().display()
        );

        let result = self
            .run_step(&invocation, cancel, &format!("install {} via {}", package, request.ecosystem))
            .await;
        if result.success {
            workspace.record_install(request.ecosystem, package);
            log::info!("Installed {} package '{}'", request.ecosystem, package);
        }
        result
    }

    /// Install the browser-automation package, then fetch its browser binaries.
    pub async fn install_bundle(&self, workspace: &mut Workspace) -> BundleResult {
        self.install_bundle_with_cancel(workspace, &CancellationToken::new())
            .await
    }

    pub async fn install_bundle_with_cancel(
        &self,
        workspace: &mut Workspace,
        cancel: &CancellationToken,
    ) -> BundleResult {
        let request = DependencyInstallRequest::new(Ecosystem::Pip, BUNDLE_PACKAGE);
        let package = self.install_with_cancel(&request, workspace, cancel).await;

        let action = format!("download {} browser for {}", BUNDLE_BROWSER, BUNDLE_PACKAGE);
        if cancel.is_cancelled() {
            log::info!("Bundle install cancelled, skipping browser download");
            return BundleResult {
                package,
                assets: InstallResult::failed(format!("Failed to {}: {}", action, ProcessFailure::Cancelled)),
            };
        }
        if !package.success {
            log::warn!("Bundle package step failed, still attempting browser download");
        }

        let invocation = self.assets_invocation(workspace);
        log::info!("Fetching {} browser for {}", BUNDLE_BROWSER, BUNDLE_PACKAGE);
        let assets = self.run_step(&invocation, cancel, &action).await;

        BundleResult { package, assets }
    }

    fn package_invocation(
        &self,
        ecosystem: Ecosystem,
        package: &str,
        workspace: &Workspace,
    ) -> Invocation {
        let root = workspace.root().to_string_lossy().into_owned();
        match ecosystem {
            Ecosystem::Pip => Invocation::new(
                self.tools.resolve_program(&self.python_tool),
                workspace.root(),
                self.timeout,
            )
            .args(["-m", "pip", "install", "--disable-pip-version-check", "--no-input"])
            .arg("--target")
            .arg(root)
            .arg(package),
            Ecosystem::Npm => Invocation::new(
                self.tools.resolve_program(&self.npm_tool),
                workspace.root(),
                self.timeout,
            )
            .args(["install", "--no-audit", "--no-fund"])
            .arg("--prefix")
            .arg(root)
            .arg(package),
        }
    }

    fn assets_invocation(&self, workspace: &Workspace) -> Invocation {
        let python_path = SearchPath::new("PYTHONPATH")
            .extend(std::env::var_os("PYTHONPATH"), workspace.root());
        let browsers = workspace.root().join(BROWSERS_DIR);

        Invocation::new(
            self.tools.resolve_program(&self.python_tool),
            workspace.root(),
            self.timeout,
        )
        .args(["-m", BUNDLE_PACKAGE, "install", BUNDLE_BROWSER])
        .env("PYTHONPATH", python_path.to_string_lossy())
        .env("PLAYWRIGHT_BROWSERS_PATH", browsers.to_string_lossy())
    }

    async fn run_step(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
        action: &str,
    ) -> InstallResult {
        match self.runner.run(invocation, cancel).await {
            Ok(output) if output.success() => InstallResult::ok(format!("Successfully ran {}", action)),
            Ok(output) => {
                log::warn!("Failed to {} (exit code {:?})", action, output.exit_code);
                InstallResult::failed(format!(
                    "Failed to {} (exit code {}):\n{}",
                    action,
                    exit_label(&output),
                    diagnostic_text(&output)
                ))
            }
            Err(failure @ ProcessFailure::Spawn { .. }) => {
                log::error!("Could not start installer to {}: {}", action, failure);
                InstallResult::failed(format!("Failed to {}: {}", action, failure))
            }
            Err(failure) => {
                log::warn!("Installer step to {} aborted: {}", action, failure);
                InstallResult::failed(format!("Failed to {}: {}", action, failure))
            }
        }
    }
}

fn exit_label(output: &ProcessOutput) -> String {
    output
        .exit_code
        .map(|code| code.to_string())
        .unwrap_or_else(|| "signal".to_string())
}

/// Installers report errors on stderr; fall back to stdout when it is empty.
fn diagnostic_text(output: &ProcessOutput) -> &str {
    if output.stderr.trim().is_empty() {
        &output.stdout
    } else {
        &output.stderr
    }
}

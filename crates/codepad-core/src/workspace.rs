//! Session-scoped workspace holding installed dependencies.
//!
//! The workspace outlives individual execution requests. It is the install
//! target of the dependency installer and is exposed to programs through the
//! language's search-path variable. Per-request source directories are
//! separate and never live here.

use crate::config::WorkspaceConfig;
use crate::errors::CodepadError;
use crate::installer::Ecosystem;
use crate::session::Session;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "package.json";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct InstalledPackage {
    pub ecosystem: Ecosystem,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Workspace {
    root: PathBuf,
    created_at: DateTime<Utc>,
    installed_packages: BTreeSet<InstalledPackage>,
}

impl Workspace {
    /// Wrap an existing directory. The caller owns its lifetime.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            created_at: Utc::now(),
            installed_packages: BTreeSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn installed_packages(&self) -> &BTreeSet<InstalledPackage> {
        &self.installed_packages
    }

    pub fn is_installed(&self, ecosystem: Ecosystem, name: &str) -> bool {
        self.installed_packages.contains(&InstalledPackage {
            ecosystem,
            name: name.to_string(),
        })
    }

    pub(crate) fn record_install(&mut self, ecosystem: Ecosystem, name: &str) {
        self.installed_packages.insert(InstalledPackage {
            ecosystem,
            name: name.to_string(),
        });
    }

    /// Remove the directory tree. Best-effort: failures are logged, never returned.
    pub fn destroy(self) {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => log::info!("Removed workspace {}", self.root.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("Workspace {} already gone", self.root.display());
            }
            Err(e) => {
                log::warn!(
                    "Could not remove workspace {} in one pass ({}), removing what is possible",
                    self.root.display(),
                    e
                );
                let failures = remove_tree_best_effort(&self.root);
                if failures > 0 {
                    log::warn!(
                        "{} entries under {} could not be removed",
                        failures,
                        self.root.display()
                    );
                }
            }
        }
    }
}

/// Remove every entry that can be removed, returning how many could not.
fn remove_tree_best_effort(path: &Path) -> usize {
    let mut failures = 0;
    if let Ok(entries) = fs::read_dir(path) {
        for entry in entries.flatten() {
            let entry_path = entry.path();
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                failures += remove_tree_best_effort(&entry_path);
            } else if let Err(e) = fs::remove_file(&entry_path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::debug!("Failed to remove {}: {}", entry_path.display(), e);
                    failures += 1;
                }
            }
        }
    }
    if let Err(e) = fs::remove_dir(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            failures += 1;
        }
    }
    failures
}

#[derive(Debug, Clone, Default)]
pub struct WorkspaceManager {
    config: WorkspaceConfig,
}

impl WorkspaceManager {
    pub fn new(config: WorkspaceConfig) -> Self {
        Self { config }
    }

    /// Return the session's workspace, allocating it on first use.
    pub async fn create<'s>(&self, session: &'s mut Session) -> Result<&'s mut Workspace, CodepadError> {
        if session.workspace.is_none() {
            let workspace = self.allocate().await?;
            log::info!(
                "Created workspace {} for session {}",
                workspace.root().display(),
                session.id()
            );
            session.workspace = Some(workspace);
        }
        session
            .workspace
            .as_mut()
            .ok_or_else(|| CodepadError::Workspace("workspace allocation failed".to_string()))
    }

    /// Tear down the session's workspace, if any.
    pub fn destroy(&self, session: &mut Session) {
        if let Some(workspace) = session.workspace.take() {
            workspace.destroy();
        }
    }

    async fn allocate(&self) -> Result<Workspace, CodepadError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("codepad-ws-");

        let dir = match &self.config.parent_dir {
            Some(parent) => {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    CodepadError::Workspace(format!(
                        "Failed to create workspace parent {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
                builder.tempdir_in(parent)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| CodepadError::Workspace(format!("Failed to allocate workspace: {}", e)))?;

        // Lifetime is managed by WorkspaceManager::destroy and Session's Drop
        let root = dir.keep();
        let workspace = Workspace::at(root);

        if self.config.init_manifest {
            if let Err(e) = write_manifest(workspace.root()).await {
                let message = format!(
                    "Failed to initialize workspace manifest in {}: {}",
                    workspace.root().display(),
                    e
                );
                workspace.destroy();
                return Err(CodepadError::Workspace(message));
            }
        }

        Ok(workspace)
    }
}

async fn write_manifest(root: &Path) -> std::io::Result<()> {
    let manifest = serde_json::json!({
        "name": "codepad-workspace",
        "version": "0.0.0",
        "private": true,
        "description": "Dependencies installed for a Codepad session",
    });
    let body = serde_json::to_string_pretty(&manifest).map_err(std::io::Error::other)?;
    tokio::fs::write(root.join(MANIFEST_FILE), body).await
}

//! Locates toolchain binaries at startup instead of relying on compiled-in paths.
//!
//! Lookup order for a logical tool name:
//! 1. explicit override from configuration (`toolchains.<name>`)
//! 2. `CODEPAD_TOOL_<NAME>` environment variable
//! 3. configured extra tool directories
//! 4. the system `PATH`

use crate::config::CodepadConfig;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use which::which;

#[derive(Debug, Clone, Default)]
pub struct ToolResolver {
    overrides: HashMap<String, PathBuf>,
    tool_dirs: Vec<PathBuf>,
    skip_system_path: bool,
}

impl ToolResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &CodepadConfig) -> Self {
        Self {
            overrides: config.toolchains.clone(),
            tool_dirs: config.tool_dirs.clone(),
            skip_system_path: false,
        }
    }

    pub fn with_override(mut self, tool: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.overrides.insert(tool.into(), path.into());
        self
    }

    pub fn with_tool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tool_dirs.push(dir.into());
        self
    }

    /// Only consult overrides and tool dirs; used by tests that plant fake binaries.
    pub fn without_system_path(mut self) -> Self {
        self.skip_system_path = true;
        self
    }

    pub fn find_tool(&self, tool: &str) -> Option<PathBuf> {
        let as_path = Path::new(tool);
        if as_path.is_absolute() {
            return as_path.exists().then(|| as_path.to_path_buf());
        }

        self.overrides
            .get(tool)
            .cloned()
            .or_else(|| self.find_tool_in_env(tool))
            .or_else(|| self.find_tool_in_dirs(tool))
            .or_else(|| {
                if self.skip_system_path {
                    None
                } else {
                    which(tool).ok()
                }
            })
    }

    /// Resolve a program for spawning. Unresolvable names are returned as-is so
    /// the spawn attempt reports the missing binary.
    pub fn resolve_program(&self, tool: &str) -> PathBuf {
        match self.find_tool(tool) {
            Some(path) => path,
            None => {
                log::debug!("Tool '{}' not found, deferring to spawn", tool);
                PathBuf::from(tool)
            }
        }
    }

    fn find_tool_in_env(&self, tool: &str) -> Option<PathBuf> {
        let var = env_var_name(tool);
        env::var_os(&var)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    }

    fn find_tool_in_dirs(&self, tool: &str) -> Option<PathBuf> {
        self.tool_dirs
            .iter()
            .map(|dir| dir.join(tool))
            .find(|candidate| candidate.is_file())
    }
}

pub fn env_var_name(tool: &str) -> String {
    let normalized: String = tool
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("CODEPAD_TOOL_{}", normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_env_var_name() {
        assert_eq!(env_var_name("javac"), "CODEPAD_TOOL_JAVAC");
        assert_eq!(env_var_name("python3"), "CODEPAD_TOOL_PYTHON3");
        assert_eq!(env_var_name("my-tool.sh"), "CODEPAD_TOOL_MY_TOOL_SH");
    }

    #[test]
    fn test_override_wins() {
        let resolver = ToolResolver::new()
            .with_override("javac", "/opt/jdk/bin/javac")
            .without_system_path();
        assert_eq!(
            resolver.find_tool("javac"),
            Some(PathBuf::from("/opt/jdk/bin/javac"))
        );
    }

    #[test]
    fn test_tool_dir_lookup() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("fakec"), "#!/bin/sh\n").unwrap();

        let resolver = ToolResolver::new()
            .with_tool_dir(dir.path())
            .without_system_path();
        assert_eq!(resolver.find_tool("fakec"), Some(dir.path().join("fakec")));
        assert_eq!(resolver.find_tool("missing-tool"), None);
    }

    #[test]
    fn test_env_lookup() {
        let var = env_var_name("codepad-env-probe");
        env::set_var(&var, "/somewhere/probe");
        let resolver = ToolResolver::new().without_system_path();
        let found = resolver.find_tool("codepad-env-probe");
        env::remove_var(&var);
        assert_eq!(found, Some(PathBuf::from("/somewhere/probe")));
    }

    #[test]
    fn test_unresolved_program_is_passed_through() {
        let resolver = ToolResolver::new().without_system_path();
        assert_eq!(
            resolver.resolve_program("definitely-not-installed-xyz"),
            PathBuf::from("definitely-not-installed-xyz")
        );
    }
}

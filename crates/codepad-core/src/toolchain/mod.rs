//! Per-language toolchain definitions.
//!
//! A [`LanguageConfig`] says how to name the source file, how to compile it
//! (if at all), how to run it, and which module search-path variable should
//! see the session workspace. Commands are argument vectors with placeholders;
//! nothing is ever handed to a shell.

pub mod entry_point;
pub mod resolver;

pub use entry_point::{EntryPointStrategy, RegexEntryPoint};
pub use resolver::ToolResolver;

use crate::errors::CodepadError;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Values substituted into command template arguments.
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    /// `{source}`
    pub source: &'a Path,
    /// `{dir}`
    pub dir: &'a Path,
    /// `{entry}`
    pub entry: Option<&'a str>,
    /// `{workspace}`
    pub workspace: Option<&'a Path>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    /// Logical tool name, resolved through [`ToolResolver`]
    pub program: String,
    pub args: Vec<String>,
}

impl CommandTemplate {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.program.trim().is_empty()
    }

    /// Substitute placeholders in every argument. Each argument stays one argv entry.
    pub fn render_args(&self, ctx: &TemplateContext<'_>) -> Vec<String> {
        let source = ctx.source.to_string_lossy();
        let dir = ctx.dir.to_string_lossy();
        let workspace = ctx
            .workspace
            .map(|w| w.to_string_lossy().into_owned())
            .unwrap_or_default();
        let entry = ctx.entry.unwrap_or_default();

        self.args
            .iter()
            .map(|arg| {
                arg.replace("{source}", &source)
                    .replace("{dir}", &dir)
                    .replace("{entry}", entry)
                    .replace("{workspace}", &workspace)
            })
            .collect()
    }
}

/// A module/library search-path variable that gets the workspace appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPath {
    pub variable: String,
    /// Subdirectory of the workspace root, e.g. `node_modules`
    pub subdir: Option<String>,
}

impl SearchPath {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            subdir: None,
        }
    }

    pub fn with_subdir(mut self, subdir: impl Into<String>) -> Self {
        self.subdir = Some(subdir.into());
        self
    }

    pub fn entry_for(&self, workspace_root: &Path) -> PathBuf {
        match &self.subdir {
            Some(subdir) => workspace_root.join(subdir),
            None => workspace_root.to_path_buf(),
        }
    }

    /// Append the workspace entry to an existing value of the variable.
    pub fn extend(&self, existing: Option<OsString>, workspace_root: &Path) -> OsString {
        let mut paths: Vec<PathBuf> = existing
            .as_deref()
            .map(|value| std::env::split_paths(value).collect())
            .unwrap_or_default();
        paths.retain(|p| !p.as_os_str().is_empty());
        paths.push(self.entry_for(workspace_root));

        std::env::join_paths(&paths).unwrap_or_else(|_| {
            // A path containing the separator cannot be joined; fall back to the workspace alone
            self.entry_for(workspace_root).into_os_string()
        })
    }
}

#[derive(Debug, Clone)]
pub struct LanguageConfig {
    pub id: String,
    pub display_name: String,
    /// Without the leading dot
    pub source_extension: String,
    pub compile_command: Option<CommandTemplate>,
    pub run_command: CommandTemplate,
    pub search_path: Option<SearchPath>,
    pub entry_point: Option<Arc<dyn EntryPointStrategy>>,
    pub aliases: Vec<String>,
}

impl LanguageConfig {
    pub fn new(
        id: impl Into<String>,
        source_extension: impl Into<String>,
        run_command: CommandTemplate,
    ) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            source_extension: source_extension.into(),
            compile_command: None,
            run_command,
            search_path: None,
            entry_point: None,
            aliases: Vec::new(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_compile_command(mut self, command: CommandTemplate) -> Self {
        self.compile_command = Some(command);
        self
    }

    pub fn with_search_path(mut self, search_path: SearchPath) -> Self {
        self.search_path = Some(search_path);
        self
    }

    pub fn with_entry_point(mut self, strategy: impl EntryPointStrategy + 'static) -> Self {
        self.entry_point = Some(Arc::new(strategy));
        self
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_compiled(&self) -> bool {
        self.compile_command.is_some()
    }

    pub fn requires_entry_point(&self) -> bool {
        self.entry_point.is_some()
    }

    /// Extract the entry-point identifier. Languages without a rule yield `Ok(None)`.
    pub fn extract_entry_point(&self, source: &str) -> Result<Option<String>, CodepadError> {
        match &self.entry_point {
            None => Ok(None),
            Some(strategy) => strategy.extract(source).map(Some).ok_or_else(|| {
                CodepadError::EntryPointNotFound {
                    language: self.id.clone(),
                    pattern: strategy.describe(),
                }
            }),
        }
    }

    /// File name used when no entry point is involved.
    pub fn canonical_file_name(&self) -> String {
        format!("main.{}", self.source_extension)
    }

    pub fn validate(&self) -> Result<(), CodepadError> {
        if self.id.trim().is_empty() {
            return Err(CodepadError::Config("language id must not be empty".to_string()));
        }
        if self.source_extension.trim().is_empty() || self.source_extension.starts_with('.') {
            return Err(CodepadError::Config(format!(
                "language '{}' has an invalid source extension '{}'",
                self.id, self.source_extension
            )));
        }
        if self.run_command.is_empty() {
            return Err(CodepadError::Config(format!(
                "language '{}' has an empty run command",
                self.id
            )));
        }
        if let Some(compile) = &self.compile_command {
            if compile.is_empty() {
                return Err(CodepadError::Config(format!(
                    "language '{}' has an empty compile command",
                    self.id
                )));
            }
        }
        Ok(())
    }

    pub fn info(&self) -> LanguageInfo {
        LanguageInfo {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            extension: self.source_extension.clone(),
            compiled: self.is_compiled(),
            entry_point: self.entry_point.as_ref().map(|s| s.describe()),
            aliases: self.aliases.clone(),
        }
    }
}

/// Serializable summary for language pickers.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LanguageInfo {
    pub id: String,
    pub display_name: String,
    pub extension: String,
    pub compiled: bool,
    pub entry_point: Option<String>,
    pub aliases: Vec<String>,
}

/// Read-only map from language id (or alias) to its toolchain.
#[derive(Debug, Clone)]
pub struct ToolchainRegistry {
    languages: BTreeMap<String, LanguageConfig>,
    aliases: HashMap<String, String>,
}

impl ToolchainRegistry {
    pub fn new(configs: Vec<LanguageConfig>) -> Result<Self, CodepadError> {
        let mut languages = BTreeMap::new();
        let mut aliases = HashMap::new();

        for config in configs {
            config.validate()?;
            let id = config.id.to_lowercase();
            for alias in &config.aliases {
                let alias = alias.to_lowercase();
                if let Some(previous) = aliases.insert(alias.clone(), id.clone()) {
                    return Err(CodepadError::Config(format!(
                        "alias '{}' is claimed by both '{}' and '{}'",
                        alias, previous, id
                    )));
                }
            }
            if languages.insert(id.clone(), config).is_some() {
                return Err(CodepadError::Config(format!(
                    "language '{}' registered twice",
                    id
                )));
            }
        }

        Ok(Self { languages, aliases })
    }

    /// Python, JavaScript and Java.
    pub fn builtin() -> Self {
        let python = LanguageConfig::new(
            "python",
            "py",
            CommandTemplate::new("python3", ["{source}"]),
        )
        .with_display_name("Python")
        .with_search_path(SearchPath::new("PYTHONPATH"))
        .with_aliases(["py", "python3"]);

        let javascript = LanguageConfig::new(
            "javascript",
            "js",
            CommandTemplate::new("node", ["{source}"]),
        )
        .with_display_name("JavaScript")
        .with_search_path(SearchPath::new("NODE_PATH").with_subdir("node_modules"))
        .with_aliases(["js", "node", "nodejs"]);

        let java = LanguageConfig::new(
            "java",
            "java",
            CommandTemplate::new("java", ["-cp", "{dir}", "{entry}"]),
        )
        .with_display_name("Java")
        .with_compile_command(CommandTemplate::new(
            "javac",
            ["-encoding", "UTF-8", "-d", "{dir}", "{source}"],
        ))
        .with_entry_point(RegexEntryPoint::java_public_class());

        Self::new(vec![python, javascript, java]).expect("builtin toolchains are valid")
    }

    pub fn resolve(&self, language_id: &str) -> Result<&LanguageConfig, CodepadError> {
        let key = language_id.trim().to_lowercase();
        let id = self.aliases.get(&key).unwrap_or(&key);
        self.languages
            .get(id)
            .ok_or_else(|| CodepadError::UnsupportedLanguage(language_id.to_string()))
    }

    pub fn languages(&self) -> impl Iterator<Item = &LanguageConfig> {
        self.languages.values()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.languages.keys().map(String::as_str).collect()
    }
}

impl Default for ToolchainRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_languages() {
        let registry = ToolchainRegistry::builtin();
        for id in ["python", "javascript", "java"] {
            let config = registry.resolve(id).unwrap();
            assert_eq!(config.id, id);
            assert!(!config.run_command.is_empty());
        }
        assert_eq!(registry.ids(), vec!["java", "javascript", "python"]);
    }

    #[test]
    fn test_resolve_unknown_language() {
        let registry = ToolchainRegistry::builtin();
        let err = registry.resolve("brainfuck").unwrap_err();
        assert!(matches!(err, CodepadError::UnsupportedLanguage(ref id) if id == "brainfuck"));
    }

    #[test]
    fn test_resolve_is_case_insensitive_and_honours_aliases() {
        let registry = ToolchainRegistry::builtin();
        assert_eq!(registry.resolve("Python").unwrap().id, "python");
        assert_eq!(registry.resolve(" py ").unwrap().id, "python");
        assert_eq!(registry.resolve("nodejs").unwrap().id, "javascript");
    }

    #[test]
    fn test_only_compiled_languages_have_compile_command() {
        let registry = ToolchainRegistry::builtin();
        assert!(registry.resolve("java").unwrap().is_compiled());
        assert!(!registry.resolve("python").unwrap().is_compiled());
        assert!(!registry.resolve("javascript").unwrap().is_compiled());
    }

    #[test]
    fn test_extract_entry_point() {
        let registry = ToolchainRegistry::builtin();
        let java = registry.resolve("java").unwrap();
        assert_eq!(
            java.extract_entry_point("public class Foo {}").unwrap(),
            Some("Foo".to_string())
        );
        let err = java.extract_entry_point("class Foo {}").unwrap_err();
        assert!(matches!(err, CodepadError::EntryPointNotFound { .. }));

        let python = registry.resolve("python").unwrap();
        assert_eq!(python.extract_entry_point("print(1)").unwrap(), None);
    }

    #[test]
    fn test_render_args_keeps_one_argument_per_entry() {
        let template = CommandTemplate::new("java", ["-cp", "{dir}", "{entry}"]);
        let source = Path::new("/tmp/run 1/Foo.java");
        let dir = Path::new("/tmp/run 1");
        let args = template.render_args(&TemplateContext {
            source,
            dir,
            entry: Some("Foo"),
            workspace: None,
        });
        assert_eq!(args, vec!["-cp", "/tmp/run 1", "Foo"]);
    }

    #[test]
    fn test_search_path_extend() {
        let search = SearchPath::new("NODE_PATH").with_subdir("node_modules");
        let ws = Path::new("/ws");
        let value = search.extend(None, ws);
        assert_eq!(PathBuf::from(value), PathBuf::from("/ws/node_modules"));

        let existing = std::env::join_paths([Path::new("/lib/a")]).unwrap();
        let value = search.extend(Some(existing), ws);
        let parts: Vec<PathBuf> = std::env::split_paths(&value).collect();
        assert_eq!(
            parts,
            vec![PathBuf::from("/lib/a"), PathBuf::from("/ws/node_modules")]
        );
    }

    #[test]
    fn test_invalid_configs_are_rejected() {
        let empty_run = LanguageConfig::new("x", "x", CommandTemplate::new("", Vec::<String>::new()));
        assert!(ToolchainRegistry::new(vec![empty_run]).is_err());

        let dotted = LanguageConfig::new("x", ".x", CommandTemplate::new("x", ["{source}"]));
        assert!(ToolchainRegistry::new(vec![dotted]).is_err());

        let a = LanguageConfig::new("a", "a", CommandTemplate::new("a", ["{source}"]))
            .with_aliases(["shared"]);
        let b = LanguageConfig::new("b", "b", CommandTemplate::new("b", ["{source}"]))
            .with_aliases(["shared"]);
        assert!(ToolchainRegistry::new(vec![a, b]).is_err());
    }

    #[test]
    fn test_language_info() {
        let registry = ToolchainRegistry::builtin();
        let info = registry.resolve("java").unwrap().info();
        assert!(info.compiled);
        assert_eq!(info.extension, "java");
        assert!(info.entry_point.unwrap().contains("public"));
    }
}

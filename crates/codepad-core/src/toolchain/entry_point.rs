//! Entry-point extraction strategies.
//!
//! Some toolchains need an identifier taken from the source itself before
//! they can compile or launch it (Java wants the file named after its public
//! class and the launcher wants the class name). Each language that needs one
//! carries its own strategy object.

use regex::Regex;
use std::fmt::Debug;

pub trait EntryPointStrategy: Debug + Send + Sync {
    /// Return the entry-point identifier found in `source`, if any.
    fn extract(&self, source: &str) -> Option<String>;

    /// Human-readable description of what the strategy looks for.
    fn describe(&self) -> String;
}

/// Takes capture group 1 of the first match of a regular expression.
#[derive(Debug, Clone)]
pub struct RegexEntryPoint {
    pattern: Regex,
}

impl RegexEntryPoint {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }

    /// `public class <Name>`, as required by `javac` for the file name.
    pub fn java_public_class() -> Self {
        Self {
            pattern: Regex::new(r"public\s+class\s+(\w+)")
                .expect("java public class pattern is valid"),
        }
    }
}

impl EntryPointStrategy for RegexEntryPoint {
    fn extract(&self, source: &str) -> Option<String> {
        self.pattern
            .captures(source)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    fn describe(&self) -> String {
        self.pattern.as_str().to_string()
    }
}

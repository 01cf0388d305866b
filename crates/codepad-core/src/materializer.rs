//! Writes submitted source into a request directory.

use crate::errors::CodepadError;
use crate::toolchain::LanguageConfig;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub language: String,
    pub content: String,
    /// Identifier extracted from the source, for languages that need one
    pub entry_point: Option<String>,
}

impl SourceFile {
    /// The directory holding the source, used as the working directory.
    pub fn directory(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// Name the file after the entry point when the language needs one,
/// `main.<ext>` otherwise. Extraction runs before anything touches the disk.
pub fn file_name_for(source_text: &str, language: &LanguageConfig) -> Result<(String, Option<String>), CodepadError> {
    match language.extract_entry_point(source_text)? {
        Some(entry) => Ok((format!("{}.{}", entry, language.source_extension), Some(entry))),
        None => Ok((language.canonical_file_name(), None)),
    }
}

pub async fn materialize(
    source_text: &str,
    language: &LanguageConfig,
    directory: &Path,
) -> Result<SourceFile, CodepadError> {
    let (file_name, entry_point) = file_name_for(source_text, language)?;
    let path = directory.join(file_name);

    write_source(&path, source_text)
        .await
        .map_err(|e| CodepadError::Materialization {
            path: path.clone(),
            message: e.to_string(),
        })?;

    log::debug!(
        "Materialized {} source ({} bytes) at {}",
        language.id,
        source_text.len(),
        path.display()
    );

    Ok(SourceFile {
        path,
        language: language.id.clone(),
        content: source_text.to_string(),
        entry_point,
    })
}

async fn write_source(path: &Path, content: &str) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

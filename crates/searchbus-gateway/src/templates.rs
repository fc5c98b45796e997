//! Index template definition files
//!
//! A definition file is a YAML mapping of template names to template bodies,
//! so one file yields zero or more definitions. JSON files parse as well.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// One named template body
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateDefinition {
    pub name: String,
    pub source: Map<String, Value>,
}

/// Template loading errors
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Failed to list {}: {source}", .dir.display())]
    List {
        dir: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid template file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Template file must contain a mapping")]
    NotAnObject,

    #[error("Template {0} must be a mapping")]
    InvalidDefinition(String),
}

/// Result type for template loading
pub type TemplateResult<T> = Result<T, TemplateError>;

/// File access used while loading templates
#[async_trait]
pub trait TemplateFs: Send + Sync {
    /// Files directly inside `dir` whose name ends with `suffix`, sorted
    async fn list_files(&self, dir: &Path, suffix: &str) -> TemplateResult<Vec<PathBuf>>;

    async fn read_file(&self, path: &Path) -> TemplateResult<Vec<u8>>;
}

/// Local filesystem via `tokio::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

#[async_trait]
impl TemplateFs for LocalFs {
    async fn list_files(&self, dir: &Path, suffix: &str) -> TemplateResult<Vec<PathBuf>> {
        let list_error = |source| TemplateError::List {
            dir: dir.to_path_buf(),
            source,
        };

        let mut entries = tokio::fs::read_dir(dir).await.map_err(list_error)?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(list_error)? {
            let is_file = entry.file_type().await.map_err(list_error)?.is_file();
            let matches = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(suffix));
            if is_file && matches {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    async fn read_file(&self, path: &Path) -> TemplateResult<Vec<u8>> {
        tokio::fs::read(path).await.map_err(|source| TemplateError::Read {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Parse a definition file into its named templates.
pub fn parse_templates(bytes: &[u8]) -> TemplateResult<Vec<TemplateDefinition>> {
    let Value::Object(entries) = serde_yaml::from_slice::<Value>(bytes)? else {
        return Err(TemplateError::NotAnObject);
    };

    entries
        .into_iter()
        .map(|(name, body)| match body {
            Value::Object(source) => Ok(TemplateDefinition { name, source }),
            _ => Err(TemplateError::InvalidDefinition(name)),
        })
        .collect()
}

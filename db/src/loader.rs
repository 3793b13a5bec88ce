//! Template registry loading.
//!
//! [`TemplateRegistry`] holds parsed templates keyed by name.
//!
//! # Loading patterns
//!
//! ```no_run
//! use sqlstencil_db::TemplateRegistry;
//!
//! // Every *.xml file in a directory, keyed by file stem
//! let registry = TemplateRegistry::from_dir("sql/").unwrap();
//! let users = registry.require("users").unwrap();
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sqlstencil_core::TemplateDocument;
use tracing::debug;

use crate::error::{ConfigError, Result};

/// File extension of template files.
pub const TEMPLATE_EXTENSION: &str = "xml";

/// Describes where a [`TemplateRegistry`] was loaded from.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrySource {
    /// A directory of `*.xml` files.
    Directory(PathBuf),
    /// Templates added in code.
    Memory,
}

/// Parsed templates keyed by name.
///
/// # Examples
///
/// ```
/// use sqlstencil_db::TemplateRegistry;
///
/// let mut registry = TemplateRegistry::new();
/// registry.insert_text("users", r#"<select id="all">SELECT * FROM users</select>"#).unwrap();
///
/// assert!(registry.contains("users"));
/// assert!(registry.require("orders").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: HashMap<String, TemplateDocument>,
    source: RegistrySource,
}

impl TemplateRegistry {
    /// Creates an empty in-memory registry.
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
            source: RegistrySource::Memory,
        }
    }

    /// Loads every `*.xml` file in `path`, keyed by file stem.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::IoError`] if the directory or a file cannot be
    /// read, or [`ConfigError::MalformedTemplate`] if a file cannot be
    /// tokenized.
    pub fn from_dir(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut templates = HashMap::new();

        for entry in std::fs::read_dir(path)? {
            let file_path = entry?.path();
            if file_path.extension().and_then(|e| e.to_str()) != Some(TEMPLATE_EXTENSION) {
                continue;
            }
            let (name, document) = load_template(&file_path)?;
            templates.insert(name, document);
        }

        debug!(dir = %path.display(), count = templates.len(), "Loaded template directory");
        Ok(Self {
            templates,
            source: RegistrySource::Directory(path.to_path_buf()),
        })
    }

    /// Looks up a template by name.
    pub fn get(&self, name: &str) -> Option<&TemplateDocument> {
        self.templates.get(name)
    }

    /// Looks up a template by name, failing when it is absent.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::TemplateNotFound`].
    pub fn require(&self, name: &str) -> Result<&TemplateDocument> {
        self.get(name)
            .ok_or_else(|| ConfigError::TemplateNotFound(name.to_string()))
    }

    /// Inserts a parsed template, replacing any entry with the same name.
    pub fn insert(&mut self, name: impl Into<String>, document: TemplateDocument) {
        self.templates.insert(name.into(), document);
    }

    /// Parses `text` and inserts it under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MalformedTemplate`] if `text` cannot be
    /// tokenized.
    pub fn insert_text(&mut self, name: impl Into<String>, text: &str) -> Result<()> {
        let name = name.into();
        let document =
            TemplateDocument::parse(text).map_err(|source| ConfigError::MalformedTemplate {
                path: PathBuf::from(&name),
                source,
            })?;
        self.templates.insert(name, document);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Returns an iterator over template names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    /// Returns a reference to the source metadata.
    pub fn source(&self) -> &RegistrySource {
        &self.source
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn load_template(path: &Path) -> Result<(String, TemplateDocument)> {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| {
            ConfigError::InvalidConfig(format!("template path has no name: {}", path.display()))
        })?
        .to_string();
    let text = std::fs::read_to_string(path)?;
    let document =
        TemplateDocument::parse(&text).map_err(|source| ConfigError::MalformedTemplate {
            path: path.to_path_buf(),
            source,
        })?;
    Ok((name, document))
}

#[cfg(test)]
mod tests {
    use super::*;

    const USERS: &str = r#"<sqlMap><select id="all">SELECT * FROM users</select></sqlMap>"#;

    #[test]
    fn test_from_dir_keys_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("users.xml"), USERS).unwrap();
        std::fs::write(dir.path().join("orders.xml"), USERS).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a template").unwrap();

        let registry = TemplateRegistry::from_dir(dir.path()).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("users"));
        assert!(registry.contains("orders"));
        assert!(!registry.contains("notes"));
        assert_eq!(
            registry.source(),
            &RegistrySource::Directory(dir.path().to_path_buf())
        );
    }

    #[test]
    fn test_malformed_file_names_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.xml");
        std::fs::write(&path, "<select id='a'>x</update>").unwrap();

        match TemplateRegistry::from_dir(dir.path()) {
            Err(ConfigError::MalformedTemplate { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected malformed template, got {other:?}"),
        }
    }

    #[test]
    fn test_require_missing_template() {
        let registry = TemplateRegistry::new();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.require("users"),
            Err(ConfigError::TemplateNotFound(name)) if name == "users"
        ));
    }

    #[test]
    fn test_inserted_templates_stay_in_memory() {
        let mut registry = TemplateRegistry::default();
        registry.insert_text("users", USERS).unwrap();
        assert_eq!(registry.source(), &RegistrySource::Memory);
        assert_eq!(registry.names().collect::<Vec<_>>(), ["users"]);
    }
}

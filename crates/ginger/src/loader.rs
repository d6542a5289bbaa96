/*
 * loader.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template loading.
//!
//! This module provides the trait and implementations for resolving a
//! template name to source text (filesystem, memory, etc.). Loaders
//! distinguish "not found" (`Ok(None)`, so `ignore missing` and
//! multi-candidate includes can fall through) from genuine failures
//! (`Err`, surfaced as `LoaderError`).

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::trace;

use crate::error::{Error, ErrorKind, TemplateResult};

/// A loaded template source with its canonical name.
#[derive(Debug, Clone)]
pub struct TemplateSource {
    /// The template text.
    pub source: String,
    /// The canonical name to compile under.
    pub name: String,
}

/// Trait for resolving template names to sources.
pub trait TemplateLoader: Send + Sync {
    /// Load a template by name.
    ///
    /// # Returns
    /// The template source, `Ok(None)` when the name does not resolve,
    /// or an error when loading itself failed.
    fn load(&self, name: &str) -> TemplateResult<Option<TemplateSource>>;
}

/// Loader reading templates from a root directory.
///
/// Template names are relative paths below the root; absolute names and
/// `..` segments are rejected. A name without an extension gets the
/// loader's default extension, when one is configured.
#[derive(Debug, Clone)]
pub struct FileSystemLoader {
    root: PathBuf,
    default_extension: Option<String>,
}

impl FileSystemLoader {
    /// A loader rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileSystemLoader {
            root: root.into(),
            default_extension: None,
        }
    }

    /// Use `extension` (without the dot) for names that carry none.
    pub fn with_default_extension(mut self, extension: impl Into<String>) -> Self {
        self.default_extension = Some(extension.into());
        self
    }
}

impl TemplateLoader for FileSystemLoader {
    fn load(&self, name: &str) -> TemplateResult<Option<TemplateSource>> {
        let relative = Path::new(name);
        let escapes_root = relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
        if relative.is_absolute() || escapes_root {
            return Err(Error::new(ErrorKind::InvalidTemplateName).with_extra(name));
        }

        let mut path = self.root.join(relative);
        if path.extension().is_none() {
            if let Some(extension) = &self.default_extension {
                path.set_extension(extension);
            }
        }

        trace!(path = %path.display(), "loading template from filesystem");
        match std::fs::read_to_string(&path) {
            Ok(source) => Ok(Some(TemplateSource {
                source,
                name: name.to_string(),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::new(ErrorKind::Loader)
                .with_extra(name)
                .with_extra(e.to_string())),
        }
    }
}

/// Loader that returns nothing (for rendering without sub-templates).
#[derive(Debug, Clone, Default)]
pub struct NullLoader;

impl TemplateLoader for NullLoader {
    fn load(&self, _name: &str) -> TemplateResult<Option<TemplateSource>> {
        Ok(None)
    }
}

/// Loader serving templates from an in-memory map.
///
/// Useful for testing and for bundling templates into the application.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    templates: HashMap<String, String>,
}

impl MemoryLoader {
    /// An empty memory loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template under `name`.
    pub fn add(&mut self, name: impl Into<String>, source: impl Into<String>) -> &mut Self {
        self.templates.insert(name.into(), source.into());
        self
    }

    /// A loader with the given templates.
    pub fn with_templates(
        templates: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        let mut loader = Self::new();
        for (name, source) in templates {
            loader.add(name, source);
        }
        loader
    }

    /// Wrap into the `Arc` form the environment expects.
    pub fn into_arc(self) -> Arc<dyn TemplateLoader> {
        Arc::new(self)
    }
}

impl TemplateLoader for MemoryLoader {
    fn load(&self, name: &str) -> TemplateResult<Option<TemplateSource>> {
        Ok(self.templates.get(name).map(|source| TemplateSource {
            source: source.clone(),
            name: name.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_loader() {
        assert!(NullLoader.load("anything").unwrap().is_none());
    }

    #[test]
    fn test_memory_loader() {
        let mut loader = MemoryLoader::new();
        loader.add("header", "<h1>Title</h1>");
        loader.add("footer", "<footer>End</footer>");

        assert_eq!(
            loader.load("header").unwrap().unwrap().source,
            "<h1>Title</h1>"
        );
        assert_eq!(
            loader.load("footer").unwrap().unwrap().source,
            "<footer>End</footer>"
        );
        assert!(loader.load("missing").unwrap().is_none());
    }

    #[test]
    fn test_memory_loader_with_templates() {
        let loader = MemoryLoader::with_templates([("a", "content a"), ("b", "content b")]);
        assert_eq!(loader.load("a").unwrap().unwrap().source, "content a");
        assert_eq!(loader.load("b").unwrap().unwrap().source, "content b");
    }

    #[test]
    fn test_fs_loader_rejects_escaping_names() {
        let loader = FileSystemLoader::new("/templates");
        assert_eq!(
            loader.load("../secrets").unwrap_err().kind,
            ErrorKind::InvalidTemplateName
        );
        assert_eq!(
            loader.load("/etc/passwd").unwrap_err().kind,
            ErrorKind::InvalidTemplateName
        );
    }

    #[test]
    fn test_fs_loader_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page.html"), "<p>hi</p>").unwrap();
        std::fs::create_dir(dir.path().join("inc")).unwrap();
        std::fs::write(dir.path().join("inc/part.html"), "part").unwrap();

        let loader = FileSystemLoader::new(dir.path());
        assert_eq!(
            loader.load("page.html").unwrap().unwrap().source,
            "<p>hi</p>"
        );
        assert_eq!(
            loader.load("inc/part.html").unwrap().unwrap().source,
            "part"
        );
        assert!(loader.load("absent.html").unwrap().is_none());
    }

    #[test]
    fn test_fs_loader_default_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page.html"), "content").unwrap();

        let loader = FileSystemLoader::new(dir.path()).with_default_extension("html");
        assert_eq!(loader.load("page").unwrap().unwrap().source, "content");
        // An explicit extension is used as-is.
        assert_eq!(
            loader.load("page.html").unwrap().unwrap().source,
            "content"
        );
    }
}

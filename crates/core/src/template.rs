//! HTML document templates.
//!
//! A template is a complete HTML document with named slots (class and id
//! markers) that the composer fills in. Templates are parsed once and every
//! article works on its own clone.
//!
//! # Slots
//!
//! | Slot | Filled with |
//! |------|-------------|
//! | `<title>` | article title |
//! | `.quire_title` | article title (text) |
//! | `.quire_original_url` / `.quire_original_link` | original URL |
//! | `.quire_source` | source attribution HTML |
//! | `.quire_source_info` | removed when the article has no source URL |
//! | `.quire_source_url` / `.quire_source_link` / `.quire_source_name` | source viewer link |
//! | `.quire_hn_info` / `.quire_hn_infos` | single / multiple discussion links |
//! | `#quire_footnotes_section` / `#quire_footnotes` | footnote list |
//! | `#quire_contents` | article body (required) |

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;

use crate::dom_tree::DomTree;
use crate::fetch::fetch_file;
use crate::parse::parse_document;
use crate::Result;

/// Source of the built-in template.
pub const DEFAULT_TEMPLATE: &str = include_str!("../templates/default.html");

/// A parsed template document.
#[derive(Debug, Clone)]
pub struct Template {
    doc: DomTree,
}

impl Template {
    pub fn parse(html: &str) -> Self {
        Self { doc: parse_document(html) }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::parse(&fetch_file(path)?))
    }

    pub fn builtin() -> Self {
        Self::parse(DEFAULT_TEMPLATE)
    }

    /// A fresh, independent copy of the template document.
    pub fn document(&self) -> DomTree {
        self.doc.clone()
    }
}

/// Loads each template file at most once.
///
/// Paths are canonicalized, so different spellings of the same file share
/// one entry.
pub struct TemplateStore {
    builtin: Arc<Template>,
    loaded: DashMap<PathBuf, Arc<Template>>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self { builtin: Arc::new(Template::builtin()), loaded: DashMap::new() }
    }

    /// Uses `template` wherever no file is named.
    pub fn with_default(template: Template) -> Self {
        Self { builtin: Arc::new(template), loaded: DashMap::new() }
    }

    pub fn default_template(&self) -> Arc<Template> {
        Arc::clone(&self.builtin)
    }

    /// Template at `path`, or the default template for `None`.
    pub fn get(&self, path: Option<&Path>) -> Result<Arc<Template>> {
        let Some(path) = path else {
            return Ok(self.default_template());
        };
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if let Some(found) = self.loaded.get(&key) {
            return Ok(Arc::clone(found.value()));
        }

        let entry = self.loaded.entry(key).or_try_insert_with(|| {
            tracing::trace!(path = %path.display(), "Loaded template");
            Template::from_file(path).map(Arc::new)
        })?;
        Ok(Arc::clone(entry.value()))
    }
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QuireError;
    use std::fs;

    #[test]
    fn test_builtin_has_required_slots() {
        let doc = Template::builtin().document();
        assert!(doc.element_by_id("quire_contents").is_some());
        assert!(doc.element_by_id("quire_footnotes").is_some());
        assert!(doc.element_by_id("quire_footnotes_section").is_some());
        assert_eq!(doc.elements_by_class("quire_title").len(), 1);
    }

    #[test]
    fn test_documents_are_independent() {
        let template = Template::parse("<html><body><div id=\"quire_contents\"></div></body></html>");
        let mut first = template.document();
        let slot = first.element_by_id("quire_contents").unwrap();
        first.append_text(slot, "changed");

        let second = template.document();
        let slot = second.element_by_id("quire_contents").unwrap();
        assert_eq!(second.text(slot), "");
    }

    #[test]
    fn test_store_loads_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.html");
        fs::write(&path, "<html><body><p id=\"v\">one</p></body></html>").unwrap();

        let store = TemplateStore::new();
        let first = store.get(Some(&path)).unwrap();
        fs::write(&path, "<html><body><p id=\"v\">two</p></body></html>").unwrap();
        let second = store.get(Some(&path)).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        let doc = second.document();
        assert_eq!(doc.text(doc.element_by_id("v").unwrap()), "one");
    }

    #[test]
    fn test_store_default_and_missing() {
        let store = TemplateStore::new();
        assert!(Arc::ptr_eq(&store.get(None).unwrap(), &store.default_template()));

        let result = store.get(Some(Path::new("/nonexistent/template.html")));
        assert!(matches!(result, Err(QuireError::FileNotFound(_))));
    }
}

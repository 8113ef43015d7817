//! Format-specific backends and their registry

mod text;

use std::collections::HashMap;
use std::path::Path;

use bitflags::bitflags;
use log::debug;

pub use text::PlainTextGenerator;

use crate::document::{GeneratorFault, PageSize, PixmapRequest, Pixmap, TextPage, Viewport};

bitflags! {
    /// What the document's owner allows readers to do with it
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Permissions: u32 {
        const MODIFY = 1;
        const COPY = 1 << 1;
        const PRINT = 1 << 2;
        const NOTES = 1 << 3;
    }
}

/// Backend producing pixmaps, text and metadata for one document format.
///
/// Generators are shared with dispatcher worker threads, so every method
/// except `load_document` takes `&self`.
pub trait Generator: Send + Sync {
    /// Load the document and return the size of every page
    fn load_document(&mut self, path: &Path) -> Result<Vec<PageSize>, GeneratorFault>;

    fn render_pixmap(&self, request: &PixmapRequest) -> Result<Pixmap, GeneratorFault>;

    /// Text layer of a page, None when the format has no text
    fn extract_text(&self, page: usize) -> Option<TextPage>;

    fn synopsis(&self) -> Option<Synopsis> {
        None
    }

    fn document_info(&self) -> DocumentInfo {
        DocumentInfo::default()
    }

    /// Resolve a named destination used by synopsis entries
    fn named_viewport(&self, _name: &str) -> Option<Viewport> {
        None
    }

    fn supports_searching(&self) -> bool {
        false
    }

    fn supports_rotation(&self) -> bool {
        false
    }

    fn supports_paper_sizes(&self) -> bool {
        false
    }

    fn paper_sizes(&self) -> Vec<String> {
        Vec::new()
    }

    fn permissions(&self) -> Permissions {
        Permissions::all()
    }

    /// Whether every page's text can be written out as plain text
    fn can_export_to_text(&self) -> bool {
        false
    }

    /// Whether pixmaps may be rendered off the owner thread
    fn can_render_async(&self) -> bool {
        true
    }

    fn config(&self) -> Option<&dyn ConfigInterface> {
        None
    }
}

/// Receives configuration pages contributed by a generator
pub trait ConfigDialog {
    fn add_page(&mut self, name: &str, header: &str);
}

/// Generator-side configuration control
pub trait ConfigInterface: Send + Sync {
    /// Re-read configuration; true if something changed
    fn reparse_config(&self) -> bool;

    fn add_pages(&self, dialog: &mut dyn ConfigDialog);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InfoEntry {
    pub key: String,
    pub value: String,
    /// Human readable label
    pub title: String,
}

/// Ordered key/value metadata about the open document
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentInfo {
    entries: Vec<InfoEntry>,
}

impl DocumentInfo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing any existing entry with the same key
    pub fn set(&mut self, key: &str, value: impl Into<String>, title: &str) {
        let value = value.into();
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => {
                entry.value = value;
                if !title.is_empty() {
                    entry.title = title.to_string();
                }
            }
            None => self.entries.push(InfoEntry {
                key: key.to_string(),
                value,
                title: if title.is_empty() {
                    key.to_string()
                } else {
                    title.to_string()
                },
            }),
        }
    }

    /// Value for a key, empty when missing
    #[must_use]
    pub fn get(&self, key: &str) -> &str {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map_or("", |e| e.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &InfoEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A table of contents entry
#[derive(Clone, Debug, PartialEq, Default)]
pub struct SynopsisEntry {
    pub title: String,
    pub viewport: Option<Viewport>,
    /// Named destination to resolve through the generator
    pub viewport_name: Option<String>,
    pub children: Vec<SynopsisEntry>,
}

impl SynopsisEntry {
    pub fn new(title: impl Into<String>, viewport: Option<Viewport>) -> Self {
        Self {
            title: title.into(),
            viewport,
            viewport_name: None,
            children: Vec::new(),
        }
    }
}

/// Table of contents tree
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Synopsis {
    pub entries: Vec<SynopsisEntry>,
}

impl Synopsis {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Depth-first walk yielding each entry with its nesting level
    pub fn walk(&self) -> Vec<(usize, &SynopsisEntry)> {
        fn visit<'a>(entries: &'a [SynopsisEntry], level: usize, out: &mut Vec<(usize, &'a SynopsisEntry)>) {
            for entry in entries {
                out.push((level, entry));
                visit(&entry.children, level + 1, out);
            }
        }
        let mut out = Vec::new();
        visit(&self.entries, 0, &mut out);
        out
    }

    /// Fill in `viewport` for entries that only carry a name
    pub(crate) fn resolve_named(&mut self, resolve: &dyn Fn(&str) -> Option<Viewport>) {
        fn visit(entries: &mut [SynopsisEntry], resolve: &dyn Fn(&str) -> Option<Viewport>) {
            for entry in entries {
                if entry.viewport.is_none() {
                    if let Some(name) = &entry.viewport_name {
                        entry.viewport = resolve(name);
                    }
                }
                visit(&mut entry.children, resolve);
            }
        }
        visit(&mut self.entries, resolve);
    }
}

pub type GeneratorFactory = Box<dyn Fn() -> Box<dyn Generator>>;

/// Generators selectable by mime type or file extension
#[derive(Default)]
pub struct GeneratorRegistry {
    by_mime: HashMap<String, GeneratorFactory>,
    by_extension: HashMap<String, String>,
}

impl GeneratorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the generators bundled in this crate
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(
            PlainTextGenerator::MIME,
            &PlainTextGenerator::EXTENSIONS,
            || -> Box<dyn Generator> { Box::new(PlainTextGenerator::new()) },
        );
        registry
    }

    pub fn register(
        &mut self,
        mime: &str,
        extensions: &[&str],
        factory: impl Fn() -> Box<dyn Generator> + 'static,
    ) {
        self.by_mime.insert(mime.to_string(), Box::new(factory));
        for ext in extensions {
            self.by_extension
                .insert(ext.to_ascii_lowercase(), mime.to_string());
        }
    }

    #[must_use]
    pub fn supports(&self, mime: &str) -> bool {
        self.by_mime.contains_key(mime)
    }

    /// Mime type for a path, from the hint or the file extension
    #[must_use]
    pub fn resolve_mime(&self, path: &Path, mime_hint: Option<&str>) -> Option<String> {
        if let Some(hint) = mime_hint.filter(|h| self.supports(h)) {
            return Some(hint.to_string());
        }
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.by_extension.get(&ext).cloned()
    }

    /// Instantiate the generator for a mime type
    #[must_use]
    pub fn create(&self, mime: &str) -> Option<Box<dyn Generator>> {
        let factory = self.by_mime.get(mime)?;
        debug!("Creating generator for {mime}");
        Some(factory())
    }
}

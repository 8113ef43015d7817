//! Per-page state owned by the document

use std::collections::HashMap;

use super::request::ObserverId;
use super::search::SearchId;
use super::text::TextPage;
use super::types::{Color, NormalizedRect, PageSize, Pixmap, Rotation};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnnotationId(pub u64);

#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    /// Assigned by the document when the annotation is added
    pub id: AnnotationId,
    pub author: String,
    pub contents: String,
    pub boundary: NormalizedRect,
}

impl Annotation {
    pub fn new(author: impl Into<String>, contents: impl Into<String>, boundary: NormalizedRect) -> Self {
        Self {
            id: AnnotationId(0),
            author: author.into(),
            contents: contents.into(),
            boundary,
        }
    }
}

/// Search match highlight
#[derive(Clone, Debug, PartialEq)]
pub struct Highlight {
    pub search_id: SearchId,
    pub color: Color,
    pub area: NormalizedRect,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextSelection {
    pub area: NormalizedRect,
    pub color: Color,
}

/// A page of the open document.
///
/// Observers only get shared references; every mutation goes through
/// [`Document`](super::Document).
#[derive(Debug)]
pub struct Page {
    number: usize,
    size: PageSize,
    rotation: Rotation,
    pixmaps: HashMap<ObserverId, Pixmap>,
    text: Option<TextPage>,
    annotations: Vec<Annotation>,
    highlights: Vec<Highlight>,
    text_selection: Option<TextSelection>,
    bookmarked: bool,
}

impl Page {
    pub(crate) fn new(number: usize, size: PageSize) -> Self {
        Self {
            number,
            size,
            rotation: Rotation::None,
            pixmaps: HashMap::new(),
            text: None,
            annotations: Vec::new(),
            highlights: Vec::new(),
            text_selection: None,
            bookmarked: false,
        }
    }

    #[must_use]
    pub fn number(&self) -> usize {
        self.number
    }

    /// Page size with the current rotation applied
    #[must_use]
    pub fn size(&self) -> PageSize {
        if self.rotation.swaps_axes() {
            PageSize::new(self.size.height, self.size.width)
        } else {
            self.size
        }
    }

    #[must_use]
    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    #[must_use]
    pub fn pixmap(&self, observer: ObserverId) -> Option<&Pixmap> {
        self.pixmaps.get(&observer)
    }

    /// True if `observer` has a pixmap of exactly this size
    #[must_use]
    pub fn has_pixmap(&self, observer: ObserverId, width: u32, height: u32) -> bool {
        self.pixmaps
            .get(&observer)
            .is_some_and(|p| p.width() == width && p.height() == height)
    }

    #[must_use]
    pub fn text_page(&self) -> Option<&TextPage> {
        self.text.as_ref()
    }

    #[must_use]
    pub fn has_text_page(&self) -> bool {
        self.text.is_some()
    }

    #[must_use]
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    #[must_use]
    pub fn highlights(&self) -> &[Highlight] {
        &self.highlights
    }

    #[must_use]
    pub fn has_highlights(&self, search_id: SearchId) -> bool {
        self.highlights.iter().any(|h| h.search_id == search_id)
    }

    #[must_use]
    pub fn text_selection(&self) -> Option<&TextSelection> {
        self.text_selection.as_ref()
    }

    #[must_use]
    pub fn is_bookmarked(&self) -> bool {
        self.bookmarked
    }

    pub(crate) fn set_pixmap(&mut self, observer: ObserverId, pixmap: Pixmap) -> Option<Pixmap> {
        self.pixmaps.insert(observer, pixmap)
    }

    pub(crate) fn delete_pixmap(&mut self, observer: ObserverId) -> Option<Pixmap> {
        self.pixmaps.remove(&observer)
    }

    pub(crate) fn delete_pixmaps(&mut self) {
        self.pixmaps.clear();
    }

    pub(crate) fn set_text_page(&mut self, text: TextPage) {
        self.text = Some(text.rotated(self.rotation));
    }

    pub(crate) fn set_rotation(&mut self, rotation: Rotation) {
        if self.rotation == rotation {
            return;
        }
        // Areas are stored for the current rotation; undo it before applying the new one
        let undo = Rotation::from_degrees(-self.rotation.degrees());
        let turn = |area: NormalizedRect| area.rotated(undo).rotated(rotation);

        if let Some(text) = &self.text {
            self.text = Some(text.rotated(undo).rotated(rotation));
        }
        for annotation in &mut self.annotations {
            annotation.boundary = turn(annotation.boundary);
        }
        for highlight in &mut self.highlights {
            highlight.area = turn(highlight.area);
        }
        if let Some(selection) = &mut self.text_selection {
            selection.area = turn(selection.area);
        }
        self.pixmaps.clear();
        self.rotation = rotation;
    }

    pub(crate) fn add_annotation(&mut self, annotation: Annotation) {
        self.annotations.push(annotation);
    }

    /// Replace the annotation with the same id; false if there is none
    pub(crate) fn modify_annotation(&mut self, annotation: Annotation) -> bool {
        match self.annotations.iter_mut().find(|a| a.id == annotation.id) {
            Some(existing) => {
                *existing = annotation;
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove_annotation(&mut self, id: AnnotationId) -> bool {
        let before = self.annotations.len();
        self.annotations.retain(|a| a.id != id);
        self.annotations.len() != before
    }

    pub(crate) fn add_highlight(&mut self, highlight: Highlight) {
        self.highlights.push(highlight);
    }

    /// Drop highlights of one search; true if any were removed
    pub(crate) fn clear_highlights(&mut self, search_id: SearchId) -> bool {
        let before = self.highlights.len();
        self.highlights.retain(|h| h.search_id != search_id);
        self.highlights.len() != before
    }

    pub(crate) fn set_text_selection(&mut self, selection: Option<TextSelection>) -> bool {
        if self.text_selection == selection {
            return false;
        }
        self.text_selection = selection;
        true
    }

    pub(crate) fn set_bookmarked(&mut self, bookmarked: bool) -> bool {
        let changed = self.bookmarked != bookmarked;
        self.bookmarked = bookmarked;
        changed
    }
}

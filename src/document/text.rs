//! Page text layer and matching

use regex::{Regex, RegexBuilder};

use super::types::{NormalizedRect, Rotation};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CaseSensitivity {
    #[default]
    Insensitive,
    Sensitive,
}

/// Piece of text with its location on the page.
///
/// Entities are concatenated as-is to form the page text, so generators
/// include separating whitespace in the entity text.
#[derive(Clone, Debug, PartialEq)]
pub struct TextEntity {
    pub text: String,
    pub area: NormalizedRect,
}

impl TextEntity {
    pub fn new(text: impl Into<String>, area: NormalizedRect) -> Self {
        Self {
            text: text.into(),
            area,
        }
    }
}

/// A match inside a page's text, in byte offsets of [`TextPage::text`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextMatch {
    pub start: usize,
    pub end: usize,
    pub area: NormalizedRect,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextPage {
    entities: Vec<TextEntity>,
    text: String,
    /// Byte offset of each entity in `text`
    offsets: Vec<usize>,
}

impl TextPage {
    #[must_use]
    pub fn new(entities: Vec<TextEntity>) -> Self {
        let mut text = String::new();
        let mut offsets = Vec::with_capacity(entities.len());
        for entity in &entities {
            offsets.push(text.len());
            text.push_str(&entity.text);
        }
        Self {
            entities,
            text,
            offsets,
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn entities(&self) -> &[TextEntity] {
        &self.entities
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Same text with every entity area rotated
    #[must_use]
    pub fn rotated(&self, rotation: Rotation) -> Self {
        let entities = self
            .entities
            .iter()
            .map(|e| TextEntity::new(e.text.clone(), e.area.rotated(rotation)))
            .collect();
        Self::new(entities)
    }

    /// Union of the areas of entities overlapping the byte range
    #[must_use]
    pub fn area_of(&self, start: usize, end: usize) -> NormalizedRect {
        let mut area: Option<NormalizedRect> = None;
        for (entity, &offset) in self.entities.iter().zip(&self.offsets) {
            let entity_end = offset + entity.text.len();
            if offset < end && entity_end > start {
                area = Some(match area {
                    Some(a) => a.union(&entity.area),
                    None => entity.area,
                });
            }
        }
        area.unwrap_or_default()
    }

    fn to_match(&self, m: regex::Match<'_>) -> TextMatch {
        TextMatch {
            start: m.start(),
            end: m.end(),
            area: self.area_of(m.start(), m.end()),
        }
    }
}

/// Compiled literal matcher reused across pages
#[derive(Clone, Debug)]
pub struct TextMatcher {
    regex: Regex,
}

impl TextMatcher {
    /// Literal matcher for `needle`; None for an empty needle
    #[must_use]
    pub fn new(needle: &str, case: CaseSensitivity) -> Option<Self> {
        if needle.is_empty() {
            return None;
        }
        let regex = RegexBuilder::new(&regex::escape(needle))
            .case_insensitive(case == CaseSensitivity::Insensitive)
            .build()
            .ok()?;
        Some(Self { regex })
    }

    /// First match starting at or after byte offset `from`
    #[must_use]
    pub fn find_next(&self, page: &TextPage, from: usize) -> Option<TextMatch> {
        let from = clamp_to_boundary(page.text(), from)?;
        self.regex
            .find_at(page.text(), from)
            .map(|m| page.to_match(m))
    }

    /// Last match ending at or before byte offset `before`
    #[must_use]
    pub fn find_prev(&self, page: &TextPage, before: usize) -> Option<TextMatch> {
        self.regex
            .find_iter(page.text())
            .take_while(|m| m.end() <= before)
            .last()
            .map(|m| page.to_match(m))
    }

    #[must_use]
    pub fn find_all(&self, page: &TextPage) -> Vec<TextMatch> {
        self.regex
            .find_iter(page.text())
            .map(|m| page.to_match(m))
            .collect()
    }

    #[must_use]
    pub fn is_match(&self, page: &TextPage) -> bool {
        self.regex.is_match(page.text())
    }
}

fn clamp_to_boundary(text: &str, mut offset: usize) -> Option<usize> {
    if offset > text.len() {
        return None;
    }
    while !text.is_char_boundary(offset) {
        offset += 1;
    }
    Some(offset)
}

//! Plain text generator
//!
//! Paginates a text file on form feeds and every `lines_per_page` lines.
//! Pixmaps are placeholders: a white page with one gray box per word.
//! Markdown-style `#` headings become synopsis entries.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use image::Rgba;
use log::{debug, info};

use super::{ConfigDialog, ConfigInterface, DocumentInfo, Generator, Synopsis, SynopsisEntry};
use crate::document::{
    GeneratorFault, NormalizedRect, PageSize, Pixmap, PixmapRequest, TextEntity, TextPage,
    Viewport,
};
use crate::settings;

/// US Letter in points
const PAGE_SIZE: PageSize = PageSize::new(612.0, 792.0);
const MARGIN: f64 = 0.08;
/// Columns of the virtual monospace grid words are laid out on
const COLUMNS: usize = 80;
const WORD_BOX: Rgba<u8> = Rgba([0xC8, 0xC8, 0xC8, 0xFF]);
const PAPER: Rgba<u8> = Rgba([0xFF, 0xFF, 0xFF, 0xFF]);

struct Heading {
    level: usize,
    title: String,
    page: usize,
    y: f64,
}

struct TextConfig {
    word_boxes: AtomicBool,
}

impl ConfigInterface for TextConfig {
    fn reparse_config(&self) -> bool {
        let word_boxes = settings::get_text_word_boxes();
        self.word_boxes.swap(word_boxes, Ordering::Relaxed) != word_boxes
    }

    fn add_pages(&self, dialog: &mut dyn ConfigDialog) {
        dialog.add_page("text", "Plain Text Backend Configuration");
    }
}

pub struct PlainTextGenerator {
    lines_per_page: usize,
    pages: Vec<Vec<String>>,
    headings: Vec<Heading>,
    title: Option<String>,
    config: TextConfig,
}

impl Default for PlainTextGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl PlainTextGenerator {
    pub const MIME: &'static str = "text/plain";
    pub const EXTENSIONS: [&'static str; 3] = ["txt", "text", "md"];

    #[must_use]
    pub fn new() -> Self {
        Self::with_lines_per_page(settings::get_text_lines_per_page())
    }

    #[must_use]
    pub fn with_lines_per_page(lines_per_page: usize) -> Self {
        Self {
            lines_per_page: lines_per_page.max(1),
            pages: Vec::new(),
            headings: Vec::new(),
            title: None,
            config: TextConfig {
                word_boxes: AtomicBool::new(settings::get_text_word_boxes()),
            },
        }
    }

    /// Split raw text into pages and collect headings
    fn paginate(&mut self, content: &str) {
        self.pages.clear();
        self.headings.clear();
        self.title = None;
        if content.trim().is_empty() {
            return;
        }

        for section in content.split('\x0c') {
            let lines: Vec<String> = section.lines().map(str::to_string).collect();
            if lines.is_empty() {
                self.pages.push(Vec::new());
                continue;
            }
            for chunk in lines.chunks(self.lines_per_page) {
                self.pages.push(chunk.to_vec());
            }
        }
        if content.ends_with('\x0c') {
            self.pages.pop();
        }

        for (page, lines) in self.pages.iter().enumerate() {
            for (row, line) in lines.iter().enumerate() {
                let trimmed = line.trim_start();
                let level = trimmed.chars().take_while(|c| *c == '#').count();
                if level == 0 || !trimmed[level..].starts_with(' ') {
                    continue;
                }
                let (top, bottom) = self.row_bounds(row);
                self.headings.push(Heading {
                    level,
                    title: trimmed[level..].trim().to_string(),
                    page,
                    y: (top + bottom) / 2.0,
                });
            }
        }

        self.title = self
            .headings
            .first()
            .map(|h| h.title.clone())
            .or_else(|| {
                content
                    .lines()
                    .map(str::trim)
                    .find(|l| !l.is_empty())
                    .map(str::to_string)
            });
    }

    fn row_bounds(&self, row: usize) -> (f64, f64) {
        let line_height = (1.0 - 2.0 * MARGIN) / self.lines_per_page as f64;
        let top = MARGIN + row as f64 * line_height;
        (top, top + line_height)
    }

    fn column_x(column: usize) -> f64 {
        MARGIN + (1.0 - 2.0 * MARGIN) * (column.min(COLUMNS) as f64 / COLUMNS as f64)
    }

    fn layout_page(&self, page: usize) -> Option<Vec<TextEntity>> {
        let lines = self.pages.get(page)?;
        let mut entities = Vec::new();
        for (row, line) in lines.iter().enumerate() {
            let (top, bottom) = self.row_bounds(row);
            let mut column = 0;
            for piece in line.split_inclusive(char::is_whitespace) {
                let width = piece.chars().count();
                let word_width = piece.trim_end().chars().count().max(1);
                entities.push(TextEntity::new(
                    piece,
                    NormalizedRect::new(
                        Self::column_x(column),
                        top,
                        Self::column_x(column + word_width),
                        bottom,
                    ),
                ));
                column += width;
            }
            // Line break so words on adjacent lines do not run together
            entities.push(TextEntity::new(
                "\n",
                NormalizedRect::new(Self::column_x(column), top, Self::column_x(column), bottom),
            ));
        }
        Some(entities)
    }

    fn heading_slug(title: &str) -> String {
        title
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join("-")
    }

    fn heading_viewport(heading: &Heading) -> Viewport {
        Viewport::centered_at(heading.page as i32, 0.5, heading.y)
    }
}

impl Generator for PlainTextGenerator {
    fn load_document(&mut self, path: &Path) -> Result<Vec<PageSize>, GeneratorFault> {
        let content = fs::read_to_string(path)?;
        self.paginate(&content);
        info!(
            "Loaded {} as {} text pages ({} headings)",
            path.display(),
            self.pages.len(),
            self.headings.len()
        );
        Ok(vec![PAGE_SIZE; self.pages.len()])
    }

    fn render_pixmap(&self, request: &PixmapRequest) -> Result<Pixmap, GeneratorFault> {
        if request.width == 0 || request.height == 0 {
            return Err(GeneratorFault::generic(format!(
                "cannot render page {} at {}x{}",
                request.page, request.width, request.height
            )));
        }
        let entities = self
            .layout_page(request.page)
            .ok_or(GeneratorFault::PageOutOfRange(request.page))?;

        let mut pixmap = Pixmap::from_pixel(request.width, request.height, PAPER);
        if self.config.word_boxes.load(Ordering::Relaxed) {
            let (w, h) = (f64::from(request.width), f64::from(request.height));
            for entity in entities.iter().filter(|e| !e.text.trim().is_empty()) {
                let area = entity.area;
                let x0 = (area.left * w) as u32;
                let x1 = ((area.right * w) as u32).min(request.width);
                // Leave a gap between lines
                let y0 = ((area.top + (area.bottom - area.top) * 0.2) * h) as u32;
                let y1 = ((area.bottom * h) as u32).min(request.height);
                for y in y0..y1 {
                    for x in x0..x1 {
                        pixmap.put_pixel(x, y, WORD_BOX);
                    }
                }
            }
        }
        debug!(
            "Rendered text page {} at {}x{}",
            request.page, request.width, request.height
        );
        Ok(pixmap)
    }

    fn extract_text(&self, page: usize) -> Option<TextPage> {
        self.layout_page(page).map(TextPage::new)
    }

    fn synopsis(&self) -> Option<Synopsis> {
        if self.headings.is_empty() {
            return None;
        }

        // Stack of (level, path of indices into the tree)
        let mut synopsis = Synopsis::default();
        let mut stack: Vec<(usize, Vec<usize>)> = Vec::new();
        for heading in &self.headings {
            while stack.last().is_some_and(|(level, _)| *level >= heading.level) {
                stack.pop();
            }
            let entry = SynopsisEntry::new(heading.title.clone(), Some(Self::heading_viewport(heading)));

            let mut siblings = &mut synopsis.entries;
            let mut path = Vec::new();
            if let Some((_, parent)) = stack.last() {
                for &i in parent {
                    siblings = &mut siblings[i].children;
                }
                path.clone_from(parent);
            }
            path.push(siblings.len());
            siblings.push(entry);
            stack.push((heading.level, path));
        }
        Some(synopsis)
    }

    fn document_info(&self) -> DocumentInfo {
        let mut info = DocumentInfo::new();
        if let Some(title) = &self.title {
            info.set("title", title.clone(), "Title");
        }
        info.set("mimeType", Self::MIME, "Mime Type");
        info.set("pages", self.pages.len().to_string(), "Pages");
        let words: usize = self
            .pages
            .iter()
            .flatten()
            .map(|l| l.split_whitespace().count())
            .sum();
        info.set("words", words.to_string(), "Words");
        info
    }

    fn named_viewport(&self, name: &str) -> Option<Viewport> {
        self.headings
            .iter()
            .find(|h| Self::heading_slug(&h.title) == name)
            .map(Self::heading_viewport)
    }

    fn supports_searching(&self) -> bool {
        true
    }

    fn can_export_to_text(&self) -> bool {
        true
    }

    fn supports_rotation(&self) -> bool {
        true
    }

    fn config(&self) -> Option<&dyn ConfigInterface> {
        Some(&self.config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::document::ObserverId;

    fn load(content: &str, lines_per_page: usize) -> PlainTextGenerator {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(content.as_bytes()).expect("write");
        let mut generator = PlainTextGenerator::with_lines_per_page(lines_per_page);
        generator.load_document(file.path()).expect("loads");
        generator
    }

    #[test]
    fn paginates_on_line_count_and_form_feed() {
        let generator = load("a\nb\nc\n\x0cd\n", 2);
        assert_eq!(generator.pages.len(), 3);
        assert_eq!(generator.pages[2], vec!["d".to_string()]);
    }

    #[test]
    fn blank_file_has_no_pages() {
        let generator = load("  \n\n", 10);
        assert!(generator.pages.is_empty());
        assert!(generator.synopsis().is_none());
    }

    #[test]
    fn missing_file_is_io_error() {
        let mut generator = PlainTextGenerator::with_lines_per_page(10);
        let err = generator
            .load_document(Path::new("/definitely/not/here.txt"))
            .expect_err("missing");
        assert!(matches!(err, GeneratorFault::Io(_)));
    }

    #[test]
    fn text_layer_preserves_words_and_lines() {
        let generator = load("hello world\nsecond line\n", 10);
        let text = generator.extract_text(0).expect("text");
        assert_eq!(text.text(), "hello world\nsecond line\n");
        assert!(generator.extract_text(1).is_none());
    }

    #[test]
    fn synopsis_nests_headings() {
        let generator = load("# Intro\ntext\n## Detail\n# Outro\n", 2);
        let synopsis = generator.synopsis().expect("synopsis");
        assert_eq!(synopsis.entries.len(), 2);
        assert_eq!(synopsis.entries[0].children[0].title, "Detail");
        assert_eq!(
            synopsis.entries[1].viewport.map(|v| v.page_number),
            Some(1)
        );
        assert_eq!(
            generator.named_viewport("outro").map(|v| v.page_number),
            Some(1)
        );
    }

    #[test]
    fn renders_requested_size() {
        let generator = load("word\n", 10);
        let request = PixmapRequest::new(ObserverId::new(1), 0, 40, 60);
        let pixmap = generator.render_pixmap(&request).expect("renders");
        assert_eq!(pixmap.dimensions(), (40, 60));

        let out_of_range = PixmapRequest::new(ObserverId::new(1), 5, 40, 60);
        assert!(matches!(
            generator.render_pixmap(&out_of_range),
            Err(GeneratorFault::PageOutOfRange(5))
        ));
    }

    #[test]
    fn info_reports_title_and_counts() {
        let generator = load("# Title Here\none two\n", 10);
        let info = generator.document_info();
        assert_eq!(info.get("title"), "Title Here");
        assert_eq!(info.get("pages"), "1");
        assert_eq!(info.get("mimeType"), "text/plain");
    }
}

//! Text search with one independent cursor per search id

use std::collections::BTreeSet;

use super::page::{Highlight, Page};
use super::text::{CaseSensitivity, TextMatch, TextMatcher, TextPage};
use super::types::{Color, NormalizedRect};

/// Identifies who owns a search, each id has its own cursor and highlights
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SearchId {
    /// Find bar of the hosting application
    Part,
    /// Incremental search typed into a page view
    PageView,
    /// Search side panel
    SearchWidget,
    Custom(u32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchType {
    NextMatch,
    PrevMatch,
    /// Highlight every occurrence in the document
    AllDoc,
    /// Pages containing all of the words
    GoogleAll,
    /// Pages containing any of the words
    GoogleAny,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Cursor {
    Fresh,
    Match { page: usize, start: usize, end: usize },
    /// The last scan ran off the end of the document
    ParkedAtEnd,
    /// The last scan ran off the start of the document
    ParkedAtStart,
}

/// Stored parameters of the last search on an id
#[derive(Clone, Debug)]
pub(crate) struct RunningSearch {
    pub text: String,
    pub case: CaseSensitivity,
    pub search_type: SearchType,
    pub move_viewport: bool,
    pub color: Color,
    pub cursor: Cursor,
    /// Pages currently carrying highlights of this search
    pub highlighted: BTreeSet<usize>,
}

impl RunningSearch {
    pub fn new(
        text: &str,
        case: CaseSensitivity,
        search_type: SearchType,
        move_viewport: bool,
        color: Color,
    ) -> Self {
        Self {
            text: text.to_string(),
            case,
            search_type,
            move_viewport,
            color,
            cursor: Cursor::Fresh,
            highlighted: BTreeSet::new(),
        }
    }

    /// Whether a new query can continue from this search's cursor
    pub fn same_query(&self, text: &str, case: CaseSensitivity, search_type: SearchType) -> bool {
        self.text == text && self.case == case && self.search_type == search_type
    }
}

#[derive(Debug, Default)]
pub(crate) struct SearchOutcome {
    pub found: bool,
    /// Pages whose highlights changed
    pub changed_pages: BTreeSet<usize>,
    /// Pages whose text layer was extracted during the search
    pub loaded_text: Vec<usize>,
    /// Where the viewport should move to, if requested
    pub target: Option<(usize, NormalizedRect)>,
}

/// Loads the text layer of a page when the search needs it
pub(crate) type TextLoader<'a> = dyn FnMut(usize) -> Option<TextPage> + 'a;

fn ensure_text(
    pages: &mut [Page],
    page: usize,
    load: &mut TextLoader<'_>,
    outcome: &mut SearchOutcome,
) -> bool {
    if pages[page].has_text_page() {
        return true;
    }
    match load(page) {
        Some(text) => {
            pages[page].set_text_page(text);
            outcome.loaded_text.push(page);
            true
        }
        None => false,
    }
}

fn clear_highlights(
    search: &mut RunningSearch,
    id: SearchId,
    pages: &mut [Page],
    outcome: &mut SearchOutcome,
) {
    for page in std::mem::take(&mut search.highlighted) {
        if let Some(p) = pages.get_mut(page) {
            if p.clear_highlights(id) {
                outcome.changed_pages.insert(page);
            }
        }
    }
}

fn highlight(
    search: &mut RunningSearch,
    id: SearchId,
    pages: &mut [Page],
    page: usize,
    area: NormalizedRect,
    outcome: &mut SearchOutcome,
) {
    pages[page].add_highlight(Highlight {
        search_id: id,
        color: search.color,
        area,
    });
    search.highlighted.insert(page);
    outcome.changed_pages.insert(page);
}

/// Run `search` over `pages`, updating its cursor and highlights
pub(crate) fn run(
    search: &mut RunningSearch,
    id: SearchId,
    pages: &mut [Page],
    load: &mut TextLoader<'_>,
) -> SearchOutcome {
    let mut outcome = SearchOutcome::default();
    clear_highlights(search, id, pages, &mut outcome);

    if pages.is_empty() {
        return outcome;
    }

    match search.search_type {
        SearchType::NextMatch | SearchType::PrevMatch => {
            let Some(matcher) = TextMatcher::new(&search.text, search.case) else {
                return outcome;
            };
            let forward = search.search_type == SearchType::NextMatch;
            let hit = if forward {
                scan_forward(search.cursor, &matcher, pages, load, &mut outcome)
            } else {
                scan_backward(search.cursor, &matcher, pages, load, &mut outcome)
            };

            match hit {
                Some((page, m)) => {
                    search.cursor = Cursor::Match {
                        page,
                        start: m.start,
                        end: m.end,
                    };
                    highlight(search, id, pages, page, m.area, &mut outcome);
                    outcome.found = true;
                    outcome.target = Some((page, m.area));
                }
                None => {
                    search.cursor = if forward {
                        Cursor::ParkedAtEnd
                    } else {
                        Cursor::ParkedAtStart
                    };
                }
            }
        }

        SearchType::AllDoc => {
            let Some(matcher) = TextMatcher::new(&search.text, search.case) else {
                return outcome;
            };
            for page in 0..pages.len() {
                if !ensure_text(pages, page, load, &mut outcome) {
                    continue;
                }
                let matches = pages[page]
                    .text_page()
                    .map(|t| matcher.find_all(t))
                    .unwrap_or_default();
                record_page_matches(search, id, pages, page, &matches, &mut outcome);
            }
        }

        SearchType::GoogleAll | SearchType::GoogleAny => {
            let matchers: Vec<TextMatcher> = search
                .text
                .split_whitespace()
                .filter_map(|word| TextMatcher::new(word, search.case))
                .collect();
            if matchers.is_empty() {
                return outcome;
            }
            let need_all = search.search_type == SearchType::GoogleAll;

            for page in 0..pages.len() {
                if !ensure_text(pages, page, load, &mut outcome) {
                    continue;
                }
                let Some(text) = pages[page].text_page() else {
                    continue;
                };
                let page_matches = if need_all {
                    matchers.iter().all(|m| m.is_match(text))
                } else {
                    matchers.iter().any(|m| m.is_match(text))
                };
                if page_matches {
                    let matches: Vec<TextMatch> =
                        matchers.iter().flat_map(|m| m.find_all(text)).collect();
                    record_page_matches(search, id, pages, page, &matches, &mut outcome);
                }
            }
        }
    }

    outcome
}

fn record_page_matches(
    search: &mut RunningSearch,
    id: SearchId,
    pages: &mut [Page],
    page: usize,
    matches: &[TextMatch],
    outcome: &mut SearchOutcome,
) {
    for m in matches {
        highlight(search, id, pages, page, m.area, outcome);
    }
    if let Some(first) = matches.first() {
        outcome.found = true;
        if outcome.target.is_none() {
            outcome.target = Some((page, first.area));
        }
    }
}

fn scan_forward(
    cursor: Cursor,
    matcher: &TextMatcher,
    pages: &mut [Page],
    load: &mut TextLoader<'_>,
    outcome: &mut SearchOutcome,
) -> Option<(usize, TextMatch)> {
    let (first_page, mut offset) = match cursor {
        Cursor::Match { page, end, .. } if page < pages.len() => (page, end),
        _ => (0, 0),
    };

    for page in first_page..pages.len() {
        if ensure_text(pages, page, load, outcome) {
            if let Some(m) = pages[page]
                .text_page()
                .and_then(|t| matcher.find_next(t, offset))
            {
                return Some((page, m));
            }
        }
        offset = 0;
    }
    None
}

fn scan_backward(
    cursor: Cursor,
    matcher: &TextMatcher,
    pages: &mut [Page],
    load: &mut TextLoader<'_>,
    outcome: &mut SearchOutcome,
) -> Option<(usize, TextMatch)> {
    let (first_page, mut before) = match cursor {
        Cursor::Match { page, start, .. } if page < pages.len() => (page, Some(start)),
        _ => (pages.len() - 1, None),
    };

    for page in (0..=first_page).rev() {
        if ensure_text(pages, page, load, outcome) {
            if let Some(m) = pages[page].text_page().and_then(|t| {
                let limit = before.unwrap_or(t.text().len());
                matcher.find_prev(t, limit)
            }) {
                return Some((page, m));
            }
        }
        before = None;
    }
    None
}

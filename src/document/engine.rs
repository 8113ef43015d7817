//! The document core: open document state, viewport sync and work dispatch

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;

use super::dispatch::{Dispatcher, Submitted};
use super::history::ViewportHistory;
use super::link::{Link, LinkAction};
use super::memory::{PixmapKey, PixmapMemory};
use super::observer::{ChangeFlags, DocumentObserver, ObserverRegistry};
use super::page::{Annotation, AnnotationId, Page, TextSelection};
use super::request::{Completion, GeneratorFault, ObserverId, PixmapRequest};
use super::search::{self, RunningSearch, SearchId, SearchType};
use super::text::{CaseSensitivity, TextPage};
use super::types::{Color, Pixmap, Rotation};
use super::viewport::{Viewport, VisiblePageRect};
use crate::docdata::DocumentData;
use crate::generator::{
    ConfigDialog, DocumentInfo, Generator, GeneratorRegistry, Permissions, Synopsis,
};
use crate::settings;

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no generator for {} (mime hint {mime_hint:?})", .path.display())]
    UnsupportedFormat {
        path: PathBuf,
        mime_hint: Option<String>,
    },

    #[error("generator failed to load {}: {source}", .path.display())]
    GeneratorLoadFailed {
        path: PathBuf,
        #[source]
        source: GeneratorFault,
    },
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no document is open")]
    NotOpen,

    #[error("{mime} documents cannot be exported as text")]
    Unsupported { mime: String },

    #[error("the document does not allow copying its text")]
    NotAllowed,

    #[error("cannot write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// State that only exists while a document is open
struct OpenDocument {
    path: PathBuf,
    mime: String,
    dispatcher: Dispatcher,
    info: DocumentInfo,
    synopsis: Option<Synopsis>,
}

impl OpenDocument {
    fn generator(&self) -> &dyn Generator {
        self.dispatcher.generator().as_ref()
    }
}

/// Single owner of pages, viewport and history for one open document.
///
/// Everything here runs on the owner thread. Rendering happens on the
/// dispatcher's workers and results come back through
/// [`process_completions`](Self::process_completions).
pub struct Document {
    registry: GeneratorRegistry,
    observers: ObserverRegistry,
    open: Option<OpenDocument>,
    pages: Vec<Page>,
    viewport: Viewport,
    visible_rects: Vec<VisiblePageRect>,
    history: ViewportHistory,
    next_document_viewport: Option<Viewport>,
    searches: HashMap<SearchId, RunningSearch>,
    last_search: Option<SearchId>,
    rotation: Rotation,
    memory: PixmapMemory,
    docdata: DocumentData,
    next_annotation_id: u64,
    render_workers: usize,
    history_size: usize,
    remember_viewport: bool,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Document core with the bundled generators and no persistent data
    #[must_use]
    pub fn new() -> Self {
        Self::with_registry(GeneratorRegistry::with_builtin())
    }

    #[must_use]
    pub fn with_registry(registry: GeneratorRegistry) -> Self {
        let settings = settings::current();
        Self {
            registry,
            observers: ObserverRegistry::new(),
            open: None,
            pages: Vec::new(),
            viewport: Viewport::default(),
            visible_rects: Vec::new(),
            history: ViewportHistory::new(settings.history_size),
            next_document_viewport: None,
            searches: HashMap::new(),
            last_search: None,
            rotation: Rotation::None,
            memory: PixmapMemory::new(settings.memory_budget_bytes),
            docdata: DocumentData::ephemeral(),
            next_annotation_id: 1,
            render_workers: settings.render_workers,
            history_size: settings.history_size,
            remember_viewport: settings.remember_viewport,
        }
    }

    /// Remember viewports and bookmarks in `docdata`
    #[must_use]
    pub fn with_docdata(mut self, docdata: DocumentData) -> Self {
        self.docdata = docdata;
        self
    }

    pub fn registry_mut(&mut self) -> &mut GeneratorRegistry {
        &mut self.registry
    }

    // Observers

    /// Register an observer; it gets `notify_setup` at once when a
    /// document is already open
    pub fn add_observer(&mut self, observer: &Rc<dyn DocumentObserver>) -> bool {
        if !self.observers.add(observer) {
            return false;
        }
        if self.open.is_some() {
            let pages = &self.pages;
            self.observers
                .notify_one(observer.observer_id(), |o| o.notify_setup(pages, true));
        }
        true
    }

    /// Unregister an observer and drop its pending requests and pixmaps
    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        if !self.observers.remove(id) {
            return false;
        }
        if let Some(open) = &mut self.open {
            open.dispatcher.cancel_observer(id);
        }
        for page in &mut self.pages {
            page.delete_pixmap(id);
        }
        self.memory.forget_observer(id);
        true
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    // Lifecycle

    pub fn open_document(&mut self, path: &Path, mime_hint: Option<&str>) -> Result<(), OpenError> {
        self.close_document();

        std::fs::metadata(path).map_err(|source| OpenError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let unsupported = || OpenError::UnsupportedFormat {
            path: path.to_path_buf(),
            mime_hint: mime_hint.map(str::to_string),
        };
        let mime = self
            .registry
            .resolve_mime(path, mime_hint)
            .ok_or_else(unsupported)?;
        let mut generator = self.registry.create(&mime).ok_or_else(unsupported)?;

        let sizes = generator.load_document(path).map_err(|fault| match fault {
            GeneratorFault::Io(source) => OpenError::Io {
                path: path.to_path_buf(),
                source,
            },
            source => OpenError::GeneratorLoadFailed {
                path: path.to_path_buf(),
                source,
            },
        })?;
        if sizes.is_empty() {
            return Err(OpenError::GeneratorLoadFailed {
                path: path.to_path_buf(),
                source: GeneratorFault::generic("document has no pages"),
            });
        }

        let info = generator.document_info();
        let mut synopsis = generator.synopsis();
        if let Some(synopsis) = &mut synopsis {
            synopsis.resolve_named(&|name| generator.named_viewport(name));
        }

        let generator: Arc<dyn Generator> = Arc::from(generator);
        let dispatcher = Dispatcher::new(generator, self.render_workers);

        self.pages = sizes
            .into_iter()
            .enumerate()
            .map(|(n, size)| Page::new(n, size))
            .collect();
        for page in self.docdata.bookmarks(path) {
            if let Some(p) = self.pages.get_mut(page) {
                p.set_bookmarked(true);
            }
        }

        let page_count = self.pages.len();
        let in_range = |vp: &Viewport| vp.page().is_some_and(|p| p < page_count);
        let remembered = self
            .remember_viewport
            .then(|| self.docdata.viewport(path))
            .flatten();
        let initial = self
            .next_document_viewport
            .take()
            .filter(in_range)
            .or_else(|| remembered.filter(in_range))
            .unwrap_or_else(|| Viewport::new(0));

        info!(
            "Opened {} as {mime} with {page_count} pages at {initial}",
            path.display()
        );
        self.open = Some(OpenDocument {
            path: path.to_path_buf(),
            mime,
            dispatcher,
            info,
            synopsis,
        });
        self.rotation = Rotation::None;
        self.history = ViewportHistory::new(self.history_size);
        self.history.reset(initial);
        self.viewport = initial;

        let pages = &self.pages;
        self.observers
            .for_each(ObserverId::NONE, |o| o.notify_setup(pages, true));
        let viewport = self.viewport;
        self.observers.for_each(ObserverId::NONE, |o| {
            o.notify_viewport_changed(&viewport, false);
        });
        Ok(())
    }

    /// Close the open document, if any. Pending work is cancelled.
    pub fn close_document(&mut self) {
        let Some(mut open) = self.open.take() else {
            return;
        };
        open.dispatcher.cancel_all();

        if self.remember_viewport && self.viewport.is_valid() {
            let bookmarks = self.bookmarked_pages();
            self.docdata.remember(&open.path, &self.viewport, &bookmarks);
        }
        info!("Closing {}", open.path.display());
        drop(open);

        self.pages.clear();
        self.searches.clear();
        self.last_search = None;
        self.memory.clear();
        self.viewport = Viewport::default();
        self.visible_rects.clear();
        self.history.clear();
        self.rotation = Rotation::None;

        self.observers
            .for_each(ObserverId::NONE, |o| o.notify_setup(&[], true));
        self.observers
            .for_each(ObserverId::NONE, |o| o.notify_document_closed());
    }

    // Queries

    #[must_use]
    pub fn is_opened(&self) -> bool {
        self.open.is_some()
    }

    #[must_use]
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    #[must_use]
    pub fn page(&self, number: usize) -> Option<&Page> {
        self.pages.get(number)
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    pub fn current_page(&self) -> Option<usize> {
        self.viewport.page()
    }

    #[must_use]
    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    #[must_use]
    pub fn current_document(&self) -> Option<&Path> {
        self.open.as_ref().map(|o| o.path.as_path())
    }

    #[must_use]
    pub fn mime_type(&self) -> Option<&str> {
        self.open.as_ref().map(|o| o.mime.as_str())
    }

    #[must_use]
    pub fn document_info(&self) -> Option<&DocumentInfo> {
        self.open.as_ref().map(|o| &o.info)
    }

    #[must_use]
    pub fn document_synopsis(&self) -> Option<&Synopsis> {
        self.open.as_ref().and_then(|o| o.synopsis.as_ref())
    }

    #[must_use]
    pub fn supports_searching(&self) -> bool {
        self.open
            .as_ref()
            .is_some_and(|o| o.generator().supports_searching())
    }

    #[must_use]
    pub fn supports_rotation(&self) -> bool {
        self.open
            .as_ref()
            .is_some_and(|o| o.generator().supports_rotation())
    }

    #[must_use]
    pub fn supports_paper_sizes(&self) -> bool {
        self.open
            .as_ref()
            .is_some_and(|o| o.generator().supports_paper_sizes())
    }

    #[must_use]
    pub fn paper_sizes(&self) -> Vec<String> {
        self.open
            .as_ref()
            .map(|o| o.generator().paper_sizes())
            .unwrap_or_default()
    }

    /// Whether the document grants every permission in `wanted`
    #[must_use]
    pub fn is_allowed(&self, wanted: Permissions) -> bool {
        self.open
            .as_ref()
            .is_some_and(|o| o.generator().permissions().contains(wanted))
    }

    #[must_use]
    pub fn can_export_to_text(&self) -> bool {
        self.open
            .as_ref()
            .is_some_and(|o| o.generator().can_export_to_text())
    }

    /// Write the text of every page to `path`, one page after another
    pub fn export_to_text(&self, path: &Path) -> Result<(), ExportError> {
        let open = self.open.as_ref().ok_or(ExportError::NotOpen)?;
        if !open.generator().can_export_to_text() {
            return Err(ExportError::Unsupported {
                mime: open.mime.clone(),
            });
        }
        if !self.is_allowed(Permissions::COPY) {
            return Err(ExportError::NotAllowed);
        }

        let mut content = String::new();
        for page in &self.pages {
            let extracted;
            let text = match page.text_page() {
                Some(text) => text,
                None => {
                    extracted = open.generator().extract_text(page.number());
                    match &extracted {
                        Some(text) => text,
                        None => continue,
                    }
                }
            };
            content.push_str(text.text());
            if !content.ends_with('\n') {
                content.push('\n');
            }
        }
        std::fs::write(path, content).map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Exported text of {} pages to {}", self.pages.len(), path.display());
        Ok(())
    }

    #[must_use]
    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Resolve a named destination through the generator
    #[must_use]
    pub fn named_viewport(&self, name: &str) -> Option<Viewport> {
        self.open.as_ref()?.generator().named_viewport(name)
    }

    // Viewport and history

    /// Move to `viewport` and tell every observer except `exclude`
    pub fn set_viewport(&mut self, viewport: Viewport, exclude: ObserverId, smooth_move: bool) {
        if !viewport.page().is_some_and(|p| p < self.pages.len()) {
            debug!("Ignoring viewport {viewport} outside the document");
            return;
        }
        self.viewport = viewport;
        // Moving within the same page rewrites the current entry
        let same_page = self
            .history
            .current()
            .is_none_or(|current| !current.is_valid() || current.page_number == viewport.page_number);
        if same_page {
            self.history.replace_current(viewport);
        } else {
            self.history.push(viewport);
        }
        self.notify_viewport(exclude, smooth_move);
    }

    pub fn set_viewport_page(&mut self, page: usize, exclude: ObserverId, smooth_move: bool) {
        match i32::try_from(page) {
            Ok(page) => self.set_viewport(Viewport::new(page), exclude, smooth_move),
            Err(_) => debug!("Ignoring viewport page {page}"),
        }
    }

    pub fn set_prev_viewport(&mut self) {
        if let Some(viewport) = self.history.back() {
            self.viewport = viewport;
            self.notify_viewport(ObserverId::NONE, false);
        }
    }

    pub fn set_next_viewport(&mut self) {
        if let Some(viewport) = self.history.forward() {
            self.viewport = viewport;
            self.notify_viewport(ObserverId::NONE, false);
        }
    }

    /// Viewport to apply once the next document is opened
    pub fn set_next_document_viewport(&mut self, viewport: Viewport) {
        self.next_document_viewport = Some(viewport);
    }

    #[must_use]
    pub fn history_at_begin(&self) -> bool {
        self.history.at_begin()
    }

    #[must_use]
    pub fn history_at_end(&self) -> bool {
        self.history.at_end()
    }

    #[must_use]
    pub fn visible_page_rects(&self) -> &[VisiblePageRect] {
        &self.visible_rects
    }

    /// Record what a view currently shows and tell every observer except
    /// `exclude`
    pub fn set_visible_page_rects(&mut self, rects: Vec<VisiblePageRect>, exclude: ObserverId) {
        let page_count = self.pages.len();
        self.visible_rects = rects
            .into_iter()
            .filter(|r| r.page < page_count && !r.rect.is_null())
            .collect();
        self.observers
            .for_each(exclude, |o| o.notify_visible_rects_changed());
    }

    /// Follow a navigation link; true when the viewport moved
    pub fn process_link(&mut self, link: &Link) -> bool {
        let target = match link {
            Link::Goto(viewport) => Some(*viewport),
            Link::Named(name) => {
                let resolved = self.named_viewport(name);
                if resolved.is_none() {
                    debug!("Unknown named destination {name:?}");
                }
                resolved
            }
            Link::Action(action) => return self.process_action(*action),
        };
        match target {
            Some(viewport) if viewport.page().is_some_and(|p| p < self.pages.len()) => {
                self.set_viewport(viewport, ObserverId::NONE, false);
                true
            }
            _ => false,
        }
    }

    fn process_action(&mut self, action: LinkAction) -> bool {
        let (Some(current), Some(last)) = (self.current_page(), self.pages.len().checked_sub(1)) else {
            return false;
        };
        let page = match action {
            LinkAction::FirstPage => 0,
            LinkAction::PrevPage => current.saturating_sub(1),
            LinkAction::NextPage => (current + 1).min(last),
            LinkAction::LastPage => last,
            LinkAction::HistoryBack => {
                let moved = !self.history_at_begin();
                self.set_prev_viewport();
                return moved;
            }
            LinkAction::HistoryForward => {
                let moved = !self.history_at_end();
                self.set_next_viewport();
                return moved;
            }
        };
        if page == current {
            return false;
        }
        self.set_viewport_page(page, ObserverId::NONE, false);
        true
    }

    fn notify_viewport(&mut self, exclude: ObserverId, smooth_move: bool) {
        let viewport = self.viewport;
        self.observers.for_each(exclude, |o| {
            o.notify_viewport_changed(&viewport, smooth_move);
        });
    }

    // Pixmaps

    /// Queue pixmap requests. Never blocks; results arrive through
    /// [`process_completions`](Self::process_completions).
    pub fn request_pixmaps(&mut self, requests: Vec<PixmapRequest>) {
        let Some(open) = &mut self.open else {
            debug!("Dropping {} pixmap requests, no document", requests.len());
            return;
        };
        for mut request in requests {
            request.rotation = self.rotation;
            let Some(page) = self.pages.get(request.page) else {
                debug!("Dropping request for page {} out of range", request.page);
                continue;
            };
            if !self.observers.contains(request.observer) {
                warn!(
                    "Dropping request from unregistered observer {:?}",
                    request.observer
                );
                continue;
            }
            if page.has_pixmap(request.observer, request.width, request.height)
                && !open.dispatcher.is_pending(request.observer, request.page)
            {
                debug!(
                    "Page {} already has a {}x{} pixmap for {:?}",
                    request.page, request.width, request.height, request.observer
                );
                continue;
            }
            if let Submitted::Duplicate(id) = open.dispatcher.submit(request) {
                debug!("Dropped duplicate of pending request {id:?}");
            }
        }
    }

    /// Deliver every finished job; returns how many results were applied
    pub fn process_completions(&mut self) -> usize {
        let Some(open) = &mut self.open else {
            return 0;
        };
        let completions = open.dispatcher.take_completions();
        self.apply_completions(completions)
    }

    /// Like [`process_completions`](Self::process_completions) but waits up
    /// to `timeout` when nothing is ready yet
    pub fn wait_for_completions(&mut self, timeout: Duration) -> usize {
        let Some(open) = &mut self.open else {
            return 0;
        };
        let completions = open.dispatcher.wait_completions(timeout);
        self.apply_completions(completions)
    }

    /// Whether any pixmap request is still queued or rendering
    #[must_use]
    pub fn has_pending_requests(&self) -> bool {
        self.open
            .as_ref()
            .is_some_and(|o| o.dispatcher.pending_count() > 0)
    }

    fn apply_completions(&mut self, completions: Vec<Completion>) -> usize {
        let mut applied = 0;
        for completion in completions {
            let delivered = match completion {
                Completion::Pixmap { request, result } => self.request_done(request, result),
                Completion::Text { id, page, text } => {
                    let current = self
                        .open
                        .as_mut()
                        .is_some_and(|o| o.dispatcher.settle_text(id, page));
                    current && self.text_page_done(page, text)
                }
                Completion::Cancelled(id) => {
                    debug!("Worker skipped superseded request {id:?}");
                    false
                }
            };
            if delivered {
                applied += 1;
            }
        }
        applied
    }

    /// Store a finished pixmap and notify the requesting observer.
    /// Superseded results and failures are dropped; returns whether the
    /// pixmap was delivered.
    pub fn request_done(&mut self, request: PixmapRequest, result: Result<Pixmap, GeneratorFault>) -> bool {
        let Some(open) = &mut self.open else {
            return false;
        };
        if !open.dispatcher.settle(&request) {
            debug!(
                "Discarding stale result {:?} for page {}",
                request.id, request.page
            );
            return false;
        }
        let pixmap = match result {
            Ok(pixmap) => pixmap,
            Err(e) => {
                warn!("Rendering page {} failed: {e}", request.page);
                // Leave the slot empty so the next request renders again
                let stale = self
                    .pages
                    .get_mut(request.page)
                    .and_then(|p| p.delete_pixmap(request.observer));
                if stale.is_some() {
                    self.memory.forget(&request.key());
                    self.observers.notify_one(request.observer, |o| {
                        o.notify_page_changed(request.page, ChangeFlags::PIXMAP);
                    });
                }
                return false;
            }
        };
        let Some(page) = self.pages.get_mut(request.page) else {
            return false;
        };

        let key = request.key();
        let bytes = pixmap.as_raw().len();
        page.set_pixmap(request.observer, pixmap);
        self.memory.track(key, bytes);
        self.cleanup_pixmap_memory(Some(key));

        self.observers.notify_one(request.observer, |o| {
            o.notify_page_changed(request.page, ChangeFlags::PIXMAP);
        });
        true
    }

    /// Unload the oldest pixmaps until the budget is respected
    fn cleanup_pixmap_memory(&mut self, keep: Option<PixmapKey>) {
        let current = self.viewport.page();
        let observers = &self.observers;
        let evicted = self.memory.evict(|key| {
            Some(key.1) != current
                && Some(*key) != keep
                && observers.can_unload_pixmap(key.0, key.1)
        });
        for (observer, page) in evicted {
            if let Some(p) = self.pages.get_mut(page) {
                p.delete_pixmap(observer);
            }
            debug!("Unloaded pixmap of page {page} for {observer:?}");
        }
    }

    #[must_use]
    pub fn pixmap_memory(&self) -> &PixmapMemory {
        &self.memory
    }

    /// Change the pixmap budget for this document and enforce it at once
    pub fn set_pixmap_memory_budget(&mut self, bytes: usize) {
        self.memory.set_budget(bytes);
        self.cleanup_pixmap_memory(None);
    }

    // Text

    /// Extract a page's text layer on a worker. False when it is already
    /// loaded, in flight or the page does not exist.
    pub fn request_text_page(&mut self, page: usize) -> bool {
        let Some(open) = &mut self.open else {
            return false;
        };
        match self.pages.get(page) {
            Some(p) if !p.has_text_page() => open.dispatcher.request_text(page),
            _ => false,
        }
    }

    fn text_page_done(&mut self, page: usize, text: Option<TextPage>) -> bool {
        let Some(text) = text else {
            debug!("Page {page} has no text layer");
            return false;
        };
        match self.pages.get_mut(page) {
            Some(p) if !p.has_text_page() => p.set_text_page(text),
            _ => return false,
        }
        self.notify_page(page, ChangeFlags::TEXT_PAGE);
        true
    }

    // Search

    /// Start a search on `id`; returns whether anything matched.
    ///
    /// With `from_start == false` a repeated Next/Prev query continues
    /// from the previous match of the same id.
    #[expect(clippy::too_many_arguments)]
    pub fn search_text(
        &mut self,
        id: SearchId,
        text: &str,
        from_start: bool,
        case: CaseSensitivity,
        search_type: SearchType,
        move_viewport: bool,
        color: Color,
    ) -> bool {
        if text.is_empty() || !self.supports_searching() {
            return false;
        }
        let mut search = RunningSearch::new(text, case, search_type, move_viewport, color);
        if let Some(previous) = self.searches.remove(&id) {
            if !from_start && previous.same_query(text, case, search_type) {
                search.cursor = previous.cursor;
            }
            search.highlighted = previous.highlighted;
        }
        self.run_search(id, search)
    }

    /// Repeat the stored query of `id`
    pub fn continue_search(&mut self, id: SearchId) -> bool {
        match self.searches.remove(&id) {
            Some(search) => self.run_search(id, search),
            None => false,
        }
    }

    /// Repeat the stored query of `id` in the given direction
    pub fn continue_search_as(&mut self, id: SearchId, search_type: SearchType) -> bool {
        match self.searches.remove(&id) {
            Some(mut search) => {
                search.search_type = search_type;
                self.run_search(id, search)
            }
            None => false,
        }
    }

    pub fn continue_last_search(&mut self) -> bool {
        match self.last_search {
            Some(id) => self.continue_search(id),
            None => false,
        }
    }

    /// Drop the state and highlights of one search
    pub fn reset_search(&mut self, id: SearchId) {
        let Some(search) = self.searches.remove(&id) else {
            return;
        };
        for page in search.highlighted {
            let cleared = self
                .pages
                .get_mut(page)
                .is_some_and(|p| p.clear_highlights(id));
            if cleared {
                self.notify_page(page, ChangeFlags::HIGHLIGHTS);
            }
        }
        if self.last_search == Some(id) {
            self.last_search = None;
        }
    }

    fn run_search(&mut self, id: SearchId, mut search: RunningSearch) -> bool {
        let Some(open) = &self.open else {
            return false;
        };
        let generator = Arc::clone(open.dispatcher.generator());
        let mut load = |page: usize| generator.extract_text(page);
        let outcome = search::run(&mut search, id, &mut self.pages, &mut load);
        debug!(
            "Search {id:?} for {:?} ({:?}): found={}",
            search.text, search.search_type, outcome.found
        );

        for &page in &outcome.loaded_text {
            self.notify_page(page, ChangeFlags::TEXT_PAGE);
        }
        for &page in &outcome.changed_pages {
            self.notify_page(page, ChangeFlags::HIGHLIGHTS);
        }

        if search.move_viewport {
            if let Some((page, area)) = outcome.target {
                let target = match search.search_type {
                    SearchType::NextMatch | SearchType::PrevMatch => {
                        let (x, y) = area.center();
                        Viewport::centered_at(page as i32, x, y)
                    }
                    _ => Viewport::new(page as i32),
                };
                self.set_viewport(target, ObserverId::NONE, true);
            }
        }

        self.searches.insert(id, search);
        self.last_search = Some(id);
        outcome.found
    }

    // Page mutations

    /// Add an annotation; returns its assigned id
    pub fn add_page_annotation(&mut self, page: usize, mut annotation: Annotation) -> Option<AnnotationId> {
        let p = self.pages.get_mut(page)?;
        annotation.id = AnnotationId(self.next_annotation_id);
        self.next_annotation_id += 1;
        let id = annotation.id;
        p.add_annotation(annotation);
        self.notify_page(page, ChangeFlags::ANNOTATIONS);
        Some(id)
    }

    pub fn modify_page_annotation(&mut self, page: usize, annotation: Annotation) -> bool {
        let modified = self
            .pages
            .get_mut(page)
            .is_some_and(|p| p.modify_annotation(annotation));
        if modified {
            self.notify_page(page, ChangeFlags::ANNOTATIONS);
        }
        modified
    }

    pub fn remove_page_annotation(&mut self, page: usize, id: AnnotationId) -> bool {
        self.remove_page_annotations(page, &[id])
    }

    /// Remove several annotations with a single notification
    pub fn remove_page_annotations(&mut self, page: usize, ids: &[AnnotationId]) -> bool {
        let Some(p) = self.pages.get_mut(page) else {
            return false;
        };
        let mut removed = false;
        for &id in ids {
            removed |= p.remove_annotation(id);
        }
        if removed {
            self.notify_page(page, ChangeFlags::ANNOTATIONS);
        }
        removed
    }

    pub fn set_page_text_selection(&mut self, page: usize, selection: Option<TextSelection>) -> bool {
        let changed = self
            .pages
            .get_mut(page)
            .is_some_and(|p| p.set_text_selection(selection));
        if changed {
            self.notify_page(page, ChangeFlags::TEXT_SELECTION);
        }
        changed
    }

    pub fn add_bookmark(&mut self, page: usize) -> bool {
        self.set_bookmark(page, true)
    }

    pub fn remove_bookmark(&mut self, page: usize) -> bool {
        self.set_bookmark(page, false)
    }

    #[must_use]
    pub fn is_bookmarked(&self, page: usize) -> bool {
        self.pages.get(page).is_some_and(Page::is_bookmarked)
    }

    #[must_use]
    pub fn bookmarked_pages(&self) -> Vec<usize> {
        self.pages
            .iter()
            .filter(|p| p.is_bookmarked())
            .map(Page::number)
            .collect()
    }

    fn set_bookmark(&mut self, page: usize, bookmarked: bool) -> bool {
        let changed = self
            .pages
            .get_mut(page)
            .is_some_and(|p| p.set_bookmarked(bookmarked));
        if changed {
            self.notify_page(page, ChangeFlags::BOOKMARK);
        }
        changed
    }

    fn notify_page(&mut self, page: usize, flags: ChangeFlags) {
        self.observers
            .for_each(ObserverId::NONE, |o| o.notify_page_changed(page, flags));
    }

    // Rotation and configuration

    /// Rotate every page. Pixmaps are dropped and observers set up again.
    pub fn set_rotation(&mut self, rotation: Rotation) -> bool {
        if rotation == self.rotation || !self.supports_rotation() {
            return false;
        }
        info!("Rotating pages to {} degrees", rotation.degrees());
        if let Some(open) = &mut self.open {
            open.dispatcher.cancel_all();
        }
        for page in &mut self.pages {
            page.set_rotation(rotation);
        }
        self.memory.clear();
        self.rotation = rotation;

        let pages = &self.pages;
        self.observers
            .for_each(ObserverId::NONE, |o| o.notify_setup(pages, false));
        true
    }

    /// Reload settings and the generator's configuration; true if anything
    /// changed
    pub fn reparse_config(&mut self) -> bool {
        let settings_changed = settings::reload_settings();
        let settings = settings::current();
        self.render_workers = settings.render_workers;
        self.history_size = settings.history_size;
        self.remember_viewport = settings.remember_viewport;
        self.memory.set_budget(settings.memory_budget_bytes);
        self.cleanup_pixmap_memory(None);

        let generator_changed = self
            .open
            .as_ref()
            .and_then(|o| o.generator().config())
            .is_some_and(|config| config.reparse_config());
        if generator_changed {
            info!("Generator configuration changed, dropping pixmaps");
            if let Some(open) = &mut self.open {
                open.dispatcher.cancel_all();
            }
            for page in &mut self.pages {
                page.delete_pixmaps();
            }
            self.memory.clear();
            self.observers.for_each(ObserverId::NONE, |o| {
                o.notify_contents_cleared(ChangeFlags::PIXMAP);
            });
        }
        settings_changed || generator_changed
    }

    /// Let the generator contribute its configuration pages
    pub fn add_config_pages(&self, dialog: &mut dyn ConfigDialog) -> bool {
        match self.open.as_ref().and_then(|o| o.generator().config()) {
            Some(config) => {
                config.add_pages(dialog);
                true
            }
            None => false,
        }
    }
}

impl Drop for Document {
    fn drop(&mut self) {
        self.close_document();
    }
}

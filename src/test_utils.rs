//! Scripted generator and recording observer for driving `Document` in tests

use std::cell::RefCell;
use std::collections::HashSet;
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use image::Rgba;

use crate::document::{
    ChangeFlags, DocumentObserver, GeneratorFault, NormalizedRect, ObserverId, Page, PageSize,
    Pixmap, PixmapRequest, TextEntity, TextPage, Viewport,
};
use crate::generator::{
    DocumentInfo, Generator, GeneratorRegistry, Permissions, Synopsis, SynopsisEntry,
};

pub const MOCK_MIME: &str = "application/x-folio-mock";
pub const MOCK_EXTENSION: &str = "mock";

/// What the mock generator pretends the document contains
#[derive(Clone, Debug)]
pub struct MockScript {
    /// Text of every page; the page count is its length
    pub pages: Vec<String>,
    /// Pages whose rendering fails until changed through
    /// [`MockHandle::set_failing`]
    pub failing_pages: HashSet<usize>,
    /// Time spent in every render
    pub render_delay: Duration,
    /// Forces every request onto the owner thread
    pub synchronous_only: bool,
    /// Make `load_document` fail with this message
    pub load_failure: Option<String>,
    pub rotation: bool,
    pub permissions: Permissions,
}

impl Default for MockScript {
    fn default() -> Self {
        Self {
            pages: Vec::new(),
            failing_pages: HashSet::new(),
            render_delay: Duration::ZERO,
            synchronous_only: false,
            load_failure: None,
            rotation: false,
            permissions: Permissions::all(),
        }
    }
}

impl MockScript {
    pub fn with_pages<I, S>(pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pages: pages.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing(mut self, page: usize) -> Self {
        self.failing_pages.insert(page);
        self
    }
}

/// Shared view of what the mock generators did, plus a gate holding renders
#[derive(Clone, Default)]
pub struct MockHandle {
    renders: Arc<AtomicUsize>,
    extractions: Arc<AtomicUsize>,
    gate: Arc<(Mutex<bool>, Condvar)>,
    failing: Arc<Mutex<HashSet<usize>>>,
    last_size: Arc<Mutex<Option<(u32, u32)>>>,
}

impl MockHandle {
    /// Hold every render until [`resume`](Self::resume)
    pub fn pause(&self) {
        *self.gate.0.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    pub fn resume(&self) {
        let (paused, cvar) = &*self.gate;
        *paused.lock().unwrap_or_else(PoisonError::into_inner) = false;
        cvar.notify_all();
    }

    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    pub fn extraction_count(&self) -> usize {
        self.extractions.load(Ordering::SeqCst)
    }

    /// Make renders of `page` fail or succeed from now on
    pub fn set_failing(&self, page: usize, failing: bool) {
        let mut pages = self.failing.lock().unwrap_or_else(PoisonError::into_inner);
        if failing {
            pages.insert(page);
        } else {
            pages.remove(&page);
        }
    }

    /// Size the generator was last asked to render at
    pub fn last_render_size(&self) -> Option<(u32, u32)> {
        *self.last_size.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_failing(&self, page: usize) -> bool {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&page)
    }

    fn wait_while_paused(&self) {
        let (paused, cvar) = &*self.gate;
        let mut held = paused.lock().unwrap_or_else(PoisonError::into_inner);
        while *held {
            held = cvar.wait(held).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

pub struct MockGenerator {
    script: MockScript,
    handle: MockHandle,
}

impl MockGenerator {
    pub fn new(script: MockScript, handle: MockHandle) -> Self {
        Self { script, handle }
    }

    /// Registry knowing only the mock format, for files ending in `.mock`
    pub fn registry(script: MockScript) -> (GeneratorRegistry, MockHandle) {
        let handle = MockHandle::default();
        *handle.failing.lock().unwrap_or_else(PoisonError::into_inner) =
            script.failing_pages.clone();
        let shared = handle.clone();
        let mut registry = GeneratorRegistry::new();
        registry.register(MOCK_MIME, &[MOCK_EXTENSION], move || -> Box<dyn Generator> {
            Box::new(MockGenerator::new(script.clone(), shared.clone()))
        });
        (registry, handle)
    }

    /// One entity per word, words laid out left to right on a single row
    fn layout(text: &str) -> TextPage {
        let count = text.split_inclusive(char::is_whitespace).count().max(1);
        let width = 1.0 / count as f64;
        let entities = text
            .split_inclusive(char::is_whitespace)
            .enumerate()
            .map(|(i, word)| {
                let left = i as f64 * width;
                TextEntity::new(word, NormalizedRect::new(left, 0.4, left + width, 0.6))
            })
            .collect();
        TextPage::new(entities)
    }
}

impl Generator for MockGenerator {
    fn load_document(&mut self, _path: &Path) -> Result<Vec<PageSize>, GeneratorFault> {
        if let Some(reason) = &self.script.load_failure {
            return Err(GeneratorFault::generic(reason.clone()));
        }
        Ok(vec![PageSize::new(100.0, 200.0); self.script.pages.len()])
    }

    fn render_pixmap(&self, request: &PixmapRequest) -> Result<Pixmap, GeneratorFault> {
        self.handle.wait_while_paused();
        if !self.script.render_delay.is_zero() {
            std::thread::sleep(self.script.render_delay);
        }
        self.handle.renders.fetch_add(1, Ordering::SeqCst);
        *self
            .handle
            .last_size
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some((request.width, request.height));
        if self.handle.is_failing(request.page) {
            return Err(GeneratorFault::generic(format!(
                "scripted failure on page {}",
                request.page
            )));
        }
        if request.page >= self.script.pages.len() {
            return Err(GeneratorFault::PageOutOfRange(request.page));
        }
        // Upright pages are white with a black top left quadrant
        let (half_w, half_h) = (request.width / 2, request.height / 2);
        Ok(Pixmap::from_fn(request.width, request.height, |x, y| {
            if x < half_w && y < half_h {
                Rgba([0x00, 0x00, 0x00, 0xFF])
            } else {
                Rgba([0xFF, 0xFF, 0xFF, 0xFF])
            }
        }))
    }

    fn extract_text(&self, page: usize) -> Option<TextPage> {
        self.handle.extractions.fetch_add(1, Ordering::SeqCst);
        self.script.pages.get(page).map(|t| Self::layout(t))
    }

    fn synopsis(&self) -> Option<Synopsis> {
        let mut entry = SynopsisEntry::new("Last page", None);
        entry.viewport_name = Some("last".into());
        Some(Synopsis {
            entries: vec![entry],
        })
    }

    fn document_info(&self) -> DocumentInfo {
        let mut info = DocumentInfo::new();
        info.set("mimeType", MOCK_MIME, "Mime Type");
        info.set("pages", self.script.pages.len().to_string(), "Pages");
        info
    }

    fn named_viewport(&self, name: &str) -> Option<Viewport> {
        let last = self.script.pages.len().checked_sub(1)?;
        (name == "last").then(|| Viewport::new(last as i32))
    }

    fn supports_searching(&self) -> bool {
        true
    }

    fn supports_rotation(&self) -> bool {
        self.script.rotation
    }

    fn permissions(&self) -> Permissions {
        self.script.permissions
    }

    fn can_export_to_text(&self) -> bool {
        true
    }

    fn can_render_async(&self) -> bool {
        !self.script.synchronous_only
    }
}

/// Everything an observer can be told
#[derive(Clone, Debug, PartialEq)]
pub enum ObservedEvent {
    Setup { pages: usize, document_changed: bool },
    ViewportChanged { viewport: Viewport, smooth_move: bool },
    PageChanged { page: usize, flags: ChangeFlags },
    VisibleRectsChanged,
    ContentsCleared(ChangeFlags),
    DocumentClosed,
}

/// Observer that records every notification it receives
pub struct RecordingObserver {
    id: ObserverId,
    events: RefCell<Vec<ObservedEvent>>,
    /// Pages whose pixmaps must not be unloaded
    pinned: RefCell<HashSet<usize>>,
}

impl RecordingObserver {
    pub fn new(id: u32) -> Rc<Self> {
        Rc::new(Self {
            id: ObserverId::new(id),
            events: RefCell::new(Vec::new()),
            pinned: RefCell::new(HashSet::new()),
        })
    }

    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Type-erased handle for `Document::add_observer`
    pub fn as_observer(self: &Rc<Self>) -> Rc<dyn DocumentObserver> {
        let observer: Rc<dyn DocumentObserver> = self.clone();
        observer
    }

    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events.borrow().clone()
    }

    pub fn take_events(&self) -> Vec<ObservedEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    /// Pages that were announced with the given flag, in order
    pub fn pages_changed(&self, flag: ChangeFlags) -> Vec<usize> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                ObservedEvent::PageChanged { page, flags } if flags.contains(flag) => Some(*page),
                _ => None,
            })
            .collect()
    }

    pub fn viewports(&self) -> Vec<Viewport> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                ObservedEvent::ViewportChanged { viewport, .. } => Some(*viewport),
                _ => None,
            })
            .collect()
    }

    pub fn pin(&self, page: usize) {
        self.pinned.borrow_mut().insert(page);
    }

    fn record(&self, event: ObservedEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl DocumentObserver for RecordingObserver {
    fn observer_id(&self) -> ObserverId {
        self.id
    }

    fn notify_setup(&self, pages: &[Page], document_changed: bool) {
        self.record(ObservedEvent::Setup {
            pages: pages.len(),
            document_changed,
        });
    }

    fn notify_viewport_changed(&self, viewport: &Viewport, smooth_move: bool) {
        self.record(ObservedEvent::ViewportChanged {
            viewport: *viewport,
            smooth_move,
        });
    }

    fn notify_page_changed(&self, page: usize, flags: ChangeFlags) {
        self.record(ObservedEvent::PageChanged { page, flags });
    }

    fn notify_visible_rects_changed(&self) {
        self.record(ObservedEvent::VisibleRectsChanged);
    }

    fn notify_contents_cleared(&self, flags: ChangeFlags) {
        self.record(ObservedEvent::ContentsCleared(flags));
    }

    fn notify_document_closed(&self) {
        self.record(ObservedEvent::DocumentClosed);
    }

    fn can_unload_pixmap(&self, page: usize) -> bool {
        !self.pinned.borrow().contains(&page)
    }
}

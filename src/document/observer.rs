//! Observer registry and notification fan-out

use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use bitflags::bitflags;
use log::{debug, error, warn};

use super::page::Page;
use super::request::ObserverId;
use super::viewport::Viewport;

bitflags! {
    /// What changed on a page
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ChangeFlags: u32 {
        const PIXMAP = 1;
        const BOOKMARK = 1 << 1;
        const HIGHLIGHTS = 1 << 2;
        const TEXT_SELECTION = 1 << 3;
        const ANNOTATIONS = 1 << 4;
        const TEXT_PAGE = 1 << 5;
    }
}

/// A view on the document.
///
/// Callbacks run synchronously on the owner thread while the document is
/// mid-operation, so they get read-only data and must not call back into
/// the document. Queue follow-up work (such as pixmap requests) and submit
/// it after the call returns.
pub trait DocumentObserver {
    fn observer_id(&self) -> ObserverId;

    /// Pages were (re)loaded; `document_changed` is false for a relayout
    /// such as a rotation
    fn notify_setup(&self, _pages: &[Page], _document_changed: bool) {}

    fn notify_viewport_changed(&self, _viewport: &Viewport, _smooth_move: bool) {}

    fn notify_page_changed(&self, _page: usize, _flags: ChangeFlags) {}

    /// Another view changed the set of visible page rectangles
    fn notify_visible_rects_changed(&self) {}

    /// Content of every page was dropped
    fn notify_contents_cleared(&self, _flags: ChangeFlags) {}

    fn notify_document_closed(&self) {}

    /// Asked before the memory manager unloads this observer's pixmap
    fn can_unload_pixmap(&self, _page: usize) -> bool {
        true
    }
}

struct Entry {
    id: ObserverId,
    observer: Weak<dyn DocumentObserver>,
}

/// Observers in registration order, held by weak reference
#[derive(Default)]
pub struct ObserverRegistry {
    entries: Vec<Entry>,
}

impl ObserverRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer; no-op when its id is already registered
    pub fn add(&mut self, observer: &Rc<dyn DocumentObserver>) -> bool {
        let id = observer.observer_id();
        if id.is_none() {
            warn!("Refusing to register an observer with the sentinel id");
            return false;
        }
        if self.contains(id) {
            return false;
        }
        debug!("Registering observer {id:?}");
        self.entries.push(Entry {
            id,
            observer: Rc::downgrade(observer),
        });
        true
    }

    /// Unregister by id; no-op when not registered
    pub fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    #[must_use]
    pub fn contains(&self, id: ObserverId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ObserverId> + '_ {
        self.entries.iter().map(|e| e.id)
    }

    #[must_use]
    pub fn get(&self, id: ObserverId) -> Option<Rc<dyn DocumentObserver>> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .and_then(|e| e.observer.upgrade())
    }

    /// Call `f` on every live observer except `exclude`, in registration order.
    /// A panicking observer is logged and skipped; dropped observers are pruned.
    pub fn for_each(&mut self, exclude: ObserverId, mut f: impl FnMut(&dyn DocumentObserver)) {
        let mut dead = Vec::new();
        for entry in &self.entries {
            if entry.id == exclude {
                continue;
            }
            let Some(observer) = entry.observer.upgrade() else {
                dead.push(entry.id);
                continue;
            };
            deliver(entry.id, || f(observer.as_ref()));
        }
        if !dead.is_empty() {
            warn!("Pruning observers dropped without unregistering: {dead:?}");
            self.entries.retain(|e| !dead.contains(&e.id));
        }
    }

    /// Call `f` on a single observer, if registered and alive
    pub fn notify_one(&mut self, id: ObserverId, f: impl FnOnce(&dyn DocumentObserver)) {
        match self.get(id) {
            Some(observer) => deliver(id, || f(observer.as_ref())),
            None => {
                if self.remove(id) {
                    warn!("Pruning observer {id:?} dropped without unregistering");
                }
            }
        }
    }

    /// Ask the observer whether its pixmap can go; gone observers agree
    pub fn can_unload_pixmap(&self, id: ObserverId, page: usize) -> bool {
        let Some(observer) = self.get(id) else {
            return true;
        };
        panic::catch_unwind(AssertUnwindSafe(|| observer.can_unload_pixmap(page)))
            .unwrap_or_else(|_| {
                error!("Observer {id:?} panicked in can_unload_pixmap");
                true
            })
    }
}

fn deliver(id: ObserverId, call: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(call)).is_err() {
        error!("Observer {id:?} panicked during notification, continuing fan-out");
    }
}

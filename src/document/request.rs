//! Pixmap request and completion types

use super::text::TextPage;
use super::types::{Pixmap, Rotation};

/// Identity of a registered observer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub u32);

impl ObserverId {
    /// Sentinel that matches no registered observer
    pub const NONE: Self = Self(u32::MAX);

    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == Self::NONE.0
    }
}

/// Unique identifier for dispatched requests
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Request from an observer for a rendered page
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixmapRequest {
    /// Observer that will receive the pixmap
    pub observer: ObserverId,
    /// Page index (0-based)
    pub page: usize,
    pub width: u32,
    pub height: u32,
    /// Lower values are dispatched first
    pub priority: i32,
    /// Whether the generator may render this off the owner thread
    pub asynchronous: bool,
    /// Orientation of the delivered pixmap, set by the document
    pub rotation: Rotation,
    /// Assigned by the document when the request is queued
    pub id: RequestId,
}

impl PixmapRequest {
    #[must_use]
    pub fn new(observer: ObserverId, page: usize, width: u32, height: u32) -> Self {
        Self {
            observer,
            page,
            width,
            height,
            priority: 0,
            asynchronous: true,
            rotation: Rotation::None,
            id: RequestId::new(0),
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn synchronous(mut self) -> Self {
        self.asynchronous = false;
        self
    }

    /// Key that newer requests supersede
    #[must_use]
    pub fn key(&self) -> (ObserverId, usize) {
        (self.observer, self.page)
    }

    /// The same request as the generator sees it: no rotation, with width
    /// and height swapped back for quarter turns
    #[must_use]
    pub fn upright(&self) -> Self {
        let mut upright = self.clone();
        if self.rotation.swaps_axes() {
            std::mem::swap(&mut upright.width, &mut upright.height);
        }
        upright.rotation = Rotation::None;
        upright
    }

    #[must_use]
    pub fn same_size(&self, other: &Self) -> bool {
        self.width == other.width && self.height == other.height
    }
}

/// Errors reported by generators
#[derive(Debug, thiserror::Error)]
pub enum GeneratorFault {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("page {0} out of range")]
    PageOutOfRange(usize),

    #[error("{detail}")]
    Generic { detail: String },
}

impl GeneratorFault {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }
}

/// Work sent to dispatcher workers
#[derive(Debug)]
pub(crate) enum Job {
    Pixmap(PixmapRequest),
    Text { id: RequestId, page: usize },
    Shutdown,
}

/// Completion sent back to the owner thread
#[derive(Debug)]
pub enum Completion {
    Pixmap {
        request: PixmapRequest,
        result: Result<Pixmap, GeneratorFault>,
    },
    Text {
        id: RequestId,
        page: usize,
        text: Option<TextPage>,
    },
    /// Worker skipped a superseded request
    Cancelled(RequestId),
}

impl Completion {
    #[must_use]
    pub fn id(&self) -> RequestId {
        match self {
            Self::Pixmap { request, .. } => request.id,
            Self::Text { id, .. } | Self::Cancelled(id) => *id,
        }
    }
}

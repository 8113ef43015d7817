//! Document core: pages, viewport sync, observers and rendering dispatch

mod dispatch;
mod engine;
mod history;
mod link;
mod memory;
mod observer;
mod page;
mod request;
mod search;
mod text;
mod types;
mod viewport;

pub use engine::{Document, ExportError, OpenError};
pub use history::ViewportHistory;
pub use link::{Link, LinkAction};
pub use memory::{PixmapKey, PixmapMemory};
pub use observer::{ChangeFlags, DocumentObserver, ObserverRegistry};
pub use page::{Annotation, AnnotationId, Highlight, Page, TextSelection};
pub use request::{Completion, GeneratorFault, ObserverId, PixmapRequest, RequestId};
pub use search::{SearchId, SearchType};
pub use text::{CaseSensitivity, TextEntity, TextMatch, TextMatcher, TextPage};
pub use types::{Color, NormalizedRect, PageSize, Pixmap, Rotation};
pub use viewport::{AutoFit, ParseViewportError, Position, RePos, Viewport, VisiblePageRect};

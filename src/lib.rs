pub mod docdata;
pub mod document;
pub mod generator;
pub mod panic_handler;
pub mod settings;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use document::{Document, DocumentObserver, ObserverId, OpenError, Viewport};
pub use generator::{Generator, GeneratorRegistry};

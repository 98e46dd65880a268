// Export modules for use in tests
pub mod catalog;
pub mod panic_handler;
pub mod presenter;
pub mod settings;
pub mod viewer;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use catalog::{CatalogMode, CatalogSource, DocumentDescriptor, load_catalog_or_empty};
pub use viewer::{PresentationSink, ViewerFault, ViewerSession};

//! Progress-callback trait for per-page conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline walks the page images and exports the result.
//!
//! # Example
//!
//! ```rust
//! use scan2doc::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     fragments: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, fragments: usize) {
//!         self.fragments.fetch_add(fragments, Ordering::SeqCst);
//!         eprintln!("Page {}/{}: {} fragments", page_num, total_pages, fragments);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { fragments: AtomicUsize::new(0) });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::config::OutputFormat;
use std::sync::Arc;

/// Called by the conversion pipeline as it processes each page.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Pages are processed one at a time, but the callback
/// is shared behind an `Arc`, so it must be `Send + Sync`.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once after the input folder has been scanned.
    fn on_conversion_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called before layout detection runs for a page.
    ///
    /// # Arguments
    /// * `page_num`   : 1-indexed page number
    /// * `total_pages`: number of page images found
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page has been enriched and assembled.
    ///
    /// `fragments` is the number of regions that contributed markup; zero
    /// means the page is left out of the document.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, fragments: usize) {
        let _ = (page_num, total_pages, fragments);
    }

    /// Called for every recovered region- or page-level failure.
    fn on_page_warning(&self, page_num: usize, total_pages: usize, warning: &str) {
        let _ = (page_num, total_pages, warning);
    }

    /// Called when an exporter failed and the next format is about to be tried.
    fn on_export_fallback(&self, failed: OutputFormat, next: OutputFormat, reason: &str) {
        let _ = (failed, next, reason);
    }

    /// Called once after all pages have been attempted.
    ///
    /// # Arguments
    /// * `total_pages`  : number of page images found
    /// * `content_pages`: pages that produced at least one fragment
    fn on_conversion_complete(&self, total_pages: usize, content_pages: usize) {
        let _ = (total_pages, content_pages);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

//! Error types for the scan2doc library.
//!
//! Three layers of failure, from widest to narrowest blast radius:
//!
//! * [`Scan2DocError`] (Fatal): the run cannot produce a document at all
//!   (input folder missing, no images, terminal export failure). Returned as
//!   `Err(Scan2DocError)` from the top-level `convert*` functions.
//!
//! * [`RegionError`] (Non-fatal): one region (or one page image) could
//!   not be enriched. Logged and stored inside
//!   [`crate::output::PageResult::warnings`]; the page keeps every fragment
//!   that did succeed.
//!
//! * [`ExportError`] (Recoverable per format): one exporter failed and
//!   the next format in the fallback chain is tried.
//!
//! The capability traits (layout, OCR, cleanup) report their own small error
//! types which the pipeline folds into [`RegionError`].

use crate::config::OutputFormat;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the scan2doc library.
#[derive(Debug, Error)]
pub enum Scan2DocError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input directory was not found or is not a directory.
    #[error("Input folder not found: '{path}'\nCheck the path exists and is a directory.")]
    InputDirNotFound { path: PathBuf },

    /// The input directory holds no supported image files.
    #[error("No page images found in '{path}'\nSupported: .jpg .jpeg .png .bmp .tiff .tif")]
    NoImages { path: PathBuf },

    /// Every page came back empty, so there is nothing to write.
    #[error("Nothing to export: none of the {pages} page images produced any content")]
    NothingToExport { pages: usize },

    /// Requested output format string is not one of html, docx, pdf, tex.
    #[error("Unknown output format '{0}' (expected html, docx, pdf or tex)")]
    UnknownFormat(String),

    // ── Service errors ────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or reset the working directory for region images.
    #[error("Failed to prepare working directory '{path}': {source}")]
    WorkspaceFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Export errors ─────────────────────────────────────────────────────
    /// The last format in the fallback chain failed; no file was produced.
    #[error("Export failed: {format} generation failed with no fallback left: {detail}")]
    ExportFailed { format: OutputFormat, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page or region.
///
/// `region` is the region's position in the page's reading order.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum RegionError {
    /// The page image could not be decoded; the page contributes nothing.
    #[error("Page {page}: image unreadable: {detail}")]
    ImageUnreadable { page: usize, detail: String },

    /// Layout detection failed; the page is treated as having zero regions.
    #[error("Page {page}: layout detection failed: {detail}")]
    DetectionFailed { page: usize, detail: String },

    /// Cleanup service failed or timed out; the raw text was kept.
    #[error("Page {page} region {region}: cleanup service unavailable, kept raw text: {detail}")]
    CleanupUnavailable {
        page: usize,
        region: usize,
        detail: String,
    },

    /// Fallback OCR on the region crop failed.
    #[error("Page {page} region {region}: fallback OCR failed: {detail}")]
    OcrFailed {
        page: usize,
        region: usize,
        detail: String,
    },

    /// The region's box lies entirely outside the image after clamping.
    #[error("Page {page} region {region}: crop is empty after clamping")]
    CropEmpty { page: usize, region: usize },

    /// Writing the cropped region image failed.
    #[error("Page {page} region {region}: saving region image failed: {detail}")]
    SaveFailed {
        page: usize,
        region: usize,
        detail: String,
    },
}

/// Failure of one exporter. Always recoverable unless it is the last format
/// in the chain.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The capability needed for this format is not present in this build
    /// or could not be initialised.
    #[error("{format} export unavailable: {reason}")]
    Unavailable { format: OutputFormat, reason: String },

    /// Filesystem error while writing the output.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Rendering the document failed inside the format backend.
    #[error("{format} rendering failed: {detail}")]
    Render { format: OutputFormat, detail: String },
}

/// Error from a [`crate::pipeline::layout::LayoutEngine`].
#[derive(Debug, Error)]
pub enum LayoutError {
    /// No layout result exists for this image.
    #[error("no layout data for '{path}'")]
    Missing { path: PathBuf },

    /// Layout data exists but cannot be parsed.
    #[error("malformed layout data: {0}")]
    Malformed(String),

    /// Remote layout service failed.
    #[error("layout service error: {0}")]
    Service(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error from a [`crate::pipeline::llm::MarkupCleaner`].
#[derive(Debug, Error)]
pub enum CleanupError {
    /// The service answered with a failure (non-success status, API error).
    #[error("cleanup service error: {0}")]
    Service(String),

    /// The service answered with no usable text.
    #[error("cleanup service returned an empty response")]
    EmptyResponse,
}

/// Error from a [`crate::pipeline::llm::TextRecognizer`].
#[derive(Debug, Error)]
pub enum RecognizeError {
    #[error("image encoding failed: {0}")]
    Encode(String),

    #[error("recognition service error: {0}")]
    Service(String),

    #[error("recognition timed out after {secs}s")]
    Timeout { secs: u64 },
}

//! Result types returned by the conversion entry points.

use crate::config::OutputFormat;
use crate::error::RegionError;
use crate::export::ExportAttempt;
use crate::model::PageBody;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of one page image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-based position of the image in the input folder.
    pub page_num: usize,
    pub source: PathBuf,
    /// Regions the layout engine returned (after dropping degenerate boxes).
    pub regions: usize,
    /// Assembled body, or `None` when the page produced no content.
    pub body: Option<PageBody>,
    /// Recovered failures on this page, in the order they happened.
    pub warnings: Vec<RegionError>,
    pub duration_ms: u64,
}

impl PageResult {
    /// Number of fragments that made it into the page body.
    pub fn fragments(&self) -> usize {
        self.body.as_ref().map(|b| b.fragments.len()).unwrap_or(0)
    }

    pub fn has_content(&self) -> bool {
        self.body.is_some()
    }
}

/// Summary counters for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    pub total_pages: usize,
    /// Pages with at least one fragment.
    pub content_pages: usize,
    /// Pages left out because nothing survived enrichment.
    pub empty_pages: usize,
    pub total_regions: usize,
    pub total_fragments: usize,
    pub total_warnings: usize,
    pub total_duration_ms: u64,
}

impl ConversionStats {
    pub fn from_pages(pages: &[PageResult], total_duration_ms: u64) -> Self {
        let content_pages = pages.iter().filter(|p| p.has_content()).count();
        Self {
            total_pages: pages.len(),
            content_pages,
            empty_pages: pages.len() - content_pages,
            total_regions: pages.iter().map(|p| p.regions).sum(),
            total_fragments: pages.iter().map(PageResult::fragments).sum(),
            total_warnings: pages.iter().map(|p| p.warnings.len()).sum(),
            total_duration_ms,
        }
    }
}

/// Everything [`crate::convert`] produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// File that was written. Check its extension: it differs from the
    /// requested format when a fallback was taken.
    pub path: PathBuf,
    pub format: OutputFormat,
    pub requested: OutputFormat,
    pub mime_type: String,
    /// Formats that failed before `format` succeeded.
    pub export_attempts: Vec<ExportAttempt>,
    pub pages: Vec<PageResult>,
    pub stats: ConversionStats,
}

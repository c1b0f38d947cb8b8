//! Eager (full-document) conversion entry points.
//!
//! [`Converter`] owns the three external capabilities (layout engine, text
//! recognizer, cleanup service) plus the exporters, and walks a folder of page
//! images one page at a time. [`convert`] wires up the default capabilities
//! from a [`ConversionConfig`]; use [`Converter::new`] directly to plug in
//! your own. For page-by-page results see [`crate::stream::convert_stream`].

use crate::config::{mime_for_path, ConversionConfig};
use crate::error::{RegionError, Scan2DocError};
use crate::export::{export_document, Document, ExportContext, ExportOutcome, ExportRegistry};
use crate::model::PageBody;
use crate::output::{ConversionOutput, ConversionStats, PageResult};
use crate::pipeline::assemble::assemble_page;
use crate::pipeline::enrich::{enrich_region, EnrichContext};
use crate::pipeline::input::{discover_images, load_page_image, prepare_regions_dir, stage_images};
use crate::pipeline::layout::{extract_regions, LayoutEngine, SidecarLayout};
use crate::pipeline::llm::{resolve_provider, LlmCleaner, MarkupCleaner, TextRecognizer, VisionRecognizer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Scanned-page converter with explicit dependencies.
pub struct Converter {
    layout: Arc<dyn LayoutEngine>,
    recognizer: Option<Arc<dyn TextRecognizer>>,
    cleaner: Arc<dyn MarkupCleaner>,
    exporters: Arc<ExportRegistry>,
    config: ConversionConfig,
}

impl Converter {
    /// Build a converter from caller-owned capabilities and the default
    /// exporters. Pass `None` as `recognizer` to skip re-OCR of empty text
    /// regions.
    pub fn new(
        layout: Arc<dyn LayoutEngine>,
        recognizer: Option<Arc<dyn TextRecognizer>>,
        cleaner: Arc<dyn MarkupCleaner>,
        config: ConversionConfig,
    ) -> Self {
        Self {
            layout,
            recognizer,
            cleaner,
            exporters: Arc::new(ExportRegistry::default()),
            config,
        }
    }

    /// Default wiring: sidecar layout results, the configured LLM provider
    /// for cleanup, and the same provider for vision OCR when
    /// `ocr_fallback` is on.
    pub fn from_config(config: ConversionConfig) -> Result<Self, Scan2DocError> {
        Self::with_layout(Arc::new(SidecarLayout::new()), config)
    }

    /// Like [`Converter::from_config`] with a caller-chosen layout engine.
    pub fn with_layout(
        layout: Arc<dyn LayoutEngine>,
        config: ConversionConfig,
    ) -> Result<Self, Scan2DocError> {
        let provider = resolve_provider(&config)?;
        debug!(
            "Provider resolved (vision OCR fallback {})",
            if config.ocr_fallback { "on" } else { "off" }
        );

        let cleaner: Arc<dyn MarkupCleaner> = Arc::new(LlmCleaner::new(Arc::clone(&provider), &config));
        let recognizer: Option<Arc<dyn TextRecognizer>> = if config.ocr_fallback {
            Some(Arc::new(VisionRecognizer::new(provider, &config)))
        } else {
            None
        };
        Ok(Self::new(layout, recognizer, cleaner, config))
    }

    /// Replace the exporter registry, e.g. to plug in another Word backend.
    pub fn with_exporters(mut self, exporters: ExportRegistry) -> Self {
        self.exporters = Arc::new(exporters);
        self
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Find the page images and prepare the regions directory for a run
    /// writing to `output_path`.
    pub fn prepare(
        &self,
        input_dir: &Path,
        output_path: &Path,
    ) -> Result<(Vec<PathBuf>, PathBuf), Scan2DocError> {
        let images = discover_images(input_dir)?;
        if images.is_empty() {
            return Err(Scan2DocError::NoImages {
                path: input_dir.to_path_buf(),
            });
        }
        let regions_dir = self.config.regions_dir(output_path);
        prepare_regions_dir(&regions_dir, self.config.reset_regions_dir)?;
        Ok((images, regions_dir))
    }

    /// Run one page image through layout, enrichment and assembly.
    ///
    /// Never fails: every problem is recorded in [`PageResult::warnings`]
    /// and the page keeps whatever fragments succeeded.
    pub async fn process_page(
        &self,
        source: &Path,
        page_num: usize,
        total_pages: usize,
        regions_dir: &Path,
    ) -> PageResult {
        let start = Instant::now();
        let cb = self.config.progress_callback.as_ref();
        if let Some(cb) = cb {
            cb.on_page_start(page_num, total_pages);
        }
        info!("Page {}/{}: {}", page_num, total_pages, source.display());

        let mut warnings = Vec::new();
        let mut fragments = Vec::new();
        let mut region_count = 0;

        match decode(source).await {
            Ok(image) => {
                let (regions, err) =
                    extract_regions(self.layout.as_ref(), &image, source, page_num).await;
                warnings.extend(err);
                region_count = regions.len();
                debug!("Page {}: {} regions", page_num, regions.len());

                let ctx = EnrichContext {
                    cleaner: self.cleaner.as_ref(),
                    recognizer: self.recognizer.as_deref(),
                    regions_dir,
                    api_timeout: self.config.api_timeout,
                };
                for (index, region) in regions.iter().enumerate() {
                    let enriched = enrich_region(&ctx, &image, region, page_num, index).await;
                    fragments.extend(enriched.fragment);
                    warnings.extend(enriched.warnings);
                }
            }
            Err(detail) => {
                warn!("Page {}: cannot decode {} — {}", page_num, source.display(), detail);
                warnings.push(RegionError::ImageUnreadable {
                    page: page_num,
                    detail,
                });
            }
        }

        if let Some(cb) = cb {
            for w in &warnings {
                cb.on_page_warning(page_num, total_pages, &w.to_string());
            }
        }

        let body = assemble_page(page_num, fragments);
        let fragment_count = body.as_ref().map(|b| b.fragments.len()).unwrap_or(0);
        if body.is_none() {
            info!("Page {}: no content, omitted", page_num);
        }
        if let Some(cb) = cb {
            cb.on_page_complete(page_num, total_pages, fragment_count);
        }

        PageResult {
            page_num,
            source: source.to_path_buf(),
            regions: region_count,
            body,
            warnings,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Export assembled pages, falling back along the configured format's
    /// chain. Rendering runs on the blocking pool.
    pub async fn export_pages(
        &self,
        pages: Vec<PageBody>,
        output_path: &Path,
    ) -> Result<ExportOutcome, Scan2DocError> {
        if pages.is_empty() {
            return Err(Scan2DocError::NothingToExport { pages: 0 });
        }
        let doc = Document::from_pages(&pages);
        let ctx = ExportContext::new(output_path, &self.config);
        let exporters = Arc::clone(&self.exporters);
        let requested = self.config.output_format;
        let progress = self.config.progress_callback.clone();

        tokio::task::spawn_blocking(move || {
            export_document(&exporters, &doc, &ctx, requested, progress.as_ref())
        })
        .await
        .map_err(|e| Scan2DocError::Internal(format!("export task failed: {}", e)))?
    }

    /// Convert every page image in `input_dir` and write the document to
    /// `output_path` (its extension is replaced by the produced format's).
    pub async fn convert_folder(
        &self,
        input_dir: &Path,
        output_path: &Path,
    ) -> Result<ConversionOutput, Scan2DocError> {
        let total_start = Instant::now();
        info!("Starting conversion: {}", input_dir.display());

        let (images, regions_dir) = self.prepare(input_dir, output_path)?;
        let total = images.len();
        if let Some(cb) = &self.config.progress_callback {
            cb.on_conversion_start(total);
        }

        let mut pages = Vec::with_capacity(total);
        for (i, source) in images.iter().enumerate() {
            pages.push(self.process_page(source, i + 1, total, &regions_dir).await);
        }

        let bodies: Vec<PageBody> = pages.iter().filter_map(|p| p.body.clone()).collect();
        if let Some(cb) = &self.config.progress_callback {
            cb.on_conversion_complete(total, bodies.len());
        }
        if bodies.is_empty() {
            return Err(Scan2DocError::NothingToExport { pages: total });
        }

        let outcome = self.export_pages(bodies, output_path).await?;
        let stats = ConversionStats::from_pages(&pages, total_start.elapsed().as_millis() as u64);
        info!(
            "Conversion complete: {}/{} pages with content, {} warnings, {}ms",
            stats.content_pages, stats.total_pages, stats.total_warnings, stats.total_duration_ms
        );

        Ok(ConversionOutput {
            mime_type: mime_for_path(&outcome.path).to_string(),
            path: outcome.path,
            format: outcome.format,
            requested: outcome.requested,
            export_attempts: outcome.attempts,
            pages,
            stats,
        })
    }

    /// Convert page images held in memory as `(file name, bytes)`, in the
    /// given order. They are staged in a temp folder for the run, together
    /// with any `<stem>.json` layout sidecars in the list.
    pub async fn convert_images(
        &self,
        images: &[(String, Vec<u8>)],
        output_path: &Path,
    ) -> Result<ConversionOutput, Scan2DocError> {
        let staged = stage_images(images)?;
        self.convert_folder(staged.path(), output_path).await
    }
}

/// Decode on the blocking pool; image decoding is CPU-bound.
async fn decode(source: &Path) -> Result<image::DynamicImage, String> {
    let path = source.to_path_buf();
    tokio::task::spawn_blocking(move || load_page_image(&path))
        .await
        .map_err(|e| format!("decode task failed: {}", e))?
}

/// Convert a folder of scanned page images into one document.
///
/// This is the primary entry point for the library. Layout results are read
/// from sidecar JSON files next to the images, and the LLM provider is
/// resolved from `config` or the environment.
///
/// # Errors
/// Only fatal problems are errors: missing or empty input folder, no page
/// with content, provider not configured, or the final fallback format
/// failing. Per-region failures are in [`PageResult::warnings`].
pub async fn convert(
    input_dir: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Scan2DocError> {
    Converter::from_config(config.clone())?
        .convert_folder(input_dir.as_ref(), output_path.as_ref())
        .await
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_dir: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Scan2DocError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Scan2DocError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input_dir, output_path, config))
}

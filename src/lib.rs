//! # scan2doc
//!
//! Turn a folder of scanned page images into one structured document: HTML,
//! Word, PDF (via Word) or LaTeX.
//!
//! ## Pipeline Overview
//!
//! ```text
//! page images
//!  │
//!  ├─ 1. Input     discover *.jpg/*.png/…, sorted by name; reset regions dir
//!  ├─ 2. Layout    regions + OCR lines per page, sorted top-to-bottom, left-to-right
//!  ├─ 3. Enrich    text/title → LLM cleanup (raw text on failure)
//!  │               table/figure/image/formula → JPEG crop + figure reference
//!  ├─ 4. Assemble  "第 N 页" header + fragments; blank pages dropped
//!  └─ 5. Export    markup parsed once, rendered with format fallback
//!                  html → tex, pdf → html → tex, docx → tex
//! ```
//!
//! Layout detection, text cleanup and OCR are capabilities behind the
//! [`LayoutEngine`], [`MarkupCleaner`] and [`TextRecognizer`] traits. The
//! defaults read PP-Structure style sidecar JSON next to each image and call
//! an LLM through `edgequake-llm`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scan2doc::{convert, ConversionConfig, OutputFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from the environment (DEEPSEEK_API_KEY, OPENAI_API_KEY, …)
//!     let config = ConversionConfig::builder()
//!         .output_format(OutputFormat::Docx)
//!         .build()?;
//!     let output = convert("scans/", "out/report", &config).await?;
//!     println!("{} ({})", output.path.display(), output.mime_type);
//!     if output.format != output.requested {
//!         eprintln!("fell back to {}", output.format);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `scan2doc` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `docx`  | on      | Word writer via `docx-rs`; without it docx/pdf requests fall back |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! scan2doc = { version = "0.1", default-features = false, features = ["docx"] }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod export;
pub mod markup;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{mime_for_path, ConversionConfig, ConversionConfigBuilder, OutputFormat};
pub use convert::{convert, convert_sync, Converter};
pub use error::{ExportError, RegionError, Scan2DocError};
pub use export::{ExportOutcome, ExportRegistry, Exporter};
pub use model::{BoundingBox, EnrichedFragment, PageBody, Region, RegionKind};
pub use output::{ConversionOutput, ConversionStats, PageResult};
pub use pipeline::layout::{HttpLayout, LayoutEngine, SidecarLayout};
pub use pipeline::llm::{LlmCleaner, MarkupCleaner, TextRecognizer, VisionRecognizer};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{convert_stream, PageStream};

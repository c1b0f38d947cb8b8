//! Document export: one [`Exporter`] per output format, tried in the order
//! given by [`OutputFormat::fallback_chain`].
//!
//! Page markup is parsed once into [`Block`]s when the [`Document`] is built;
//! every renderer reads the same blocks. TeX is the exception: it writes the
//! markup itself, which is why it is the terminal fallback of every chain.
//!
//! ```text
//! html ─▶ tex
//! pdf  ─▶ html ─▶ tex
//! docx ─▶ tex
//! tex
//! ```

pub mod docx;
pub mod html;
pub mod tex;
pub mod word;

use crate::config::{ConversionConfig, OutputFormat};
use crate::error::{ExportError, Scan2DocError};
use crate::markup::{is_region_path, parse_fragment, Block};
use crate::model::{page_title, PageBody};
use crate::pipeline::assemble::join_pages;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub use docx::DocxWriterFactory;
pub use html::HtmlExporter;
pub use tex::TexExporter;
pub use word::{DocumentWriter, WordExporter, WriterFactory};

/// Renders a [`Document`] in one format.
pub trait Exporter: Send + Sync {
    fn format(&self) -> OutputFormat;

    /// Write the document and return the path of the produced file.
    fn export(&self, doc: &Document, ctx: &ExportContext) -> Result<PathBuf, ExportError>;
}

/// One page of the document, parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentPage {
    /// 1-based index of the source image.
    pub index: usize,
    pub blocks: Vec<Block>,
}

impl DocumentPage {
    pub fn title(&self) -> String {
        page_title(self.index)
    }
}

/// Everything the exporters render from.
#[derive(Debug, Clone)]
pub struct Document {
    pub pages: Vec<DocumentPage>,
    /// Joined page markup, written verbatim by the TeX exporter.
    pub markup: String,
}

impl Document {
    /// Parse the assembled pages. Fragments are parsed one by one so a
    /// malformed fragment cannot swallow its neighbours.
    pub fn from_pages(pages: &[PageBody]) -> Self {
        let parsed = pages
            .iter()
            .map(|p| DocumentPage {
                index: p.index,
                blocks: p
                    .fragments
                    .iter()
                    .flat_map(|f| parse_fragment(&f.markup))
                    .collect(),
            })
            .collect();
        Self {
            pages: parsed,
            markup: join_pages(pages),
        }
    }
}

/// Where and how to write the output.
#[derive(Debug, Clone)]
pub struct ExportContext {
    /// Output path without a format extension.
    pub output_base: PathBuf,
    /// Directory the saved region images live in.
    pub regions_dir: PathBuf,
    pub title: String,
    pub author: String,
    pub picture_width_inches: f32,
}

impl ExportContext {
    /// Build from the user's output path. A known format extension on it
    /// (`report.html`) is dropped; anything else is kept as part of the name.
    pub fn new(output_path: &Path, config: &ConversionConfig) -> Self {
        Self {
            output_base: output_base(output_path),
            regions_dir: config.regions_dir(output_path),
            title: config.title.clone(),
            author: config.author.clone(),
            picture_width_inches: config.picture_width_inches,
        }
    }

    /// `<base>.<ext>` for a format.
    pub fn output_file(&self, format: OutputFormat) -> PathBuf {
        self.with_suffix(format.extension())
    }

    /// `<base>.<suffix>`, for auxiliary files such as `.tex.content`.
    pub fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut s: OsString = self.output_base.clone().into_os_string();
        s.push(".");
        s.push(suffix);
        PathBuf::from(s)
    }

    /// Existing region image for a figure path, or `None` when the path is
    /// missing or would leave the regions directory.
    pub fn region_image(&self, rel_path: &str) -> Option<PathBuf> {
        if !is_region_path(rel_path) {
            warn!("Refusing figure path outside the regions directory: {}", rel_path);
            return None;
        }
        Some(self.regions_dir.join(rel_path)).filter(|p| p.is_file())
    }

    /// Directory the output files are written to.
    pub fn output_dir(&self) -> PathBuf {
        match self.output_base.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

fn output_base(path: &Path) -> PathBuf {
    let known = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.parse::<OutputFormat>().is_ok())
        .unwrap_or(false);
    if known {
        path.with_extension("")
    } else {
        path.to_path_buf()
    }
}

/// A failed export attempt, kept for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportAttempt {
    pub format: OutputFormat,
    pub error: String,
}

/// Result of [`export_document`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportOutcome {
    pub path: PathBuf,
    /// Format actually produced.
    pub format: OutputFormat,
    /// Format the caller asked for.
    pub requested: OutputFormat,
    /// Formats that failed before `format` succeeded.
    pub attempts: Vec<ExportAttempt>,
}

impl ExportOutcome {
    pub fn fell_back(&self) -> bool {
        self.format != self.requested
    }
}

/// The exporters available to a run, one per format.
pub struct ExportRegistry {
    exporters: Vec<Box<dyn Exporter>>,
}

impl ExportRegistry {
    /// Registry whose Word and PDF exporters use `factory`.
    pub fn with_writer_factory(factory: Arc<dyn WriterFactory>) -> Self {
        Self {
            exporters: vec![
                Box::new(HtmlExporter),
                Box::new(WordExporter::docx(Arc::clone(&factory))),
                Box::new(WordExporter::pdf(factory)),
                Box::new(TexExporter),
            ],
        }
    }

    /// Replace (or add) the exporter for its format.
    pub fn register(&mut self, exporter: Box<dyn Exporter>) {
        let format = exporter.format();
        self.exporters.retain(|e| e.format() != format);
        self.exporters.push(exporter);
    }

    pub fn get(&self, format: OutputFormat) -> Option<&dyn Exporter> {
        self.exporters
            .iter()
            .find(|e| e.format() == format)
            .map(|e| e.as_ref())
    }
}

impl Default for ExportRegistry {
    fn default() -> Self {
        Self::with_writer_factory(Arc::new(DocxWriterFactory))
    }
}

/// Export `doc` in `requested` format, falling back along its chain.
///
/// Only the last format's failure is fatal.
pub fn export_document(
    registry: &ExportRegistry,
    doc: &Document,
    ctx: &ExportContext,
    requested: OutputFormat,
    progress: Option<&ProgressCallback>,
) -> Result<ExportOutcome, Scan2DocError> {
    let chain = requested.fallback_chain();
    let mut attempts = Vec::new();

    for (i, &format) in chain.iter().enumerate() {
        let result = match registry.get(format) {
            Some(exporter) => exporter.export(doc, ctx),
            None => Err(ExportError::Unavailable {
                format,
                reason: "no exporter registered".into(),
            }),
        };

        match result {
            Ok(path) => {
                info!("Wrote {} ({})", path.display(), format);
                return Ok(ExportOutcome {
                    path,
                    format,
                    requested,
                    attempts,
                });
            }
            Err(e) => {
                let detail = e.to_string();
                match chain.get(i + 1) {
                    Some(&next) => {
                        warn!("{} export failed, trying {} — {}", format, next, detail);
                        if let Some(cb) = progress {
                            cb.on_export_fallback(format, next, &detail);
                        }
                        attempts.push(ExportAttempt {
                            format,
                            error: detail,
                        });
                    }
                    None => return Err(Scan2DocError::ExportFailed { format, detail }),
                }
            }
        }
    }

    Err(Scan2DocError::Internal(format!(
        "empty fallback chain for {}",
        requested
    )))
}

/// Write `bytes` to `path` via a temp file and rename, so readers never see
/// a partial file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ExportError> {
    let io_err = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut tmp: OsString = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, bytes).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        io_err(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EnrichedFragment, RegionKind};

    struct Failing(OutputFormat);

    impl Exporter for Failing {
        fn format(&self) -> OutputFormat {
            self.0
        }
        fn export(&self, _: &Document, _: &ExportContext) -> Result<PathBuf, ExportError> {
            Err(ExportError::Render {
                format: self.0,
                detail: "boom".into(),
            })
        }
    }

    fn sample_doc() -> Document {
        Document::from_pages(&[PageBody {
            index: 1,
            fragments: vec![
                EnrichedFragment {
                    kind: RegionKind::Title,
                    markup: "\\section{概述}".into(),
                },
                EnrichedFragment {
                    kind: RegionKind::Text,
                    markup: "正文".into(),
                },
            ],
        }])
    }

    fn ctx(dir: &Path) -> ExportContext {
        ExportContext::new(&dir.join("out.html"), &ConversionConfig::default())
    }

    #[test]
    fn output_base_strips_known_extensions_only() {
        assert_eq!(output_base(Path::new("a/report.docx")), PathBuf::from("a/report"));
        assert_eq!(output_base(Path::new("a/report.v2")), PathBuf::from("a/report.v2"));
        assert_eq!(output_base(Path::new("report")), PathBuf::from("report"));
    }

    #[test]
    fn output_file_appends_extension() {
        let c = ExportContext::new(Path::new("/tmp/x/report.v2"), &ConversionConfig::default());
        assert_eq!(c.output_file(OutputFormat::Tex), PathBuf::from("/tmp/x/report.v2.tex"));
        assert_eq!(c.with_suffix("tex.content"), PathBuf::from("/tmp/x/report.v2.tex.content"));
        assert_eq!(c.regions_dir, PathBuf::from("/tmp/x/processed_regions"));
    }

    #[test]
    fn document_parses_each_page_once() {
        let doc = sample_doc();
        assert_eq!(doc.pages.len(), 1);
        assert_eq!(doc.pages[0].blocks.len(), 2);
        assert!(doc.markup.starts_with("\\subsection{第 1 页}"));
    }

    #[test]
    fn falls_back_to_next_format() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = ExportRegistry::default();
        reg.register(Box::new(Failing(OutputFormat::Html)));

        let out = export_document(&reg, &sample_doc(), &ctx(dir.path()), OutputFormat::Html, None).unwrap();
        assert_eq!(out.format, OutputFormat::Tex);
        assert!(out.fell_back());
        assert_eq!(out.attempts.len(), 1);
        assert_eq!(out.path.extension().unwrap(), "tex");
    }

    #[test]
    fn terminal_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = ExportRegistry::default();
        reg.register(Box::new(Failing(OutputFormat::Tex)));

        let err = export_document(&reg, &sample_doc(), &ctx(dir.path()), OutputFormat::Tex, None).unwrap_err();
        assert!(matches!(err, Scan2DocError::ExportFailed { format: OutputFormat::Tex, .. }));
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.html");
        write_atomic(&path, b"<html></html>").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"<html></html>");
        assert!(!dir.path().join("nested/out.html.tmp").exists());
    }
}

//! Word-style renderer over the [`DocumentWriter`] capability.
//!
//! The same rendering serves two formats: `docx` writes `<base>.docx`, and
//! `pdf` writes the same `.docx` as the hand-off to an external PDF printer
//! (Word's "Save as PDF", LibreOffice `--convert-to pdf`). Whether a writer
//! exists at all is decided by the [`WriterFactory`]; when it cannot create
//! one the exporter fails with [`ExportError::Unavailable`] and the fallback
//! chain moves on.

use super::{write_atomic, Document, ExportContext, Exporter};
use crate::config::OutputFormat;
use crate::error::ExportError;
use crate::markup::{Block, Inline};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// A word-processor document under construction.
pub trait DocumentWriter {
    /// Level 0 is the document title; 1..=3 are section levels.
    fn add_heading(&mut self, text: &str, level: u8);

    fn add_paragraph(&mut self, runs: &[Inline]);

    fn add_caption(&mut self, text: &str);

    /// Embed the image at `path`, scaled to `width_inches`.
    fn add_picture(&mut self, path: &Path, width_inches: f32) -> Result<(), String>;

    fn add_table(&mut self, rows: &[Vec<String>]);

    fn add_page_break(&mut self);

    /// Serialise the finished document.
    fn finish(self: Box<Self>) -> Result<Vec<u8>, String>;
}

/// Creates a fresh [`DocumentWriter`] per export.
pub trait WriterFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn DocumentWriter>, String>;
}

pub struct WordExporter {
    format: OutputFormat,
    factory: Arc<dyn WriterFactory>,
}

impl WordExporter {
    pub fn docx(factory: Arc<dyn WriterFactory>) -> Self {
        Self {
            format: OutputFormat::Docx,
            factory,
        }
    }

    pub fn pdf(factory: Arc<dyn WriterFactory>) -> Self {
        Self {
            format: OutputFormat::Pdf,
            factory,
        }
    }
}

impl Exporter for WordExporter {
    fn format(&self) -> OutputFormat {
        self.format
    }

    fn export(&self, doc: &Document, ctx: &ExportContext) -> Result<PathBuf, ExportError> {
        let mut writer = self.factory.create().map_err(|reason| ExportError::Unavailable {
            format: self.format,
            reason,
        })?;

        render(writer.as_mut(), doc, ctx);

        let bytes = writer.finish().map_err(|detail| ExportError::Render {
            format: self.format,
            detail,
        })?;

        let path = ctx.output_file(OutputFormat::Docx);
        write_atomic(&path, &bytes)?;
        if self.format == OutputFormat::Pdf {
            info!(
                "PDF requested: {} is ready to print to PDF from Word or LibreOffice",
                path.display()
            );
        }
        Ok(path)
    }
}

/// Walk the document into a writer.
pub fn render(writer: &mut dyn DocumentWriter, doc: &Document, ctx: &ExportContext) {
    writer.add_heading(&ctx.title, 0);

    for page in &doc.pages {
        writer.add_heading(&page.title(), 2);
        for block in &page.blocks {
            match block {
                Block::Heading { level, text } => writer.add_heading(text, (*level).clamp(1, 3)),
                Block::Paragraph(runs) => writer.add_paragraph(runs),
                Block::Figure { path, caption } => {
                    if let Some(rel) = path {
                        if let Some(source) = ctx.region_image(rel) {
                            if let Err(e) = writer.add_picture(&source, ctx.picture_width_inches) {
                                warn!("Embedding {} failed: {}", source.display(), e);
                                writer.add_paragraph(&[Inline::Text(format!("[图片: {}]", rel))]);
                            }
                        }
                    }
                    if let Some(caption) = caption {
                        writer.add_caption(caption);
                    }
                }
                Block::Table { rows, caption } => {
                    writer.add_table(rows);
                    if let Some(caption) = caption {
                        writer.add_caption(caption);
                    }
                }
            }
        }
        writer.add_page_break();
    }
}

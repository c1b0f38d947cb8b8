//! TeX renderer: the page markup inside a fixed article preamble.
//!
//! This is the terminal fallback of every export chain, so it depends on
//! nothing but the filesystem. Besides `<base>.tex` it writes
//! `<base>.tex.content` with the body alone, for pasting into another
//! document.

use super::{write_atomic, Document, ExportContext, Exporter};
use crate::config::OutputFormat;
use crate::error::ExportError;
use crate::markup::escape;
use std::path::PathBuf;

pub struct TexExporter;

impl Exporter for TexExporter {
    fn format(&self) -> OutputFormat {
        OutputFormat::Tex
    }

    fn export(&self, doc: &Document, ctx: &ExportContext) -> Result<PathBuf, ExportError> {
        let path = ctx.output_file(OutputFormat::Tex);
        write_atomic(&path, render(doc, ctx).as_bytes())?;
        write_atomic(&ctx.with_suffix("tex.content"), doc.markup.as_bytes())?;
        Ok(path)
    }
}

/// Full `.tex` source.
pub fn render(doc: &Document, ctx: &ExportContext) -> String {
    let graphics_dir = ctx
        .regions_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut out = String::with_capacity(doc.markup.len() + 1024);
    out.push_str(
        "\\documentclass[12pt]{article}\n\
         \\usepackage[utf8]{inputenc}\n\
         \\usepackage{graphicx}\n\
         \\usepackage{float}\n\
         \\usepackage{amsmath}\n\
         \\usepackage{amsfonts}\n\
         \\usepackage{amssymb}\n\
         \\usepackage{booktabs}\n\
         \\usepackage{array}\n\
         \\usepackage{longtable}\n\
         \\usepackage{xcolor}\n\
         \\usepackage{geometry}\n\
         \\geometry{a4paper, margin=2.5cm}\n",
    );
    if !graphics_dir.is_empty() {
        out.push_str(&format!("\\graphicspath{{{{{}/}}}}\n", graphics_dir));
    }
    out.push_str(&format!(
        "\n\\title{{{}}}\n\\author{{{}}}\n\\date{{\\today}}\n\n",
        escape(&ctx.title),
        escape(&ctx.author)
    ));
    out.push_str("\\begin{document}\n\n\\maketitle\n\n");
    out.push_str(&doc.markup);
    out.push_str("\n\n\\end{document}\n");
    out
}

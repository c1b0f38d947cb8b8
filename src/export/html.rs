//! HTML renderer.
//!
//! A single self-contained page with inline CSS. Region images are copied
//! next to the HTML file (`table/page_1_region_2.jpg` becomes
//! `table_page_1_region_2.jpg`) so the output directory can be moved as a
//! unit.

use super::{write_atomic, Document, ExportContext, Exporter};
use crate::config::OutputFormat;
use crate::error::ExportError;
use crate::markup::{Block, Inline};
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::{debug, warn};

const STYLE: &str = "body{font-family:\"Microsoft YaHei\",\"PingFang SC\",Arial,sans-serif;max-width:900px;margin:0 auto;padding:20px;line-height:1.6}\
h1{color:#2c3e50;border-bottom:2px solid #3498db;padding-bottom:10px}\
h2{color:#34495e;margin-top:30px}\
h2.page{color:#7f8c8d;font-size:1.1em;border-top:1px dashed #ccc;padding-top:10px}\
img{max-width:100%;height:auto;margin:20px 0;border:1px solid #ddd}\
p{margin:10px 0;text-indent:2em}\
p.caption{text-align:center;font-style:italic;color:#666;text-indent:0}\
table{border-collapse:collapse;margin:20px auto}\
td{border:1px solid #999;padding:4px 8px}";

pub struct HtmlExporter;

impl Exporter for HtmlExporter {
    fn format(&self) -> OutputFormat {
        OutputFormat::Html
    }

    fn export(&self, doc: &Document, ctx: &ExportContext) -> Result<PathBuf, ExportError> {
        let path = ctx.output_file(OutputFormat::Html);
        let html = render(doc, ctx);
        write_atomic(&path, html.as_bytes())?;
        Ok(path)
    }
}

/// Render the document, copying referenced region images into the output
/// directory as a side effect.
pub fn render(doc: &Document, ctx: &ExportContext) -> String {
    let mut out = String::with_capacity(4096);
    let title = escape_html(&ctx.title);

    out.push_str("<!DOCTYPE html>\n<html lang=\"zh-CN\">\n<head>\n<meta charset=\"UTF-8\">\n");
    let _ = writeln!(out, "<meta name=\"author\" content=\"{}\">", escape_html(&ctx.author));
    let _ = writeln!(out, "<title>{}</title>", title);
    let _ = writeln!(out, "<style>{}</style>", STYLE);
    out.push_str("</head>\n<body>\n");
    let _ = writeln!(out, "<h1>{}</h1>", title);

    for page in &doc.pages {
        let _ = writeln!(out, "<h2 class=\"page\">{}</h2>", escape_html(&page.title()));
        for block in &page.blocks {
            render_block(&mut out, block, ctx);
        }
    }

    out.push_str("</body>\n</html>\n");
    out
}

fn render_block(out: &mut String, block: &Block, ctx: &ExportContext) {
    match block {
        Block::Heading { level, text } => {
            let tag = match level {
                1 => "h2",
                2 => "h3",
                _ => "h4",
            };
            let _ = writeln!(out, "<{tag}>{}</{tag}>", escape_html(text));
        }
        Block::Paragraph(inlines) => {
            out.push_str("<p>");
            for inline in inlines {
                match inline {
                    Inline::Text(t) => out.push_str(&escape_html(t)),
                    Inline::Bold(t) => {
                        let _ = write!(out, "<strong>{}</strong>", escape_html(t));
                    }
                    Inline::Italic(t) => {
                        let _ = write!(out, "<em>{}</em>", escape_html(t));
                    }
                }
            }
            out.push_str("</p>\n");
        }
        Block::Figure { path, caption } => {
            if let Some(src) = path.as_deref().and_then(|p| copy_image(p, ctx)) {
                let alt = caption.as_deref().unwrap_or("图片");
                let _ = writeln!(
                    out,
                    "<img src=\"{}\" alt=\"{}\">",
                    escape_html(&src),
                    escape_html(alt)
                );
            }
            if let Some(caption) = caption {
                let _ = writeln!(out, "<p class=\"caption\">{}</p>", escape_html(caption));
            }
        }
        Block::Table { rows, caption } => {
            out.push_str("<table>\n");
            for row in rows {
                out.push_str("<tr>");
                for cell in row {
                    let _ = write!(out, "<td>{}</td>", escape_html(cell));
                }
                out.push_str("</tr>\n");
            }
            out.push_str("</table>\n");
            if let Some(caption) = caption {
                let _ = writeln!(out, "<p class=\"caption\">{}</p>", escape_html(caption));
            }
        }
    }
}

/// Copy a region image next to the output; returns the `src` to use, or
/// `None` when the image is missing or outside the regions directory.
fn copy_image(rel_path: &str, ctx: &ExportContext) -> Option<String> {
    let Some(source) = ctx.region_image(rel_path) else {
        debug!("Image {} unavailable, keeping caption only", rel_path);
        return None;
    };
    let name = flat_image_name(rel_path);
    let target = ctx.output_dir().join(&name);
    if let Err(e) = std::fs::copy(&source, &target) {
        warn!("Copying {} → {} failed: {}", source.display(), target.display(), e);
        return None;
    }
    Some(name)
}

/// `table/page_1_region_2.jpg` → `table_page_1_region_2.jpg`.
pub fn flat_image_name(rel_path: &str) -> String {
    rel_path.replace(['/', '\\'], "_")
}

/// Escape the five HTML-significant characters.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

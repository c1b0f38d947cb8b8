//! `.docx` writer backed by `docx-rs`, compiled in with the `docx` feature.
//!
//! Without the feature, [`DocxWriterFactory`] reports itself unavailable and
//! Word/PDF requests fall back along their chains.

use super::word::{DocumentWriter, WriterFactory};

/// Default [`WriterFactory`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DocxWriterFactory;

#[cfg(feature = "docx")]
impl WriterFactory for DocxWriterFactory {
    fn create(&self) -> Result<Box<dyn DocumentWriter>, String> {
        Ok(Box::new(backend::DocxWriter::default()))
    }
}

#[cfg(not(feature = "docx"))]
impl WriterFactory for DocxWriterFactory {
    fn create(&self) -> Result<Box<dyn DocumentWriter>, String> {
        Err("built without the `docx` feature".into())
    }
}

#[cfg(feature = "docx")]
mod backend {
    use super::DocumentWriter;
    use crate::markup::Inline;
    use docx_rs::{
        AlignmentType, BreakType, Docx, Paragraph, Pic, Run, Style, StyleType, Table, TableCell,
        TableRow,
    };
    use std::io::Cursor;
    use std::path::Path;

    const EMU_PER_INCH: f32 = 914_400.0;

    /// Heading style ids and their sizes in half-points; index 0 is the title.
    const HEADINGS: [(&str, &str, usize); 4] = [
        ("Title", "Title", 44),
        ("Heading1", "Heading 1", 32),
        ("Heading2", "Heading 2", 28),
        ("Heading3", "Heading 3", 24),
    ];

    enum Item {
        Paragraph(Paragraph),
        Table(Table),
    }

    #[derive(Default)]
    pub(super) struct DocxWriter {
        items: Vec<Item>,
    }

    impl DocxWriter {
        fn push(&mut self, p: Paragraph) {
            self.items.push(Item::Paragraph(p));
        }
    }

    impl DocumentWriter for DocxWriter {
        fn add_heading(&mut self, text: &str, level: u8) {
            let (id, _, _) = HEADINGS[usize::from(level.min(3))];
            let mut p = Paragraph::new().add_run(Run::new().add_text(text)).style(id);
            if level == 0 {
                p = p.align(AlignmentType::Center);
            }
            self.push(p);
        }

        fn add_paragraph(&mut self, runs: &[Inline]) {
            let p = runs.iter().fold(Paragraph::new(), |p, inline| {
                let run = Run::new().add_text(inline.text());
                p.add_run(match inline {
                    Inline::Text(_) => run,
                    Inline::Bold(_) => run.bold(),
                    Inline::Italic(_) => run.italic(),
                })
            });
            self.push(p);
        }

        fn add_caption(&mut self, text: &str) {
            self.push(
                Paragraph::new()
                    .add_run(Run::new().add_text(text))
                    .style("Caption")
                    .align(AlignmentType::Center),
            );
        }

        fn add_picture(&mut self, path: &Path, width_inches: f32) -> Result<(), String> {
            let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
            // docx-rs decodes the image itself and does not report failures.
            let (w, h) = image::load_from_memory(&bytes)
                .map(|img| (img.width(), img.height()))
                .map_err(|e| e.to_string())?;
            if w == 0 || h == 0 {
                return Err("image has no pixels".into());
            }

            let width_emu = (width_inches * EMU_PER_INCH) as u32;
            let height_emu = (width_emu as f64 * h as f64 / w as f64) as u32;
            let pic = Pic::new(&bytes).size(width_emu, height_emu);
            self.push(
                Paragraph::new()
                    .add_run(Run::new().add_image(pic))
                    .align(AlignmentType::Center),
            );
            Ok(())
        }

        fn add_table(&mut self, rows: &[Vec<String>]) {
            let rows = rows
                .iter()
                .map(|row| {
                    TableRow::new(
                        row.iter()
                            .map(|cell| {
                                TableCell::new()
                                    .add_paragraph(Paragraph::new().add_run(Run::new().add_text(cell)))
                            })
                            .collect(),
                    )
                })
                .collect();
            self.items.push(Item::Table(Table::new(rows)));
        }

        fn add_page_break(&mut self) {
            self.push(Paragraph::new().add_run(Run::new().add_break(BreakType::Page)));
        }

        fn finish(self: Box<Self>) -> Result<Vec<u8>, String> {
            let mut docx = HEADINGS.iter().fold(Docx::new(), |d, &(id, name, size)| {
                d.add_style(Style::new(id, StyleType::Paragraph).name(name).size(size).bold())
            });
            docx = docx.add_style(
                Style::new("Caption", StyleType::Paragraph)
                    .name("Caption")
                    .size(20)
                    .italic(),
            );

            for item in self.items {
                docx = match item {
                    Item::Paragraph(p) => docx.add_paragraph(p),
                    Item::Table(t) => docx.add_table(t),
                };
            }

            let mut buf = Cursor::new(Vec::new());
            docx.build().pack(&mut buf).map_err(|e| e.to_string())?;
            Ok(buf.into_inner())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use image::{DynamicImage, ImageFormat};

        #[test]
        fn produces_zip_container() {
            let mut w = Box::new(DocxWriter::default());
            w.add_heading("标题", 0);
            w.add_heading("第 1 页", 2);
            w.add_paragraph(&[Inline::Text("正文".into()), Inline::Bold("重点".into())]);
            w.add_table(&[vec!["a".into(), "b".into()]]);
            w.add_caption("表格");
            w.add_page_break();
            let bytes = w.finish().unwrap();
            assert_eq!(&bytes[..2], b"PK");
        }

        #[test]
        fn undecodable_picture_is_an_error() {
            let dir = tempfile::tempdir().unwrap();
            let bad = dir.path().join("bad.jpg");
            std::fs::write(&bad, b"not an image").unwrap();
            let mut w = DocxWriter::default();
            assert!(w.add_picture(&bad, 5.0).is_err());
            assert!(w.items.is_empty());
        }

        #[test]
        fn picture_is_embedded() {
            let dir = tempfile::tempdir().unwrap();
            let good = dir.path().join("good.jpg");
            DynamicImage::new_rgb8(40, 20)
                .save_with_format(&good, ImageFormat::Jpeg)
                .unwrap();
            let mut w = DocxWriter::default();
            w.add_picture(&good, 5.0).unwrap();
            assert_eq!(w.items.len(), 1);
        }
    }
}

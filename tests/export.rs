//! Integration tests for document export and the format fallback chain.

use scan2doc::config::mime_for_path;
use scan2doc::export::{
    export_document, Document, DocumentPage, DocumentWriter, ExportContext, ExportRegistry,
    WriterFactory,
};
use scan2doc::markup::Block;
use scan2doc::{
    ConversionConfig, EnrichedFragment, OutputFormat, PageBody, RegionKind, Scan2DocError,
};
use std::path::Path;
use std::sync::Arc;

struct NoWordBackend;

impl WriterFactory for NoWordBackend {
    fn create(&self) -> Result<Box<dyn DocumentWriter>, String> {
        Err("word backend unavailable".into())
    }
}

fn page(index: usize, fragments: &[(RegionKind, &str)]) -> PageBody {
    PageBody {
        index,
        fragments: fragments
            .iter()
            .map(|(kind, markup)| EnrichedFragment {
                kind: *kind,
                markup: markup.to_string(),
            })
            .collect(),
    }
}

fn sample() -> Vec<PageBody> {
    vec![page(
        1,
        &[
            (RegionKind::Title, "\\section{引言}"),
            (RegionKind::Text, "增长 50\\% 与 A\\&B"),
            (
                RegionKind::Table,
                "\\begin{figure}[h]\n\\centering\n\\includegraphics[width=0.8\\textwidth]{table/page_1_region_2.jpg}\n\\caption{表格}\n\\end{figure}",
            ),
        ],
    )]
}

fn save_region(regions_dir: &Path, rel: &str) {
    let path = regions_dir.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    image::RgbImage::new(10, 10).save(&path).unwrap();
}

fn export(
    registry: &ExportRegistry,
    pages: &[PageBody],
    output: &Path,
    format: OutputFormat,
) -> Result<scan2doc::ExportOutcome, Scan2DocError> {
    let config = ConversionConfig::builder()
        .output_format(format)
        .build()
        .unwrap();
    let ctx = ExportContext::new(output, &config);
    export_document(registry, &Document::from_pages(pages), &ctx, format, None)
}

#[test]
fn html_renders_structure_and_literal_text() {
    let dir = tempfile::tempdir().unwrap();
    save_region(&dir.path().join("processed_regions"), "table/page_1_region_2.jpg");

    let outcome = export(
        &ExportRegistry::default(),
        &sample(),
        &dir.path().join("out.html"),
        OutputFormat::Html,
    )
    .unwrap();

    assert_eq!(outcome.path, dir.path().join("out.html"));
    assert_eq!(mime_for_path(&outcome.path), "text/html");
    assert!(!outcome.fell_back());

    let html = std::fs::read_to_string(&outcome.path).unwrap();
    assert_eq!(html.matches("<h2>").count(), 1);
    assert!(html.contains("<h2>引言</h2>"));
    assert!(html.contains("<h2 class=\"page\">第 1 页</h2>"));
    assert_eq!(html.matches("<p>").count(), 1);
    assert!(html.contains("<p>增长 50% 与 A&amp;B</p>"));
    assert!(html.contains("<img src=\"table_page_1_region_2.jpg\" alt=\"表格\">"));
    assert!(html.contains("<p class=\"caption\">表格</p>"));
    assert!(dir.path().join("table_page_1_region_2.jpg").is_file());
    assert!(!html.contains("\\section"));
    assert!(!html.contains("\\%"));
}

#[test]
fn html_keeps_caption_when_image_is_missing() {
    let dir = tempfile::tempdir().unwrap();

    let outcome = export(
        &ExportRegistry::default(),
        &sample(),
        &dir.path().join("out"),
        OutputFormat::Html,
    )
    .unwrap();

    let html = std::fs::read_to_string(&outcome.path).unwrap();
    assert!(!html.contains("<img"));
    assert!(html.contains("<p class=\"caption\">表格</p>"));
}

#[test]
fn html_keeps_tildes_and_plain_braces() {
    let dir = tempfile::tempdir().unwrap();
    // Raw-text fallback fragments reach export unescaped.
    let pages = vec![page(1, &[(RegionKind::Text, "有效期 3~5 年\n集合 {a, b}")])];

    let outcome = export(
        &ExportRegistry::default(),
        &pages,
        &dir.path().join("out"),
        OutputFormat::Html,
    )
    .unwrap();

    let html = std::fs::read_to_string(&outcome.path).unwrap();
    assert!(html.contains("<p>有效期 3~5 年</p>"));
    assert!(html.contains("<p>集合 {a, b}</p>"));
}

#[test]
fn figure_paths_outside_regions_dir_are_not_copied() {
    let dir = tempfile::tempdir().unwrap();
    let secret = dir.path().join("secret.jpg");
    image::RgbImage::new(4, 4).save(&secret).unwrap();
    std::fs::create_dir_all(dir.path().join("out/processed_regions")).unwrap();

    let config = ConversionConfig::default();
    let ctx = ExportContext::new(&dir.path().join("out/doc"), &config);
    let figure = |path: &str| Block::Figure {
        path: Some(path.to_string()),
        caption: Some("表格".into()),
    };
    let doc = Document {
        pages: vec![DocumentPage {
            index: 1,
            blocks: vec![
                figure("../../secret.jpg"),
                figure(secret.to_str().unwrap()),
            ],
        }],
        markup: String::new(),
    };

    let outcome = export_document(
        &ExportRegistry::default(),
        &doc,
        &ctx,
        OutputFormat::Html,
        None,
    )
    .unwrap();

    let html = std::fs::read_to_string(&outcome.path).unwrap();
    assert!(!html.contains("<img"));
    assert_eq!(html.matches("<p class=\"caption\">表格</p>").count(), 2);
    let files: Vec<_> = std::fs::read_dir(dir.path().join("out"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.is_file())
        .collect();
    assert_eq!(files, vec![dir.path().join("out/doc.html")]);

    // Markup from the cleanup service is filtered when parsed.
    let parsed = Document::from_pages(&[page(
        1,
        &[(
            RegionKind::Text,
            "\\begin{figure}\\includegraphics{/etc/passwd}\\caption{图}\\end{figure}",
        )],
    )]);
    assert_eq!(
        parsed.pages[0].blocks,
        vec![Block::Figure {
            path: None,
            caption: Some("图".into()),
        }]
    );
}

#[test]
fn repeated_export_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    save_region(&dir.path().join("processed_regions"), "table/page_1_region_2.jpg");
    let pages = vec![sample().remove(0), page(3, &[(RegionKind::Text, "第二页")])];
    let registry = ExportRegistry::default();

    for format in [OutputFormat::Html, OutputFormat::Tex] {
        let first = export(&registry, &pages, &dir.path().join("doc"), format).unwrap();
        let a = std::fs::read(&first.path).unwrap();
        let second = export(&registry, &pages, &dir.path().join("doc"), format).unwrap();
        let b = std::fs::read(&second.path).unwrap();
        assert_eq!(a, b, "{format} output differs between runs");
    }
}

#[test]
fn tex_body_separates_pages() {
    let dir = tempfile::tempdir().unwrap();
    let pages = vec![
        page(1, &[(RegionKind::Text, "甲")]),
        page(4, &[(RegionKind::Text, "乙")]),
    ];

    let outcome = export(
        &ExportRegistry::default(),
        &pages,
        &dir.path().join("doc.tex"),
        OutputFormat::Tex,
    )
    .unwrap();

    assert_eq!(mime_for_path(&outcome.path), "text/plain");
    let content = std::fs::read_to_string(dir.path().join("doc.tex.content")).unwrap();
    assert_eq!(
        content,
        "\\subsection{第 1 页}\n\n甲\n\n\\newpage\n\n\\subsection{第 4 页}\n\n乙"
    );
    assert!(!dir.path().join("doc.tex.tmp").exists());
}

#[test]
fn pdf_falls_back_to_html_then_records_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ExportRegistry::with_writer_factory(Arc::new(NoWordBackend));

    let outcome = export(&registry, &sample(), &dir.path().join("r.pdf"), OutputFormat::Pdf).unwrap();

    assert_eq!(outcome.path, dir.path().join("r.html"));
    assert_eq!(outcome.format, OutputFormat::Html);
    assert_eq!(outcome.requested, OutputFormat::Pdf);
    assert!(outcome.fell_back());
    assert_eq!(outcome.attempts.len(), 1);
    assert_eq!(outcome.attempts[0].format, OutputFormat::Pdf);
    assert!(outcome.attempts[0].error.contains("word backend unavailable"));
}

#[test]
fn docx_falls_back_to_tex() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ExportRegistry::with_writer_factory(Arc::new(NoWordBackend));

    let outcome = export(&registry, &sample(), &dir.path().join("r"), OutputFormat::Docx).unwrap();

    assert_eq!(outcome.path, dir.path().join("r.tex"));
    assert_eq!(outcome.format, OutputFormat::Tex);
    assert!(!dir.path().join("r.docx").exists());
}

#[test]
fn tex_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    // A directory where the output file should go makes the rename fail.
    std::fs::create_dir(dir.path().join("r.tex")).unwrap();

    let err = export(
        &ExportRegistry::default(),
        &sample(),
        &dir.path().join("r"),
        OutputFormat::Tex,
    )
    .unwrap_err();

    assert!(matches!(
        err,
        Scan2DocError::ExportFailed {
            format: OutputFormat::Tex,
            ..
        }
    ));
}

#[cfg(feature = "docx")]
#[test]
fn docx_and_pdf_write_a_word_package() {
    let dir = tempfile::tempdir().unwrap();
    save_region(&dir.path().join("processed_regions"), "table/page_1_region_2.jpg");
    let registry = ExportRegistry::default();

    let docx = export(&registry, &sample(), &dir.path().join("a"), OutputFormat::Docx).unwrap();
    assert_eq!(docx.path, dir.path().join("a.docx"));
    assert_eq!(
        mime_for_path(&docx.path),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
    );
    assert!(std::fs::read(&docx.path).unwrap().starts_with(b"PK"));

    let pdf = export(&registry, &sample(), &dir.path().join("b"), OutputFormat::Pdf).unwrap();
    assert_eq!(pdf.format, OutputFormat::Pdf);
    assert_eq!(pdf.path, dir.path().join("b.docx"));
}

//! Region enrichment: turn one detected region into a markup fragment.
//!
//! Text and title regions go through cleanup (with an optional vision OCR
//! pass when the layout engine returned no text). Visual regions are cropped,
//! saved as JPEG under the regions directory, and referenced from a figure
//! environment. Every failure here is recovered: the region either falls back
//! to its raw text or contributes nothing, and the reason is reported as a
//! [`RegionError`].

use crate::error::RegionError;
use crate::markup::figure_markup;
use crate::model::{BoundingBox, EnrichedFragment, Region, RegionKind};
use crate::pipeline::llm::{MarkupCleaner, TextRecognizer};
use crate::pipeline::postprocess::clean_markup;
use image::DynamicImage;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Everything [`enrich_region`] needs besides the region itself.
pub struct EnrichContext<'a> {
    pub cleaner: &'a dyn MarkupCleaner,
    /// Vision fallback for text regions with no OCR lines; `None` disables it.
    pub recognizer: Option<&'a dyn TextRecognizer>,
    /// Directory the region images are written under.
    pub regions_dir: &'a Path,
    /// Limit on each cleanup or recognition call.
    pub api_timeout: Duration,
}

/// Result of enriching one region.
#[derive(Debug, Default)]
pub struct Enriched {
    pub fragment: Option<EnrichedFragment>,
    pub warnings: Vec<RegionError>,
}

impl Enriched {
    fn fragment(kind: RegionKind, markup: String) -> Self {
        Self {
            fragment: Some(EnrichedFragment { kind, markup }),
            warnings: Vec::new(),
        }
    }

    fn skipped(warning: RegionError) -> Self {
        Self {
            fragment: None,
            warnings: vec![warning],
        }
    }
}

/// Enrich region number `index` (its position in reading order) of `page`.
pub async fn enrich_region(
    ctx: &EnrichContext<'_>,
    image: &DynamicImage,
    region: &Region,
    page: usize,
    index: usize,
) -> Enriched {
    match region.kind {
        RegionKind::Text | RegionKind::Title => enrich_text(ctx, image, region, page, index).await,
        RegionKind::Table | RegionKind::Figure | RegionKind::Image | RegionKind::Formula => {
            enrich_visual(ctx, image, region, page, index)
        }
        RegionKind::Unknown => {
            debug!("Page {} region {}: unknown kind, skipped", page, index);
            Enriched::default()
        }
    }
}

async fn enrich_text(
    ctx: &EnrichContext<'_>,
    image: &DynamicImage,
    region: &Region,
    page: usize,
    index: usize,
) -> Enriched {
    let mut warnings = Vec::new();
    let mut text = region.raw_text();

    if text.trim().is_empty() {
        if let Some(recognizer) = ctx.recognizer {
            match recognize_crop(ctx, recognizer, image, &region.bbox).await {
                Ok(t) => text = t,
                Err(detail) => {
                    warn!("Page {} region {}: fallback OCR failed — {}", page, index, detail);
                    warnings.push(RegionError::OcrFailed {
                        page,
                        region: index,
                        detail,
                    });
                }
            }
        }
    }

    let text = strip_control_chars(&text);
    if text.trim().is_empty() {
        debug!("Page {} region {}: no text, skipped", page, index);
        return Enriched {
            fragment: None,
            warnings,
        };
    }

    debug!(
        "Page {} region {}: cleaning {} chars of {}",
        page,
        index,
        text.chars().count(),
        region.kind
    );

    let markup = match tokio::time::timeout(ctx.api_timeout, ctx.cleaner.clean(&text)).await {
        Ok(Ok(reply)) => {
            let cleaned = clean_markup(&reply);
            if cleaned.trim().is_empty() {
                fallback(&mut warnings, page, index, "cleanup reply was empty".into());
                text
            } else {
                cleaned
            }
        }
        Ok(Err(e)) => {
            fallback(&mut warnings, page, index, e.to_string());
            text
        }
        Err(_) => {
            fallback(
                &mut warnings,
                page,
                index,
                format!("timed out after {}s", ctx.api_timeout.as_secs_f32()),
            );
            text
        }
    };

    Enriched {
        fragment: Some(EnrichedFragment {
            kind: region.kind,
            markup,
        }),
        warnings,
    }
}

fn fallback(warnings: &mut Vec<RegionError>, page: usize, index: usize, detail: String) {
    warn!(
        "Page {} region {}: cleanup unavailable, keeping raw text — {}",
        page, index, detail
    );
    warnings.push(RegionError::CleanupUnavailable {
        page,
        region: index,
        detail,
    });
}

async fn recognize_crop(
    ctx: &EnrichContext<'_>,
    recognizer: &dyn TextRecognizer,
    image: &DynamicImage,
    bbox: &BoundingBox,
) -> Result<String, String> {
    let crop = crop_region(image, bbox).ok_or_else(|| "crop is empty".to_string())?;
    match tokio::time::timeout(ctx.api_timeout, recognizer.recognize(&crop)).await {
        Ok(r) => r.map_err(|e| e.to_string()),
        Err(_) => Err(format!("timed out after {}s", ctx.api_timeout.as_secs_f32())),
    }
}

fn enrich_visual(
    ctx: &EnrichContext<'_>,
    image: &DynamicImage,
    region: &Region,
    page: usize,
    index: usize,
) -> Enriched {
    let Some(crop) = crop_region(image, &region.bbox) else {
        warn!("Page {} region {}: crop is empty after clamping", page, index);
        return Enriched::skipped(RegionError::CropEmpty {
            page,
            region: index,
        });
    };

    let rel_path = match save_region_image(&crop, ctx.regions_dir, region.kind, page, index) {
        Ok(p) => p,
        Err(detail) => {
            warn!("Page {} region {}: saving image failed — {}", page, index, detail);
            return Enriched::skipped(RegionError::SaveFailed {
                page,
                region: index,
                detail,
            });
        }
    };

    let caption = region.kind.caption().unwrap_or("图片");
    debug!("Page {} region {}: saved {}", page, index, rel_path);
    Enriched::fragment(region.kind, figure_markup(&rel_path, caption))
}

/// Remove C0 control characters except tab, newline and carriage return.
pub fn strip_control_chars(text: &str) -> String {
    text.chars()
        .filter(|&c| !matches!(c, '\u{0}'..='\u{8}' | '\u{B}' | '\u{C}' | '\u{E}'..='\u{1F}'))
        .collect()
}

/// Crop `bbox` out of `image`, clamped to the image bounds.
pub fn crop_region(image: &DynamicImage, bbox: &BoundingBox) -> Option<DynamicImage> {
    let (x, y, w, h) = bbox.clamp_to(image.width(), image.height())?;
    Some(image.crop_imm(x, y, w, h))
}

/// Relative path of a saved region image, always with `/` separators.
pub fn region_image_path(kind: RegionKind, page: usize, index: usize) -> String {
    format!("{}/page_{}_region_{}.jpg", kind.as_str(), page, index)
}

/// Write `crop` as JPEG under `regions_dir` and return its relative path.
pub fn save_region_image(
    crop: &DynamicImage,
    regions_dir: &Path,
    kind: RegionKind,
    page: usize,
    index: usize,
) -> Result<String, String> {
    let rel = region_image_path(kind, page, index);
    let path = regions_dir.join(&rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| format!("{}: {}", parent.display(), e))?;
    }
    // JPEG has no alpha channel.
    DynamicImage::ImageRgb8(crop.to_rgb8())
        .save_with_format(&path, image::ImageFormat::Jpeg)
        .map_err(|e| format!("{}: {}", path.display(), e))?;
    Ok(rel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CleanupError, RecognizeError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Echo(Mutex<Vec<String>>);

    #[async_trait]
    impl MarkupCleaner for Echo {
        async fn clean(&self, text: &str) -> Result<String, CleanupError> {
            self.0.lock().unwrap().push(text.to_string());
            Ok(format!("```latex\n\\section{{{}}}\n```", text))
        }
    }

    struct Down;

    #[async_trait]
    impl MarkupCleaner for Down {
        async fn clean(&self, _: &str) -> Result<String, CleanupError> {
            Err(CleanupError::Service("connection refused".into()))
        }
    }

    struct Slow;

    #[async_trait]
    impl MarkupCleaner for Slow {
        async fn clean(&self, text: &str) -> Result<String, CleanupError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(text.to_string())
        }
    }

    struct Reads(&'static str);

    #[async_trait]
    impl TextRecognizer for Reads {
        async fn recognize(&self, _: &DynamicImage) -> Result<String, RecognizeError> {
            Ok(self.0.to_string())
        }
    }

    fn ctx<'a>(cleaner: &'a dyn MarkupCleaner, dir: &'a Path) -> EnrichContext<'a> {
        EnrichContext {
            cleaner,
            recognizer: None,
            regions_dir: dir,
            api_timeout: Duration::from_millis(200),
        }
    }

    fn text_region(lines: &[&str]) -> Region {
        Region::new(
            RegionKind::Text,
            BoundingBox::new(0.0, 0.0, 20.0, 10.0),
            lines.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn strips_only_forbidden_controls() {
        assert_eq!(strip_control_chars("a\u{0}b\u{8}c\td\ne\u{B}\u{C}\rf\u{1F}"), "abc\td\ne\rf");
    }

    #[test]
    fn crop_clamps_and_rejects_outside() {
        let img = DynamicImage::new_rgb8(50, 40);
        let c = crop_region(&img, &BoundingBox::new(-5.0, 10.0, 80.0, 30.0)).unwrap();
        assert_eq!((c.width(), c.height()), (50, 20));
        assert!(crop_region(&img, &BoundingBox::new(60.0, 0.0, 90.0, 10.0)).is_none());
    }

    #[tokio::test]
    async fn cleaner_sees_stripped_text_and_reply_is_postprocessed() {
        let dir = tempfile::tempdir().unwrap();
        let cleaner = Echo(Mutex::new(Vec::new()));
        let img = DynamicImage::new_rgb8(20, 10);
        let out = enrich_region(&ctx(&cleaner, dir.path()), &img, &text_region(&["总\u{0}则"]), 1, 0).await;

        assert_eq!(cleaner.0.lock().unwrap().as_slice(), ["总则"]);
        assert_eq!(out.fragment.unwrap().markup, "\\section{总则}");
        assert!(out.warnings.is_empty());
    }

    #[tokio::test]
    async fn unreachable_cleaner_keeps_stripped_text() {
        let dir = tempfile::tempdir().unwrap();
        let img = DynamicImage::new_rgb8(20, 10);
        let out = enrich_region(&ctx(&Down, dir.path()), &img, &text_region(&["第一行\u{7}", "第二行"]), 2, 3).await;

        assert_eq!(out.fragment.unwrap().markup, "第一行\n第二行");
        assert!(matches!(
            out.warnings.as_slice(),
            [RegionError::CleanupUnavailable { page: 2, region: 3, .. }]
        ));
    }

    #[tokio::test]
    async fn slow_cleaner_times_out_to_raw_text() {
        let dir = tempfile::tempdir().unwrap();
        let img = DynamicImage::new_rgb8(20, 10);
        let out = enrich_region(&ctx(&Slow, dir.path()), &img, &text_region(&["正文"]), 1, 0).await;
        assert_eq!(out.fragment.unwrap().markup, "正文");
        assert_eq!(out.warnings.len(), 1);
    }

    #[tokio::test]
    async fn blank_text_uses_recognizer_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let cleaner = Echo(Mutex::new(Vec::new()));
        let img = DynamicImage::new_rgb8(20, 10);

        let no_ocr = enrich_region(&ctx(&cleaner, dir.path()), &img, &text_region(&[" "]), 1, 0).await;
        assert!(no_ocr.fragment.is_none());

        let reads = Reads("识别结果");
        let mut with_ocr = ctx(&cleaner, dir.path());
        with_ocr.recognizer = Some(&reads);
        let out = enrich_region(&with_ocr, &img, &text_region(&[]), 1, 0).await;
        assert_eq!(out.fragment.unwrap().markup, "\\section{识别结果}");
    }

    #[tokio::test]
    async fn visual_region_is_saved_and_referenced() {
        let dir = tempfile::tempdir().unwrap();
        let img = DynamicImage::new_rgba8(100, 80);
        let region = Region::new(RegionKind::Table, BoundingBox::new(10.0, 10.0, 60.0, 50.0), vec![]);
        let out = enrich_region(&ctx(&Down, dir.path()), &img, &region, 3, 4).await;

        let saved = dir.path().join("table/page_3_region_4.jpg");
        assert!(saved.is_file());
        let markup = out.fragment.unwrap().markup;
        assert!(markup.contains("\\includegraphics[width=0.8\\textwidth]{table/page_3_region_4.jpg}"));
        assert!(markup.contains("\\caption{表格}"));
    }

    #[tokio::test]
    async fn visual_region_outside_image_contributes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let img = DynamicImage::new_rgb8(10, 10);
        let region = Region::new(RegionKind::Figure, BoundingBox::new(20.0, 20.0, 30.0, 30.0), vec![]);
        let out = enrich_region(&ctx(&Down, dir.path()), &img, &region, 1, 0).await;
        assert!(out.fragment.is_none());
        assert!(matches!(out.warnings.as_slice(), [RegionError::CropEmpty { .. }]));
    }

    #[tokio::test]
    async fn unknown_region_contributes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let img = DynamicImage::new_rgb8(10, 10);
        let region = Region::new(RegionKind::Unknown, BoundingBox::new(0.0, 0.0, 5.0, 5.0), vec!["页脚".into()]);
        let out = enrich_region(&ctx(&Down, dir.path()), &img, &region, 1, 0).await;
        assert!(out.fragment.is_none());
        assert!(out.warnings.is_empty());
    }
}

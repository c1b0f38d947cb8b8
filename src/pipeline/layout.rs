//! Region extraction: layout detection + OCR behind the [`LayoutEngine`] seam.
//!
//! The layout model is an external capability. Two adapters ship with the
//! crate, both speaking the PP-Structure result shape:
//!
//! ```json
//! [
//!   {"type": "title", "bbox": [40, 32, 610, 80],
//!    "res": [{"text": "一、项目概况", "confidence": 0.98}]},
//!   {"type": "figure", "bbox": [40, 100, 610, 420], "res": []}
//! ]
//! ```
//!
//! OCR lines in `res` may also come as `[box, [text, confidence]]` pairs
//! (older PaddleOCR output). A `res` that is not a list, such as the HTML
//! dict attached to table regions, carries no lines.
//!
//! * [`SidecarLayout`] reads `<stem>.json` written next to each page image.
//! * [`HttpLayout`] POSTs the image bytes to a layout service.

use crate::error::{LayoutError, RegionError};
use crate::model::{BoundingBox, Region, RegionKind};
use async_trait::async_trait;
use image::DynamicImage;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// External layout-detection + OCR capability.
#[async_trait]
pub trait LayoutEngine: Send + Sync {
    /// Detect the regions of one decoded page image.
    ///
    /// `source` is the file the image was decoded from; adapters that work
    /// on files rather than pixels use it.
    async fn detect(&self, image: &DynamicImage, source: &Path) -> Result<Vec<Region>, LayoutError>;
}

/// Run the engine on a page and return its regions in reading order.
///
/// Never fails: an engine error is reported as a [`RegionError`] alongside
/// an empty region list, so one bad page does not abort the run. Regions with
/// degenerate boxes are dropped.
pub async fn extract_regions(
    engine: &dyn LayoutEngine,
    image: &DynamicImage,
    source: &Path,
    page: usize,
) -> (Vec<Region>, Option<RegionError>) {
    match engine.detect(image, source).await {
        Ok(regions) => (order_regions(regions, page), None),
        Err(e) => {
            warn!("Page {}: layout detection failed — {}", page, e);
            (
                Vec::new(),
                Some(RegionError::DetectionFailed {
                    page,
                    detail: e.to_string(),
                }),
            )
        }
    }
}

/// Drop degenerate boxes and stable-sort by top edge, then left edge.
pub fn order_regions(regions: Vec<Region>, page: usize) -> Vec<Region> {
    let mut kept: Vec<Region> = regions
        .into_iter()
        .filter(|r| {
            let ok = r.bbox.is_valid();
            if !ok {
                debug!("Page {}: dropping {} region with bbox {:?}", page, r.kind, r.bbox);
            }
            ok
        })
        .collect();
    kept.sort_by(|a, b| a.bbox.reading_cmp(&b.bbox));
    kept
}

// ── Result parsing ───────────────────────────────────────────────────────

/// Parse a PP-Structure style layout result.
///
/// Accepts a bare list of regions or an object holding it under `regions`.
/// Entries without a 4-number `bbox` are skipped.
pub fn parse_layout_json(json: &str) -> Result<Vec<Region>, LayoutError> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| LayoutError::Malformed(e.to_string()))?;

    let items = match &value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("regions") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(LayoutError::Malformed(
                    "expected a list of regions or {\"regions\": [...]}".into(),
                ))
            }
        },
        _ => return Err(LayoutError::Malformed("expected a JSON list".into())),
    };

    Ok(items.iter().filter_map(parse_region).collect())
}

fn parse_region(item: &Value) -> Option<Region> {
    let label = item
        .get("type")
        .or_else(|| item.get("label"))
        .and_then(Value::as_str)
        .unwrap_or("unknown");

    let coords: Vec<f32> = item
        .get("bbox")?
        .as_array()?
        .iter()
        .filter_map(|v| v.as_f64().map(|f| f as f32))
        .collect();
    if coords.len() < 4 {
        return None;
    }

    let raw_lines = match item.get("res") {
        Some(Value::Array(lines)) => lines.iter().filter_map(line_text).collect(),
        _ => Vec::new(),
    };

    Some(Region::new(
        RegionKind::from_label(label),
        BoundingBox::new(coords[0], coords[1], coords[2], coords[3]),
        raw_lines,
    ))
}

/// Text of one OCR line in any of the supported shapes.
fn line_text(line: &Value) -> Option<String> {
    match line {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("text").and_then(Value::as_str).map(str::to_string),
        // [box, [text, confidence]] or [box, text]
        Value::Array(parts) if parts.len() >= 2 => match &parts[1] {
            Value::Array(rec) => rec.first().and_then(Value::as_str).map(str::to_string),
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        },
        _ => None,
    }
}

// ── Sidecar adapter ──────────────────────────────────────────────────────

/// Reads the layout result an external tool wrote next to each page image.
///
/// For `scan_003.png` the engine looks for `scan_003.json` in the same
/// directory, or under `dir` when one is configured.
#[derive(Debug, Clone, Default)]
pub struct SidecarLayout {
    dir: Option<PathBuf>,
}

impl SidecarLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look for sidecars in `dir` instead of next to the images.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    /// Sidecar path for a page image.
    pub fn sidecar_path(&self, source: &Path) -> PathBuf {
        let json = source.with_extension("json");
        match (&self.dir, json.file_name()) {
            (Some(dir), Some(name)) => dir.join(name),
            _ => json,
        }
    }
}

#[async_trait]
impl LayoutEngine for SidecarLayout {
    async fn detect(&self, _image: &DynamicImage, source: &Path) -> Result<Vec<Region>, LayoutError> {
        let path = self.sidecar_path(source);
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LayoutError::Missing { path })
            }
            Err(e) => return Err(LayoutError::Io(e)),
        };
        let regions = parse_layout_json(&json)?;
        debug!("{}: {} regions from sidecar", source.display(), regions.len());
        Ok(regions)
    }
}

// ── HTTP adapter ─────────────────────────────────────────────────────────

/// Sends each page image to a layout service and parses its JSON reply.
///
/// The request body is the raw image file; the response must be the JSON
/// shape documented at module level.
#[derive(Debug, Clone)]
pub struct HttpLayout {
    url: String,
    client: reqwest::Client,
}

impl HttpLayout {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, LayoutError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LayoutError::Service(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl LayoutEngine for HttpLayout {
    async fn detect(&self, _image: &DynamicImage, source: &Path) -> Result<Vec<Region>, LayoutError> {
        let bytes = tokio::fs::read(source).await?;
        let mime = match source
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("png") => "image/png",
            Some("bmp") => "image/bmp",
            Some("tif") | Some("tiff") => "image/tiff",
            _ => "image/jpeg",
        };

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, mime)
            .body(bytes)
            .send()
            .await
            .map_err(|e| LayoutError::Service(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LayoutError::Service(format!("HTTP {}", response.status())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| LayoutError::Service(e.to_string()))?;
        parse_layout_json(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<Region>);

    #[async_trait]
    impl LayoutEngine for Fixed {
        async fn detect(&self, _: &DynamicImage, _: &Path) -> Result<Vec<Region>, LayoutError> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    #[async_trait]
    impl LayoutEngine for Broken {
        async fn detect(&self, _: &DynamicImage, _: &Path) -> Result<Vec<Region>, LayoutError> {
            Err(LayoutError::Malformed("model crashed".into()))
        }
    }

    fn region(kind: RegionKind, x1: f32, y1: f32) -> Region {
        Region::new(kind, BoundingBox::new(x1, y1, x1 + 10.0, y1 + 10.0), vec![])
    }

    #[test]
    fn parses_object_and_pair_lines() {
        let json = r#"[
            {"type": "text", "bbox": [10, 20, 300, 60],
             "res": [{"text": "第一行", "confidence": 0.9},
                     [[[0,0],[1,0],[1,1],[0,1]], ["第二行", 0.8]]]},
            {"type": "table", "bbox": [10, 80, 300, 200], "res": {"html": "<table></table>"}},
            {"type": "header", "bbox": [0, 0, 5, 5]},
            {"type": "text", "bbox": [1, 2]}
        ]"#;
        let regions = parse_layout_json(json).unwrap();
        assert_eq!(regions.len(), 3);
        assert_eq!(regions[0].kind, RegionKind::Text);
        assert_eq!(regions[0].raw_lines, vec!["第一行", "第二行"]);
        assert_eq!(regions[1].kind, RegionKind::Table);
        assert!(regions[1].raw_lines.is_empty());
        assert_eq!(regions[2].kind, RegionKind::Unknown);
    }

    #[test]
    fn parses_wrapped_object() {
        let json = r#"{"regions": [{"label": "figure", "bbox": [0.5, 1.5, 9.5, 10.5]}]}"#;
        let regions = parse_layout_json(json).unwrap();
        assert_eq!(regions[0].kind, RegionKind::Figure);
        assert_eq!(regions[0].bbox, BoundingBox::new(0.5, 1.5, 9.5, 10.5));
    }

    #[test]
    fn rejects_non_list() {
        assert!(parse_layout_json("42").is_err());
        assert!(parse_layout_json("not json").is_err());
    }

    #[test]
    fn order_is_top_to_bottom_then_left_to_right() {
        let regions = vec![
            region(RegionKind::Text, 200.0, 100.0),
            region(RegionKind::Title, 50.0, 10.0),
            region(RegionKind::Figure, 10.0, 100.0),
            Region::new(RegionKind::Text, BoundingBox::new(5.0, 5.0, 5.0, 20.0), vec![]),
        ];
        let ordered = order_regions(regions, 1);
        let kinds: Vec<_> = ordered.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![RegionKind::Title, RegionKind::Figure, RegionKind::Text]
        );
    }

    #[test]
    fn sidecar_path_next_to_image_or_in_dir() {
        let s = SidecarLayout::new();
        assert_eq!(
            s.sidecar_path(Path::new("/in/scan_01.png")),
            PathBuf::from("/in/scan_01.json")
        );
        let s = SidecarLayout::in_dir("/layouts");
        assert_eq!(
            s.sidecar_path(Path::new("/in/scan_01.png")),
            PathBuf::from("/layouts/scan_01.json")
        );
    }

    #[tokio::test]
    async fn extract_sorts_engine_output() {
        let engine = Fixed(vec![
            region(RegionKind::Text, 0.0, 50.0),
            region(RegionKind::Title, 0.0, 5.0),
        ]);
        let img = DynamicImage::new_rgb8(100, 100);
        let (regions, err) = extract_regions(&engine, &img, Path::new("p.png"), 1).await;
        assert!(err.is_none());
        assert_eq!(regions[0].kind, RegionKind::Title);
    }

    #[tokio::test]
    async fn engine_failure_degrades_to_empty_page() {
        let img = DynamicImage::new_rgb8(10, 10);
        let (regions, err) = extract_regions(&Broken, &img, Path::new("p.png"), 4).await;
        assert!(regions.is_empty());
        assert!(matches!(err, Some(RegionError::DetectionFailed { page: 4, .. })));
    }

    #[tokio::test]
    async fn sidecar_missing_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let img = DynamicImage::new_rgb8(10, 10);
        let r = SidecarLayout::new()
            .detect(&img, &dir.path().join("page.png"))
            .await;
        assert!(matches!(r, Err(LayoutError::Missing { .. })));
    }

    #[tokio::test]
    async fn sidecar_reads_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("page.json"),
            r#"[{"type": "title", "bbox": [1, 1, 50, 9], "res": ["标题"]}]"#,
        )
        .unwrap();
        let img = DynamicImage::new_rgb8(10, 10);
        let regions = SidecarLayout::new()
            .detect(&img, &dir.path().join("page.png"))
            .await
            .unwrap();
        assert_eq!(regions[0].raw_lines, vec!["标题"]);
    }
}

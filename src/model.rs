//! Region and page data types shared by every pipeline stage.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Layout category of a detected region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionKind {
    Text,
    Title,
    Table,
    Figure,
    Image,
    Formula,
    Unknown,
}

impl RegionKind {
    /// Map a layout-model label to a kind. Unrecognised labels are `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "text" => RegionKind::Text,
            "title" => RegionKind::Title,
            "table" => RegionKind::Table,
            "figure" => RegionKind::Figure,
            "image" => RegionKind::Image,
            "formula" | "equation" => RegionKind::Formula,
            _ => RegionKind::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RegionKind::Text => "text",
            RegionKind::Title => "title",
            RegionKind::Table => "table",
            RegionKind::Figure => "figure",
            RegionKind::Image => "image",
            RegionKind::Formula => "formula",
            RegionKind::Unknown => "unknown",
        }
    }

    /// Text and title regions go through OCR + cleanup.
    pub fn is_textual(self) -> bool {
        matches!(self, RegionKind::Text | RegionKind::Title)
    }

    /// Caption label for visual regions; `None` for everything else.
    pub fn caption(self) -> Option<&'static str> {
        match self {
            RegionKind::Table => Some("表格"),
            RegionKind::Figure => Some("图"),
            RegionKind::Image => Some("图片"),
            RegionKind::Formula => Some("公式"),
            _ => None,
        }
    }
}

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Axis-aligned box in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// `x2 > x1 ∧ y2 > y1`, with finite coordinates.
    pub fn is_valid(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite())
            && self.x2 > self.x1
            && self.y2 > self.y1
    }

    /// Integer pixel rectangle `(x, y, width, height)` clamped to an image of
    /// `width × height`. `None` when nothing is left after clamping.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        // Truncate toward zero, then clamp into the image.
        let clamp = |v: f32, max: u32| -> u32 { (v as i64).clamp(0, max as i64) as u32 };
        let x1 = clamp(self.x1, width);
        let y1 = clamp(self.y1, height);
        let x2 = clamp(self.x2, width);
        let y2 = clamp(self.y2, height);
        if x2 > x1 && y2 > y1 {
            Some((x1, y1, x2 - x1, y2 - y1))
        } else {
            None
        }
    }

    /// Reading order: top edge first, then left edge.
    pub fn reading_cmp(&self, other: &Self) -> Ordering {
        self.y1
            .total_cmp(&other.y1)
            .then_with(|| self.x1.total_cmp(&other.x1))
    }
}

/// One detected layout element on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub kind: RegionKind,
    pub bbox: BoundingBox,
    /// OCR lines in the order the layout engine returned them.
    pub raw_lines: Vec<String>,
}

impl Region {
    pub fn new(kind: RegionKind, bbox: BoundingBox, raw_lines: Vec<String>) -> Self {
        Self {
            kind,
            bbox,
            raw_lines,
        }
    }

    /// OCR lines joined with newlines.
    pub fn raw_text(&self) -> String {
        self.raw_lines.join("\n")
    }
}

/// Intermediate markup produced for one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedFragment {
    pub kind: RegionKind,
    pub markup: String,
}

/// All fragments of one page, in reading order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageBody {
    /// 1-based page index.
    pub index: usize,
    pub fragments: Vec<EnrichedFragment>,
}

impl PageBody {
    /// Page-level section header.
    pub fn header(&self) -> String {
        page_header(self.index)
    }

    /// Header, blank line, then fragments separated by blank lines.
    pub fn to_markup(&self) -> String {
        let body = self
            .fragments
            .iter()
            .map(|f| f.markup.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        format!("{}\n\n{}", self.header(), body)
    }
}

/// Heading label for a page, e.g. `第 3 页`.
pub fn page_title(index: usize) -> String {
    format!("第 {} 页", index)
}

/// Markup of the page-level section header.
pub fn page_header(index: usize) -> String {
    format!("\\subsection{{{}}}", page_title(index))
}

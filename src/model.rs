use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaperRequest {
    pub title: String,
    pub description: String,
    pub duration: Option<String>,
    pub total_marks: Option<u32>,
    pub include_answers: bool,
    pub college_name: String,
    /// http(s) URL or `data:image/...;base64,` inline image.
    pub college_logo: Option<String>,
    pub questions: Vec<Question>,
    pub with_solutions: bool,
    pub with_hints: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Question {
    pub id: String,
    pub content: String,
    pub options: Vec<String>,
    pub correct_answer: Option<AnswerRef>,
    pub difficulty: Option<String>,
    pub subject: String,
    pub solution: Option<Solution>,
    pub hints: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum AnswerRef {
    /// Zero-based option index.
    Index(usize),
    /// Option letter ("B"), option text, or a free-text answer.
    Text(String),
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Solution {
    pub methodology: Option<String>,
    pub steps: Vec<String>,
    pub key_concepts: Vec<String>,
    pub final_explanation: Option<String>,
}

impl Solution {
    pub fn is_empty(&self) -> bool {
        self.methodology.as_deref().is_none_or(|s| s.trim().is_empty())
            && self.steps.iter().all(|s| s.trim().is_empty())
            && self.key_concepts.iter().all(|s| s.trim().is_empty())
            && self
                .final_explanation
                .as_deref()
                .is_none_or(|s| s.trim().is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MathSpan {
    pub source: String,
    pub is_block: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellAlign {
    Left,
    Center,
    Right,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Table {
    pub header: Option<Vec<String>>,
    pub rows: Vec<Vec<String>>,
    pub alignments: Vec<CellAlign>,
}

impl Table {
    pub fn column_count(&self) -> usize {
        self.alignments.len()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageMime {
    Png,
    Jpeg,
    Gif,
    Webp,
    Svg,
}

impl ImageMime {
    pub fn from_subtype(subtype: &str) -> Option<Self> {
        match subtype.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpeg" | "jpg" | "pjpeg" => Some(Self::Jpeg),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::Webp),
            "svg+xml" | "svg" => Some(Self::Svg),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
            Self::Svg => "image/svg+xml",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageAsset {
    /// Hex content hash of the decoded bytes.
    pub id: String,
    pub data: Vec<u8>,
    pub mime: ImageMime,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum DegradationKind {
    ImageUnavailable,
    MathFallback,
    QuestionFallback,
    OversizedBlock,
    LogoUnavailable,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Degradation {
    pub kind: DegradationKind,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DegradedMarker {
    /// One-based running question number, `None` for document-level markers.
    pub question: Option<usize>,
    pub kind: DegradationKind,
    pub detail: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RichTextBlock {
    /// Cleaned text; `$..$`/`$$..$$` spans stay inline, images and tables
    /// are replaced by placeholder tokens.
    pub text: String,
    pub math: Vec<MathSpan>,
    pub tables: Vec<Table>,
    /// Keyed by `ImageAsset::id`, which is also what the placeholder names.
    pub images: BTreeMap<String, ImageAsset>,
    pub degradations: Vec<Degradation>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum MathPayload {
    /// PNG bytes produced by a rasterizer.
    Image(Vec<u8>),
    Text(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct RenderedMath {
    pub payload: MathPayload,
    pub width: f32,
    pub height: f32,
    /// Font size the text payload must be drawn at (scaled down when it
    /// would not fit). Zero for image payloads.
    pub font_size: f32,
}

impl RenderedMath {
    pub fn is_image(&self) -> bool {
        matches!(self.payload, MathPayload::Image(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Column {
    Left,
    Right,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum BlockKind {
    Banner,
    QuestionBody,
    Option,
    Answer,
    Solution,
    Hint,
    Fallback,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlacedBlock {
    pub kind: BlockKind,
    pub question: Option<usize>,
    pub column: Column,
    pub x: f32,
    /// Distance from the top edge of the page.
    pub y: f32,
    pub height: f32,
    pub oversized: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PageRecord {
    pub has_title_header: bool,
    pub banner: Option<String>,
    pub banner_continued: bool,
    pub footer: String,
    pub blocks: Vec<PlacedBlock>,
}

impl PageRecord {
    pub fn blocks_in(&self, column: Column) -> usize {
        self.blocks.iter().filter(|b| b.column == column).count()
    }
}

#[derive(Clone, Debug)]
pub struct RenderedPaper {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub page_count: usize,
    pub pages: Vec<PageRecord>,
    pub degraded: Vec<DegradedMarker>,
    /// Distinct image assets embedded in the document.
    pub image_assets: usize,
    /// Bottom edge of the column flow, measured from the page top.
    pub page_bottom: f32,
}

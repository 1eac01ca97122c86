//! Page chrome drawn around the column flow: the page-1 header, section
//! banners, footers, the column rule and the watermark overlay.

use std::io::Read;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pdf_writer::{Content, Name, Pdf, Str};

use crate::config::{PageSetup, RenderOptions, Typography};
use crate::fonts::{FontBook, FontStyle};
use crate::model::{CellAlign, DegradationKind, DegradedMarker, PaperRequest};

use super::RefAlloc;
use super::composer::PageCanvas;
use super::images::ImageRegistry;
use super::layout::{Flow, Inline, Piece, build_lines, lines_height, render_lines};

const BANNER_FILL: f32 = 0.88;
const BANNER_PAD: f32 = 3.0;
/// Space between the header text and its rule, and below the rule.
const RULE_GAP: f32 = 5.0;
const WATERMARK_TEXT_SIZE: f32 = 54.0;
const MAX_LOGO_BYTES: u64 = 8 * 1024 * 1024;
/// Resource name of the watermark's graphics state.
pub(super) const WATERMARK_GS: &[u8] = b"GSwm";

pub(super) fn continued_label(label: &str) -> String {
    format!("{label} (continued)")
}

pub(super) fn banner_flow(label: &str, fonts: &FontBook, typo: &Typography, width: f32) -> Flow {
    let size = typo.banner_size;
    let lines = build_lines(
        &[Inline::text(label, FontStyle::Bold, size)],
        fonts,
        width - 2.0 * BANNER_PAD,
        typo.line_height,
        size,
    );
    Flow {
        pieces: vec![Piece::Lines {
            lines,
            indent: 0.0,
            align: CellAlign::Center,
        }],
        width,
        fill: Some(BANNER_FILL),
        padding: BANNER_PAD,
    }
}

fn meta_line(request: &PaperRequest, question_count: usize) -> String {
    let mut parts = Vec::new();
    if let Some(d) = request.duration.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        parts.push(format!("Duration: {d}"));
    }
    if let Some(m) = request.total_marks {
        parts.push(format!("Total Marks: {m}"));
    }
    parts.push(format!("Questions: {question_count}"));
    parts.join(" | ")
}

pub(super) fn footer_text(title: &str, page: usize, pages: usize) -> String {
    match title.trim() {
        "" => format!("Page {page} of {pages}"),
        t => format!("{t} — Page {page} of {pages}"),
    }
}

fn watermark_text(request: &PaperRequest, opts: &RenderOptions) -> Option<String> {
    [
        opts.watermark.text.as_deref(),
        Some(request.college_name.as_str()),
        Some(request.title.as_str()),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .find(|t| !t.is_empty())
    .map(str::to_string)
}

/// All text the chrome can draw, for font subsetting.
pub(super) fn chrome_text(request: &PaperRequest, opts: &RenderOptions, question_count: usize) -> String {
    let meta = meta_line(request, question_count);
    let footer = footer_text(&request.title, 1, 1);
    let mut s = String::new();
    for part in [
        request.college_name.as_str(),
        request.title.as_str(),
        request.description.as_str(),
        meta.as_str(),
        footer.as_str(),
        "(continued)",
    ] {
        s.push_str(part);
        s.push('\n');
    }
    if let Some(t) = watermark_text(request, opts) {
        s.push_str(&t);
    }
    s
}

/// College name, title, description and the meta line, above a rule.
pub(super) struct Header {
    flow: Flow,
}

impl Header {
    pub(super) fn new(
        request: &PaperRequest,
        fonts: &FontBook,
        opts: &RenderOptions,
        question_count: usize,
    ) -> Self {
        let typo = &opts.typography;
        let width = opts.page.text_width();
        let meta = meta_line(request, question_count);
        let rows = [
            (request.college_name.trim(), FontStyle::Bold, typo.banner_size),
            (request.title.trim(), FontStyle::Bold, typo.title_size),
            (request.description.trim(), FontStyle::Italic, typo.font_size),
            (meta.as_str(), FontStyle::Regular, typo.font_size),
        ];
        let pieces = rows
            .into_iter()
            .filter(|(text, ..)| !text.is_empty())
            .map(|(text, style, size)| Piece::Lines {
                lines: build_lines(
                    &[Inline::text(text, style, size)],
                    fonts,
                    width,
                    typo.line_height,
                    size,
                ),
                indent: 0.0,
                align: CellAlign::Center,
            })
            .collect();
        Self {
            flow: Flow {
                pieces,
                width,
                fill: None,
                padding: 0.0,
            },
        }
    }

    pub(super) fn height(&self) -> f32 {
        self.flow.measure() + 2.0 * RULE_GAP
    }

    pub(super) fn draw(&self, content: &mut Content, fonts: &FontBook, page: &PageSetup) {
        let top = page.content_top();
        self.flow
            .draw(content, fonts, page.margin_left, top, page.height);
        let rule_y = page.height - (top + self.flow.measure() + RULE_GAP);
        content.save_state();
        content.set_line_width(0.8);
        content
            .move_to(page.margin_left, rule_y)
            .line_to(page.margin_left + page.text_width(), rule_y);
        content.stroke();
        content.restore_state();
    }
}

fn draw_footer(content: &mut Content, fonts: &FontBook, opts: &RenderOptions, text: &str) {
    let page = &opts.page;
    let size = opts.typography.footer_size;
    let lines = build_lines(
        &[Inline::text(text, FontStyle::Regular, size)],
        fonts,
        page.text_width(),
        opts.typography.line_height,
        size,
    );
    let y_top = page.content_bottom() + ((page.footer_height - lines_height(&lines)) / 2.0).max(0.0);
    content.save_state();
    content.set_fill_gray(0.35);
    render_lines(
        content,
        fonts,
        &lines,
        page.margin_left,
        y_top,
        page.text_width(),
        CellAlign::Center,
        page.height,
    );
    content.restore_state();
}

fn draw_column_rule(content: &mut Content, page: &PageSetup, column_top: f32) {
    let x = page.margin_left + page.column_width() + page.column_gap / 2.0;
    content.save_state();
    content.set_line_width(0.4);
    content.set_stroke_gray(0.6);
    content
        .move_to(x, page.height - column_top)
        .line_to(x, page.height - page.content_bottom());
    content.stroke();
    content.restore_state();
}

pub(super) enum Watermark {
    Image { name: String, aspect: f32 },
    Text(String),
}

/// Reads the logo from a data URI or over http(s).
fn load_logo(src: &str, timeout: Duration) -> Result<Vec<u8>, String> {
    let src = src.trim();
    if let Some(rest) = src.strip_prefix("data:") {
        let (header, payload) = rest.split_once(',').ok_or("data URI without payload")?;
        if !header.ends_with(";base64") {
            return Err("only base64 data URIs are supported".into());
        }
        let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        return STANDARD.decode(cleaned).map_err(|e| e.to_string());
    }
    if !(src.starts_with("http://") || src.starts_with("https://")) {
        return Err(format!("unsupported logo source {src:?}"));
    }
    let agent = ureq::AgentBuilder::new().timeout(timeout).build();
    let response = agent.get(src).call().map_err(|e| e.to_string())?;
    let mut data = Vec::new();
    response
        .into_reader()
        .take(MAX_LOGO_BYTES)
        .read_to_end(&mut data)
        .map_err(|e| e.to_string())?;
    if data.is_empty() {
        return Err("empty response".into());
    }
    Ok(data)
}

/// Picks the watermark: the logo when it loads and decodes, else text.
/// A logo that fails is recorded as a document-level marker.
pub(super) fn resolve_watermark(
    request: &PaperRequest,
    opts: &RenderOptions,
    images: &mut ImageRegistry,
    pdf: &mut Pdf,
    refs: &mut RefAlloc,
    markers: &mut Vec<DegradedMarker>,
) -> Option<Watermark> {
    if !opts.watermark.enabled {
        return None;
    }
    if let Some(src) = request.college_logo.as_deref().filter(|s| !s.trim().is_empty()) {
        let registered = load_logo(src, opts.logo_timeout).and_then(|data| {
            images
                .register_bytes(&data, pdf, &mut || refs.bump())
                .map_err(|e| e.to_string())
        });
        match registered {
            Ok(img) => {
                return Some(Watermark::Image {
                    aspect: img.aspect(),
                    name: img.name,
                });
            }
            Err(reason) => {
                log::warn!("college logo unavailable, using a text watermark: {reason}");
                markers.push(DegradedMarker {
                    question: None,
                    kind: DegradationKind::LogoUnavailable,
                    detail: reason,
                });
            }
        }
    }
    watermark_text(request, opts).map(Watermark::Text)
}

fn draw_watermark(content: &mut Content, fonts: &FontBook, opts: &RenderOptions, mark: &Watermark) {
    let page = &opts.page;
    let (sin, cos) = opts.watermark.rotation_deg.to_radians().sin_cos();
    content.save_state();
    content.set_parameters(Name(WATERMARK_GS));
    content.transform([cos, sin, -sin, cos, page.width / 2.0, page.height / 2.0]);
    match mark {
        Watermark::Image { name, aspect } => {
            let w = page.text_width() * 0.5;
            let h = w * aspect;
            content.transform([w, 0.0, 0.0, h, -w / 2.0, -h / 2.0]);
            content.x_object(Name(name.as_bytes()));
        }
        Watermark::Text(text) => {
            let font = fonts.get(FontStyle::Bold);
            let max_w = page.width.hypot(page.height) * 0.7;
            let mut size = WATERMARK_TEXT_SIZE;
            let natural = font.word_width(text, size);
            if natural > max_w {
                size *= max_w / natural;
            }
            let w = font.word_width(text, size);
            content.set_fill_gray(0.3);
            content.begin_text();
            content.set_font(Name(font.pdf_name.as_bytes()), size);
            content.next_line(-w / 2.0, -size / 3.0);
            content.show(Str(&font.encode(text)));
            content.end_text();
        }
    }
    content.restore_state();
}

/// Second pass over finished pages: footer, column rule, then the
/// watermark on top of everything already drawn.
pub(super) fn finish_pages(
    pages: &mut [PageCanvas],
    request: &PaperRequest,
    fonts: &FontBook,
    opts: &RenderOptions,
    watermark: Option<&Watermark>,
) {
    let total = pages.len();
    for (i, canvas) in pages.iter_mut().enumerate() {
        let footer = footer_text(&request.title, i + 1, total);
        draw_footer(&mut canvas.content, fonts, opts, &footer);
        canvas.record.footer = footer;
        draw_column_rule(&mut canvas.content, &opts.page, canvas.column_top);
        if let Some(mark) = watermark {
            draw_watermark(&mut canvas.content, fonts, opts, mark);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn footer_names_the_paper() {
        assert_eq!(footer_text("Physics Mock", 2, 5), "Physics Mock — Page 2 of 5");
        assert_eq!(footer_text("  ", 1, 1), "Page 1 of 1");
    }

    #[test]
    fn meta_line_skips_missing_fields() {
        let request = PaperRequest {
            total_marks: Some(50),
            ..Default::default()
        };
        assert_eq!(meta_line(&request, 12), "Total Marks: 50 | Questions: 12");
    }

    #[test]
    fn data_uri_logo_decodes() {
        let data = load_logo("data:image/png;base64,AAEC", Duration::from_secs(1)).unwrap();
        assert_eq!(data, vec![0, 1, 2]);
        assert!(load_logo("ftp://example.com/logo.png", Duration::from_secs(1)).is_err());
    }
}

use pdf_writer::{Content, Name, Str};

use crate::fonts::{FontBook, FontStyle};
use crate::model::CellAlign;

use super::table::TableLayout;

/// Share of an inline image drawn above the baseline.
const IMAGE_ASCENT: f32 = 0.7;
/// Vertical gap between the pieces of one block.
const PIECE_GAP: f32 = 2.0;

/// Inline content fed to the line builder.
pub(super) enum Inline {
    Text {
        text: String,
        style: FontStyle,
        size: f32,
    },
    /// Rasterized math, drawn as an image XObject.
    Image {
        name: String,
        width: f32,
        height: f32,
    },
    /// Forced line end.
    Break,
}

impl Inline {
    pub(super) fn text(text: impl Into<String>, style: FontStyle, size: f32) -> Self {
        Inline::Text {
            text: text.into(),
            style,
            size,
        }
    }
}

pub(super) struct WordChunk {
    pub(super) style: FontStyle,
    pub(super) text: String,
    pub(super) font_size: f32,
    pub(super) x_offset: f32,
    pub(super) width: f32,
    /// XObject name and height for image chunks.
    pub(super) image: Option<(String, f32)>,
}

pub(super) struct TextLine {
    pub(super) chunks: Vec<WordChunk>,
    pub(super) total_width: f32,
    /// Baseline distance from the top of the line.
    pub(super) ascent: f32,
    pub(super) height: f32,
}

struct LineBuilder<'a> {
    fonts: &'a FontBook,
    max_width: f32,
    line_ratio: f32,
    base_size: f32,
    lines: Vec<TextLine>,
    chunks: Vec<WordChunk>,
    x: f32,
    prev_ended_with_ws: bool,
    prev_space_w: f32,
}

impl LineBuilder<'_> {
    fn text_extent(&self, style: FontStyle, size: f32) -> (f32, f32) {
        let font = self.fonts.get(style);
        let pitch = size * self.line_ratio;
        let above = font.ascent(size) + (pitch - font.line_height(size)).max(0.0) / 2.0;
        (above, (pitch - above).max(size * 0.2))
    }

    fn finish_line(&mut self) {
        let chunks = std::mem::take(&mut self.chunks);
        let mut above = 0.0f32;
        let mut below = 0.0f32;
        for c in &chunks {
            let (a, b) = match &c.image {
                Some((_, h)) => (h * IMAGE_ASCENT + 1.0, h * (1.0 - IMAGE_ASCENT) + 1.0),
                None => self.text_extent(c.style, c.font_size),
            };
            above = above.max(a);
            below = below.max(b);
        }
        if chunks.is_empty() {
            (above, below) = self.text_extent(FontStyle::Regular, self.base_size);
        }
        let total_width = chunks.last().map(|c| c.x_offset + c.width).unwrap_or(0.0);
        self.lines.push(TextLine {
            chunks,
            total_width,
            ascent: above,
            height: above + below,
        });
        self.x = 0.0;
    }

    /// Places one unbreakable chunk, wrapping first when it does not fit.
    fn place(&mut self, mut chunk: WordChunk, need_space: bool, space_w: f32) {
        let proposed = if need_space && !self.chunks.is_empty() {
            self.x + space_w
        } else {
            self.x
        };
        if !self.chunks.is_empty() && proposed + chunk.width > self.max_width {
            self.finish_line();
        } else {
            self.x = proposed;
        }
        chunk.x_offset = self.x;
        self.x += chunk.width;
        self.chunks.push(chunk);
    }

    fn push_text(&mut self, text: &str, style: FontStyle, size: f32) {
        let fonts = self.fonts;
        let font = fonts.get(style);
        let space_w = font.space_width(size);
        let starts_with_ws = text.starts_with(char::is_whitespace);

        for (i, word) in text.split_whitespace().enumerate() {
            // The space belongs to whichever item held the whitespace.
            let need_space = i > 0 || starts_with_ws || self.prev_ended_with_ws;
            let gap = if i > 0 || starts_with_ws {
                space_w
            } else {
                self.prev_space_w
            };
            let width = font.word_width(word, size);
            if width <= self.max_width {
                self.place(text_chunk(word.to_string(), style, size, width), need_space, gap);
                continue;
            }
            for (n, piece) in hard_break(word, self.max_width, |c| font.char_width_1000(c) * size / 1000.0)
                .into_iter()
                .enumerate()
            {
                if n > 0 {
                    self.finish_line();
                }
                let w = font.word_width(&piece, size);
                self.place(text_chunk(piece, style, size, w), n == 0 && need_space, gap);
            }
        }
        self.prev_ended_with_ws = text.ends_with(char::is_whitespace);
        self.prev_space_w = space_w;
    }

    fn push(&mut self, item: &Inline) {
        match item {
            Inline::Text { text, style, size } => {
                for (i, part) in text.split('\n').enumerate() {
                    if i > 0 {
                        // A newline before any content is dropped; one on an
                        // empty line leaves a blank line.
                        if !self.chunks.is_empty() || !self.lines.is_empty() {
                            self.finish_line();
                        }
                        self.prev_ended_with_ws = false;
                    }
                    self.push_text(part, *style, *size);
                }
            }
            Inline::Image {
                name,
                width,
                height,
            } => {
                let need_space = self.prev_ended_with_ws;
                let chunk = WordChunk {
                    style: FontStyle::Regular,
                    text: String::new(),
                    font_size: self.base_size,
                    x_offset: 0.0,
                    width: *width,
                    image: Some((name.clone(), *height)),
                };
                let gap = self.prev_space_w;
                self.place(chunk, need_space, gap);
                self.prev_ended_with_ws = false;
            }
            Inline::Break => {
                self.finish_line();
                self.prev_ended_with_ws = false;
            }
        }
    }
}

fn text_chunk(text: String, style: FontStyle, size: f32, width: f32) -> WordChunk {
    WordChunk {
        style,
        text,
        font_size: size,
        x_offset: 0.0,
        width,
        image: None,
    }
}

/// Splits a word wider than `max_width` at character boundaries.
fn hard_break(word: &str, max_width: f32, char_width: impl Fn(char) -> f32) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut width = 0.0f32;
    for ch in word.chars() {
        let w = char_width(ch);
        if width + w > max_width && !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
            width = 0.0;
        }
        current.push(ch);
        width += w;
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Wraps inline items into lines no wider than `max_width`.
pub(super) fn build_lines(
    items: &[Inline],
    fonts: &FontBook,
    max_width: f32,
    line_ratio: f32,
    base_size: f32,
) -> Vec<TextLine> {
    let mut b = LineBuilder {
        fonts,
        max_width: max_width.max(1.0),
        line_ratio,
        base_size,
        lines: Vec::new(),
        chunks: Vec::new(),
        x: 0.0,
        prev_ended_with_ws: false,
        prev_space_w: 0.0,
    };
    for item in items {
        b.push(item);
    }
    if !b.chunks.is_empty() || b.lines.is_empty() {
        b.finish_line();
    }
    while b.lines.len() > 1 && b.lines.last().is_some_and(|l| l.chunks.is_empty()) {
        b.lines.pop();
    }
    b.lines
}

pub(super) fn lines_height(lines: &[TextLine]) -> f32 {
    lines.iter().map(|l| l.height).sum()
}

/// Draws lines whose top edge is `y_top` (from the page top).
pub(super) fn render_lines(
    content: &mut Content,
    fonts: &FontBook,
    lines: &[TextLine],
    x: f32,
    y_top: f32,
    width: f32,
    align: CellAlign,
    page_height: f32,
) {
    let mut top = y_top;
    for line in lines {
        let baseline = page_height - (top + line.ascent);
        let start_x = match align {
            CellAlign::Left => x,
            CellAlign::Center => x + ((width - line.total_width) / 2.0).max(0.0),
            CellAlign::Right => x + (width - line.total_width).max(0.0),
        };

        if line.chunks.iter().any(|c| c.image.is_none() && !c.text.is_empty()) {
            content.begin_text();
            let (mut td_x, mut td_y) = (0.0f32, 0.0f32);
            let mut cur: Option<(FontStyle, f32)> = None;
            for chunk in line.chunks.iter().filter(|c| c.image.is_none()) {
                if cur != Some((chunk.style, chunk.font_size)) {
                    let font = fonts.get(chunk.style);
                    content.set_font(Name(font.pdf_name.as_bytes()), chunk.font_size);
                    cur = Some((chunk.style, chunk.font_size));
                }
                let cx = start_x + chunk.x_offset;
                content.next_line(cx - td_x, baseline - td_y);
                (td_x, td_y) = (cx, baseline);
                content.show(Str(&fonts.get(chunk.style).encode(&chunk.text)));
            }
            content.end_text();
        }

        for chunk in &line.chunks {
            if let Some((name, h)) = &chunk.image {
                let bottom = baseline - h * (1.0 - IMAGE_ASCENT);
                content.save_state();
                content.transform([chunk.width, 0.0, 0.0, *h, start_x + chunk.x_offset, bottom]);
                content.x_object(Name(name.as_bytes()));
                content.restore_state();
            }
        }
        top += line.height;
    }
}

/// One vertically stacked part of a block.
pub(super) enum Piece {
    Lines {
        lines: Vec<TextLine>,
        indent: f32,
        align: CellAlign,
    },
    Image {
        name: String,
        width: f32,
        height: f32,
    },
    Table(TableLayout),
}

impl Piece {
    fn height(&self) -> f32 {
        match self {
            Piece::Lines { lines, .. } => lines_height(lines),
            Piece::Image { height, .. } => *height,
            Piece::Table(t) => t.height(),
        }
    }
}

/// A measured, drawable block of the column flow.
pub(super) struct Flow {
    pub(super) pieces: Vec<Piece>,
    pub(super) width: f32,
    /// Gray level of a background band behind the whole block.
    pub(super) fill: Option<f32>,
    pub(super) padding: f32,
}

impl Flow {
    pub(super) fn new(width: f32) -> Self {
        Self {
            pieces: Vec::new(),
            width,
            fill: None,
            padding: 0.0,
        }
    }

    pub(super) fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// Height the block occupies. Pure; drawing uses the same lines.
    pub(super) fn measure(&self) -> f32 {
        let gaps = PIECE_GAP * self.pieces.len().saturating_sub(1) as f32;
        self.pieces.iter().map(Piece::height).sum::<f32>() + gaps + 2.0 * self.padding
    }

    pub(super) fn draw(
        &self,
        content: &mut Content,
        fonts: &FontBook,
        x: f32,
        y_top: f32,
        page_height: f32,
    ) {
        if let Some(gray) = self.fill {
            content.save_state();
            content.set_fill_gray(gray);
            content
                .rect(x, page_height - (y_top + self.measure()), self.width, self.measure())
                .fill_nonzero();
            content.restore_state();
        }

        let inner_x = x + self.padding;
        let inner_w = self.width - 2.0 * self.padding;
        let mut y = y_top + self.padding;
        for (i, piece) in self.pieces.iter().enumerate() {
            if i > 0 {
                y += PIECE_GAP;
            }
            match piece {
                Piece::Lines {
                    lines,
                    indent,
                    align,
                } => render_lines(
                    content,
                    fonts,
                    lines,
                    inner_x + indent,
                    y,
                    inner_w - indent,
                    *align,
                    page_height,
                ),
                Piece::Image {
                    name,
                    width,
                    height,
                } => {
                    let ix = inner_x + ((inner_w - width) / 2.0).max(0.0);
                    content.save_state();
                    content.transform([*width, 0.0, 0.0, *height, ix, page_height - (y + height)]);
                    content.x_object(Name(name.as_bytes()));
                    content.restore_state();
                }
                Piece::Table(t) => t.draw(content, fonts, inner_x, y, page_height),
            }
            y += piece.height();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::hard_break;

    #[test]
    fn hard_break_respects_width() {
        let pieces = hard_break("abcdefghij", 30.0, |_| 10.0);
        assert_eq!(pieces, vec!["abc", "def", "ghi", "j"]);
    }

    #[test]
    fn hard_break_keeps_single_wide_char() {
        let pieces = hard_break("WW", 5.0, |_| 10.0);
        assert_eq!(pieces, vec!["W", "W"]);
    }
}

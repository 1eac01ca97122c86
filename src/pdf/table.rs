use pdf_writer::Content;

use crate::fonts::{FontBook, FontStyle};
use crate::math::to_unicode;
use crate::model::CellAlign;
use crate::normalize::{Token, tokenize};

use super::layout::{Inline, TextLine, build_lines, lines_height, render_lines};

const CELL_PAD: f32 = 2.5;
const BORDER_WIDTH: f32 = 0.5;
const HEADER_FILL: f32 = 0.9;

/// Plain text of a cell with math transliterated, escapes resolved and
/// placeholders dropped. Used to gather the glyphs a cell may need.
pub(super) fn cell_text(cell: &str) -> String {
    let mut out = String::with_capacity(cell.len());
    for token in tokenize(cell) {
        match token {
            Token::Plain(s) => out.push_str(&s.replace("\\$", "$")),
            Token::Math { body, .. } => out.push_str(&to_unicode(body)),
            Token::LoneDollar { block } => out.push_str(if block { "$$" } else { "$" }),
            Token::Placeholder(_) => {}
        }
    }
    out
}

/// Inline runs of one cell. `math` renders each formula span.
pub(super) fn cell_runs(
    cell: &str,
    style: FontStyle,
    size: f32,
    math: &mut impl FnMut(&str) -> Inline,
) -> Vec<Inline> {
    let mut runs = Vec::new();
    for token in tokenize(cell) {
        match token {
            Token::Plain(s) => runs.push(Inline::text(s.replace("\\$", "$"), style, size)),
            Token::Math { body, .. } => runs.push(math(body)),
            Token::LoneDollar { block } => {
                runs.push(Inline::text(if block { "$$" } else { "$" }, style, size))
            }
            Token::Placeholder(_) => {}
        }
    }
    runs
}

/// Widest a formula inside a cell may be drawn.
pub(super) fn cell_max_width(table_width: f32) -> f32 {
    (table_width - 2.0 * CELL_PAD).max(1.0)
}

/// Narrowest a run can be squeezed: its longest word, or the formula image.
fn min_run_width(run: &Inline, fonts: &FontBook) -> f32 {
    match run {
        Inline::Text { text, style, size } => {
            let font = fonts.get(*style);
            text.split_whitespace()
                .map(|w| font.word_width(w, *size))
                .fold(0.0f32, f32::max)
        }
        Inline::Image { width, .. } => *width,
        Inline::Break => 0.0,
    }
}

/// Start from equal columns, then widen columns whose longest word does not
/// fit and take the space from the others. Total width is preserved.
fn auto_fit_columns(rows: &[CellRow], ncols: usize, width: f32, fonts: &FontBook) -> Vec<f32> {
    let mut widths = vec![width / ncols as f32; ncols];
    let mut min_widths = vec![0.0f32; ncols];
    for row in rows {
        for (col, runs) in row.cells.iter().enumerate().take(ncols) {
            for run in runs {
                let w = min_run_width(run, fonts) + 2.0 * CELL_PAD;
                min_widths[col] = min_widths[col].max(w);
            }
        }
    }

    let mut extra_needed = 0.0f32;
    let mut shrinkable = 0.0f32;
    for (w, &min) in widths.iter_mut().zip(&min_widths) {
        if min > *w {
            extra_needed += min - *w;
            *w = min;
        } else {
            shrinkable += *w - min;
        }
    }
    if extra_needed > 0.0 && shrinkable > 0.0 {
        let factor = extra_needed.min(shrinkable) / shrinkable;
        for (w, &min) in widths.iter_mut().zip(&min_widths) {
            if *w > min {
                *w -= (*w - min) * factor;
            }
        }
    }
    let total: f32 = widths.iter().sum();
    if total > 0.0 && (total - width).abs() > 0.01 {
        let scale = width / total;
        widths.iter_mut().for_each(|w| *w *= scale);
    }
    widths
}

/// A table row whose cells are already inline runs.
pub(super) struct CellRow {
    pub(super) header: bool,
    pub(super) cells: Vec<Vec<Inline>>,
}

struct RowLayout {
    height: f32,
    header: bool,
    cells: Vec<Vec<TextLine>>,
}

pub(super) struct TableLayout {
    col_widths: Vec<f32>,
    alignments: Vec<CellAlign>,
    rows: Vec<RowLayout>,
}

impl TableLayout {
    pub(super) fn height(&self) -> f32 {
        self.rows.iter().map(|r| r.height).sum()
    }

    pub(super) fn draw(
        &self,
        content: &mut Content,
        fonts: &FontBook,
        x: f32,
        y_top: f32,
        page_height: f32,
    ) {
        let table_w: f32 = self.col_widths.iter().sum();
        let mut row_top = y_top;
        for row in &self.rows {
            if row.header {
                content.save_state();
                content.set_fill_gray(HEADER_FILL);
                content
                    .rect(x, page_height - (row_top + row.height), table_w, row.height)
                    .fill_nonzero();
                content.restore_state();
            }
            let mut cell_x = x;
            for (c, lines) in row.cells.iter().enumerate() {
                let w = self.col_widths[c];
                let align = self.alignments.get(c).copied().unwrap_or(CellAlign::Left);
                render_lines(
                    content,
                    fonts,
                    lines,
                    cell_x + CELL_PAD,
                    row_top + CELL_PAD,
                    w - 2.0 * CELL_PAD,
                    align,
                    page_height,
                );
                cell_x += w;
            }
            row_top += row.height;
        }

        // Grid
        content.save_state();
        content.set_line_width(BORDER_WIDTH);
        content.set_stroke_gray(0.35);
        let bottom = page_height - row_top;
        let top = page_height - y_top;
        let mut y = top;
        content.move_to(x, y).line_to(x + table_w, y);
        for row in &self.rows {
            y -= row.height;
            content.move_to(x, y).line_to(x + table_w, y);
        }
        let mut cx = x;
        content.move_to(cx, top).line_to(cx, bottom);
        for w in &self.col_widths {
            cx += w;
            content.move_to(cx, top).line_to(cx, bottom);
        }
        content.stroke();
        content.restore_state();
    }
}

pub(super) fn layout_table(
    rows: Vec<CellRow>,
    alignments: &[CellAlign],
    fonts: &FontBook,
    width: f32,
    size: f32,
    line_ratio: f32,
) -> TableLayout {
    let ncols = alignments.len().max(1);
    let col_widths = auto_fit_columns(&rows, ncols, width, fonts);

    let rows = rows
        .into_iter()
        .map(|row| {
            let cells: Vec<Vec<TextLine>> = (0..ncols)
                .map(|c| {
                    let runs = row.cells.get(c).map(Vec::as_slice).unwrap_or(&[]);
                    build_lines(runs, fonts, col_widths[c] - 2.0 * CELL_PAD, line_ratio, size)
                })
                .collect();
            let height = cells
                .iter()
                .map(|l| lines_height(l))
                .fold(0.0f32, f32::max)
                + 2.0 * CELL_PAD;
            RowLayout {
                height,
                header: row.header,
                cells,
            }
        })
        .collect::<Vec<_>>();

    log::debug!(
        "table layout: {ncols} cols, {} rows, {:.1}pt",
        rows.len(),
        rows.iter().map(|r| r.height).sum::<f32>()
    );

    TableLayout {
        col_widths,
        alignments: alignments.to_vec(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_math_is_transliterated() {
        assert_eq!(cell_text("$\\alpha$ and \\$5"), "α and $5");
    }

    #[test]
    fn cell_math_goes_through_the_renderer() {
        let mut seen = Vec::new();
        let runs = cell_runs("area $x^2$ cm", FontStyle::Bold, 9.0, &mut |expr| {
            seen.push(expr.to_string());
            Inline::Image {
                name: "Im1".into(),
                width: 12.0,
                height: 6.0,
            }
        });
        assert_eq!(seen, ["x^2"]);
        assert_eq!(runs.len(), 3);
        assert!(matches!(&runs[0], Inline::Text { text, style: FontStyle::Bold, .. } if text == "area "));
        assert!(matches!(runs[1], Inline::Image { width, .. } if width == 12.0));
    }
}

//! Question preparation and the measure → advance → draw → commit loop.

use std::collections::HashSet;

use pdf_writer::{Content, Pdf};

use crate::config::RenderOptions;
use crate::error::{Error, Result};
use crate::fonts::{FontBook, FontStyle};
use crate::math::{MathRenderer, RasterError, to_unicode};
use crate::model::{
    AnswerRef, BlockKind, CellAlign, DegradationKind, DegradedMarker, MathPayload, PageRecord,
    PaperRequest, PlacedBlock, Question, RichTextBlock, Table,
};
use crate::normalize::{Segment, normalize};

use super::RefAlloc;
use super::chrome;
use super::columns::{ColumnGeometry, ColumnLayoutEngine};
use super::images::{ImageRegistry, RegisteredImage};
use super::layout::{Flow, Inline, Piece, build_lines};
use super::table::{CellRow, cell_max_width, cell_runs, cell_text, layout_table};

const OPTION_INDENT: f32 = 8.0;
const DETAIL_INDENT: f32 = 8.0;
/// Largest share of the column height one image may take.
const IMAGE_MAX_SHARE: f32 = 0.4;
const DEFAULT_SUBJECT: &str = "General";

pub(super) struct AnswerLine {
    /// Option letter when the answer names one of the options.
    label: Option<String>,
    text: RichTextBlock,
    difficulty: Option<String>,
}

pub(super) struct PreparedQuestion<'q> {
    pub(super) number: usize,
    source: &'q Question,
    content: RichTextBlock,
    options: Vec<RichTextBlock>,
    answer: Option<AnswerLine>,
    /// (label, body) per solution part, in print order.
    solution: Vec<(String, RichTextBlock)>,
    hints: Vec<RichTextBlock>,
}

impl PreparedQuestion<'_> {
    fn blocks(&self) -> impl Iterator<Item = &RichTextBlock> {
        std::iter::once(&self.content)
            .chain(&self.options)
            .chain(self.answer.iter().map(|a| &a.text))
            .chain(self.solution.iter().map(|(_, b)| b))
            .chain(&self.hints)
    }
}

pub(super) struct Section<'q> {
    pub(super) subject: String,
    pub(super) questions: Vec<PreparedQuestion<'q>>,
}

/// Option label: A..Z, then plain numbers.
pub(super) fn option_label(i: usize) -> String {
    if i < 26 {
        char::from(b'A' + i as u8).to_string()
    } else {
        (i + 1).to_string()
    }
}

fn resolve_answer(answer: &AnswerRef, options: &[String]) -> std::result::Result<usize, String> {
    match answer {
        AnswerRef::Index(i) if *i < options.len() => Ok(*i),
        AnswerRef::Index(i) => Err(i.to_string()),
        AnswerRef::Text(s) => {
            let t = s.trim();
            let t = t.strip_prefix('(').and_then(|t| t.strip_suffix(')')).unwrap_or(t);
            let mut chars = t.chars();
            if let (Some(c), None) = (chars.next(), chars.next())
                && c.is_ascii_alphabetic()
            {
                let i = (c.to_ascii_uppercase() as u8 - b'A') as usize;
                if i < options.len() {
                    return Ok(i);
                }
            }
            options
                .iter()
                .position(|o| o.trim().eq_ignore_ascii_case(s.trim()))
                .ok_or_else(|| s.trim().to_string())
        }
    }
}

/// Filters, normalizes and groups the questions. The only place a request
/// can be rejected.
pub(super) fn prepare<'q>(
    request: &'q PaperRequest,
    opts: &RenderOptions,
) -> Result<Vec<Section<'q>>> {
    if request.questions.is_empty() {
        return Err(Error::NoQuestions);
    }
    let valid: Vec<&Question> = request
        .questions
        .iter()
        .filter(|q| !q.content.trim().is_empty())
        .collect();
    if valid.is_empty() {
        return Err(Error::NoValidQuestions(request.questions.len()));
    }
    if valid.len() < request.questions.len() {
        log::warn!(
            "skipping {} question(s) without content",
            request.questions.len() - valid.len()
        );
    }

    let include_answers = opts.include_answers.unwrap_or(request.include_answers);
    let with_solutions = opts.with_solutions.unwrap_or(request.with_solutions);
    let with_hints = opts.with_hints.unwrap_or(request.with_hints);

    let mut sections: Vec<Section<'q>> = Vec::new();
    for q in valid {
        let subject = match q.subject.trim() {
            "" => DEFAULT_SUBJECT,
            s => s,
        };
        let idx = match sections.iter().position(|s| s.subject == subject) {
            Some(i) => i,
            None => {
                sections.push(Section {
                    subject: subject.to_string(),
                    questions: Vec::new(),
                });
                sections.len() - 1
            }
        };
        sections[idx]
            .questions
            .push(prepare_question(q, include_answers, with_solutions, with_hints));
    }

    let mut number = 0;
    for q in sections.iter_mut().flat_map(|s| s.questions.iter_mut()) {
        number += 1;
        q.number = number;
    }
    log::debug!("{number} question(s) in {} section(s)", sections.len());
    Ok(sections)
}

fn prepare_question<'q>(
    q: &'q Question,
    include_answers: bool,
    with_solutions: bool,
    with_hints: bool,
) -> PreparedQuestion<'q> {
    let options: Vec<RichTextBlock> = q.options.iter().map(|o| normalize(o)).collect();

    let answer = include_answers.then(|| {
        let difficulty = q
            .difficulty
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        match q.correct_answer.as_ref().map(|a| resolve_answer(a, &q.options)) {
            Some(Ok(i)) => AnswerLine {
                label: Some(option_label(i)),
                text: options[i].clone(),
                difficulty,
            },
            Some(Err(free)) => AnswerLine {
                label: None,
                text: normalize(&free),
                difficulty,
            },
            None => AnswerLine {
                label: None,
                text: RichTextBlock::default(),
                difficulty,
            },
        }
    });
    // Nothing to print.
    let answer = answer.filter(|a| {
        a.label.is_some() || !a.text.text.is_empty() || a.difficulty.is_some()
    });

    let mut solution = Vec::new();
    if let Some(s) = q.solution.as_ref().filter(|s| with_solutions && !s.is_empty()) {
        let mut part = |label: String, raw: &str| {
            if !raw.trim().is_empty() {
                solution.push((label, normalize(raw)));
            }
        };
        if let Some(m) = &s.methodology {
            part("Methodology:".into(), m);
        }
        for (i, step) in s.steps.iter().enumerate() {
            part(format!("Step {}:", i + 1), step);
        }
        let concepts: Vec<&str> = s
            .key_concepts
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect();
        if !concepts.is_empty() {
            part("Key concepts:".into(), &concepts.join(", "));
        }
        if let Some(f) = &s.final_explanation {
            part("Final explanation:".into(), f);
        }
    }

    let hints = if with_hints {
        q.hints
            .iter()
            .filter(|h| !h.trim().is_empty())
            .map(|h| normalize(h))
            .collect()
    } else {
        Vec::new()
    };

    PreparedQuestion {
        number: 0,
        source: q,
        content: normalize(&q.content),
        options,
        answer,
        solution,
        hints,
    }
}

/// Every character any prepared question may draw, including the raw text
/// of the fallback rendering.
pub(super) fn collect_chars(sections: &[Section<'_>], chars: &mut HashSet<char>) {
    chars.extend((32u8..=126).map(char::from));
    for q in sections.iter().flat_map(|s| &s.questions) {
        chars.extend(q.source.content.chars());
        q.source.options.iter().for_each(|o| chars.extend(o.chars()));
        for block in q.blocks() {
            for seg in block.segments() {
                match seg {
                    Segment::Text(t) => chars.extend(t.chars()),
                    Segment::Math(m) => chars.extend(to_unicode(&m.source).chars()),
                    Segment::Table(t) => {
                        for cell in t.header.iter().flatten().chain(t.rows.iter().flatten()) {
                            chars.extend(cell_text(cell).chars());
                        }
                    }
                    Segment::Image(_) | Segment::Missing => {}
                }
            }
        }
        if let Some(d) = q.answer.as_ref().and_then(|a| a.difficulty.as_ref()) {
            chars.extend(d.chars());
        }
    }
    for s in sections {
        chars.extend(s.subject.to_uppercase().chars());
    }
}

/// Math spans of one question that fell back to text.
#[derive(Default)]
struct MathTally {
    spans: usize,
    reason: Option<RasterError>,
}

impl MathTally {
    fn note(&mut self, reason: RasterError) {
        self.spans += 1;
        self.reason = Some(reason);
    }
}

pub(super) struct PageCanvas {
    pub(super) content: Content,
    pub(super) record: PageRecord,
    /// Where the columns start on this page.
    pub(super) column_top: f32,
}

impl PageCanvas {
    fn new(column_top: f32) -> Self {
        Self {
            content: Content::new(),
            record: PageRecord::default(),
            column_top,
        }
    }
}

pub(super) struct Composed {
    pub(super) pdf: Pdf,
    pub(super) refs: RefAlloc,
    pub(super) images: ImageRegistry,
    pub(super) pages: Vec<PageCanvas>,
    pub(super) markers: Vec<DegradedMarker>,
    pub(super) geometry: ColumnGeometry,
}

pub(super) struct Composer<'a> {
    opts: &'a RenderOptions,
    fonts: &'a FontBook,
    math: MathRenderer<'a>,
    pdf: Pdf,
    refs: RefAlloc,
    images: ImageRegistry,
    engine: ColumnLayoutEngine,
    pages: Vec<PageCanvas>,
    markers: Vec<DegradedMarker>,
    /// Subject of the section in progress, repeated on new pages.
    banner: Option<String>,
}

impl<'a> Composer<'a> {
    pub(super) fn new(
        opts: &'a RenderOptions,
        fonts: &'a FontBook,
        math: MathRenderer<'a>,
        pdf: Pdf,
        refs: RefAlloc,
    ) -> Self {
        let engine = ColumnLayoutEngine::new(ColumnGeometry::from_page(&opts.page));
        let first = PageCanvas::new(engine.column_top());
        Self {
            opts,
            fonts,
            math,
            pdf,
            refs,
            images: ImageRegistry::default(),
            engine,
            pages: vec![first],
            markers: Vec::new(),
            banner: None,
        }
    }

    pub(super) fn finish(self) -> Composed {
        Composed {
            geometry: *self.engine.geometry(),
            pdf: self.pdf,
            refs: self.refs,
            images: self.images,
            pages: self.pages,
            markers: self.markers,
        }
    }

    /// Draws the paper header across page 1 and keeps the columns below it.
    pub(super) fn place_header(&mut self, header: &chrome::Header) {
        let page = &self.opts.page;
        let first = &mut self.pages[0];
        header.draw(&mut first.content, self.fonts, page);
        first.record.has_title_header = true;
        self.engine.reserve_full_width(header.height());
        first.column_top = self.engine.column_top();
    }

    pub(super) fn compose_section(&mut self, section: &Section<'_>) {
        for (i, q) in section.questions.iter().enumerate() {
            let blocks = self.question_blocks(q);
            if i == 0 {
                let keep = blocks.first().map(|(_, f)| f.measure()).unwrap_or(0.0);
                self.open_section(&section.subject, keep);
            } else {
                self.engine.skip(self.opts.page.question_spacing);
            }
            for (kind, flow) in &blocks {
                self.place(*kind, Some(q.number), flow, 0.0);
            }
        }
    }

    fn open_section(&mut self, subject: &str, keep_with_next: f32) {
        let opts = self.opts;
        let typo = &opts.typography;
        let label = subject.to_uppercase();
        self.banner = None;
        self.engine.set_page_reserve(0.0);
        self.engine.skip(opts.page.question_spacing);

        let flow = chrome::banner_flow(&label, self.fonts, typo, self.engine.geometry().column_width);
        let idx = self.place(BlockKind::Banner, None, &flow, keep_with_next);
        let record = &mut self.pages[idx].record;
        if record.banner.is_none() {
            record.banner = Some(label.clone());
        }

        let continued = chrome::banner_flow(
            &chrome::continued_label(&label),
            self.fonts,
            typo,
            opts.page.text_width(),
        );
        self.engine
            .set_page_reserve(continued.measure() + opts.page.block_spacing);
        self.banner = Some(label);
    }

    /// Blocks of one question, or its plain fallback when preparing them
    /// failed.
    fn question_blocks(&mut self, q: &PreparedQuestion<'_>) -> Vec<(BlockKind, Flow)> {
        let mut tally = MathTally::default();
        let built = self
            .embed_images(q)
            .and_then(|_| self.build_blocks(q, &mut tally));
        match built {
            Ok(blocks) => {
                for d in q.blocks().flat_map(|b| &b.degradations) {
                    log::warn!("question {}: {}", q.number, d.detail);
                    self.mark(Some(q.number), d.kind, d.detail.clone());
                }
                if let Some(reason) = tally.reason {
                    let detail = format!("{} math span(s) drawn as text: {reason}", tally.spans);
                    if matches!(reason, RasterError::Unavailable) {
                        log::debug!("question {}: {detail}", q.number);
                    } else {
                        log::warn!("question {}: {detail}", q.number);
                    }
                    self.mark(Some(q.number), DegradationKind::MathFallback, detail);
                }
                blocks
            }
            Err(e) => {
                log::warn!("question {} falls back to plain rendering: {e}", q.number);
                self.mark(Some(q.number), DegradationKind::QuestionFallback, e.to_string());
                vec![(BlockKind::Fallback, self.fallback_flow(q))]
            }
        }
    }

    /// All of a question's images go in together, so a broken one leaves
    /// nothing of that question in the document.
    fn embed_images(&mut self, q: &PreparedQuestion<'_>) -> Result<usize> {
        let mut assets = Vec::new();
        for block in q.blocks() {
            for seg in block.segments() {
                if let Segment::Image(asset) = seg {
                    assets.push(asset);
                }
            }
        }
        let refs = &mut self.refs;
        self.images
            .register_all(assets, &mut self.pdf, &mut || refs.bump())
    }

    fn mark(&mut self, question: Option<usize>, kind: DegradationKind, detail: String) {
        self.markers.push(DegradedMarker {
            question,
            kind,
            detail,
        });
    }

    fn build_blocks(
        &mut self,
        q: &PreparedQuestion<'_>,
        tally: &mut MathTally,
    ) -> Result<Vec<(BlockKind, Flow)>> {
        let size = self.opts.typography.font_size;
        let mut blocks = Vec::new();

        let number = vec![Inline::text(format!("{}. ", q.number), FontStyle::Bold, size)];
        blocks.push((
            BlockKind::QuestionBody,
            self.rich_flow(number, &q.content, None, 0.0, tally)?,
        ));

        for (i, opt) in q.options.iter().enumerate() {
            let label = vec![Inline::text(
                format!("({}) ", option_label(i)),
                FontStyle::Regular,
                size,
            )];
            blocks.push((
                BlockKind::Option,
                self.rich_flow(label, opt, None, OPTION_INDENT, tally)?,
            ));
        }

        if let Some(a) = &q.answer {
            let mut prefix = vec![Inline::text("Answer: ", FontStyle::Bold, size)];
            if let Some(l) = &a.label {
                prefix.push(Inline::text(format!("({l}) "), FontStyle::Bold, size));
            }
            let suffix = a.difficulty.as_ref().map(|d| {
                let sep = if a.label.is_some() || !a.text.text.is_empty() {
                    " | "
                } else {
                    ""
                };
                Inline::text(format!("{sep}Difficulty: {d}"), FontStyle::Italic, size)
            });
            blocks.push((
                BlockKind::Answer,
                self.rich_flow(prefix, &a.text, suffix, DETAIL_INDENT, tally)?,
            ));
        }

        for (label, body) in &q.solution {
            let prefix = vec![Inline::text(format!("{label} "), FontStyle::Bold, size)];
            blocks.push((
                BlockKind::Solution,
                self.rich_flow(prefix, body, None, DETAIL_INDENT, tally)?,
            ));
        }

        for (i, hint) in q.hints.iter().enumerate() {
            let prefix = vec![Inline::text(format!("Hint {}: ", i + 1), FontStyle::Italic, size)];
            blocks.push((
                BlockKind::Hint,
                self.rich_flow(prefix, hint, None, DETAIL_INDENT, tally)?,
            ));
        }
        Ok(blocks)
    }

    /// Lays out one rich-text block as a flow of text runs, display math,
    /// images and tables. Only image embedding can fail.
    fn rich_flow(
        &mut self,
        prefix: Vec<Inline>,
        block: &RichTextBlock,
        suffix: Option<Inline>,
        indent: f32,
        tally: &mut MathTally,
    ) -> Result<Flow> {
        let typo = &self.opts.typography;
        let (size, ratio) = (typo.font_size, typo.line_height);
        let width = self.engine.geometry().column_width;
        let avail = (width - indent).max(1.0);

        let mut flow = Flow::new(width);
        let mut run = prefix;
        for seg in block.segments() {
            match seg {
                Segment::Text(t) => run.push(Inline::text(t, FontStyle::Regular, size)),
                Segment::Math(m) if !m.is_block => {
                    run.push(self.math_inline(&m.source, false, avail, tally));
                }
                Segment::Math(m) => {
                    self.flush(&mut flow, &mut run, indent);
                    let item = self.math_inline(&m.source, true, avail, tally);
                    flow.pieces.push(Piece::Lines {
                        lines: build_lines(&[item], self.fonts, avail, ratio, size),
                        indent,
                        align: CellAlign::Center,
                    });
                }
                Segment::Image(asset) => {
                    self.flush(&mut flow, &mut run, indent);
                    let refs = &mut self.refs;
                    let reg = self
                        .images
                        .register_asset(asset, &mut self.pdf, &mut || refs.bump())?;
                    let (w, h) = self.fit_image(&reg, avail);
                    flow.pieces.push(Piece::Image {
                        name: reg.name,
                        width: w,
                        height: h,
                    });
                }
                Segment::Table(t) => {
                    self.flush(&mut flow, &mut run, indent);
                    let rows = self.table_rows(t, width, tally);
                    flow.pieces.push(Piece::Table(layout_table(
                        rows,
                        &t.alignments,
                        self.fonts,
                        width,
                        size,
                        ratio,
                    )));
                }
                Segment::Missing => {}
            }
        }
        run.extend(suffix);
        self.flush(&mut flow, &mut run, indent);
        if flow.is_empty() {
            // Keeps an empty option visible as its label line.
            flow.pieces.push(Piece::Lines {
                lines: build_lines(&[], self.fonts, avail, ratio, size),
                indent,
                align: CellAlign::Left,
            });
        }
        Ok(flow)
    }

    /// Cell math goes through the same renderer as the running text.
    fn table_rows(&mut self, table: &Table, width: f32, tally: &mut MathTally) -> Vec<CellRow> {
        let size = self.opts.typography.font_size;
        let max_width = cell_max_width(width);
        let header = table.header.iter().map(|h| (true, h));
        let body = table.rows.iter().map(|r| (false, r));

        let mut rows = Vec::new();
        for (header, cells) in header.chain(body) {
            let style = if header { FontStyle::Bold } else { FontStyle::Regular };
            let mut runs = Vec::with_capacity(cells.len());
            for cell in cells {
                runs.push(cell_runs(cell, style, size, &mut |expr| {
                    self.math_inline(expr, false, max_width, tally)
                }));
            }
            rows.push(CellRow {
                header,
                cells: runs,
            });
        }
        rows
    }

    fn flush(&self, flow: &mut Flow, run: &mut Vec<Inline>, indent: f32) {
        let blank = run.iter().all(|i| match i {
            Inline::Text { text, .. } => text.trim().is_empty(),
            Inline::Image { .. } => false,
            Inline::Break => true,
        });
        if !blank {
            let typo = &self.opts.typography;
            let avail = (flow.width - indent).max(1.0);
            flow.pieces.push(Piece::Lines {
                lines: build_lines(run, self.fonts, avail, typo.line_height, typo.font_size),
                indent,
                align: CellAlign::Left,
            });
        }
        run.clear();
    }

    fn math_inline(
        &mut self,
        expr: &str,
        is_block: bool,
        max_width: f32,
        tally: &mut MathTally,
    ) -> Inline {
        let outcome = self.math.render(expr, is_block, max_width);
        if let Some(reason) = outcome.degraded {
            tally.note(reason);
        }
        let rendered = outcome.rendered;
        let fallback = match rendered.payload {
            MathPayload::Text(text) => {
                return Inline::text(text, FontStyle::Regular, rendered.font_size);
            }
            MathPayload::Image(png) => {
                let refs = &mut self.refs;
                match self
                    .images
                    .register_bytes(&png, &mut self.pdf, &mut || refs.bump())
                {
                    Ok(reg) => {
                        return Inline::Image {
                            name: reg.name,
                            width: rendered.width,
                            height: rendered.height,
                        };
                    }
                    Err(e) => {
                        log::warn!("formula image for {expr:?} not embedded: {e}");
                        tally.note(RasterError::Failed(e.to_string()));
                        self.math.render_text(expr, is_block, max_width)
                    }
                }
            }
        };
        let text = match fallback.payload {
            MathPayload::Text(t) => t,
            MathPayload::Image(_) => to_unicode(expr),
        };
        Inline::text(text, FontStyle::Regular, fallback.font_size)
    }

    /// Column width, aspect kept, height capped to a share of the column.
    fn fit_image(&self, img: &RegisteredImage, avail: f32) -> (f32, f32) {
        let aspect = img.aspect();
        let cap = self.engine.geometry().column_height() * IMAGE_MAX_SHARE;
        let (mut w, mut h) = (avail, avail * aspect);
        if h > cap {
            h = cap;
            w = h / aspect.max(f32::EPSILON);
        }
        (w, h)
    }

    fn fallback_flow(&self, q: &PreparedQuestion<'_>) -> Flow {
        let typo = &self.opts.typography;
        let size = typo.font_size;
        let width = self.engine.geometry().column_width;
        let mut items = vec![Inline::text(
            format!("{}. {}", q.number, q.source.content.trim()),
            FontStyle::Regular,
            size,
        )];
        for (i, o) in q.source.options.iter().enumerate() {
            items.push(Inline::Break);
            items.push(Inline::text(
                format!("({}) {}", option_label(i), o.trim()),
                FontStyle::Regular,
                size,
            ));
        }
        let mut flow = Flow::new(width);
        flow.pieces.push(Piece::Lines {
            lines: build_lines(&items, self.fonts, width, typo.line_height, size),
            indent: 0.0,
            align: CellAlign::Left,
        });
        flow
    }

    /// Runs one block through the engine and draws it. Returns the page
    /// index it landed on.
    fn place(
        &mut self,
        kind: BlockKind,
        question: Option<usize>,
        flow: &Flow,
        keep_with_next: f32,
    ) -> usize {
        let height = flow.measure();
        let half_column = self.engine.geometry().column_height() / 2.0;
        let needed = if keep_with_next > 0.0 && height + keep_with_next <= half_column {
            height + keep_with_next
        } else {
            height
        };

        let p = self.engine.advance(needed);
        self.ensure_page(p.page_index);
        if p.oversized {
            self.mark(
                question,
                DegradationKind::OversizedBlock,
                format!("{kind:?} block of {height:.1}pt placed unsplit"),
            );
        }

        let page_height = self.opts.page.height;
        let canvas = &mut self.pages[p.page_index];
        flow.draw(&mut canvas.content, self.fonts, p.x, p.y, page_height);
        canvas.record.blocks.push(PlacedBlock {
            kind,
            question,
            column: p.column,
            x: p.x,
            y: p.y,
            height,
            oversized: p.oversized,
        });
        self.engine.commit(height);
        self.engine.skip(self.opts.page.block_spacing);
        p.page_index
    }

    /// Opens pages up to `index`, each starting with the running banner.
    fn ensure_page(&mut self, index: usize) {
        while self.pages.len() <= index {
            let mut canvas = PageCanvas::new(self.engine.column_top());
            if let Some(label) = &self.banner {
                let page = &self.opts.page;
                let flow = chrome::banner_flow(
                    &chrome::continued_label(label),
                    self.fonts,
                    &self.opts.typography,
                    page.text_width(),
                );
                flow.draw(
                    &mut canvas.content,
                    self.fonts,
                    page.margin_left,
                    page.content_top(),
                    page.height,
                );
                canvas.record.banner = Some(label.clone());
                canvas.record.banner_continued = true;
            }
            log::debug!("opened page {}", self.pages.len() + 1);
            self.pages.push(canvas);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(options: &[&str]) -> Vec<String> {
        options.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn answers_resolve_by_index_letter_and_text() {
        let o = opts(&["3", "4", "five"]);
        assert_eq!(resolve_answer(&AnswerRef::Index(1), &o), Ok(1));
        assert_eq!(resolve_answer(&AnswerRef::Text("b".into()), &o), Ok(1));
        assert_eq!(resolve_answer(&AnswerRef::Text("(C)".into()), &o), Ok(2));
        assert_eq!(resolve_answer(&AnswerRef::Text(" Five ".into()), &o), Ok(2));
        assert_eq!(
            resolve_answer(&AnswerRef::Text("x = 2".into()), &o),
            Err("x = 2".into())
        );
        assert_eq!(resolve_answer(&AnswerRef::Index(7), &o), Err("7".into()));
    }

    #[test]
    fn sections_group_by_first_appearance() {
        let q = |subject: &str, content: &str| Question {
            subject: subject.into(),
            content: content.into(),
            ..Default::default()
        };
        let request = PaperRequest {
            questions: vec![
                q("Physics", "p1"),
                q("Maths", "m1"),
                q("", "   "),
                q("Physics", "p2"),
            ],
            ..Default::default()
        };
        let sections = prepare(&request, &RenderOptions::default()).unwrap();
        let layout: Vec<(&str, Vec<usize>)> = sections
            .iter()
            .map(|s| {
                (
                    s.subject.as_str(),
                    s.questions.iter().map(|q| q.number).collect(),
                )
            })
            .collect();
        assert_eq!(layout, vec![("Physics", vec![1, 2]), ("Maths", vec![3])]);
    }

    #[test]
    fn letters_run_out_into_numbers() {
        assert_eq!(option_label(0), "A");
        assert_eq!(option_label(25), "Z");
        assert_eq!(option_label(26), "27");
    }
}

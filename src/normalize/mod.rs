//! Rich-text repair: turns raw question text into a [`RichTextBlock`].
//!
//! The pipeline runs in fixed phases over one string: image payloads are
//! pulled out first (base64 never contains `|` or `$`, so later phases see
//! safe text), then pipe tables are lifted out line by line, then a single
//! tokenizer pass classifies what is left into plain text, math spans and
//! placeholders. Every phase leaves its input untouched when it cannot make
//! sense of it.

mod images;
mod latex;
mod tables;

use crate::model::{ImageAsset, MathSpan, RichTextBlock, Table};

pub(crate) use images::content_id;
pub use latex::repair_math;

/// Inserted where an image payload could not be decoded.
pub const IMAGE_UNAVAILABLE: &str = "[image unavailable]";

const PH_OPEN: char = '\u{E000}';
const PH_CLOSE: char = '\u{E001}';
const PH_OPEN_STR: &str = "\u{E000}";

fn placeholder(kind: &str, key: &str) -> String {
    format!("{PH_OPEN}{kind}:{key}{PH_CLOSE}")
}

pub fn normalize(raw: &str) -> RichTextBlock {
    let mut block = RichTextBlock::default();

    let text = images::extract_images(raw, &mut block);

    let mut out = String::with_capacity(text.len());
    for (i, chunk) in tables::split_tables(&text).into_iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        match chunk {
            tables::Chunk::Text(t) => out.push_str(&normalize_inline(&t, &mut block.math)),
            tables::Chunk::Table(mut table) => {
                for cell in table
                    .header
                    .iter_mut()
                    .flatten()
                    .chain(table.rows.iter_mut().flatten())
                {
                    *cell = tidy(&normalize_inline(cell, &mut block.math));
                }
                out.push_str(&placeholder("table", &block.tables.len().to_string()));
                block.tables.push(table);
            }
        }
    }

    block.text = tidy(&out);
    log::debug!(
        "normalize: {} bytes in, {} bytes out, {} math, {} tables, {} images",
        raw.len(),
        block.text.len(),
        block.math.len(),
        block.tables.len(),
        block.images.len()
    );
    block
}

/// Math repair for `$` spans, `\left`/`\right` stripping and residual
/// cleanup for the plain text between them.
fn normalize_inline(text: &str, math: &mut Vec<MathSpan>) -> String {
    let mut out = String::with_capacity(text.len());
    for token in tokenize(text) {
        match token {
            Token::Plain(s) => {
                let cleaned = images::residual_cleanup(s);
                let fixed = latex::fix_ocr(&cleaned);
                out.push_str(&latex::strip_left_right(&fixed));
            }
            Token::Math { body, block } => {
                let mut repaired = repair_math(body);
                if repaired.is_empty() {
                    continue;
                }
                if block {
                    repaired = escape_dollars(&repaired);
                }
                separate_backslash(&mut out);
                let delim = if block { "$$" } else { "$" };
                out.push_str(delim);
                out.push_str(&repaired);
                separate_backslash(&mut out);
                out.push_str(delim);
                math.push(MathSpan {
                    source: repaired,
                    is_block: block,
                });
            }
            Token::LoneDollar { block } => {
                separate_backslash(&mut out);
                out.push_str(if block { "\\$\\$" } else { "\\$" });
            }
            Token::Placeholder(p) => out.push_str(p),
        }
    }
    out
}

/// A `\\` left at the end of plain text would escape the `$` that follows.
fn separate_backslash(out: &mut String) {
    if out.ends_with('\\') {
        out.push(' ');
    }
}

/// Escapes `$` inside a display body so it cannot pair with a delimiter.
/// Mirrors the tokenizer: a backslash right before `$` already escapes it.
fn escape_dollars(body: &str) -> String {
    let mut out = String::with_capacity(body.len() + 2);
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'$') => {
                out.push('\\');
                out.push('$');
                chars.next();
            }
            '$' => out.push_str("\\$"),
            _ => out.push(c),
        }
    }
    out
}

/// Collapses runs of blanks inside lines and runs of blank lines.
fn tidy(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;
    for line in text.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
            if blank_run > 0 {
                out.push('\n');
            }
        }
        blank_run = 0;
        out.push_str(&collapsed);
    }
    out
}

#[derive(Debug, PartialEq)]
pub(crate) enum Token<'a> {
    Plain(&'a str),
    Math { body: &'a str, block: bool },
    LoneDollar { block: bool },
    Placeholder(&'a str),
}

/// One left-to-right classification of `text`. `\$` stays inside plain text.
pub(crate) fn tokenize(text: &str) -> Vec<Token<'_>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut plain_start = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        if bytes[i] == b'\\' && bytes.get(i + 1) == Some(&b'$') {
            i += 2;
        } else if bytes[i] == b'$' {
            push_plain(&mut tokens, text, plain_start, i);
            let block = bytes.get(i + 1) == Some(&b'$');
            let open = if block { 2 } else { 1 };
            match find_closing(bytes, i + open, block) {
                Some(end) => {
                    tokens.push(Token::Math {
                        body: &text[i + open..end],
                        block,
                    });
                    i = end + open;
                }
                None => {
                    tokens.push(Token::LoneDollar { block });
                    i += open;
                }
            }
            plain_start = i;
        } else if bytes[i..].starts_with(PH_OPEN_STR.as_bytes()) {
            match text[i..].find(PH_CLOSE) {
                Some(rel) => {
                    push_plain(&mut tokens, text, plain_start, i);
                    let end = i + rel + PH_CLOSE.len_utf8();
                    tokens.push(Token::Placeholder(&text[i..end]));
                    i = end;
                    plain_start = i;
                }
                None => i += PH_OPEN_STR.len(),
            }
        } else {
            i += 1;
        }
    }
    push_plain(&mut tokens, text, plain_start, bytes.len());
    tokens
}

fn push_plain<'a>(tokens: &mut Vec<Token<'a>>, text: &'a str, from: usize, to: usize) {
    if to > from {
        tokens.push(Token::Plain(&text[from..to]));
    }
}

fn find_closing(bytes: &[u8], from: usize, block: bool) -> Option<usize> {
    let mut j = from;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' if bytes.get(j + 1) == Some(&b'$') => j += 2,
            b'$' if !block => return Some(j),
            b'$' if bytes.get(j + 1) == Some(&b'$') => return Some(j),
            _ => j += 1,
        }
    }
    None
}

/// A drawable piece of a normalized block, in reading order.
#[derive(Debug, PartialEq)]
pub enum Segment<'a> {
    Text(String),
    Math(MathSpan),
    Image(&'a ImageAsset),
    Table(&'a Table),
    /// Placeholder whose artifact is not attached to this block.
    Missing,
}

impl RichTextBlock {
    pub fn segments(&self) -> Vec<Segment<'_>> {
        let mut segments = Vec::new();
        for token in tokenize(&self.text) {
            match token {
                Token::Plain(s) => segments.push(Segment::Text(s.replace("\\$", "$"))),
                Token::LoneDollar { block } => {
                    segments.push(Segment::Text(if block { "$$" } else { "$" }.into()))
                }
                Token::Math { body, block } => segments.push(Segment::Math(MathSpan {
                    source: body.to_string(),
                    is_block: block,
                })),
                Token::Placeholder(p) => {
                    let inner = p.trim_start_matches(PH_OPEN).trim_end_matches(PH_CLOSE);
                    let resolved = match inner.split_once(':') {
                        Some(("img", id)) => self.images.get(id).map(Segment::Image),
                        Some(("table", n)) => n
                            .parse::<usize>()
                            .ok()
                            .and_then(|n| self.tables.get(n))
                            .map(Segment::Table),
                        _ => None,
                    };
                    segments.push(resolved.unwrap_or(Segment::Missing));
                }
            }
        }
        segments
    }

    /// Text with placeholders removed and math delimiters dropped, for
    /// contexts that can only show plain text.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for seg in self.segments() {
            match seg {
                Segment::Text(t) => out.push_str(&t),
                Segment::Math(m) => out.push_str(&m.source),
                Segment::Image(_) | Segment::Table(_) | Segment::Missing => {}
            }
        }
        out
    }
}

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

/// OCR confusions of `\left` (`\1eft`, `\Ieft`, `\lef+`).
static OCR_LEFT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\[l1I][e3]f[t+]").expect("valid left regex"));
/// OCR confusions of `\right` (`\r1ght`, `\rlght`, `\righ+`).
static OCR_RIGHT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\r[i1l!][g9]h[t+]").expect("valid right regex"));

const LEFT_DELIMS: &[&str] = &[
    "\\lvert", "\\lVert", "\\langle", "\\lfloor", "\\lceil", "\\{", "\\|", "(", "[", "|", ".",
];
const RIGHT_DELIMS: &[&str] = &[
    "\\rvert", "\\rVert", "\\rangle", "\\rfloor", "\\rceil", "\\}", "\\|", ")", "]", "|", ".",
];

pub(super) fn fix_ocr(s: &str) -> Cow<'_, str> {
    if !s.contains('\\') {
        return Cow::Borrowed(s);
    }
    let left = OCR_LEFT.replace_all(s, "\\left");
    if !OCR_RIGHT.is_match(&left) {
        return left;
    }
    Cow::Owned(OCR_RIGHT.replace_all(&left, "\\right").into_owned())
}

/// Repairs one math span body: whitespace, OCR slips, `\left`/`\right`
/// pairing and missing closers.
pub fn repair_math(body: &str) -> String {
    let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
    let fixed = fix_ocr(&collapsed);
    let pieces = parse_pieces(&fixed);
    let paired = emit(&pieces, true);
    balance(&paired)
}

/// Outside math the commands are dropped and only the delimiters remain.
pub(super) fn strip_left_right(text: &str) -> Cow<'_, str> {
    if !text.contains("\\left") && !text.contains("\\right") {
        return Cow::Borrowed(text);
    }
    let pieces = parse_pieces(text);
    if !pieces.iter().any(|p| !matches!(p, Piece::Text(_))) {
        return Cow::Borrowed(text);
    }
    Cow::Owned(emit(&pieces, false))
}

#[derive(Debug)]
enum Piece {
    Text(String),
    /// `delim` is `None` when the command was not followed by a delimiter.
    Left(Option<&'static str>),
    Right(Option<&'static str>),
}

fn command_at<'a>(s: &'a str, name: &str) -> Option<&'a str> {
    let rest = s.strip_prefix(name)?;
    match rest.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => None,
        _ => Some(rest),
    }
}

fn delimiter_at(s: &str, table: &[&'static str]) -> Option<&'static str> {
    table.iter().copied().find(|d| {
        s.starts_with(d)
            && (!d.starts_with("\\")
                || d.len() == 2
                || !s[d.len()..].starts_with(|c: char| c.is_ascii_alphabetic()))
    })
}

fn parse_pieces(s: &str) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut text = String::new();
    let mut rest = s;

    while !rest.is_empty() {
        if let Some(after) = command_at(rest, "\\left") {
            flush_text(&mut pieces, &mut text, false);
            let trimmed = after.trim_start();
            match delimiter_at(trimmed, LEFT_DELIMS) {
                Some(d) => {
                    pieces.push(Piece::Left(Some(d)));
                    rest = &trimmed[d.len()..];
                }
                None => {
                    pieces.push(Piece::Left(None));
                    rest = trimmed;
                }
            }
            continue;
        }
        if let Some(after) = command_at(rest, "\\right") {
            let trimmed = after.trim_start();
            match delimiter_at(trimmed, RIGHT_DELIMS) {
                Some(d) => {
                    flush_text(&mut pieces, &mut text, false);
                    pieces.push(Piece::Right(Some(d)));
                    rest = &trimmed[d.len()..];
                }
                None => {
                    flush_text(&mut pieces, &mut text, true);
                    pieces.push(Piece::Right(None));
                    rest = after;
                }
            }
            continue;
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            text.push(c);
            // Keep escaped characters together so `\\left` is not a command.
            if c == '\\'
                && let Some(next) = chars.clone().next()
                && next == '\\'
            {
                text.push(next);
                chars.next();
            }
        }
        rest = chars.as_str();
    }
    flush_text(&mut pieces, &mut text, false);
    pieces
}

fn flush_text(pieces: &mut Vec<Piece>, text: &mut String, trim_end: bool) {
    if trim_end {
        let keep = text.trim_end().len();
        text.truncate(keep);
    }
    if !text.is_empty() {
        pieces.push(Piece::Text(std::mem::take(text)));
    }
}

fn closer_for(open: &str) -> &'static str {
    match open {
        "[" => "]",
        "\\{" => "\\}",
        "|" => "|",
        "\\lvert" => "\\rvert",
        "\\lVert" => "\\rVert",
        "\\|" => "\\|",
        "\\langle" => "\\rangle",
        "\\lfloor" => "\\rfloor",
        "\\lceil" => "\\rceil",
        "." => ".",
        _ => ")",
    }
}

fn plain_delimiter(d: &str) -> &'static str {
    match d {
        "(" => "(",
        ")" => ")",
        "[" => "[",
        "]" => "]",
        "\\{" => "{",
        "\\}" => "}",
        "|" | "\\lvert" | "\\rvert" => "|",
        "\\|" | "\\lVert" | "\\rVert" => "\u{2016}",
        "\\langle" => "\u{27E8}",
        "\\rangle" => "\u{27E9}",
        "\\lfloor" => "\u{230A}",
        "\\rfloor" => "\u{230B}",
        "\\lceil" => "\u{2308}",
        "\\rceil" => "\u{2309}",
        _ => "",
    }
}

/// Matches `\left` with `\right` and writes the pieces back out. In math
/// mode matched pairs keep their commands; unmatched ones lose the command
/// and keep the bracket. In plain mode every command is dropped.
fn emit(pieces: &[Piece], math_mode: bool) -> String {
    let mut resolved: Vec<(Option<&'static str>, bool)> = vec![(None, false); pieces.len()];
    let mut stack: Vec<usize> = Vec::new();

    for (i, piece) in pieces.iter().enumerate() {
        match piece {
            Piece::Left(d) => {
                resolved[i] = (Some(d.unwrap_or("(")), false);
                stack.push(i);
            }
            Piece::Right(d) => match stack.pop() {
                Some(open) => {
                    let opener = resolved[open].0.unwrap_or("(");
                    resolved[open].1 = true;
                    resolved[i] = (Some(d.unwrap_or_else(|| closer_for(opener))), true);
                }
                None => resolved[i] = (Some(d.unwrap_or(")")), false),
            },
            Piece::Text(_) => {}
        }
    }

    let mut out = String::new();
    for (piece, (delim, matched)) in pieces.iter().zip(resolved) {
        match piece {
            Piece::Text(t) => out.push_str(t),
            Piece::Left(_) | Piece::Right(_) => {
                let d = delim.unwrap_or("");
                if math_mode && matched {
                    out.push_str(if matches!(piece, Piece::Left(_)) {
                        "\\left"
                    } else {
                        "\\right"
                    });
                    out.push_str(d);
                } else if math_mode {
                    if d != "." {
                        out.push_str(d);
                    }
                } else {
                    out.push_str(plain_delimiter(d));
                }
            }
        }
    }
    out
}

/// Appends missing `)` and `}`; drops `}` that close nothing.
fn balance(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    let mut parens = 0i32;
    let mut braces = 0i32;
    let mut escaped = false;

    for c in s.chars() {
        if escaped {
            escaped = false;
            out.push(c);
            continue;
        }
        match c {
            '\\' => escaped = true,
            '(' => parens += 1,
            ')' => parens -= 1,
            '{' => braces += 1,
            '}' if braces == 0 => continue,
            '}' => braces -= 1,
            _ => {}
        }
        out.push(c);
    }
    for _ in 0..braces.max(0) {
        out.push('}');
    }
    for _ in 0..parens.max(0) {
        out.push(')');
    }
    out
}

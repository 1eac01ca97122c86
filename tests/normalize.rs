mod common;

use exampaper_pdf::{
    CellAlign, DegradationKind, IMAGE_UNAVAILABLE, ImageMime, MathSpan, RichTextBlock, Segment,
    normalize, repair_math,
};

/// `$` signs that are not escaped as `\$`.
fn unescaped_dollars(text: &str) -> usize {
    let mut count = 0;
    let mut prev = '\0';
    for c in text.chars() {
        if c == '$' && prev != '\\' {
            count += 1;
        }
        prev = c;
    }
    count
}

/// Math spans that sit in the running text, outside any table.
fn table_math(block: &RichTextBlock) -> usize {
    block
        .tables
        .iter()
        .flat_map(|t| t.header.iter().flatten().chain(t.rows.iter().flatten()))
        .map(|cell| normalize(cell).math.len())
        .sum()
}

fn prose_math(block: &RichTextBlock) -> Vec<MathSpan> {
    block
        .segments()
        .into_iter()
        .filter_map(|s| match s {
            Segment::Math(m) => Some(m),
            _ => None,
        })
        .collect()
}

const SAMPLES: &[&str] = &[
    "What is 2+2? $2+2=?$",
    "costs $5 today",
    "Solve $$x^2 -   4 = 0$$ for x.",
    "\\left 2x \\right and $\\left 2x \\right$",
    "$\\frac{1}{2$ is half",
    "  lots   of\n\n\n\nblank   lines  ",
    "| A | B |\n| -- | -- |\n| 1 | $x$ |\ntrailing prose",
    "See ![diagram](figure.png) and img-2.png here",
    "x | y is not a table",
    "$\\1eft( x \\r1ght)$",
    "$$a$b$$ after",
    "a\\img-1.png$x$",
    "trailing $y \\ $ slash",
];

#[test]
fn normalize_is_idempotent() {
    for raw in SAMPLES {
        let once = normalize(raw);
        let twice = normalize(&once.text);
        assert_eq!(once.text, twice.text, "text changed on second pass for {raw:?}");
        assert_eq!(
            prose_math(&once),
            prose_math(&twice),
            "math changed on second pass for {raw:?}"
        );
        assert_eq!(once.math.len(), twice.math.len() + table_math(&once));
    }
}

#[test]
fn idempotent_with_images() {
    let raw = format!("Look: {} done", common::png_data_uri(3, 3, [9, 9, 9]));
    let once = normalize(&raw);
    let twice = normalize(&once.text);
    assert_eq!(once.text, twice.text);
}

#[test]
fn dollars_are_always_balanced() {
    for raw in SAMPLES.iter().chain(&["$", "$$", "a $b$ c $d", "$$x$", "\\$5 and $6", "$$a$b$$", "$$p$$q$r$$"]) {
        let block = normalize(raw);
        assert_eq!(
            unescaped_dollars(&block.text) % 2,
            0,
            "odd dollar count in {:?} (from {raw:?})",
            block.text
        );
    }
}

#[test]
fn dollar_inside_display_math_is_escaped() {
    let block = normalize("$$a$b$$");
    assert_eq!(block.text, "$$a\\$b$$");
    assert_eq!(block.math.len(), 1);
    assert!(block.math[0].is_block);

    let again = normalize(&block.text);
    assert_eq!(again.text, block.text);
    assert_eq!(again.math, block.math);
}

#[test]
fn removed_reference_does_not_escape_math() {
    let block = normalize("a\\img-1.png$x$");
    assert_eq!(block.text, "a\\ $x$");
    assert_eq!(block.math.len(), 1);
    assert_eq!(normalize(&block.text).math, block.math);
}

#[test]
fn lone_dollar_becomes_literal_text() {
    let block = normalize("costs $5 today");
    assert!(block.math.is_empty());
    assert_eq!(block.text, "costs \\$5 today");
    assert_eq!(block.plain_text(), "costs $5 today");
}

#[test]
fn inline_math_is_recorded() {
    let block = normalize("What is 2+2? $2+2=?$");
    assert_eq!(block.math.len(), 1);
    assert_eq!(block.math[0].source, "2+2=?");
    assert!(!block.math[0].is_block);
}

#[test]
fn display_math_whitespace_collapses() {
    let block = normalize("Solve $$x^2 -\n   4 = 0$$ now");
    assert_eq!(block.math.len(), 1);
    assert_eq!(block.math[0].source, "x^2 - 4 = 0");
    assert!(block.math[0].is_block);
}

#[test]
fn dangling_left_right_become_parentheses() {
    assert_eq!(normalize("\\left 2x \\right").text, "(2x)");
}

#[test]
fn left_right_in_math_get_delimiters() {
    let block = normalize("$\\left 2x \\right$");
    assert_eq!(block.math[0].source, "\\left(2x\\right)");
}

#[test]
fn ocr_slips_in_left_right_are_fixed() {
    let block = normalize("$\\1eft( x \\r1ght)$");
    assert_eq!(block.math[0].source, "\\left( x \\right)");
}

#[test]
fn every_left_has_a_right() {
    for raw in ["$\\left( a$", "$b \\right]$", "$\\left[ \\left( c \\right)$"] {
        let source = &normalize(raw).math[0].source;
        let lefts = source.matches("\\left").count();
        let rights = source.matches("\\right").count();
        assert_eq!(lefts, rights, "unpaired commands in {source:?}");
    }
}

#[test]
fn missing_closers_are_appended() {
    assert_eq!(repair_math("\\frac{1}{2"), "\\frac{1}{2}");
    assert_eq!(repair_math("f(x"), "f(x)");
    assert_eq!(repair_math("a}b"), "ab");
}

#[test]
fn pipe_table_with_header() {
    let block = normalize("| A | B |\n| -- | -- |\n| 1 | 2 |");
    assert_eq!(block.tables.len(), 1);
    let table = &block.tables[0];
    assert_eq!(table.header, Some(vec!["A".to_string(), "B".to_string()]));
    assert_eq!(table.rows, vec![vec!["1".to_string(), "2".to_string()]]);
    assert_eq!(table.alignments, vec![CellAlign::Left, CellAlign::Left]);
    assert!(matches!(block.segments()[..], [Segment::Table(_)]));
}

#[test]
fn pipe_table_without_separator_has_no_header() {
    let block = normalize("| a | b |\n| c | d |");
    let table = &block.tables[0];
    assert!(table.header.is_none());
    assert_eq!(table.rows.len(), 2);
}

#[test]
fn short_rows_are_padded_and_alignment_read() {
    let block = normalize("| L | C | R |\n| :-- | :-: | --: |\n| 1 |\n| 1 | 2 | 3 |");
    let table = &block.tables[0];
    assert_eq!(
        table.alignments,
        vec![CellAlign::Left, CellAlign::Center, CellAlign::Right]
    );
    assert_eq!(table.rows[0], vec!["1".to_string(), String::new(), String::new()]);
    assert!(table.rows.iter().all(|r| r.len() == 3));
}

#[test]
fn single_pipe_line_stays_prose() {
    let block = normalize("x | y is not a table");
    assert!(block.tables.is_empty());
    assert_eq!(block.text, "x | y is not a table");
}

#[test]
fn absolute_values_stay_prose() {
    let block = normalize("Find |x| if\n|x-1| = 2");
    assert!(block.tables.is_empty());
    assert_eq!(block.text, "Find |x| if\n|x-1| = 2");

    let block = normalize("|a|\n|b|");
    assert!(block.tables.is_empty());
}

#[test]
fn unfenced_table_needs_a_separator() {
    let block = normalize("A | B\n--|--\n1 | 2");
    assert_eq!(block.tables.len(), 1);
    assert_eq!(
        block.tables[0].header,
        Some(vec!["A".to_string(), "B".to_string()])
    );
}

#[test]
fn prose_line_with_pipes_before_a_table() {
    let block = normalize("If |x| = 3 then\n| A | B |\n| - | - |\n| 1 | 2 |");
    assert_eq!(block.tables.len(), 1);
    assert!(block.text.starts_with("If |x| = 3 then\n"));
}

#[test]
fn table_cell_math_is_recorded() {
    let block = normalize("| A | B |\n| -- | -- |\n| $x^2$ | 2 |");
    assert_eq!(block.tables.len(), 1);
    assert_eq!(block.math.len(), 1);
    assert_eq!(block.math[0].source, "x^2");
    assert!(!block.math[0].is_block);
}

#[test]
fn table_sits_between_prose() {
    let block = normalize("Before\n| A | B |\n| - | - |\n| 1 | 2 |\nAfter");
    let kinds: Vec<&str> = block
        .segments()
        .iter()
        .map(|s| match s {
            Segment::Text(t) if t.trim().is_empty() => "blank",
            Segment::Text(_) => "text",
            Segment::Table(_) => "table",
            _ => "other",
        })
        .filter(|k| *k != "blank")
        .collect();
    assert_eq!(kinds, vec!["text", "table", "text"]);
}

#[test]
fn bare_data_uri_becomes_an_asset() {
    let uri = common::png_data_uri(4, 2, [200, 10, 10]);
    let block = normalize(&format!("Figure {uri} above"));
    assert_eq!(block.images.len(), 1);
    assert!(!block.text.contains("data:image"));
    let asset = block.images.values().next().unwrap();
    assert_eq!(asset.mime, ImageMime::Png);
    assert!(block
        .segments()
        .iter()
        .any(|s| matches!(s, Segment::Image(a) if a.id == asset.id)));
}

#[test]
fn markdown_and_legacy_forms_are_recognized() {
    let uri = common::png_data_uri(2, 2, [0, 0, 255]);
    let block = normalize(&format!("A ![fig]({uri}) B img-1.jpeg ({uri}) C"));
    assert_eq!(block.images.len(), 1);
    assert!(!block.text.contains("img-1"));
    assert!(!block.text.contains("!["));
    let images = block
        .segments()
        .iter()
        .filter(|s| matches!(s, Segment::Image(_)))
        .count();
    assert_eq!(images, 2);
}

#[test]
fn identical_payloads_share_one_asset() {
    let uri = common::png_data_uri(5, 5, [1, 2, 3]);
    let content = normalize(&format!("Which shape is this? {uri}"));
    let option = normalize(&format!("![option]({uri})"));
    let content_ids: Vec<&String> = content.images.keys().collect();
    let option_ids: Vec<&String> = option.images.keys().collect();
    assert_eq!(content_ids.len(), 1);
    assert_eq!(content_ids, option_ids);
}

#[test]
fn payload_noise_is_stripped_before_decoding() {
    let uri = common::png_data_uri(6, 6, [40, 40, 40]);
    let clean = normalize(&format!("![x]({uri})"));
    let (head, tail) = uri.split_at(uri.len() / 2);
    let noisy = normalize(&format!("![x]({head}\u{AD}\n  {tail})"));
    assert_eq!(noisy.images.len(), 1);
    assert_eq!(clean.images.keys().next(), noisy.images.keys().next());
}

#[test]
fn undecodable_payload_leaves_a_marker() {
    let block = normalize("Broken ![x](data:image/png;base64,A) image");
    assert!(block.images.is_empty());
    assert!(block.text.contains(IMAGE_UNAVAILABLE));
    assert_eq!(block.degradations.len(), 1);
    assert_eq!(block.degradations[0].kind, DegradationKind::ImageUnavailable);
}

#[test]
fn unresolved_image_references_are_removed() {
    let block = normalize("See ![diagram](figure.png) and img-2.png here");
    assert_eq!(block.text, "See and here");
}

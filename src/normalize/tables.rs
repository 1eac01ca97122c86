use std::sync::LazyLock;

use regex::Regex;

use crate::model::{CellAlign, Table};

static SEPARATOR_CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^:?-+:?$").expect("valid separator regex"));

pub(super) enum Chunk {
    Text(String),
    Table(Table),
}

/// Splits text into prose and pipe tables. A candidate is a run of two or
/// more consecutive lines holding a cell pipe. It becomes a table when its
/// second line is a `---` separator, or when every line is fenced by pipes
/// on both ends and there are at least two columns. Otherwise the first
/// line goes to prose and the rest of the run is tried again.
pub(super) fn split_tables(text: &str) -> Vec<Chunk> {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut chunks = Vec::new();
    let mut prose: Vec<&str> = Vec::new();
    let mut i = 0usize;

    while i < lines.len() {
        let run_end = lines[i..]
            .iter()
            .position(|l| !is_pipe_row(l))
            .map(|p| i + p)
            .unwrap_or(lines.len());

        if run_end - i >= 2
            && let Some(table) = parse_table(&lines[i..run_end])
        {
            if !prose.is_empty() {
                chunks.push(Chunk::Text(prose.join("\n")));
                prose.clear();
            }
            log::debug!(
                "table: {} cols, header={}, {} rows",
                table.column_count(),
                table.header.is_some(),
                table.rows.len()
            );
            chunks.push(Chunk::Table(table));
            i = run_end;
            continue;
        }

        prose.push(lines[i]);
        i += 1;
    }
    if !prose.is_empty() || chunks.is_empty() {
        chunks.push(Chunk::Text(prose.join("\n")));
    }
    chunks
}

fn is_pipe_row(line: &str) -> bool {
    !pipe_positions(line.trim()).is_empty()
}

/// `| a | b |`, as opposed to prose such as `|x-1| = 2`.
fn is_fenced(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() > 1 && trimmed.starts_with('|') && trimmed.ends_with('|')
}

/// Byte offsets of cell-separating pipes: not escaped, not inside `$..$`.
fn pipe_positions(line: &str) -> Vec<usize> {
    let bytes = line.as_bytes();
    let mut out = Vec::new();
    let mut in_math = false;
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'$' => in_math = !in_math,
            b'|' if !in_math => out.push(i),
            _ => {}
        }
        i += 1;
    }
    if in_math {
        // Unclosed math: pipes after the dangling `$` still count.
        return line
            .char_indices()
            .filter(|&(i, c)| c == '|' && (i == 0 || bytes[i - 1] != b'\\'))
            .map(|(i, _)| i)
            .collect();
    }
    out
}

fn split_cells(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    let mut cells = Vec::new();
    let mut last = 0usize;
    for pos in pipe_positions(trimmed) {
        cells.push(trimmed[last..pos].trim().to_string());
        last = pos + 1;
    }
    cells.push(trimmed[last..].trim().to_string());
    if trimmed.starts_with('|') {
        cells.remove(0);
    }
    if trimmed.ends_with('|') && !trimmed.ends_with("\\|") && !cells.is_empty() {
        cells.pop();
    }
    cells
}

fn is_separator(cells: &[String]) -> bool {
    !cells.is_empty() && cells.iter().all(|c| SEPARATOR_CELL.is_match(c))
}

fn alignment_of(cell: &str) -> CellAlign {
    match (cell.starts_with(':'), cell.ends_with(':')) {
        (true, true) => CellAlign::Center,
        (false, true) => CellAlign::Right,
        _ => CellAlign::Left,
    }
}

fn parse_table(lines: &[&str]) -> Option<Table> {
    let rows: Vec<Vec<String>> = lines.iter().map(|l| split_cells(l)).collect();

    let (header, alignments_row, body) = if rows.len() >= 2 && is_separator(&rows[1]) {
        (Some(rows[0].clone()), Some(&rows[1]), &rows[2..])
    } else {
        if !lines.iter().all(|l| is_fenced(l)) || rows.iter().all(|r| r.len() < 2) {
            return None;
        }
        (None, None, &rows[..])
    };

    // Separator lines further down carry no content.
    let body: Vec<Vec<String>> = body.iter().filter(|r| !is_separator(r)).cloned().collect();

    let row_count = body.len() + usize::from(header.is_some());
    if row_count < 2 {
        return None;
    }

    let ncols = match &header {
        Some(h) => h.len(),
        None => body.iter().map(Vec::len).max().unwrap_or(0),
    };
    if ncols == 0 {
        return None;
    }

    let alignments = (0..ncols)
        .map(|c| {
            alignments_row
                .and_then(|r| r.get(c))
                .map(|cell| alignment_of(cell))
                .unwrap_or(CellAlign::Left)
        })
        .collect();

    let rows = body.into_iter().map(|row| fit_row(row, ncols)).collect();

    Some(Table {
        header,
        rows,
        alignments,
    })
}

/// Pads short rows; folds overflow cells into the last column.
fn fit_row(mut row: Vec<String>, ncols: usize) -> Vec<String> {
    if row.len() > ncols {
        let overflow = row.split_off(ncols);
        if let Some(last) = row.last_mut() {
            for cell in overflow.into_iter().filter(|c| !c.is_empty()) {
                if !last.is_empty() {
                    last.push_str(" | ");
                }
                last.push_str(&cell);
            }
        }
    }
    row.resize(ncols, String::new());
    row
}

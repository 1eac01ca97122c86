use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use memmap2::Mmap;
use pdf_writer::types::{CidFontType, FontFlags, SystemInfo, UnicodeCmap};
use pdf_writer::{Name, Pdf, Rect, Ref, Str};
use ttf_parser::Face;

use crate::math::TextMeasure;

/// Substituted for characters the selected font cannot show.
pub(crate) const REPLACEMENT: char = '?';

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum FontStyle {
    Regular,
    Bold,
    Italic,
}

impl FontStyle {
    fn flags(self) -> (bool, bool) {
        match self {
            FontStyle::Regular => (false, false),
            FontStyle::Bold => (true, false),
            FontStyle::Italic => (false, true),
        }
    }
}

enum Glyphs {
    /// Subset CID font: glyph id and advance (1000 units) per character.
    Cid {
        glyphs: HashMap<char, (u16, f32)>,
    },
    /// Standard Helvetica; widths indexed by WinAnsi byte - 32.
    WinAnsi { widths: Vec<f32> },
}

pub(crate) struct FontEntry {
    pub(crate) pdf_name: String,
    pub(crate) font_ref: Ref,
    line_h_ratio: f32,
    ascender_ratio: f32,
    glyphs: Glyphs,
}

impl FontEntry {
    /// `ch` if this font can draw it, else [`REPLACEMENT`].
    pub(crate) fn resolve(&self, ch: char) -> char {
        let ok = match &self.glyphs {
            Glyphs::Cid { glyphs } => glyphs.contains_key(&ch),
            Glyphs::WinAnsi { .. } => char_to_winansi(ch) >= 32,
        };
        if ok { ch } else { REPLACEMENT }
    }

    pub(crate) fn char_width_1000(&self, ch: char) -> f32 {
        let ch = self.resolve(ch);
        match &self.glyphs {
            Glyphs::Cid { glyphs } => glyphs.get(&ch).map(|&(_, w)| w).unwrap_or(500.0),
            Glyphs::WinAnsi { widths } => {
                let byte = char_to_winansi(ch);
                if byte >= 32 { widths[(byte - 32) as usize] } else { 0.0 }
            }
        }
    }

    pub(crate) fn word_width(&self, word: &str, font_size: f32) -> f32 {
        word.chars()
            .map(|ch| self.char_width_1000(ch) * font_size / 1000.0)
            .sum()
    }

    pub(crate) fn space_width(&self, font_size: f32) -> f32 {
        self.char_width_1000(' ') * font_size / 1000.0
    }

    pub(crate) fn line_height(&self, font_size: f32) -> f32 {
        self.line_h_ratio * font_size
    }

    pub(crate) fn ascent(&self, font_size: f32) -> f32 {
        self.ascender_ratio * font_size
    }

    /// Bytes for a `Tj` string in this font's encoding.
    pub(crate) fn encode(&self, text: &str) -> Vec<u8> {
        match &self.glyphs {
            Glyphs::Cid { glyphs } => {
                let mut out = Vec::with_capacity(text.len() * 2);
                for ch in text.chars() {
                    let gid = glyphs
                        .get(&ch)
                        .or_else(|| glyphs.get(&REPLACEMENT))
                        .map(|&(gid, _)| gid)
                        .unwrap_or(0);
                    out.extend_from_slice(&gid.to_be_bytes());
                }
                out
            }
            Glyphs::WinAnsi { .. } => text
                .chars()
                .map(|c| match char_to_winansi(c) {
                    0 => REPLACEMENT as u8,
                    b => b,
                })
                .collect(),
        }
    }
}

impl TextMeasure for FontEntry {
    fn text_width(&self, text: &str, font_size: f32) -> f32 {
        self.word_width(text, font_size)
    }

    fn line_height(&self, font_size: f32) -> f32 {
        FontEntry::line_height(self, font_size)
    }
}

/// The three faces a paper is set in.
pub(crate) struct FontBook {
    pub(crate) regular: FontEntry,
    pub(crate) bold: FontEntry,
    pub(crate) italic: FontEntry,
}

impl FontBook {
    pub(crate) fn get(&self, style: FontStyle) -> &FontEntry {
        match style {
            FontStyle::Regular => &self.regular,
            FontStyle::Bold => &self.bold,
            FontStyle::Italic => &self.italic,
        }
    }

    pub(crate) fn entries(&self) -> [&FontEntry; 3] {
        [&self.regular, &self.bold, &self.italic]
    }

    pub(crate) fn register(
        pdf: &mut Pdf,
        family: &str,
        used_chars: &HashSet<char>,
        alloc: &mut impl FnMut() -> Ref,
    ) -> Self {
        let mut chars = used_chars.clone();
        chars.extend([' ', REPLACEMENT]);
        Self {
            regular: register_font(pdf, family, FontStyle::Regular, "F1", alloc, &chars),
            bold: register_font(pdf, family, FontStyle::Bold, "F2", alloc, &chars),
            italic: register_font(pdf, family, FontStyle::Italic, "F3", alloc, &chars),
        }
    }
}

/// (lowercase family name, bold, italic) -> (file path, face index within TTC)
type FontLookup = HashMap<(String, bool, bool), (PathBuf, u32)>;

static FONT_INDEX: OnceLock<FontLookup> = OnceLock::new();

fn font_family_name(face: &Face) -> Option<String> {
    // Name ID 1, not the typographic family, so "Noto Sans Mono" stays
    // distinct from "Noto Sans".
    face.names()
        .into_iter()
        .filter(|n| n.name_id == ttf_parser::name_id::FAMILY && n.is_unicode())
        .find_map(|n| n.to_string())
}

fn read_font_style(data: &[u8], face_index: u32) -> Option<(String, bool, bool)> {
    let face = Face::parse(data, face_index).ok()?;
    let family = font_family_name(&face)?;
    Some((family, face.is_bold(), face.is_italic()))
}

fn font_directories() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();

    if let Ok(val) = std::env::var("EXAMPAPER_FONTS") {
        dirs.extend(
            val.split([':', ';'])
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
        );
    }

    #[cfg(target_os = "macos")]
    {
        dirs.extend([
            "/Library/Fonts".into(),
            "/System/Library/Fonts".into(),
            "/System/Library/Fonts/Supplemental".into(),
        ]);
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(home).join("Library/Fonts"));
        }
    }

    #[cfg(target_os = "linux")]
    {
        dirs.extend(["/usr/share/fonts".into(), "/usr/local/share/fonts".into()]);
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(home).join(".local/share/fonts"));
        }
    }

    #[cfg(target_os = "windows")]
    {
        let windir = std::env::var("WINDIR").unwrap_or_else(|_| "C:\\Windows".into());
        dirs.push(PathBuf::from(windir).join("Fonts"));
    }

    dirs
}

#[derive(Clone)]
struct CachedFace {
    family: String,
    bold: bool,
    italic: bool,
    face_index: u32,
}

/// On-disk index of font faces, invalidated per directory by mtime.
#[derive(Default)]
struct FontCache {
    dir_mtimes: HashMap<PathBuf, i64>,
    /// Files with no usable face keep an empty list so they are not reparsed.
    files: HashMap<PathBuf, Vec<CachedFace>>,
}

const CACHE_VERSION: &str = "exampaper-fonts-v1";

fn cache_path() -> Option<PathBuf> {
    let base = if cfg!(target_os = "macos") {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Caches"))
    } else if cfg!(target_os = "windows") {
        std::env::var("LOCALAPPDATA").ok().map(PathBuf::from)
    } else {
        std::env::var("XDG_CACHE_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".cache"))
            })
    };
    base.map(|d| d.join("exampaper-pdf").join("font-index.tsv"))
}

impl FontCache {
    fn load() -> Self {
        let mut fc = Self::default();
        let Some(content) = cache_path().and_then(|p| std::fs::read_to_string(p).ok()) else {
            return fc;
        };
        let mut lines = content.lines();
        if lines.next() != Some(CACHE_VERSION) {
            return fc;
        }
        for line in lines {
            let parts: Vec<&str> = line.split('\t').collect();
            match parts.as_slice() {
                ["D", dir, mtime] => {
                    if let Ok(mtime) = mtime.parse::<i64>() {
                        fc.dir_mtimes.insert(PathBuf::from(dir), mtime);
                    }
                }
                ["F", file, "-"] => {
                    fc.files.entry(PathBuf::from(file)).or_default();
                }
                ["F", file, family, bold, italic, index] => {
                    let Ok(face_index) = index.parse::<u32>() else {
                        continue;
                    };
                    fc.files.entry(PathBuf::from(file)).or_default().push(CachedFace {
                        family: family.to_string(),
                        bold: *bold == "1",
                        italic: *italic == "1",
                        face_index,
                    });
                }
                _ => {}
            }
        }
        fc
    }

    fn save(&self) {
        let Some(path) = cache_path() else {
            return;
        };
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        let mut out = format!("{CACHE_VERSION}\n");
        for (dir, mtime) in &self.dir_mtimes {
            out.push_str(&format!("D\t{}\t{mtime}\n", dir.to_string_lossy()));
        }
        for (file, faces) in &self.files {
            let file = file.to_string_lossy();
            if faces.is_empty() {
                out.push_str(&format!("F\t{file}\t-\n"));
            }
            for f in faces {
                out.push_str(&format!(
                    "F\t{file}\t{}\t{}\t{}\t{}\n",
                    f.family,
                    u8::from(f.bold),
                    u8::from(f.italic),
                    f.face_index
                ));
            }
        }
        if let Err(e) = std::fs::write(&path, out) {
            log::debug!("font cache not written to {}: {e}", path.display());
        }
    }
}

fn dir_mtime(path: &Path) -> i64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn font_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|e| matches!(e.as_str(), "ttf" | "otf" | "ttc"))
}

fn parse_font_file(path: &Path) -> Vec<CachedFace> {
    let Ok(file) = std::fs::File::open(path) else {
        return Vec::new();
    };
    // SAFETY: the map is read-only and dropped before this function returns.
    let Ok(data) = (unsafe { Mmap::map(&file) }) else {
        return Vec::new();
    };
    let count = if font_extension(path).as_deref() == Some("ttc") {
        ttf_parser::fonts_in_collection(&data).unwrap_or(1)
    } else {
        1
    };
    (0..count)
        .filter_map(|face_index| {
            read_font_style(&data, face_index).map(|(family, bold, italic)| CachedFace {
                family,
                bold,
                italic,
                face_index,
            })
        })
        .collect()
}

fn scan_font_dirs() -> FontLookup {
    let t0 = std::time::Instant::now();
    let no_cache = std::env::var("EXAMPAPER_NO_FONT_CACHE").is_ok();
    let cache = if no_cache {
        FontCache::default()
    } else {
        FontCache::load()
    };

    let mut index = FontLookup::new();
    let mut fresh = FontCache::default();
    let (mut dirs_cached, mut dirs_scanned, mut files_parsed) = (0u32, 0u32, 0u32);
    let mut visited: HashSet<PathBuf> = HashSet::new();
    let mut stack = font_directories();

    while let Some(dir) = stack.pop() {
        if !visited.insert(dir.clone()) {
            continue;
        }
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        let mut font_files = Vec::new();
        for path in entries.flatten().map(|e| e.path()) {
            if path.is_dir() {
                stack.push(path);
            } else if font_extension(&path).is_some() {
                font_files.push(path);
            }
        }
        if font_files.is_empty() {
            continue;
        }

        let mtime = dir_mtime(&dir);
        let up_to_date = cache.dir_mtimes.get(&dir) == Some(&mtime);
        if up_to_date {
            dirs_cached += 1;
        } else {
            dirs_scanned += 1;
        }
        fresh.dir_mtimes.insert(dir, mtime);

        for path in font_files {
            let faces = match cache.files.get(&path) {
                Some(faces) if up_to_date => faces.clone(),
                _ => {
                    files_parsed += 1;
                    parse_font_file(&path)
                }
            };
            for face in &faces {
                index
                    .entry((face.family.to_lowercase(), face.bold, face.italic))
                    .or_insert((path.clone(), face.face_index));
            }
            fresh.files.insert(path, faces);
        }
    }

    if !no_cache {
        fresh.save();
    }

    log::info!(
        "Font scan: {:.1}ms, {dirs_cached} dirs cached / {dirs_scanned} scanned, {files_parsed} files parsed → {} entries",
        t0.elapsed().as_secs_f64() * 1000.0,
        index.len(),
    );
    index
}

/// Falls back to the regular face when the styled one is not installed.
fn find_font_file(family: &str, bold: bool, italic: bool) -> Option<(PathBuf, u32)> {
    let index = FONT_INDEX.get_or_init(scan_font_dirs);
    let key = family.to_lowercase();
    index
        .get(&(key.clone(), bold, italic))
        .or_else(|| index.get(&(key, false, false)))
        .cloned()
}

/// WinAnsi (Windows-1252) byte for `c`, or 0 when there is none.
pub(crate) fn char_to_winansi(c: char) -> u8 {
    match c as u32 {
        0x0020..=0x007E => c as u8,
        0x00A0..=0x00FF => c as u8,
        0x20AC => 0x80,
        0x201A => 0x82,
        0x0192 => 0x83,
        0x201E => 0x84,
        0x2026 => 0x85,
        0x2020 => 0x86,
        0x2021 => 0x87,
        0x02C6 => 0x88,
        0x2030 => 0x89,
        0x0160 => 0x8A,
        0x2039 => 0x8B,
        0x0152 => 0x8C,
        0x017D => 0x8E,
        0x2018 => 0x91,
        0x2019 => 0x92,
        0x201C => 0x93,
        0x201D => 0x94,
        0x2022 => 0x95,
        0x2013 => 0x96,
        0x2014 => 0x97,
        0x02DC => 0x98,
        0x2122 => 0x99,
        0x0161 => 0x9A,
        0x203A => 0x9B,
        0x0153 => 0x9C,
        0x017E => 0x9E,
        0x0178 => 0x9F,
        _ => 0,
    }
}

/// Approximate Helvetica widths at 1000 units/em for WinAnsi bytes 32..=255.
fn helvetica_widths() -> Vec<f32> {
    (32u8..=255u8)
        .map(|b| match b {
            32 => 278.0,
            33..=47 => 333.0,
            48..=57 => 556.0,
            58..=64 => 584.0,
            73 | 74 => 278.0,
            77 => 833.0,
            65..=90 => 667.0,
            91..=96 => 333.0,
            102 | 105 | 106 | 108 | 116 => 278.0,
            109 | 119 => 833.0,
            97..=122 => 556.0,
            _ => 556.0,
        })
        .collect()
}

fn identity_info() -> SystemInfo<'static> {
    SystemInfo {
        registry: Str(b"Adobe"),
        ordering: Str(b"Identity"),
        supplement: 0,
    }
}

struct Embedded {
    glyphs: HashMap<char, (u16, f32)>,
    line_h_ratio: f32,
    ascender_ratio: f32,
}

/// Embeds a TrueType/OpenType face as a Type0 font with Identity-H
/// encoding, subset to `used_chars`.
#[allow(clippy::too_many_arguments)]
fn embed_truetype(
    pdf: &mut Pdf,
    font_ref: Ref,
    alloc: &mut impl FnMut() -> Ref,
    ps_name: &str,
    font_data: &[u8],
    face_index: u32,
    italic: bool,
    used_chars: &HashSet<char>,
) -> Option<Embedded> {
    let face = Face::parse(font_data, face_index).ok()?;
    let units = face.units_per_em() as f32;
    let to_1000 = |v: f32| v / units * 1000.0;

    let mut remapper = subsetter::GlyphRemapper::new();
    let mut glyphs = HashMap::new();
    let mut sorted: Vec<char> = used_chars.iter().copied().collect();
    sorted.sort_unstable();
    for ch in sorted {
        if let Some(gid) = face.glyph_index(ch) {
            let advance = face.glyph_hor_advance(gid).unwrap_or(0) as f32;
            glyphs.insert(ch, (remapper.remap(gid.0), to_1000(advance)));
        }
    }
    if !glyphs.contains_key(&' ') {
        log::debug!("{ps_name}: no space glyph, skipping");
        return None;
    }

    let subset = subsetter::subset(font_data, face_index, &remapper).unwrap_or_else(|e| {
        log::warn!("Font subsetting failed for {ps_name}: {e}, embedding full font");
        font_data.to_vec()
    });

    let descriptor_ref = alloc();
    let data_ref = alloc();
    let cid_ref = alloc();
    let cmap_ref = alloc();

    let data_len = i32::try_from(subset.len()).ok()?;
    pdf.stream(data_ref, &subset).pair(Name(b"Length1"), data_len);

    let bb = face.global_bounding_box();
    let mut flags = FontFlags::NON_SYMBOLIC;
    if italic {
        flags |= FontFlags::ITALIC;
    }
    pdf.font_descriptor(descriptor_ref)
        .name(Name(ps_name.as_bytes()))
        .flags(flags)
        .bbox(Rect::new(
            to_1000(bb.x_min as f32),
            to_1000(bb.y_min as f32),
            to_1000(bb.x_max as f32),
            to_1000(bb.y_max as f32),
        ))
        .italic_angle(face.italic_angle())
        .ascent(to_1000(face.ascender() as f32))
        .descent(to_1000(face.descender() as f32))
        .cap_height(face.capital_height().map(|h| to_1000(h as f32)).unwrap_or(700.0))
        .stem_v(80.0)
        .font_file2(data_ref);

    {
        let mut cid = pdf.cid_font(cid_ref);
        cid.subtype(CidFontType::Type2)
            .base_font(Name(ps_name.as_bytes()))
            .system_info(identity_info())
            .font_descriptor(descriptor_ref)
            .default_width(0.0)
            .cid_to_gid_map_predefined(Name(b"Identity"));
        let mut by_gid: Vec<(u16, f32)> = glyphs.values().copied().collect();
        by_gid.sort_by_key(|&(gid, _)| gid);
        let mut widths = cid.widths();
        for (gid, width) in by_gid {
            widths.consecutive(gid, [width]);
        }
    }

    let cmap_name = format!("{ps_name}-UTF16");
    let mut cmap = UnicodeCmap::new(Name(cmap_name.as_bytes()), identity_info());
    let mut pairs: Vec<(u16, char)> = glyphs.iter().map(|(&ch, &(gid, _))| (gid, ch)).collect();
    pairs.sort_unstable();
    for (gid, ch) in pairs {
        cmap.pair(gid, ch);
    }
    pdf.stream(cmap_ref, cmap.finish().as_slice());

    pdf.type0_font(font_ref)
        .base_font(Name(ps_name.as_bytes()))
        .encoding_predefined(Name(b"Identity-H"))
        .descendant_font(cid_ref)
        .to_unicode(cmap_ref);

    let ascender = face.ascender() as f32;
    let descender = face.descender() as f32;
    Some(Embedded {
        glyphs,
        line_h_ratio: (ascender - descender + face.line_gap() as f32) / units,
        ascender_ratio: ascender / units,
    })
}

fn register_font(
    pdf: &mut Pdf,
    family: &str,
    style: FontStyle,
    pdf_name: &str,
    alloc: &mut impl FnMut() -> Ref,
    used_chars: &HashSet<char>,
) -> FontEntry {
    let t0 = std::time::Instant::now();
    let font_ref = alloc();
    let (bold, italic) = style.flags();

    let embedded = family
        .split(';')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .find_map(|candidate| {
            let (path, face_index) = find_font_file(candidate, bold, italic)?;
            let data = std::fs::read(&path).ok()?;
            let ps_name = format!("{}-{style:?}", candidate.replace(' ', ""));
            embed_truetype(pdf, font_ref, alloc, &ps_name, &data, face_index, italic, used_chars)
        });

    let entry = match embedded {
        Some(e) => FontEntry {
            pdf_name: pdf_name.to_string(),
            font_ref,
            line_h_ratio: e.line_h_ratio,
            ascender_ratio: e.ascender_ratio,
            glyphs: Glyphs::Cid { glyphs: e.glyphs },
        },
        None => {
            log::warn!("No font found for {family:?} ({style:?}), using Helvetica");
            let base: &[u8] = match style {
                FontStyle::Regular => b"Helvetica",
                FontStyle::Bold => b"Helvetica-Bold",
                FontStyle::Italic => b"Helvetica-Oblique",
            };
            pdf.type1_font(font_ref)
                .base_font(Name(base))
                .encoding_predefined(Name(b"WinAnsiEncoding"));
            FontEntry {
                pdf_name: pdf_name.to_string(),
                font_ref,
                line_h_ratio: 1.15,
                ascender_ratio: 0.718,
                glyphs: Glyphs::WinAnsi {
                    widths: helvetica_widths(),
                },
            }
        }
    };

    log::debug!(
        "register_font: {family} {style:?} → {:.1}ms",
        t0.elapsed().as_secs_f64() * 1000.0
    );
    entry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn helvetica() -> FontEntry {
        FontEntry {
            pdf_name: "F1".into(),
            font_ref: Ref::new(1),
            line_h_ratio: 1.15,
            ascender_ratio: 0.718,
            glyphs: Glyphs::WinAnsi {
                widths: helvetica_widths(),
            },
        }
    }

    #[test]
    fn winansi_replaces_unmappable() {
        let f = helvetica();
        assert_eq!(f.encode("aπb"), b"a?b".to_vec());
        assert_eq!(f.resolve('€'), '€');
        assert_eq!(f.char_width_1000('π'), f.char_width_1000('?'));
    }

    #[test]
    fn measures_words() {
        let f = helvetica();
        assert!((f.word_width("ii", 10.0) - 5.56).abs() < 1e-3);
        assert!((f.space_width(10.0) - 2.78).abs() < 1e-3);
    }
}

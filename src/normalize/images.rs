use std::sync::LazyLock;

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use regex::Regex;

use crate::model::{Degradation, DegradationKind, ImageAsset, ImageMime, RichTextBlock};

use super::{IMAGE_UNAVAILABLE, placeholder};

const LENIENT: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_decode_padding_mode(DecodePaddingMode::Indifferent)
    .with_decode_allow_trailing_bits(true);
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

const ANCHOR: &str = "data:image/";

/// `![alt](` immediately before a payload.
static MD_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[[^\]\n]*\]\(\s*$").expect("valid markdown image regex"));
/// `img-3.jpeg (` immediately before a payload.
static LEGACY_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)img-\d+\.(?:jpe?g|png|gif|webp)\s*\(\s*$").expect("valid legacy image regex")
});

static MD_IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[[^\]\n]*\]\([^)\n]*\)").expect("valid markdown image regex"));
static LEGACY_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bimg-\d+\.(?:jpe?g|png|gif|webp)(?:\s*\([^)\n]*\))?")
        .expect("valid legacy reference regex")
});
static EMPTY_DATA_URI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)data:image/[a-z0-9.+-]*;?(?:base64)?,?").expect("valid data uri regex")
});

/// How far back the prefix regexes look from a payload anchor.
const PREFIX_WINDOW: usize = 256;

/// Replaces every embedded image payload with a placeholder (or the
/// unavailable marker) and registers decoded assets on `block`.
pub(super) fn extract_images(raw: &str, block: &mut RichTextBlock) -> String {
    let lower = raw.to_ascii_lowercase();
    let mut out = String::with_capacity(raw.len().min(4096));
    let mut copied = 0usize;
    let mut search = 0usize;

    while let Some(rel) = lower[search..].find(ANCHOR) {
        let anchor = search + rel;

        let window_start = floor_char_boundary(raw, anchor.saturating_sub(PREFIX_WINDOW).max(copied));
        let before = &raw[window_start..anchor];
        let prefix_start = MD_PREFIX
            .find(before)
            .or_else(|| LEGACY_PREFIX.find(before))
            .map(|m| window_start + m.start());
        let enclosed = prefix_start.is_some();
        let start = prefix_start.unwrap_or(anchor);

        let Some(parsed) = parse_payload(raw, anchor, enclosed) else {
            search = anchor + ANCHOR.len();
            continue;
        };

        out.push_str(&raw[copied..start]);
        match decode_asset(parsed.subtype, parsed.payload) {
            Ok(asset) => {
                out.push_str(&placeholder("img", &asset.id));
                block.images.entry(asset.id.clone()).or_insert(asset);
            }
            Err(reason) => {
                log::warn!("dropping embedded image: {reason}");
                block.degradations.push(Degradation {
                    kind: DegradationKind::ImageUnavailable,
                    detail: reason,
                });
                out.push_str(IMAGE_UNAVAILABLE);
            }
        }
        copied = parsed.end;
        search = parsed.end;
    }
    out.push_str(&raw[copied..]);
    out
}

struct Payload<'a> {
    subtype: &'a str,
    payload: &'a str,
    /// Byte offset just past the consumed form (including a closing paren).
    end: usize,
}

fn parse_payload(raw: &str, anchor: usize, enclosed: bool) -> Option<Payload<'_>> {
    let after = anchor + ANCHOR.len();
    let rest = &raw[after..];
    let semi = rest.find(|c: char| c == ';' || c == ',' || c.is_whitespace() || c == ')')?;
    let subtype = &rest[..semi];
    if subtype.is_empty() || !rest[semi..].to_ascii_lowercase().starts_with(";base64,") {
        return None;
    }
    let data_start = after + semi + ";base64,".len();

    if enclosed && let Some(close) = raw[data_start..].find(')') {
        return Some(Payload {
            subtype,
            payload: &raw[data_start..data_start + close],
            end: data_start + close + 1,
        });
    }

    let end = bare_payload_end(raw, data_start);
    Some(Payload {
        subtype,
        payload: &raw[data_start..end],
        end,
    })
}

fn is_payload_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=' | '_' | '-' | '\u{AD}')
}

/// A bare payload runs over base64 characters and continues across a line
/// break only when the next line looks like more payload rather than prose.
fn bare_payload_end(raw: &str, start: usize) -> usize {
    let mut pos = start;
    loop {
        let run = raw[pos..]
            .char_indices()
            .find(|&(_, c)| !is_payload_char(c))
            .map(|(i, _)| pos + i)
            .unwrap_or(raw.len());
        pos = run;
        if pos >= raw.len() || raw[start..pos].ends_with('=') {
            return pos;
        }
        let rest = &raw[pos..];
        let nl = if rest.starts_with("\r\n") {
            2
        } else if rest.starts_with('\n') {
            1
        } else {
            return pos;
        };
        let next = &rest[nl..];
        let next_run = next
            .char_indices()
            .find(|&(_, c)| !is_payload_char(c))
            .map(|(i, _)| i)
            .unwrap_or(next.len());
        let continues = next_run >= 16
            && next[..next_run].chars().any(|c| c.is_ascii_digit() || c == '+' || c == '/');
        if !continues {
            return pos;
        }
        pos += nl;
    }
}

fn decode_asset(subtype: &str, payload: &str) -> Result<ImageAsset, String> {
    let url_safe = payload.contains('_');
    let cleaned: String = payload
        .chars()
        .filter(|&c| {
            !(c.is_whitespace()
                || c == '\u{AD}'
                || ('\u{2010}'..='\u{2015}').contains(&c)
                || (c == '-' && !url_safe))
        })
        .collect();
    if cleaned.is_empty() {
        return Err(format!("empty image/{subtype} payload"));
    }

    let data = STANDARD_LENIENT
        .decode(cleaned.as_bytes())
        .or_else(|_| URL_SAFE_LENIENT.decode(cleaned.as_bytes()))
        .map_err(|e| format!("image/{subtype} payload is not valid base64: {e}"))?;
    if data.is_empty() {
        return Err(format!("image/{subtype} payload decodes to nothing"));
    }

    let declared = ImageMime::from_subtype(subtype);
    let sniffed = image::guess_format(&data).ok().and_then(|f| match f {
        image::ImageFormat::Png => Some(ImageMime::Png),
        image::ImageFormat::Jpeg => Some(ImageMime::Jpeg),
        image::ImageFormat::Gif => Some(ImageMime::Gif),
        image::ImageFormat::WebP => Some(ImageMime::Webp),
        _ => None,
    });
    let mime = sniffed
        .or(declared)
        .ok_or_else(|| format!("unsupported image type image/{subtype}"))?;

    Ok(ImageAsset {
        id: content_id(&data),
        data,
        mime,
    })
}

pub(crate) fn content_id(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Drops image references that phase one could not resolve.
pub(super) fn residual_cleanup(text: &str) -> String {
    let text = MD_IMAGE.replace_all(text, "");
    let text = LEGACY_REF.replace_all(&text, "");
    EMPTY_DATA_URI.replace_all(&text, "").into_owned()
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

use std::collections::HashMap;
use std::io::Cursor;

use image::ImageDecoder;
use pdf_writer::{Filter, Pdf, Ref};

use crate::error::{Error, Result};
use crate::model::{ImageAsset, ImageMime};
use crate::normalize::content_id;

/// Resolution SVG assets are rasterized at.
const SVG_DPI: f32 = 150.0;

#[derive(Clone, Debug)]
pub(super) struct RegisteredImage {
    pub(super) name: String,
    pub(super) width_px: u32,
    pub(super) height_px: u32,
}

impl RegisteredImage {
    /// Height over width.
    pub(super) fn aspect(&self) -> f32 {
        self.height_px as f32 / self.width_px.max(1) as f32
    }
}

/// Embeds each distinct image once per document and hands out XObject names.
#[derive(Default)]
pub(super) struct ImageRegistry {
    xobjects: Vec<(String, Ref)>,
    by_hash: HashMap<String, RegisteredImage>,
    assets: usize,
}

impl ImageRegistry {
    pub(super) fn xobjects(&self) -> &[(String, Ref)] {
        &self.xobjects
    }

    /// Distinct question images embedded so far.
    pub(super) fn asset_count(&self) -> usize {
        self.assets
    }

    /// Embeds a question image; repeated ids reuse the first embedding.
    pub(super) fn register_asset(
        &mut self,
        asset: &ImageAsset,
        pdf: &mut Pdf,
        alloc: &mut impl FnMut() -> Ref,
    ) -> Result<RegisteredImage> {
        if let Some(hit) = self.by_hash.get(&asset.id) {
            return Ok(hit.clone());
        }
        let img = self.embed(&asset.id, &asset.data, asset.mime, pdf, alloc)?;
        self.assets += 1;
        Ok(img)
    }

    /// Embeds raw bytes of any supported format, e.g. a rasterized formula.
    pub(super) fn register_bytes(
        &mut self,
        data: &[u8],
        pdf: &mut Pdf,
        alloc: &mut impl FnMut() -> Ref,
    ) -> Result<RegisteredImage> {
        let id = content_id(data);
        if let Some(hit) = self.by_hash.get(&id) {
            return Ok(hit.clone());
        }
        let mime = sniff(data).ok_or_else(|| Error::Image {
            id: id.clone(),
            reason: "unrecognized image data".into(),
        })?;
        self.embed(&id, data, mime, pdf, alloc)
    }

    /// Embeds every question image not seen before, or none of them when
    /// any fails to decode. Returns how many were added.
    pub(super) fn register_all<'d>(
        &mut self,
        assets: impl IntoIterator<Item = &'d ImageAsset>,
        pdf: &mut Pdf,
        alloc: &mut impl FnMut() -> Ref,
    ) -> Result<usize> {
        let mut pending: Vec<(&ImageAsset, Prepared<'d>)> = Vec::new();
        for asset in assets {
            if self.by_hash.contains_key(&asset.id) || pending.iter().any(|(a, _)| a.id == asset.id)
            {
                continue;
            }
            let prepared = prepare(&asset.data, asset.mime).map_err(|reason| Error::Image {
                id: asset.id.clone(),
                reason,
            })?;
            pending.push((asset, prepared));
        }
        let added = pending.len();
        for (asset, prepared) in pending {
            self.insert(&asset.id, asset.mime, &prepared, pdf, alloc);
            self.assets += 1;
        }
        Ok(added)
    }

    fn embed(
        &mut self,
        id: &str,
        data: &[u8],
        mime: ImageMime,
        pdf: &mut Pdf,
        alloc: &mut impl FnMut() -> Ref,
    ) -> Result<RegisteredImage> {
        let prepared = prepare(data, mime).map_err(|reason| Error::Image {
            id: id.to_string(),
            reason,
        })?;
        Ok(self.insert(id, mime, &prepared, pdf, alloc))
    }

    fn insert(
        &mut self,
        id: &str,
        mime: ImageMime,
        prepared: &Prepared<'_>,
        pdf: &mut Pdf,
        alloc: &mut impl FnMut() -> Ref,
    ) -> RegisteredImage {
        let name = format!("Im{}", self.xobjects.len() + 1);
        let xobj_ref = alloc();
        let (width_px, height_px) = match prepared {
            Prepared::Dct {
                data,
                width,
                height,
                gray,
            } => {
                write_dct(data, *width, *height, *gray, xobj_ref, pdf);
                (*width, *height)
            }
            Prepared::Pixels(rgba) => embed_decoded(rgba, xobj_ref, pdf, alloc),
        };

        log::debug!("embedded {} {id} as {name} ({width_px}x{height_px})", mime.as_str());
        let img = RegisteredImage {
            name: name.clone(),
            width_px,
            height_px,
        };
        self.xobjects.push((name, xobj_ref));
        self.by_hash.insert(id.to_string(), img.clone());
        img
    }
}

/// An image checked and decoded, not yet written to the document.
enum Prepared<'d> {
    /// Baseline gray or RGB JPEG, passed through untouched.
    Dct {
        data: &'d [u8],
        width: u32,
        height: u32,
        gray: bool,
    },
    Pixels(image::RgbaImage),
}

fn prepare(data: &[u8], mime: ImageMime) -> std::result::Result<Prepared<'_>, String> {
    match mime {
        ImageMime::Jpeg => match jpeg_passthrough(data) {
            Some(dct) => Ok(dct),
            None => decode(data).map(Prepared::Pixels),
        },
        ImageMime::Svg => {
            let (png, _, _) = crate::math::svg_to_png(data, SVG_DPI)?;
            decode(&png).map(Prepared::Pixels)
        }
        ImageMime::Png | ImageMime::Gif | ImageMime::Webp => decode(data).map(Prepared::Pixels),
    }
}

fn sniff(data: &[u8]) -> Option<ImageMime> {
    if crate::math::looks_like_svg(data) {
        return Some(ImageMime::Svg);
    }
    match image::guess_format(data).ok()? {
        image::ImageFormat::Png => Some(ImageMime::Png),
        image::ImageFormat::Jpeg => Some(ImageMime::Jpeg),
        image::ImageFormat::Gif => Some(ImageMime::Gif),
        image::ImageFormat::WebP => Some(ImageMime::Webp),
        _ => None,
    }
}

fn decode(data: &[u8]) -> std::result::Result<image::RgbaImage, String> {
    let img = image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| e.to_string())?
        .decode()
        .map_err(|e| e.to_string())?;
    let rgba = img.to_rgba8();
    if rgba.width() == 0 || rgba.height() == 0 {
        return Err("image has no pixels".into());
    }
    Ok(rgba)
}

/// Baseline gray or RGB JPEG can go in as DCT. Other JPEGs (CMYK) return
/// `None` and get re-encoded.
fn jpeg_passthrough(data: &[u8]) -> Option<Prepared<'_>> {
    let decoder = image::codecs::jpeg::JpegDecoder::new(Cursor::new(data)).ok()?;
    let (width, height) = decoder.dimensions();
    let gray = match decoder.color_type() {
        image::ColorType::L8 => true,
        image::ColorType::Rgb8 => false,
        _ => return None,
    };
    Some(Prepared::Dct {
        data,
        width,
        height,
        gray,
    })
}

fn write_dct(data: &[u8], w: u32, h: u32, gray: bool, xobj_ref: Ref, pdf: &mut Pdf) {
    let mut xobj = pdf.image_xobject(xobj_ref, data);
    xobj.filter(Filter::DctDecode);
    xobj.width(w as i32);
    xobj.height(h as i32);
    if gray {
        xobj.color_space().device_gray();
    } else {
        xobj.color_space().device_rgb();
    }
    xobj.bits_per_component(8);
}

/// Flate RGB plus a soft mask when any pixel is translucent.
fn embed_decoded(
    rgba: &image::RgbaImage,
    xobj_ref: Ref,
    pdf: &mut Pdf,
    alloc: &mut impl FnMut() -> Ref,
) -> (u32, u32) {
    let (w, h) = (rgba.width(), rgba.height());
    let rgb: Vec<u8> = rgba.pixels().flat_map(|p| [p.0[0], p.0[1], p.0[2]]).collect();
    let compressed_rgb = miniz_oxide::deflate::compress_to_vec_zlib(&rgb, 6);

    let smask_ref = rgba.pixels().any(|p| p.0[3] < 255).then(|| {
        let alpha: Vec<u8> = rgba.pixels().map(|p| p.0[3]).collect();
        let compressed = miniz_oxide::deflate::compress_to_vec_zlib(&alpha, 6);
        let mask_ref = alloc();
        let mut mask = pdf.image_xobject(mask_ref, &compressed);
        mask.filter(Filter::FlateDecode);
        mask.width(w as i32);
        mask.height(h as i32);
        mask.color_space().device_gray();
        mask.bits_per_component(8);
        mask_ref
    });

    let mut xobj = pdf.image_xobject(xobj_ref, &compressed_rgb);
    xobj.filter(Filter::FlateDecode);
    xobj.width(w as i32);
    xobj.height(h as i32);
    xobj.color_space().device_rgb();
    xobj.bits_per_component(8);
    if let Some(mask_ref) = smask_ref {
        xobj.s_mask(mask_ref);
    }
    (w, h)
}

//! PDF output: runs the prepared questions through the column flow and
//! writes the document objects.

mod chrome;
mod columns;
mod composer;
mod images;
mod layout;
mod table;

use std::collections::HashSet;
use std::time::Instant;

use pdf_writer::{Filter, Name, Pdf, Rect, Ref};

use crate::config::RenderOptions;
use crate::error::{Error, Result};
use crate::fonts::FontBook;
use crate::math::{CachedRasterizer, MathRasterizer, MathRenderer};
use crate::model::{PaperRequest, RenderedPaper};

pub use columns::{ColumnGeometry, ColumnLayoutEngine, LayoutCursor, Placement, Transition};

/// Hands out object ids in increasing order.
pub(crate) struct RefAlloc {
    next: i32,
}

impl RefAlloc {
    fn new() -> Self {
        Self { next: 1 }
    }

    pub(crate) fn bump(&mut self) -> Ref {
        let r = Ref::new(self.next);
        self.next += 1;
        r
    }
}

/// `Intro to Physics: Mock #2` -> `intro-to-physics-mock-2.pdf`
pub(crate) fn paper_filename(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "exam-paper.pdf".to_string()
    } else {
        format!("{slug}.pdf")
    }
}

pub(crate) fn render(
    request: &PaperRequest,
    opts: &RenderOptions,
    rasterizer: &dyn MathRasterizer,
) -> Result<RenderedPaper> {
    let t0 = Instant::now();

    // Phase 1: normalize every question and collect the characters drawn
    let sections = composer::prepare(request, opts)?;
    let question_count: usize = sections.iter().map(|s| s.questions.len()).sum();
    let mut chars = HashSet::new();
    composer::collect_chars(&sections, &mut chars);
    chars.extend(chrome::chrome_text(request, opts, question_count).chars());
    let t_normalize = t0.elapsed();

    // Phase 2: embed the three faces, subset to those characters
    let mut pdf = Pdf::new();
    let mut refs = RefAlloc::new();
    let catalog_id = refs.bump();
    let pages_id = refs.bump();
    let fonts = FontBook::register(
        &mut pdf,
        &opts.typography.font_family,
        &chars,
        &mut || refs.bump(),
    );
    let t_fonts = t0.elapsed();

    // Phase 3: column flow
    let cache = CachedRasterizer::new(rasterizer);
    let math = MathRenderer::new(
        &cache,
        &fonts.regular,
        opts.typography.font_size,
        opts.math.timeout,
    );
    let mut composer = composer::Composer::new(opts, &fonts, math, pdf, refs);
    composer.place_header(&chrome::Header::new(request, &fonts, opts, question_count));
    for section in &sections {
        composer.compose_section(section);
    }
    let composer::Composed {
        mut pdf,
        mut refs,
        mut images,
        mut pages,
        mut markers,
        geometry,
    } = composer.finish();
    log::debug!("{} distinct formula(s) rendered", cache.len());
    let t_layout = t0.elapsed();

    // Phase 4: footers, column rules, watermark overlay
    let watermark =
        chrome::resolve_watermark(request, opts, &mut images, &mut pdf, &mut refs, &mut markers);
    chrome::finish_pages(&mut pages, request, &fonts, opts, watermark.as_ref());
    let t_chrome = t0.elapsed();

    // Phase 5: page objects
    let n = pages.len();
    let page_ids: Vec<Ref> = (0..n).map(|_| refs.bump()).collect();
    let content_ids: Vec<Ref> = (0..n).map(|_| refs.bump()).collect();
    let watermark_gs = watermark.is_some().then(|| {
        let gs_ref = refs.bump();
        let alpha = opts.watermark.opacity.clamp(0.0, 1.0);
        pdf.ext_graphics(gs_ref)
            .non_stroking_alpha(alpha)
            .stroking_alpha(alpha);
        gs_ref
    });

    let mut records = Vec::with_capacity(n);
    for (i, canvas) in pages.into_iter().enumerate() {
        let raw = canvas.content.finish();
        let compressed = miniz_oxide::deflate::compress_to_vec_zlib(raw.as_slice(), 6);
        pdf.stream(content_ids[i], &compressed).filter(Filter::FlateDecode);
        records.push(canvas.record);
    }

    let page_count = i32::try_from(n).map_err(|_| Error::Pdf(format!("{n} pages exceed the page tree limit")))?;
    pdf.catalog(catalog_id).pages(pages_id);
    pdf.pages(pages_id)
        .kids(page_ids.iter().copied())
        .count(page_count);

    for i in 0..n {
        let mut page = pdf.page(page_ids[i]);
        page.media_box(Rect::new(0.0, 0.0, opts.page.width, opts.page.height))
            .parent(pages_id)
            .contents(content_ids[i]);
        let mut resources = page.resources();
        {
            let mut font_dict = resources.fonts();
            for entry in fonts.entries() {
                font_dict.pair(Name(entry.pdf_name.as_bytes()), entry.font_ref);
            }
        }
        if !images.xobjects().is_empty() {
            let mut xobjects = resources.x_objects();
            for (name, xobj_ref) in images.xobjects() {
                xobjects.pair(Name(name.as_bytes()), *xobj_ref);
            }
        }
        if let Some(gs_ref) = watermark_gs {
            resources
                .ext_g_states()
                .pair(Name(chrome::WATERMARK_GS), gs_ref);
        }
    }

    let bytes = pdf.finish();
    let t_assembly = t0.elapsed();

    log::info!(
        "Render phases: normalize={:.1}ms, fonts={:.1}ms, layout={:.1}ms, chrome={:.1}ms, assembly={:.1}ms",
        t_normalize.as_secs_f64() * 1000.0,
        (t_fonts - t_normalize).as_secs_f64() * 1000.0,
        (t_layout - t_fonts).as_secs_f64() * 1000.0,
        (t_chrome - t_layout).as_secs_f64() * 1000.0,
        (t_assembly - t_chrome).as_secs_f64() * 1000.0,
    );
    if !markers.is_empty() {
        log::info!("{} degraded element(s) in {n} page(s)", markers.len());
    }

    Ok(RenderedPaper {
        bytes,
        filename: paper_filename(&request.title),
        page_count: n,
        pages: records,
        degraded: markers,
        image_assets: images.asset_count(),
        page_bottom: geometry.page_bottom,
    })
}

#[cfg(test)]
mod tests {
    use super::paper_filename;

    #[test]
    fn filename_is_a_slug_of_the_title() {
        assert_eq!(paper_filename("Intro to Physics: Mock #2"), "intro-to-physics-mock-2.pdf");
        assert_eq!(paper_filename("  ***  "), "exam-paper.pdf");
    }
}

//! Math span rendering: rasterize when a rasterizer is available, fall back
//! to a Unicode transliteration otherwise. Every span renders to something.

mod rasterize;
mod unicode;

use std::time::Duration;

use crate::model::{MathPayload, RenderedMath};

pub(crate) use rasterize::{looks_like_svg, svg_to_png};
pub use rasterize::{CachedRasterizer, CommandRasterizer, MathRasterizer, NoRasterizer, RasterError, RasterImage};
pub use unicode::to_unicode;

/// Width and line-height queries for the font text fallback is drawn in.
pub trait TextMeasure {
    fn text_width(&self, text: &str, font_size: f32) -> f32;
    fn line_height(&self, font_size: f32) -> f32;
}

/// Rendered span plus, when the preferred path failed, the reason.
#[derive(Clone, Debug)]
pub struct MathOutcome {
    pub rendered: RenderedMath,
    pub degraded: Option<RasterError>,
}

struct MathRequest<'a> {
    expr: &'a str,
    is_block: bool,
    max_width: f32,
}

type Attempt = fn(&MathRenderer<'_>, &MathRequest<'_>) -> Result<RenderedMath, RasterError>;

/// Attempts tried in order before the text fallback.
const ATTEMPTS: &[Attempt] = &[try_rasterize];

fn try_rasterize(r: &MathRenderer<'_>, req: &MathRequest<'_>) -> Result<RenderedMath, RasterError> {
    let img = r
        .rasterizer
        .rasterize(req.expr, req.is_block, r.font_size, r.timeout)?;
    if img.width <= 0.0 || img.height <= 0.0 {
        return Err(RasterError::Failed("image has no area".into()));
    }
    let scale = (req.max_width / img.width).min(1.0);
    Ok(RenderedMath {
        payload: MathPayload::Image(img.png),
        width: img.width * scale,
        height: img.height * scale,
        font_size: 0.0,
    })
}

pub struct MathRenderer<'a> {
    rasterizer: &'a dyn MathRasterizer,
    measure: &'a dyn TextMeasure,
    font_size: f32,
    timeout: Duration,
}

impl<'a> MathRenderer<'a> {
    pub fn new(
        rasterizer: &'a dyn MathRasterizer,
        measure: &'a dyn TextMeasure,
        font_size: f32,
        timeout: Duration,
    ) -> Self {
        Self {
            rasterizer,
            measure,
            font_size,
            timeout,
        }
    }

    /// Renders `expr` to fit within `max_width`. Never fails.
    pub fn render(&self, expr: &str, is_block: bool, max_width: f32) -> MathOutcome {
        let req = MathRequest {
            expr,
            is_block,
            max_width: max_width.max(1.0),
        };
        let mut degraded = None;
        for attempt in ATTEMPTS {
            match attempt(self, &req) {
                Ok(rendered) => return MathOutcome { rendered, degraded: None },
                Err(e) => {
                    if !matches!(e, RasterError::Unavailable) {
                        log::debug!("math {expr:?}: {e}");
                    }
                    degraded = Some(e);
                }
            }
        }
        MathOutcome {
            rendered: self.transliterate(&req),
            degraded,
        }
    }

    /// The text rendering alone, for callers that cannot use an image.
    pub fn render_text(&self, expr: &str, is_block: bool, max_width: f32) -> RenderedMath {
        self.transliterate(&MathRequest {
            expr,
            is_block,
            max_width: max_width.max(1.0),
        })
    }

    fn transliterate(&self, req: &MathRequest<'_>) -> RenderedMath {
        let text = to_unicode(req.expr);
        let mut font_size = self.font_size;
        let mut width = self.measure.text_width(&text, font_size);
        if width > req.max_width && width > 0.0 {
            font_size *= req.max_width / width;
            width = req.max_width;
        }
        RenderedMath {
            height: self.measure.line_height(font_size),
            payload: MathPayload::Text(text),
            width,
            font_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every character is half the font size wide.
    struct Fixed;

    impl TextMeasure for Fixed {
        fn text_width(&self, text: &str, font_size: f32) -> f32 {
            text.chars().count() as f32 * font_size * 0.5
        }
        fn line_height(&self, font_size: f32) -> f32 {
            font_size * 1.2
        }
    }

    struct Square(f32);

    impl MathRasterizer for Square {
        fn rasterize(&self, _: &str, _: bool, _: f32, _: Duration) -> Result<RasterImage, RasterError> {
            Ok(RasterImage {
                png: vec![1, 2, 3],
                width: self.0,
                height: self.0,
            })
        }
    }

    #[test]
    fn image_keeps_aspect_when_scaled() {
        let r = Square(200.0);
        let m = MathRenderer::new(&r, &Fixed, 10.0, Duration::from_secs(1));
        let out = m.render("x", true, 100.0);
        assert!(out.degraded.is_none());
        assert!(out.rendered.is_image());
        assert_eq!(out.rendered.width, 100.0);
        assert_eq!(out.rendered.height, 100.0);
    }

    #[test]
    fn zero_area_image_degrades_to_text() {
        let r = Square(0.0);
        let m = MathRenderer::new(&r, &Fixed, 10.0, Duration::from_secs(1));
        let out = m.render("\\pi", false, 100.0);
        assert!(matches!(out.degraded, Some(RasterError::Failed(_))));
        assert_eq!(out.rendered.payload, MathPayload::Text("π".into()));
    }

    #[test]
    fn every_attempt_runs_before_text() {
        let r = Square(20.0);
        let m = MathRenderer::new(&r, &Fixed, 10.0, Duration::from_secs(1));
        let req = MathRequest {
            expr: "x",
            is_block: false,
            max_width: 50.0,
        };
        let results: Vec<_> = ATTEMPTS.iter().map(|attempt| attempt(&m, &req)).collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(&results[0], Ok(r) if r.width == 20.0));
    }

    #[test]
    fn fallback_shrinks_font_to_fit() {
        let m = MathRenderer::new(&NoRasterizer, &Fixed, 10.0, Duration::from_secs(1));
        let out = m.render("abcdefghij", false, 25.0);
        assert_eq!(out.degraded, Some(RasterError::Unavailable));
        assert_eq!(out.rendered.width, 25.0);
        assert!((out.rendered.font_size - 5.0).abs() < 1e-4);
    }
}

mod config;
mod error;
mod fonts;
mod math;
mod model;
mod normalize;
mod pdf;

pub use config::{
    A4_HEIGHT, A4_WIDTH, MathOptions, PageSetup, RenderOptions, Typography, WatermarkOptions,
};
pub use error::{Error, Result};
pub use math::{
    CachedRasterizer, CommandRasterizer, MathOutcome, MathRasterizer, MathRenderer, NoRasterizer,
    RasterError, RasterImage, TextMeasure, to_unicode,
};
pub use model::{
    AnswerRef, BlockKind, CellAlign, Column, Degradation, DegradationKind, DegradedMarker,
    ImageAsset, ImageMime, MathPayload, MathSpan, PageRecord, PaperRequest, PlacedBlock, Question,
    RenderedMath, RenderedPaper, RichTextBlock, Solution, Table,
};
pub use normalize::{IMAGE_UNAVAILABLE, Segment, normalize, repair_math};
pub use pdf::{ColumnGeometry, ColumnLayoutEngine, LayoutCursor, Placement, Transition};

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Renders exam papers with one set of options and one math backend.
/// Cheap to share between threads; every render owns its own layout state.
#[derive(Clone)]
pub struct Renderer {
    options: RenderOptions,
    rasterizer: Arc<dyn MathRasterizer>,
}

impl Renderer {
    /// Uses the external rasterizer command from `options.math` when one is
    /// configured, text fallback only otherwise.
    pub fn new(options: RenderOptions) -> Self {
        let rasterizer: Arc<dyn MathRasterizer> = match options
            .math
            .command
            .as_deref()
            .and_then(|argv| CommandRasterizer::new(argv, options.math.dpi))
        {
            Some(cmd) => Arc::new(cmd),
            None => Arc::new(NoRasterizer),
        };
        Self {
            options,
            rasterizer,
        }
    }

    pub fn with_rasterizer(mut self, rasterizer: impl MathRasterizer + 'static) -> Self {
        self.rasterizer = Arc::new(rasterizer);
        self
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn render(&self, request: &PaperRequest) -> Result<RenderedPaper> {
        pdf::render(request, &self.options, self.rasterizer.as_ref())
    }

    /// Reads a JSON request, renders it and writes the PDF to `output`.
    pub fn convert_file(&self, input: &Path, output: &Path) -> Result<RenderedPaper> {
        let t0 = Instant::now();

        let json = std::fs::read_to_string(input)?;
        let request: PaperRequest = serde_json::from_str(&json)?;
        let t_parse = t0.elapsed();

        let paper = self.render(&request)?;
        let t_render = t0.elapsed();

        std::fs::write(output, &paper.bytes)?;
        let t_total = t0.elapsed();

        log::info!(
            "Timing: parse={:.1}ms, render={:.1}ms, write={:.1}ms, total={:.1}ms (output {} bytes, {} pages)",
            t_parse.as_secs_f64() * 1000.0,
            (t_render - t_parse).as_secs_f64() * 1000.0,
            (t_total - t_render).as_secs_f64() * 1000.0,
            t_total.as_secs_f64() * 1000.0,
            paper.bytes.len(),
            paper.page_count,
        );

        Ok(paper)
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(RenderOptions::default())
    }
}

/// Renders with defaults plus the `EXAMPAPER_*` environment.
pub fn render_paper(request: &PaperRequest) -> Result<RenderedPaper> {
    Renderer::new(RenderOptions::from_env()).render(request)
}

pub fn convert_request_file(input: &Path, output: &Path) -> Result<RenderedPaper> {
    Renderer::new(RenderOptions::from_env()).convert_file(input, output)
}

use std::time::Duration;

/// A4 in points.
pub const A4_WIDTH: f32 = 595.28;
pub const A4_HEIGHT: f32 = 841.89;

#[derive(Clone, Debug)]
pub struct PageSetup {
    pub width: f32,
    pub height: f32,
    pub margin_top: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,
    pub margin_right: f32,
    pub column_gap: f32,
    /// Band at the bottom of every page reserved for the footer line.
    pub footer_height: f32,
    /// Vertical space between consecutive blocks of the column flow.
    pub block_spacing: f32,
    /// Extra space before each question's first block.
    pub question_spacing: f32,
}

impl Default for PageSetup {
    fn default() -> Self {
        Self {
            width: A4_WIDTH,
            height: A4_HEIGHT,
            margin_top: 36.0,
            margin_bottom: 30.0,
            margin_left: 36.0,
            margin_right: 36.0,
            column_gap: 18.0,
            footer_height: 20.0,
            block_spacing: 3.0,
            question_spacing: 8.0,
        }
    }
}

impl PageSetup {
    pub fn column_width(&self) -> f32 {
        ((self.width - self.margin_left - self.margin_right - self.column_gap) / 2.0).max(1.0)
    }

    pub fn text_width(&self) -> f32 {
        self.width - self.margin_left - self.margin_right
    }

    pub fn content_top(&self) -> f32 {
        self.margin_top
    }

    /// Lowest y (top-down) a block may reach.
    pub fn content_bottom(&self) -> f32 {
        self.height - self.margin_bottom - self.footer_height
    }

    pub fn left_column_x(&self) -> f32 {
        self.margin_left
    }

    pub fn right_column_x(&self) -> f32 {
        self.margin_left + self.column_width() + self.column_gap
    }
}

#[derive(Clone, Debug)]
pub struct Typography {
    /// `;`-separated family candidates, tried in order.
    pub font_family: String,
    pub font_size: f32,
    pub line_height: f32,
    pub title_size: f32,
    pub banner_size: f32,
    pub footer_size: f32,
}

impl Default for Typography {
    fn default() -> Self {
        Self {
            font_family: "Arial; Liberation Sans; DejaVu Sans; Noto Sans".into(),
            font_size: 9.5,
            line_height: 1.25,
            title_size: 15.0,
            banner_size: 10.5,
            footer_size: 7.5,
        }
    }
}

#[derive(Clone, Debug)]
pub struct MathOptions {
    /// Program and arguments of an external LaTeX rasterizer. Reads the
    /// expression on stdin and writes PNG or SVG to stdout.
    pub command: Option<Vec<String>>,
    pub timeout: Duration,
    /// Resolution the rasterizer's PNG output is assumed to have.
    pub dpi: f32,
}

impl Default for MathOptions {
    fn default() -> Self {
        Self {
            command: None,
            timeout: Duration::from_millis(2500),
            dpi: 300.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct WatermarkOptions {
    pub enabled: bool,
    pub opacity: f32,
    pub rotation_deg: f32,
    /// Text used when no logo is available; defaults to the college name.
    pub text: Option<String>,
}

impl Default for WatermarkOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            opacity: 0.08,
            rotation_deg: 45.0,
            text: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RenderOptions {
    pub page: PageSetup,
    pub typography: Typography,
    pub math: MathOptions,
    pub watermark: WatermarkOptions,
    pub logo_timeout: Duration,
    /// Overrides `PaperRequest::include_answers` when set.
    pub include_answers: Option<bool>,
    /// Overrides `PaperRequest::with_solutions` when set.
    pub with_solutions: Option<bool>,
    /// Overrides `PaperRequest::with_hints` when set.
    pub with_hints: Option<bool>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            page: PageSetup::default(),
            typography: Typography::default(),
            math: MathOptions::default(),
            watermark: WatermarkOptions::default(),
            logo_timeout: Duration::from_secs(3),
            include_answers: None,
            with_solutions: None,
            with_hints: None,
        }
    }
}

impl RenderOptions {
    /// Defaults plus whatever the `EXAMPAPER_*` environment provides.
    pub fn from_env() -> Self {
        let mut opts = Self::default();
        if let Ok(cmd) = std::env::var("EXAMPAPER_MATH_CMD") {
            let parts: Vec<String> = cmd.split_whitespace().map(str::to_string).collect();
            if !parts.is_empty() {
                opts.math.command = Some(parts);
            }
        }
        opts
    }
}

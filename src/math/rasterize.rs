use std::collections::HashMap;
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

/// Bytes of stderr kept for the failure message.
const STDERR_LIMIT: u64 = 16 * 1024;

/// A rasterized expression. Size is in points.
#[derive(Clone, Debug, PartialEq)]
pub struct RasterImage {
    pub png: Vec<u8>,
    pub width: f32,
    pub height: f32,
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum RasterError {
    #[error("no math rasterizer configured")]
    Unavailable,
    #[error("math rasterizer timed out after {0:?}")]
    Timeout(Duration),
    #[error("unsupported rasterizer output: {0}")]
    Unsupported(String),
    #[error("math rasterizer failed: {0}")]
    Failed(String),
}

/// Turns one LaTeX expression into an image. Implementations must give up
/// once `timeout` has elapsed.
pub trait MathRasterizer: Send + Sync {
    fn rasterize(
        &self,
        expr: &str,
        is_block: bool,
        font_size: f32,
        timeout: Duration,
    ) -> Result<RasterImage, RasterError>;
}

/// Always declines; every span goes to the text fallback.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoRasterizer;

impl MathRasterizer for NoRasterizer {
    fn rasterize(&self, _: &str, _: bool, _: f32, _: Duration) -> Result<RasterImage, RasterError> {
        Err(RasterError::Unavailable)
    }
}

/// Runs an external program per expression. The expression goes to stdin;
/// PNG or SVG is expected on stdout. `EXAMPAPER_MATH_DISPLAY` is `block` or
/// `inline` and `EXAMPAPER_MATH_FONT_SIZE` carries the point size.
#[derive(Clone, Debug)]
pub struct CommandRasterizer {
    program: String,
    args: Vec<String>,
    dpi: f32,
}

impl CommandRasterizer {
    /// `argv[0]` is the program. Returns `None` for an empty command line.
    pub fn new(argv: &[String], dpi: f32) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            dpi: if dpi > 0.0 { dpi } else { 96.0 },
        })
    }
}

impl MathRasterizer for CommandRasterizer {
    fn rasterize(
        &self,
        expr: &str,
        is_block: bool,
        font_size: f32,
        timeout: Duration,
    ) -> Result<RasterImage, RasterError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env("EXAMPAPER_MATH_DISPLAY", if is_block { "block" } else { "inline" })
            .env("EXAMPAPER_MATH_FONT_SIZE", format!("{font_size}"))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RasterError::Failed(format!("cannot start {}: {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            let expr = expr.to_string();
            std::thread::spawn(move || {
                // A program that ignores stdin closes the pipe; that is not an error.
                let _ = stdin.write_all(expr.as_bytes());
            });
        }

        // Readers report over channels so a pipe held open by a leftover
        // grandchild cannot stall us past the deadline.
        let (out_tx, out_rx) = mpsc::channel();
        let stdout = child.stdout.take();
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(mut out) = stdout {
                let _ = out.read_to_end(&mut buf);
            }
            let _ = out_tx.send(buf);
        });
        let (err_tx, err_rx) = mpsc::channel();
        let stderr = child.stderr.take();
        std::thread::spawn(move || {
            let mut buf = String::new();
            if let Some(mut err) = stderr {
                let _ = (&mut err).take(STDERR_LIMIT).read_to_string(&mut buf);
                let _ = std::io::copy(&mut err, &mut std::io::sink());
            }
            let _ = err_tx.send(buf);
        });

        let deadline = Instant::now() + timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    log::warn!("math rasterizer killed after {timeout:?}");
                    return Err(RasterError::Timeout(timeout));
                }
                Ok(None) => std::thread::sleep(Duration::from_millis(5)),
                Err(e) => return Err(RasterError::Failed(e.to_string())),
            }
        };

        let output = match out_rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(buf) => buf,
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("math rasterizer exited but its output stayed open past {timeout:?}");
                return Err(RasterError::Timeout(timeout));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(RasterError::Failed("stdout reader panicked".into()));
            }
        };
        let stderr = err_rx
            .recv_timeout(deadline.saturating_duration_since(Instant::now()))
            .unwrap_or_default();
        if !status.success() {
            let first = stderr.lines().next().unwrap_or("").trim().to_string();
            return Err(RasterError::Failed(format!("{status}: {first}")));
        }
        decode_output(&output, self.dpi)
    }
}

fn decode_output(bytes: &[u8], dpi: f32) -> Result<RasterImage, RasterError> {
    if bytes.is_empty() {
        return Err(RasterError::Failed("empty output".into()));
    }
    if looks_like_svg(bytes) {
        let (png, width, height) = svg_to_png(bytes, dpi).map_err(RasterError::Unsupported)?;
        return Ok(RasterImage { png, width, height });
    }
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => {
            let (w, h) = image::ImageReader::with_format(
                std::io::Cursor::new(bytes),
                image::ImageFormat::Png,
            )
            .into_dimensions()
            .map_err(|e| RasterError::Failed(format!("bad PNG: {e}")))?;
            let scale = 72.0 / dpi;
            Ok(RasterImage {
                png: bytes.to_vec(),
                width: w as f32 * scale,
                height: h as f32 * scale,
            })
        }
        Ok(other) => Err(RasterError::Unsupported(format!("{other:?}"))),
        Err(_) => Err(RasterError::Unsupported("unrecognized bytes".into())),
    }
}

pub(crate) fn looks_like_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(512)];
    let head = String::from_utf8_lossy(head);
    let head = head.trim_start();
    head.starts_with("<svg") || (head.starts_with("<?xml") && head.contains("<svg"))
}

/// Renders SVG to PNG at `dpi`. Returns the PNG and its size in points.
#[cfg(feature = "svg")]
pub(crate) fn svg_to_png(data: &[u8], dpi: f32) -> Result<(Vec<u8>, f32, f32), String> {
    use resvg::tiny_skia::{Pixmap, Transform};
    use resvg::usvg;

    let mut options = usvg::Options::default();
    let text = String::from_utf8_lossy(data);
    if text.contains("<text") || text.contains("font-family") {
        options.fontdb_mut().load_system_fonts();
    }
    let tree = usvg::Tree::from_data(data, &options).map_err(|e| format!("bad SVG: {e}"))?;

    // usvg sizes are CSS pixels (1/96 in).
    let size = tree.size();
    let scale = dpi / 96.0;
    let width = (size.width() * scale).ceil() as u32;
    let height = (size.height() * scale).ceil() as u32;
    if width == 0 || height == 0 {
        return Err("SVG has no area".into());
    }
    let mut pixmap = Pixmap::new(width, height).ok_or("SVG too large")?;
    resvg::render(&tree, Transform::from_scale(scale, scale), &mut pixmap.as_mut());

    let mut rgba = pixmap.data().to_vec();
    unpremultiply(&mut rgba);
    let img = image::RgbaImage::from_raw(width, height, rgba).ok_or("pixmap size mismatch")?;
    let mut png = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| format!("PNG encode: {e}"))?;

    Ok((png, size.width() * 0.75, size.height() * 0.75))
}

#[cfg(not(feature = "svg"))]
pub(crate) fn svg_to_png(_data: &[u8], _dpi: f32) -> Result<(Vec<u8>, f32, f32), String> {
    Err("SVG support disabled; enable feature \"svg\"".into())
}

#[cfg(feature = "svg")]
fn unpremultiply(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u32;
        if a == 0 || a == 255 {
            continue;
        }
        for c in &mut px[..3] {
            *c = ((*c as u32 * 255 + a / 2) / a).min(255) as u8;
        }
    }
}

type CacheKey = (String, bool, u32);

/// Memoizes another rasterizer for the lifetime of one render, failures
/// included, so a slow or broken expression costs at most one timeout.
pub struct CachedRasterizer<'a> {
    inner: &'a dyn MathRasterizer,
    cache: Mutex<HashMap<CacheKey, Result<RasterImage, RasterError>>>,
}

impl<'a> CachedRasterizer<'a> {
    pub fn new(inner: &'a dyn MathRasterizer) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MathRasterizer for CachedRasterizer<'_> {
    fn rasterize(
        &self,
        expr: &str,
        is_block: bool,
        font_size: f32,
        timeout: Duration,
    ) -> Result<RasterImage, RasterError> {
        let key = (expr.to_string(), is_block, font_size.to_bits());
        if let Ok(cache) = self.cache.lock()
            && let Some(hit) = cache.get(&key)
        {
            return hit.clone();
        }
        let result = self.inner.rasterize(expr, is_block, font_size, timeout);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, result.clone());
        }
        result
    }
}

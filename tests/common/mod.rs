#![allow(dead_code)]

use std::fs;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use exampaper_pdf::{
    MathRasterizer, PaperRequest, Question, RasterError, RasterImage, RenderOptions, Renderer,
};

pub fn question(content: &str, options: &[&str]) -> Question {
    Question {
        id: format!("q-{}", content.len()),
        content: content.to_string(),
        options: options.iter().map(|o| o.to_string()).collect(),
        subject: "Mathematics".to_string(),
        ..Default::default()
    }
}

pub fn request(questions: Vec<Question>) -> PaperRequest {
    PaperRequest {
        title: "Unit Test Paper".to_string(),
        description: "Answer all questions.".to_string(),
        duration: Some("60 minutes".to_string()),
        total_marks: Some(100),
        college_name: "Test College".to_string(),
        questions,
        ..Default::default()
    }
}

pub fn renderer() -> Renderer {
    Renderer::new(RenderOptions::default())
}

/// Encoded PNG of a solid `w`x`h` image.
pub fn png_bytes(w: u32, h: u32, rgb: [u8; 3]) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(w, h, image::Rgb(rgb));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .expect("encode png");
    buf.into_inner()
}

pub fn png_data_uri(w: u32, h: u32, rgb: [u8; 3]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png_bytes(w, h, rgb)))
}

/// Page objects in a finished PDF (`/Type /Page`, not `/Pages`).
pub fn pdf_page_objects(bytes: &[u8]) -> usize {
    let needle = b"/Type /Page";
    bytes
        .windows(needle.len() + 1)
        .filter(|w| w.starts_with(needle) && w[needle.len()] != b's')
        .count()
}

/// Output path under tests/output/, for looking at renders by hand.
pub fn output_path(name: &str) -> PathBuf {
    let dir = PathBuf::from("tests/output");
    fs::create_dir_all(&dir).ok();
    dir.join(format!("{name}.pdf"))
}

pub fn timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

pub fn log_csv(csv_name: &str, header: &str, row: &str) {
    let csv_path = PathBuf::from("tests/output").join(csv_name);
    fs::create_dir_all("tests/output").ok();
    let write_header = !csv_path.exists();
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&csv_path)
        .expect("Cannot open CSV file");
    if write_header {
        writeln!(file, "{header}").unwrap();
    }
    writeln!(file, "{row}").unwrap();
}

/// Rasterizer that succeeds with a fixed small PNG and counts its calls.
#[derive(Clone, Default)]
pub struct CountingRasterizer {
    pub calls: Arc<AtomicUsize>,
}

impl CountingRasterizer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MathRasterizer for CountingRasterizer {
    fn rasterize(
        &self,
        _expr: &str,
        _is_block: bool,
        _font_size: f32,
        _timeout: Duration,
    ) -> Result<RasterImage, RasterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(RasterImage {
            png: png_bytes(40, 12, [0, 0, 0]),
            width: 20.0,
            height: 6.0,
        })
    }
}

/// Rasterizer that always fails the way a broken backend would.
pub struct FailingRasterizer;

impl MathRasterizer for FailingRasterizer {
    fn rasterize(
        &self,
        expr: &str,
        _is_block: bool,
        _font_size: f32,
        _timeout: Duration,
    ) -> Result<RasterImage, RasterError> {
        Err(RasterError::Unsupported(format!("cannot typeset {expr}")))
    }
}

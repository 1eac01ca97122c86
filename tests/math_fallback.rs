mod common;

use std::time::{Duration, Instant};

use common::{CountingRasterizer, FailingRasterizer};
use exampaper_pdf::{
    CachedRasterizer, CommandRasterizer, MathPayload, MathRasterizer, MathRenderer, NoRasterizer,
    RasterError, TextMeasure, to_unicode,
};

/// Every character is 0.6 of the font size wide.
struct Monospace;

impl TextMeasure for Monospace {
    fn text_width(&self, text: &str, font_size: f32) -> f32 {
        text.chars().count() as f32 * font_size * 0.6
    }

    fn line_height(&self, font_size: f32) -> f32 {
        font_size * 1.25
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

#[test]
fn greek_and_scripts() {
    assert_eq!(to_unicode("\\alpha + \\beta"), "α + β");
    assert_eq!(to_unicode("x^2 + y_1"), "x² + y₁");
    assert_eq!(to_unicode("90^\\circ"), "90°");
    assert_eq!(to_unicode("-1"), "−1");
}

#[test]
fn structures_flatten_to_text() {
    assert_eq!(to_unicode("\\frac{a+b}{2}"), "(a+b)/2");
    assert_eq!(to_unicode("\\sqrt{x}"), "√x");
    assert_eq!(to_unicode("\\sqrt[3]{8}"), "∛8");
    assert_eq!(to_unicode("\\mathbb{R}"), "ℝ");
}

#[test]
fn operators_and_unknown_commands() {
    assert_eq!(to_unicode("\\sin x"), "sin x");
    assert_eq!(to_unicode("a \\leq b"), "a ≤ b");
    assert_eq!(to_unicode("\\unknowncmd{x}"), "x");
}

#[test]
fn failing_backend_still_renders_text() {
    let m = MathRenderer::new(&FailingRasterizer, &Monospace, 10.0, Duration::from_secs(1));
    let out = m.render("\\alpha^2", false, 500.0);
    assert!(matches!(out.degraded, Some(RasterError::Unsupported(_))));
    assert_eq!(out.rendered.payload, MathPayload::Text("α²".into()));
    assert_eq!(out.rendered.font_size, 10.0);
    assert!((out.rendered.width - 12.0).abs() < 1e-4);
    assert!((out.rendered.height - 12.5).abs() < 1e-4);
}

#[test]
fn text_fallback_never_exceeds_width() {
    let m = MathRenderer::new(&NoRasterizer, &Monospace, 12.0, Duration::from_secs(1));
    let long = "a+b+c+d+e+f+g+h+i+j+k+l+m+n+o+p+q+r+s+t+u+v+w";
    for max in [30.0, 80.0, 200.0, 1000.0] {
        let out = m.render(long, true, max);
        assert!(out.rendered.width <= max + 1e-3, "{} > {max}", out.rendered.width);
        assert!(out.rendered.font_size <= 12.0);
        assert!(out.rendered.font_size > 0.0);
    }
}

#[test]
fn successful_backend_is_not_degraded() {
    let counting = CountingRasterizer::default();
    let m = MathRenderer::new(&counting, &Monospace, 10.0, Duration::from_secs(1));
    let out = m.render("x", false, 100.0);
    assert!(out.degraded.is_none());
    assert!(out.rendered.is_image());
    assert_eq!((out.rendered.width, out.rendered.height), (20.0, 6.0));
    assert_eq!(counting.calls(), 1);
}

#[test]
fn render_text_skips_the_backend() {
    let counting = CountingRasterizer::default();
    let m = MathRenderer::new(&counting, &Monospace, 10.0, Duration::from_secs(1));
    let out = m.render_text("\\pi", false, 100.0);
    assert_eq!(out.payload, MathPayload::Text("π".into()));
    assert_eq!(counting.calls(), 0);
}

#[test]
fn cache_calls_backend_once_per_expression() {
    let counting = CountingRasterizer::default();
    let cached = CachedRasterizer::new(&counting);
    let timeout = Duration::from_secs(1);
    for _ in 0..5 {
        cached.rasterize("2+2=?", false, 10.0, timeout).unwrap();
    }
    cached.rasterize("2+2=?", true, 10.0, timeout).unwrap();
    assert_eq!(counting.calls(), 2);
    assert_eq!(cached.len(), 2);
}

#[test]
fn cache_remembers_failures() {
    let cached = CachedRasterizer::new(&FailingRasterizer);
    let timeout = Duration::from_secs(1);
    let first = cached.rasterize("x", false, 10.0, timeout);
    let second = cached.rasterize("x", false, 10.0, timeout);
    assert!(first.is_err());
    assert_eq!(first, second);
    assert_eq!(cached.len(), 1);
}

#[cfg(unix)]
#[test]
fn slow_command_times_out() {
    let cmd = CommandRasterizer::new(&argv(&["sh", "-c", "sleep 5"]), 96.0).unwrap();
    let started = Instant::now();
    let result = cmd.rasterize("x", false, 10.0, Duration::from_millis(200));
    assert!(matches!(result, Err(RasterError::Timeout(_))));
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[cfg(unix)]
#[test]
fn background_child_holding_stdout_times_out() {
    // The shell exits at once but its background job keeps stdout open.
    let cmd = CommandRasterizer::new(&argv(&["sh", "-c", "sleep 9 & echo hi"]), 96.0).unwrap();
    let started = Instant::now();
    let result = cmd.rasterize("x", false, 10.0, Duration::from_millis(300));
    assert!(matches!(result, Err(RasterError::Timeout(_))), "{result:?}");
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[cfg(unix)]
#[test]
fn timed_out_span_falls_back_to_text() {
    let cmd = CommandRasterizer::new(&argv(&["sh", "-c", "sleep 5"]), 96.0).unwrap();
    let m = MathRenderer::new(&cmd, &Monospace, 10.0, Duration::from_millis(100));
    let out = m.render("\\beta", false, 100.0);
    assert!(matches!(out.degraded, Some(RasterError::Timeout(_))));
    assert_eq!(out.rendered.payload, MathPayload::Text("β".into()));
}

#[cfg(unix)]
#[test]
fn non_image_output_is_unsupported() {
    // `cat` echoes the expression back, which is not an image.
    let cmd = CommandRasterizer::new(&argv(&["cat"]), 96.0).unwrap();
    let result = cmd.rasterize("x^2", false, 10.0, Duration::from_secs(5));
    assert!(matches!(result, Err(RasterError::Unsupported(_))));
}

#[cfg(unix)]
#[test]
fn failing_command_reports_failure() {
    let cmd = CommandRasterizer::new(&argv(&["sh", "-c", "echo broken >&2; exit 3"]), 96.0).unwrap();
    let result = cmd.rasterize("x", false, 10.0, Duration::from_secs(5));
    match result {
        Err(RasterError::Failed(msg)) => assert!(msg.contains("broken"), "{msg}"),
        other => panic!("expected a failure, got {other:?}"),
    }
}

#[test]
fn missing_program_reports_failure() {
    let cmd = CommandRasterizer::new(&argv(&["exampaper-no-such-rasterizer"]), 96.0).unwrap();
    let result = cmd.rasterize("x", false, 10.0, Duration::from_secs(1));
    assert!(matches!(result, Err(RasterError::Failed(_))));
}

#[cfg(unix)]
#[test]
fn png_output_is_sized_by_dpi() {
    let path = std::env::temp_dir().join(format!(
        "exampaper-raster-{}-{}.png",
        std::process::id(),
        common::timestamp()
    ));
    std::fs::write(&path, common::png_bytes(192, 48, [0, 0, 0])).unwrap();

    let cmd = CommandRasterizer::new(&argv(&["cat", path.to_str().unwrap()]), 192.0).unwrap();
    let img = cmd
        .rasterize("x", true, 10.0, Duration::from_secs(5))
        .unwrap();
    std::fs::remove_file(&path).ok();

    assert!((img.width - 72.0).abs() < 1e-3);
    assert!((img.height - 18.0).abs() < 1e-3);
}

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use exampaper_pdf::{RenderOptions, Renderer};

/// Render an exam question set (JSON) into a two-column PDF paper
#[derive(Parser, Debug)]
#[command(name = "exampaper-pdf")]
#[command(version, about, long_about = None)]
struct Args {
    /// Request JSON file
    input: PathBuf,

    /// Output PDF (defaults to the input path with a .pdf extension)
    output: Option<PathBuf>,

    /// External LaTeX rasterizer; reads the formula on stdin, writes PNG or SVG
    #[arg(long, value_name = "CMD")]
    math_command: Option<String>,

    /// Per-formula rasterizer timeout
    #[arg(long, value_name = "MS")]
    math_timeout_ms: Option<u64>,

    /// Font family candidates, `;`-separated
    #[arg(long, value_name = "FAMILY")]
    font: Option<String>,

    /// Base font size in points
    #[arg(long, value_name = "PT")]
    font_size: Option<f32>,

    /// Print solutions even if the request does not ask for them
    #[arg(long)]
    with_solutions: bool,

    /// Print hints even if the request does not ask for them
    #[arg(long)]
    with_hints: bool,

    /// Print the answer line even if the request does not ask for it
    #[arg(long)]
    include_answers: bool,

    /// Log render phases and degradations
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let level = if args.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut options = RenderOptions::from_env();
    if let Some(cmd) = &args.math_command {
        let argv: Vec<String> = cmd.split_whitespace().map(str::to_string).collect();
        options.math.command = (!argv.is_empty()).then_some(argv);
    }
    if let Some(ms) = args.math_timeout_ms {
        options.math.timeout = Duration::from_millis(ms);
    }
    if let Some(font) = args.font {
        options.typography.font_family = font;
    }
    if let Some(size) = args.font_size.filter(|s| *s > 0.0) {
        options.typography.font_size = size;
    }
    options.with_solutions = args.with_solutions.then_some(true);
    options.with_hints = args.with_hints.then_some(true);
    options.include_answers = args.include_answers.then_some(true);

    let output = args
        .output
        .unwrap_or_else(|| args.input.with_extension("pdf"));

    match Renderer::new(options).convert_file(&args.input, &output) {
        Ok(paper) => {
            println!(
                "{} -> {} ({} page(s), {} degraded)",
                args.input.display(),
                output.display(),
                paper.page_count,
                paper.degraded.len()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

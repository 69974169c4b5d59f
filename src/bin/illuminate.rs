//! CLI binary for illuminate.
//!
//! A thin shim over the library crate that maps CLI flags to `JobConfig`
//! and the collaborator settings, runs one job and prints the outcome.

use anyhow::{Context, Result};
use clap::Parser;
use illuminate::pipeline::assemble::LopdfAssembler;
use illuminate::pipeline::enhance::{CommandEnhancer, ResampleEnhancer, DEFAULT_SCALE};
use illuminate::pipeline::ocr::{default_extra_args, TesseractRecognizer};
use illuminate::pipeline::render::PdfiumRasterizer;
use illuminate::pipeline::translate::{resolve_provider, LlmTranslator};
use illuminate::{
    Enhancer, IlluminateError, JobConfig, JobProgressCallback, JobReport, JobState, Pipeline,
    ProgressCallback, Stage, UnitOutcome,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar, reset at the start of every stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Validating");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Scan => "Scanning",
        Stage::Enhance => "Enhancing",
        Stage::Transcribe => "Transcribing",
        Stage::Translate => "Translating",
        Stage::Reassemble => "Reassembling",
    }
}

impl JobProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold:>12}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_style(style);
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_prefix(stage_label(stage));
        self.bar.reset_eta();
        self.bar.reset_elapsed();
    }

    fn on_unit(&self, stage: Stage, index: usize, outcome: UnitOutcome) {
        if outcome == UnitOutcome::Produced {
            self.bar.println(format!(
                "  {} {:<12} page {:>3}",
                green("✓"),
                stage.as_str(),
                index
            ));
        }
        self.bar.inc(1);
    }

    fn on_state(&self, state: JobState) {
        if state == JobState::Translating {
            self.bar.set_message("writing masters");
        }
    }

    fn on_job_complete(&self) {
        self.bar.finish_and_clear();
    }

    fn on_job_failed(&self, error: &IlluminateError) {
        self.bar.abandon();
        self.bar.println(format!("  {} {}", red("✗"), red(&error.to_string())));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Latin scan → English, everything in ./codex
  illuminate --pdf scans/codex.pdf --output codex

  # Tesseract with the Latin model and a separate working root
  illuminate --pdf codex.pdf --output codex --ocr-lang lat --working-root /tmp/ocr

  # External super-resolution binary instead of the built-in resampler
  illuminate --pdf codex.pdf --output codex --enhancer-command realesrgan-ncnn-vulkan

  # JSON job report
  illuminate --pdf codex.pdf --output codex --json > report.json

RESUMING:
  Every page artifact is written under a staging name and renamed when
  complete. Interrupt a job at any time and rerun the same command to
  continue from the first missing page.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
"#;

/// Recover degraded scanned PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "illuminate",
    version,
    about = "Recover degraded scanned PDFs: enhance, transcribe, translate, reassemble",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Source PDF.
    #[arg(long, env = "ILLUMINATE_PDF")]
    pdf: PathBuf,

    /// Output root for enhanced pages, transcripts, masters and the new PDF.
    #[arg(short, long, env = "ILLUMINATE_OUTPUT")]
    output: PathBuf,

    /// Directory the OCR engine writes into (default: the raw page directory).
    #[arg(long, env = "ILLUMINATE_WORKING_ROOT")]
    working_root: Option<PathBuf>,

    /// Source language tag.
    #[arg(long, env = "ILLUMINATE_SOURCE_LANG", default_value = "la")]
    source_lang: String,

    /// Target language tag.
    #[arg(long, env = "ILLUMINATE_TARGET_LANG", default_value = "en")]
    target_lang: String,

    /// Tesseract executable.
    #[arg(long, env = "ILLUMINATE_OCR_PROGRAM", default_value = "tesseract")]
    ocr_program: PathBuf,

    /// Tesseract language model (e.g. lat, eng+lat).
    #[arg(long, env = "ILLUMINATE_OCR_LANG")]
    ocr_lang: Option<String>,

    /// Extra tesseract argument; repeat for several. Replaces the defaults.
    #[arg(long = "ocr-arg", allow_hyphen_values = true)]
    ocr_args: Vec<String>,

    /// External super-resolution program taking `-i IN -o OUT -s SCALE`.
    #[arg(long, env = "ILLUMINATE_ENHANCER")]
    enhancer_command: Option<String>,

    /// Upscale factor (1–8).
    #[arg(long, env = "ILLUMINATE_SCALE", default_value_t = DEFAULT_SCALE,
          value_parser = clap::value_parser!(u32).range(1..=8))]
    scale: u32,

    /// Longest edge of a rendered page, in pixels.
    #[arg(long, env = "ILLUMINATE_MAX_PIXELS", default_value_t = 2000)]
    max_rendered_pixels: u32,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "ILLUMINATE_PASSWORD")]
    password: Option<String>,

    /// Layout DPI of the reassembled PDF.
    #[arg(long, env = "ILLUMINATE_ASSEMBLE_DPI", default_value_t = 300)]
    assemble_dpi: u32,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "ILLUMINATE_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max LLM output tokens per page.
    #[arg(long, env = "ILLUMINATE_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Print the job report as JSON on stdout.
    #[arg(long, env = "ILLUMINATE_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "ILLUMINATE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "ILLUMINATE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "ILLUMINATE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO lines unless -v is given.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;
    let pipeline = build_pipeline(&cli)?;

    let pipeline = if show_progress {
        pipeline.with_progress(CliProgressCallback::new() as ProgressCallback)
    } else {
        pipeline
    };

    // Ctrl-C stops the job before its next page; finished pages are kept.
    let cancel = pipeline.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", cyan("Interrupted, stopping after the current page…"));
            cancel.cancel();
        }
    });

    let report = Arc::new(pipeline)
        .start(config)
        .await
        .context("Job task failed")?
        .context("Job failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&report);
    }

    Ok(())
}

fn build_config(cli: &Cli) -> Result<JobConfig> {
    let mut builder = JobConfig::builder()
        .source_path(&cli.pdf)
        .output_root(&cli.output)
        .source_language(&cli.source_lang)
        .target_language(&cli.target_lang);
    if let Some(ref root) = cli.working_root {
        builder = builder.working_root(root);
    }
    builder.build().context("Invalid configuration")
}

fn build_pipeline(cli: &Cli) -> Result<Pipeline> {
    // Resolve the provider first so a missing API key fails before any
    // page is rendered.
    let provider = resolve_provider(cli.provider.as_deref(), cli.model.as_deref())
        .context("Failed to configure the translation provider")?;
    let translator = LlmTranslator::new(provider)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens);

    let mut rasterizer = PdfiumRasterizer::new(cli.max_rendered_pixels);
    if let Some(ref password) = cli.password {
        rasterizer = rasterizer.with_password(password);
    }

    let enhancer: Arc<dyn Enhancer> = match cli.enhancer_command {
        Some(ref program) => Arc::new(CommandEnhancer::new(program, cli.scale)),
        None => Arc::new(ResampleEnhancer::new(cli.scale)),
    };

    let ocr_args = if cli.ocr_args.is_empty() {
        default_extra_args()
    } else {
        cli.ocr_args.clone()
    };
    let mut recognizer = TesseractRecognizer::new(&cli.ocr_program).extra_args(ocr_args);
    if let Some(ref lang) = cli.ocr_lang {
        recognizer = recognizer.language(lang);
    }

    Ok(Pipeline::new(
        Arc::new(rasterizer),
        enhancer,
        Arc::new(recognizer),
        Arc::new(translator),
        Arc::new(LopdfAssembler::new(cli.assemble_dpi)),
    ))
}

fn print_summary(report: &JobReport) {
    eprintln!(
        "{} {} pages  {} unit(s) produced  {}ms",
        green("✔"),
        bold(&report.total_pages.to_string()),
        report.delegate_calls(),
        report.duration_ms
    );
    if !report.masters.blank_pages.is_empty() {
        eprintln!(
            "   {}",
            dim(&format!("blank pages: {:?}", report.masters.blank_pages))
        );
    }
    eprintln!("   original   {}", report.original_master.display());
    eprintln!("   translated {}", report.translated_master.display());
    eprintln!("   document   {}", bold(&report.document.display().to_string()));
}

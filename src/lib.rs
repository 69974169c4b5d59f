//! # illuminate
//!
//! Recover degraded scanned PDFs as a resumable, checkpointed job.
//!
//! A job takes one scanned document through five stages. Every stage writes
//! one artifact per page into a known directory, and the presence of that
//! artifact is the only record that the page is done. Killing the process at
//! any point and starting the same job again skips everything already on disk
//! and carries on from the first missing page.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Scan        rasterise pages via pdfium (spawn_blocking)
//!  ├─ 2. Enhance     super-resolution upscale into the output root
//!  ├─ 3. Transcribe  tesseract into the working root, then relocate
//!  ├─ 4. Translate   per-page LLM translation + master transcripts
//!  └─ 5. Reassemble  enhanced pages packed into a new PDF
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use illuminate::pipeline::{
//!     assemble::LopdfAssembler, enhance::ResampleEnhancer, ocr::TesseractRecognizer,
//!     render::PdfiumRasterizer, translate::{resolve_provider, LlmTranslator},
//! };
//! use illuminate::{AtomicProgress, JobConfig, Pipeline};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = JobConfig::builder()
//!         .source_path("scans/codex.pdf")
//!         .output_root("recovered/codex")
//!         .source_language("la")
//!         .target_language("en")
//!         .build()?;
//!
//!     let progress = Arc::new(AtomicProgress::new());
//!     let pipeline = Pipeline::new(
//!         Arc::new(PdfiumRasterizer::default()),
//!         Arc::new(ResampleEnhancer::default()),
//!         Arc::new(TesseractRecognizer::default().language("lat")),
//!         Arc::new(LlmTranslator::new(resolve_provider(None, None)?)),
//!         Arc::new(LopdfAssembler::default()),
//!     )
//!     .with_progress(progress.clone());
//!
//!     let report = pipeline.run(&config).await?;
//!     eprintln!(
//!         "{} pages, masters at {}",
//!         report.total_pages,
//!         report.translated_master.display()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `illuminate` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! illuminate = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cache;
pub mod config;
pub mod encoding;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stage;
pub mod transcript;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cache::ArtifactNaming;
pub use config::{JobConfig, JobConfigBuilder};
pub use error::{BoxError, IlluminateError};
pub use job::{Job, JobLayout, JobState, Stage};
pub use orchestrator::{JobReport, Pipeline};
pub use pipeline::{DocumentAssembler, Enhancer, Rasterizer, Recognizer, Translator};
pub use progress::{
    percent, AtomicProgress, CancelFlag, JobProgressCallback, NoopProgressCallback,
    ProgressCallback, UnitOutcome,
};
pub use stage::{StageReport, StageRunner};
pub use transcript::{MasterReport, RelocationReport, TranscriptIndex};

//! Job orchestration.
//!
//! [`Pipeline`] drives one job through
//! `Validating → Scanning → Enhancing → Transcribing → Translating →
//! Reassembling → Done`. Each state runs a single [`StageRunner`] and then
//! checks its barrier: every page must have an artifact before the next
//! state starts. Any error moves the job to `Failed` and is returned as is;
//! artifacts written so far stay on disk, so calling [`Pipeline::run`] again
//! with the same configuration resumes where the last run stopped.
//!
//! # Example
//!
//! ```rust,no_run
//! use illuminate::pipeline::{
//!     assemble::LopdfAssembler, enhance::ResampleEnhancer, ocr::TesseractRecognizer,
//!     render::PdfiumRasterizer, translate::{resolve_provider, LlmTranslator},
//! };
//! use illuminate::{JobConfig, Pipeline};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = JobConfig::builder()
//!     .source_path("scans/codex.pdf")
//!     .output_root("recovered/codex")
//!     .build()?;
//! let provider = resolve_provider(None, None)?;
//! let pipeline = Pipeline::new(
//!     Arc::new(PdfiumRasterizer::default()),
//!     Arc::new(ResampleEnhancer::default()),
//!     Arc::new(TesseractRecognizer::default()),
//!     Arc::new(LlmTranslator::new(provider)),
//!     Arc::new(LopdfAssembler::default()),
//! );
//! let report = pipeline.run(&config).await?;
//! println!("{} pages", report.total_pages);
//! # Ok(())
//! # }
//! ```

use crate::cache::{self, ArtifactNaming};
use crate::config::JobConfig;
use crate::error::{BoxError, IlluminateError};
use crate::job::{Job, JobLayout, JobState, Stage};
use crate::pipeline::{input, DocumentAssembler, Enhancer, Rasterizer, Recognizer, Translator};
use crate::progress::{
    AtomicProgress, CancelFlag, JobProgressCallback, NoopProgressCallback, ProgressCallback,
    UnitOutcome,
};
use crate::stage::{attach_unit, StageReport, StageRunner};
use crate::transcript::{self, MasterPaths, MasterReport, RelocationReport, TranscriptIndex};
use image::ImageFormat;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Summary of a finished job.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobReport {
    pub source: PathBuf,
    pub total_pages: usize,
    pub stages: Vec<StageReport>,
    pub relocation: RelocationReport,
    pub masters: MasterReport,
    pub original_master: PathBuf,
    pub translated_master: PathBuf,
    pub document: PathBuf,
    pub duration_ms: u64,
}

impl JobReport {
    fn new(layout: &JobLayout) -> Self {
        Self {
            source: layout.source.clone(),
            original_master: layout.original_master(),
            translated_master: layout.translated_master(),
            document: layout.final_document(),
            ..Default::default()
        }
    }

    /// Report of one stage, if it ran.
    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|r| r.stage == Some(stage))
    }

    /// Total collaborator calls across all stages.
    pub fn delegate_calls(&self) -> usize {
        self.stages.iter().map(StageReport::delegate_calls).sum()
    }
}

/// The five collaborators plus the progress sink and cancel flag of a job.
pub struct Pipeline {
    rasterizer: Arc<dyn Rasterizer>,
    enhancer: Arc<dyn Enhancer>,
    recognizer: Arc<dyn Recognizer>,
    translator: Arc<dyn Translator>,
    assembler: Arc<dyn DocumentAssembler>,
    progress: ProgressCallback,
    cancel: CancelFlag,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(
        rasterizer: Arc<dyn Rasterizer>,
        enhancer: Arc<dyn Enhancer>,
        recognizer: Arc<dyn Recognizer>,
        translator: Arc<dyn Translator>,
        assembler: Arc<dyn DocumentAssembler>,
    ) -> Self {
        Self {
            rasterizer,
            enhancer,
            recognizer,
            translator,
            assembler,
            progress: Arc::new(NoopProgressCallback),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle that stops the job before its next unit.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Spawn the job on the current tokio runtime.
    ///
    /// The handle resolves once the job reaches `Done` or `Failed`.
    pub fn start(
        self: Arc<Self>,
        config: JobConfig,
    ) -> JoinHandle<Result<JobReport, IlluminateError>> {
        tokio::spawn(async move { self.run(&config).await })
    }

    /// Blocking wrapper around [`Pipeline::run`].
    pub fn run_sync(&self, config: &JobConfig) -> Result<JobReport, IlluminateError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| IlluminateError::Internal(format!("Failed to create runtime: {e}")))?
            .block_on(self.run(config))
    }

    /// Run the job to completion or first failure.
    pub async fn run(&self, config: &JobConfig) -> Result<JobReport, IlluminateError> {
        let start = Instant::now();
        let mut job = Job::new(JobLayout::new(config));
        info!("Starting job for {}", job.layout.source.display());

        match self.drive(config, &mut job).await {
            Ok(mut report) => {
                self.advance(&mut job);
                report.duration_ms = start.elapsed().as_millis() as u64;
                info!(
                    "Job complete: {} pages, {} unit(s) produced, {}ms",
                    report.total_pages,
                    report.delegate_calls(),
                    report.duration_ms
                );
                self.progress.on_job_complete();
                Ok(report)
            }
            Err(e) => {
                let failed_in = job.state;
                self.enter(&mut job, JobState::Failed);
                error!(
                    "Job failed while {} at {:.0}%: {}",
                    failed_in,
                    job.progress.percent(),
                    e
                );
                self.progress.on_job_failed(&e);
                Err(e)
            }
        }
    }

    async fn drive(&self, config: &JobConfig, job: &mut Job) -> Result<JobReport, IlluminateError> {
        let mut report = JobReport::new(&job.layout);

        // ── Validating ───────────────────────────────────────────────────
        self.enter(job, JobState::Validating);
        input::validate_source(&job.layout.source)?;
        check_distinct_roots(&job.layout)?;
        let source = job.layout.source.clone();
        let rasterizer = Arc::clone(&self.rasterizer);
        job.total_pages = blocking(move || rasterizer.page_count(&source))
            .await
            .map_err(|e| attach_unit(Stage::Scan, None, e))?;
        report.total_pages = job.total_pages;
        info!("Source has {} pages", job.total_pages);

        // ── Scanning ─────────────────────────────────────────────────────
        self.advance(job);
        report.stages.push(self.scan(job).await?);

        // ── Enhancing ────────────────────────────────────────────────────
        self.advance(job);
        report.stages.push(self.enhance(job).await?);

        // ── Transcribing ─────────────────────────────────────────────────
        self.advance(job);
        let (stage, relocation) = self.transcribe(job).await?;
        report.stages.push(stage);
        report.relocation = relocation;

        // ── Translating ──────────────────────────────────────────────────
        self.advance(job);
        let (stage, masters) = self.translate(config, job).await?;
        report.stages.push(stage);
        report.masters = masters;

        // ── Reassembling ─────────────────────────────────────────────────
        self.advance(job);
        report.stages.push(self.reassemble(job).await?);

        Ok(report)
    }

    fn enter(&self, job: &mut Job, state: JobState) {
        debug!("Job state: {} → {}", job.state, state);
        job.state = state;
        self.progress.on_state(state);
    }

    /// Move to the state that follows a successful pass through the current one.
    fn advance(&self, job: &mut Job) {
        let next = job.state.next();
        self.enter(job, next);
    }

    fn tracked<'a>(&'a self, job: &'a Job) -> Tracked<'a> {
        Tracked {
            job: &job.progress,
            sink: self.progress.as_ref(),
        }
    }

    fn runner<'a>(
        &'a self,
        job: &Job,
        stage: Stage,
        dir: PathBuf,
        progress: &'a Tracked<'a>,
    ) -> StageRunner<'a> {
        StageRunner::new(stage, dir, job.layout.naming(stage), progress).with_cancel(&self.cancel)
    }

    async fn scan(&self, job: &Job) -> Result<StageReport, IlluminateError> {
        let layout = &job.layout;
        let naming = layout.naming(Stage::Scan);
        let tracked = self.tracked(job);
        let dir = layout.stage_dir(Stage::Scan);
        let runner = self.runner(job, Stage::Scan, dir, &tracked);
        let done = cache::completed(runner.dir(), &naming)?;
        debug!("scan: {} of {} pages cached", done.len(), job.total_pages);

        let report = runner
            .run(job.total_pages, &done, |i, staging| {
                let rasterizer = Arc::clone(&self.rasterizer);
                let source = layout.source.clone();
                blocking(move || {
                    let page = rasterizer.rasterize(&source, i)?;
                    page.save_with_format(&staging, ImageFormat::Png)?;
                    Ok(())
                })
            })
            .await?;

        let finished = cache::completed(runner.dir(), &naming)?;
        barrier(Stage::Scan, &finished, job.total_pages)?;
        Ok(report)
    }

    async fn enhance(&self, job: &Job) -> Result<StageReport, IlluminateError> {
        let layout = &job.layout;
        let naming = layout.naming(Stage::Enhance);
        let tracked = self.tracked(job);
        let dir = layout.stage_dir(Stage::Enhance);
        let runner = self.runner(job, Stage::Enhance, dir, &tracked);
        let done = cache::completed(runner.dir(), &naming)?;
        debug!("enhance: {} of {} pages cached", done.len(), job.total_pages);

        let report = runner
            .run(job.total_pages, &done, |i, staging| {
                let enhancer = Arc::clone(&self.enhancer);
                let raw = layout.raw_dir.join(ArtifactNaming::PageImage.file_name(i));
                blocking(move || enhancer.enhance(&raw, &staging))
            })
            .await?;

        let finished = cache::completed(runner.dir(), &naming)?;
        barrier(Stage::Enhance, &finished, job.total_pages)?;
        Ok(report)
    }

    async fn transcribe(
        &self,
        job: &Job,
    ) -> Result<(StageReport, RelocationReport), IlluminateError> {
        let layout = &job.layout;
        let working = layout.working_transcripts();
        let output = layout.output_transcripts();
        let tracked = self.tracked(job);
        let runner = self.runner(job, Stage::Transcribe, working.clone(), &tracked);
        let done = TranscriptIndex::scan(&working, &output)?.completed();
        debug!("transcribe: {} of {} pages cached", done.len(), job.total_pages);

        let report = runner
            .run(job.total_pages, &done, |i, staging| {
                let recognizer = Arc::clone(&self.recognizer);
                let image = layout.output_root.join(ArtifactNaming::PageImage.file_name(i));
                blocking(move || {
                    let stem = staging.with_extension("");
                    let written = recognizer.recognize(&image, &stem)?;
                    if written != staging {
                        std::fs::rename(&written, &staging)
                            .map_err(|e| IlluminateError::io(&written, e))?;
                    }
                    Ok(())
                })
            })
            .await?;

        let relocation = transcript::relocate(&working, &output)?;
        let index = TranscriptIndex::scan(&working, &output)?;
        barrier(Stage::Transcribe, &index.completed(), job.total_pages)?;
        Ok((report, relocation))
    }

    async fn translate(
        &self,
        config: &JobConfig,
        job: &Job,
    ) -> Result<(StageReport, MasterReport), IlluminateError> {
        let layout = &job.layout;
        let naming = layout.naming(Stage::Translate);
        let index =
            TranscriptIndex::scan(&layout.working_transcripts(), &layout.output_transcripts())?;
        let tracked = self.tracked(job);
        let dir = layout.stage_dir(Stage::Translate);
        let runner = self.runner(job, Stage::Translate, dir, &tracked);
        let done = cache::completed(runner.dir(), &naming)?;
        debug!("translate: {} of {} pages cached", done.len(), job.total_pages);

        let report = runner
            .run(job.total_pages, &done, |i, staging| {
                let translator = Arc::clone(&self.translator);
                let transcript_path = index.path(i).map(Path::to_path_buf);
                let source_language = config.source_language.clone();
                let target_language = config.target_language.clone();
                async move {
                    let transcript_path =
                        transcript_path.ok_or_else(|| IlluminateError::MissingArtifact {
                            stage: Stage::Transcribe,
                            page: i,
                            path: layout
                                .output_transcripts()
                                .join(ArtifactNaming::IndexedText.file_name(i)),
                        })?;
                    transcript::translate_transcript(
                        translator.as_ref(),
                        i,
                        &transcript_path,
                        &staging,
                        &source_language,
                        &target_language,
                    )
                    .await
                }
            })
            .await?;

        let finished = cache::completed(runner.dir(), &naming)?;
        barrier(Stage::Translate, &finished, job.total_pages)?;

        let original_master = layout.original_master();
        let translated_master = layout.translated_master();
        let translations = runner.dir().to_path_buf();
        let masters = transcript::merge_masters(
            &index,
            job.total_pages,
            &config.page_separator,
            &MasterPaths {
                translations_dir: &translations,
                original_master: &original_master,
                translated_master: &translated_master,
            },
        )?;
        Ok((report, masters))
    }

    async fn reassemble(&self, job: &Job) -> Result<StageReport, IlluminateError> {
        let layout = &job.layout;
        let naming = layout.naming(Stage::Reassemble);
        let tracked = self.tracked(job);
        let dir = layout.stage_dir(Stage::Reassemble);
        let runner = self.runner(job, Stage::Reassemble, dir, &tracked);
        let done = cache::completed(runner.dir(), &naming)?;

        let images: Vec<PathBuf> = job
            .pages()
            .map(|i| layout.output_root.join(ArtifactNaming::PageImage.file_name(i)))
            .collect();
        let report = runner
            .run(1, &done, |_, staging| {
                let assembler = Arc::clone(&self.assembler);
                let images = images.clone();
                blocking(move || {
                    let bytes = assembler.assemble(&images)?;
                    std::fs::write(&staging, bytes)
                        .map_err(|e| IlluminateError::io(&staging, e))?;
                    Ok(())
                })
            })
            .await?;

        let finished = cache::completed(runner.dir(), &naming)?;
        barrier(Stage::Reassemble, &finished, 1)?;
        info!("Reassembled document: {}", layout.final_document().display());
        Ok(report)
    }
}

/// Forwards runner events to the caller's sink and to the job's own tracker.
struct Tracked<'a> {
    job: &'a AtomicProgress,
    sink: &'a dyn JobProgressCallback,
}

impl JobProgressCallback for Tracked<'_> {
    fn on_stage_start(&self, stage: Stage, total: usize) {
        self.job.on_stage_start(stage, total);
        self.sink.on_stage_start(stage, total);
    }

    fn on_unit(&self, stage: Stage, index: usize, outcome: UnitOutcome) {
        self.sink.on_unit(stage, index, outcome);
    }

    fn on_progress(&self, stage: Stage, percent: f64) {
        self.job.on_progress(stage, percent);
        self.sink.on_progress(stage, percent);
    }
}

/// Enhanced pages share the raw pages' naming, so the output root must not
/// resolve to the raw page directory under any spelling.
fn check_distinct_roots(layout: &JobLayout) -> Result<(), IlluminateError> {
    if transcript::same_dir(&layout.raw_dir, &layout.output_root) {
        return Err(IlluminateError::InvalidConfig(format!(
            "output root '{}' resolves to the raw page directory '{}'",
            layout.output_root.display(),
            layout.raw_dir.display()
        )));
    }
    Ok(())
}

/// Run a blocking collaborator call on the blocking thread pool.
async fn blocking<T, F>(f: F) -> Result<T, BoxError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, BoxError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) => Err(Box::new(IlluminateError::Internal(format!(
            "Blocking task panicked: {e}"
        )))),
    }
}

fn barrier(stage: Stage, done: &BTreeSet<usize>, total: usize) -> Result<(), IlluminateError> {
    let missing = cache::missing(done, total);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(IlluminateError::IncompleteStage { stage, missing })
    }
}

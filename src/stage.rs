//! Generic stage runner.
//!
//! A stage walks page indices in ascending order, one unit at a time. Units
//! already present in the stage's cache set are skipped; every other unit is
//! handed to a delegate that writes its artifact to a staging path. The
//! runner then renames the staging file to the final artifact name, so the
//! [`crate::cache`] resolver only ever sees complete artifacts.
//!
//! The first delegate failure stops the stage. Earlier artifacts are already
//! in place, which is what makes a rerun resume rather than restart.

use crate::cache::ArtifactNaming;
use crate::error::{BoxError, IlluminateError};
use crate::job::Stage;
use crate::progress::{percent, CancelFlag, JobProgressCallback, UnitOutcome};
use serde::Serialize;
use std::collections::BTreeSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What a stage run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: Option<Stage>,
    pub produced: Vec<usize>,
    pub skipped: Vec<usize>,
}

impl StageReport {
    /// Number of delegate calls made.
    pub fn delegate_calls(&self) -> usize {
        self.produced.len()
    }
}

/// Runs one stage over the page units of a job.
pub struct StageRunner<'a> {
    stage: Stage,
    dir: PathBuf,
    naming: ArtifactNaming,
    progress: &'a dyn JobProgressCallback,
    cancel: Option<&'a CancelFlag>,
}

impl<'a> StageRunner<'a> {
    pub fn new(
        stage: Stage,
        dir: impl Into<PathBuf>,
        naming: ArtifactNaming,
        progress: &'a dyn JobProgressCallback,
    ) -> Self {
        Self {
            stage,
            dir: dir.into(),
            naming,
            progress,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: &'a CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final path of the artifact for `index`.
    pub fn artifact_path(&self, index: usize) -> PathBuf {
        self.dir.join(self.naming.file_name(index))
    }

    /// Process units `0..total`, skipping those in `done`.
    ///
    /// `delegate(index, staging_path)` must leave the artifact at
    /// `staging_path` when it returns `Ok`.
    pub async fn run<F, Fut>(
        &self,
        total: usize,
        done: &BTreeSet<usize>,
        mut delegate: F,
    ) -> Result<StageReport, IlluminateError>
    where
        F: FnMut(usize, PathBuf) -> Fut,
        Fut: Future<Output = Result<(), BoxError>>,
    {
        let mut report = StageReport {
            stage: Some(self.stage),
            ..Default::default()
        };

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| IlluminateError::io(&self.dir, e))?;

        self.progress.on_stage_start(self.stage, total);
        self.progress.on_progress(self.stage, percent(0, total));

        for index in 0..total {
            if self.cancel.is_some_and(CancelFlag::is_cancelled) {
                return Err(IlluminateError::Cancelled {
                    stage: self.stage,
                    page: index,
                });
            }

            if done.contains(&index) {
                debug!("{}: page {} already done, skipping", self.stage, index);
                report.skipped.push(index);
                self.progress.on_unit(self.stage, index, UnitOutcome::Skipped);
            } else {
                self.produce(index, &mut delegate).await?;
                report.produced.push(index);
                self.progress.on_unit(self.stage, index, UnitOutcome::Produced);
            }

            self.progress
                .on_progress(self.stage, percent(index + 1, total));
        }

        info!(
            "{}: {} produced, {} skipped",
            self.stage,
            report.produced.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    async fn produce<F, Fut>(&self, index: usize, delegate: &mut F) -> Result<(), IlluminateError>
    where
        F: FnMut(usize, PathBuf) -> Fut,
        Fut: Future<Output = Result<(), BoxError>>,
    {
        let staging = self.dir.join(self.naming.staging_file_name(index));
        let target = self.artifact_path(index);

        // Left over from an interrupted run.
        if tokio::fs::try_exists(&staging).await.unwrap_or(false) {
            tokio::fs::remove_file(&staging)
                .await
                .map_err(|e| IlluminateError::io(&staging, e))?;
        }

        delegate(index, staging.clone())
            .await
            .map_err(|source| attach_unit(self.stage, Some(index), source))?;

        if !tokio::fs::try_exists(&staging).await.unwrap_or(false) {
            return Err(IlluminateError::MissingArtifact {
                stage: self.stage,
                page: index,
                path: target,
            });
        }

        tokio::fs::rename(&staging, &target)
            .await
            .map_err(|e| IlluminateError::io(&target, e))?;
        info!("{}: page {} → {}", self.stage, index, target.display());
        Ok(())
    }
}

/// Turn a delegate failure into a pipeline error.
///
/// Delegates may fail with a typed pipeline error (encoding, I/O), which is
/// kept as is; anything else is the collaborator's.
pub(crate) fn attach_unit(stage: Stage, page: Option<usize>, source: BoxError) -> IlluminateError {
    match source.downcast::<IlluminateError>() {
        Ok(e) => *e,
        Err(source) => IlluminateError::Collaborator {
            stage,
            page,
            source,
        },
    }
}

/// Write `bytes` to `path` through a temporary file in the same directory.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), IlluminateError> {
    use std::io::Write;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| IlluminateError::io(dir, e))?;
    let mut tmp = tempfile::Builder::new()
        .prefix(crate::cache::STAGING_PREFIX)
        .tempfile_in(dir)
        .map_err(|e| IlluminateError::io(dir, e))?;
    let tmp_path = tmp.path().to_path_buf();
    tmp.write_all(bytes)
        .map_err(|e| IlluminateError::io(tmp_path, e))?;
    tmp.persist(path)
        .map_err(|e| IlluminateError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::completed;
    use crate::progress::NoopProgressCallback;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        progress: Mutex<Vec<f64>>,
        units: Mutex<Vec<(usize, UnitOutcome)>>,
    }

    impl JobProgressCallback for Recorder {
        fn on_unit(&self, _stage: Stage, index: usize, outcome: UnitOutcome) {
            self.units.lock().unwrap().push((index, outcome));
        }

        fn on_progress(&self, _stage: Stage, percent: f64) {
            self.progress.lock().unwrap().push(percent);
        }
    }

    async fn write_text(path: PathBuf, text: String) -> Result<(), BoxError> {
        tokio::fs::write(path, text).await?;
        Ok(())
    }

    #[tokio::test]
    async fn resumes_from_first_missing_unit() {
        let tmp = TempDir::new().unwrap();
        for i in 0..3 {
            std::fs::write(tmp.path().join(format!("{i}.txt")), "done").unwrap();
        }
        let naming = ArtifactNaming::IndexedText;
        let done = completed(tmp.path(), &naming).unwrap();

        let recorder = Recorder::default();
        let runner = StageRunner::new(Stage::Transcribe, tmp.path(), naming.clone(), &recorder);
        let calls = Mutex::new(Vec::new());
        let report = runner
            .run(6, &done, |i, staging| {
                calls.lock().unwrap().push(i);
                write_text(staging, format!("page {i}"))
            })
            .await
            .unwrap();

        assert_eq!(*calls.lock().unwrap(), vec![3, 4, 5]);
        assert_eq!(report.skipped, vec![0, 1, 2]);
        assert_eq!(report.produced, vec![3, 4, 5]);
        assert_eq!(completed(tmp.path(), &naming).unwrap().len(), 6);
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("4.txt")).unwrap(),
            "page 4"
        );
        let units = recorder.units.lock().unwrap();
        assert_eq!(units[0], (0, UnitOutcome::Skipped));
        assert_eq!(units[5], (5, UnitOutcome::Produced));
    }

    #[tokio::test]
    async fn progress_is_monotonic_from_zero_to_hundred() {
        let tmp = TempDir::new().unwrap();
        let recorder = Recorder::default();
        let runner = StageRunner::new(
            Stage::Scan,
            tmp.path(),
            ArtifactNaming::IndexedText,
            &recorder,
        );
        runner
            .run(10, &BTreeSet::new(), |i, staging| {
                write_text(staging, i.to_string())
            })
            .await
            .unwrap();

        let values = recorder.progress.lock().unwrap();
        assert_eq!(values.len(), 11);
        assert_eq!(values[0], 0.0);
        assert_eq!(values[10], 100.0);
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn failure_stops_later_units() {
        let tmp = TempDir::new().unwrap();
        let runner = StageRunner::new(
            Stage::Enhance,
            tmp.path(),
            ArtifactNaming::IndexedText,
            &NoopProgressCallback,
        );
        let calls = Mutex::new(Vec::new());
        let err = runner
            .run(5, &BTreeSet::new(), |i, staging| {
                calls.lock().unwrap().push(i);
                async move {
                    if i == 2 {
                        return Err::<(), BoxError>("model failed to load".into());
                    }
                    tokio::fs::write(staging, "ok").await?;
                    Ok(())
                }
            })
            .await
            .unwrap_err();

        assert_eq!(*calls.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(err.stage(), Some(Stage::Enhance));
        assert_eq!(err.page(), Some(2));
        let done = completed(tmp.path(), &ArtifactNaming::IndexedText).unwrap();
        assert_eq!(done.into_iter().collect::<Vec<_>>(), vec![0, 1]);
        assert!(!tmp.path().join(".partial-2.txt").exists());
    }

    #[tokio::test]
    async fn typed_delegate_errors_pass_through() {
        let tmp = TempDir::new().unwrap();
        let runner = StageRunner::new(
            Stage::Translate,
            tmp.path(),
            ArtifactNaming::IndexedText,
            &NoopProgressCallback,
        );
        let err = runner
            .run(1, &BTreeSet::new(), |i, _| async move {
                Err::<(), BoxError>(Box::new(IlluminateError::Encoding {
                    page: i,
                    path: "0.txt".into(),
                    detail: "malformed".into(),
                }))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, IlluminateError::Encoding { page: 0, .. }));
    }

    #[test]
    fn atomic_write_replaces_content() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("master.txt");
        write_atomic(&target, b"first").unwrap();
        write_atomic(&target, b"second").unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"second");
        let leftovers = std::fs::read_dir(tmp.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn delegate_without_artifact_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let runner = StageRunner::new(
            Stage::Transcribe,
            tmp.path(),
            ArtifactNaming::IndexedText,
            &NoopProgressCallback,
        );
        let err = runner
            .run(1, &BTreeSet::new(), |_, _| async { Ok::<(), BoxError>(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, IlluminateError::MissingArtifact { page: 0, .. }));
    }

    #[tokio::test]
    async fn stale_staging_file_is_replaced() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(".partial-0.txt"), "truncated").unwrap();
        let runner = StageRunner::new(
            Stage::Transcribe,
            tmp.path(),
            ArtifactNaming::IndexedText,
            &NoopProgressCallback,
        );
        runner
            .run(1, &BTreeSet::new(), |_, staging| async move {
                // Appending proves the stale file was removed first.
                use tokio::io::AsyncWriteExt;
                let mut f = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(staging)
                    .await?;
                f.write_all(b"fresh").await?;
                Ok::<(), BoxError>(())
            })
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("0.txt")).unwrap(),
            "fresh"
        );
    }

    #[tokio::test]
    async fn cancellation_stops_before_next_unit() {
        let tmp = TempDir::new().unwrap();
        let cancel = CancelFlag::new();
        let runner = StageRunner::new(
            Stage::Scan,
            tmp.path(),
            ArtifactNaming::IndexedText,
            &NoopProgressCallback,
        )
        .with_cancel(&cancel);

        let err = runner
            .run(4, &BTreeSet::new(), |i, staging| {
                if i == 1 {
                    cancel.cancel();
                }
                write_text(staging, i.to_string())
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            IlluminateError::Cancelled {
                stage: Stage::Scan,
                page: 2
            }
        ));
        assert!(tmp.path().join("1.txt").exists());
        assert!(!tmp.path().join("2.txt").exists());
    }
}

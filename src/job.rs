//! Job model: stages, orchestrator states and the on-disk layout of one job.
//!
//! ## Layout
//!
//! ```text
//! <source dir>/<source stem>/page_<i>.png        raw pages (Scan)
//! <working root>/transcription/<i>.txt           engine output (Transcribe)
//! <output root>/page_<i>.png                     enhanced pages (Enhance)
//! <output root>/transcription/<i>.txt            relocated transcripts
//! <output root>/translation/<i>.txt              per-page translations (Translate)
//! <output root>/pdf_transcript_original.txt      original master
//! <output root>/pdf_transcript_translated.txt    translated master
//! <output root>/Illuminate - <source stem>.pdf   reassembled document
//! ```

use crate::cache::ArtifactNaming;
use crate::config::JobConfig;
use crate::progress::AtomicProgress;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Name of the transcript subfolder under both roots.
pub const TRANSCRIPTION_DIR: &str = "transcription";

/// Name of the per-page translation subfolder under the output root.
pub const TRANSLATION_DIR: &str = "translation";

/// One pipeline phase applying a single operation to every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Scan,
    Enhance,
    Transcribe,
    Translate,
    Reassemble,
}

impl Stage {
    /// Stages in execution order.
    pub const ALL: [Stage; 5] = [
        Stage::Scan,
        Stage::Enhance,
        Stage::Transcribe,
        Stage::Translate,
        Stage::Reassemble,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Scan => "scan",
            Stage::Enhance => "enhance",
            Stage::Transcribe => "transcribe",
            Stage::Translate => "translate",
            Stage::Reassemble => "reassemble",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Orchestrator state machine.
///
/// `Validating → Scanning → Enhancing → Transcribing → Translating →
/// Reassembling → Done`, with `Failed` reachable from every non-terminal
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Validating,
    Scanning,
    Enhancing,
    Transcribing,
    Translating,
    Reassembling,
    Done,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }

    /// The stage executed while in this state.
    pub fn stage(self) -> Option<Stage> {
        match self {
            JobState::Scanning => Some(Stage::Scan),
            JobState::Enhancing => Some(Stage::Enhance),
            JobState::Transcribing => Some(Stage::Transcribe),
            JobState::Translating => Some(Stage::Translate),
            JobState::Reassembling => Some(Stage::Reassemble),
            _ => None,
        }
    }

    /// The state that follows a successful pass through this one.
    pub fn next(self) -> JobState {
        match self {
            JobState::Validating => JobState::Scanning,
            JobState::Scanning => JobState::Enhancing,
            JobState::Enhancing => JobState::Transcribing,
            JobState::Transcribing => JobState::Translating,
            JobState::Translating => JobState::Reassembling,
            JobState::Reassembling => JobState::Done,
            JobState::Done => JobState::Done,
            JobState::Failed => JobState::Failed,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Validating => "validating",
            JobState::Scanning => "scanning",
            JobState::Enhancing => "enhancing",
            JobState::Transcribing => "transcribing",
            JobState::Translating => "translating",
            JobState::Reassembling => "reassembling",
            JobState::Done => "done",
            JobState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Resolved directories and file names for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobLayout {
    pub source: PathBuf,
    pub raw_dir: PathBuf,
    pub working_root: PathBuf,
    pub output_root: PathBuf,
    original_master_name: String,
    translated_master_name: String,
    document_name: String,
}

impl JobLayout {
    pub fn new(config: &JobConfig) -> Self {
        let raw_dir = raw_dir_for(&config.source_path);
        let working_root = config
            .working_root
            .clone()
            .unwrap_or_else(|| raw_dir.clone());
        let stem = config
            .source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());

        Self {
            source: config.source_path.clone(),
            raw_dir,
            working_root,
            output_root: config.output_root.clone(),
            original_master_name: config.original_master_name.clone(),
            translated_master_name: config.translated_master_name.clone(),
            document_name: format!("{}{}.pdf", config.document_prefix, stem),
        }
    }

    /// Destination directory of a stage's per-page artifacts.
    pub fn stage_dir(&self, stage: Stage) -> PathBuf {
        match stage {
            Stage::Scan => self.raw_dir.clone(),
            Stage::Enhance | Stage::Reassemble => self.output_root.clone(),
            Stage::Transcribe => self.working_transcripts(),
            Stage::Translate => self.translations(),
        }
    }

    /// Naming convention of a stage's artifacts.
    pub fn naming(&self, stage: Stage) -> ArtifactNaming {
        match stage {
            Stage::Scan | Stage::Enhance => ArtifactNaming::PageImage,
            Stage::Transcribe | Stage::Translate => ArtifactNaming::IndexedText,
            Stage::Reassemble => ArtifactNaming::Document(self.document_name.clone()),
        }
    }

    pub fn working_transcripts(&self) -> PathBuf {
        self.working_root.join(TRANSCRIPTION_DIR)
    }

    pub fn output_transcripts(&self) -> PathBuf {
        self.output_root.join(TRANSCRIPTION_DIR)
    }

    pub fn translations(&self) -> PathBuf {
        self.output_root.join(TRANSLATION_DIR)
    }

    pub fn original_master(&self) -> PathBuf {
        self.output_root.join(&self.original_master_name)
    }

    pub fn translated_master(&self) -> PathBuf {
        self.output_root.join(&self.translated_master_name)
    }

    pub fn final_document(&self) -> PathBuf {
        self.output_root.join(&self.document_name)
    }
}

/// Directory holding the raw page images: the source path without extension.
pub fn raw_dir_for(source: &Path) -> PathBuf {
    source.with_extension("")
}

/// The unit of work for one source document, owned by the orchestrator.
#[derive(Debug)]
pub struct Job {
    pub layout: JobLayout,
    pub total_pages: usize,
    /// Progress of the stage currently running, updated after every unit.
    pub progress: AtomicProgress,
    pub state: JobState,
}

impl Job {
    pub fn new(layout: JobLayout) -> Self {
        Self {
            layout,
            total_pages: 0,
            progress: AtomicProgress::new(),
            state: JobState::Validating,
        }
    }

    /// Page indices `0..total_pages`, ascending.
    pub fn pages(&self) -> std::ops::Range<usize> {
        0..self.total_pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> JobLayout {
        let config = JobConfig::builder()
            .source_path("/books/codex.pdf")
            .output_root("/out")
            .build()
            .unwrap();
        JobLayout::new(&config)
    }

    #[test]
    fn raw_dir_is_source_stem() {
        let l = layout();
        assert_eq!(l.raw_dir, PathBuf::from("/books/codex"));
        assert_eq!(l.working_root, PathBuf::from("/books/codex"));
        assert_eq!(
            l.working_transcripts(),
            PathBuf::from("/books/codex/transcription")
        );
    }

    #[test]
    fn output_paths() {
        let l = layout();
        assert_eq!(l.output_transcripts(), PathBuf::from("/out/transcription"));
        assert_eq!(l.translations(), PathBuf::from("/out/translation"));
        assert_eq!(
            l.final_document(),
            PathBuf::from("/out/Illuminate - codex.pdf")
        );
        assert_eq!(
            l.translated_master(),
            PathBuf::from("/out/pdf_transcript_translated.txt")
        );
    }

    #[test]
    fn explicit_working_root() {
        let config = JobConfig::builder()
            .source_path("/books/codex.pdf")
            .output_root("/out")
            .working_root("/opt/tesseract")
            .build()
            .unwrap();
        let l = JobLayout::new(&config);
        assert_eq!(
            l.stage_dir(Stage::Transcribe),
            PathBuf::from("/opt/tesseract/transcription")
        );
    }

    #[test]
    fn state_machine_order() {
        let mut state = JobState::Validating;
        let mut seen = vec![state];
        while !state.is_terminal() {
            state = state.next();
            seen.push(state);
        }
        let stages: Vec<Stage> = seen.iter().filter_map(|s| s.stage()).collect();
        assert_eq!(stages, Stage::ALL.to_vec());
        assert_eq!(seen.last(), Some(&JobState::Done));
    }
}

//! Transcript assembly across the two storage roots.
//!
//! The recognition engine always writes into its own working root, while
//! earlier runs may already have moved some transcripts into the job's
//! output root. Three steps turn that split state into the master files:
//!
//! 1. [`TranscriptIndex`] merges both roots' cache sets. The output root takes
//!    precedence when a page exists in both.
//! 2. [`relocate`] moves working-only transcripts into the output root.
//!    First writer wins: an existing output copy is never overwritten.
//! 3. [`translate_transcript`] (the Translate stage delegate) and
//!    [`merge_masters`] decode each transcript under its detected encoding,
//!    translate non-blank pages and replay them in page order into the
//!    original and translated masters.
//!
//! Blank pages (empty after trimming) are never sent to the translator and
//! contribute nothing to either master.

use crate::cache::{completed_files, ArtifactNaming, STAGING_PREFIX};
use crate::encoding::{self, push_utf32le, UTF32LE_BOM};
use crate::error::{BoxError, IlluminateError};
use crate::job::Stage;
use crate::pipeline::Translator;
use crate::stage::write_atomic;
use encoding_rs::{Encoding, UTF_8};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Which root a transcript was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRoot {
    Working,
    Output,
}

/// Union of the transcript caches of both roots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptIndex {
    entries: BTreeMap<usize, (TranscriptRoot, PathBuf)>,
}

impl TranscriptIndex {
    /// Read both transcript directories and reconcile them.
    pub fn scan(working_dir: &Path, output_dir: &Path) -> Result<Self, IlluminateError> {
        let naming = ArtifactNaming::IndexedText;
        let working = completed_files(working_dir, &naming)?;
        let output = if same_dir(working_dir, output_dir) {
            BTreeMap::new()
        } else {
            completed_files(output_dir, &naming)?
        };
        Ok(Self::reconcile(working, output))
    }

    /// Two-source merge; the output root wins on conflict.
    pub fn reconcile(
        working: BTreeMap<usize, PathBuf>,
        output: BTreeMap<usize, PathBuf>,
    ) -> Self {
        let mut entries: BTreeMap<usize, (TranscriptRoot, PathBuf)> = working
            .into_iter()
            .map(|(i, p)| (i, (TranscriptRoot::Working, p)))
            .collect();
        for (i, p) in output {
            entries.insert(i, (TranscriptRoot::Output, p));
        }
        Self { entries }
    }

    /// The effective "already transcribed" cache set.
    pub fn completed(&self) -> BTreeSet<usize> {
        self.entries.keys().copied().collect()
    }

    pub fn root(&self, page: usize) -> Option<TranscriptRoot> {
        self.entries.get(&page).map(|(root, _)| *root)
    }

    /// Authoritative location of the transcript for `page`.
    pub fn path(&self, page: usize) -> Option<&Path> {
        self.entries.get(&page).map(|(_, p)| p.as_path())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// True when both paths name the same directory, whether or not it exists yet.
pub(crate) fn same_dir(a: &Path, b: &Path) -> bool {
    a == b || resolve(a) == resolve(b)
}

/// Canonicalize the longest existing ancestor of `path`, then apply the
/// remaining components lexically.
fn resolve(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut base = absolute.as_path();
    let mut rest = Vec::new();
    let mut resolved = loop {
        if let Ok(canonical) = base.canonicalize() {
            break canonical;
        }
        match (base.parent(), base.components().next_back()) {
            (Some(parent), Some(last)) => {
                rest.push(last.as_os_str().to_os_string());
                base = parent;
            }
            _ => break base.to_path_buf(),
        }
    };

    for name in rest.into_iter().rev() {
        resolved.push(name);
    }
    normalize(&resolved)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Outcome of [`relocate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelocationReport {
    /// Pages moved from the working root into the output root.
    pub moved: Vec<usize>,
    /// Pages present in both roots; the output copy was kept.
    pub kept: Vec<usize>,
}

/// Move working-only transcripts into `output_dir`, never overwriting.
pub fn relocate(
    working_dir: &Path,
    output_dir: &Path,
) -> Result<RelocationReport, IlluminateError> {
    let mut report = RelocationReport::default();
    if same_dir(working_dir, output_dir) {
        return Ok(report);
    }

    let naming = ArtifactNaming::IndexedText;
    let working = completed_files(working_dir, &naming)?;
    if working.is_empty() {
        return Ok(report);
    }
    std::fs::create_dir_all(output_dir).map_err(|e| IlluminateError::io(output_dir, e))?;

    for (page, from) in working {
        let to = output_dir.join(naming.file_name(page));
        if to.exists() {
            warn!(
                "Transcript for page {} exists in both roots, keeping {}",
                page,
                to.display()
            );
            report.kept.push(page);
            continue;
        }
        move_file(&from, &to)?;
        debug!("Relocated {} → {}", from.display(), to.display());
        report.moved.push(page);
    }

    if !report.moved.is_empty() {
        info!(
            "Relocated {} transcript(s) into {}",
            report.moved.len(),
            output_dir.display()
        );
    }
    Ok(report)
}

/// Rename, falling back to copy + rename + remove across filesystems.
fn move_file(from: &Path, to: &Path) -> Result<(), IlluminateError> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    let name = to
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let staging = to.with_file_name(format!("{STAGING_PREFIX}{name}"));
    std::fs::copy(from, &staging).map_err(|e| IlluminateError::io(&staging, e))?;
    std::fs::rename(&staging, to).map_err(|e| IlluminateError::io(to, e))?;
    std::fs::remove_file(from).map_err(|e| IlluminateError::io(from, e))?;
    Ok(())
}

/// True when `text` has something other than whitespace.
pub fn is_text_valid(text: &str) -> bool {
    !text.trim().is_empty()
}

fn read_decoded(page: usize, path: &Path) -> Result<encoding::DecodedText, IlluminateError> {
    let bytes = std::fs::read(path).map_err(|e| IlluminateError::io(path, e))?;
    encoding::decode(&bytes).map_err(|detail| IlluminateError::Encoding {
        page,
        path: path.to_path_buf(),
        detail,
    })
}

/// Translate delegate for one page.
///
/// Writes the translation as UTF-8 to `staging`. A blank transcript is not
/// sent to the translator and yields an empty file, which still marks the
/// page as done.
pub async fn translate_transcript(
    translator: &dyn Translator,
    page: usize,
    transcript: &Path,
    staging: &Path,
    source_language: &str,
    target_language: &str,
) -> Result<(), BoxError> {
    let decoded = read_decoded(page, transcript)?;
    let translated = if is_text_valid(&decoded.text) {
        debug!(
            "Page {}: translating {} chars ({})",
            page,
            decoded.text.len(),
            decoded.encoding.name()
        );
        translator
            .translate(&decoded.text, source_language, target_language)
            .await?
    } else {
        debug!("Page {}: blank transcript, not translated", page);
        String::new()
    };
    tokio::fs::write(staging, translated.as_bytes())
        .await
        .map_err(|e| IlluminateError::io(staging, e))?;
    Ok(())
}

/// Outcome of [`merge_masters`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MasterReport {
    /// Pages written to both masters, ascending.
    pub pages_appended: Vec<usize>,
    /// Pages skipped because their transcript is blank.
    pub blank_pages: Vec<usize>,
    /// Encoding of the original-language master.
    pub original_encoding: String,
}

/// Destination files of the master merge.
#[derive(Debug, Clone)]
pub struct MasterPaths<'a> {
    pub translations_dir: &'a Path,
    pub original_master: &'a Path,
    pub translated_master: &'a Path,
}

/// Replay pages `0..total` in order into the two masters.
///
/// Both masters are rebuilt from scratch and replaced atomically, so a rerun
/// over unchanged artifacts produces identical files. The original master is
/// written in the encoding detected for the first non-blank page; the
/// translated master is UTF-32LE with a leading BOM, and every page is
/// followed by `separator`.
pub fn merge_masters(
    index: &TranscriptIndex,
    total: usize,
    separator: &str,
    paths: &MasterPaths<'_>,
) -> Result<MasterReport, IlluminateError> {
    let mut report = MasterReport::default();
    let mut original_encoding: Option<&'static Encoding> = None;
    let mut original = Vec::new();
    let mut translated = UTF32LE_BOM.to_vec();

    for page in 0..total {
        let Some(path) = index.path(page) else {
            continue;
        };
        let decoded = read_decoded(page, path)?;
        if !is_text_valid(&decoded.text) {
            report.blank_pages.push(page);
            continue;
        }

        let target = *original_encoding.get_or_insert(decoded.encoding.output_encoding());
        let bytes = encoding::encode(&decoded.text, target).map_err(|detail| {
            IlluminateError::Encoding {
                page,
                path: path.to_path_buf(),
                detail,
            }
        })?;
        original.extend_from_slice(&bytes);

        let translation = read_translation(page, paths.translations_dir)?;
        push_utf32le(&mut translated, &translation);
        push_utf32le(&mut translated, separator);
        report.pages_appended.push(page);
    }

    write_atomic(paths.original_master, &original)?;
    write_atomic(paths.translated_master, &translated)?;

    report.original_encoding = original_encoding.unwrap_or(UTF_8).name().to_string();
    info!(
        "Masters written: {} page(s), {} blank",
        report.pages_appended.len(),
        report.blank_pages.len()
    );
    Ok(report)
}

fn read_translation(page: usize, dir: &Path) -> Result<String, IlluminateError> {
    let path = dir.join(ArtifactNaming::IndexedText.file_name(page));
    match std::fs::read(&path) {
        Ok(bytes) => String::from_utf8(bytes).map_err(|e| IlluminateError::Encoding {
            page,
            path,
            detail: format!("translation is not UTF-8: {e}"),
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(IlluminateError::MissingArtifact {
            stage: Stage::Translate,
            page,
            path,
        }),
        Err(e) => Err(IlluminateError::io(path, e)),
    }
}

/// Decode a UTF-32LE master back to text. Used by callers that inspect the
/// translated master.
pub fn decode_utf32le(bytes: &[u8]) -> Option<String> {
    let body = bytes.strip_prefix(&UTF32LE_BOM).unwrap_or(bytes);
    if body.len() % 4 != 0 {
        return None;
    }
    body.chunks_exact(4)
        .map(|c| char::from_u32(u32::from_le_bytes([c[0], c[1], c[2], c[3]])))
        .collect()
}

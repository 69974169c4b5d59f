//! Cache resolver: which pages already have a finished artifact.
//!
//! Completion is derived from directory contents only. Nothing is recorded
//! elsewhere, so the set is recomputed before every stage and a file that
//! exists under its final name is "done". Artifacts are written under a
//! `.partial-` staging name and renamed into place (see [`crate::stage`]),
//! which keeps half-written files out of the cache set.

use crate::error::IlluminateError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Prefix of in-flight artifacts.
pub const STAGING_PREFIX: &str = ".partial-";

static PAGE_IMAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^page_(0|[1-9]\d*)\.png$").expect("static regex"));
static INDEXED_TEXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(0|[1-9]\d*)\.txt$").expect("static regex"));

/// File naming convention of one artifact kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactNaming {
    /// `page_<i>.png`: raw and enhanced page images.
    PageImage,
    /// `<i>.txt`: transcripts and per-page translations.
    IndexedText,
    /// A single document; its presence marks unit 0 as done.
    Document(String),
}

impl ArtifactNaming {
    pub fn file_name(&self, index: usize) -> String {
        match self {
            ArtifactNaming::PageImage => format!("page_{index}.png"),
            ArtifactNaming::IndexedText => format!("{index}.txt"),
            ArtifactNaming::Document(name) => name.clone(),
        }
    }

    /// Temporary name the delegate writes to before the rename.
    ///
    /// Keeps the extension so encoders and engines that infer the format
    /// from it keep working.
    pub fn staging_file_name(&self, index: usize) -> String {
        format!("{STAGING_PREFIX}{}", self.file_name(index))
    }

    /// Map a file name back to its page index.
    pub fn parse(&self, file_name: &str) -> Option<usize> {
        let re = match self {
            ArtifactNaming::PageImage => &*PAGE_IMAGE_RE,
            ArtifactNaming::IndexedText => &*INDEXED_TEXT_RE,
            ArtifactNaming::Document(name) => {
                return (file_name == name).then_some(0);
            }
        };
        re.captures(file_name)?.get(1)?.as_str().parse().ok()
    }
}

/// Page indices whose artifact exists in `dir`.
///
/// A missing directory is an empty cache, not an error.
pub fn completed(dir: &Path, naming: &ArtifactNaming) -> Result<BTreeSet<usize>, IlluminateError> {
    Ok(completed_files(dir, naming)?.into_keys().collect())
}

/// Like [`completed`], keeping the path of each artifact.
pub fn completed_files(
    dir: &Path,
    naming: &ArtifactNaming,
) -> Result<BTreeMap<usize, PathBuf>, IlluminateError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("Cache dir {} does not exist yet", dir.display());
            return Ok(BTreeMap::new());
        }
        Err(e) => return Err(IlluminateError::io(dir, e)),
    };

    let mut found = BTreeMap::new();
    for entry in entries {
        let entry = entry.map_err(|e| IlluminateError::io(dir, e))?;
        let is_file = entry
            .file_type()
            .map_err(|e| IlluminateError::io(entry.path(), e))?
            .is_file();
        if !is_file {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(idx) = naming.parse(name) {
            found.insert(idx, entry.path());
        }
    }

    debug!("Cache {}: {} artifacts", dir.display(), found.len());
    Ok(found)
}

/// Indices in `0..total` that are not in `done`, ascending.
pub fn missing(done: &BTreeSet<usize>, total: usize) -> Vec<usize> {
    (0..total).filter(|i| !done.contains(i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn naming_round_trip() {
        assert_eq!(ArtifactNaming::PageImage.file_name(12), "page_12.png");
        assert_eq!(ArtifactNaming::PageImage.parse("page_12.png"), Some(12));
        assert_eq!(ArtifactNaming::IndexedText.parse("3.txt"), Some(3));
        assert_eq!(
            ArtifactNaming::IndexedText.staging_file_name(3),
            ".partial-3.txt"
        );
    }

    #[test]
    fn naming_rejects_foreign_names() {
        let n = ArtifactNaming::PageImage;
        assert_eq!(n.parse("page_1.jpg"), None);
        assert_eq!(n.parse("page_.png"), None);
        assert_eq!(n.parse("page_+1.png"), None);
        assert_eq!(n.parse(".partial-page_1.png"), None);
        assert_eq!(n.parse("xpage_1.png"), None);
        assert_eq!(n.parse("page_01.png"), None);
        assert_eq!(n.parse("page_0.png"), Some(0));
        assert_eq!(ArtifactNaming::IndexedText.parse("01.txt"), None);
        assert_eq!(ArtifactNaming::IndexedText.parse("0.txt"), Some(0));
        assert_eq!(
            ArtifactNaming::IndexedText.parse("pdf_transcript.txt"),
            None
        );
    }

    #[test]
    fn document_naming_maps_to_unit_zero() {
        let n = ArtifactNaming::Document("Illuminate - a.pdf".into());
        assert_eq!(n.parse("Illuminate - a.pdf"), Some(0));
        assert_eq!(n.parse("a.pdf"), None);
        assert_eq!(n.file_name(0), "Illuminate - a.pdf");
    }

    #[test]
    fn missing_dir_is_empty() {
        let tmp = TempDir::new().unwrap();
        let set = completed(&tmp.path().join("nope"), &ArtifactNaming::PageImage).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn lists_only_matching_files() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "page_0.png");
        touch(tmp.path(), "page_2.png");
        touch(tmp.path(), ".partial-page_1.png");
        touch(tmp.path(), "notes.txt");
        std::fs::create_dir(tmp.path().join("page_5.png")).unwrap();

        let set = completed(tmp.path(), &ArtifactNaming::PageImage).unwrap();
        assert_eq!(set.into_iter().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn zero_padded_names_are_not_cached() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "page_01.png");
        touch(tmp.path(), "page_0.png");

        let set = completed(tmp.path(), &ArtifactNaming::PageImage).unwrap();
        assert_eq!(set.into_iter().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn missing_indices() {
        let done: BTreeSet<usize> = [0, 2, 3].into_iter().collect();
        assert_eq!(missing(&done, 5), vec![1, 4]);
        assert!(missing(&done, 0).is_empty());
    }
}

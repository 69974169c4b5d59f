//! Job configuration.
//!
//! Everything that defines *what* a job is (paths, languages, output names)
//! lives in [`JobConfig`], built through [`JobConfigBuilder`]. [`JobConfigBuilder::build`]
//! is the single validation entry point; the orchestrator only performs the
//! filesystem checks that cannot be done ahead of time.
//!
//! Collaborator knobs (tesseract arguments, upscale factor, LLM model) live on
//! the collaborator structs in [`crate::pipeline`].

use crate::error::IlluminateError;
use crate::job::raw_dir_for;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Separator written after every page in the translated master.
pub fn default_page_separator() -> String {
    "\n---".repeat(30)
}

/// Configuration for one document recovery job.
///
/// # Example
/// ```rust
/// use illuminate::JobConfig;
///
/// let config = JobConfig::builder()
///     .source_path("books/herbal.pdf")
///     .output_root("books/herbal-recovered")
///     .source_language("la")
///     .build()
///     .unwrap();
/// assert_eq!(config.target_language, "en");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// The degraded source document. Must end in `.pdf`.
    pub source_path: PathBuf,

    /// Directory owned by the job: enhanced pages, relocated transcripts,
    /// masters and the final document.
    pub output_root: PathBuf,

    /// Directory the recognition engine writes into. Default: the raw page
    /// directory next to the source document.
    pub working_root: Option<PathBuf>,

    /// Language tag of the scanned text, passed to the translator. Default: `la`.
    pub source_language: String,

    /// Language tag to translate into. Default: `en`.
    pub target_language: String,

    /// Written after every translated page. Default: `"\n---"` × 30.
    pub page_separator: String,

    /// File name of the original-language master. Default: `pdf_transcript_original.txt`.
    pub original_master_name: String,

    /// File name of the translated master. Default: `pdf_transcript_translated.txt`.
    pub translated_master_name: String,

    /// Prefix of the reassembled document's file name. Default: `Illuminate - `.
    pub document_prefix: String,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            source_path: PathBuf::new(),
            output_root: PathBuf::new(),
            working_root: None,
            source_language: "la".to_string(),
            target_language: "en".to_string(),
            page_separator: default_page_separator(),
            original_master_name: "pdf_transcript_original.txt".to_string(),
            translated_master_name: "pdf_transcript_translated.txt".to_string(),
            document_prefix: "Illuminate - ".to_string(),
        }
    }
}

impl JobConfig {
    /// Create a new builder for `JobConfig`.
    pub fn builder() -> JobConfigBuilder {
        JobConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`JobConfig`].
#[derive(Debug)]
pub struct JobConfigBuilder {
    config: JobConfig,
}

impl JobConfigBuilder {
    pub fn source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.source_path = path.into();
        self
    }

    pub fn output_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_root = path.into();
        self
    }

    pub fn working_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.working_root = Some(path.into());
        self
    }

    pub fn source_language(mut self, tag: impl Into<String>) -> Self {
        self.config.source_language = tag.into();
        self
    }

    pub fn target_language(mut self, tag: impl Into<String>) -> Self {
        self.config.target_language = tag.into();
        self
    }

    pub fn page_separator(mut self, sep: impl Into<String>) -> Self {
        self.config.page_separator = sep.into();
        self
    }

    pub fn original_master_name(mut self, name: impl Into<String>) -> Self {
        self.config.original_master_name = name.into();
        self
    }

    pub fn translated_master_name(mut self, name: impl Into<String>) -> Self {
        self.config.translated_master_name = name.into();
        self
    }

    pub fn document_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.document_prefix = prefix.into();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<JobConfig, IlluminateError> {
        let c = &self.config;
        if c.source_path.as_os_str().is_empty() {
            return Err(IlluminateError::InvalidConfig(
                "source path is required".into(),
            ));
        }
        if c.output_root.as_os_str().is_empty() {
            return Err(IlluminateError::InvalidConfig(
                "output root is required".into(),
            ));
        }
        if c.source_language.trim().is_empty() || c.target_language.trim().is_empty() {
            return Err(IlluminateError::InvalidConfig(
                "source and target language tags must not be empty".into(),
            ));
        }
        if c.page_separator.is_empty() {
            return Err(IlluminateError::InvalidConfig(
                "page separator must not be empty".into(),
            ));
        }
        for name in [&c.original_master_name, &c.translated_master_name] {
            if name.is_empty() || name.contains(['/', '\\']) {
                return Err(IlluminateError::InvalidConfig(format!(
                    "master file name must be a plain file name, got '{name}'"
                )));
            }
        }
        if c.original_master_name == c.translated_master_name {
            return Err(IlluminateError::InvalidConfig(
                "original and translated masters must have different names".into(),
            ));
        }
        // Enhanced pages share the raw pages' naming convention, so the two
        // directories must differ or every raw page would look enhanced.
        if raw_dir_for(&c.source_path) == c.output_root {
            return Err(IlluminateError::InvalidConfig(format!(
                "output root '{}' must differ from the raw page directory",
                c.output_root.display()
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> JobConfigBuilder {
        JobConfig::builder()
            .source_path("scans/book.pdf")
            .output_root("out")
    }

    #[test]
    fn defaults() {
        let c = base().build().unwrap();
        assert_eq!(c.source_language, "la");
        assert_eq!(c.target_language, "en");
        assert_eq!(c.page_separator, "\n---".repeat(30));
        assert!(c.working_root.is_none());
    }

    #[test]
    fn missing_paths_rejected() {
        assert!(JobConfig::builder().output_root("out").build().is_err());
        assert!(JobConfig::builder().source_path("b.pdf").build().is_err());
    }

    #[test]
    fn empty_language_rejected() {
        let err = base().target_language("  ").build().unwrap_err();
        assert!(matches!(err, IlluminateError::InvalidConfig(_)));
    }

    #[test]
    fn output_root_must_differ_from_raw_dir() {
        let err = JobConfig::builder()
            .source_path("scans/book.pdf")
            .output_root("scans/book")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("raw page directory"), "got: {err}");
    }

    #[test]
    fn master_names_validated() {
        assert!(base().original_master_name("a/b.txt").build().is_err());
        assert!(base()
            .original_master_name("same.txt")
            .translated_master_name("same.txt")
            .build()
            .is_err());
    }
}

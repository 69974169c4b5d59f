//! Text recognition via a tesseract child process.
//!
//! tesseract takes an output *stem* and appends `.txt` itself, which is why the
//! [`Recognizer`] contract is expressed in stems. The stage runner passes the
//! stem of its staging file, so the transcript only gets its final `<i>.txt`
//! name after the process has exited successfully.

use super::Recognizer;
use crate::error::BoxError;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Arguments passed when none are configured: LSTM engine, no inversion pass.
pub fn default_extra_args() -> Vec<String> {
    ["--oem", "1", "-c", "tessedit_do_invert=0"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Runs `tesseract <image> <stem> [-l <lang>] [extra args…]`.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    program: PathBuf,
    language: Option<String>,
    extra_args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl Default for TesseractRecognizer {
    fn default() -> Self {
        Self {
            program: PathBuf::from("tesseract"),
            language: None,
            extra_args: default_extra_args(),
            working_dir: None,
        }
    }
}

impl TesseractRecognizer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Recognition language pack, e.g. `lat`. Default: tesseract's own default.
    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.language = Some(lang.into());
        self
    }

    pub fn extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Directory the process runs in (tessdata lookups are relative to it on
    /// some installs).
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn command(&self, image: &Path, dest_stem: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(image).arg(dest_stem);
        if let Some(ref lang) = self.language {
            cmd.arg("-l").arg(lang);
        }
        cmd.args(&self.extra_args);
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

/// `<stem>.txt`, the file tesseract writes for `stem`.
pub fn transcript_for_stem(stem: &Path) -> PathBuf {
    let mut name = stem.as_os_str().to_owned();
    name.push(".txt");
    PathBuf::from(name)
}

impl Recognizer for TesseractRecognizer {
    fn recognize(&self, image: &Path, dest_stem: &Path) -> Result<PathBuf, BoxError> {
        let out = self
            .command(image, dest_stem)
            .output()
            .map_err(|e| format!("cannot run '{}': {e}", self.program.display()))?;
        if !out.status.success() {
            return Err(format!(
                "'{}' exited with {} for {}: {}",
                self.program.display(),
                out.status,
                image.display(),
                String::from_utf8_lossy(&out.stderr).trim()
            )
            .into());
        }
        let written = transcript_for_stem(dest_stem);
        debug!("Transcription created for {}", image.display());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_layout() {
        let r = TesseractRecognizer::default().language("lat");
        let cmd = r.command(Path::new("/out/page_3.png"), Path::new("/w/.partial-3"));
        let args: Vec<_> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "/out/page_3.png",
                "/w/.partial-3",
                "-l",
                "lat",
                "--oem",
                "1",
                "-c",
                "tessedit_do_invert=0"
            ]
        );
    }

    #[test]
    fn stem_gets_txt_appended() {
        assert_eq!(
            transcript_for_stem(Path::new("/w/.partial-3")),
            PathBuf::from("/w/.partial-3.txt")
        );
    }

    #[test]
    fn missing_binary_is_error() {
        let r = TesseractRecognizer::new("illuminate-no-such-tesseract");
        let err = r
            .recognize(Path::new("a.png"), Path::new("a"))
            .unwrap_err();
        assert!(err.to_string().contains("cannot run"), "got: {err}");
    }
}

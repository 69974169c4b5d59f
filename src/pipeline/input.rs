//! Source validation: the `Validating` state of the orchestrator.
//!
//! Existence, extension and the `%PDF` magic bytes are checked before any
//! stage has created a directory.

use crate::error::IlluminateError;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Expected source extension, compared case-insensitively.
pub const PDF_EXTENSION: &str = "pdf";

/// Validate that `path` is a readable PDF file.
pub fn validate_source(path: &Path) -> Result<(), IlluminateError> {
    if !path.is_file() {
        return Err(IlluminateError::SourceNotFound {
            path: path.to_path_buf(),
        });
    }

    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    if !extension.eq_ignore_ascii_case(PDF_EXTENSION) {
        return Err(IlluminateError::InvalidExtension {
            path: path.to_path_buf(),
            extension,
        });
    }

    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_err() || &magic != b"%PDF" {
                return Err(IlluminateError::NotAPdf {
                    path: path.to_path_buf(),
                    magic,
                });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(IlluminateError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(IlluminateError::SourceNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    debug!("Validated source PDF: {}", path.display());
    Ok(())
}

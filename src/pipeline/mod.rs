//! External collaborators of the recovery pipeline.
//!
//! Each stage delegates its per-page work to exactly one collaborator behind a
//! narrow trait.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ enhance ──▶ ocr ──▶ translate ──▶ assemble
//! (check)   (pdfium)   (upscale)   (tesseract) (LLM)     (lopdf)
//! ```
//!
//! 1. [`input`]: validate the source path before any stage starts
//! 2. [`render`]: rasterise one page; pdfium is blocking, so callers run it
//!    under `spawn_blocking`
//! 3. [`enhance`]: super-resolution, in-process or via an external binary
//! 4. [`ocr`]: recognition via a tesseract child process
//! 5. [`translate`]: the only async collaborator (network I/O)
//! 6. [`assemble`]: pack the enhanced pages into a PDF
//!
//! Blocking traits are `Send + Sync` so the orchestrator can hand an `Arc` to
//! the blocking thread pool.

use crate::error::BoxError;
use async_trait::async_trait;
use image::DynamicImage;
use std::path::{Path, PathBuf};

pub mod assemble;
pub mod enhance;
pub mod input;
pub mod ocr;
pub mod render;
pub mod translate;

/// Page → raster image.
pub trait Rasterizer: Send + Sync {
    /// Number of pages in the document.
    fn page_count(&self, document: &Path) -> Result<usize, BoxError>;

    /// Render the zero-based page `index`.
    fn rasterize(&self, document: &Path, index: usize) -> Result<DynamicImage, BoxError>;
}

/// Raster image → text file.
pub trait Recognizer: Send + Sync {
    /// Recognise `image` and write `<dest_stem>.txt`. Returns the written path.
    fn recognize(&self, image: &Path, dest_stem: &Path) -> Result<PathBuf, BoxError>;
}

/// Raster image → enhanced raster image with the same page identity.
pub trait Enhancer: Send + Sync {
    fn enhance(&self, input: &Path, output: &Path) -> Result<(), BoxError>;
}

/// Ordered page images → document bytes.
pub trait DocumentAssembler: Send + Sync {
    fn assemble(&self, images: &[PathBuf]) -> Result<Vec<u8>, BoxError>;
}

/// Text → translated text.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String, BoxError>;
}

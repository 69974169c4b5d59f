//! PDF rasterisation via pdfium.
//!
//! ## Blocking
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and must not run on async worker threads. [`PdfiumRasterizer`] is a
//! plain blocking implementation of [`Rasterizer`]; the orchestrator calls it
//! through `tokio::task::spawn_blocking`.
//!
//! ## Pixel cap
//!
//! `max_rendered_pixels` caps the longest edge of the rendered page regardless
//! of its physical size. The enhancer multiplies that again.
//!
//! ## Library binding
//!
//! `PDFIUM_LIB_PATH` may point to a pdfium shared library or to the directory
//! containing it; otherwise the system library is used.

use super::Rasterizer;
use crate::error::BoxError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Environment variable overriding the pdfium library location.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Renders pages with pdfium, one document load per call.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    max_rendered_pixels: u32,
    password: Option<String>,
}

impl Default for PdfiumRasterizer {
    fn default() -> Self {
        Self {
            max_rendered_pixels: 2000,
            password: None,
        }
    }
}

impl PdfiumRasterizer {
    pub fn new(max_rendered_pixels: u32) -> Self {
        Self {
            max_rendered_pixels: max_rendered_pixels.max(100),
            password: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

fn bind_pdfium() -> Result<Pdfium, BoxError> {
    let bindings = match std::env::var_os(PDFIUM_LIB_PATH_ENV) {
        Some(path) => {
            let path = Path::new(&path);
            if path.is_dir() {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))
            } else {
                Pdfium::bind_to_library(path)
            }
        }
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| format!("failed to bind to pdfium library: {e:?}"))?;
    Ok(Pdfium::new(bindings))
}

fn load_error(path: &Path, password: Option<&str>, e: PdfiumError) -> BoxError {
    let err_str = format!("{:?}", e);
    if err_str.contains("Password") || err_str.contains("password") {
        if password.is_some() {
            format!("wrong password for '{}'", path.display()).into()
        } else {
            format!("'{}' is encrypted and requires a password", path.display()).into()
        }
    } else {
        format!("'{}' is corrupt: {err_str}", path.display()).into()
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn page_count(&self, document: &Path) -> Result<usize, BoxError> {
        let pdfium = bind_pdfium()?;
        let password = self.password.as_deref();
        let doc = pdfium
            .load_pdf_from_file(document, password)
            .map_err(|e| load_error(document, password, e))?;
        let total = doc.pages().len() as usize;
        info!("PDF loaded: {} pages", total);
        Ok(total)
    }

    fn rasterize(&self, document: &Path, index: usize) -> Result<DynamicImage, BoxError> {
        let pdfium = bind_pdfium()?;
        let password = self.password.as_deref();
        let doc = pdfium
            .load_pdf_from_file(document, password)
            .map_err(|e| load_error(document, password, e))?;

        let pages = doc.pages();
        let total = pages.len() as usize;
        if index >= total {
            return Err(format!("page {index} is out of range (document has {total} pages)").into());
        }

        let render_config = PdfRenderConfig::new()
            .set_target_width(self.max_rendered_pixels as i32)
            .set_maximum_height(self.max_rendered_pixels as i32);

        let page = pages
            .get(index as u16)
            .map_err(|e| format!("cannot open page {index}: {e:?}"))?;
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| format!("rasterisation failed for page {index}: {e:?}"))?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            index,
            image.width(),
            image.height()
        );
        Ok(image)
    }
}

//! Page super-resolution.
//!
//! Two [`Enhancer`]s ship with the crate:
//!
//! * [`ResampleEnhancer`]: in-process Lanczos3 upscale by an integer factor
//!   (default ×2). No model, no GPU; always available.
//! * [`CommandEnhancer`]: runs an external super-resolution binary such as
//!   `realesrgan-ncnn-vulkan -i <in> -o <out> -s 2`. The binary must write the
//!   output path it is given.

use super::Enhancer;
use crate::error::BoxError;
use image::imageops::FilterType;
use image::ImageFormat;
use std::path::Path;
use std::process::Command;
use std::time::Instant;
use tracing::debug;

/// Upscale factor used when none is configured.
pub const DEFAULT_SCALE: u32 = 2;

/// Lanczos3 upscale by `scale`.
#[derive(Debug, Clone)]
pub struct ResampleEnhancer {
    scale: u32,
}

impl Default for ResampleEnhancer {
    fn default() -> Self {
        Self {
            scale: DEFAULT_SCALE,
        }
    }
}

impl ResampleEnhancer {
    pub fn new(scale: u32) -> Self {
        Self {
            scale: scale.clamp(1, 8),
        }
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }
}

impl Enhancer for ResampleEnhancer {
    fn enhance(&self, input: &Path, output: &Path) -> Result<(), BoxError> {
        let start = Instant::now();
        let image = image::open(input)?.to_rgb8();
        let (w, h) = image.dimensions();
        let upscaled = image::imageops::resize(
            &image,
            w * self.scale,
            h * self.scale,
            FilterType::Lanczos3,
        );
        upscaled.save_with_format(output, ImageFormat::Png)?;
        debug!(
            "Upscaled {} ×{} in {:?}",
            input.display(),
            self.scale,
            start.elapsed()
        );
        Ok(())
    }
}

/// External super-resolution binary.
///
/// The invocation is `<program> -i <input> -o <output> -s <scale> [extra args…]`,
/// the interface shared by the Real-ESRGAN ncnn family of tools.
#[derive(Debug, Clone)]
pub struct CommandEnhancer {
    program: String,
    scale: u32,
    extra_args: Vec<String>,
}

impl CommandEnhancer {
    pub fn new(program: impl Into<String>, scale: u32) -> Self {
        Self {
            program: program.into(),
            scale: scale.max(1),
            extra_args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }

    fn command(&self, input: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-i")
            .arg(input)
            .arg("-o")
            .arg(output)
            .arg("-s")
            .arg(self.scale.to_string())
            .args(&self.extra_args);
        cmd
    }
}

impl Enhancer for CommandEnhancer {
    fn enhance(&self, input: &Path, output: &Path) -> Result<(), BoxError> {
        let start = Instant::now();
        let out = self
            .command(input, output)
            .output()
            .map_err(|e| format!("cannot run '{}': {e}", self.program))?;
        if !out.status.success() {
            return Err(format!(
                "'{}' exited with {}: {}",
                self.program,
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )
            .into());
        }
        debug!(
            "Sampling finished for {} in {:?}",
            input.display(),
            start.elapsed()
        );
        Ok(())
    }
}

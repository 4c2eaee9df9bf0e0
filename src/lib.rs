pub mod config;
pub mod errors;
pub mod imageops_ai;
pub mod loader;
pub mod model;
pub mod reporter;
pub mod traits;
pub mod writer;

pub mod mocks;

use image::{DynamicImage, GenericImageView};
use log::debug;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

pub use config::Config;
pub use errors::{CutoutError, Result};
pub use model::{ModelKind, OnnxRemover};
pub use reporter::Reporter;
pub use traits::*;

use crate::imageops_ai::{mask, refine};

/// How the predicted mask turns into the output image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovalOptions {
    /// Output the mask itself instead of the cutout.
    pub only_mask: bool,
    /// Open, blur and threshold the mask before using it.
    pub post_process_mask: bool,
    /// Scale colour channels by the mask as well as alpha.
    pub blend_color: bool,
}

impl Default for RemovalOptions {
    fn default() -> Self {
        Self {
            only_mask: false,
            post_process_mask: false,
            blend_color: true,
        }
    }
}

/// What a successful run wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CutoutSummary {
    pub width: u32,
    pub height: u32,
    pub transparent_pixels: usize,
    pub bytes_written: usize,
}

/// Load → remove background → save, reporting each step.
pub struct Cutout<R: BackgroundRemover> {
    remover: R,
    options: RemovalOptions,
}

impl<R: BackgroundRemover> Cutout<R> {
    pub const fn new(remover: R, options: RemovalOptions) -> Self {
        Self { remover, options }
    }

    pub const fn remover(&self) -> &R {
        &self.remover
    }

    /// Run the three steps once. The first failing step aborts the run and
    /// nothing is written; reporting the error is left to the caller.
    pub fn run<W: Write>(
        &self,
        input: &Path,
        output: &Path,
        reporter: &mut Reporter<W>,
    ) -> Result<CutoutSummary> {
        reporter.opening(input);
        let image = loader::open_image(input)?;

        let started = Instant::now();
        let cutout = reporter.removing(|| self.remove_background(&image))?;
        debug!(
            "{} remover finished in {:.2?}",
            self.remover.name(),
            started.elapsed()
        );

        reporter.saving(output);
        let bytes_written = writer::save_image(&cutout, output)?;
        reporter.success(output);

        let (width, height) = cutout.dimensions();
        Ok(CutoutSummary {
            width,
            height,
            transparent_pixels: count_transparent(&cutout),
            bytes_written,
        })
    }

    /// Predict the mask for `image` and apply it according to the options.
    pub fn remove_background(&self, image: &DynamicImage) -> Result<DynamicImage> {
        let mask = self.remover.predict_mask(image)?;
        if mask.dimensions() != image.dimensions() {
            return Err(CutoutError::removal(
                "mask validation",
                format!(
                    "{} remover returned a {}x{} mask for a {}x{} image",
                    self.remover.name(),
                    mask.width(),
                    mask.height(),
                    image.width(),
                    image.height()
                ),
            ));
        }

        let mask = if self.options.post_process_mask {
            refine::smooth_mask(&mask)
        } else {
            mask
        };

        if self.options.only_mask {
            return Ok(DynamicImage::ImageLuma8(mask));
        }

        let cutout = mask::apply(&image.to_rgba8(), &mask, self.options.blend_color)
            .map_err(|e| CutoutError::removal("mask application", e))?;
        Ok(DynamicImage::ImageRgba8(cutout))
    }
}

fn count_transparent(image: &DynamicImage) -> usize {
    match image {
        DynamicImage::ImageRgba8(buffer) => buffer.pixels().filter(|p| p[3] == 0).count(),
        _ if image.color().has_alpha() => image.to_rgba8().pixels().filter(|p| p[3] == 0).count(),
        _ => 0,
    }
}

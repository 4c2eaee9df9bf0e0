use crate::errors::Result;
use image::{DynamicImage, GrayImage};

/// Foreground segmentation, the only step the crate does not implement itself.
///
/// Implementations return a mask with the same dimensions as `img`, where 255
/// is foreground and 0 is background. Everything else (loading, mask
/// application, saving) is handled by [`crate::Cutout`], which also rejects
/// masks of the wrong size.
pub trait BackgroundRemover: Send + Sync {
    fn predict_mask(&self, img: &DynamicImage) -> Result<GrayImage>;

    /// Short name used in log output.
    fn name(&self) -> &str;
}

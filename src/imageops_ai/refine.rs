use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::map::map_colors;
use imageproc::morphology::open;

const BLUR_SIGMA: f32 = 2.0;
const THRESHOLD: u8 = 127;

/// Clean up a predicted mask: drop specks with a 3x3 opening, soften the
/// outline, then snap every pixel to fully opaque or fully transparent.
pub fn smooth_mask(mask: &GrayImage) -> GrayImage {
    let opened = open(mask, Norm::LInf, 1);
    let blurred = gaussian_blur_f32(&opened, BLUR_SIGMA);
    map_colors(&blurred, |Luma([value])| {
        Luma([if value < THRESHOLD { 0 } else { 255 }])
    })
}

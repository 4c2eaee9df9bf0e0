use anyhow::{anyhow, ensure, Result};
use image::{GenericImageView, ImageBuffer, Luma, Pixel, Primitive, Rgba};
use num_traits::AsPrimitive;

use crate::imageops_ai::{get_max_value, is_floating_point};

/// Multiply the alpha channel of `image` by `mask`.
///
/// With `blend_color` the colour channels are scaled too, which is the same
/// as compositing the image over a fully transparent canvas through the mask.
pub fn apply<I, M, SI, SM>(
    image: &I,
    mask: &M,
    blend_color: bool,
) -> Result<ImageBuffer<Rgba<SI>, Vec<SI>>>
where
    I: GenericImageView<Pixel = Rgba<SI>>,
    M: GenericImageView<Pixel = Luma<SM>>,
    Rgba<SI>: Pixel<Subpixel = SI>,
    SI: Primitive + 'static + AsPrimitive<f32>,
    SM: Primitive + 'static + AsPrimitive<f32>,
    f32: AsPrimitive<SI>,
{
    ensure!(
        image.dimensions() == mask.dimensions(),
        "Image and mask dimensions do not match: image {}x{}, mask {}x{}",
        image.width(),
        image.height(),
        mask.width(),
        mask.height()
    );

    let sm_max: f32 = get_max_value::<SM>().as_();
    let round = !is_floating_point::<SI>();
    let scale = |channel: SI, coverage: f32| -> SI {
        let value = channel.as_() * coverage;
        if round {
            value.round().as_()
        } else {
            value.as_()
        }
    };

    let processed_pixels = image
        .pixels()
        .zip(mask.pixels())
        .flat_map(|((_, _, image_pixel), (_, _, mask_pixel))| {
            let Rgba([red, green, blue, alpha]) = image_pixel;
            let Luma([coverage]) = mask_pixel;
            let coverage = coverage.as_() / sm_max;

            let alpha = scale(alpha, coverage);
            if blend_color {
                [
                    scale(red, coverage),
                    scale(green, coverage),
                    scale(blue, coverage),
                    alpha,
                ]
            } else {
                [red, green, blue, alpha]
            }
        })
        .collect::<Vec<SI>>();

    ImageBuffer::from_raw(image.width(), image.height(), processed_pixels)
        .ok_or_else(|| anyhow!("Failed to create ImageBuffer from processed pixels"))
}

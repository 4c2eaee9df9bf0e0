use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errors::{CutoutError, Result};
use crate::traits::BackgroundRemover;
use image::{DynamicImage, GenericImageView, GrayImage, Luma};

/// Test remover: keeps a centred box and marks everything within `margin`
/// pixels of the border as background.
#[derive(Debug, Default)]
pub struct MockBackgroundRemover {
    pub margin: u32,
    calls: AtomicUsize,
}

impl MockBackgroundRemover {
    pub const fn new(margin: u32) -> Self {
        Self {
            margin,
            calls: AtomicUsize::new(0),
        }
    }

    /// How many times `predict_mask` ran.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl BackgroundRemover for MockBackgroundRemover {
    fn predict_mask(&self, img: &DynamicImage) -> Result<GrayImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (width, height) = img.dimensions();
        let margin = self.margin;
        Ok(GrayImage::from_fn(width, height, |x, y| {
            let inside = x >= margin
                && y >= margin
                && x < width.saturating_sub(margin)
                && y < height.saturating_sub(margin);
            Luma([if inside { 255 } else { 0 }])
        }))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Test remover that always fails, standing in for a broken model.
#[derive(Debug, Default)]
pub struct FailingRemover;

impl BackgroundRemover for FailingRemover {
    fn predict_mask(&self, _img: &DynamicImage) -> Result<GrayImage> {
        Err(CutoutError::removal("inference", "simulated model failure"))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Factory used by the tests.
pub const fn create_mock_remover() -> MockBackgroundRemover {
    MockBackgroundRemover::new(4)
}

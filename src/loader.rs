use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use image::{DynamicImage, GenericImageView, ImageReader};
use log::debug;

use crate::errors::{CutoutError, Result};

/// Decode the image at `path`.
///
/// The format is sniffed from the file contents, so a PNG saved with a
/// `.jpg` extension still loads.
pub fn open_image(path: &Path) -> Result<DynamicImage> {
    let metadata = fs::metadata(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => CutoutError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => CutoutError::Read {
            path: path.to_path_buf(),
            source: e,
        },
    })?;
    if !metadata.is_file() {
        return Err(CutoutError::Read {
            path: path.to_path_buf(),
            source: std::io::Error::new(ErrorKind::InvalidInput, "not a regular file"),
        });
    }

    let reader = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| CutoutError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
    let format = reader.format();

    let image = reader.decode().map_err(|e| CutoutError::Decode {
        path: path.to_path_buf(),
        source: Box::new(e),
    })?;

    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(CutoutError::Decode {
            path: path.to_path_buf(),
            source: format!("image has zero size ({width}x{height})").into(),
        });
    }

    debug!(
        "decoded {} as {:?} ({}x{}, {:?})",
        path.display(),
        format,
        width,
        height,
        image.color()
    );
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    #[test]
    fn test_open_valid_png() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("mascot.png");
        RgbImage::from_pixel(12, 7, Rgb([10, 20, 30])).save(&path)?;

        let image = open_image(&path)?;
        assert_eq!(image.dimensions(), (12, 7));
        Ok(())
    }

    #[test]
    fn test_format_is_sniffed_from_contents() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let png_path = temp_dir.path().join("real.png");
        RgbImage::new(3, 3).save(&png_path)?;
        let misnamed = temp_dir.path().join("misnamed.jpg");
        fs::copy(&png_path, &misnamed)?;

        assert_eq!(open_image(&misnamed)?.dimensions(), (3, 3));
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        let err = open_image(Path::new("/definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, CutoutError::FileNotFound { .. }));
    }

    #[test]
    fn test_directory_is_rejected() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let err = open_image(temp_dir.path()).unwrap_err();
        assert!(matches!(err, CutoutError::Read { .. }));
        Ok(())
    }

    #[test]
    fn test_garbage_bytes() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("broken.png");
        fs::write(&path, b"this is not an image")?;

        let err = open_image(&path).unwrap_err();
        assert!(matches!(err, CutoutError::Decode { .. }));
        Ok(())
    }
}

use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat};
use log::debug;

use crate::errors::{CutoutError, Result};

/// Formats whose encoders in `image` can store an alpha channel.
fn supports_alpha(format: ImageFormat) -> bool {
    matches!(
        format,
        ImageFormat::Png
            | ImageFormat::WebP
            | ImageFormat::Tiff
            | ImageFormat::Avif
            | ImageFormat::Qoi
            | ImageFormat::Tga
            | ImageFormat::Ico
            | ImageFormat::OpenExr
    )
}

fn supported_extensions() -> String {
    let supported: Vec<_> = ImageFormat::all()
        .filter(|f| f.writing_enabled() && supports_alpha(*f))
        .flat_map(|f| f.extensions_str())
        .map(|s| format!("`{}`", s))
        .collect();
    format!("Supported formats: {}", supported.join(", "))
}

/// Pick the output format for `path`.
///
/// A path without an extension is written as PNG. Anything that cannot keep
/// transparency, or has no encoder in this build, is refused.
pub fn resolve_format(path: &Path) -> std::result::Result<ImageFormat, String> {
    let Some(extension) = path.extension().and_then(|ext| ext.to_str()) else {
        return Ok(ImageFormat::Png);
    };

    let format = ImageFormat::from_extension(extension)
        .ok_or_else(|| format!("{} is not supported. {}", extension, supported_extensions()))?;
    if !supports_alpha(format) {
        return Err(format!(
            "{} cannot store transparency. {}",
            extension,
            supported_extensions()
        ));
    }
    if !format.writing_enabled() {
        return Err(format!(
            "{} is not enabled in this build. {}",
            extension,
            supported_extensions()
        ));
    }
    Ok(format)
}

/// Encode `image` and atomically replace `path` with it.
///
/// The image is encoded in memory, written to a temporary file next to the
/// destination and renamed over it, so a failure never leaves a truncated
/// output behind. Returns the number of bytes written.
pub fn save_image(image: &DynamicImage, path: &Path) -> Result<usize> {
    let format = resolve_format(path).map_err(|message| CutoutError::Encode {
        path: path.to_path_buf(),
        format: path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default(),
        source: message.into(),
    })?;

    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), format)
        .map_err(|e| CutoutError::Encode {
            path: path.to_path_buf(),
            format: format!("{:?}", format),
            source: Box::new(e),
        })?;

    let write_err = |source: std::io::Error| CutoutError::Write {
        path: path.to_path_buf(),
        source,
    };
    // a symlinked destination is written through, not replaced
    let target = match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_symlink() => {
            resolve_link(path).map_err(write_err)?
        }
        _ => path.to_path_buf(),
    };
    let directory = target
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let existing = fs::metadata(&target).ok().map(|metadata| metadata.permissions());

    let mut builder = tempfile::Builder::new();
    builder.prefix(".cutout-").suffix(".tmp");
    if existing.is_none() {
        create_mode(&mut builder);
    }

    let mut temp = builder.tempfile_in(directory).map_err(write_err)?;
    temp.write_all(&buffer).map_err(write_err)?;
    if let Some(permissions) = existing {
        temp.as_file()
            .set_permissions(permissions)
            .map_err(write_err)?;
    }
    temp.as_file().sync_all().map_err(write_err)?;
    debug!(
        "persisting {} bytes from {} to {}",
        buffer.len(),
        temp.path().display(),
        target.display()
    );
    temp.persist(&target).map_err(|e| write_err(e.error))?;

    Ok(buffer.len())
}

/// New outputs get the mode a plain create would give (0o666 minus umask).
#[cfg(unix)]
fn create_mode(builder: &mut tempfile::Builder<'_, '_>) {
    use std::os::unix::fs::PermissionsExt;
    builder.permissions(fs::Permissions::from_mode(0o666));
}

#[cfg(not(unix))]
fn create_mode(_builder: &mut tempfile::Builder<'_, '_>) {}

fn resolve_link(path: &Path) -> std::io::Result<PathBuf> {
    fs::canonicalize(path).or_else(|_| {
        // dangling link: create the file it points at
        let link = fs::read_link(path)?;
        Ok(match path.parent() {
            Some(parent) if link.is_relative() => parent.join(link),
            _ => link,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba, RgbaImage};
    use tempfile::TempDir;

    #[test]
    fn test_resolve_format() {
        assert_eq!(resolve_format(Path::new("out.png")), Ok(ImageFormat::Png));
        assert_eq!(resolve_format(Path::new("OUT.PNG")), Ok(ImageFormat::Png));
        assert_eq!(resolve_format(Path::new("out")), Ok(ImageFormat::Png));
        assert!(resolve_format(Path::new("out.jpg"))
            .unwrap_err()
            .contains("cannot store transparency"));
        assert!(resolve_format(Path::new("out.xyz"))
            .unwrap_err()
            .contains("is not supported"));
    }

    #[test]
    fn test_save_keeps_alpha() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("cutout.png");
        let mut image = RgbaImage::from_pixel(4, 4, Rgba([200, 100, 50, 255]));
        image.put_pixel(0, 0, Rgba([0, 0, 0, 0]));

        let written = save_image(&DynamicImage::ImageRgba8(image), &path)?;
        assert_eq!(written as u64, std::fs::metadata(&path)?.len());

        let reloaded = image::open(&path)?;
        assert_eq!(reloaded.dimensions(), (4, 4));
        assert!(reloaded.color().has_alpha());
        assert_eq!(reloaded.to_rgba8().get_pixel(0, 0)[3], 0);
        Ok(())
    }

    #[test]
    fn test_save_overwrites() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("cutout.png");
        std::fs::write(&path, b"old contents")?;

        save_image(&DynamicImage::ImageRgba8(RgbaImage::new(2, 3)), &path)?;
        assert_eq!(image::open(&path)?.dimensions(), (2, 3));
        Ok(())
    }

    #[test]
    fn test_missing_directory() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("no").join("such").join("dir.png");

        let err = save_image(&DynamicImage::ImageRgba8(RgbaImage::new(2, 2)), &path).unwrap_err();
        assert!(matches!(err, CutoutError::Write { .. }));
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn test_opaque_format_is_rejected_before_writing() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("cutout.jpg");

        let err = save_image(&DynamicImage::ImageRgba8(RgbaImage::new(2, 2)), &path).unwrap_err();
        assert!(matches!(err, CutoutError::Encode { .. }));
        assert!(!path.exists());
        Ok(())
    }

    #[cfg(unix)]
    mod permissions {
        use super::*;
        use std::os::unix::fs::{symlink, PermissionsExt};

        fn mode(path: &Path) -> u32 {
            fs::metadata(path).unwrap().permissions().mode() & 0o777
        }

        #[test]
        fn test_overwrite_keeps_mode() -> anyhow::Result<()> {
            let temp_dir = TempDir::new()?;
            let path = temp_dir.path().join("cutout.png");
            fs::write(&path, b"old contents")?;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o640))?;

            save_image(&DynamicImage::ImageRgba8(RgbaImage::new(2, 2)), &path)?;
            assert_eq!(mode(&path), 0o640);
            Ok(())
        }

        #[test]
        fn test_new_file_mode_follows_umask() -> anyhow::Result<()> {
            let temp_dir = TempDir::new()?;
            let reference = temp_dir.path().join("reference");
            fs::File::create(&reference)?;
            let path = temp_dir.path().join("cutout.png");

            save_image(&DynamicImage::ImageRgba8(RgbaImage::new(2, 2)), &path)?;
            assert_eq!(mode(&path), mode(&reference));
            Ok(())
        }

        #[test]
        fn test_symlink_is_written_through() -> anyhow::Result<()> {
            let temp_dir = TempDir::new()?;
            let real = temp_dir.path().join("real.png");
            fs::write(&real, b"old contents")?;
            let link = temp_dir.path().join("link.png");
            symlink(&real, &link)?;

            save_image(&DynamicImage::ImageRgba8(RgbaImage::new(5, 4)), &link)?;
            assert!(fs::symlink_metadata(&link)?.file_type().is_symlink());
            assert_eq!(image::open(&real)?.dimensions(), (5, 4));
            Ok(())
        }
    }
}

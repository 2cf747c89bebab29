use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{ImageFormat, RgbaImage};

use crate::error::ValidationError;

/// A candidate file, before it is decoded.
#[derive(Clone, Debug)]
pub struct IncomingFile {
    pub name: String,
    /// MIME type as declared by the source (drop event or file extension).
    pub declared_type: String,
    pub bytes: Vec<u8>,
}

impl IncomingFile {
    pub fn from_path(path: &Path) -> Result<Self, ValidationError> {
        let name = display_name(path);
        let bytes = std::fs::read(path).map_err(|source| ValidationError::Io {
            name: name.clone(),
            source,
        })?;
        Ok(Self {
            name,
            declared_type: mime_for_path(path).to_owned(),
            bytes,
        })
    }
}

/// The image a session edits, already within the size limit.
#[derive(Clone, Debug)]
pub struct SourceImage {
    pub name: String,
    pub image: RgbaImage,
    pub original_size: (u32, u32),
}

impl SourceImage {
    pub fn was_downscaled(&self) -> bool {
        self.original_size != self.image.dimensions()
    }

    pub fn stem(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("image")
    }
}

pub fn mime_for_path(path: &Path) -> &'static str {
    ImageFormat::from_path(path)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream")
}

/// Validate the declared type, decode, and downscale to `max_dimension`.
pub fn intake(file: IncomingFile, max_dimension: u32) -> Result<SourceImage, ValidationError> {
    if !file.declared_type.starts_with("image/") {
        return Err(ValidationError::UnsupportedType {
            name: file.name,
            declared: file.declared_type,
        });
    }

    let decoded = image::load_from_memory(&file.bytes).map_err(|source| {
        ValidationError::Undecodable {
            name: file.name.clone(),
            source,
        }
    })?;
    let original_size = (decoded.width(), decoded.height());

    let decoded = if original_size.0 > max_dimension || original_size.1 > max_dimension {
        log::info!(
            "downscaling {} from {}x{} to fit {max_dimension}",
            file.name,
            original_size.0,
            original_size.1
        );
        decoded.resize(max_dimension, max_dimension, FilterType::Lanczos3)
    } else {
        decoded
    };

    Ok(SourceImage {
        name: file.name,
        image: decoded.to_rgba8(),
        original_size,
    })
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
        .unwrap_or_else(|| PathBuf::from(path).display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(w, h, image::Rgba([10, 20, 30, 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn file(declared: &str, bytes: Vec<u8>) -> IncomingFile {
        IncomingFile {
            name: "photo.png".into(),
            declared_type: declared.into(),
            bytes,
        }
    }

    #[test]
    fn rejects_non_image_type_before_decoding() {
        let err = intake(file("text/plain", png_bytes(4, 4)), 2048).unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedType { .. }));
    }

    #[test]
    fn rejects_unreadable_image() {
        let err = intake(file("image/png", b"not a png".to_vec()), 2048).unwrap_err();
        assert!(matches!(err, ValidationError::Undecodable { .. }));
    }

    #[test]
    fn small_image_is_kept_as_is() {
        let src = intake(file("image/png", png_bytes(300, 200)), 2048).unwrap();
        assert_eq!(src.image.dimensions(), (300, 200));
        assert!(!src.was_downscaled());
        assert_eq!(src.stem(), "photo");
    }

    #[test]
    fn large_image_is_downscaled_keeping_aspect() {
        let src = intake(file("image/png", png_bytes(400, 100)), 200).unwrap();
        assert_eq!(src.image.dimensions(), (200, 50));
        assert_eq!(src.original_size, (400, 100));
        assert!(src.was_downscaled());
    }

    #[test]
    fn mime_is_inferred_from_extension() {
        assert_eq!(mime_for_path(Path::new("a/b.JPG")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("notes.txt")), "application/octet-stream");
    }
}

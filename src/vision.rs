use std::path::PathBuf;

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// A validated, base64-encoded image ready to attach to a chat message.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub path: PathBuf,
    pub encoded: String,
}

/// Reads and validates an image file. The bytes must decode as an actual
/// image; submissions with a broken or missing image are rejected up front
/// instead of being sent to the model.
pub fn load_image(path: &str) -> Result<LoadedImage> {
    let bytes = std::fs::read(path)?;
    image::load_from_memory(&bytes).map_err(|e| anyhow!("not a valid image: {}", e))?;

    Ok(LoadedImage {
        path: PathBuf::from(path),
        encoded: STANDARD.encode(&bytes),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn valid_png_is_encoded() {
        let mut png_bytes = Vec::new();
        let img = image::RgbImage::from_pixel(1, 1, image::Rgb([10, 20, 30]));
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut png_bytes), image::ImageFormat::Png)
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dot.png");
        std::fs::write(&path, &png_bytes).unwrap();

        let loaded = load_image(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.path, path);
        assert_eq!(STANDARD.decode(&loaded.encoded).unwrap(), png_bytes);
    }

    #[test]
    fn non_image_bytes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-an-image.png");
        std::fs::write(&path, b"plain text").unwrap();

        let err = load_image(path.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("not a valid image"));
    }

    #[test]
    fn missing_file_is_rejected() {
        assert!(load_image("/nonexistent/image.png").is_err());
    }
}

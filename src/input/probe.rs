use std::path::Path;

use crate::input::InputError;

pub trait ImageProbe: Sync {
    /// `(width, height)` in pixels.
    fn dimensions(&self, path: &Path) -> Result<(u32, u32), InputError>;
}

/// Reads only the image header through the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderProbe;

impl ImageProbe for HeaderProbe {
    fn dimensions(&self, path: &Path) -> Result<(u32, u32), InputError> {
        image::image_dimensions(path).map_err(|e| match e {
            image::ImageError::IoError(io) if io.kind() == std::io::ErrorKind::NotFound => {
                InputError::MissingInput(format!("image {}", path.display()))
            }
            image::ImageError::IoError(io) => InputError::Io(io),
            other => InputError::InvalidInput(format!("image {}: {}", path.display(), other)),
        })
    }
}

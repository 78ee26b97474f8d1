/// Image reading
///
/// The diff worker only needs `read(path) -> pixels`. Decoding goes through
/// the `image` crate; file bytes come from the shared file cache when one is
/// attached and enabled.

use image::DynamicImage;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::trace;

use crate::cache::FileCache;
use crate::error::{ImcompError, Result};

/// Source of decoded pixel buffers
pub trait ImageReader: Send + Sync {
    /// Decode `path`; unreadable or unsupported files are an error, never a
    /// blank buffer
    fn read(&self, path: &Path) -> Result<DynamicImage>;
}

/// Reader decoding files with the `image` crate, optionally through a [`FileCache`]
#[derive(Debug, Clone, Default)]
pub struct FileImageReader {
    cache: Option<Arc<FileCache>>,
}

impl FileImageReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(cache: Arc<FileCache>) -> Self {
        Self { cache: Some(cache) }
    }

    fn bytes(&self, path: &Path) -> std::io::Result<Arc<[u8]>> {
        match &self.cache {
            Some(cache) => cache.read(path),
            None => fs::read(path).map(Arc::from),
        }
    }
}

impl ImageReader for FileImageReader {
    fn read(&self, path: &Path) -> Result<DynamicImage> {
        let read_error = |reason: String| ImcompError::ImageRead {
            path: path.to_path_buf(),
            reason,
        };

        let bytes = self.bytes(path).map_err(|e| read_error(e.to_string()))?;
        let image = image::load_from_memory(&bytes).map_err(|e| read_error(e.to_string()))?;

        trace!(
            "decoded {}: {}x{} ({} channels)",
            path.display(),
            image.width(),
            image.height(),
            image.color().channel_count()
        );
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheSize;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_read_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("red.png");
        RgbImage::from_pixel(4, 3, Rgb([255, 0, 0])).save(&path).unwrap();

        let image = FileImageReader::new().read(&path).unwrap();
        assert_eq!((image.width(), image.height()), (4, 3));
        assert_eq!(image.color().channel_count(), 3);
    }

    #[test]
    fn test_read_goes_through_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.png");
        RgbImage::new(2, 2).save(&path).unwrap();

        let cache = Arc::new(FileCache::new(CacheSize::Bytes(1 << 20)));
        let reader = FileImageReader::with_cache(Arc::clone(&cache));
        reader.read(&path).unwrap();
        reader.read(&path).unwrap();
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_garbage_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.png");
        fs::write(&path, b"definitely not a png").unwrap();

        assert!(matches!(
            FileImageReader::new().read(&path),
            Err(ImcompError::ImageRead { .. })
        ));
        assert!(FileImageReader::new().read(&dir.path().join("missing.png")).is_err());
    }
}

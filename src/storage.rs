//! Image intake: persists uploaded bytes for the lifetime of a request.

use partsmith_common::ImageRef;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::StorageError;

/// Writes uploads to `<dir>/<uuid>.<ext>`.
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store `bytes` under a fresh name. The type is sniffed from the content.
    ///
    /// The file lives as long as the returned [`StoredImage`].
    pub async fn save(&self, bytes: &[u8]) -> Result<StoredImage, StorageError> {
        if bytes.is_empty() {
            return Err(StorageError::EmptyImage);
        }

        let (extension, mime_type) = sniff_image_type(bytes);
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StorageError::Write {
                path: self.dir.clone(),
                source,
            })?;

        let path = self.dir.join(format!("{}.{}", Uuid::new_v4(), extension));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| StorageError::Write {
                path: path.clone(),
                source,
            })?;

        debug!(path = %path.display(), mime_type, size = bytes.len(), "Stored image");
        Ok(StoredImage {
            image: ImageRef::new(path, mime_type),
        })
    }
}

/// An uploaded image on disk. Dropping it deletes the file.
#[derive(Debug)]
pub struct StoredImage {
    image: ImageRef,
}

impl StoredImage {
    pub fn image(&self) -> &ImageRef {
        &self.image
    }
}

impl Drop for StoredImage {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.image.path) {
            Ok(()) => debug!(path = %self.image.path.display(), "Removed upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.image.path.display(), error = %e, "Failed to remove upload"),
        }
    }
}

/// Extension and MIME type from the leading magic bytes.
pub fn sniff_image_type(bytes: &[u8]) -> (&'static str, &'static str) {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        ("png", "image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        ("jpg", "image/jpeg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        ("gif", "image/gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        ("webp", "image/webp")
    } else {
        ("bin", "application/octet-stream")
    }
}

/// Reference an image that already exists on disk, typed by its extension.
pub fn image_ref_for_path(path: &Path) -> ImageRef {
    let mime_type = mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    ImageRef::new(path, mime_type)
}

//! Local filesystem storage for uploaded recipe images.
//!
//! Files live below the configured media root and are addressed by a path
//! relative to it (`uploads/recipe/<uuid>.<ext>`), which is what the recipe
//! row stores and what `/media/` serves.

use image::{ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::web::error::{AppError, FieldErrors};

pub const RECIPE_IMAGE_DIR: &str = "uploads/recipe";
const MAX_EXTENSION_LEN: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Upload is not a valid image: {0}")]
    NotAnImage(String),
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Image validation task failed: {0}")]
    Task(String),
}

impl From<MediaError> for AppError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::NotAnImage(_) => AppError::Validation(FieldErrors::single(
                "image",
                "Upload a valid image. The file you uploaded was either not an image or a corrupted image.",
            )),
            other => AppError::Storage(other.to_string()),
        }
    }
}

/// Builds a fresh relative path for a recipe image. The original file name
/// only contributes its extension, and only when that is a short
/// alphanumeric token naming the detected format; otherwise the detected
/// format decides.
pub fn recipe_image_path(original_filename: Option<&str>, format: ImageFormat) -> String {
    let extension = original_filename
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(str::to_ascii_lowercase)
        .filter(|ext| format.extensions_str().contains(&ext.as_str()))
        .unwrap_or_else(|| {
            format
                .extensions_str()
                .first()
                .copied()
                .unwrap_or("img")
                .to_string()
        });
    format!("{RECIPE_IMAGE_DIR}/{}.{extension}", Uuid::new_v4())
}

/// Checks that `data` decodes as an image and returns its format.
pub async fn validate_image(data: Vec<u8>) -> Result<(ImageFormat, Vec<u8>), MediaError> {
    tokio::task::spawn_blocking(move || {
        let reader = ImageReader::new(Cursor::new(&data))
            .with_guessed_format()
            .map_err(|e| MediaError::NotAnImage(e.to_string()))?;
        let format = reader
            .format()
            .ok_or_else(|| MediaError::NotAnImage("unrecognized format".to_string()))?;
        reader
            .decode()
            .map_err(|e| MediaError::NotAnImage(e.to_string()))?;
        Ok((format, data))
    })
    .await
    .map_err(|e| MediaError::Task(e.to_string()))?
}

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validates and writes a recipe image, returning its relative path.
    pub async fn save_recipe_image(
        &self,
        original_filename: Option<&str>,
        data: Vec<u8>,
    ) -> Result<String, MediaError> {
        let (format, data) = validate_image(data).await?;
        let relative = recipe_image_path(original_filename, format);
        let target = self.root.join(&relative);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(|source| MediaError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&target, &data).await.map_err(|source| MediaError::Io {
            path: target.clone(),
            source,
        })?;
        debug!(path = %relative, bytes = data.len(), "Stored recipe image.");
        Ok(relative)
    }

    /// Removes a stored file. Failures are logged and otherwise ignored.
    pub async fn remove(&self, relative: &str) {
        let path = self.root.join(relative);
        if let Err(e) = fs::remove_file(&path).await {
            warn!(path = ?path, error = %e, "Failed to remove stored media file.");
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_png() -> Vec<u8> {
    let mut bytes = Vec::new();
    image::RgbImage::new(4, 4)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_uses_uploaded_extension() {
        let path = recipe_image_path(Some("example.JPG"), ImageFormat::Jpeg);
        let rest = path.strip_prefix("uploads/recipe/").unwrap();
        let (stem, ext) = rest.rsplit_once('.').unwrap();
        assert_eq!(ext, "jpg");
        assert!(Uuid::parse_str(stem).is_ok());
    }

    #[test]
    fn path_never_contains_the_uploaded_name() {
        let path = recipe_image_path(Some("../../etc/passwd.sh;rm -rf"), ImageFormat::Png);
        assert!(!path.contains("passwd"));
        assert!(path.ends_with(".png"));
        assert!(path.starts_with("uploads/recipe/"));

        let path = recipe_image_path(None, ImageFormat::Gif);
        assert!(path.ends_with(".gif"));
    }

    #[test]
    fn extension_must_match_the_detected_format() {
        let path = recipe_image_path(Some("x.html"), ImageFormat::Png);
        assert!(path.ends_with(".png"), "{path}");

        let path = recipe_image_path(Some("photo.gif"), ImageFormat::Jpeg);
        assert!(path.ends_with(".jpg"), "{path}");

        let path = recipe_image_path(Some("photo.jpeg"), ImageFormat::Jpeg);
        assert!(path.ends_with(".jpeg"), "{path}");
    }

    #[test]
    fn paths_are_unique() {
        let a = recipe_image_path(Some("a.png"), ImageFormat::Png);
        let b = recipe_image_path(Some("a.png"), ImageFormat::Png);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn rejects_non_image_bytes() {
        let err = validate_image(b"not an image".to_vec()).await.unwrap_err();
        assert!(matches!(err, MediaError::NotAnImage(_)));
    }

    #[tokio::test]
    async fn saves_and_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());

        let relative = store.save_recipe_image(Some("photo.png"), sample_png()).await.unwrap();
        let stored = dir.path().join(&relative);
        assert!(stored.exists());

        store.remove(&relative).await;
        assert!(!stored.exists());
        // Removing twice only logs.
        store.remove(&relative).await;
    }
}

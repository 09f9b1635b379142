//! Image attachments: checks that run before anything is uploaded, and the
//! object paths images are stored under.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;

use crate::error::AppError;

/// Images per item.
pub const MAX_IMAGES: usize = 10;

/// Largest accepted file, in bytes.
pub const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;

/// An image read from disk and accepted for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub name: String,
    pub extension: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// MIME type for an accepted image, by file extension.
pub fn content_type(path: &Path) -> Result<&'static str> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => Ok("image/jpeg"),
        "png" => Ok("image/png"),
        "webp" => Ok("image/webp"),
        "gif" => Ok("image/gif"),
        _ => Err(AppError::rejected(
            "Tipo de archivo no válido",
            "Solo se permiten archivos JPG, PNG, WebP y GIF",
        )
        .into()),
    }
}

pub fn check_size(len: u64) -> Result<()> {
    if len > MAX_IMAGE_BYTES {
        return Err(
            AppError::rejected("Archivo muy grande", "El archivo debe ser menor a 5MB").into(),
        );
    }
    Ok(())
}

/// An item may hold at most [`MAX_IMAGES`] images in total.
pub fn check_count(existing: usize, adding: usize) -> Result<()> {
    if existing + adding > MAX_IMAGES {
        return Err(AppError::rejected(
            "Límite de imágenes",
            format!(
                "Puedes subir máximo {} imágenes por publicación",
                MAX_IMAGES
            ),
        )
        .into());
    }
    Ok(())
}

/// Validate and read one image. Type and size are checked before the file
/// contents are read.
pub async fn load(path: &Path) -> Result<ImageFile> {
    let content_type = content_type(path)?;
    let meta = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    check_size(meta.len())?;

    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    // The file may have grown since the metadata call
    check_size(bytes.len() as u64)?;

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("image")
        .to_string();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("jpg")
        .to_lowercase();
    Ok(ImageFile {
        name,
        extension,
        content_type,
        bytes,
    })
}

/// Read every image, failing on the first one that is rejected.
pub async fn load_all(paths: &[impl AsRef<Path>]) -> Result<Vec<ImageFile>> {
    check_count(0, paths.len())?;
    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        images.push(load(path.as_ref()).await?);
    }
    Ok(images)
}

/// Storage path `<owner>/<item or "temp">/<millis>-<random>.<ext>`.
pub fn object_path(owner_id: &str, item_id: Option<&str>, extension: &str) -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}/{}/{}-{}.{}",
        owner_id,
        item_id.unwrap_or("temp"),
        Utc::now().timestamp_millis(),
        &random[..10],
        extension
    )
}

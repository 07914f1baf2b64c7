//! Product image uploads stored on the local filesystem.
//!
//! Files land in `<UPLOADS_DIR>/products/<unix ts>_<sanitised name>` and are
//! served back by the `/uploads` static route.

use std::path::{Path, PathBuf};

use axum::http::StatusCode;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::error::AppError;

/// Largest accepted upload.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Subdirectory of the uploads root holding product images.
const PRODUCTS_DIR: &str = "products";

/// Longest file name kept after sanitising.
const MAX_NAME_LEN: usize = 100;

/// Accepted content types and the extension used when the name has none.
const ALLOWED_TYPES: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/webp", "webp"),
    ("image/gif", "gif"),
];

/// Errors from storing an upload.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("File missing")]
    MissingFile,

    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("File exceeds the 10 MiB limit")]
    TooLarge,

    #[error("Upload failed: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MissingFile | Self::UnsupportedType(_) => StatusCode::BAD_REQUEST,
            Self::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::MissingFile | UploadError::UnsupportedType(_) => {
                Self::BadRequest(err.to_string())
            }
            UploadError::TooLarge => Self::PayloadTooLarge(err.to_string()),
            UploadError::Io(e) => Self::Internal(format!("upload write failed: {e}")),
        }
    }
}

/// Writes uploaded images below the uploads root.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory (served under `/uploads`).
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store a product image and return its public URL.
    ///
    /// # Errors
    ///
    /// Returns `UploadError::UnsupportedType` for non-image content types,
    /// `UploadError::TooLarge` above [`MAX_UPLOAD_BYTES`] and
    /// `UploadError::Io` if the file cannot be written.
    pub async fn save_product_image(
        &self,
        original_name: Option<&str>,
        content_type: Option<&str>,
        data: &[u8],
    ) -> Result<String, UploadError> {
        let content_type = content_type.unwrap_or_default();
        let extension = allowed_extension(content_type)
            .ok_or_else(|| UploadError::UnsupportedType(content_type.to_string()))?;
        if data.len() > MAX_UPLOAD_BYTES {
            return Err(UploadError::TooLarge);
        }

        let dir = self.root.join(PRODUCTS_DIR);
        tokio::fs::create_dir_all(&dir).await?;

        let name = sanitize_filename(original_name.unwrap_or_default(), extension);
        let timestamp = chrono::Utc::now().timestamp();
        let mut filename = format!("{timestamp}_{name}");

        let mut file = match create_new(&dir.join(&filename)).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                // Same name uploaded twice within a second
                filename = format!("{timestamp}_{}_{name}", &super::auth::generate_token()[..8]);
                create_new(&dir.join(&filename)).await?
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(data).await?;
        file.flush().await?;

        tracing::info!(file = %filename, bytes = data.len(), "Stored product image");
        Ok(format!("/uploads/{PRODUCTS_DIR}/{filename}"))
    }
}

async fn create_new(path: &Path) -> std::io::Result<tokio::fs::File> {
    tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
}

fn allowed_extension(content_type: &str) -> Option<&'static str> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    ALLOWED_TYPES
        .iter()
        .find(|(mime, _)| *mime == essence)
        .map(|(_, ext)| *ext)
}

/// Reduce a client-supplied file name to `[A-Za-z0-9._-]`.
///
/// Path components are dropped, leading dots removed and the default
/// extension appended when the result has none.
fn sanitize_filename(raw: &str, default_extension: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let mut name: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    name = name.trim_start_matches('.').to_string();

    if name.len() > MAX_NAME_LEN {
        let cut = name.len() - MAX_NAME_LEN;
        name.drain(..cut);
    }

    let stem_empty = name.split('.').next().is_none_or(str::is_empty);
    if name.is_empty() || stem_empty {
        return format!("image.{default_extension}");
    }
    if !name.contains('.') {
        name = format!("{name}.{default_extension}");
    }
    name
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_extension() {
        assert_eq!(allowed_extension("image/png"), Some("png"));
        assert_eq!(allowed_extension("IMAGE/JPEG"), Some("jpg"));
        assert_eq!(allowed_extension("image/webp; charset=binary"), Some("webp"));
        assert_eq!(allowed_extension("image/svg+xml"), None);
        assert_eq!(allowed_extension("text/html"), None);
        assert_eq!(allowed_extension(""), None);
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("canapea alba.jpg", "jpg"), "canapea_alba.jpg");
        assert_eq!(sanitize_filename("../../etc/passwd", "png"), "passwd.png");
        assert_eq!(sanitize_filename("C:\\photos\\masa.webp", "webp"), "masa.webp");
        assert_eq!(sanitize_filename(".htaccess", "png"), "htaccess.png");
        assert_eq!(sanitize_filename("", "gif"), "image.gif");
        assert_eq!(sanitize_filename("scaun-ș.png", "png"), "scaun-_.png");
    }

    #[test]
    fn test_sanitize_filename_truncates() {
        let long = format!("{}.png", "a".repeat(300));
        let name = sanitize_filename(&long, "png");
        assert_eq!(name.len(), MAX_NAME_LEN);
        assert!(name.ends_with(".png"));
    }

    #[tokio::test]
    async fn test_save_product_image() {
        let root = std::env::temp_dir().join(format!("simonia-uploads-{}", std::process::id()));
        let store = UploadStore::new(&root);

        let url = store
            .save_product_image(Some("pat.png"), Some("image/png"), b"\x89PNG")
            .await
            .unwrap();
        assert!(url.starts_with("/uploads/products/"));
        assert!(url.ends_with("_pat.png"));

        let stored = root.join(url.trim_start_matches("/uploads/"));
        assert_eq!(tokio::fs::read(&stored).await.unwrap(), b"\x89PNG");

        // Same name again in the same second still gets its own file
        let second = store
            .save_product_image(Some("pat.png"), Some("image/png"), b"\x89PNG")
            .await
            .unwrap();
        assert_ne!(url, second);

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }

    #[tokio::test]
    async fn test_save_rejects_non_images() {
        let store = UploadStore::new(std::env::temp_dir());
        let err = store
            .save_product_image(Some("x.html"), Some("text/html"), b"<script>")
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::UnsupportedType(_)));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}

//! Local object store for uploaded files.
//!
//! Files live under a configured root directory as `root/<folder>/<file>` and
//! are addressed externally by a public path of the form
//! `/uploads/<folder>/<file>`. Every operation that takes a caller-influenced
//! path resolves it lexically and refuses anything that would escape the root.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::info;
use uuid::Uuid;

/// Public prefix under which stored objects are exposed over HTTP.
pub const PUBLIC_PREFIX: &str = "/uploads/";

/// Upload size ceiling (100 MB).
pub const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Declared content types accepted for document uploads.
pub const PDF_CONTENT_TYPES: &[&str] = &["application/pdf"];

/// Declared content types accepted for image uploads.
pub const IMAGE_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/png"];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("content type '{0}' is not allowed")]
    InvalidContentType(String),
    #[error("file size {size} bytes exceeds the {limit} byte limit")]
    SizeLimitExceeded { size: usize, limit: usize },
    #[error("path resolves outside the store root")]
    Forbidden,
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Filesystem-backed object store rooted at a configured directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a store key (optionally carrying the `/uploads/` prefix) to an
    /// on-disk path, failing with [`StoreError::Forbidden`] if the key would
    /// escape the root.
    pub fn resolve(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = normalize_key(strip_public_prefix(key))?;
        Ok(self.root.join(relative))
    }

    /// Validate and persist an uploaded file, returning its public path.
    ///
    /// The stored filename is `explicit_name` (basename only) when supplied,
    /// otherwise `<uuid>_<original_name>`. A write to an existing name
    /// overwrites it. Validation failures happen before any filesystem
    /// mutation.
    #[allow(clippy::too_many_arguments)]
    pub async fn put(
        &self,
        data: &[u8],
        content_type: &str,
        original_name: &str,
        folder: &str,
        explicit_name: Option<&str>,
        allowed_types: &[&str],
        max_size: usize,
    ) -> Result<String, StoreError> {
        if !allowed_types.iter().any(|t| *t == content_type) {
            return Err(StoreError::InvalidContentType(content_type.to_string()));
        }
        if data.len() > max_size {
            return Err(StoreError::SizeLimitExceeded {
                size: data.len(),
                limit: max_size,
            });
        }

        let folder_rel = normalize_key(strip_public_prefix(folder))?;
        let file_name = match explicit_name {
            Some(name) => basename(name)?,
            None => format!("{}_{}", Uuid::new_v4(), basename(original_name)?),
        };

        let dir = self.root.join(&folder_rel);
        fs::create_dir_all(&dir).await?;

        let path = dir.join(&file_name);
        fs::write(&path, data).await?;

        let public_path = format!(
            "{}{}/{}",
            PUBLIC_PREFIX,
            folder_rel.display(),
            file_name
        );

        info!(
            path = %path.display(),
            url = %public_path,
            size_bytes = data.len(),
            "stored uploaded file"
        );

        Ok(public_path)
    }

    /// Read a stored object's bytes.
    pub async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.resolve(key)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(fs::read(&path).await?),
            Ok(_) => Err(StoreError::NotFound(key.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a stored object.
    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.resolve(key)?;
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StoreError::NotFound(key.to_string()));
        }
        fs::remove_file(&path).await?;
        info!(path = %path.display(), key = %key, "deleted stored file");
        Ok(())
    }

    /// List the regular files directly under a folder as `folder/name` keys.
    ///
    /// A missing folder yields an empty list, not an error. Subdirectories
    /// are skipped; listing is non-recursive.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let folder_rel = normalize_key(strip_public_prefix(prefix))?;
        let dir = self.root.join(&folder_rel);

        if !fs::try_exists(&dir).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_file() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if folder_rel.as_os_str().is_empty() {
                    files.push(name);
                } else {
                    files.push(format!("{}/{}", folder_rel.display(), name));
                }
            }
        }

        Ok(files)
    }
}

fn strip_public_prefix(key: &str) -> &str {
    key.strip_prefix(PUBLIC_PREFIX).unwrap_or(key)
}

/// Lexically normalize a relative key, rejecting absolute fragments and any
/// `..` sequence that would climb past the key's own top.
fn normalize_key(key: &str) -> Result<PathBuf, StoreError> {
    let mut resolved = PathBuf::new();
    for component in Path::new(key).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    return Err(StoreError::Forbidden);
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(StoreError::Forbidden),
        }
    }
    Ok(resolved)
}

/// Reduce a caller-supplied filename to its final component.
fn basename(name: &str) -> Result<String, StoreError> {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or(StoreError::Forbidden)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store(dir: &tempfile::TempDir) -> LocalStore {
        LocalStore::new(dir.path())
    }

    #[tokio::test]
    async fn put_then_get_returns_identical_bytes() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let data = b"\x89PNG\r\n\x1a\nrest".to_vec();

        let url = store
            .put(&data, "image/png", "a.png", "images", None, IMAGE_CONTENT_TYPES, MAX_UPLOAD_BYTES)
            .await
            .unwrap();

        assert!(url.starts_with("/uploads/images/"));
        assert!(url.ends_with("_a.png"));
        assert_eq!(store.get(&url).await.unwrap(), data);
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let dir = tempdir().unwrap();
        let store = store(&dir);

        let url = store
            .put(b"pdf", "application/pdf", "doc.pdf", "pdfs", None, PDF_CONTENT_TYPES, MAX_UPLOAD_BYTES)
            .await
            .unwrap();

        store.delete(&url).await.unwrap();
        assert!(matches!(store.get(&url).await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete(&url).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn traversal_is_forbidden_on_every_operation() {
        let dir = tempdir().unwrap();
        let store = store(&dir);

        assert!(matches!(
            store.get("../../../etc/passwd").await,
            Err(StoreError::Forbidden)
        ));
        assert!(matches!(
            store.delete("pdfs/../../escape.txt").await,
            Err(StoreError::Forbidden)
        ));
        assert!(matches!(
            store.list("../outside").await,
            Err(StoreError::Forbidden)
        ));
        assert!(matches!(
            store
                .put(b"x", "application/pdf", "a.pdf", "../escape", None, PDF_CONTENT_TYPES, MAX_UPLOAD_BYTES)
                .await,
            Err(StoreError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn absolute_keys_are_forbidden() {
        let dir = tempdir().unwrap();
        let store = store(&dir);

        assert!(matches!(store.get("/etc/passwd").await, Err(StoreError::Forbidden)));
        // `..` inside a key is fine as long as it never climbs past the top.
        assert!(matches!(
            store.get("a/../b.txt").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_of_missing_folder_is_empty() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        assert!(store.list("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_skips_subdirectories() {
        let dir = tempdir().unwrap();
        let store = store(&dir);

        store
            .put(b"a", "image/png", "a.png", "images", Some("a.png"), IMAGE_CONTENT_TYPES, MAX_UPLOAD_BYTES)
            .await
            .unwrap();
        std::fs::create_dir_all(dir.path().join("images/nested")).unwrap();

        let files = store.list("images").await.unwrap();
        assert_eq!(files, vec!["images/a.png".to_string()]);
    }

    #[tokio::test]
    async fn rejected_content_type_writes_nothing() {
        let dir = tempdir().unwrap();
        let store = store(&dir);

        let err = store
            .put(b"hi", "text/plain", "a.txt", "pdfs", None, PDF_CONTENT_TYPES, MAX_UPLOAD_BYTES)
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::InvalidContentType(_)));
        assert!(!dir.path().join("pdfs").exists());
    }

    #[tokio::test]
    async fn oversized_upload_writes_nothing() {
        let dir = tempdir().unwrap();
        let store = store(&dir);

        let err = store
            .put(&[0u8; 32], "application/pdf", "a.pdf", "pdfs", None, PDF_CONTENT_TYPES, 16)
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::SizeLimitExceeded { size: 32, limit: 16 }));
        assert!(!dir.path().join("pdfs").exists());
    }

    #[tokio::test]
    async fn public_prefix_and_relative_key_are_interchangeable() {
        let dir = tempdir().unwrap();
        let store = store(&dir);

        let url = store
            .put(b"bytes", "image/jpeg", "p.jpg", "images", Some("p.jpg"), IMAGE_CONTENT_TYPES, MAX_UPLOAD_BYTES)
            .await
            .unwrap();

        assert_eq!(url, "/uploads/images/p.jpg");
        assert_eq!(store.get("/uploads/images/p.jpg").await.unwrap(), b"bytes");
        assert_eq!(store.get("images/p.jpg").await.unwrap(), b"bytes");
    }

    #[tokio::test]
    async fn explicit_name_overwrites_existing_file() {
        let dir = tempdir().unwrap();
        let store = store(&dir);

        store
            .put(b"first", "application/pdf", "d.pdf", "pdfs", Some("d.pdf"), PDF_CONTENT_TYPES, MAX_UPLOAD_BYTES)
            .await
            .unwrap();
        store
            .put(b"second", "application/pdf", "d.pdf", "pdfs", Some("d.pdf"), PDF_CONTENT_TYPES, MAX_UPLOAD_BYTES)
            .await
            .unwrap();

        assert_eq!(store.get("pdfs/d.pdf").await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn explicit_name_is_reduced_to_its_basename() {
        let dir = tempdir().unwrap();
        let store = store(&dir);

        let url = store
            .put(b"x", "image/png", "x.png", "images", Some("sub/dir/x.png"), IMAGE_CONTENT_TYPES, MAX_UPLOAD_BYTES)
            .await
            .unwrap();

        assert_eq!(url, "/uploads/images/x.png");
    }
}

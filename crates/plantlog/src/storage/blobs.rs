//! Filesystem object storage.
//!
//! Objects live at `<root>/<bucket>/<name>`. Bucket and object names are
//! restricted to a safe character set so they can never escape the root.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::backend::Blobs;
use crate::error::{Error, Result};

fn safe_name() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,254}$").expect("static regex is valid")
    })
}

/// Object storage backed by a local directory.
#[derive(Debug, Clone)]
pub struct FsBlobs {
    root: PathBuf,
    public_base_url: String,
}

impl FsBlobs {
    /// Store objects under `root`; public URLs are built from
    /// `public_base_url`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        let public_base_url = public_base_url.into().trim_end_matches('/').to_string();
        Self {
            root: root.into(),
            public_base_url,
        }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, name: &str) -> Result<PathBuf> {
        for part in [bucket, name] {
            if !safe_name().is_match(part) {
                return Err(Error::validation(format!("invalid object name: {part:?}")));
            }
        }
        Ok(self.root.join(bucket).join(name))
    }
}

#[async_trait::async_trait]
impl Blobs for FsBlobs {
    async fn upload(
        &self,
        bucket: &str,
        name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<()> {
        let path = self.object_path(bucket, name)?;
        let to_upload_error = |source: std::io::Error| Error::BlobUpload {
            bucket: bucket.to_string(),
            name: name.to_string(),
            source,
        };

        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(to_upload_error)?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(to_upload_error)?;

        debug!(
            "Stored {} bytes of {} at {}",
            bytes.len(),
            content_type,
            path.display()
        );
        Ok(())
    }

    async fn download(&self, bucket: &str, name: &str) -> Result<Vec<u8>> {
        let path = self.object_path(bucket, name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::not_found("object", format!("{bucket}/{name}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn public_url(&self, bucket: &str, name: &str) -> String {
        format!("{}/storage/{bucket}/{name}", self.public_base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_blobs(tag: &str) -> FsBlobs {
        let root = std::env::temp_dir().join(format!(
            "plantlog_blobs_{tag}_{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&root);
        FsBlobs::new(root, "http://localhost:3000/")
    }

    #[test]
    fn test_public_url() {
        let blobs = FsBlobs::new("/tmp/x", "https://plants.example.com/");
        assert_eq!(
            blobs.public_url("observations", "1_photo.png"),
            "https://plants.example.com/storage/observations/1_photo.png"
        );
    }

    #[test]
    fn test_rejects_traversal() {
        let blobs = FsBlobs::new("/tmp/x", "http://localhost");
        assert!(blobs.object_path("observations", "../secret").is_err());
        assert!(blobs.object_path("..", "photo.png").is_err());
        assert!(blobs.object_path("observations", "a/b.png").is_err());
        assert!(blobs.object_path("observations", "").is_err());
        assert!(blobs.object_path("observations", "1_photo.png").is_ok());
    }

    #[tokio::test]
    async fn test_upload_and_download() {
        let blobs = temp_blobs("roundtrip");
        blobs
            .upload("observations", "1_photo.png", b"\x89PNG", "image/png")
            .await
            .unwrap();

        let bytes = blobs.download("observations", "1_photo.png").await.unwrap();
        assert_eq!(bytes, b"\x89PNG");
        assert!(blobs.root().join("observations/1_photo.png").exists());

        let _ = std::fs::remove_dir_all(blobs.root());
    }

    #[tokio::test]
    async fn test_upload_overwrites() {
        let blobs = temp_blobs("overwrite");
        blobs.upload("b", "x.png", b"one", "image/png").await.unwrap();
        blobs.upload("b", "x.png", b"two", "image/png").await.unwrap();
        assert_eq!(blobs.download("b", "x.png").await.unwrap(), b"two");

        let _ = std::fs::remove_dir_all(blobs.root());
    }

    #[tokio::test]
    async fn test_download_missing() {
        let blobs = temp_blobs("missing");
        let err = blobs.download("observations", "nope.png").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "object", .. }));
    }
}

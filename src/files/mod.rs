use axum::body::Bytes;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::config::FilesConfig;
use crate::database::{Document, StoreError, StoreTransaction};

pub const FILE_DOCTYPE: &str = "File";

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("File too large: {size} bytes (limit {limit})")]
    TooLarge { size: usize, limit: usize },

    #[error("Uploaded file is empty")]
    Empty,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A file part received with the request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// An upload written under a temporary name. It becomes visible at its final
/// path only once the request's transaction commits.
#[derive(Debug)]
pub struct StagedFile {
    staged: PathBuf,
    target: PathBuf,
}

impl StagedFile {
    pub fn target(&self) -> &Path {
        &self.target
    }

    pub async fn publish(self) -> Result<(), std::io::Error> {
        tokio::fs::rename(&self.staged, &self.target).await
    }

    pub async fn discard(self) {
        if let Err(e) = tokio::fs::remove_file(&self.staged).await {
            tracing::warn!("Could not remove staged upload {}: {}", self.staged.display(), e);
        }
    }
}

/// Records uploads as `File` documents attached to another document and
/// stages their bytes on disk.
#[derive(Debug, Clone)]
pub struct AttachmentService {
    upload_dir: PathBuf,
    max_upload_bytes: usize,
}

impl AttachmentService {
    pub fn new(config: &FilesConfig) -> Self {
        Self {
            upload_dir: config.upload_dir.clone(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    pub async fn attach(
        &self,
        tx: &mut dyn StoreTransaction,
        file: &UploadedFile,
        doctype: &str,
        name: &str,
        owner: &str,
    ) -> Result<(Document, StagedFile), AttachmentError> {
        if file.bytes.is_empty() {
            return Err(AttachmentError::Empty);
        }
        if file.bytes.len() > self.max_upload_bytes {
            return Err(AttachmentError::TooLarge {
                size: file.bytes.len(),
                limit: self.max_upload_bytes,
            });
        }

        let file_name = sanitize_file_name(&file.file_name);
        let stored_name = format!("{}-{}", Uuid::new_v4(), file_name);

        let mut hasher = Sha256::new();
        hasher.update(&file.bytes);

        let doc = Document::new(FILE_DOCTYPE)
            .with("file_name", file_name)
            .with("file_url", format!("/private/files/{}", stored_name))
            .with("file_size", file.bytes.len())
            .with("content_type", file.content_type.clone())
            .with("content_hash", format!("{:x}", hasher.finalize()))
            .with("attached_to_doctype", doctype)
            .with("attached_to_name", name)
            .with("is_private", 1)
            .with("owner", owner);

        let doc = tx.insert(doc).await?;

        let staged = StagedFile {
            staged: self.upload_dir.join(format!(".{}.part", stored_name)),
            target: self.upload_dir.join(&stored_name),
        };
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        if let Err(e) = tokio::fs::write(&staged.staged, &file.bytes).await {
            staged.discard().await;
            return Err(e.into());
        }

        tracing::info!("Attached {} to {} {}", doc.name, doctype, name);
        Ok((doc, staged))
    }
}

/// Keep the base name only, with anything outside `[A-Za-z0-9._-]` replaced.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{DocumentStore, MemoryStore};

    fn service(limit: usize) -> (AttachmentService, PathBuf) {
        let dir = std::env::temp_dir().join(format!("ess-files-{}", Uuid::new_v4().simple()));
        let service = AttachmentService::new(&FilesConfig {
            upload_dir: dir.clone(),
            max_upload_bytes: limit,
        });
        (service, dir)
    }

    #[test]
    fn sanitizes_paths_and_odd_characters() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\receipts\\taxi fare.pdf"), "taxi_fare.pdf");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name(""), "upload");
    }

    #[tokio::test]
    async fn attaches_file_to_document() {
        let (service, dir) = service(1024);
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let upload = UploadedFile {
            file_name: "receipt.png".into(),
            content_type: Some("image/png".into()),
            bytes: Bytes::from_static(b"png-bytes"),
        };

        let (doc, staged) = service
            .attach(tx.as_mut(), &upload, "Expense Claim", "EC-1", "a@example.com")
            .await
            .unwrap();
        assert_eq!(doc.get_str("attached_to_name"), Some("EC-1"));
        assert_eq!(doc.get_str("file_name"), Some("receipt.png"));

        let url = doc.get_str("file_url").unwrap();
        let stored_name = url.rsplit('/').next().unwrap();
        // uuid, hyphen, original name
        assert_eq!(stored_name.len(), 36 + 1 + "receipt.png".len());
        let stored = dir.join(stored_name);
        assert_eq!(staged.target(), stored.as_path());
        assert!(!stored.exists());

        staged.publish().await.unwrap();
        assert_eq!(tokio::fs::read(&stored).await.unwrap(), b"png-bytes");
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn discarded_upload_leaves_nothing_behind() {
        let (service, dir) = service(1024);
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let upload = UploadedFile {
            file_name: "receipt.png".into(),
            content_type: None,
            bytes: Bytes::from_static(b"png-bytes"),
        };

        let (_, staged) = service
            .attach(tx.as_mut(), &upload, "Expense Claim", "EC-1", "a@example.com")
            .await
            .unwrap();
        staged.discard().await;

        let mut entries = tokio::fs::read_dir(&dir).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn rejects_oversized_upload() {
        let (service, _dir) = service(4);
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let upload = UploadedFile {
            file_name: "big.bin".into(),
            content_type: None,
            bytes: Bytes::from_static(b"0123456789"),
        };
        let err = service
            .attach(tx.as_mut(), &upload, "Expense Claim", "EC-1", "a@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, AttachmentError::TooLarge { size: 10, limit: 4 }));
    }
}

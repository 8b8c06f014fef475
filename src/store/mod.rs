//! Per-user image storage
//!
//! Images live on disk under two roots (generated and uploaded), each
//! partitioned by user id:
//! - Collision-free names (UTC timestamp + process-wide counter)
//! - Atomic commit (write a temp sibling, then rename)
//! - `list` reflects only completed writes

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::session::UserId;

/// How a stored image entered the system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// Output of a text-to-image or transform request
    Generated,
    /// Raw user-supplied source image
    Uploaded,
}

impl ImageKind {
    /// Short label used in logs and replies
    pub fn label(&self) -> &'static str {
        match self {
            ImageKind::Generated => "generated",
            ImageKind::Uploaded => "uploaded",
        }
    }
}

/// A committed image on disk
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub owner: UserId,
    pub kind: ImageKind,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Filesystem-backed image store
#[derive(Debug)]
pub struct AssetStore {
    generated_root: PathBuf,
    uploaded_root: PathBuf,
    /// Monotonic suffix so same-instant saves never collide
    seq: AtomicU64,
}

impl AssetStore {
    /// Create a store over the two image roots
    pub fn new(generated_root: impl Into<PathBuf>, uploaded_root: impl Into<PathBuf>) -> Self {
        Self {
            generated_root: generated_root.into(),
            uploaded_root: uploaded_root.into(),
            seq: AtomicU64::new(0),
        }
    }

    fn root(&self, kind: ImageKind) -> &Path {
        match kind {
            ImageKind::Generated => &self.generated_root,
            ImageKind::Uploaded => &self.uploaded_root,
        }
    }

    fn user_dir(&self, user_id: UserId, kind: ImageKind) -> PathBuf {
        self.root(kind).join(user_id.to_string())
    }

    /// Persist an image for a user.
    ///
    /// The write is all-or-nothing: bytes go to a temp sibling first and
    /// the final name appears only after a successful rename.
    pub async fn save(
        &self,
        user_id: UserId,
        kind: ImageKind,
        bytes: &[u8],
    ) -> Result<StoredImage, StorageError> {
        let dir = self.user_dir(user_id, kind);
        tokio::fs::create_dir_all(&dir).await?;

        let created_at = Utc::now();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{:06}.png", created_at.format("%Y%m%dT%H%M%S%3f"), seq);
        let path = dir.join(&name);
        let tmp = dir.join(format!("{}.tmp", name));

        tokio::fs::write(&tmp, bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            warn!(user_id, path = %path.display(), "rename failed, removing temp file");
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(
            user_id,
            kind = kind.label(),
            path = %path.display(),
            size = bytes.len(),
            "stored image"
        );

        Ok(StoredImage {
            owner: user_id,
            kind,
            path,
            created_at,
        })
    }

    /// List all committed images for a user, both kinds, oldest first.
    pub async fn list(&self, user_id: UserId) -> Result<Vec<StoredImage>, StorageError> {
        let mut images = Vec::new();
        for kind in [ImageKind::Generated, ImageKind::Uploaded] {
            self.list_kind(user_id, kind, &mut images).await?;
        }
        images.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
        Ok(images)
    }

    async fn list_kind(
        &self,
        user_id: UserId,
        kind: ImageKind,
        out: &mut Vec<StoredImage>,
    ) -> Result<(), StorageError> {
        let dir = self.user_dir(user_id, kind);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            // No directory yet means no saves yet
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            // In-flight temp files are not part of the store
            if path.extension().and_then(|e| e.to_str()) != Some("png") {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let created_at = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            out.push(StoredImage {
                owner: user_id,
                kind,
                path,
                created_at,
            });
        }
        Ok(())
    }
}

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use favsync_core::BookmarkNode;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::paths::write_atomic;

pub const SNAPSHOT_FILE: &str = "bookmarks.json";

pub type Forest = Vec<BookmarkNode>;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The last enriched forest: a JSON file on disk plus the in-memory copy
/// that is served. The in-memory `Arc` is only replaced after the file
/// write succeeded.
pub struct SnapshotStore {
    path: PathBuf,
    cached: RwLock<Option<Arc<Forest>>>,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn cached(&self) -> Option<Arc<Forest>> {
        self.cached.read().await.clone()
    }

    /// Reads the durable copy and makes it the served one. A missing or
    /// unparsable file yields `None` and leaves the cache as it was.
    pub async fn load(&self) -> Option<Arc<Forest>> {
        let forest = match read_forest(&self.path).await {
            Ok(forest) => Arc::new(forest),
            Err(SnapshotError::Io(err)) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "bookmark snapshot unreadable"
                );
                return None;
            }
        };
        info!(
            path = %self.path.display(),
            roots = forest.len(),
            "bookmark snapshot loaded"
        );
        *self.cached.write().await = Some(Arc::clone(&forest));
        Some(forest)
    }

    pub async fn save(&self, forest: Forest) -> Result<Arc<Forest>, SnapshotError> {
        let encoded = serde_json::to_vec_pretty(&forest)?;
        write_atomic(&self.path, &encoded).await?;
        let forest = Arc::new(forest);
        *self.cached.write().await = Some(Arc::clone(&forest));
        info!(path = %self.path.display(), roots = forest.len(), "bookmark snapshot saved");
        Ok(forest)
    }

    pub async fn is_empty(&self) -> bool {
        match read_forest(&self.path).await {
            Ok(forest) => forest.is_empty(),
            Err(_) => true,
        }
    }
}

async fn read_forest(path: &Path) -> Result<Forest, SnapshotError> {
    let data = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&data)?)
}

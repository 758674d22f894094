use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::sync::paths::write_atomic;

pub const FAVORITES_FILE: &str = "favorites.json";

#[derive(Debug, Error)]
pub enum FavoritesError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    pub url: String,
    pub title: String,
    pub favicon_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Flat, user-curated list of favorites mirrored to a JSON file.
/// Every mutation is written out before it becomes visible.
pub struct FavoritesStore {
    path: PathBuf,
    entries: Mutex<Vec<Favorite>>,
}

impl FavoritesStore {
    /// Loads the list at `path`, creating an empty file when there is none.
    /// An unreadable file is logged and treated as empty.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, FavoritesError> {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(data) => match serde_json::from_slice(&data) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "favorites file unreadable");
                    Vec::new()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                write_atomic(&path, b"[]").await?;
                Vec::new()
            }
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn list(&self) -> Vec<Favorite> {
        self.entries.lock().await.clone()
    }

    /// Returns false without writing when the URL is already a favorite.
    pub async fn add(&self, favorite: Favorite) -> Result<bool, FavoritesError> {
        let mut entries = self.entries.lock().await;
        if entries.iter().any(|existing| existing.url == favorite.url) {
            return Ok(false);
        }
        let mut updated = entries.clone();
        debug!(url = %favorite.url, "favorite added");
        updated.push(favorite);
        self.persist(&updated).await?;
        *entries = updated;
        Ok(true)
    }

    pub async fn remove(&self, url: &str) -> Result<bool, FavoritesError> {
        let mut entries = self.entries.lock().await;
        let updated: Vec<_> = entries
            .iter()
            .filter(|favorite| favorite.url != url)
            .cloned()
            .collect();
        if updated.len() == entries.len() {
            return Ok(false);
        }
        self.persist(&updated).await?;
        *entries = updated;
        Ok(true)
    }

    /// Points the favorite for `url` at a new icon. No-op when absent.
    pub async fn update_location(
        &self,
        url: &str,
        location: &str,
    ) -> Result<bool, FavoritesError> {
        let mut entries = self.entries.lock().await;
        let Some(index) = entries.iter().position(|favorite| favorite.url == url) else {
            return Ok(false);
        };
        let mut updated = entries.clone();
        updated[index].favicon_url = location.to_string();
        updated[index].location = Some(location.to_string());
        self.persist(&updated).await?;
        *entries = updated;
        Ok(true)
    }

    async fn persist(&self, entries: &[Favorite]) -> Result<(), FavoritesError> {
        let encoded = serde_json::to_vec_pretty(entries)?;
        write_atomic(&self.path, &encoded).await?;
        Ok(())
    }
}

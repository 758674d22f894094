use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use favsync_core::{DEFAULT_ICON_LOCATION, FOLDER_ICON_LOCATION, ICON_EXTENSIONS, extension_for};
use thiserror::Error;
use tracing::{debug, info};

use super::paths::{
    hash_prefix, icon_file_name, icon_hash, icon_location, partial_path, write_atomic,
};

pub const DEFAULT_ICON_FILE: &str = "default-icon.png";
pub const FOLDER_ICON_FILE: &str = "folder-icon.png";

const DEFAULT_ICON_BYTES: &[u8] = include_bytes!("../../assets/default-icon.png");
const FOLDER_ICON_BYTES: &[u8] = include_bytes!("../../assets/folder-icon.png");

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultIcon {
    Bookmark,
    Folder,
}

impl DefaultIcon {
    pub fn file_name(self) -> &'static str {
        match self {
            DefaultIcon::Bookmark => DEFAULT_ICON_FILE,
            DefaultIcon::Folder => FOLDER_ICON_FILE,
        }
    }

    pub fn location(self) -> &'static str {
        match self {
            DefaultIcon::Bookmark => DEFAULT_ICON_LOCATION,
            DefaultIcon::Folder => FOLDER_ICON_LOCATION,
        }
    }

    fn bytes(self) -> &'static [u8] {
        match self {
            DefaultIcon::Bookmark => DEFAULT_ICON_BYTES,
            DefaultIcon::Folder => FOLDER_ICON_BYTES,
        }
    }
}

fn is_reserved(file_name: &str) -> bool {
    file_name == DEFAULT_ICON_FILE || file_name == FOLDER_ICON_FILE
}

fn has_icon_extension(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ICON_EXTENSIONS.contains(&ext))
}

/// Icon files keyed by the hash of the bookmark URL they belong to.
/// At most one `{hash}.{ext}` exists per URL.
#[derive(Debug, Clone)]
pub struct IconStore {
    root: PathBuf,
}

impl IconStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn init(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.root).await?;
        for kind in [DefaultIcon::Bookmark, DefaultIcon::Folder] {
            self.reserve_default(kind).await?;
        }
        Ok(())
    }

    /// Writes the bundled default image unless a file with that name exists.
    /// Returns whether anything was written.
    pub async fn reserve_default(&self, kind: DefaultIcon) -> Result<bool, StoreError> {
        let target = self.root.join(kind.file_name());
        if tokio::fs::try_exists(&target).await? {
            return Ok(false);
        }
        write_atomic(&target, kind.bytes()).await?;
        info!(file = kind.file_name(), "default icon installed");
        Ok(true)
    }

    /// Stores `bytes` as the icon of `url`. The new file is renamed into
    /// place before other extensions for the same hash are removed, so a
    /// failed write keeps the previous icon intact.
    pub async fn put(
        &self,
        url: &str,
        bytes: &[u8],
        content_type: Option<&str>,
    ) -> Result<String, StoreError> {
        let hash = icon_hash(url);
        let file_name = icon_file_name(&hash, extension_for(content_type));
        let target = self.root.join(&file_name);
        let partial = partial_path(&target);

        if let Err(err) = tokio::fs::write(&partial, bytes).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(err.into());
        }
        if let Err(err) = tokio::fs::rename(&partial, &target).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(err.into());
        }
        for existing in self.files_for_hash(&hash).await? {
            if existing == file_name || !has_icon_extension(&existing) {
                continue;
            }
            remove_if_present(&self.root.join(&existing)).await?;
        }

        debug!(url, file = %file_name, "icon stored");
        Ok(icon_location(&file_name))
    }

    /// Location of the icon currently stored for `url`, if any.
    pub async fn exists(&self, url: &str) -> Result<Option<String>, StoreError> {
        let hash = icon_hash(url);
        Ok(self
            .files_for_hash(&hash)
            .await?
            .into_iter()
            .find(|name| has_icon_extension(name))
            .map(|name| icon_location(&name)))
    }

    pub async fn delete(&self, url: &str) -> Result<usize, StoreError> {
        let hash = icon_hash(url);
        let mut removed = 0;
        for name in self.files_for_hash(&hash).await? {
            if remove_if_present(&self.root.join(&name)).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Regular file names in the store, sorted.
    pub async fn list_all(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    /// Deletes every icon whose hash is not derived from one of `active_urls`.
    /// The reserved defaults are never touched. Returns the number removed.
    pub async fn cleanup<I, S>(&self, active_urls: I) -> Result<usize, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let active: HashSet<String> = active_urls
            .into_iter()
            .map(|url| icon_hash(url.as_ref()))
            .collect();
        let mut removed = 0;
        for name in self.list_all().await? {
            if is_reserved(&name) || active.contains(hash_prefix(&name)) {
                continue;
            }
            if remove_if_present(&self.root.join(&name)).await? {
                debug!(file = %name, "orphaned icon removed");
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn files_for_hash(&self, hash: &str) -> Result<Vec<String>, StoreError> {
        let prefix = format!("{hash}.");
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .filter(|name| name.starts_with(&prefix))
            .collect())
    }
}

async fn remove_if_present(path: &Path) -> Result<bool, StoreError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

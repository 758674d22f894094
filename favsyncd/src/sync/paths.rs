use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

pub const ICON_ROUTE_PREFIX: &str = "/favicons";

const HASH_BYTES: usize = 16;

/// Stable 128-bit key for a bookmark URL: the first half of its SHA-256,
/// lowercase hex. Survives restarts, so stored icons stay addressable.
pub fn icon_hash(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    digest[..HASH_BYTES]
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

pub fn icon_file_name(hash: &str, extension: &str) -> String {
    format!("{hash}.{extension}")
}

pub fn icon_location(file_name: &str) -> String {
    format!("{ICON_ROUTE_PREFIX}/{file_name}")
}

/// Everything before the first `.` of a stored file name.
pub fn hash_prefix(file_name: &str) -> &str {
    file_name.split('.').next().unwrap_or(file_name)
}

pub fn partial_path(target: &Path) -> PathBuf {
    target.with_extension(format!(
        "{}partial",
        target
            .extension()
            .map(|ext| format!("{}.", ext.to_string_lossy()))
            .unwrap_or_default()
    ))
}

/// Writes the whole buffer next to `target`, syncs it, then renames over
/// `target`. Readers see either the old file or the new one.
pub async fn write_atomic(target: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let partial = partial_path(target);
    let mut file = tokio::fs::File::create(&partial).await?;
    if let Err(err) = write_and_sync(&mut file, bytes).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(err);
    }
    drop(file);
    if let Err(err) = tokio::fs::rename(&partial, target).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(err);
    }
    Ok(())
}

async fn write_and_sync(file: &mut tokio::fs::File, bytes: &[u8]) -> io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

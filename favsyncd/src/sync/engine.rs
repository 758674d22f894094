use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use favsync_core::{IconClient, IconError, bookmark_urls};
use futures_util::future::join_all;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::diff::{
    Classification, annotate, classify, previous_map, relocate, resolve_locations, titles_by_url,
};
use super::icon_store::{IconStore, StoreError};
use super::obsolete::{ObsoleteBookmark, ObsoleteRegistry, build_obsolete};
use super::snapshot::{Forest, SNAPSHOT_FILE, SnapshotError, SnapshotStore};
use super::source::{BookmarkSource, DocumentParser, SourceError};
use super::stats::{IconStats, IconStatsSnapshot, SyncReport};
use crate::favorites::{FavoritesError, FavoritesStore};

pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const ICON_DIR: &str = "favicons";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("bookmark source unavailable: {0}")]
    SourceUnavailable(#[from] SourceError),
    #[error("snapshot persistence failed: {0}")]
    PersistenceFailure(#[from] SnapshotError),
    #[error("icon store error: {0}")]
    Store(#[from] StoreError),
    #[error("favorites error: {0}")]
    Favorites(#[from] FavoritesError),
    #[error("no bookmark or favorite has url {0}")]
    UnknownUrl(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    FetchingSource,
    Diffing,
    AcquiringIcons,
    Annotating,
    Persisting,
    CleaningUp,
    Failed,
}

impl SyncPhase {
    const ALL: [SyncPhase; 8] = [
        SyncPhase::Idle,
        SyncPhase::FetchingSource,
        SyncPhase::Diffing,
        SyncPhase::AcquiringIcons,
        SyncPhase::Annotating,
        SyncPhase::Persisting,
        SyncPhase::CleaningUp,
        SyncPhase::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::FetchingSource => "fetching_source",
            SyncPhase::Diffing => "diffing",
            SyncPhase::AcquiringIcons => "acquiring_icons",
            SyncPhase::Annotating => "annotating",
            SyncPhase::Persisting => "persisting",
            SyncPhase::CleaningUp => "cleaning_up",
            SyncPhase::Failed => "failed",
        }
    }

    fn to_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(value: u8) -> Self {
        Self::ALL
            .get(usize::from(value))
            .copied()
            .unwrap_or(SyncPhase::Failed)
    }
}

#[derive(Debug, Error)]
enum AcquireFailure {
    #[error(transparent)]
    Fetch(IconError),
    #[error("icon fetched but not stored: {0}")]
    Store(StoreError),
}

#[derive(Debug, Default)]
struct AcquireOutcome {
    acquired: HashMap<String, String>,
    unreachable: Vec<String>,
    failed: usize,
}

pub struct SyncEngine {
    source: Box<dyn BookmarkSource>,
    parser: Box<dyn DocumentParser>,
    icons: IconClient,
    store: IconStore,
    snapshot: SnapshotStore,
    favorites: Option<Arc<FavoritesStore>>,
    obsolete: ObsoleteRegistry,
    stats: IconStats,
    phase: AtomicU8,
    pass_lock: Mutex<()>,
    batch_size: usize,
}

impl SyncEngine {
    /// Icons go to `{data_root}/favicons`, the snapshot to
    /// `{data_root}/bookmarks.json`.
    pub fn new(
        source: Box<dyn BookmarkSource>,
        parser: Box<dyn DocumentParser>,
        data_root: &Path,
    ) -> Self {
        Self {
            source,
            parser,
            icons: IconClient::new(),
            store: IconStore::new(data_root.join(ICON_DIR)),
            snapshot: SnapshotStore::new(data_root.join(SNAPSHOT_FILE)),
            favorites: None,
            obsolete: ObsoleteRegistry::default(),
            stats: IconStats::default(),
            phase: AtomicU8::new(SyncPhase::Idle.to_u8()),
            pass_lock: Mutex::new(()),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_icon_client(mut self, icons: IconClient) -> Self {
        self.icons = icons;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_favorites(mut self, favorites: Arc<FavoritesStore>) -> Self {
        self.favorites = Some(favorites);
        self
    }

    pub fn store(&self) -> &IconStore {
        &self.store
    }

    pub fn snapshot(&self) -> &SnapshotStore {
        &self.snapshot
    }

    pub fn favorites(&self) -> Option<&Arc<FavoritesStore>> {
        self.favorites.as_ref()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn phase(&self) -> SyncPhase {
        SyncPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    pub fn icon_stats(&self) -> IconStatsSnapshot {
        self.stats.snapshot()
    }

    pub async fn obsolete_bookmarks(&self) -> Arc<Vec<ObsoleteBookmark>> {
        self.obsolete.list().await
    }

    /// Installs the default icons and loads the last snapshot, if any.
    pub async fn init(&self) -> Result<(), EngineError> {
        self.store.init().await?;
        self.snapshot.load().await;
        Ok(())
    }

    /// The served tree. Falls back to the durable snapshot and, when that is
    /// absent or empty, to an initial pass. Concurrent first reads share one
    /// pass.
    pub async fn current_tree(&self) -> Result<Arc<Forest>, EngineError> {
        if let Some(tree) = self.snapshot.cached().await {
            return Ok(tree);
        }
        let _guard = self.pass_lock.lock().await;
        if let Some(tree) = self.snapshot.cached().await {
            return Ok(tree);
        }
        if !self.snapshot.is_empty().await
            && let Some(tree) = self.snapshot.load().await
        {
            return Ok(tree);
        }
        info!("no bookmark snapshot yet, running initial sync pass");
        let (_, tree) = self.settle_pass().await?;
        Ok(tree)
    }

    pub async fn run_sync_pass(&self) -> Result<SyncReport, EngineError> {
        let _guard = self.pass_lock.lock().await;
        let (report, _) = self.settle_pass().await?;
        Ok(report)
    }

    /// Runs one pass and records its outcome. Callers hold `pass_lock`. A
    /// failed pass leaves the counters of the last successful one in place.
    async fn settle_pass(&self) -> Result<(SyncReport, Arc<Forest>), EngineError> {
        let previous_stats = self.stats.snapshot();
        match self.run_pass_locked().await {
            Ok((report, tree)) => {
                self.set_phase(SyncPhase::Idle);
                info!(
                    total_urls = report.total_urls,
                    processed = report.processed,
                    unchanged = report.unchanged,
                    failed = report.failed,
                    orphans_removed = report.orphans_removed,
                    "sync pass finished"
                );
                Ok((report, tree))
            }
            Err(err) => {
                self.stats.restore(previous_stats);
                self.set_phase(SyncPhase::Failed);
                error!(error = %err, "sync pass failed");
                Err(err)
            }
        }
    }

    async fn run_pass_locked(&self) -> Result<(SyncReport, Arc<Forest>), EngineError> {
        self.set_phase(SyncPhase::FetchingSource);
        let raw = self.source.fetch_document().await?;
        let forest = self.parser.parse(&raw)?;
        debug!(source = %self.source.describe(), roots = forest.len(), "bookmark source parsed");

        self.set_phase(SyncPhase::Diffing);
        let previous_forest = match self.snapshot.cached().await {
            Some(tree) => Some(tree),
            None => self.snapshot.load().await,
        };
        let previous = previous_forest
            .as_deref()
            .map(|tree| previous_map(tree))
            .unwrap_or_default();
        let classification = classify(&forest, &previous);
        let titles = titles_by_url(&forest);

        self.set_phase(SyncPhase::AcquiringIcons);
        self.stats.reset();
        let outcome = self.acquire_all(&classification.to_process).await;

        self.set_phase(SyncPhase::Annotating);
        let locations = resolve_locations(&classification, &outcome.acquired, &previous);
        let annotated = annotate(forest, &locations);

        self.set_phase(SyncPhase::Persisting);
        let tree = self.snapshot.save(annotated).await?;
        self.obsolete
            .replace(build_obsolete(
                outcome.unreachable.iter().map(String::as_str),
                &titles,
            ))
            .await;

        self.set_phase(SyncPhase::CleaningUp);
        let orphans_removed = match self.cleanup_store(&classification).await {
            Ok(removed) => removed,
            Err(err) => {
                warn!(error = %err, "icon store cleanup failed");
                0
            }
        };

        let report = SyncReport {
            total_urls: classification.total(),
            processed: classification.to_process.len(),
            unchanged: classification.unchanged.len(),
            failed: outcome.failed,
            icon_stats: self.stats.snapshot(),
            orphans_removed,
            finished_at: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default(),
        };
        Ok((report, tree))
    }

    /// One batch at a time; every acquisition of a batch settles before the
    /// next batch starts.
    async fn acquire_all(&self, urls: &[String]) -> AcquireOutcome {
        let mut outcome = AcquireOutcome::default();
        for batch in urls.chunks(self.batch_size) {
            let results = join_all(batch.iter().map(|url| self.acquire_one(url))).await;
            for (url, result) in batch.iter().zip(results) {
                match result {
                    Ok(location) => {
                        outcome.acquired.insert(url.clone(), location);
                    }
                    Err(err) => {
                        warn!(url = %url, error = %err, "icon acquisition failed");
                        if let AcquireFailure::Fetch(fetch_err) = &err
                            && fetch_err.is_host_unreachable()
                        {
                            outcome.unreachable.push(url.clone());
                        }
                        outcome.failed += 1;
                    }
                }
            }
        }
        outcome
    }

    async fn acquire_one(&self, url: &str) -> Result<String, AcquireFailure> {
        self.stats.record_attempt();
        let fetch = self.icons.acquire(url).await.map_err(AcquireFailure::Fetch)?;
        let location = self
            .store
            .put(url, &fetch.bytes, fetch.content_type.as_deref())
            .await
            .map_err(AcquireFailure::Store)?;
        self.stats.record_success(fetch.stage);
        Ok(location)
    }

    async fn cleanup_store(&self, classification: &Classification) -> Result<usize, StoreError> {
        let mut active: Vec<String> = classification.all_urls().map(str::to_string).collect();
        if let Some(favorites) = &self.favorites {
            active.extend(favorites.list().await.into_iter().map(|favorite| favorite.url));
        }
        self.store.cleanup(active).await
    }

    /// Stores a user-supplied icon for `url` and points the served tree and
    /// the favorites list at it.
    pub async fn save_custom_icon(
        &self,
        url: &str,
        bytes: &[u8],
        content_type: Option<&str>,
    ) -> Result<String, EngineError> {
        let _guard = self.pass_lock.lock().await;
        let tree = match self.snapshot.cached().await {
            Some(tree) => Some(tree),
            None => self.snapshot.load().await,
        };
        let in_tree = tree
            .as_deref()
            .is_some_and(|tree| bookmark_urls(tree).iter().any(|known| known == url));
        let in_favorites = match &self.favorites {
            Some(favorites) => favorites.list().await.iter().any(|f| f.url == url),
            None => false,
        };
        if !in_tree && !in_favorites {
            return Err(EngineError::UnknownUrl(url.to_string()));
        }

        let location = self.store.put(url, bytes, content_type).await?;
        if let Some(tree) = tree.as_deref()
            && let Some(updated) = relocate(tree, url, &location)
        {
            self.snapshot.save(updated).await?;
        }
        if let Some(favorites) = &self.favorites {
            favorites.update_location(url, &location).await?;
        }
        info!(url, location = %location, "custom icon saved");
        Ok(location)
    }

    fn set_phase(&self, phase: SyncPhase) {
        self.phase.store(phase.to_u8(), Ordering::SeqCst);
        debug!(phase = phase.as_str(), "sync phase");
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;

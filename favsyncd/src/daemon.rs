use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use favsync_core::IconClient;
use tracing::{info, warn};

use crate::favorites::{FAVORITES_FILE, FavoritesStore};
use crate::sync::backoff::Backoff;
use crate::sync::engine::{DEFAULT_BATCH_SIZE, SyncEngine};
use crate::sync::source::{DEFAULT_SOURCE_TIMEOUT, JsonForestParser, source_from_spec};
use crate::sync::stats::SyncReport;

const DEFAULT_DATA_DIR_NAME: &str = "favsync";
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 3600;
const DEFAULT_FETCH_TIMEOUT_MS: u64 = 5000;
const RETRY_BASE: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct DaemonConfig {
    pub data_root: PathBuf,
    pub source: String,
    pub sync_interval: Duration,
    pub batch_size: usize,
    pub fetch_timeout: Duration,
    pub source_timeout: Duration,
}

impl DaemonConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let home = dirs::home_dir().context("home directory is unavailable")?;
        let data_root = std::env::var("FAVSYNC_DATA_DIR")
            .ok()
            .map(|value| expand_with_home(&value, &home))
            .unwrap_or_else(|| default_data_root(&home));
        let source = std::env::var("FAVSYNC_SOURCE")
            .context("FAVSYNC_SOURCE is not set (path or http(s) URL of the bookmark export)")?;
        let sync_interval = Duration::from_secs(read_u64_env(
            "FAVSYNC_SYNC_INTERVAL_SECS",
            DEFAULT_SYNC_INTERVAL_SECS,
        ));
        let batch_size = usize::try_from(read_u64_env(
            "FAVSYNC_BATCH_SIZE",
            DEFAULT_BATCH_SIZE as u64,
        ))
        .unwrap_or(DEFAULT_BATCH_SIZE);
        let fetch_timeout = Duration::from_millis(read_u64_env(
            "FAVSYNC_FETCH_TIMEOUT_MS",
            DEFAULT_FETCH_TIMEOUT_MS,
        ));
        let source_timeout = Duration::from_secs(read_u64_env(
            "FAVSYNC_SOURCE_TIMEOUT_SECS",
            DEFAULT_SOURCE_TIMEOUT.as_secs(),
        ));

        Ok(Self {
            data_root,
            source,
            sync_interval,
            batch_size,
            fetch_timeout,
            source_timeout,
        })
    }
}

pub struct DaemonRuntime {
    config: DaemonConfig,
    engine: Arc<SyncEngine>,
}

impl DaemonRuntime {
    pub async fn bootstrap(config: DaemonConfig) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&config.data_root)
            .await
            .with_context(|| format!("failed to create data root at {:?}", config.data_root))?;

        let favorites_path = config.data_root.join(FAVORITES_FILE);
        let favorites = FavoritesStore::open(&favorites_path)
            .await
            .with_context(|| format!("failed to open favorites at {favorites_path:?}"))?;
        let source = source_from_spec(&config.source, config.source_timeout)
            .with_context(|| format!("invalid bookmark source {:?}", config.source))?;
        let engine = SyncEngine::new(source, Box::new(JsonForestParser), &config.data_root)
            .with_icon_client(IconClient::with_timeout(config.fetch_timeout))
            .with_batch_size(config.batch_size)
            .with_favorites(Arc::new(favorites));
        engine
            .init()
            .await
            .context("failed to initialize icon store")?;

        Ok(Self {
            config,
            engine: Arc::new(engine),
        })
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    pub async fn run_once(&self) -> anyhow::Result<SyncReport> {
        self.engine
            .run_sync_pass()
            .await
            .context("sync pass failed")
    }

    /// Runs a pass right away, then one per interval until Ctrl-C. Failed
    /// passes are retried sooner, never later than the regular interval.
    pub async fn run(self) -> anyhow::Result<()> {
        self.run_until(tokio::signal::ctrl_c()).await
    }

    /// The daemon loop. `shutdown` is watched while waiting and while a pass
    /// is in flight; an interrupted pass is dropped.
    async fn run_until<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = std::io::Result<()>>,
    {
        info!(
            data_root = %self.config.data_root.display(),
            source = %self.config.source,
            interval_secs = self.config.sync_interval.as_secs(),
            batch_size = self.engine.batch_size(),
            "favsyncd started"
        );

        let mut shutdown = std::pin::pin!(shutdown);
        let backoff = Backoff::new(RETRY_BASE, self.config.sync_interval, true);
        let mut failures = 0u32;
        let mut delay = Duration::ZERO;
        let engine = &self.engine;
        loop {
            let pass = async move {
                tokio::time::sleep(delay).await;
                engine.run_sync_pass().await
            };
            let outcome = tokio::select! {
                res = &mut shutdown => {
                    res.context("failed waiting for shutdown signal")?;
                    info!("shutdown requested");
                    break;
                }
                outcome = pass => outcome,
            };

            failures = match outcome {
                Ok(_) => 0,
                Err(_) => failures.saturating_add(1),
            };
            delay = next_pass_delay(failures, self.config.sync_interval, &backoff);
            if failures > 0 {
                warn!(
                    failures,
                    retry_in_secs = delay.as_secs(),
                    "sync pass failed, retrying early"
                );
            }
        }

        Ok(())
    }
}

include!("daemon_helpers.rs");

#[cfg(test)]
#[path = "daemon_tests.rs"]
mod tests;

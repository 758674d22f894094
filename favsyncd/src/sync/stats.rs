use std::sync::atomic::{AtomicU64, Ordering};

use favsync_core::AcquireStage;
use serde::Serialize;

/// Acquisition counters for the current pass.
#[derive(Debug, Default)]
pub struct IconStats {
    attempted: AtomicU64,
    succeeded: AtomicU64,
    via_direct_path: AtomicU64,
    via_page_scrape: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IconStatsSnapshot {
    pub attempted: u64,
    pub succeeded: u64,
    pub succeeded_via_direct_path: u64,
    pub succeeded_via_page_scrape: u64,
}

impl IconStats {
    pub fn reset(&self) {
        self.attempted.store(0, Ordering::SeqCst);
        self.succeeded.store(0, Ordering::SeqCst);
        self.via_direct_path.store(0, Ordering::SeqCst);
        self.via_page_scrape.store(0, Ordering::SeqCst);
    }

    pub fn record_attempt(&self) {
        self.attempted.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_success(&self, stage: AcquireStage) {
        self.succeeded.fetch_add(1, Ordering::SeqCst);
        let counter = match stage {
            AcquireStage::DirectPath => &self.via_direct_path,
            AcquireStage::PageScrape => &self.via_page_scrape,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Puts back counters taken with [`IconStats::snapshot`].
    pub fn restore(&self, snapshot: IconStatsSnapshot) {
        self.attempted.store(snapshot.attempted, Ordering::SeqCst);
        self.succeeded.store(snapshot.succeeded, Ordering::SeqCst);
        self.via_direct_path
            .store(snapshot.succeeded_via_direct_path, Ordering::SeqCst);
        self.via_page_scrape
            .store(snapshot.succeeded_via_page_scrape, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> IconStatsSnapshot {
        IconStatsSnapshot {
            attempted: self.attempted.load(Ordering::SeqCst),
            succeeded: self.succeeded.load(Ordering::SeqCst),
            succeeded_via_direct_path: self.via_direct_path.load(Ordering::SeqCst),
            succeeded_via_page_scrape: self.via_page_scrape.load(Ordering::SeqCst),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub total_urls: usize,
    pub processed: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub icon_stats: IconStatsSnapshot,
    pub orphans_removed: usize,
    pub finished_at: String,
}

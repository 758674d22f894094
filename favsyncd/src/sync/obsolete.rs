use std::collections::HashMap;
use std::sync::Arc;

use favsync_core::DEFAULT_ICON_LOCATION;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// A bookmark whose host could not be reached during the last pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObsoleteBookmark {
    pub id: String,
    pub url: String,
    pub title: String,
    pub favicon_url: String,
}

/// Builds the registry entries for `unreachable` URLs, in the given order.
/// Ids are `obsolete-1`, `obsolete-2`, ... so they never collide with
/// bookmark ids from the source.
pub fn build_obsolete<'a, I>(
    unreachable: I,
    titles: &HashMap<String, String>,
) -> Vec<ObsoleteBookmark>
where
    I: IntoIterator<Item = &'a str>,
{
    unreachable
        .into_iter()
        .enumerate()
        .map(|(index, url)| ObsoleteBookmark {
            id: format!("obsolete-{}", index + 1),
            url: url.to_string(),
            title: titles.get(url).cloned().unwrap_or_else(|| url.to_string()),
            favicon_url: DEFAULT_ICON_LOCATION.to_string(),
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct ObsoleteRegistry {
    entries: RwLock<Arc<Vec<ObsoleteBookmark>>>,
}

impl ObsoleteRegistry {
    pub async fn list(&self) -> Arc<Vec<ObsoleteBookmark>> {
        Arc::clone(&*self.entries.read().await)
    }

    pub async fn replace(&self, entries: Vec<ObsoleteBookmark>) {
        *self.entries.write().await = Arc::new(entries);
    }
}

use std::collections::{HashMap, HashSet};

use favsync_core::{
    Bookmark, BookmarkNode, DEFAULT_ICON_LOCATION, FOLDER_ICON_LOCATION, Folder, visit_bookmarks,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviousEntry {
    pub title: String,
    pub icon_location: Option<String>,
}

pub type PreviousMap = HashMap<String, PreviousEntry>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub to_process: Vec<String>,
    pub unchanged: Vec<String>,
}

impl Classification {
    pub fn total(&self) -> usize {
        self.to_process.len() + self.unchanged.len()
    }

    pub fn all_urls(&self) -> impl Iterator<Item = &str> {
        self.to_process
            .iter()
            .chain(self.unchanged.iter())
            .map(String::as_str)
    }
}

/// Flattens a persisted forest into URL -> {title, location}. When a URL
/// appears more than once, its first occurrence in pre-order wins.
pub fn previous_map(forest: &[BookmarkNode]) -> PreviousMap {
    let mut map = PreviousMap::new();
    visit_bookmarks(forest, &mut |bookmark| {
        if bookmark.url.is_empty() {
            return;
        }
        map.entry(bookmark.url.clone())
            .or_insert_with(|| PreviousEntry {
                title: bookmark.title.clone(),
                icon_location: bookmark.icon_location.clone(),
            });
    });
    map
}

pub fn needs_refresh(title: &str, previous: Option<&PreviousEntry>) -> bool {
    let Some(previous) = previous else {
        return true;
    };
    match previous.icon_location.as_deref() {
        None => true,
        Some(location) if location.is_empty() || location == DEFAULT_ICON_LOCATION => true,
        Some(_) => previous.title != title,
    }
}

pub fn classify(forest: &[BookmarkNode], previous: &PreviousMap) -> Classification {
    let mut seen = HashSet::new();
    let mut result = Classification::default();
    visit_bookmarks(forest, &mut |bookmark| {
        if bookmark.url.is_empty() || !seen.insert(bookmark.url.as_str()) {
            return;
        }
        if needs_refresh(&bookmark.title, previous.get(&bookmark.url)) {
            result.to_process.push(bookmark.url.clone());
        } else {
            result.unchanged.push(bookmark.url.clone());
        }
    });
    result
}

/// Final location per URL: a freshly acquired icon, else the previous
/// non-default location, else the default placeholder.
pub fn resolve_locations(
    classification: &Classification,
    acquired: &HashMap<String, String>,
    previous: &PreviousMap,
) -> HashMap<String, String> {
    classification
        .all_urls()
        .map(|url| {
            let location = acquired
                .get(url)
                .cloned()
                .or_else(|| fallback_location(previous.get(url)))
                .unwrap_or_else(|| DEFAULT_ICON_LOCATION.to_string());
            (url.to_string(), location)
        })
        .collect()
}

fn fallback_location(previous: Option<&PreviousEntry>) -> Option<String> {
    previous?
        .icon_location
        .clone()
        .filter(|location| !location.is_empty() && location != DEFAULT_ICON_LOCATION)
}

/// Rewrites the forest with resolved bookmark locations and the fixed
/// folder location.
pub fn annotate(
    forest: Vec<BookmarkNode>,
    locations: &HashMap<String, String>,
) -> Vec<BookmarkNode> {
    forest
        .into_iter()
        .map(|node| match node {
            BookmarkNode::Folder(folder) => BookmarkNode::Folder(Folder {
                icon_location: FOLDER_ICON_LOCATION.to_string(),
                children: annotate(folder.children, locations),
                ..folder
            }),
            BookmarkNode::Bookmark(bookmark) => {
                let icon_location = locations
                    .get(&bookmark.url)
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_ICON_LOCATION.to_string());
                BookmarkNode::Bookmark(Bookmark {
                    icon_location: Some(icon_location),
                    ..bookmark
                })
            }
        })
        .collect()
}

/// Copy of `forest` with every bookmark for `url` pointed at `location`,
/// or `None` when no bookmark carries that URL.
pub fn relocate(
    forest: &[BookmarkNode],
    url: &str,
    location: &str,
) -> Option<Vec<BookmarkNode>> {
    let mut changed = false;
    let updated = relocate_nodes(forest, url, location, &mut changed);
    changed.then_some(updated)
}

fn relocate_nodes(
    forest: &[BookmarkNode],
    url: &str,
    location: &str,
    changed: &mut bool,
) -> Vec<BookmarkNode> {
    forest
        .iter()
        .map(|node| match node {
            BookmarkNode::Folder(folder) => BookmarkNode::Folder(Folder {
                children: relocate_nodes(&folder.children, url, location, changed),
                ..folder.clone()
            }),
            BookmarkNode::Bookmark(bookmark) if bookmark.url == url => {
                *changed = true;
                BookmarkNode::Bookmark(Bookmark {
                    icon_location: Some(location.to_string()),
                    ..bookmark.clone()
                })
            }
            other => other.clone(),
        })
        .collect()
}

/// URL -> title for the first bookmark carrying each URL.
pub fn titles_by_url(forest: &[BookmarkNode]) -> HashMap<String, String> {
    let mut titles = HashMap::new();
    visit_bookmarks(forest, &mut |bookmark| {
        titles
            .entry(bookmark.url.clone())
            .or_insert_with(|| bookmark.title.clone());
    });
    titles
}

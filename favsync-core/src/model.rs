use std::collections::HashSet;

use serde::{Deserialize, Serialize};

pub const DEFAULT_ICON_LOCATION: &str = "/favicons/default-icon.png";
pub const FOLDER_ICON_LOCATION: &str = "/favicons/folder-icon.png";

/// One node of the bookmark forest.
///
/// Serialized with a `type` tag so a persisted forest reads as
/// `[{"type": "folder", "id": "1", "title": "Dev", "location": ..., "children": [...]}]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BookmarkNode {
    Folder(Folder),
    Bookmark(Bookmark),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub title: String,
    #[serde(rename = "location", default = "folder_location")]
    pub icon_location: String,
    #[serde(default)]
    pub children: Vec<BookmarkNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: String,
    pub title: String,
    pub url: String,
    #[serde(
        rename = "location",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub icon_location: Option<String>,
}

fn folder_location() -> String {
    FOLDER_ICON_LOCATION.to_string()
}

impl BookmarkNode {
    pub fn folder(
        id: impl Into<String>,
        title: impl Into<String>,
        children: Vec<BookmarkNode>,
    ) -> Self {
        BookmarkNode::Folder(Folder {
            id: id.into(),
            title: title.into(),
            icon_location: folder_location(),
            children,
        })
    }

    pub fn bookmark(
        id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        BookmarkNode::Bookmark(Bookmark {
            id: id.into(),
            title: title.into(),
            url: url.into(),
            icon_location: None,
        })
    }

    pub fn id(&self) -> &str {
        match self {
            BookmarkNode::Folder(folder) => &folder.id,
            BookmarkNode::Bookmark(bookmark) => &bookmark.id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            BookmarkNode::Folder(folder) => &folder.title,
            BookmarkNode::Bookmark(bookmark) => &bookmark.title,
        }
    }

    pub fn icon_location(&self) -> Option<&str> {
        match self {
            BookmarkNode::Folder(folder) => Some(&folder.icon_location),
            BookmarkNode::Bookmark(bookmark) => bookmark.icon_location.as_deref(),
        }
    }
}

/// Pre-order walk over every bookmark leaf in the forest.
pub fn visit_bookmarks<'a, F>(forest: &'a [BookmarkNode], visit: &mut F)
where
    F: FnMut(&'a Bookmark),
{
    for node in forest {
        match node {
            BookmarkNode::Bookmark(bookmark) => visit(bookmark),
            BookmarkNode::Folder(folder) => visit_bookmarks(&folder.children, visit),
        }
    }
}

/// Distinct bookmark URLs in first-seen pre-order.
pub fn bookmark_urls(forest: &[BookmarkNode]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    visit_bookmarks(forest, &mut |bookmark| {
        if !bookmark.url.is_empty() && seen.insert(bookmark.url.as_str()) {
            urls.push(bookmark.url.clone());
        }
    });
    urls
}

mod client;
mod mime;
mod model;
mod scrape;

pub use client::{AcquireStage, FailureKind, IconClient, IconError, IconFetch};
pub use mime::{ICON_EXTENSIONS, extension_for};
pub use model::{
    Bookmark, BookmarkNode, DEFAULT_ICON_LOCATION, FOLDER_ICON_LOCATION, Folder, bookmark_urls,
    visit_bookmarks,
};
pub use scrape::find_icon_href;

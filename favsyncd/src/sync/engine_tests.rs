use super::*;
use crate::favorites::{FAVORITES_FILE, Favorite};
use crate::sync::paths::icon_hash;
use crate::sync::source::JsonForestParser;
use favsync_core::{BookmarkNode, DEFAULT_ICON_LOCATION, FOLDER_ICON_LOCATION};
use futures_util::future::BoxFuture;
use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::time::{Duration, Instant};
use tempfile::tempdir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PAGE_WITH_ICON_LINK: &str = r#"<html><head>
<title>Example</title>
<link rel="stylesheet" href="/site.css">
<link rel="icon" href="/static/icon.png">
</head><body></body></html>"#;

#[derive(Clone, Default)]
struct MemorySource {
    document: Arc<std::sync::Mutex<Option<String>>>,
    fetches: Arc<AtomicUsize>,
}

impl MemorySource {
    fn serving(forest: &[BookmarkNode]) -> Self {
        let source = Self::default();
        source.set(forest);
        source
    }

    fn set(&self, forest: &[BookmarkNode]) {
        *self.document.lock().unwrap() = Some(serde_json::to_string(forest).unwrap());
    }

    fn fail(&self) {
        *self.document.lock().unwrap() = None;
    }

    fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl BookmarkSource for MemorySource {
    fn fetch_document(&self) -> BoxFuture<'_, Result<String, SourceError>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let document = self.document.lock().unwrap().clone();
        Box::pin(async move {
            document.ok_or_else(|| SourceError::Io {
                path: PathBuf::from("memory"),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "source offline"),
            })
        })
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

async fn make_engine(root: &Path, source: &MemorySource) -> SyncEngine {
    let engine = SyncEngine::new(Box::new(source.clone()), Box::new(JsonForestParser), root)
        .with_icon_client(IconClient::with_timeout(Duration::from_millis(500)));
    engine.init().await.unwrap();
    engine
}

async fn mount_direct_icon(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/favicon.ico"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![7u8; 512], "image/x-icon"))
        .mount(server)
        .await;
}

fn location_of(tree: &[BookmarkNode], url: &str) -> Option<String> {
    previous_map(tree)
        .get(url)
        .and_then(|entry| entry.icon_location.clone())
}

fn one_folder(children: Vec<BookmarkNode>) -> Vec<BookmarkNode> {
    vec![BookmarkNode::folder("1", "Root", children)]
}

#[tokio::test]
async fn direct_path_icon_is_stored_with_ico_extension() {
    let server = MockServer::start().await;
    mount_direct_icon(&server).await;
    let url = format!("{}/docs", server.uri());
    let source =
        MemorySource::serving(&one_folder(vec![BookmarkNode::bookmark("2", "Docs", &url)]));
    let dir = tempdir().unwrap();
    let engine = make_engine(dir.path(), &source).await;

    let report = engine.run_sync_pass().await.unwrap();

    assert_eq!(report.total_urls, 1);
    assert_eq!(report.processed, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.icon_stats.attempted, 1);
    assert_eq!(report.icon_stats.succeeded_via_direct_path, 1);
    assert_eq!(report.icon_stats.succeeded_via_page_scrape, 0);
    assert_eq!(engine.phase(), SyncPhase::Idle);

    let hash = icon_hash(&url);
    let tree = engine.current_tree().await.unwrap();
    assert_eq!(location_of(&tree, &url), Some(format!("/favicons/{hash}.ico")));
    assert_eq!(tree[0].icon_location(), Some(FOLDER_ICON_LOCATION));
    let stored = std::fs::read(dir.path().join(ICON_DIR).join(format!("{hash}.ico"))).unwrap();
    assert_eq!(stored.len(), 512);
}

#[tokio::test]
async fn missing_direct_icon_falls_back_to_page_scrape() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/favicon.ico"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(PAGE_WITH_ICON_LINK, "text/html"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/static/icon.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![1u8; 64], "image/png"))
        .mount(&server)
        .await;
    let url = format!("{}/article", server.uri());
    let source = MemorySource::serving(&[BookmarkNode::bookmark("1", "Article", &url)]);
    let dir = tempdir().unwrap();
    let engine = make_engine(dir.path(), &source).await;

    let report = engine.run_sync_pass().await.unwrap();

    assert_eq!(report.icon_stats.succeeded, 1);
    assert_eq!(report.icon_stats.succeeded_via_page_scrape, 1);
    let tree = engine.current_tree().await.unwrap();
    assert_eq!(
        location_of(&tree, &url),
        Some(format!("/favicons/{}.png", icon_hash(&url)))
    );
}

#[tokio::test]
async fn second_pass_without_changes_fetches_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/favicon.ico"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![7u8; 512], "image/x-icon"))
        .expect(2)
        .mount(&server)
        .await;
    let forest = one_folder(vec![
        BookmarkNode::bookmark("2", "A", format!("{}/a", server.uri())),
        BookmarkNode::bookmark("3", "B", format!("{}/b", server.uri())),
        BookmarkNode::bookmark("4", "A again", format!("{}/a", server.uri())),
    ]);
    let source = MemorySource::serving(&forest);
    let dir = tempdir().unwrap();
    let engine = make_engine(dir.path(), &source).await;

    let first = engine.run_sync_pass().await.unwrap();
    let snapshot_after_first = std::fs::read(dir.path().join(SNAPSHOT_FILE)).unwrap();
    let second = engine.run_sync_pass().await.unwrap();

    assert_eq!(first.total_urls, 2);
    assert_eq!(first.processed, 2);
    assert_eq!(second.processed, 0);
    assert_eq!(second.unchanged, second.total_urls);
    assert_eq!(second.icon_stats.attempted, 0);
    assert_eq!(
        std::fs::read(dir.path().join(SNAPSHOT_FILE)).unwrap(),
        snapshot_after_first
    );
}

#[tokio::test]
async fn unreachable_host_gets_default_icon_and_is_flagged_obsolete() {
    let url = "http://127.0.0.1:1/gone";
    let source = MemorySource::serving(&[BookmarkNode::bookmark("1", "Gone", url)]);
    let dir = tempdir().unwrap();
    let engine = make_engine(dir.path(), &source).await;

    let report = engine.run_sync_pass().await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.icon_stats.succeeded, 0);
    let tree = engine.current_tree().await.unwrap();
    assert_eq!(location_of(&tree, url).as_deref(), Some(DEFAULT_ICON_LOCATION));

    let obsolete = engine.obsolete_bookmarks().await;
    assert_eq!(obsolete.len(), 1);
    assert_eq!(obsolete[0].url, url);
    assert_eq!(obsolete[0].title, "Gone");
    assert_eq!(obsolete[0].favicon_url, DEFAULT_ICON_LOCATION);
}

#[tokio::test]
async fn failed_refresh_keeps_previous_icon_and_is_not_obsolete() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/favicon.ico"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![7u8; 16], "image/png"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let url = format!("{}/page", server.uri());
    let source = MemorySource::serving(&[BookmarkNode::bookmark("1", "Before", &url)]);
    let dir = tempdir().unwrap();
    let engine = make_engine(dir.path(), &source).await;
    engine.run_sync_pass().await.unwrap();
    let stored = format!("/favicons/{}.png", icon_hash(&url));

    source.set(&[BookmarkNode::bookmark("1", "After", &url)]);
    let report = engine.run_sync_pass().await.unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.failed, 1);
    let tree = engine.current_tree().await.unwrap();
    assert_eq!(location_of(&tree, &url), Some(stored));
    assert_eq!(tree[0].title(), "After");
    assert!(engine.obsolete_bookmarks().await.is_empty());
    assert!(engine.store().exists(&url).await.unwrap().is_some());
}

#[tokio::test]
async fn removed_bookmarks_lose_their_icons() {
    let server = MockServer::start().await;
    mount_direct_icon(&server).await;
    let a = format!("{}/a", server.uri());
    let b = format!("{}/b", server.uri());
    let c = format!("{}/c", server.uri());
    let source = MemorySource::serving(&[
        BookmarkNode::bookmark("1", "A", &a),
        BookmarkNode::bookmark("2", "B", &b),
        BookmarkNode::bookmark("3", "C", &c),
    ]);
    let dir = tempdir().unwrap();
    let engine = make_engine(dir.path(), &source).await.with_batch_size(2);
    engine.run_sync_pass().await.unwrap();

    source.set(&[
        BookmarkNode::bookmark("1", "A", &a),
        BookmarkNode::bookmark("2", "B", &b),
    ]);
    let report = engine.run_sync_pass().await.unwrap();

    assert_eq!(report.orphans_removed, 1);
    assert!(engine.store().exists(&a).await.unwrap().is_some());
    assert!(engine.store().exists(&b).await.unwrap().is_some());
    assert!(engine.store().exists(&c).await.unwrap().is_none());
    let names = engine.store().list_all().await.unwrap();
    assert!(names.contains(&"default-icon.png".to_string()));
    assert!(names.contains(&"folder-icon.png".to_string()));
}

#[tokio::test]
async fn source_failure_keeps_serving_previous_tree() {
    let source = MemorySource::serving(&[BookmarkNode::bookmark("1", "Local", "mailto:a@b.c")]);
    let dir = tempdir().unwrap();
    let engine = make_engine(dir.path(), &source).await;
    engine.run_sync_pass().await.unwrap();
    let before = engine.current_tree().await.unwrap();

    source.fail();
    let err = engine.run_sync_pass().await.unwrap_err();

    assert!(matches!(err, EngineError::SourceUnavailable(_)));
    assert_eq!(engine.phase(), SyncPhase::Failed);
    assert_eq!(engine.current_tree().await.unwrap(), before);
}

#[tokio::test]
async fn persistence_failure_leaves_cached_tree_untouched() {
    let source = MemorySource::serving(&[BookmarkNode::bookmark("1", "Old", "mailto:a@b.c")]);
    let dir = tempdir().unwrap();
    let engine = make_engine(dir.path(), &source).await;
    engine.run_sync_pass().await.unwrap();
    let before = engine.current_tree().await.unwrap();

    let snapshot_path = dir.path().join(SNAPSHOT_FILE);
    std::fs::remove_file(&snapshot_path).unwrap();
    std::fs::create_dir(&snapshot_path).unwrap();
    std::fs::write(snapshot_path.join("occupied"), b"x").unwrap();
    source.set(&[BookmarkNode::bookmark("1", "New", "mailto:a@b.c")]);

    let err = engine.run_sync_pass().await.unwrap_err();

    assert!(matches!(err, EngineError::PersistenceFailure(_)));
    assert_eq!(engine.snapshot().cached().await, Some(before));
}

#[tokio::test]
async fn failed_pass_keeps_last_stats_and_obsolete_list() {
    let source = MemorySource::serving(&[BookmarkNode::bookmark("1", "Old", "mailto:a@b.c")]);
    let dir = tempdir().unwrap();
    let engine = make_engine(dir.path(), &source).await;
    let first = engine.run_sync_pass().await.unwrap();

    let snapshot_path = dir.path().join(SNAPSHOT_FILE);
    std::fs::remove_file(&snapshot_path).unwrap();
    std::fs::create_dir(&snapshot_path).unwrap();
    std::fs::write(snapshot_path.join("occupied"), b"x").unwrap();
    source.set(&[
        BookmarkNode::bookmark("1", "Old", "mailto:a@b.c"),
        BookmarkNode::bookmark("2", "Gone", "http://127.0.0.1:1/gone"),
    ]);

    let err = engine.run_sync_pass().await.unwrap_err();

    assert!(matches!(err, EngineError::PersistenceFailure(_)));
    assert_eq!(engine.icon_stats(), first.icon_stats);
    assert!(engine.obsolete_bookmarks().await.is_empty());
}

#[tokio::test]
async fn batches_run_in_sequence_with_concurrent_members() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/favicon.ico"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(vec![2u8; 32], "image/x-icon")
                .set_delay(Duration::from_millis(300)),
        )
        .expect(4)
        .mount(&server)
        .await;
    let bookmarks: Vec<_> = (1..=4)
        .map(|n| {
            let url = format!("{}/page{n}", server.uri());
            BookmarkNode::bookmark(&n.to_string(), "Page", &url)
        })
        .collect();
    let source = MemorySource::serving(&bookmarks);
    let dir = tempdir().unwrap();
    let client = IconClient::with_timeout(Duration::from_secs(2));
    assert_eq!(client.timeout(), Duration::from_secs(2));
    let engine = SyncEngine::new(Box::new(source), Box::new(JsonForestParser), dir.path())
        .with_icon_client(client)
        .with_batch_size(2);
    engine.init().await.unwrap();

    let started = Instant::now();
    let report = engine.run_sync_pass().await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(report.icon_stats.succeeded, 4);
    assert!(elapsed >= Duration::from_millis(600), "batches overlapped: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1100), "batch ran serially: {elapsed:?}");
}

#[tokio::test]
async fn concurrent_first_reads_share_one_pass() {
    let source = MemorySource::serving(&[BookmarkNode::bookmark("1", "Local", "mailto:a@b.c")]);
    let dir = tempdir().unwrap();
    let engine = make_engine(dir.path(), &source).await;

    let (first, second) = tokio::join!(engine.current_tree(), engine.current_tree());

    assert!(Arc::ptr_eq(&first.unwrap(), &second.unwrap()));
    assert_eq!(source.fetch_count(), 1);
}

#[tokio::test]
async fn current_tree_runs_initial_pass_when_nothing_is_stored() {
    let source = MemorySource::serving(&one_folder(vec![BookmarkNode::bookmark(
        "2",
        "Local",
        "mailto:a@b.c",
    )]));
    let dir = tempdir().unwrap();
    let engine = make_engine(dir.path(), &source).await;
    assert!(engine.snapshot().cached().await.is_none());

    let tree = engine.current_tree().await.unwrap();

    assert_eq!(tree.len(), 1);
    assert!(dir.path().join(SNAPSHOT_FILE).exists());
    assert_eq!(
        location_of(&tree, "mailto:a@b.c").as_deref(),
        Some(DEFAULT_ICON_LOCATION)
    );
}

#[tokio::test]
async fn current_tree_prefers_stored_snapshot_over_a_pass() {
    let dir = tempdir().unwrap();
    let stored = vec![BookmarkNode::bookmark("1", "Stored", "mailto:a@b.c")];
    std::fs::write(
        dir.path().join(SNAPSHOT_FILE),
        serde_json::to_vec(&stored).unwrap(),
    )
    .unwrap();
    let source = MemorySource::default();
    let engine = SyncEngine::new(Box::new(source), Box::new(JsonForestParser), dir.path());

    let tree = engine.current_tree().await.unwrap();

    assert_eq!(tree.as_slice(), stored.as_slice());
}

#[tokio::test]
async fn custom_icon_updates_tree_and_favorites() {
    let url = "mailto:a@b.c";
    let source = MemorySource::serving(&[BookmarkNode::bookmark("1", "Mail", url)]);
    let dir = tempdir().unwrap();
    let favorites = Arc::new(
        FavoritesStore::open(dir.path().join(FAVORITES_FILE))
            .await
            .unwrap(),
    );
    favorites
        .add(Favorite {
            url: url.into(),
            title: "Mail".into(),
            favicon_url: DEFAULT_ICON_LOCATION.into(),
            location: None,
        })
        .await
        .unwrap();
    let engine = make_engine(dir.path(), &source)
        .await
        .with_favorites(Arc::clone(&favorites));
    engine.run_sync_pass().await.unwrap();

    let location = engine
        .save_custom_icon(url, b"<svg/>", Some("image/svg+xml"))
        .await
        .unwrap();

    assert_eq!(location, format!("/favicons/{}.svg", icon_hash(url)));
    let tree = engine.current_tree().await.unwrap();
    assert_eq!(location_of(&tree, url), Some(location.clone()));
    let reloaded = SnapshotStore::new(dir.path().join(SNAPSHOT_FILE));
    assert_eq!(
        location_of(&reloaded.load().await.unwrap(), url),
        Some(location.clone())
    );
    assert_eq!(favorites.list().await[0].favicon_url, location);

    // The next pass keeps the custom icon: the title is unchanged and the
    // stored location is not the default.
    let report = engine.run_sync_pass().await.unwrap();
    assert_eq!(report.unchanged, 1);
    assert!(engine.store().exists(url).await.unwrap().is_some());
}

#[tokio::test]
async fn custom_icon_for_unknown_url_is_rejected() {
    let source = MemorySource::serving(&[]);
    let dir = tempdir().unwrap();
    let engine = make_engine(dir.path(), &source).await;
    engine.run_sync_pass().await.unwrap();

    let err = engine
        .save_custom_icon("http://unknown.example", b"icon", Some("image/png"))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::UnknownUrl(_)));
    assert!(
        engine
            .store()
            .exists("http://unknown.example")
            .await
            .unwrap()
            .is_none()
    );
}

#[test]
fn phase_round_trips_through_atomic_representation() {
    for phase in SyncPhase::ALL {
        assert_eq!(SyncPhase::from_u8(phase.to_u8()), phase);
    }
}

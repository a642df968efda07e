use super::*;
use axum::{extract::State, http::StatusCode, routing::get, Router};
use shared::error::NoticeCode;
use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::net::TcpListener;

const DOCUMENT: &str = r#"{
    "categories": [
        { "id": "tools", "label": "Tools", "links": [
            { "name": "Archive", "url": "https://archive.org" },
            { "name": "Broken" }
        ] }
    ],
    "defaultHome": "https://example.org",
    "blacklistedDomains": ["example.net"]
}"#;

fn loader(cache: Option<HubCache>) -> HubDocumentLoader {
    HubDocumentLoader::new(HttpFetch::default())
        .with_policy(RetryPolicy::new(3, Duration::from_secs(2)).expect("policy"))
        .with_cache(cache)
}

async fn spawn_hub_server() -> anyhow::Result<(String, Arc<AtomicU32>)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let failures = Arc::new(AtomicU32::new(0));
    let app = Router::new()
        .route("/hubData.json", get(|| async { DOCUMENT }))
        .route(
            "/broken.json",
            get(|State(failures): State<Arc<AtomicU32>>| async move {
                failures.fetch_add(1, Ordering::SeqCst);
                StatusCode::INTERNAL_SERVER_ERROR
            }),
        )
        .with_state(failures.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), failures))
}

#[test]
fn classifies_sources() {
    assert_eq!(
        HubSource::parse("https://hub.example/hubData.json"),
        HubSource::Remote(Url::parse("https://hub.example/hubData.json").expect("url"))
    );
    assert_eq!(
        HubSource::parse(" ./hubData.json "),
        HubSource::File(PathBuf::from("./hubData.json"))
    );
    assert_eq!(
        HubSource::parse("C:/hub/hubData.json"),
        HubSource::File(PathBuf::from("C:/hub/hubData.json"))
    );
}

#[tokio::test]
async fn loads_file_document_and_refreshes_cache() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("hubData.json");
    std::fs::write(&path, DOCUMENT).expect("seed");
    let cache = HubCache::new(dir.path().join("cache").join("hub.json"));

    let load = loader(Some(cache.clone())).load(&HubSource::File(path.clone())).await;

    assert_eq!(load.origin, HubOrigin::Fresh);
    assert_eq!(load.error, None);
    assert_eq!(load.notice(), None);
    assert_eq!(load.document.link_count(), 1);
    assert_eq!(load.document.default_home.as_deref(), Some("https://example.org"));

    let cached = cache.read().await.expect("cache written");
    assert_eq!(cached.document, load.document);
    assert_eq!(cached.source, path.display().to_string());
}

#[tokio::test]
async fn malformed_document_without_cache_degrades_to_empty_with_notice() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("hubData.json");
    std::fs::write(&path, "{ \"categories\": [ oops").expect("seed");

    let load = loader(Some(HubCache::new(dir.path().join("none.json"))))
        .load(&HubSource::File(path))
        .await;

    assert_eq!(load.origin, HubOrigin::Empty);
    assert!(load.document.categories.is_empty());
    assert!(matches!(
        load.error,
        Some(HubError::ConfigUnavailable {
            cause: HubFailure::Parse(_),
            ..
        })
    ));
    assert_eq!(load.notice().map(|notice| notice.code), Some(NoticeCode::HubUnavailable));
}

#[tokio::test]
async fn missing_file_falls_back_to_cache_silently() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = HubCache::new(dir.path().join("hub.json"));
    let good = dir.path().join("good.json");
    std::fs::write(&good, DOCUMENT).expect("seed");
    loader(Some(cache.clone())).load(&HubSource::File(good)).await;

    let load = loader(Some(cache))
        .load(&HubSource::File(dir.path().join("gone.json")))
        .await;

    assert!(matches!(load.origin, HubOrigin::Cache { .. }));
    assert_eq!(load.document.link_count(), 1);
    assert_eq!(load.notice(), None);
    match load.error {
        Some(HubError::ConfigUnavailable {
            cause: HubFailure::Fetch(err),
            ..
        }) => assert_eq!(err.attempts(), 3),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn corrupt_cache_is_ignored() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache_path = dir.path().join("hub.json");
    std::fs::write(&cache_path, "garbage").expect("seed");

    let load = loader(Some(HubCache::new(cache_path)))
        .load(&HubSource::File(dir.path().join("gone.json")))
        .await;
    assert_eq!(load.origin, HubOrigin::Empty);
    assert!(load.notice().is_some());
}

#[tokio::test]
async fn fetches_remote_document() {
    let (base, _) = spawn_hub_server().await.expect("server");
    let source = HubSource::parse(&format!("{base}/hubData.json"));

    let document = loader(None).fetch(&source).await.expect("fetch");
    assert_eq!(document.categories[0].id, "tools");
    assert_eq!(
        document.blacklisted_domains,
        Some(vec!["example.net".to_string()])
    );
}

#[tokio::test]
async fn remote_failure_retries_then_reports_unavailable() {
    let (base, failures) = spawn_hub_server().await.expect("server");
    let source = HubSource::parse(&format!("{base}/broken.json"));

    let err = loader(None).fetch(&source).await.expect_err("server error");
    assert_eq!(failures.load(Ordering::SeqCst), 3);
    match err {
        HubError::ConfigUnavailable {
            origin,
            cause: HubFailure::Fetch(BoundedError::RetriesExhausted { attempts, .. }),
        } => {
            assert_eq!(origin, source.to_string());
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
}

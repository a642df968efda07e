use super::*;
use crate::{
    preferences::MemoryPreferenceStore,
    surface::{NavigationRequest, SurfaceReply},
    view::RecordingView,
    visual::HeadlessRoot,
};
use std::time::Duration;

/// Accepts navigations and never answers.
#[derive(Default)]
struct SilentSurface {
    requests: Mutex<Vec<NavigationRequest>>,
}

impl DisplaySurface for SilentSurface {
    fn navigate(&self, request: NavigationRequest, reply: SurfaceReply) {
        self.requests.lock().unwrap().push(request);
        drop(reply);
    }
}

struct Booted {
    shell: HubShell,
    report: BootReport,
    view: Arc<RecordingView>,
    root: Arc<HeadlessRoot>,
    surface: Arc<SilentSurface>,
    _dir: tempfile::TempDir,
}

async fn boot_with(document: Option<&str>, store: MemoryPreferenceStore) -> Booted {
    let dir = tempfile::tempdir().expect("tempdir");
    let hub_path = dir.path().join("hubData.json");
    if let Some(document) = document {
        std::fs::write(&hub_path, document).expect("seed hub document");
    }
    let settings = HubSettings {
        hub_document: hub_path.display().to_string(),
        news_feed: None,
        fallback_window_ms: 200,
        ..HubSettings::default()
    };

    let view = Arc::new(RecordingView::default());
    let root = Arc::new(HeadlessRoot::default());
    let surface = Arc::new(SilentSurface::default());
    let parts = ShellParts {
        root: root.clone(),
        view: view.clone(),
        surface: surface.clone(),
        preferences: Arc::new(store),
        http: HttpFetch::default(),
        hub_cache: None,
    };
    let (shell, report) = HubShell::boot(&settings, parts).await.expect("boot");
    Booted {
        shell,
        report,
        view,
        root,
        surface,
        _dir: dir,
    }
}

#[tokio::test]
async fn missing_hub_document_degrades_and_modes_still_work() {
    let booted = boot_with(None, MemoryPreferenceStore::default()).await;

    assert_eq!(booted.report.hub_origin, HubOrigin::Empty);
    assert_eq!(booted.report.categories, 0);
    assert!(booted.shell.menu().is_empty());

    let notices = booted.view.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].code, NoticeCode::HubUnavailable);

    assert_eq!(booted.report.mode, Some("dark"));
    assert_eq!(booted.root.presentation().map(|p| p.class_token), Some("theme-dark"));

    assert_eq!(booted.shell.switch_mode("cyberpunk").await, Ok("cyberpunk"));
    assert_eq!(booted.root.count_class("cp-overlay"), 1);
}

#[tokio::test]
async fn document_drives_menus_home_and_blacklist() {
    let document = r#"{
        "categories": [
            { "id": "tools", "label": "Tools", "links": [
                { "name": "Partner", "url": "https://video.partner.example/embed" }
            ] }
        ],
        "defaultHome": "https://home.example",
        "blacklistedDomains": ["partner.example"]
    }"#;
    let booted = boot_with(Some(document), MemoryPreferenceStore::with_mode("minimal")).await;

    assert_eq!(booted.report.hub_origin, HubOrigin::Fresh);
    assert_eq!(booted.report.mode, Some("minimal"));
    assert!(booted.view.notices().is_empty());

    let boot_session = booted.report.home_session.expect("home opened at boot");
    assert_eq!(booted.shell.session().token, boot_session);
    assert_eq!(booted.view.address().as_deref(), Some("https://home.example/"));
    assert!(booted.view.busy());

    booted.shell.home().expect("home");
    booted
        .shell
        .select("tools", 0)
        .expect("entry exists")
        .expect("load");
    assert!(booted.shell.select("tools", 5).is_none());

    let requests = booted.surface.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].token, boot_session);
    assert_eq!(requests[0].address.as_str(), "https://home.example/");
    assert!(!requests[0].sandboxed);
    assert_eq!(requests[1].address.as_str(), "https://home.example/");
    assert_eq!(requests[2].address.as_str(), "https://video.partner.example/embed");
    assert!(requests[2].sandboxed);
}

#[tokio::test]
async fn boot_without_home_stays_on_placeholder() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = HubSettings {
        hub_document: dir.path().join("absent.json").display().to_string(),
        default_home: None,
        news_feed: None,
        ..HubSettings::default()
    };
    let view = Arc::new(RecordingView::default());
    let surface = Arc::new(SilentSurface::default());
    let parts = ShellParts {
        root: Arc::new(HeadlessRoot::default()),
        view: view.clone(),
        surface: surface.clone(),
        preferences: Arc::new(MemoryPreferenceStore::default()),
        http: HttpFetch::default(),
        hub_cache: None,
    };
    let (_shell, report) = HubShell::boot(&settings, parts).await.expect("boot");

    assert_eq!(report.home_session, None);
    assert!(surface.requests.lock().unwrap().is_empty());
    let codes: Vec<_> = view.notices().into_iter().map(|notice| notice.code).collect();
    assert_eq!(codes, vec![NoticeCode::HubUnavailable]);
}

#[tokio::test]
async fn unknown_mode_is_reported_once() {
    let booted = boot_with(None, MemoryPreferenceStore::default()).await;
    let before = booted.view.notices().len();

    let err = booted.shell.switch_mode("vaporwave").await.expect_err("unknown");
    assert_eq!(err, ModeError::NoSuchMode("vaporwave".to_string()));

    let notices = booted.view.notices();
    assert_eq!(notices.len(), before + 1);
    assert_eq!(notices[before].code, NoticeCode::UnknownMode);
}

#[tokio::test]
async fn silent_surface_times_out_without_notice() {
    let booted = boot_with(Some(r#"{"categories": []}"#), MemoryPreferenceStore::default()).await;

    booted.shell.load("archive.org").expect("load");
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(booted.shell.session().phase, shared::domain::LoadPhase::TimedOut);
    assert!(booted.view.notices().is_empty());
    assert!(!booted.view.busy());
}

#[tokio::test]
async fn ticker_is_absent_without_feed() {
    let booted = boot_with(None, MemoryPreferenceStore::default()).await;
    assert!(!booted.shell.has_feed());
    assert_eq!(booted.shell.refresh_ticker().await, None);
}

#[tokio::test]
async fn shutdown_retires_active_mode() {
    let booted = boot_with(None, MemoryPreferenceStore::with_mode("glitch")).await;
    assert_eq!(booted.root.element_count(), 1);

    booted.shell.shutdown().await;
    assert_eq!(booted.root.element_count(), 0);
    assert_eq!(booted.shell.modes().active_effects().await, 0);
}

use super::*;
use crate::view::{RecordingView, ViewChange};
use shared::error::NoticeCode;

/// Keeps every reply so tests decide when (and whether) the surface answers.
#[derive(Default)]
struct ManualSurface {
    pending: Mutex<Vec<(NavigationRequest, SurfaceReply)>>,
}

impl ManualSurface {
    fn take(&self, token: SessionToken) -> SurfaceReply {
        let mut pending = self.pending.lock().unwrap();
        let index = pending
            .iter()
            .position(|(request, _)| request.token == token)
            .expect("navigation for token");
        pending.remove(index).1
    }

    fn requests(&self) -> Vec<NavigationRequest> {
        self.pending
            .lock()
            .unwrap()
            .iter()
            .map(|(request, _)| request.clone())
            .collect()
    }
}

impl DisplaySurface for ManualSurface {
    fn navigate(&self, request: NavigationRequest, reply: SurfaceReply) {
        self.pending.lock().unwrap().push((request, reply));
    }
}

struct Fixture {
    surface: Arc<ManualSurface>,
    view: Arc<RecordingView>,
    controller: LoadSessionController,
}

fn fixture_with(config: SessionConfig) -> Fixture {
    let surface = Arc::new(ManualSurface::default());
    let view = Arc::new(RecordingView::default());
    let controller = LoadSessionController::new(surface.clone(), view.clone(), config);
    Fixture {
        surface,
        view,
        controller,
    }
}

fn fixture() -> Fixture {
    fixture_with(SessionConfig::default())
}

#[test]
fn normalizes_addresses() {
    let endpoint = DEFAULT_SEARCH_ENDPOINT;
    assert_eq!(
        normalize_address("  https://Example.org/a?b=c ", endpoint).expect("kept").as_str(),
        "https://example.org/a?b=c"
    );
    assert_eq!(
        normalize_address("http://plain.test", endpoint).expect("kept").as_str(),
        "http://plain.test/"
    );
    assert_eq!(
        normalize_address("archive.org/details", endpoint).expect("prefixed").as_str(),
        "https://archive.org/details"
    );
    assert_eq!(
        normalize_address("localhost:8080", endpoint).expect("prefixed").as_str(),
        "https://localhost:8080/"
    );
    assert_eq!(
        normalize_address("rust async & more", endpoint).expect("search").as_str(),
        "https://swisscows.com/web?query=rust%20async%20%26%20more"
    );
    assert_eq!(
        normalize_address("a.b", endpoint).expect("search").as_str(),
        "https://swisscows.com/web?query=a.b"
    );
    assert_eq!(
        normalize_address("notes/readme.md", endpoint).expect("search").as_str(),
        "https://swisscows.com/web?query=notes%2Freadme.md"
    );
    assert_eq!(
        normalize_address("report?v=1.22", endpoint).expect("search").as_str(),
        "https://swisscows.com/web?query=report%3Fv%3D1.22"
    );
    assert_eq!(
        normalize_address("docs.rs/tokio", endpoint).expect("prefixed").as_str(),
        "https://docs.rs/tokio"
    );
    assert_eq!(
        normalize_address("localhost/admin.php", endpoint).expect("prefixed").as_str(),
        "https://localhost/admin.php"
    );
    assert_eq!(normalize_address("   ", endpoint), Err(LoadError::EmptyAddress));
    assert!(matches!(
        normalize_address("https://", endpoint),
        Err(LoadError::InvalidAddress { .. })
    ));
}

#[test]
fn blacklist_matches_domain_and_subdomains_only() {
    let blacklist = vec!["youtube.com".to_string()];
    let check = |address: &str| is_blacklisted(&Url::parse(address).expect("url"), &blacklist);
    assert!(check("https://youtube.com/watch"));
    assert!(check("https://www.YouTube.com/"));
    assert!(!check("https://notyoutube.com/"));
    assert!(!check("https://archive.org/"));
}

#[tokio::test(start_paused = true)]
async fn blank_input_changes_nothing() {
    let f = fixture();
    assert_eq!(f.controller.begin_load("  \t"), Err(LoadError::EmptyAddress));
    assert!(f.view.changes().is_empty());
    assert_eq!(f.controller.snapshot().phase, LoadPhase::Idle);
    assert!(f.surface.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn begin_load_prepares_view_and_navigates() {
    let f = fixture();
    let token = f.controller.begin_load("example.org").expect("load");

    assert_eq!(
        f.view.changes(),
        vec![
            ViewChange::Address("https://example.org/".to_string()),
            ViewChange::Busy(true),
            ViewChange::Placeholder(false),
        ]
    );
    let requests = f.surface.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].token, token);
    assert!(!requests[0].sandboxed);

    f.surface.take(token).loaded();
    let snapshot = f.controller.snapshot();
    assert_eq!(snapshot.phase, LoadPhase::Loaded);
    assert_eq!(snapshot.last_loaded.map(String::from).as_deref(), Some("https://example.org/"));
    assert!(!f.view.busy());

    // The fallback was cancelled with the settlement.
    tokio::time::sleep(DEFAULT_FALLBACK_WINDOW * 2).await;
    assert_eq!(f.controller.snapshot().phase, LoadPhase::Loaded);
    assert_eq!(f.view.busy_hidden_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn superseded_session_cannot_touch_the_view() {
    let f = fixture();
    let first = f.controller.begin_load("https://a.example").expect("a");
    let second = f.controller.begin_load("https://b.example").expect("b");
    assert!(second > first);
    let before = f.view.changes();

    f.surface.take(first).loaded();
    assert_eq!(f.view.changes(), before);
    assert!(f.view.busy());
    assert_eq!(f.controller.snapshot().phase, LoadPhase::Requesting);

    // The first session's fallback was disarmed as well.
    tokio::time::sleep(Duration::from_millis(4_000)).await;
    assert_eq!(f.view.changes(), before);

    f.surface.take(second).errored("connection reset");
    assert_eq!(f.view.notices().len(), 1);
    assert_eq!(f.controller.snapshot().phase, LoadPhase::Failed);
}

#[tokio::test(start_paused = true)]
async fn silence_times_out_once_without_notice() {
    let f = fixture();
    let token = f.controller.begin_load("https://silent.example").expect("load");

    tokio::time::sleep(Duration::from_millis(4_400)).await;
    assert!(f.view.busy());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(f.controller.snapshot().phase, LoadPhase::TimedOut);
    assert_eq!(f.view.busy_hidden_count(), 1);
    assert!(f.view.notices().is_empty());

    // A signal that shows up after the window changes nothing.
    f.surface.take(token).errored("too late");
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(f.view.busy_hidden_count(), 1);
    assert!(f.view.notices().is_empty());
    assert_eq!(f.controller.snapshot().phase, LoadPhase::TimedOut);
}

#[tokio::test(start_paused = true)]
async fn dropped_reply_is_silence() {
    let f = fixture_with(SessionConfig {
        fallback_window: Duration::from_secs(1),
        ..SessionConfig::default()
    });
    let token = f.controller.begin_load("https://framed.example").expect("load");
    drop(f.surface.take(token));

    tokio::time::sleep(Duration::from_millis(1_001)).await;
    assert_eq!(f.controller.snapshot().phase, LoadPhase::TimedOut);
    assert!(!f.view.busy());
}

#[tokio::test(start_paused = true)]
async fn failure_notifies_once_and_restores_last_loaded_address() {
    let f = fixture();
    let ok = f.controller.begin_load("https://good.example").expect("good");
    f.surface.take(ok).loaded();

    let bad = f.controller.begin_load("https://bad.example").expect("bad");
    let reply = f.surface.take(bad);
    reply.errored("dns failure");

    let notices = f.view.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].code, NoticeCode::LoadFailed);
    assert_eq!(notices[0].message, "Failed to load the content.");
    assert_eq!(f.view.address().as_deref(), Some("https://good.example/"));
    assert!(f.view.placeholder_visible());
    assert!(!f.view.busy());
}

#[tokio::test(start_paused = true)]
async fn failure_without_history_keeps_failed_address() {
    let f = fixture();
    let token = f.controller.begin_load("https://bad.example").expect("bad");
    f.surface.take(token).errored("refused");
    assert_eq!(f.view.address().as_deref(), Some("https://bad.example/"));
}

#[tokio::test(start_paused = true)]
async fn blacklisted_hosts_are_sandboxed() {
    let f = fixture();
    f.controller.begin_load("www.youtube.com/watch?v=1").expect("load");
    assert!(f.surface.requests()[0].sandboxed);

    f.controller.set_blacklist(Vec::new());
    f.controller.begin_load("www.youtube.com/watch?v=2").expect("load");
    assert!(!f.surface.requests()[1].sandboxed);
}

#[tokio::test(start_paused = true)]
async fn home_without_configuration_notifies() {
    let f = fixture();
    assert_eq!(f.controller.home(), Err(LoadError::NoHomeConfigured));
    assert_eq!(f.view.notices()[0].code, NoticeCode::NoHomeConfigured);
    assert!(f.surface.requests().is_empty());

    f.controller.set_home(Some("https://archive.org".to_string()));
    let token = f.controller.home().expect("home");
    assert_eq!(f.surface.requests()[0].token, token);
    assert_eq!(f.surface.requests()[0].address.as_str(), "https://archive.org/");
}

#[tokio::test(start_paused = true)]
async fn refresh_reissues_current_address_as_new_session() {
    let f = fixture();
    assert_eq!(f.controller.refresh(), Err(LoadError::NothingToRefresh));

    let first = f.controller.begin_load("https://news.example").expect("load");
    let second = f.controller.refresh().expect("refresh");
    assert_ne!(first, second);
    let requests = f.surface.requests();
    assert_eq!(requests[1].address, requests[0].address);

    f.surface.take(first).loaded();
    assert_eq!(f.controller.snapshot().phase, LoadPhase::Requesting);
}

#[tokio::test(start_paused = true)]
async fn shutdown_invalidates_pending_signals() {
    let f = fixture();
    let token = f.controller.begin_load("https://a.example").expect("load");
    f.controller.shutdown();
    let before = f.view.changes();

    f.surface.take(token).loaded();
    tokio::time::sleep(DEFAULT_FALLBACK_WINDOW * 2).await;
    assert_eq!(f.view.changes(), before);
}

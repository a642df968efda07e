//! Loading external content into the display surface.
//!
//! Every navigation gets a fresh [`SessionToken`]. Signals and fallback timers
//! carry the token they were issued for and are dropped unless it is still
//! current, so a superseded session can never touch the shell view.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use shared::{
    domain::{LoadPhase, SessionToken},
    error::Notice,
};
use thiserror::Error;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    surface::{DisplaySurface, NavigationRequest, SignalSink, SurfaceReply, SurfaceSignal},
    view::ShellView,
};

pub const DEFAULT_FALLBACK_WINDOW: Duration = Duration::from_millis(4_500);
pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://swisscows.com/web?query=";
pub const DEFAULT_BLACKLIST: &[&str] = &[
    "wix.com",
    "google.com",
    "youtube.com",
    "facebook.com",
    "2ix2.com",
    "sporttvhdonlinetvs.com",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("address is empty")]
    EmptyAddress,
    #[error("'{input}' is not a usable address: {reason}")]
    InvalidAddress { input: String, reason: String },
    #[error("no home address configured")]
    NoHomeConfigured,
    #[error("nothing has been loaded yet")]
    NothingToRefresh,
}

/// Turns user input into an address.
///
/// Explicit `http(s)://` addresses are kept, things that look like a host get
/// an `https://` prefix, and anything else becomes a search query.
pub fn normalize_address(input: &str, search_endpoint: &str) -> Result<Url, LoadError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(LoadError::EmptyAddress);
    }

    let lowered = input.to_ascii_lowercase();
    if lowered.starts_with("http://") || lowered.starts_with("https://") {
        return Url::parse(input).map_err(|err| LoadError::InvalidAddress {
            input: input.to_string(),
            reason: err.to_string(),
        });
    }

    if let Some(url) = host_address(input) {
        return Ok(url);
    }

    let query: String = url::form_urlencoded::byte_serialize(input.as_bytes())
        .collect::<String>()
        .replace('+', "%20");
    Url::parse(&format!("{search_endpoint}{query}")).map_err(|err| LoadError::InvalidAddress {
        input: input.to_string(),
        reason: format!("search endpoint '{search_endpoint}' is invalid: {err}"),
    })
}

/// `https://{input}` when its hostname is `localhost` or ends in a dotted
/// label of at least two word characters.
fn host_address(input: &str) -> Option<Url> {
    let url = Url::parse(&format!("https://{input}")).ok()?;
    let host = url.host_str()?;
    if host.eq_ignore_ascii_case("localhost") {
        return Some(url);
    }
    let (_, suffix) = host.rsplit_once('.')?;
    let is_suffix = suffix.len() >= 2
        && suffix
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-');
    is_suffix.then_some(url)
}

/// Hosts equal to, or under, a listed domain.
pub fn is_blacklisted(address: &Url, blacklist: &[String]) -> bool {
    let Some(host) = address.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    blacklist.iter().any(|domain| {
        let domain = domain.trim().trim_start_matches('.').to_ascii_lowercase();
        !domain.is_empty()
            && (host == domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|rest| rest.ends_with('.')))
    })
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub search_endpoint: String,
    pub fallback_window: Duration,
    pub default_home: Option<String>,
    pub blacklist: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            search_endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            fallback_window: DEFAULT_FALLBACK_WINDOW,
            default_home: None,
            blacklist: DEFAULT_BLACKLIST.iter().map(|domain| domain.to_string()).collect(),
        }
    }
}

/// Read-only view of the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub token: SessionToken,
    pub phase: LoadPhase,
    pub target: Option<Url>,
    pub last_loaded: Option<Url>,
}

#[derive(Debug)]
struct SessionState {
    token: SessionToken,
    phase: LoadPhase,
    target: Option<Url>,
    last_loaded: Option<Url>,
    fallback: Option<AbortHandle>,
    home: Option<String>,
    blacklist: Vec<String>,
}

struct LoadInner {
    surface: Arc<dyn DisplaySurface>,
    view: Arc<dyn ShellView>,
    search_endpoint: String,
    fallback_window: Duration,
    state: Mutex<SessionState>,
}

impl LoadInner {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fallback_elapsed(&self, token: SessionToken) {
        let mut state = self.state();
        if state.token != token || state.phase != LoadPhase::Requesting {
            return;
        }
        state.fallback = None;
        state.phase = LoadPhase::TimedOut;
        self.view.set_busy(false);
        info!(%token, "load: no signal inside the fallback window, giving up waiting");
    }
}

impl SignalSink for LoadInner {
    fn settle(&self, token: SessionToken, signal: SurfaceSignal) {
        let mut state = self.state();
        if state.token != token {
            debug!(%token, current = %state.token, "load: ignoring signal of superseded session");
            return;
        }
        if state.phase != LoadPhase::Requesting {
            debug!(%token, phase = ?state.phase, "load: ignoring late signal");
            return;
        }

        if let Some(fallback) = state.fallback.take() {
            fallback.abort();
        }
        self.view.set_busy(false);

        match signal {
            SurfaceSignal::Loaded => {
                state.phase = LoadPhase::Loaded;
                state.last_loaded = state.target.clone();
                info!(%token, "load: content loaded");
            }
            SurfaceSignal::Errored(reason) => {
                state.phase = LoadPhase::Failed;
                warn!(%token, "load: content failed: {reason}");
                if let Some(last_loaded) = &state.last_loaded {
                    self.view.set_address(last_loaded.as_str());
                }
                self.view.set_placeholder_visible(true);
                self.view.notify(Notice::load_failed());
            }
        }
    }
}

/// Sole owner of the display surface.
#[derive(Clone)]
pub struct LoadSessionController {
    inner: Arc<LoadInner>,
}

impl LoadSessionController {
    pub fn new(
        surface: Arc<dyn DisplaySurface>,
        view: Arc<dyn ShellView>,
        config: SessionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(LoadInner {
                surface,
                view,
                search_endpoint: config.search_endpoint,
                fallback_window: config.fallback_window,
                state: Mutex::new(SessionState {
                    token: SessionToken(0),
                    phase: LoadPhase::Idle,
                    target: None,
                    last_loaded: None,
                    fallback: None,
                    home: config.default_home,
                    blacklist: config.blacklist,
                }),
            }),
        }
    }

    /// Starts a new session for `input`, superseding the current one.
    /// Blank input is rejected and changes nothing.
    pub fn begin_load(&self, input: &str) -> Result<SessionToken, LoadError> {
        let address = normalize_address(input, &self.inner.search_endpoint)?;
        Ok(self.navigate(address))
    }

    /// Loads the configured home address.
    pub fn home(&self) -> Result<SessionToken, LoadError> {
        let home = self.inner.state().home.clone();
        match home {
            Some(home) => self.begin_load(&home),
            None => {
                self.inner.view.notify(Notice::no_home_configured());
                Err(LoadError::NoHomeConfigured)
            }
        }
    }

    /// Re-issues the current address as a new session.
    pub fn refresh(&self) -> Result<SessionToken, LoadError> {
        let target = self.inner.state().target.clone();
        match target {
            Some(target) => Ok(self.navigate(target)),
            None => Err(LoadError::NothingToRefresh),
        }
    }

    pub fn set_home(&self, home: Option<String>) {
        self.inner.state().home = home.filter(|home| !home.trim().is_empty());
    }

    pub fn home_address(&self) -> Option<String> {
        self.inner.state().home.clone()
    }

    pub fn set_blacklist(&self, blacklist: Vec<String>) {
        self.inner.state().blacklist = blacklist;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.state();
        SessionSnapshot {
            token: state.token,
            phase: state.phase,
            target: state.target.clone(),
            last_loaded: state.last_loaded.clone(),
        }
    }

    /// Invalidates the current session so no pending signal or timer applies.
    pub fn shutdown(&self) {
        let mut state = self.inner.state();
        if let Some(fallback) = state.fallback.take() {
            fallback.abort();
        }
        state.token = state.token.next();
    }

    fn navigate(&self, address: Url) -> SessionToken {
        let request = {
            let mut state = self.inner.state();
            if let Some(previous) = state.fallback.take() {
                previous.abort();
            }
            let token = state.token.next();
            state.token = token;
            state.phase = LoadPhase::Requesting;
            state.target = Some(address.clone());

            self.inner.view.set_address(address.as_str());
            self.inner.view.set_busy(true);
            self.inner.view.set_placeholder_visible(false);

            let weak = Arc::downgrade(&self.inner);
            let window = self.inner.fallback_window;
            let fallback = tokio::spawn(async move {
                tokio::time::sleep(window).await;
                if let Some(inner) = weak.upgrade() {
                    inner.fallback_elapsed(token);
                }
            });
            state.fallback = Some(fallback.abort_handle());

            NavigationRequest {
                token,
                sandboxed: is_blacklisted(&address, &state.blacklist),
                address,
            }
        };

        let token = request.token;
        info!(%token, address = %request.address, sandboxed = request.sandboxed, "load: navigating");
        let weak: Weak<LoadInner> = Arc::downgrade(&self.inner);
        let sink: Weak<dyn SignalSink> = weak;
        self.inner
            .surface
            .navigate(request, SurfaceReply::new(token, sink));
        token
    }
}

impl std::fmt::Debug for LoadSessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadSessionController")
            .field("session", &self.snapshot())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "tests/load_session_tests.rs"]
mod tests;

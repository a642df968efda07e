//! The assembled runtime: hub document, menus, load sessions, modes and the
//! news ticker behind one facade.

use std::sync::{Arc, Mutex, PoisonError};

use shared::{
    domain::SessionToken,
    error::{Notice, NoticeCode},
};
use tracing::{info, warn};

use crate::{
    bounded::BoundedError,
    feed::{render_ticker, NewsFeed},
    http::HttpFetch,
    hub_document::{HubCache, HubDocumentLoader, HubOrigin, HubSource},
    load_session::{LoadError, LoadSessionController, SessionSnapshot},
    menu::MenuModel,
    modes::{ModeCatalog, ModeController, ModeError},
    preferences::PreferenceStore,
    settings::HubSettings,
    surface::DisplaySurface,
    view::ShellView,
    visual::VisualRoot,
};

/// Collaborators the shell drives but does not implement.
pub struct ShellParts {
    pub root: Arc<dyn VisualRoot>,
    pub view: Arc<dyn ShellView>,
    pub surface: Arc<dyn DisplaySurface>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub http: HttpFetch,
    pub hub_cache: Option<HubCache>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootReport {
    pub hub_origin: HubOrigin,
    pub categories: usize,
    pub mode: Option<&'static str>,
    /// Session opened for the home address, when one is configured.
    pub home_session: Option<SessionToken>,
}

pub struct HubShell {
    view: Arc<dyn ShellView>,
    hub: HubDocumentLoader,
    session: LoadSessionController,
    modes: ModeController,
    feed: Option<NewsFeed>,
    menu: Mutex<MenuModel>,
}

impl HubShell {
    /// Loads the hub document, opens the home address and applies the
    /// persisted mode. Nothing here is fatal: failures end up as notices.
    pub async fn boot(settings: &HubSettings, parts: ShellParts) -> Result<(Self, BootReport), BoundedError> {
        let policy = settings.fetch_policy()?;
        let hub = HubDocumentLoader::new(parts.http.clone()).with_cache(parts.hub_cache);
        let session =
            LoadSessionController::new(parts.surface, Arc::clone(&parts.view), settings.session_config());
        let modes = ModeController::new(ModeCatalog::builtin(), parts.root, parts.preferences);
        let feed = settings
            .news_feed
            .as_ref()
            .map(|url| NewsFeed::new(url.clone(), parts.http, policy));

        let shell = Self {
            view: parts.view,
            hub,
            session,
            modes,
            feed,
            menu: Mutex::new(MenuModel::default()),
        };

        let hub_origin = shell.reload_hub(settings).await;
        let home_session = match shell.session.home_address() {
            Some(_) => shell
                .session
                .home()
                .inspect_err(|err| warn!("shell: home not loaded at boot: {err}"))
                .ok(),
            None => None,
        };
        let mode = match shell.modes.initialize().await {
            Ok(mode) => Some(mode),
            Err(ModeError::EffectsFailed { mode, source }) => {
                warn!(mode, "shell: mode effects failed at boot: {source}");
                Some(mode)
            }
            Err(err) => {
                warn!("shell: no mode applied at boot: {err}");
                None
            }
        };

        let report = BootReport {
            hub_origin,
            categories: shell.menu().menus().len(),
            mode,
            home_session,
        };
        info!(
            hub_origin = ?report.hub_origin,
            categories = report.categories,
            mode = report.mode.unwrap_or("none"),
            home = report.home_session.is_some(),
            "shell: booted"
        );
        Ok((shell, report))
    }

    /// Re-reads the hub document and applies its menus, home and blacklist.
    pub async fn reload_hub(&self, settings: &HubSettings) -> HubOrigin {
        let load = self.hub.load(&HubSource::parse(&settings.hub_document)).await;
        if let Some(notice) = load.notice() {
            self.view.notify(notice);
        }

        let home = load
            .document
            .default_home
            .clone()
            .or_else(|| settings.default_home.clone());
        self.session.set_home(home);
        if let Some(blacklist) = load.document.blacklisted_domains.clone() {
            self.session.set_blacklist(blacklist);
        }
        *self.menu.lock().unwrap_or_else(PoisonError::into_inner) =
            MenuModel::from_document(&load.document);
        load.origin
    }

    pub fn menu(&self) -> MenuModel {
        self.menu.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Loads user input. Blank input is ignored; unusable input is reported.
    pub fn load(&self, input: &str) -> Result<SessionToken, LoadError> {
        self.session.begin_load(input).inspect_err(|err| {
            if let LoadError::InvalidAddress { .. } = err {
                self.view
                    .notify(Notice::new(NoticeCode::InvalidAddress, err.to_string()));
            }
        })
    }

    /// Loads the `index`-th link of menu `menu_id`.
    pub fn select(&self, menu_id: &str, index: usize) -> Option<Result<SessionToken, LoadError>> {
        let address = self.menu().select(menu_id, index)?.address.clone();
        Some(self.load(&address))
    }

    pub fn home(&self) -> Result<SessionToken, LoadError> {
        self.session.home()
    }

    pub fn refresh(&self) -> Result<SessionToken, LoadError> {
        self.session.refresh()
    }

    pub fn session(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    pub async fn switch_mode(&self, mode_id: &str) -> Result<&'static str, ModeError> {
        self.modes.switch_to(mode_id).await.inspect_err(|err| self.report_mode_error(err))
    }

    pub async fn cycle_mode(&self) -> Result<&'static str, ModeError> {
        self.modes.cycle().await.inspect_err(|err| self.report_mode_error(err))
    }

    pub fn modes(&self) -> &ModeController {
        &self.modes
    }

    pub fn has_feed(&self) -> bool {
        self.feed.is_some()
    }

    /// Fetches the ticker line. A failure shows one notice and yields `None`.
    pub async fn refresh_ticker(&self) -> Option<String> {
        let feed = self.feed.as_ref()?;
        match feed.items().await {
            Ok(items) => Some(render_ticker(&items)),
            Err(err) => {
                warn!(feed = feed.url(), "shell: ticker refresh failed: {err}");
                self.view.notify(Notice::feed_unavailable());
                None
            }
        }
    }

    /// Retires the active mode and abandons every outstanding fetch.
    pub async fn shutdown(&self) {
        self.modes.shutdown().await;
        self.session.shutdown();
        self.hub.shutdown();
        if let Some(feed) = &self.feed {
            feed.shutdown();
        }
    }

    fn report_mode_error(&self, err: &ModeError) {
        if let ModeError::NoSuchMode(id) = err {
            self.view.notify(Notice::new(
                NoticeCode::UnknownMode,
                format!("Unknown mode '{id}'."),
            ));
        }
    }
}

#[cfg(test)]
#[path = "tests/shell_tests.rs"]
mod tests;

//! Backend worker: owns the hub runtime on its own thread and turns queued
//! commands into shell operations. Everything it reports goes back to the
//! terminal as `UiEvent`s.

use std::{sync::Arc, thread, time::Duration};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use hub_core::{
    feed::FEED_CACHE_TTL,
    http::HttpFetch,
    hub_document::HubCache,
    load_session::LoadError,
    modes::ModeError,
    preferences::{JsonPreferenceStore, MemoryPreferenceStore, PreferenceStore},
    surface::ProbeSurface,
    view::ShellView,
    visual::{HeadlessRoot, RootEvent},
    HubSettings, HubShell, ShellParts,
};
use shared::error::Notice;
use tokio::{sync::mpsc, time::MissedTickBehavior};

use crate::{
    backend_bridge::commands::BackendCommand,
    controller::events::{UiError, UiErrorContext, UiEvent},
};

const TICKER_PERIOD: Duration = FEED_CACHE_TTL;

#[derive(Debug, Clone, Default)]
pub struct BackendOptions {
    /// Keep preferences in memory and skip the on-disk hub cache.
    pub ephemeral: bool,
}

/// Forwards shell view changes to the terminal.
struct TerminalView {
    ui_tx: Sender<UiEvent>,
}

impl TerminalView {
    fn send(&self, event: UiEvent) {
        if let Err(TrySendError::Full(_)) = self.ui_tx.try_send(event) {
            tracing::debug!("ui event queue full; dropping view change");
        }
    }
}

impl ShellView for TerminalView {
    fn set_busy(&self, busy: bool) {
        self.send(UiEvent::Busy(busy));
    }

    fn set_placeholder_visible(&self, visible: bool) {
        self.send(UiEvent::PlaceholderVisible(visible));
    }

    fn set_address(&self, address: &str) {
        self.send(UiEvent::Address(address.to_string()));
    }

    fn notify(&self, notice: Notice) {
        self.send(UiEvent::Notice(notice));
    }
}

pub fn spawn_backend_thread(
    settings: HubSettings,
    options: BackendOptions,
    cmd_rx: Receiver<BackendCommand>,
    ui_tx: Sender<UiEvent>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let _ = ui_tx.try_send(UiEvent::Info("Backend worker starting...".to_string()));
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                    UiErrorContext::BackendStartup,
                    format!("backend worker startup failure: failed to build runtime: {err}"),
                )));
                tracing::error!("failed to build backend runtime: {err}");
                let _ = ui_tx.try_send(UiEvent::Stopped);
                return;
            }
        };

        // crossbeam receivers block; hand commands to the runtime through a
        // tokio channel so timers keep running between commands.
        let (async_tx, async_rx) = mpsc::unbounded_channel();
        thread::spawn(move || {
            while let Ok(cmd) = cmd_rx.recv() {
                if async_tx.send(cmd).is_err() {
                    break;
                }
            }
        });

        runtime.block_on(run_backend(settings, options, async_rx, ui_tx.clone()));
        let _ = ui_tx.try_send(UiEvent::Stopped);
    })
}

async fn run_backend(
    settings: HubSettings,
    options: BackendOptions,
    mut cmd_rx: mpsc::UnboundedReceiver<BackendCommand>,
    ui_tx: Sender<UiEvent>,
) {
    let policy = match settings.fetch_policy() {
        Ok(policy) => policy,
        Err(err) => {
            let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                UiErrorContext::BackendStartup,
                format!("backend worker startup failure: {err}"),
            )));
            return;
        }
    };

    let http = HttpFetch::default();
    let root = Arc::new(HeadlessRoot::default());
    let surface = Arc::new(ProbeSurface::new(http.clone(), policy));
    let preferences: Arc<dyn PreferenceStore> = match (options.ephemeral, JsonPreferenceStore::in_user_config_dir()) {
        (false, Some(store)) => {
            tracing::debug!(path = %store.path().display(), "using persisted preferences");
            Arc::new(store)
        }
        _ => Arc::new(MemoryPreferenceStore::default()),
    };
    let hub_cache = if options.ephemeral {
        None
    } else {
        HubCache::in_user_cache_dir()
    };

    let parts = ShellParts {
        root: root.clone(),
        view: Arc::new(TerminalView {
            ui_tx: ui_tx.clone(),
        }),
        surface: surface.clone(),
        preferences,
        http,
        hub_cache,
    };
    let (shell, report) = match HubShell::boot(&settings, parts).await {
        Ok(booted) => booted,
        Err(err) => {
            let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                UiErrorContext::BackendStartup,
                format!("backend worker startup failure: {err}"),
            )));
            return;
        }
    };
    let _ = ui_tx.try_send(UiEvent::Booted {
        hub_origin: format!("{:?}", report.hub_origin),
        categories: report.categories,
        mode: report.mode,
    });
    let _ = ui_tx.try_send(UiEvent::Menus(shell.menu().menus().to_vec()));

    let mut ticker = tokio::time::interval(TICKER_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let ticker_enabled = shell.has_feed();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                if cmd == BackendCommand::Shutdown {
                    break;
                }
                handle_command(&shell, &root, &settings, cmd, &ui_tx).await;
            }
            _ = ticker.tick(), if ticker_enabled => {
                if let Some(line) = shell.refresh_ticker().await {
                    let _ = ui_tx.try_send(UiEvent::Ticker(line));
                }
            }
        }
    }

    shell.shutdown().await;
    surface.shutdown();
    tracing::info!("backend worker stopped");
}

async fn handle_command(
    shell: &HubShell,
    root: &HeadlessRoot,
    settings: &HubSettings,
    cmd: BackendCommand,
    ui_tx: &Sender<UiEvent>,
) {
    let cmd_name = cmd.name();
    tracing::debug!(command = cmd_name, "handling backend command");

    match cmd {
        BackendCommand::Load { input } => report_load(shell.load(&input), ui_tx),
        BackendCommand::Select { menu_id, index } => match shell.select(&menu_id, index) {
            Some(result) => report_load(result, ui_tx),
            None => {
                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                    UiErrorContext::Load,
                    format!("menu '{menu_id}' has no entry {}", index + 1),
                )));
            }
        },
        BackendCommand::Home => report_load(shell.home(), ui_tx),
        BackendCommand::Refresh => report_load(shell.refresh(), ui_tx),
        BackendCommand::SwitchMode { mode_id } => report_mode(shell.switch_mode(&mode_id).await, ui_tx),
        BackendCommand::CycleMode => report_mode(shell.cycle_mode().await, ui_tx),
        BackendCommand::Click { x, y } => {
            root.emit(RootEvent::Click { x, y });
            // Let click handlers run before counting.
            tokio::task::yield_now().await;
            let _ = ui_tx.try_send(UiEvent::Info(format!(
                "{} element(s) on the visual root",
                root.element_count()
            )));
        }
        BackendCommand::ReloadHub => {
            let origin = shell.reload_hub(settings).await;
            let _ = ui_tx.try_send(UiEvent::Info(format!("hub document reloaded ({origin:?})")));
            let _ = ui_tx.try_send(UiEvent::Menus(shell.menu().menus().to_vec()));
        }
        BackendCommand::RefreshTicker => {
            if !shell.has_feed() {
                let _ = ui_tx.try_send(UiEvent::Info("no news feed configured".to_string()));
            } else if let Some(line) = shell.refresh_ticker().await {
                let _ = ui_tx.try_send(UiEvent::Ticker(line));
            }
        }
        BackendCommand::Shutdown => {}
    }
}

fn report_load<T>(result: Result<T, LoadError>, ui_tx: &Sender<UiEvent>) {
    match result {
        Ok(_) => {}
        // Blank input is ignored; the other variants already produced a notice.
        Err(LoadError::EmptyAddress | LoadError::InvalidAddress { .. } | LoadError::NoHomeConfigured) => {}
        Err(err @ LoadError::NothingToRefresh) => {
            let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                UiErrorContext::Load,
                err.to_string(),
            )));
        }
    }
}

fn report_mode(result: Result<&'static str, ModeError>, ui_tx: &Sender<UiEvent>) {
    match result {
        Ok(mode) => {
            let _ = ui_tx.try_send(UiEvent::ModeChanged(mode));
        }
        Err(ModeError::NoSuchMode(_)) => {}
        Err(ModeError::EffectsFailed { mode, source }) => {
            let _ = ui_tx.try_send(UiEvent::ModeChanged(mode));
            let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                UiErrorContext::Mode,
                format!("mode '{mode}' applied without effects: {source}"),
            )));
        }
    }
}

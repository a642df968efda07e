use std::{
    io::{self, BufRead},
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
    thread,
    time::Instant,
};

mod backend_bridge;
mod controller;
mod ui;

use anyhow::{Context, Result};
use backend_bridge::{
    commands::BackendCommand,
    runtime::{spawn_backend_thread, BackendOptions},
};
use clap::Parser;
use controller::{
    events::UiEvent,
    orchestration::{dispatch_backend_command, parse_input, Input, HELP},
};
use crossbeam_channel::{bounded, Receiver};
use hub_core::{
    settings::{apply_env_overrides, load_settings_file},
    load_settings, HubSettings,
};
use tracing_subscriber::EnvFilter;
use ui::app::TerminalApp;

#[derive(Parser, Debug)]
#[command(name = "hubshell", about = "Interactive terminal front end for the content hub")]
struct Args {
    /// Settings file; defaults to $HUBSHELL_CONFIG or ./hubshell.toml.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Hub document path or http(s) address.
    #[arg(long)]
    hub_document: Option<String>,
    #[arg(long)]
    home: Option<String>,
    /// Mode to switch to once the hub is ready.
    #[arg(long)]
    mode: Option<String>,
    #[arg(long)]
    fallback_window_ms: Option<u64>,
    #[arg(long)]
    no_feed: bool,
    /// Keep preferences in memory and skip the hub document cache.
    #[arg(long)]
    ephemeral: bool,
}

impl Args {
    fn settings(&self) -> Result<HubSettings> {
        let mut settings = match &self.config {
            Some(path) => {
                let mut settings = load_settings_file(path)
                    .context("failed to load settings")?
                    .with_context(|| format!("settings file {} does not exist", path.display()))?;
                apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
                settings
            }
            None => load_settings(),
        };

        if let Some(hub_document) = &self.hub_document {
            settings.hub_document = hub_document.clone();
        }
        if let Some(home) = &self.home {
            settings.default_home = Some(home.clone());
        }
        if let Some(window) = self.fallback_window_ms {
            settings.fallback_window_ms = window;
        }
        if self.no_feed {
            settings.news_feed = None;
        }
        Ok(settings)
    }
}

fn spawn_event_printer(ui_rx: Receiver<UiEvent>, app: Arc<Mutex<TerminalApp>>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while let Ok(event) = ui_rx.recv() {
            let line = app
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .apply(event, Instant::now());
            if let Some(line) = line {
                println!("{line}");
            }
        }
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let settings = args.settings()?;
    let app = Arc::new(Mutex::new(TerminalApp::new(settings.notice_duration())));

    let (cmd_tx, cmd_rx) = bounded::<BackendCommand>(256);
    let (ui_tx, ui_rx) = bounded::<UiEvent>(2048);
    let backend = spawn_backend_thread(
        settings,
        BackendOptions {
            ephemeral: args.ephemeral,
        },
        cmd_rx,
        ui_tx,
    );
    let printer = spawn_event_printer(ui_rx, Arc::clone(&app));

    let mut status = String::new();
    if let Some(mode_id) = args.mode {
        dispatch_backend_command(&cmd_tx, BackendCommand::SwitchMode { mode_id }, &mut status);
    }

    println!("{HELP}");
    for line in io::stdin().lock().lines() {
        let line = line.context("failed to read input")?;
        let input = match parse_input(&line) {
            Ok(input) => input,
            Err(usage) => {
                println!("{usage}");
                continue;
            }
        };

        match input {
            Input::Backend(cmd) => dispatch_backend_command(&cmd_tx, cmd, &mut status),
            Input::Menus => {
                for line in app.lock().unwrap_or_else(PoisonError::into_inner).menu_lines() {
                    println!("{line}");
                }
            }
            Input::Status => {
                for line in app
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .status_lines(Instant::now())
                {
                    println!("{line}");
                }
            }
            Input::Help => println!("{HELP}"),
            Input::Quit => break,
            Input::Nothing => {}
        }

        if !status.is_empty() {
            println!("{}", std::mem::take(&mut status));
        }
        if app.lock().unwrap_or_else(PoisonError::into_inner).is_stopped() {
            break;
        }
    }

    dispatch_backend_command(&cmd_tx, BackendCommand::Shutdown, &mut status);
    drop(cmd_tx);
    if backend.join().is_err() {
        tracing::error!("backend worker panicked");
    }
    let _ = printer.join();
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use crossbeam_channel::bounded;
    use shared::error::Notice;

    use super::{
        dispatch_backend_command, parse_input, BackendCommand, Input, TerminalApp, UiEvent,
    };
    use crate::controller::events::{UiError, UiErrorCategory, UiErrorContext};

    #[test]
    fn parses_commands_and_treats_bare_text_as_load() {
        assert_eq!(parse_input("  "), Ok(Input::Nothing));
        assert_eq!(parse_input("QUIT"), Ok(Input::Quit));
        assert_eq!(
            parse_input("mode Matrix"),
            Ok(Input::Backend(BackendCommand::SwitchMode {
                mode_id: "Matrix".to_string()
            }))
        );
        assert_eq!(
            parse_input("select news 2"),
            Ok(Input::Backend(BackendCommand::Select {
                menu_id: "news".to_string(),
                index: 1
            }))
        );
        assert_eq!(
            parse_input("click 10 20.5"),
            Ok(Input::Backend(BackendCommand::Click { x: 10.0, y: 20.5 }))
        );
        assert_eq!(
            parse_input("rust async book"),
            Ok(Input::Backend(BackendCommand::Load {
                input: "rust async book".to_string()
            }))
        );
    }

    #[test]
    fn rejects_malformed_arguments() {
        assert!(parse_input("mode").is_err());
        assert!(parse_input("select news 0").is_err());
        assert!(parse_input("select news").is_err());
        assert!(parse_input("click 1").is_err());
        assert!(parse_input("click a b").is_err());
    }

    #[test]
    fn reports_full_and_disconnected_queues() {
        let (cmd_tx, cmd_rx) = bounded::<BackendCommand>(1);
        let mut status = String::new();

        dispatch_backend_command(&cmd_tx, BackendCommand::Home, &mut status);
        assert!(status.is_empty());

        dispatch_backend_command(&cmd_tx, BackendCommand::Refresh, &mut status);
        assert_eq!(status, "Command queue is full; please retry");

        drop(cmd_rx);
        dispatch_backend_command(&cmd_tx, BackendCommand::Home, &mut status);
        let err = UiError::from_message(UiErrorContext::General, status.as_str());
        assert_eq!(err.category(), UiErrorCategory::Transport);
        assert!(err.is_retryable());
    }

    #[test]
    fn notice_expires_after_its_duration() {
        let mut app = TerminalApp::new(Duration::from_millis(4_000));
        let shown = Instant::now();
        let line = app.apply(UiEvent::Notice(Notice::load_failed()), shown);

        assert_eq!(line.as_deref(), Some("! Failed to load the content."));
        assert_eq!(
            app.active_notice(shown + Duration::from_millis(3_999)),
            Some(&Notice::load_failed())
        );
        assert_eq!(app.active_notice(shown + Duration::from_millis(4_000)), None);
    }

    #[test]
    fn status_reflects_view_changes() {
        let mut app = TerminalApp::new(Duration::from_secs(4));
        let now = Instant::now();

        app.apply(UiEvent::Address("https://archive.org/".to_string()), now);
        app.apply(UiEvent::PlaceholderVisible(false), now);
        assert_eq!(
            app.apply(UiEvent::Busy(true), now).as_deref(),
            Some("loading https://archive.org/")
        );
        assert_eq!(app.apply(UiEvent::Busy(true), now), None);
        app.apply(UiEvent::ModeChanged("glitch"), now);

        let lines = app.status_lines(now);
        assert_eq!(lines[0], "address: https://archive.org/ [loading]");
        assert_eq!(lines[1], "mode: glitch");

        app.apply(UiEvent::Busy(false), now);
        app.apply(UiEvent::PlaceholderVisible(true), now);
        assert_eq!(app.status_lines(now)[0], "address: (placeholder)");
    }

    #[test]
    fn validation_messages_are_not_retryable() {
        let err = UiError::from_message(UiErrorContext::Load, "nothing has been loaded yet");
        assert_eq!(err.category(), UiErrorCategory::Validation);
        assert_eq!(err.context(), UiErrorContext::Load);
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "[load] nothing has been loaded yet");
    }
}

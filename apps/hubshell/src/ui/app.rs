use std::time::{Duration, Instant};

use hub_core::menu::Menu;
use shared::error::Notice;

use crate::controller::events::UiEvent;

/// Terminal-side state rebuilt from backend events.
#[derive(Debug)]
pub struct TerminalApp {
    notice_duration: Duration,
    address: String,
    busy: bool,
    placeholder_visible: bool,
    mode: Option<&'static str>,
    ticker: Option<String>,
    menus: Vec<Menu>,
    notice: Option<(Notice, Instant)>,
    stopped: bool,
}

impl TerminalApp {
    pub fn new(notice_duration: Duration) -> Self {
        Self {
            notice_duration,
            address: String::new(),
            busy: false,
            placeholder_visible: true,
            mode: None,
            ticker: None,
            menus: Vec::new(),
            notice: None,
            stopped: false,
        }
    }

    /// Folds one event into the state. Returns the line to print, if any.
    pub fn apply(&mut self, event: UiEvent, now: Instant) -> Option<String> {
        match event {
            UiEvent::Info(message) => Some(message),
            UiEvent::Error(err) => Some(err.to_string()),
            UiEvent::Booted {
                hub_origin,
                categories,
                mode,
            } => {
                self.mode = mode;
                Some(format!(
                    "hub ready: {categories} menu(s) from {hub_origin}, mode {}",
                    mode.unwrap_or("none")
                ))
            }
            UiEvent::Menus(menus) => {
                self.menus = menus;
                None
            }
            UiEvent::Busy(busy) => {
                let changed = self.busy != busy;
                self.busy = busy;
                match (changed, busy) {
                    (true, true) => Some(format!("loading {}", self.address)),
                    (true, false) => Some("settled".to_string()),
                    _ => None,
                }
            }
            UiEvent::PlaceholderVisible(visible) => {
                self.placeholder_visible = visible;
                None
            }
            UiEvent::Address(address) => {
                self.address = address;
                None
            }
            UiEvent::Notice(notice) => {
                let line = format!("! {notice}");
                self.notice = Some((notice, now));
                Some(line)
            }
            UiEvent::ModeChanged(mode) => {
                self.mode = Some(mode);
                Some(format!("mode: {mode}"))
            }
            UiEvent::Ticker(line) => {
                self.ticker = Some(line.clone());
                Some(format!("news: {line}"))
            }
            UiEvent::Stopped => {
                self.stopped = true;
                Some("backend stopped".to_string())
            }
        }
    }

    /// The last notice while it is still within its display duration.
    pub fn active_notice(&self, now: Instant) -> Option<&Notice> {
        self.notice
            .as_ref()
            .filter(|(_, shown_at)| now.saturating_duration_since(*shown_at) < self.notice_duration)
            .map(|(notice, _)| notice)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn status_lines(&self, now: Instant) -> Vec<String> {
        let address = if self.placeholder_visible || self.address.is_empty() {
            "(placeholder)"
        } else {
            self.address.as_str()
        };
        let mut lines = vec![
            format!("address: {address}{}", if self.busy { " [loading]" } else { "" }),
            format!("mode: {}", self.mode.unwrap_or("none")),
        ];
        if let Some(ticker) = &self.ticker {
            lines.push(format!("news: {ticker}"));
        }
        if let Some(notice) = self.active_notice(now) {
            lines.push(format!("notice: {notice}"));
        }
        lines
    }

    pub fn menu_lines(&self) -> Vec<String> {
        if self.menus.is_empty() {
            return vec!["no menus".to_string()];
        }
        let mut lines = Vec::new();
        for menu in &self.menus {
            lines.push(format!("{} [{}]", menu.id, menu.placeholder));
            for (position, entry) in menu.entries.iter().enumerate() {
                lines.push(format!("  {}. {} -> {}", position + 1, entry.label, entry.address));
            }
        }
        lines
    }
}

//! Backend-to-terminal events and error modeling for the shell controller.

use hub_core::menu::Menu;
use shared::error::Notice;

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Info(String),
    Error(UiError),
    Booted {
        hub_origin: String,
        categories: usize,
        mode: Option<&'static str>,
    },
    Menus(Vec<Menu>),
    Busy(bool),
    PlaceholderVisible(bool),
    Address(String),
    Notice(Notice),
    ModeChanged(&'static str),
    Ticker(String),
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorCategory {
    Transport,
    Validation,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorContext {
    BackendStartup,
    Load,
    Mode,
    General,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiError {
    category: UiErrorCategory,
    context: UiErrorContext,
    message: String,
}

impl UiError {
    pub fn from_message(context: UiErrorContext, message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();
        let category = if lower.contains("invalid")
            || lower.contains("unknown")
            || lower.contains("malformed")
            || lower.contains("nothing")
        {
            UiErrorCategory::Validation
        } else if lower.contains("timed out")
            || lower.contains("connection")
            || lower.contains("network")
            || lower.contains("unavailable")
            || lower.contains("disconnected")
            || lower.contains("queue is full")
        {
            UiErrorCategory::Transport
        } else {
            UiErrorCategory::Unknown
        };

        Self {
            category,
            context,
            message,
        }
    }

    pub fn category(&self) -> UiErrorCategory {
        self.category
    }

    pub fn context(&self) -> UiErrorContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether retrying the same command may succeed.
    pub fn is_retryable(&self) -> bool {
        self.category == UiErrorCategory::Transport
    }
}

impl std::fmt::Display for UiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let context = match self.context {
            UiErrorContext::BackendStartup => "startup",
            UiErrorContext::Load => "load",
            UiErrorContext::Mode => "mode",
            UiErrorContext::General => "error",
        };
        write!(f, "[{context}] {}", self.message)
    }
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeCode {
    LoadFailed,
    HubUnavailable,
    NoHomeConfigured,
    FeedUnavailable,
    UnknownMode,
    InvalidAddress,
}

/// A transient, user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub code: NoticeCode,
    pub message: String,
}

impl Notice {
    pub fn new(code: NoticeCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn load_failed() -> Self {
        Self::new(NoticeCode::LoadFailed, "Failed to load the content.")
    }

    pub fn hub_unavailable() -> Self {
        Self::new(
            NoticeCode::HubUnavailable,
            "Could not load hub data; please check JSON.",
        )
    }

    pub fn no_home_configured() -> Self {
        Self::new(NoticeCode::NoHomeConfigured, "No home URL configured.")
    }

    pub fn feed_unavailable() -> Self {
        Self::new(NoticeCode::FeedUnavailable, "Failed to load news feed.")
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

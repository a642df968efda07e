use std::sync::{Mutex, PoisonError};

use shared::error::Notice;

/// The chrome around the display surface that a load session drives.
pub trait ShellView: Send + Sync {
    fn set_busy(&self, busy: bool);
    fn set_placeholder_visible(&self, visible: bool);
    fn set_address(&self, address: &str);
    fn notify(&self, notice: Notice);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewChange {
    Busy(bool),
    Placeholder(bool),
    Address(String),
    Notice(Notice),
}

/// Records every change so callers can inspect the resulting state.
#[derive(Debug, Default)]
pub struct RecordingView {
    changes: Mutex<Vec<ViewChange>>,
}

impl RecordingView {
    fn push(&self, change: ViewChange) {
        self.changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(change);
    }

    pub fn changes(&self) -> Vec<ViewChange> {
        self.changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.changes()
            .into_iter()
            .filter_map(|change| match change {
                ViewChange::Notice(notice) => Some(notice),
                _ => None,
            })
            .collect()
    }

    pub fn busy(&self) -> bool {
        self.changes()
            .iter()
            .rev()
            .find_map(|change| match change {
                ViewChange::Busy(busy) => Some(*busy),
                _ => None,
            })
            .unwrap_or(false)
    }

    /// How many times the busy indicator went from shown to hidden.
    pub fn busy_hidden_count(&self) -> usize {
        self.changes()
            .iter()
            .filter(|change| matches!(change, ViewChange::Busy(false)))
            .count()
    }

    pub fn placeholder_visible(&self) -> bool {
        self.changes()
            .iter()
            .rev()
            .find_map(|change| match change {
                ViewChange::Placeholder(visible) => Some(*visible),
                _ => None,
            })
            .unwrap_or(true)
    }

    pub fn address(&self) -> Option<String> {
        self.changes().into_iter().rev().find_map(|change| match change {
            ViewChange::Address(address) => Some(address),
            _ => None,
        })
    }
}

impl ShellView for RecordingView {
    fn set_busy(&self, busy: bool) {
        self.push(ViewChange::Busy(busy));
    }

    fn set_placeholder_visible(&self, visible: bool) {
        self.push(ViewChange::Placeholder(visible));
    }

    fn set_address(&self, address: &str) {
        self.push(ViewChange::Address(address.to_string()));
    }

    fn notify(&self, notice: Notice) {
        self.push(ViewChange::Notice(notice));
    }
}

//! Runtime for a single-surface content hub: bounded fetches, load sessions
//! with a fallback timer, and visual modes whose effects are owned by a
//! per-mode registry.

pub mod bounded;
pub mod effects;
pub mod feed;
pub mod http;
pub mod hub_document;
pub mod load_session;
pub mod menu;
pub mod modes;
pub mod preferences;
pub mod settings;
pub mod shell;
pub mod surface;
pub mod view;
pub mod visual;

pub use bounded::{Backoff, BoundedError, BoundedExecutor, OperationHandle, OperationRequest, RetryPolicy};
pub use effects::{EffectError, EffectRegistry};
pub use load_session::{LoadError, LoadSessionController};
pub use modes::{ModeCatalog, ModeController, ModeError};
pub use settings::{load_settings, HubSettings};
pub use shell::{HubShell, ShellParts};

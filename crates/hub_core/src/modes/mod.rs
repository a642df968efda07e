//! Visual modes and the controller that switches between them.
//!
//! A switch retires the previous mode's registry before the new mode's
//! presentation is applied, and only then hands a fresh registry to the new
//! mode's effect function. Switches are serialized through an async mutex, so
//! concurrent requests queue up in arrival order and never interleave.

pub mod effects;

use std::{fmt, sync::Arc};

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    effects::{EffectError, EffectRegistry},
    preferences::PreferenceStore,
    visual::{Presentation, VisualRoot},
};

pub type EffectFn =
    Arc<dyn Fn(&EffectRegistry, &Arc<dyn VisualRoot>) -> Result<(), EffectError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModeError {
    #[error("no such mode: '{0}'")]
    NoSuchMode(String),
    #[error("effects of mode '{mode}' failed to start: {source}")]
    EffectsFailed {
        mode: &'static str,
        #[source]
        source: EffectError,
    },
}

#[derive(Clone)]
pub struct ModeSpec {
    pub id: &'static str,
    pub presentation: Presentation,
    spawn_effects: Option<EffectFn>,
}

impl ModeSpec {
    /// A mode with a presentation and nothing else.
    pub fn static_only(id: &'static str, presentation: Presentation) -> Self {
        Self {
            id,
            presentation,
            spawn_effects: None,
        }
    }

    pub fn with_effects<F>(id: &'static str, presentation: Presentation, spawn_effects: F) -> Self
    where
        F: Fn(&EffectRegistry, &Arc<dyn VisualRoot>) -> Result<(), EffectError> + Send + Sync + 'static,
    {
        Self {
            id,
            presentation,
            spawn_effects: Some(Arc::new(spawn_effects)),
        }
    }

    pub fn has_effects(&self) -> bool {
        self.spawn_effects.is_some()
    }

    fn spawn_effects(
        &self,
        registry: &EffectRegistry,
        root: &Arc<dyn VisualRoot>,
    ) -> Result<(), EffectError> {
        match &self.spawn_effects {
            Some(spawn) => spawn(registry, root),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ModeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModeSpec")
            .field("id", &self.id)
            .field("presentation", &self.presentation)
            .field("has_effects", &self.has_effects())
            .finish()
    }
}

/// Root class `theme-<id>`, stylesheet keyed by the bare id.
macro_rules! presentation {
    ($id:literal, $label:literal) => {
        Presentation {
            class_token: concat!("theme-", $id),
            stylesheet: $id,
            label: $label,
        }
    };
}

/// The fixed, ordered set of modes.
#[derive(Debug, Clone)]
pub struct ModeCatalog {
    modes: Vec<ModeSpec>,
}

impl ModeCatalog {
    pub fn new(modes: Vec<ModeSpec>) -> Self {
        Self { modes }
    }

    pub fn builtin() -> Self {
        Self::new(vec![
            ModeSpec::static_only("dark", presentation!("dark", "Dark")),
            ModeSpec::with_effects("kuromi", presentation!("kuromi", "Kuromi"), effects::kuromi),
            ModeSpec::with_effects("comic", presentation!("comic", "Comic"), effects::comic),
            ModeSpec::with_effects("glitch", presentation!("glitch", "Glitch"), effects::glitch),
            ModeSpec::with_effects("matrix", presentation!("matrix", "Matrix"), effects::matrix),
            ModeSpec::with_effects("anime", presentation!("anime", "Anime"), effects::anime),
            ModeSpec::with_effects(
                "cyberpunk",
                presentation!("cyberpunk", "Cyberpunk"),
                effects::cyberpunk,
            ),
            ModeSpec::static_only("minimal", presentation!("minimal", "Minimal")),
        ])
    }

    pub fn get(&self, id: &str) -> Option<&ModeSpec> {
        let id = id.trim();
        self.modes
            .iter()
            .find(|mode| mode.id.eq_ignore_ascii_case(id))
    }

    pub fn first(&self) -> Option<&ModeSpec> {
        self.modes.first()
    }

    /// The mode after `id`, wrapping around. Unknown ids start over.
    pub fn next_after(&self, id: Option<&str>) -> Option<&ModeSpec> {
        let position = id.and_then(|id| self.modes.iter().position(|mode| mode.id == id));
        match position {
            Some(index) => self.modes.get((index + 1) % self.modes.len()),
            None => self.first(),
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.modes.iter().map(|mode| mode.id)
    }

    pub fn modes(&self) -> &[ModeSpec] {
        &self.modes
    }

    pub fn len(&self) -> usize {
        self.modes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }
}

impl Default for ModeCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[derive(Debug, Default)]
struct ModeState {
    current: Option<&'static str>,
    registry: Option<EffectRegistry>,
}

pub struct ModeController {
    catalog: ModeCatalog,
    root: Arc<dyn VisualRoot>,
    preferences: Arc<dyn PreferenceStore>,
    state: Mutex<ModeState>,
}

impl ModeController {
    pub fn new(
        catalog: ModeCatalog,
        root: Arc<dyn VisualRoot>,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Self {
        Self {
            catalog,
            root,
            preferences,
            state: Mutex::new(ModeState::default()),
        }
    }

    pub fn catalog(&self) -> &ModeCatalog {
        &self.catalog
    }

    /// Applies the persisted mode, or the first mode when none is stored,
    /// the stored one is unknown, or the store cannot be read.
    pub async fn initialize(&self) -> Result<&'static str, ModeError> {
        let stored = match self.preferences.load_mode() {
            Ok(stored) => stored,
            Err(err) => {
                warn!("modes: could not read persisted mode: {err:#}");
                None
            }
        };

        let spec = match stored.as_deref().and_then(|id| self.catalog.get(id)) {
            Some(spec) => spec,
            None => {
                if let Some(unknown) = stored.as_deref() {
                    warn!(mode = unknown, "modes: ignoring unknown persisted mode");
                }
                self.catalog
                    .first()
                    .ok_or_else(|| ModeError::NoSuchMode(String::new()))?
            }
        };

        let mut state = self.state.lock().await;
        self.activate(&mut state, spec)
    }

    pub async fn switch_to(&self, mode_id: &str) -> Result<&'static str, ModeError> {
        let spec = self
            .catalog
            .get(mode_id)
            .ok_or_else(|| ModeError::NoSuchMode(mode_id.to_string()))?;
        let mut state = self.state.lock().await;
        self.activate(&mut state, spec)
    }

    /// Switches to the mode after the current one, wrapping at the end.
    pub async fn cycle(&self) -> Result<&'static str, ModeError> {
        let mut state = self.state.lock().await;
        let spec = self
            .catalog
            .next_after(state.current)
            .ok_or_else(|| ModeError::NoSuchMode(String::new()))?;
        self.activate(&mut state, spec)
    }

    pub async fn current(&self) -> Option<&'static str> {
        self.state.lock().await.current
    }

    /// Entries held by the active registry.
    pub async fn active_effects(&self) -> usize {
        self.state
            .lock()
            .await
            .registry
            .as_ref()
            .map_or(0, EffectRegistry::len)
    }

    /// Retires the active registry. The current mode stays recorded.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if let Some(registry) = state.registry.take() {
            let released = registry.retire();
            info!(mode = registry.scope(), released, "modes: shut down");
        }
    }

    /// Retire, present, spawn, record. Contains no suspension point.
    fn activate(&self, state: &mut ModeState, spec: &ModeSpec) -> Result<&'static str, ModeError> {
        if let Some(previous) = state.registry.take() {
            previous.retire();
        }

        self.root.apply_presentation(&spec.presentation);

        let registry = EffectRegistry::new(spec.id);
        let outcome = match spec.spawn_effects(&registry, &self.root) {
            Ok(()) => {
                state.registry = Some(registry);
                Ok(spec.id)
            }
            Err(source) => {
                let released = registry.retire();
                warn!(
                    mode = spec.id,
                    released, "modes: effects failed, keeping presentation only: {source}"
                );
                Err(ModeError::EffectsFailed {
                    mode: spec.id,
                    source,
                })
            }
        };

        let previous = state.current.replace(spec.id);
        info!(mode = spec.id, previous = previous.unwrap_or("none"), "modes: switched");

        if let Err(err) = self.preferences.save_mode(spec.id) {
            warn!(mode = spec.id, "modes: could not persist mode: {err:#}");
        }
        outcome
    }
}

impl fmt::Debug for ModeController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModeController")
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "../tests/modes_tests.rs"]
mod tests;

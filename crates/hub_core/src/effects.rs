//! Per-mode ownership of ephemeral effects.
//!
//! An [`EffectRegistry`] records every timer, subscription and visual element a
//! mode creates. Entries leave the registry exactly once: individually through
//! [`EffectRegistry::unregister`] (or when a one-shot fires), or all together
//! through [`EffectRegistry::retire`]. A retired registry stays retired.

use std::{
    collections::BTreeMap,
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use shared::domain::{EffectKind, EffectTicket, ElementId};
use thiserror::Error;
use tokio::{
    sync::{broadcast, oneshot},
    task::AbortHandle,
    time::Instant,
};
use tracing::{debug, error, trace};

use crate::visual::{RootEvent, VisualElement, VisualRoot};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EffectError {
    #[error("registry for mode '{scope}' is retired; refusing {kind} effect")]
    UseAfterRetire { scope: String, kind: &'static str },
}

/// What a recurring callback wants next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Continue,
    Stop,
}

/// A disposable resource owned by a registry.
pub enum Effect {
    Recurring(AbortHandle),
    OneShot(AbortHandle),
    Subscription(AbortHandle),
    Element {
        root: Arc<dyn VisualRoot>,
        id: ElementId,
    },
}

impl Effect {
    pub fn kind(&self) -> EffectKind {
        match self {
            Effect::Recurring(_) => EffectKind::Recurring,
            Effect::OneShot(_) => EffectKind::OneShot,
            Effect::Subscription(_) => EffectKind::Subscription,
            Effect::Element { .. } => EffectKind::Element,
        }
    }

    fn release(self) {
        match self {
            Effect::Recurring(task) | Effect::OneShot(task) | Effect::Subscription(task) => {
                task.abort()
            }
            Effect::Element { root, id } => {
                root.remove(id);
            }
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::Element { id, .. } => f.debug_struct("Element").field("id", id).finish(),
            other => f.write_str(other.kind().as_str()),
        }
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    retired: bool,
    next_ticket: u64,
    entries: BTreeMap<EffectTicket, Effect>,
}

#[derive(Debug)]
struct RegistryInner {
    scope: String,
    state: Mutex<RegistryState>,
}

impl RegistryInner {
    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if state.entries.is_empty() {
            return;
        }
        debug!(
            scope = %self.scope,
            outstanding = state.entries.len(),
            "effects: releasing entries of dropped registry"
        );
        for (_, effect) in std::mem::take(&mut state.entries) {
            effect.release();
        }
    }
}

/// Owning set of the effects spawned by one mode activation.
///
/// Cloning yields another handle to the same registry. Tasks spawned through
/// the registry only hold weak references, so they never keep it alive.
#[derive(Debug, Clone)]
pub struct EffectRegistry {
    inner: Arc<RegistryInner>,
}

impl EffectRegistry {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                scope: scope.into(),
                state: Mutex::new(RegistryState::default()),
            }),
        }
    }

    pub fn scope(&self) -> &str {
        &self.inner.scope
    }

    pub fn is_active(&self) -> bool {
        !self.inner.state().retired
    }

    /// Outstanding entries.
    pub fn len(&self) -> usize {
        self.inner.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_kind(&self, kind: EffectKind) -> usize {
        self.inner
            .state()
            .entries
            .values()
            .filter(|effect| effect.kind() == kind)
            .count()
    }

    /// Takes ownership of `effect`. On a retired registry the effect is
    /// released on the spot and `UseAfterRetire` is returned.
    pub fn register(&self, effect: Effect) -> Result<EffectTicket, EffectError> {
        let ticket = self.reserve(effect.kind())?;
        self.fill(ticket, effect)?;
        Ok(ticket)
    }

    /// Removes and releases one entry. Returns false if it was already gone.
    pub fn unregister(&self, ticket: EffectTicket) -> bool {
        let effect = self.inner.state().entries.remove(&ticket);
        match effect {
            Some(effect) => {
                trace!(scope = %self.inner.scope, ticket = ticket.0, kind = effect.kind().as_str(), "effects: unregister");
                effect.release();
                true
            }
            None => false,
        }
    }

    /// Releases every owned entry and deactivates the registry for good.
    /// Returns how many entries were released; a second call releases none.
    pub fn retire(&self) -> usize {
        let entries = {
            let mut state = self.inner.state();
            if state.retired {
                return 0;
            }
            state.retired = true;
            std::mem::take(&mut state.entries)
        };

        let released = entries.len();
        for (_, effect) in entries {
            effect.release();
        }
        debug!(scope = %self.inner.scope, released, "effects: registry retired");
        released
    }

    /// Calls `tick` every `period`, first after one full period, until it
    /// returns [`Tick::Stop`] or the registry lets go of the timer.
    pub fn every<F>(&self, period: Duration, mut tick: F) -> Result<EffectTicket, EffectError>
    where
        F: FnMut(&EffectRegistry) -> Result<Tick, EffectError> + Send + 'static,
    {
        let ticket = self.reserve(EffectKind::Recurring)?;
        let weak = self.downgrade();
        let start = Instant::now() + period;
        self.spawn_owned(ticket, Effect::Recurring, async move {
            let mut interval = tokio::time::interval_at(start, period);
            loop {
                interval.tick().await;
                let Some(registry) = upgrade(&weak) else {
                    return;
                };
                match tick(&registry) {
                    Ok(Tick::Continue) => {}
                    Ok(Tick::Stop) => {
                        registry.complete(ticket);
                        return;
                    }
                    Err(err) => {
                        error!(scope = %registry.scope(), "effects: recurring effect stopped: {err}");
                        registry.complete(ticket);
                        return;
                    }
                }
            }
        })?;
        Ok(ticket)
    }

    /// Runs `action` once after `delay` unless the entry was released first.
    pub fn after<F>(&self, delay: Duration, action: F) -> Result<EffectTicket, EffectError>
    where
        F: FnOnce(&EffectRegistry) -> Result<(), EffectError> + Send + 'static,
    {
        let ticket = self.reserve(EffectKind::OneShot)?;
        let weak = self.downgrade();
        let deadline = Instant::now() + delay;
        self.spawn_owned(ticket, Effect::OneShot, async move {
            tokio::time::sleep_until(deadline).await;
            let Some(registry) = upgrade(&weak) else {
                return;
            };
            if !registry.complete(ticket) {
                return;
            }
            if let Err(err) = action(&registry) {
                error!(scope = %registry.scope(), "effects: one-shot effect failed: {err}");
            }
        })?;
        Ok(ticket)
    }

    /// Feeds every event from `events` to `handler` until the registry lets go.
    pub fn subscribe<F>(
        &self,
        mut events: broadcast::Receiver<RootEvent>,
        mut handler: F,
    ) -> Result<EffectTicket, EffectError>
    where
        F: FnMut(&EffectRegistry, RootEvent) -> Result<(), EffectError> + Send + 'static,
    {
        let ticket = self.reserve(EffectKind::Subscription)?;
        let weak = self.downgrade();
        self.spawn_owned(ticket, Effect::Subscription, async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        trace!(skipped, "effects: subscription lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        if let Some(registry) = upgrade(&weak) {
                            registry.complete(ticket);
                        }
                        return;
                    }
                };
                let Some(registry) = upgrade(&weak) else {
                    return;
                };
                if let Err(err) = handler(&registry, event) {
                    error!(scope = %registry.scope(), "effects: subscription stopped: {err}");
                    registry.complete(ticket);
                    return;
                }
            }
        })?;
        Ok(ticket)
    }

    /// Inserts `element` into `root` and takes ownership of it.
    pub fn insert_element(
        &self,
        root: &Arc<dyn VisualRoot>,
        element: VisualElement,
    ) -> Result<(EffectTicket, ElementId), EffectError> {
        let ticket = self.reserve(EffectKind::Element)?;
        let id = root.insert(element);
        self.fill(
            ticket,
            Effect::Element {
                root: Arc::clone(root),
                id,
            },
        )?;
        Ok((ticket, id))
    }

    /// Inserts an element that removes itself after `lifetime`.
    pub fn insert_transient(
        &self,
        root: &Arc<dyn VisualRoot>,
        element: VisualElement,
        lifetime: Duration,
    ) -> Result<ElementId, EffectError> {
        let (ticket, id) = self.insert_element(root, element)?;
        self.after(lifetime, move |registry| {
            registry.unregister(ticket);
            Ok(())
        })?;
        Ok(id)
    }

    fn downgrade(&self) -> Weak<RegistryInner> {
        Arc::downgrade(&self.inner)
    }

    fn reserve(&self, kind: EffectKind) -> Result<EffectTicket, EffectError> {
        let mut state = self.inner.state();
        if state.retired {
            drop(state);
            return Err(self.use_after_retire(kind));
        }
        state.next_ticket += 1;
        Ok(EffectTicket(state.next_ticket))
    }

    /// Spawns `body` as the task behind `ticket`. The task waits until its
    /// entry is in the registry, so it can always find and complete it.
    fn spawn_owned<Fut>(
        &self,
        ticket: EffectTicket,
        wrap: fn(AbortHandle) -> Effect,
        body: Fut,
    ) -> Result<(), EffectError>
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (registered, gate) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            if gate.await.is_err() {
                return;
            }
            body.await;
        });
        self.fill(ticket, wrap(task.abort_handle()))?;
        let _ = registered.send(());
        Ok(())
    }

    fn fill(&self, ticket: EffectTicket, effect: Effect) -> Result<(), EffectError> {
        let kind = effect.kind();
        let mut state = self.inner.state();
        if state.retired {
            drop(state);
            effect.release();
            return Err(self.use_after_retire(kind));
        }
        trace!(scope = %self.inner.scope, ticket = ticket.0, kind = kind.as_str(), "effects: register");
        state.entries.insert(ticket, effect);
        Ok(())
    }

    /// Drops the entry of an effect that finished on its own, without
    /// releasing it. Returns false if the registry already let go of it.
    fn complete(&self, ticket: EffectTicket) -> bool {
        self.inner.state().entries.remove(&ticket).is_some()
    }

    fn use_after_retire(&self, kind: EffectKind) -> EffectError {
        let err = EffectError::UseAfterRetire {
            scope: self.inner.scope.clone(),
            kind: kind.as_str(),
        };
        error!("effects: {err}");
        err
    }
}

fn upgrade(weak: &Weak<RegistryInner>) -> Option<EffectRegistry> {
    weak.upgrade().map(|inner| EffectRegistry { inner })
}

#[cfg(test)]
#[path = "tests/effects_tests.rs"]
mod tests;

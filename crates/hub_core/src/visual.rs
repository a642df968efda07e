//! The visual root: the surface modes draw their ephemeral elements on.
//!
//! Rendering is someone else's job. The runtime only tells the root which
//! presentation is active and which elements exist.

use std::{
    collections::BTreeMap,
    sync::{Mutex, PoisonError},
};

use shared::domain::ElementId;
use tokio::sync::broadcast;

/// Static look of a mode: the class token applied to the root and the
/// stylesheet key that selects the pre-built theme assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presentation {
    pub class_token: &'static str,
    pub stylesheet: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisualElement {
    pub class: String,
    pub text: Option<String>,
    pub x: f32,
    pub y: f32,
    pub style: Option<String>,
}

impl VisualElement {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            text: None,
            x: 0.0,
            y: 0.0,
            style: None,
        }
    }

    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub width: f32,
    pub height: f32,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 800.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RootEvent {
    Click { x: f32, y: f32 },
    Resize(Bounds),
    Key(String),
}

pub trait VisualRoot: Send + Sync {
    fn apply_presentation(&self, presentation: &Presentation);
    fn insert(&self, element: VisualElement) -> ElementId;
    /// Returns false when the element no longer exists.
    fn update(&self, id: ElementId, element: VisualElement) -> bool;
    fn remove(&self, id: ElementId) -> bool;
    fn subscribe(&self) -> broadcast::Receiver<RootEvent>;
    fn bounds(&self) -> Bounds;
}

#[derive(Debug, Default)]
struct HeadlessState {
    next_id: u64,
    elements: BTreeMap<ElementId, VisualElement>,
    presentation: Option<Presentation>,
    bounds: Bounds,
    inserted: u64,
    removed: u64,
}

/// In-memory root that keeps element bookkeeping without drawing anything.
#[derive(Debug)]
pub struct HeadlessRoot {
    state: Mutex<HeadlessState>,
    events: broadcast::Sender<RootEvent>,
}

impl Default for HeadlessRoot {
    fn default() -> Self {
        Self::new(Bounds::default())
    }
}

impl HeadlessRoot {
    pub fn new(bounds: Bounds) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            state: Mutex::new(HeadlessState {
                bounds,
                ..HeadlessState::default()
            }),
            events,
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delivers an event to every subscriber; returns how many received it.
    pub fn emit(&self, event: RootEvent) -> usize {
        if let RootEvent::Resize(bounds) = &event {
            self.state().bounds = *bounds;
        }
        self.events.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    pub fn element_count(&self) -> usize {
        self.state().elements.len()
    }

    pub fn count_class(&self, class: &str) -> usize {
        self.state()
            .elements
            .values()
            .filter(|element| element.class == class)
            .count()
    }

    pub fn element(&self, id: ElementId) -> Option<VisualElement> {
        self.state().elements.get(&id).cloned()
    }

    pub fn presentation(&self) -> Option<Presentation> {
        self.state().presentation
    }

    /// Total inserts and removals since creation.
    pub fn churn(&self) -> (u64, u64) {
        let state = self.state();
        (state.inserted, state.removed)
    }
}

impl VisualRoot for HeadlessRoot {
    fn apply_presentation(&self, presentation: &Presentation) {
        self.state().presentation = Some(*presentation);
    }

    fn insert(&self, element: VisualElement) -> ElementId {
        let mut state = self.state();
        state.next_id += 1;
        state.inserted += 1;
        let id = ElementId(state.next_id);
        state.elements.insert(id, element);
        id
    }

    fn update(&self, id: ElementId, element: VisualElement) -> bool {
        match self.state().elements.get_mut(&id) {
            Some(existing) => {
                *existing = element;
                true
            }
            None => false,
        }
    }

    fn remove(&self, id: ElementId) -> bool {
        let mut state = self.state();
        let removed = state.elements.remove(&id).is_some();
        if removed {
            state.removed += 1;
        }
        removed
    }

    fn subscribe(&self) -> broadcast::Receiver<RootEvent> {
        self.events.subscribe()
    }

    fn bounds(&self) -> Bounds {
        self.state().bounds
    }
}

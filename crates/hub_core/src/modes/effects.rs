//! Effect functions of the built-in modes. Each one receives a fresh registry
//! and creates timers, subscriptions and elements only through it.

use std::{sync::Arc, time::Duration};

use rand::Rng;

use crate::{
    effects::{EffectError, EffectRegistry, Tick},
    visual::{RootEvent, VisualElement, VisualRoot},
};

pub const KUROMI_PERIOD: Duration = Duration::from_millis(2_500);
pub const KUROMI_LIFETIME: Duration = Duration::from_millis(1_500);
pub const COMIC_LIFETIME: Duration = Duration::from_secs(1);
pub const GLITCH_PERIOD: Duration = Duration::from_millis(300);
pub const MATRIX_SPAWN_PERIOD: Duration = Duration::from_millis(120);
pub const MATRIX_FALL_PERIOD: Duration = Duration::from_millis(60);
pub const ANIME_PERIOD: Duration = Duration::from_millis(500);
pub const ANIME_LIFETIME: Duration = Duration::from_secs(2);

const MATRIX_STEP: f32 = 6.0;
const MATRIX_START_Y: f32 = -20.0;
const GLITCH_FILTER: &str = "hue-rotate(30deg) blur(.2px)";

fn random_below(limit: f32) -> f32 {
    rand::thread_rng().gen_range(0.0..limit.max(1.0))
}

pub fn kuromi(registry: &EffectRegistry, root: &Arc<dyn VisualRoot>) -> Result<(), EffectError> {
    let root = Arc::clone(root);
    registry.every(KUROMI_PERIOD, move |registry| {
        let bounds = root.bounds();
        let icon = VisualElement::new("kuromi-icon")
            .at(random_below(bounds.width), random_below(bounds.height));
        registry.insert_transient(&root, icon, KUROMI_LIFETIME)?;
        Ok(Tick::Continue)
    })?;
    Ok(())
}

pub fn comic(registry: &EffectRegistry, root: &Arc<dyn VisualRoot>) -> Result<(), EffectError> {
    let events = root.subscribe();
    let root = Arc::clone(root);
    registry.subscribe(events, move |registry, event| {
        if let RootEvent::Click { x, y } = event {
            let pop = VisualElement::new("comic-pop")
                .at(x - 50.0, y - 50.0)
                .with_text("POW!");
            registry.insert_transient(&root, pop, COMIC_LIFETIME)?;
        }
        Ok(())
    })?;
    Ok(())
}

pub fn glitch(registry: &EffectRegistry, root: &Arc<dyn VisualRoot>) -> Result<(), EffectError> {
    let (_, overlay) = registry.insert_element(root, VisualElement::new("glitch-overlay"))?;
    let root = Arc::clone(root);
    registry.every(GLITCH_PERIOD, move |_| {
        let filter = if rand::thread_rng().gen_bool(0.4) {
            GLITCH_FILTER
        } else {
            "none"
        };
        if !root.update(overlay, VisualElement::new("glitch-overlay").with_style(filter)) {
            return Ok(Tick::Stop);
        }
        Ok(Tick::Continue)
    })?;
    Ok(())
}

pub fn matrix(registry: &EffectRegistry, root: &Arc<dyn VisualRoot>) -> Result<(), EffectError> {
    let root = Arc::clone(root);
    registry.every(MATRIX_SPAWN_PERIOD, move |registry| {
        spawn_glyph(registry, &root)?;
        Ok(Tick::Continue)
    })?;
    Ok(())
}

/// One falling glyph, moved by its own timer and removed once it passes the
/// bottom edge.
fn spawn_glyph(registry: &EffectRegistry, root: &Arc<dyn VisualRoot>) -> Result<(), EffectError> {
    let bounds = root.bounds();
    let glyph = char::from(rand::thread_rng().gen_range(33u8..123u8));
    let mut element = VisualElement::new("matrix-char")
        .at(random_below(bounds.width - 18.0), MATRIX_START_Y)
        .with_text(glyph.to_string())
        .with_style("color:#0f0");
    let (element_ticket, id) = registry.insert_element(root, element.clone())?;

    let root = Arc::clone(root);
    registry.every(MATRIX_FALL_PERIOD, move |registry| {
        element.y += MATRIX_STEP;
        if element.y > root.bounds().height + 20.0 {
            registry.unregister(element_ticket);
            return Ok(Tick::Stop);
        }
        root.update(id, element.clone());
        Ok(Tick::Continue)
    })?;
    Ok(())
}

pub fn anime(registry: &EffectRegistry, root: &Arc<dyn VisualRoot>) -> Result<(), EffectError> {
    let root = Arc::clone(root);
    registry.every(ANIME_PERIOD, move |registry| {
        let bounds = root.bounds();
        let particle =
            VisualElement::new("anime-particle").at(random_below(bounds.width), bounds.height);
        registry.insert_transient(&root, particle, ANIME_LIFETIME)?;
        Ok(Tick::Continue)
    })?;
    Ok(())
}

pub fn cyberpunk(registry: &EffectRegistry, root: &Arc<dyn VisualRoot>) -> Result<(), EffectError> {
    registry.insert_element(
        root,
        VisualElement::new("cp-overlay").with_style("position:absolute;inset:0;pointer-events:none"),
    )?;
    Ok(())
}

//! Controller layer: UI events, error classification, and input/command orchestration.

pub mod events;
pub mod orchestration;

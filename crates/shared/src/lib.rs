//! Data shared between the hub runtime and its front ends: identifiers,
//! user-facing notices and the hub document format.

pub mod domain;
pub mod error;
pub mod hub;

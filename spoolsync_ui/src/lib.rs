#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! UI-side presentation layer.
//!
//! Consumes the engine's outbound events and maintains what a display
//! should show right now. The centerpiece is the presentation timer: the
//! last known spool stays visible for a grace period after staging clears,
//! debounced against staging flicker, so the screen doesn't blink every
//! time the tag reader loses the tag for a moment.

pub mod display;
pub mod presentation;

pub use display::{DisplayModel, DisplayState};
pub use presentation::{DisplayChange, PresentationTimer};

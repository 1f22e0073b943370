//! The conversation layer: button actions, prompts, the controller and the
//! event loop that drives it.

pub mod actions;
pub mod controller;
pub mod keyboard;
pub mod runner;

pub use actions::ButtonAction;
pub use controller::{Controller, WizardOptions};

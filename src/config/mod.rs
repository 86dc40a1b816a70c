//! # Configuration
//!
//! Process-wide settings for the controller.

mod controller;

pub use controller::ControllerConfig;

//! External Secret Controller Library
//!
//! This library provides the core functionality for the External Secret Controller.
//! Tests are included in the module files and under `tests/`.

// Re-export modules so they can be tested
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod error;
pub mod observability;
pub mod provider;
pub mod runtime;
pub mod server;

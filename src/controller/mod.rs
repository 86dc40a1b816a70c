//! # Controller
//!
//! Core controller modules for the External Secret Controller.
//!
//! - `backoff`: Fibonacci backoff mechanism for retries
//! - `reconciler`: Core reconciliation logic
//! - `scheduler`: Periodic refresh of ExternalSecrets with a long refresh interval

pub mod backoff;
pub mod reconciler;
pub mod scheduler;

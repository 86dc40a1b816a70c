//! # Runtime
//!
//! Process wiring: startup, plus the kube watch loop with its error policy.

pub mod deletion_watch;
pub mod error_policy;
pub mod initialization;
pub mod watch_loop;

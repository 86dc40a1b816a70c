//! # Validation
//!
//! Validates ExternalSecret resources and duration strings.

mod duration;
mod external_secret;
mod kubernetes;

pub use duration::parse_kubernetes_duration;
pub use external_secret::validate_external_secret;
pub use kubernetes::{validate_kubernetes_name, validate_secret_key};

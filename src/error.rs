//! # Error Classes
//!
//! Coarse classification of sync failures. The class
//! becomes the `error.class` log field and the `class` label on error metrics.

/// Error class of a failed sync cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Missing or ambiguous store reference, zero or several backends configured
    Config,
    /// Credential lookup or exchange failure
    Auth,
    /// Network/API failure, malformed JSON, missing property
    Backend,
    /// Template parse or overlay failure
    Merge,
    /// Object-store write failure
    Upsert,
}

impl ErrorClass {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::Config => "config",
            ErrorClass::Auth => "auth",
            ErrorClass::Backend => "backend",
            ErrorClass::Merge => "merge",
            ErrorClass::Upsert => "upsert",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

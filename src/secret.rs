//! Secret values
//!
//! Holds credential material in memory while guaranteeing that every
//! rendered or serialized form shows `[REDACTED]` instead of the value.
//! Callers that genuinely need the value (child-process environments)
//! must go through [`Secret::reveal`].

use std::fmt;

use serde::{Serialize, Serializer};

/// Placeholder emitted wherever a secret would otherwise appear
pub const REDACTED: &str = "[REDACTED]";

/// A credential value that never leaks through Debug, Display, or serde
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The underlying value. Only child-environment injection should call this.
    pub fn reveal(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({REDACTED})")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl Serialize for Secret {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(REDACTED)
    }
}

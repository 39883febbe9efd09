//! Shared primitives used across HtmlPreview crates.

use core::fmt;

/// Result alias used across the workspace.
pub type PreviewResult<T> = Result<T, PreviewError>;

/// Error carried by every fallible operation in the workspace.
///
/// `code` is a stable dotted identifier (`url.parse.control_character`,
/// `schedule.probe_failed`, ...) that callers can match on; `message` is for
/// humans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewError {
    pub code: &'static str,
    pub message: String,
}

impl PreviewError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// True when the error code lives under the given dotted prefix.
    pub fn is_in(&self, prefix: &str) -> bool {
        self.code == prefix
            || (self.code.starts_with(prefix)
                && self.code.as_bytes().get(prefix.len()).copied() == Some(b'.'))
    }
}

impl fmt::Display for PreviewError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PreviewError {}

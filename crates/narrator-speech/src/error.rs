//! Setup errors for speech backends.
//!
//! Per-call failures use [`narrator_core::SynthesisError`]; this type only
//! covers constructing a backend and its diagnostic calls.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpeechError {
    /// The configured engine origin is not a usable base URL.
    #[error("Invalid speech engine origin '{origin}': {message}")]
    InvalidOrigin { origin: String, message: String },

    /// The HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    /// A diagnostic request failed.
    #[error("Speech engine request to {url} failed: {message}")]
    Request { url: String, message: String },

    /// A diagnostic request returned a non-success status.
    #[error("Speech engine request to {url} failed with status {status}")]
    Status { url: String, status: u16 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_origin_message() {
        let err = SpeechError::InvalidOrigin {
            origin: "localhost".to_string(),
            message: "relative URL without a base".to_string(),
        };
        assert!(err.to_string().contains("'localhost'"));
    }
}

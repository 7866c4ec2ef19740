//! Error types for the captioning pipeline.
//!
//! Each variant names the stage that failed so handlers can report which
//! step broke and pick the right status code.

/// Error types for pipeline operations
#[derive(Debug)]
pub enum PipelineError {
    /// Fetching the animation over HTTP failed (client fault)
    Download(String),
    /// The bytes are not a valid animated-image container
    Decode(String),
    /// A per-frame captioning call failed (only surfaced in strict mode)
    Captioning(String),
    /// The final summarization call failed (always terminal)
    Summarization(String),
    /// Neither a URL nor a file was supplied
    InvalidInput(String),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Download(s) => write!(f, "Failed to download GIF: {}", s),
            PipelineError::Decode(s) => write!(f, "Failed to decode GIF: {}", s),
            PipelineError::Captioning(s) => write!(f, "Captioning failed: {}", s),
            PipelineError::Summarization(s) => write!(f, "Summarization failed: {}", s),
            PipelineError::InvalidInput(s) => write!(f, "Invalid input: {}", s),
        }
    }
}

impl std::error::Error for PipelineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_stage() {
        let e = PipelineError::Download("timed out".into());
        assert!(e.to_string().contains("download"));
        let e = PipelineError::Summarization("503".into());
        assert!(e.to_string().contains("Summarization"));
    }
}
